//! WebSocket client transport built on `tokio-tungstenite`.
//!
//! A [`WebSocketTransport`] carries the protocol's JSON text messages over
//! one WebSocket connection. Because the server routes by path, the URL
//! names the game: `ws://host:port/ws/{game_id}`. `wss://` works too; TLS
//! is negotiated by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Enabled by the `transport-websocket` feature (on by default).
//!
//! ```rust,no_run
//! # async fn example(game_id: uuid::Uuid) -> Result<(), supertac::SupertacError> {
//! use supertac::{Transport, WebSocketTransport};
//!
//! let mut ws =
//!     WebSocketTransport::connect(&format!("ws://localhost:3536/ws/{game_id}")).await?;
//! ws.send(r#"{"type":"join_game","userId":"alice"}"#.to_string()).await?;
//! while let Some(Ok(frame)) = ws.recv().await {
//!     println!("server said: {frame}");
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::SupertacError;
use crate::transport::Transport;

/// The underlying stream type, exposed for [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// [`Transport`] over a WebSocket connection.
///
/// Only text frames are meaningful to the protocol. Control frames are
/// handled inside [`recv`](Transport::recv): pings are answered by
/// tungstenite, a close frame ends the stream, and binary frames are
/// dropped with a warning.
///
/// `recv` is cancel-safe, so the transport can sit directly inside a
/// `tokio::select!` loop (the client's background task does exactly that).
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Opens a connection to `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// Returns [`SupertacError::Io`]. A network-level failure keeps its
    /// original [`ErrorKind`](std::io::ErrorKind); handshake and URL
    /// problems surface as [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, SupertacError> {
        debug!(%url, "opening WebSocket connection");
        match tokio_tungstenite::connect_async(url).await {
            Ok((stream, _handshake)) => {
                info!(%url, "WebSocket connected");
                Ok(Self::from_stream(stream))
            }
            Err(tungstenite::Error::Io(io)) => Err(SupertacError::Io(io)),
            Err(other) => Err(SupertacError::Io(std::io::Error::other(other))),
        }
    }

    /// Like [`connect`](Self::connect), but gives up with
    /// [`SupertacError::Timeout`] once `deadline` elapses.
    pub async fn connect_with_timeout(
        url: &str,
        deadline: Duration,
    ) -> Result<Self, SupertacError> {
        match tokio::time::timeout(deadline, Self::connect(url)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(SupertacError::Timeout),
        }
    }

    /// Wraps a stream that was handshaken elsewhere (custom TLS config,
    /// extra headers, a proxy).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SupertacError> {
        if self.closed {
            return Err(SupertacError::TransportClosed);
        }
        match self.stream.send(Message::Text(message.into())).await {
            Ok(()) => Ok(()),
            Err(e) => Err(SupertacError::TransportSend(e.to_string())),
        }
    }

    async fn recv(&mut self) -> Option<Result<String, SupertacError>> {
        while let Some(frame) = self.stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => return Some(Err(SupertacError::TransportReceive(e.to_string()))),
            };
            match frame {
                // `Utf8Bytes` does not give up its buffer, so one copy here.
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(close_frame) => {
                    debug!(?close_frame, "peer closed the WebSocket");
                    return None;
                }
                // tungstenite queues the pong itself; neither side of a
                // ping/pong exchange is the caller's business.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(payload) => {
                    warn!(len = payload.len(), "dropping binary frame on a text protocol");
                }
                // Never produced by the read half; kept for exhaustiveness.
                Message::Frame(_) => {}
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), SupertacError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(e) => Err(SupertacError::TransportSend(e.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    /// Accepts exactly one WebSocket connection on an ephemeral port, hands
    /// it to `script`, and returns the URL to dial.
    async fn serve_once<F, Fut>(script: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (socket, _peer) = listener.accept().await.unwrap();
            script(tokio_tungstenite::accept_async(socket).await.unwrap()).await;
        });
        url
    }

    #[test]
    fn transport_is_send_and_debug() {
        fn assert_send<T: Send>() {}
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_send::<WebSocketTransport>();
        assert_debug::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn dialing_a_bad_url_is_an_io_error() {
        for url in ["not-a-valid-url", "ws://127.0.0.1:1"] {
            let err = WebSocketTransport::connect(url).await.unwrap_err();
            assert!(matches!(err, SupertacError::Io(_)), "url: {url}");
        }
    }

    #[tokio::test]
    async fn text_frames_arrive_in_order() {
        let url = serve_once(|mut ws| async move {
            for count in 1..=2 {
                let frame = format!(r#"{{"type":"watchers_update","watchers_count":{count}}}"#);
                ws.send(Message::Text(frame.into())).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        let first = ws.recv().await.unwrap().unwrap();
        assert!(first.contains("\"watchers_count\":1"));
        let second = ws.recv().await.unwrap().unwrap();
        assert!(second.contains("\"watchers_count\":2"));
        assert!(ws.recv().await.is_none());
    }

    #[tokio::test]
    async fn a_close_frame_ends_the_stream() {
        let url = serve_once(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        assert!(ws.recv().await.is_none());
    }

    #[tokio::test]
    async fn control_and_binary_frames_are_invisible() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Ping(vec![1].into())).await.unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"watchers_update","watchers_count":0}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        // The only thing recv ever yields is the text frame.
        let only = ws.recv().await.unwrap().unwrap();
        assert!(only.contains("watchers_update"));
        assert!(ws.recv().await.is_none());
    }

    #[tokio::test]
    async fn sent_messages_reach_the_server_verbatim() {
        let url = serve_once(|mut ws| async move {
            // Echo the first text frame back, then hang up.
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        let join = r#"{"type":"join_game","userId":"alice"}"#;
        ws.send(join.to_string()).await.unwrap();
        assert_eq!(ws.recv().await.unwrap().unwrap(), join);
    }

    #[tokio::test]
    async fn closing_sticks() {
        let url = serve_once(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        ws.close().await.unwrap();
        ws.close().await.unwrap();

        let err = ws.send("too late".to_string()).await.unwrap_err();
        assert!(matches!(err, SupertacError::TransportClosed));

        // recv after close must terminate, by either signal.
        match ws.recv().await {
            None | Some(Err(_)) => {}
            Some(Ok(frame)) => panic!("unexpected frame after close: {frame}"),
        }
    }

    #[tokio::test]
    async fn connect_with_timeout_gives_up() {
        // 192.0.2.0/24 is reserved for documentation; nothing answers.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SupertacError::Timeout));
    }

    #[tokio::test]
    async fn from_stream_adopts_a_live_connection() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"watchers_update","watchers_count":3}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (raw, _response) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut ws = WebSocketTransport::from_stream(raw);
        let frame = ws.recv().await.unwrap().unwrap();
        assert!(frame.contains("\"watchers_count\":3"));
    }
}
