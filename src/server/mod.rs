//! WebSocket game server.
//!
//! Three layers, each owning one concern:
//!
//! - [`GameServer`] accepts TCP connections on `/ws/{game_id}` and spawns
//!   one connection task per socket.
//! - Connection tasks (this module) parse frames and bridge the socket to
//!   the game's session task; they hold no game state.
//! - [`session`] tasks own the games; [`registry`] maps ids to sessions
//!   and [`matchmaking`] pairs queued users.
//!
//! The first message on every connection must be `join_game`. Everything
//! a game emits flows back through an unbounded per-connection channel,
//! so a slow socket never blocks the game it is attached to.

pub mod matchmaking;
pub mod registry;
pub mod session;

pub use matchmaking::MatchmakingQueue;
pub use registry::GameRegistry;
pub use session::{ConnId, GameCommand, GameHandle, AI_USER_ID};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ai::{MoveProvider, RandomMoveProvider};
use crate::error::{Result, SupertacError};
use crate::error_codes::ErrorCode;
use crate::protocol::{ClientMessage, GameId, ServerMessage};

/// Default listen address, matching the port clients assume.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3536";

/// Default time a game survives with every player disconnected.
pub const DEFAULT_RECONNECT_GRACE: Duration = Duration::from_secs(30);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for [`GameServer::bind`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use supertac::server::{GameServer, ServerConfig};
///
/// # async fn run() -> supertac::error::Result<()> {
/// let config = ServerConfig::new()
///     .with_bind_addr("0.0.0.0:3536")
///     .with_reconnect_grace(Duration::from_secs(60));
/// let server = GameServer::bind(config).await?;
/// server.run().await
/// # }
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub bind_addr: String,
    /// How long a game waits for a player to reconnect before closing.
    pub reconnect_grace: Duration,
    /// Provider consulted for AI turns.
    pub move_provider: Arc<dyn MoveProvider>,
}

impl ServerConfig {
    /// Creates a configuration with the default address, grace period,
    /// and the built-in random move provider.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            reconnect_grace: DEFAULT_RECONNECT_GRACE,
            move_provider: Arc::new(RandomMoveProvider),
        }
    }

    /// Sets the listen address.
    #[must_use]
    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    /// Sets how long games survive without any player connection.
    #[must_use]
    pub fn with_reconnect_grace(mut self, grace: Duration) -> Self {
        self.reconnect_grace = grace;
        self
    }

    /// Swaps the AI move provider.
    #[must_use]
    pub fn with_move_provider(mut self, provider: Arc<dyn MoveProvider>) -> Self {
        self.move_provider = provider;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("reconnect_grace", &self.reconnect_grace)
            .finish_non_exhaustive()
    }
}

// ── Server ──────────────────────────────────────────────────────────

/// Accepts WebSocket connections and hosts the game registry and
/// matchmaking queue.
#[derive(Debug)]
pub struct GameServer {
    listener: TcpListener,
    registry: GameRegistry,
    queue: MatchmakingQueue,
    next_conn_id: AtomicU64,
}

impl GameServer {
    /// Binds the listener and starts the matchmaking worker. The server
    /// does not accept connections until [`run`](Self::run) is awaited.
    ///
    /// # Errors
    ///
    /// Returns [`SupertacError::Io`] when the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let registry = GameRegistry::new(config.move_provider, config.reconnect_grace);
        let queue = MatchmakingQueue::spawn(registry.clone());
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            registry,
            queue,
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The live game directory, for creating and resetting games.
    #[must_use]
    pub fn registry(&self) -> &GameRegistry {
        &self.registry
    }

    /// The matchmaking queue.
    #[must_use]
    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    /// Accepts connections until the listener fails. Each connection
    /// runs in its own task.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
            let registry = self.registry.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, peer, conn_id, registry).await {
                    debug!(%peer, conn_id, error = %err, "connection ended with error");
                }
            });
        }
    }
}

// ── Connection tasks ────────────────────────────────────────────────

/// Extracts the game id from a `/ws/{game_id}` request path.
fn parse_game_path(path: &str) -> Option<GameId> {
    let id = path.strip_prefix("/ws/")?;
    let id = id.strip_suffix('/').unwrap_or(id);
    Uuid::parse_str(id).ok()
}

/// Sends one error frame and closes the socket, for connections rejected
/// before they reach a game.
async fn reject(
    ws_stream: &mut WebSocketStream<TcpStream>,
    message: &str,
    error_code: ErrorCode,
) {
    let frame = ServerMessage::Error {
        message: message.to_owned(),
        error_code: Some(error_code),
    };
    if let Ok(json) = serde_json::to_string(&frame) {
        let _ = ws_stream.send(Message::Text(json.into())).await;
    }
    let _ = ws_stream.close(None).await;
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    conn_id: ConnId,
    registry: GameRegistry,
) -> Result<()> {
    // The game id rides on the request path, captured during the
    // handshake.
    let mut request_path = None;
    let mut ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        request_path = Some(req.uri().path().to_owned());
        Ok(resp)
    })
    .await
    .map_err(|err| SupertacError::TransportReceive(err.to_string()))?;

    let Some(game_id) = request_path.as_deref().and_then(parse_game_path) else {
        debug!(%peer, conn_id, path = request_path.as_deref().unwrap_or(""), "rejected path");
        reject(
            &mut ws_stream,
            "expected path /ws/{game_id}",
            ErrorCode::InvalidMessage,
        )
        .await;
        return Ok(());
    };
    let Some(game) = registry.handle(&game_id).await else {
        debug!(%peer, conn_id, game_id = %game_id, "unknown game");
        reject(&mut ws_stream, "game not found", ErrorCode::GameNotFound).await;
        return Ok(());
    };

    debug!(%peer, conn_id, game_id = %game_id, "connection open");
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    // Session-to-socket channel. The same channel carries this task's own
    // error replies, so the client sees one ordered stream.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut attached = false;

    // Every exit from this loop falls through to the Hangup below.
    loop {
        tokio::select! {
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(message) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(err) => {
                                error!(%peer, conn_id, error = %err, "unserializable frame");
                                break;
                            }
                        };
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // The session dropped us: the game was reaped.
                    None => break,
                }
            }
            incoming = ws_rx.next() => {
                let frame = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(%peer, conn_id, error = %err, "socket error");
                        break;
                    }
                };
                let message: ClientMessage = match serde_json::from_str(frame.as_str()) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(%peer, conn_id, error = %err, "unparseable message");
                        let _ = out_tx.send(ServerMessage::Error {
                            message: format!("could not parse message: {err}"),
                            error_code: Some(ErrorCode::InvalidMessage),
                        });
                        continue;
                    }
                };
                let mut session_gone = false;
                match message {
                    ClientMessage::JoinGame { user_id } => {
                        attached = true;
                        session_gone = !game.send(GameCommand::Attach {
                            conn_id,
                            user_id,
                            outbound: out_tx.clone(),
                        });
                    }
                    _ if !attached => {
                        let _ = out_tx.send(ServerMessage::Error {
                            message: "join_game must be sent first".to_owned(),
                            error_code: Some(ErrorCode::NotInGame),
                        });
                    }
                    ClientMessage::MakeMove { user_id, mv } => {
                        session_gone = !game.send(GameCommand::Move {
                            conn_id,
                            user_id,
                            mv,
                        });
                    }
                    ClientMessage::LeaveWatcher { user_id } => {
                        session_gone = !game.send(GameCommand::LeaveWatcher { conn_id, user_id });
                    }
                    ClientMessage::ResetGame { user_id } => {
                        session_gone = !game.send(GameCommand::Reset { conn_id, user_id });
                    }
                }
                if session_gone {
                    debug!(%peer, conn_id, game_id = %game_id, "session closed underneath connection");
                    break;
                }
            }
        }
    }

    let _ = game.send(GameCommand::Hangup { conn_id });
    debug!(%peer, conn_id, game_id = %game_id, "connection closed");
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

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

    #[test]
    fn game_path_parses_a_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_game_path(&format!("/ws/{id}")), Some(id));
        assert_eq!(parse_game_path(&format!("/ws/{id}/")), Some(id));
    }

    #[test]
    fn other_paths_are_rejected() {
        assert_eq!(parse_game_path("/ws/"), None);
        assert_eq!(parse_game_path("/ws/not-a-uuid"), None);
        assert_eq!(parse_game_path("/"), None);
        let id = Uuid::new_v4();
        assert_eq!(parse_game_path(&format!("/games/{id}")), None);
    }

    #[test]
    fn config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.reconnect_grace, DEFAULT_RECONNECT_GRACE);
    }

    #[test]
    fn config_builders() {
        let config = ServerConfig::new()
            .with_bind_addr("0.0.0.0:9000")
            .with_reconnect_grace(Duration::from_secs(2));
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.reconnect_grace, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn bind_reports_the_chosen_port() {
        let server = GameServer::bind(ServerConfig::new().with_bind_addr("127.0.0.1:0"))
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(server.registry().game_count().await, 0);
    }
}
