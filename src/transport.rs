//! The transport seam between the client and whatever carries its bytes.
//!
//! Everything the protocol says travels as complete JSON text messages, so
//! the [`Transport`] trait is deliberately small: send one string, receive
//! one string, close. Framing belongs to the implementation (WebSocket
//! frames, length-prefixed TCP, an in-process channel); the client never
//! sees partial messages.
//!
//! Connecting is not part of the trait. Every backend has its own dialing
//! story (URL, host and port, nothing at all for a loopback), so you hand
//! `SupertacClient::start` a transport that is already connected.
//!
//! A channel-backed implementation is enough for tests and for embedding
//! the client next to an in-process server:
//!
//! ```rust
//! use async_trait::async_trait;
//! use supertac::{SupertacError, Transport};
//! use tokio::sync::mpsc;
//!
//! struct Loopback {
//!     outgoing: mpsc::UnboundedSender<String>,
//!     incoming: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for Loopback {
//!     async fn send(&mut self, message: String) -> Result<(), SupertacError> {
//!         self.outgoing
//!             .send(message)
//!             .map_err(|e| SupertacError::TransportSend(e.to_string()))
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SupertacError>> {
//!         self.incoming.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SupertacError> {
//!         self.incoming.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SupertacError;

/// A bidirectional, message-oriented text channel.
///
/// One `send` puts one complete JSON message on the wire; one `recv` takes
/// one off. The trait is object-safe (`Box<dyn Transport>` works), though
/// `SupertacClient::start` takes `impl Transport` and monomorphizes.
///
/// # Cancel safety
///
/// `recv` MUST be cancel-safe: the client polls it inside `tokio::select!`,
/// and a cancelled poll must not eat a message. Receivers built on tokio
/// channels or on `StreamExt::next` have this property already.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Delivers one JSON text message to the peer.
    ///
    /// # Errors
    ///
    /// [`SupertacError::TransportSend`] when the message cannot be written
    /// (broken connection, full buffer), or
    /// [`SupertacError::TransportClosed`] once the transport was closed.
    async fn send(&mut self, message: String) -> Result<(), SupertacError>;

    /// Waits for the next JSON text message.
    ///
    /// `Some(Ok(text))` is a message, `Some(Err(_))` is a transport fault,
    /// and `None` means the peer closed cleanly and nothing more will come.
    ///
    /// Must be cancel-safe; see the trait docs.
    async fn recv(&mut self) -> Option<Result<String, SupertacError>>;

    /// Shuts the connection down politely.
    ///
    /// `send` and `recv` may keep being called afterwards; they report the
    /// closed state rather than panic. Closing twice is fine.
    ///
    /// # Errors
    ///
    /// Reports a failed close handshake. Resources should be released even
    /// then.
    async fn close(&mut self) -> Result<(), SupertacError>;
}
