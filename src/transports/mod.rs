//! Ready-made [`Transport`](crate::Transport) implementations.
//!
//! Each transport sits behind its own Cargo feature so that embedders who
//! bring their own connection (or run the client over an in-process
//! channel in tests) pay for none of this. Today there is one:
//! [`WebSocketTransport`], enabled by `transport-websocket` and on by
//! default.
//!
//! The transports only move text frames; which game a connection belongs
//! to is decided at connect time, through the `/ws/{game_id}` URL path:
//!
//! ```rust,ignore
//! # async fn example(game_id: uuid::Uuid) -> Result<(), supertac::SupertacError> {
//! use supertac::WebSocketTransport;
//!
//! let url = format!("ws://localhost:3536/ws/{game_id}");
//! let transport = WebSocketTransport::connect(&url).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Most callers never touch the transport again after handing it to
//! [`SupertacClient::start`](crate::SupertacClient::start).

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
