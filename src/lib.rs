//! # Supertac
//!
//! Real-time Super Tic-Tac-Toe over JSON text messages: the
//! authoritative game engine, the wire protocol, a transport-agnostic
//! async client, and a WebSocket server with matchmaking.
//!
//! ## Features
//!
//! - **Authoritative engine** — [`game::GameState`] owns seats, boards,
//!   turn, and winner; every move is validated before it is applied
//! - **Transport-agnostic client** — implement the [`Transport`] trait
//!   for any backend; the default `transport-websocket` feature provides
//!   [`transports::WebSocketTransport`]
//! - **Event-driven** — receive typed [`SupertacEvent`]s via a channel
//!   while a [`store::GameStore`] replica mirrors the server's state
//! - **Batteries-included server** — the `server` feature adds the
//!   WebSocket server, per-game session tasks, a FIFO matchmaking queue,
//!   and a pluggable AI move provider
//!
//! ## Quick Start
//!
//! ```no_run
//! use supertac::transports::WebSocketTransport;
//! use supertac::{SupertacClient, SupertacConfig, SupertacEvent};
//! use uuid::Uuid;
//!
//! # async fn run(game_id: Uuid) -> supertac::error::Result<()> {
//! let url = format!("ws://localhost:3536/ws/{game_id}");
//! let transport = WebSocketTransport::connect(&url).await?;
//! let (mut client, mut events) =
//!     SupertacClient::start(transport, SupertacConfig::new(game_id, "alice"));
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SupertacEvent::GameUpdated { game_state, .. } => {
//!             println!("move #{} applied", game_state.move_count);
//!         }
//!         SupertacEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod ai;
pub mod board;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod game;
pub mod protocol;
pub mod store;
pub mod transport;

#[cfg(feature = "tokio-runtime")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "transport-websocket")]
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use error::SupertacError;
pub use error_codes::ErrorCode;
pub use event::SupertacEvent;
pub use protocol::{ClientMessage, ServerMessage};
pub use transport::Transport;

#[cfg(feature = "tokio-runtime")]
pub use client::{SupertacClient, SupertacConfig};
#[cfg(feature = "server")]
pub use server::{GameServer, ServerConfig};
#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
