//! # Standalone Server Example
//!
//! Runs an authoritative Super Tic-Tac-Toe server and seeds it with two
//! open games:
//!
//! 1. Bind the WebSocket listener
//! 2. Create one two-seat game and one game against the built-in AI
//! 3. Print the `ws://` URLs clients should connect to
//! 4. Serve until Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! cargo run --example serve
//!
//! # Override the bind address:
//! SUPERTAC_ADDR=0.0.0.0:3536 cargo run --example serve
//! ```

use supertac::protocol::{AiDifficulty, GameMode};
use supertac::server::DEFAULT_BIND_ADDR;
use supertac::{GameServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Bind ────────────────────────────────────────────────────────
    let addr = std::env::var("SUPERTAC_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let server = GameServer::bind(ServerConfig::new().with_bind_addr(addr)).await?;
    let local = server.local_addr()?;

    // ── Seed games ──────────────────────────────────────────────────
    // A two-seat game (first joiner plays X, second plays O, everyone
    // after that watches) and a single-seat game against the AI.
    let versus = server
        .registry()
        .create_game(GameMode::Remote, None)
        .await;
    let solo = server
        .registry()
        .create_game(GameMode::Ai, Some(AiDifficulty::Medium))
        .await;

    tracing::info!("two-player game: ws://{local}/ws/{}", versus.game_id);
    tracing::info!("vs-AI game:      ws://{local}/ws/{}", solo.game_id);
    tracing::info!("serving on {local}; press Ctrl+C to stop");

    // ── Serve ───────────────────────────────────────────────────────
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down…");
        }
    }

    Ok(())
}
