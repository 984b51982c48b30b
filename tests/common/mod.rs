#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Helpers shared by the integration tests: a scriptable in-memory
//! transport and builders for the server's JSON frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use supertac::board::{Mark, Move};
use supertac::game::GameState;
use supertac::protocol::{
    GameMode, GameStateSnapshot, ParticipantRole, PlayerJoinedPayload, ServerMessage,
};
use supertac::{ErrorCode, SupertacError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// In-memory transport that stands in for a server.
///
/// `recv` replays a fixed script; each item is exactly what a real
/// transport could yield (a frame, a failure, or `None` for a clean
/// close). Outgoing messages land in a shared vector, and `close` flips
/// a shared flag, so tests keep visibility after the transport moves
/// into the client.
pub struct MockTransport {
    script: std::vec::IntoIter<Option<Result<String, SupertacError>>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Builds the transport around `incoming` and returns it together
    /// with the handles for watching sent messages and the close flag.
    pub fn new(
        incoming: Vec<Option<Result<String, SupertacError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            script: incoming.into_iter(),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SupertacError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SupertacError>> {
        match self.script.next() {
            Some(item) => item,
            // Script exhausted: park until the client shuts down, the way
            // an idle socket would.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SupertacError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Server frame builders ───────────────────────────────────────────

fn render(message: &ServerMessage) -> String {
    serde_json::to_string(message).expect("server messages always serialize")
}

/// The `player_joined` the server sends to the joiner itself, snapshot
/// included.
pub fn welcome_json(
    user_id: &str,
    symbol: Option<Mark>,
    status: ParticipantRole,
    watchers_count: u32,
    game_state: GameStateSnapshot,
) -> String {
    render(&ServerMessage::PlayerJoined(Box::new(PlayerJoinedPayload {
        user_id: user_id.into(),
        symbol,
        status,
        watchers_count,
        game_state: Some(game_state),
    })))
}

/// The light `player_joined` everyone else gets, no snapshot.
pub fn joined_notice_json(
    user_id: &str,
    symbol: Option<Mark>,
    status: ParticipantRole,
    watchers_count: u32,
) -> String {
    render(&ServerMessage::PlayerJoined(Box::new(PlayerJoinedPayload {
        user_id: user_id.into(),
        symbol,
        status,
        watchers_count,
        game_state: None,
    })))
}

/// A `game_update` broadcast attributed to `user_id`.
pub fn game_update_json(user_id: &str, game_state: GameStateSnapshot) -> String {
    render(&ServerMessage::GameUpdate {
        user_id: user_id.into(),
        game_state,
    })
}

/// A `watchers_update` broadcast.
pub fn watchers_update_json(watchers_count: u32) -> String {
    render(&ServerMessage::WatchersUpdate { watchers_count })
}

/// A connection-scoped `error` frame.
pub fn error_json(message: &str, error_code: Option<ErrorCode>) -> String {
    render(&ServerMessage::Error {
        message: message.into(),
        error_code,
    })
}

/// Plays `moves` (alternating X then O from the opening position) through
/// a real game and returns the authoritative snapshot that results.
pub fn snapshot_after(moves: &[(u8, u8)]) -> GameStateSnapshot {
    let mut game = GameState::create(GameMode::Remote, None);
    game.join("alice");
    game.join("bob");
    let mut snapshot = game.snapshot();
    for &(board, cell) in moves {
        let user = if game.current_player() == Mark::X {
            "alice"
        } else {
            "bob"
        };
        snapshot = game
            .apply_move(user, Move::new(board, cell))
            .expect("scripted move is legal");
    }
    snapshot
}
