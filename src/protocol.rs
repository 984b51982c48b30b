//! Wire types for the Supertac realtime protocol.
//!
//! Every type in this module produces exactly the JSON the game server
//! speaks. Shape notes:
//!
//! - Realtime messages are internally tagged by a `type` field, payload
//!   fields inline beside it (no envelope object).
//! - User ids travel as camelCase `userId` in realtime messages and as
//!   snake_case `user_id` in the management payloads.
//! - A global board serializes as 9 arrays of 9 `"X" | "O" | null` cells.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{GameWinner, GlobalBoard, Mark, Move};
use crate::error_codes::ErrorCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for games, issued by the server.
pub type GameId = Uuid;

/// Opaque client-supplied identifier for users. The server compares these
/// for equality only and never inspects their contents.
pub type UserId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// How a game was created and who fills its seats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameMode {
    /// Hot-seat play: one connection submits moves for both marks.
    Local,
    /// Two remote human players joining by shared game id.
    #[default]
    Remote,
    /// Like REMOTE, but created by the matchmaking queue pairing two
    /// waiting users.
    Random,
    /// One human seat (always X) against the configured move provider.
    Ai,
}

impl GameMode {
    /// How many human seats this mode fills before joiners become
    /// watchers.
    #[must_use]
    pub fn player_seats(self) -> usize {
        match self {
            Self::Local | Self::Ai => 1,
            Self::Remote | Self::Random => 2,
        }
    }
}

/// A participant's rights in a game: seated player or counted watcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantRole {
    Player,
    Watcher,
}

/// Difficulty tier requested from the move provider. The configured value
/// flows through to every provider request unchanged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

// ── Snapshots ───────────────────────────────────────────────────────

/// Authoritative snapshot of one game as broadcast to clients.
///
/// `active_board` and `winner` serialize as explicit `null` when unset;
/// clients rely on the fields being present.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GameStateSnapshot {
    pub global_board: GlobalBoard,
    /// Index of the mandated small board, or `null` when the next mover
    /// may pick any open board.
    pub active_board: Option<u8>,
    pub move_count: u32,
    /// `"X"`, `"O"`, `"T"` for a tie, or `null` while in progress.
    pub winner: Option<GameWinner>,
    pub current_player: Mark,
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for the `player_joined` server message.
/// Boxed in `ServerMessage` to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoinedPayload {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    /// Seat mark for players; `null` for watchers.
    pub symbol: Option<Mark>,
    /// Role the joiner was assigned.
    pub status: ParticipantRole,
    pub watchers_count: u32,
    /// Full snapshot for the joiner; omitted on the lighter notification
    /// fanned out to existing participants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameStateSnapshot>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
///
/// The game id is not carried here: a connection is scoped to one game by
/// its WebSocket path (`/ws/{game_id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach this connection to the game as a player or watcher
    /// (MUST be the first message on every connection).
    JoinGame {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// Submit a move for validation, application, and broadcast.
    MakeMove {
        #[serde(rename = "userId")]
        user_id: UserId,
        #[serde(rename = "move")]
        mv: Move,
    },
    /// Stop watching. Idempotent; affects bookkeeping only.
    LeaveWatcher {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// Reinitialize boards/turn/winner, keeping id, players, and mode.
    ResetGame {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
}

/// Message types sent from server to client.
///
/// Everything except `error` is broadcast to every connection of the
/// game, in one total order per game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A participant joined: full snapshot to the joiner, lighter
    /// notification to everyone already attached (boxed to reduce enum
    /// size).
    PlayerJoined(Box<PlayerJoinedPayload>),
    /// Authoritative state after every applied move or reset. `userId`
    /// names the acting user.
    GameUpdate {
        #[serde(rename = "userId")]
        user_id: UserId,
        game_state: GameStateSnapshot,
    },
    /// The watcher count changed.
    WatchersUpdate { watchers_count: u32 },
    /// A failure scoped to the receiving connection. Never broadcast.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
}

// ── Management payloads ─────────────────────────────────────────────
//
// Consumed by the HTTP front end that hosts the matchmaking and game
// management endpoints. Queue requests carry a bare `user_id`, so the
// queue API takes the id directly and only the responses have shapes.

/// Response to a matchmaking queue join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueueJoinResponse {
    /// Paired with the longest-waiting user; a fresh game was created.
    Matched { game_id: GameId },
    /// Enqueued (or already queued); `position` is 0-based from the head.
    Queued { position: usize, queue_size: usize },
}

/// Response to a matchmaking status poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueueStatusResponse {
    /// A pairing completed while this user waited.
    Matched { game_id: GameId },
    /// Still waiting.
    Queued { position: usize, queue_size: usize },
    /// Unknown user: never queued, left, or the match result expired.
    NotQueued,
}

/// Request to create a game outside the matchmaking queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub mode: GameMode,
    /// Only meaningful for [`GameMode::Ai`]; defaults to medium there.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_difficulty: Option<AiDifficulty>,
}

/// Response to game creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameResponse {
    pub game_id: GameId,
    pub mode: GameMode,
}

/// Request to reset a game to its opening state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetRequest {
    pub game_id: GameId,
    pub user_id: UserId,
}

/// Outcome of a reset request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
