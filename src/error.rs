//! Error types for the Supertac client and game engine.

use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Errors that can occur when using the Supertac client.
#[derive(Debug, Error)]
pub enum SupertacError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The server returned an error message.
    #[error("server error: {message}")]
    ServerError {
        /// Human-readable error message from the server.
        message: String,
        /// Structured error code, if provided by the server.
        error_code: Option<ErrorCode>,
    },

    /// The matchmaking queue worker is no longer running, so a queue
    /// request raced the server shutting down.
    #[error("matchmaking queue is not running")]
    QueueClosed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Supertac client operations.
pub type Result<T> = std::result::Result<T, SupertacError>;

/// Why a move was rejected. Carried inside [`GameError::IllegalMove`] and
/// echoed in server `error` replies.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IllegalMoveReason {
    /// A board or cell index fell outside 0-8.
    #[error("board or cell index out of range")]
    OutOfRange,

    /// The move targeted a board other than the mandated active board.
    #[error("move must target the active board")]
    WrongBoard,

    /// The targeted small board is already won or drawn.
    #[error("target board is already resolved")]
    BoardResolved,

    /// The targeted cell already holds a mark.
    #[error("target cell is already occupied")]
    CellOccupied,

    /// The game already has a winner; only a reset reopens it.
    #[error("game is already finished")]
    GameFinished,
}

/// Game-logic failures raised while validating intents against a game.
///
/// These are always handled at the owning game task and reported only to
/// the connection that caused them; they never reach other participants
/// and never leave authoritative state modified.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    /// The referenced game id is unknown (never created, or reaped).
    #[error("game not found")]
    GameNotFound,

    /// The mover does not hold the symbol whose turn it is.
    #[error("not your turn")]
    NotYourTurn,

    /// The move violates a legality rule; see the reason.
    #[error("illegal move: {0}")]
    IllegalMove(#[from] IllegalMoveReason),
}

impl GameError {
    /// The wire error code sent alongside this failure.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::GameNotFound => ErrorCode::GameNotFound,
            Self::NotYourTurn => ErrorCode::NotYourTurn,
            Self::IllegalMove(_) => ErrorCode::IllegalMove,
        }
    }
}
