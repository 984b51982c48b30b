//! Error codes for structured error handling in the Supertac protocol.
//!
//! The server attaches these to `error` replies so clients can react per
//! condition instead of string-matching messages. They serialize as
//! `SCREAMING_SNAKE_CASE` strings; the `code` field is omitted entirely
//! when a reply carries none.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes attached to server `error` replies.
///
/// Each variant corresponds to a specific failure condition. The server
/// sends these as `"SCREAMING_SNAKE_CASE"` strings (e.g.,
/// `"GAME_NOT_FOUND"`).
///
/// Use [`description()`](ErrorCode::description) for a human-readable
/// explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Game errors
    GameNotFound,
    NotYourTurn,
    IllegalMove,

    // Session errors
    NotInGame,

    // Validation errors
    InvalidMessage,

    // AI opponent errors
    AiUnavailable,

    // Server errors
    InternalError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    ///
    /// These are the messages clients surface as notifications when the
    /// server does not provide a more specific one.
    pub fn description(&self) -> &'static str {
        match self {
            // Game errors
            Self::GameNotFound => {
                "The requested game could not be found. It may have ended or the id is incorrect."
            }
            Self::NotYourTurn => {
                "It is not your turn to move. Wait for your opponent's move to be broadcast."
            }
            Self::IllegalMove => {
                "The move is not legal in the current position. Check the active board and the targeted cell."
            }

            // Session errors
            Self::NotInGame => {
                "This connection has not joined the game. Send join_game before any other message."
            }

            // Validation errors
            Self::InvalidMessage => {
                "The message could not be parsed. Check the type field and the payload shape."
            }

            // AI opponent errors
            Self::AiUnavailable => {
                "The computer opponent is temporarily unavailable. You can wait, retry, or reset the game."
            }

            // Server errors
            Self::InternalError => {
                "An internal server error occurred. Please try again or contact support if the issue persists."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
