//! Events delivered to the application.
//!
//! [`SupertacEvent`] is the client's outward-facing vocabulary: one variant
//! per server broadcast, plus connection lifecycle. The client applies each
//! incoming message to its [`GameStore`](crate::store::GameStore) first and
//! emits the event after, so by the time the application sees an event the
//! store already reflects it.

use crate::board::Mark;
use crate::error_codes::ErrorCode;
use crate::protocol::{GameStateSnapshot, ParticipantRole, ServerMessage, UserId};

/// A state change observed by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SupertacEvent {
    /// The transport loop is running and the join request is on the wire.
    /// Always the first event on the channel.
    Connected,
    /// Someone joined the game. Carries a snapshot when the join was our
    /// own (the server's welcome), `None` for third-party notifications.
    PlayerJoined {
        user_id: UserId,
        symbol: Option<Mark>,
        status: ParticipantRole,
        watchers_count: u32,
        game_state: Option<GameStateSnapshot>,
    },
    /// A move was accepted; `user_id` is the mover.
    GameUpdated {
        user_id: UserId,
        game_state: GameStateSnapshot,
    },
    /// The watcher count changed.
    WatchersUpdated { watchers_count: u32 },
    /// The server rejected one of our messages.
    ServerError {
        message: String,
        error_code: Option<ErrorCode>,
    },
    /// The transport closed or failed; no further events will follow.
    /// `reason` is `None` for a clean server-side close.
    Disconnected { reason: Option<String> },
}

impl From<ServerMessage> for SupertacEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::PlayerJoined(payload) => Self::PlayerJoined {
                user_id: payload.user_id,
                symbol: payload.symbol,
                status: payload.status,
                watchers_count: payload.watchers_count,
                game_state: payload.game_state,
            },
            ServerMessage::GameUpdate {
                user_id,
                game_state,
            } => Self::GameUpdated {
                user_id,
                game_state,
            },
            ServerMessage::WatchersUpdate { watchers_count } => {
                Self::WatchersUpdated { watchers_count }
            }
            ServerMessage::Error {
                message,
                error_code,
            } => Self::ServerError {
                message,
                error_code,
            },
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
    use crate::protocol::PlayerJoinedPayload;

    #[test]
    fn join_broadcasts_unbox_into_events() {
        let event: SupertacEvent = ServerMessage::PlayerJoined(Box::new(PlayerJoinedPayload {
            user_id: "alice".into(),
            symbol: Some(Mark::X),
            status: ParticipantRole::Player,
            watchers_count: 2,
            game_state: None,
        }))
        .into();

        match event {
            SupertacEvent::PlayerJoined {
                user_id,
                symbol,
                status,
                watchers_count,
                game_state,
            } => {
                assert_eq!(user_id, "alice");
                assert_eq!(symbol, Some(Mark::X));
                assert_eq!(status, ParticipantRole::Player);
                assert_eq!(watchers_count, 2);
                assert!(game_state.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn errors_keep_their_code() {
        let event: SupertacEvent = ServerMessage::Error {
            message: "game not found".into(),
            error_code: Some(ErrorCode::GameNotFound),
        }
        .into();

        match event {
            SupertacEvent::ServerError {
                message,
                error_code,
            } => {
                assert_eq!(message, "game not found");
                assert_eq!(error_code, Some(ErrorCode::GameNotFound));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
