//! Directory of live games.
//!
//! The registry maps game ids to session handles. Creation spawns a
//! session task; sessions remove themselves when they reap, so a missing
//! entry always means "never existed or already closed".

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::info;

use crate::ai::MoveProvider;
use crate::game::GameState;
use crate::protocol::{
    AiDifficulty, CreateGameResponse, GameId, GameMode, ResetResponse, UserId,
};
use crate::server::session::{self, GameCommand, GameHandle};

/// Shared directory of live games. Cloning is cheap; all clones see the
/// same games.
#[derive(Clone)]
pub struct GameRegistry {
    games: Arc<Mutex<HashMap<GameId, GameHandle>>>,
    provider: Arc<dyn MoveProvider>,
    reconnect_grace: Duration,
}

impl GameRegistry {
    /// Creates an empty registry. `provider` serves every AI game;
    /// `reconnect_grace` is how long a game survives without a player
    /// connection.
    #[must_use]
    pub fn new(provider: Arc<dyn MoveProvider>, reconnect_grace: Duration) -> Self {
        Self {
            games: Arc::new(Mutex::new(HashMap::new())),
            provider,
            reconnect_grace,
        }
    }

    /// Creates a game and spawns its session task. The difficulty is
    /// only meaningful for [`GameMode::Ai`].
    pub async fn create_game(
        &self,
        mode: GameMode,
        ai_difficulty: Option<AiDifficulty>,
    ) -> CreateGameResponse {
        let game = GameState::create(mode, ai_difficulty);
        let game_id = game.id();
        let handle = session::spawn(
            game,
            Arc::clone(&self.provider),
            self.reconnect_grace,
            self.clone(),
        );
        self.games.lock().await.insert(game_id, handle);
        info!(game_id = %game_id, ?mode, "game created");
        CreateGameResponse { game_id, mode }
    }

    /// Looks up the session handle for a live game.
    pub async fn handle(&self, game_id: &GameId) -> Option<GameHandle> {
        self.games.lock().await.get(game_id).cloned()
    }

    /// Resets a game on behalf of `user_id` through the management API.
    /// Fails when the game is unknown or the user holds no seat; the
    /// reset itself is broadcast to the game's connections as usual.
    pub async fn reset_game(&self, game_id: &GameId, user_id: UserId) -> ResetResponse {
        let Some(handle) = self.handle(game_id).await else {
            return ResetResponse {
                success: false,
                message: Some("game not found".to_owned()),
            };
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if !handle.send(GameCommand::ManagementReset {
            user_id,
            reply: reply_tx,
        }) {
            // The session closed between lookup and send.
            return ResetResponse {
                success: false,
                message: Some("game not found".to_owned()),
            };
        }
        match reply_rx.await {
            Ok(true) => ResetResponse {
                success: true,
                message: None,
            },
            Ok(false) => ResetResponse {
                success: false,
                message: Some("only a seated player can reset the game".to_owned()),
            },
            Err(_) => ResetResponse {
                success: false,
                message: Some("game not found".to_owned()),
            },
        }
    }

    /// Number of live games.
    pub async fn game_count(&self) -> usize {
        self.games.lock().await.len()
    }

    /// Drops a game's entry. Called by the session task as it exits.
    pub(crate) async fn remove(&self, game_id: &GameId) {
        self.games.lock().await.remove(game_id);
    }
}

impl fmt::Debug for GameRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameRegistry")
            .field("reconnect_grace", &self.reconnect_grace)
            .finish_non_exhaustive()
    }
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

    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use uuid::Uuid;

    use crate::ai::RandomMoveProvider;
    use crate::protocol::ServerMessage;

    fn registry() -> GameRegistry {
        GameRegistry::new(Arc::new(RandomMoveProvider), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn created_games_are_listed_until_removed() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        assert_eq!(created.mode, GameMode::Remote);
        assert_eq!(registry.game_count().await, 1);
        assert!(registry.handle(&created.game_id).await.is_some());

        registry.remove(&created.game_id).await;
        assert_eq!(registry.game_count().await, 0);
        assert!(registry.handle(&created.game_id).await.is_none());
    }

    #[tokio::test]
    async fn unknown_games_cannot_be_reset() {
        let registry = registry();
        let response = registry.reset_game(&Uuid::new_v4(), "alice".to_owned()).await;
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("game not found"));
    }

    #[tokio::test]
    async fn management_reset_needs_a_seated_user() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let (tx, mut alice) = mpsc::unbounded_channel();
        assert!(handle.send(GameCommand::Attach {
            conn_id: 1,
            user_id: "alice".to_owned(),
            outbound: tx,
        }));
        let welcome = timeout(Duration::from_secs(2), alice.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(welcome, ServerMessage::PlayerJoined(_)));

        let denied = registry
            .reset_game(&created.game_id, "stranger".to_owned())
            .await;
        assert!(!denied.success);
        assert!(denied.message.is_some());

        let granted = registry
            .reset_game(&created.game_id, "alice".to_owned())
            .await;
        assert!(granted.success);
        assert!(granted.message.is_none());

        let update = timeout(Duration::from_secs(2), alice.recv())
            .await
            .unwrap()
            .unwrap();
        match update {
            ServerMessage::GameUpdate {
                user_id,
                game_state,
            } => {
                assert_eq!(user_id, "alice");
                assert_eq!(game_state.move_count, 0);
            }
            other => panic!("expected game_update, got {other:?}"),
        }
    }
}
