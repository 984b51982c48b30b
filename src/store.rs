//! Client-side reconciliation store.
//!
//! Replicas of authoritative game state, keyed by game id and assembled
//! purely from server broadcasts. Each message tag has exactly one reducer
//! that replaces the state slices it owns and leaves everything else
//! untouched. Applying broadcasts last-write-wins in arrival order is safe
//! because the server totally orders them per game; the store itself never
//! reorders or invents state.

use std::collections::HashMap;

use crate::game::PlayerSeat;
use crate::protocol::{GameId, GameStateSnapshot, ParticipantRole, ServerMessage};

/// One game's replica as assembled from broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameView {
    /// Last authoritative snapshot. Starts as the empty opening position
    /// until the first snapshot-carrying message arrives.
    pub state: GameStateSnapshot,
    /// Seated players seen so far, deduplicated by user id.
    pub players: Vec<PlayerSeat>,
    pub watchers_count: u32,
}

/// Replica cache for every game this client observes.
#[derive(Debug, Clone, Default)]
pub struct GameStore {
    games: HashMap<GameId, GameView>,
}

impl GameStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The replica for `game_id`, if any message has created it yet.
    #[must_use]
    pub fn game(&self, game_id: &GameId) -> Option<&GameView> {
        self.games.get(game_id)
    }

    /// Number of games tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.games.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Drops the replica for `game_id`, e.g. after the server reported
    /// the game gone and the application navigated away.
    pub fn remove(&mut self, game_id: &GameId) -> Option<GameView> {
        self.games.remove(game_id)
    }

    /// Applies one server message to the replica for `game_id`.
    ///
    /// Messages for an unknown game lazily create a default entry first,
    /// so a snapshot that races ahead of local initialization is never
    /// dropped.
    pub fn apply(&mut self, game_id: GameId, message: &ServerMessage) {
        let view = self.games.entry(game_id).or_default();
        match message {
            ServerMessage::PlayerJoined(payload) => {
                if let Some(snapshot) = payload.game_state {
                    view.state = snapshot;
                }
                view.watchers_count = payload.watchers_count;
                // Only seated players enter the list; watchers are a count.
                if payload.status == ParticipantRole::Player {
                    if let Some(symbol) = payload.symbol {
                        match view
                            .players
                            .iter_mut()
                            .find(|p| p.user_id == payload.user_id)
                        {
                            Some(existing) => existing.symbol = symbol,
                            None => view.players.push(PlayerSeat {
                                user_id: payload.user_id.clone(),
                                symbol,
                            }),
                        }
                    }
                }
            }
            ServerMessage::GameUpdate { game_state, .. } => {
                view.state = *game_state;
            }
            ServerMessage::WatchersUpdate { watchers_count } => {
                view.watchers_count = *watchers_count;
            }
            // Errors are connection-scoped and carry no state.
            ServerMessage::Error { .. } => {}
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
    use crate::board::{Mark, Move};
    use crate::game::GameState;
    use crate::protocol::{GameMode, PlayerJoinedPayload};
    use uuid::Uuid;

    fn joined(user: &str, symbol: Option<Mark>, watchers: u32) -> ServerMessage {
        ServerMessage::PlayerJoined(Box::new(PlayerJoinedPayload {
            user_id: user.to_owned(),
            symbol,
            status: if symbol.is_some() {
                ParticipantRole::Player
            } else {
                ParticipantRole::Watcher
            },
            watchers_count: watchers,
            game_state: None,
        }))
    }

    fn snapshot_after_center_move() -> GameStateSnapshot {
        let mut game = GameState::create(GameMode::Remote, None);
        game.join("alice");
        game.join("bob");
        game.apply_move("alice", Move::new(4, 4)).unwrap()
    }

    #[test]
    fn unknown_games_get_a_default_entry_lazily() {
        let mut store = GameStore::new();
        let id = Uuid::new_v4();
        assert!(store.game(&id).is_none());

        store.apply(id, &ServerMessage::WatchersUpdate { watchers_count: 3 });
        let view = store.game(&id).unwrap();
        assert_eq!(view.watchers_count, 3);
        assert_eq!(view.state, GameStateSnapshot::default());
        assert_eq!(view.state.current_player, Mark::X);
    }

    #[test]
    fn game_update_replaces_state_but_not_watchers() {
        let mut store = GameStore::new();
        let id = Uuid::new_v4();
        store.apply(id, &ServerMessage::WatchersUpdate { watchers_count: 2 });

        let snapshot = snapshot_after_center_move();
        store.apply(
            id,
            &ServerMessage::GameUpdate {
                user_id: "alice".into(),
                game_state: snapshot,
            },
        );

        let view = store.game(&id).unwrap();
        assert_eq!(view.state, snapshot);
        assert_eq!(view.state.move_count, 1);
        assert_eq!(view.watchers_count, 2);
    }

    #[test]
    fn join_snapshot_replaces_state_and_seats_the_player() {
        let mut store = GameStore::new();
        let id = Uuid::new_v4();
        let snapshot = snapshot_after_center_move();

        store.apply(
            id,
            &ServerMessage::PlayerJoined(Box::new(PlayerJoinedPayload {
                user_id: "alice".into(),
                symbol: Some(Mark::X),
                status: ParticipantRole::Player,
                watchers_count: 0,
                game_state: Some(snapshot),
            })),
        );

        let view = store.game(&id).unwrap();
        assert_eq!(view.state, snapshot);
        assert_eq!(view.players.len(), 1);
        assert_eq!(view.players[0].user_id, "alice");
        assert_eq!(view.players[0].symbol, Mark::X);
    }

    #[test]
    fn light_join_notification_leaves_the_board_alone() {
        let mut store = GameStore::new();
        let id = Uuid::new_v4();
        let snapshot = snapshot_after_center_move();
        store.apply(
            id,
            &ServerMessage::GameUpdate {
                user_id: "alice".into(),
                game_state: snapshot,
            },
        );

        store.apply(id, &joined("bob", Some(Mark::O), 0));
        let view = store.game(&id).unwrap();
        assert_eq!(view.state, snapshot);
        assert_eq!(view.players.len(), 1);
        assert_eq!(view.players[0].user_id, "bob");
    }

    #[test]
    fn rejoins_do_not_duplicate_seats() {
        let mut store = GameStore::new();
        let id = Uuid::new_v4();
        store.apply(id, &joined("alice", Some(Mark::X), 0));
        store.apply(id, &joined("bob", Some(Mark::O), 0));
        store.apply(id, &joined("alice", Some(Mark::X), 0));

        let view = store.game(&id).unwrap();
        assert_eq!(view.players.len(), 2);
    }

    #[test]
    fn watcher_joins_count_but_never_seat() {
        let mut store = GameStore::new();
        let id = Uuid::new_v4();
        store.apply(id, &joined("carol", None, 1));

        let view = store.game(&id).unwrap();
        assert!(view.players.is_empty());
        assert_eq!(view.watchers_count, 1);
    }

    #[test]
    fn errors_change_nothing() {
        let mut store = GameStore::new();
        let id = Uuid::new_v4();
        store.apply(id, &ServerMessage::WatchersUpdate { watchers_count: 1 });
        let before = store.game(&id).unwrap().clone();

        store.apply(
            id,
            &ServerMessage::Error {
                message: "not your turn".into(),
                error_code: None,
            },
        );
        assert_eq!(store.game(&id).unwrap(), &before);
    }

    #[test]
    fn distinct_games_do_not_interfere() {
        let mut store = GameStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.apply(a, &ServerMessage::WatchersUpdate { watchers_count: 5 });
        store.apply(b, &ServerMessage::WatchersUpdate { watchers_count: 9 });
        assert_eq!(store.game(&a).unwrap().watchers_count, 5);
        assert_eq!(store.game(&b).unwrap().watchers_count, 9);
        assert_eq!(store.len(), 2);
        store.remove(&a);
        assert!(store.game(&a).is_none());
        assert!(store.game(&b).is_some());
    }
}
