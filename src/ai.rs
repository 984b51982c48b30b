//! Pluggable move providers for AI-mode games.
//!
//! A [`MoveProvider`] is asked for a move whenever it is the provider's turn
//! in an AI game. Providers are advisory: the returned move goes through the
//! same validation as a human submission, so a buggy provider can be rejected
//! but never corrupt a game. The difficulty tier configured at game creation
//! is passed to every request unchanged.

use async_trait::async_trait;
use thiserror::Error;

use crate::board::Move;
use crate::protocol::{AiDifficulty, GameStateSnapshot};

/// Why a provider could not produce a move.
#[derive(Debug, Error)]
pub enum MoveProviderError {
    /// The position has no legal moves left.
    #[error("no legal moves available")]
    NoLegalMoves,
    /// The provider backend failed (HTTP endpoint, engine subprocess, ...).
    #[error("move provider failed: {0}")]
    Backend(String),
}

/// Source of moves for the non-human seat in AI games.
///
/// Implementations wrap whatever actually picks moves — a remote inference
/// endpoint, a local engine, or the baseline [`RandomMoveProvider`]. The
/// server retries a failing provider a bounded number of times and then
/// leaves the game waiting on the AI turn rather than guessing.
#[async_trait]
pub trait MoveProvider: Send + Sync + 'static {
    /// Pick a move for the side to play in `state`.
    ///
    /// `state.active_board` carries the forwarding constraint; a legal
    /// response plays in that board when it is `Some`.
    ///
    /// # Errors
    ///
    /// Returns [`MoveProviderError`] when no move can be produced. The
    /// server treats this as transient and retries.
    async fn provide(
        &self,
        state: &GameStateSnapshot,
        difficulty: AiDifficulty,
    ) -> Result<Move, MoveProviderError>;
}

/// Baseline provider: a uniformly random legal move.
///
/// Ignores the difficulty tier. Useful as the default opponent and in
/// tests; real deployments plug in their own [`MoveProvider`].
#[cfg(feature = "server")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomMoveProvider;

#[cfg(feature = "server")]
#[async_trait]
impl MoveProvider for RandomMoveProvider {
    async fn provide(
        &self,
        state: &GameStateSnapshot,
        _difficulty: AiDifficulty,
    ) -> Result<Move, MoveProviderError> {
        use rand::seq::SliceRandom;

        let moves = state.global_board.legal_moves(state.active_board);
        moves
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or(MoveProviderError::NoLegalMoves)
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
    use std::sync::{Arc, Mutex};

    /// Provider that replays a fixed move and records the difficulty it saw.
    struct FixedProvider {
        mv: Move,
        seen: Arc<Mutex<Vec<AiDifficulty>>>,
    }

    #[async_trait]
    impl MoveProvider for FixedProvider {
        async fn provide(
            &self,
            _state: &GameStateSnapshot,
            difficulty: AiDifficulty,
        ) -> Result<Move, MoveProviderError> {
            self.seen.lock().unwrap().push(difficulty);
            Ok(self.mv)
        }
    }

    #[tokio::test]
    async fn configured_difficulty_reaches_the_provider() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider: Arc<dyn MoveProvider> = Arc::new(FixedProvider {
            mv: Move::new(4, 4),
            seen: Arc::clone(&seen),
        });

        let state = GameStateSnapshot::default();
        let mv = provider.provide(&state, AiDifficulty::Hard).await.unwrap();
        assert_eq!(mv, Move::new(4, 4));
        assert_eq!(*seen.lock().unwrap(), vec![AiDifficulty::Hard]);
    }

    #[cfg(feature = "server")]
    mod random_provider {
        use super::*;
        use crate::board::{Cell, GlobalBoard, Mark, SmallBoard};

        #[tokio::test]
        async fn picks_a_legal_move_in_the_active_board() {
            let state = GameStateSnapshot {
                active_board: Some(4),
                ..GameStateSnapshot::default()
            };

            for _ in 0..20 {
                let mv = RandomMoveProvider
                    .provide(&state, AiDifficulty::Medium)
                    .await
                    .unwrap();
                assert_eq!(mv.global_board_index, 4);
            }
        }

        #[tokio::test]
        async fn free_choice_spans_open_boards() {
            let mv = RandomMoveProvider
                .provide(&GameStateSnapshot::default(), AiDifficulty::Easy)
                .await
                .unwrap();
            assert!(mv.global_board_index < 9);
            assert!(mv.local_board_index < 9);
        }

        #[tokio::test]
        async fn exhausted_position_yields_no_legal_moves() {
            // A full small board with no three-in-a-row.
            let x = Some(Mark::X);
            let o = Some(Mark::O);
            let drawn: [Cell; 9] = [x, x, o, o, o, x, x, o, x];
            let state = GameStateSnapshot {
                global_board: GlobalBoard::from_boards([SmallBoard::from_cells(drawn); 9]),
                ..GameStateSnapshot::default()
            };

            let err = RandomMoveProvider
                .provide(&state, AiDifficulty::Medium)
                .await
                .unwrap_err();
            assert!(matches!(err, MoveProviderError::NoLegalMoves));
        }
    }
}
