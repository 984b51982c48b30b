//! The authoritative state machine for one game.
//!
//! A [`GameState`] owns seats, boards, turn, and winner for a single game
//! and is mutated only through validated operations. Server side, exactly
//! one task owns each instance (see [`crate::server`]), which is what makes
//! the legality checks here race-free. Clients never construct moves
//! against this type directly; they hold replicas built from snapshots.

use uuid::Uuid;

use crate::board::{GameWinner, GlobalBoard, Mark, Move};
use crate::error::{GameError, IllegalMoveReason};
use crate::protocol::{
    AiDifficulty, GameId, GameMode, GameStateSnapshot, ParticipantRole, UserId,
};

/// A seated player. Exactly two seats exist in two-human modes, one in
/// LOCAL/AI modes; watchers are counted, never seated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSeat {
    pub user_id: UserId,
    pub symbol: Mark,
}

/// Derived lifecycle phase of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    /// Not every seat is filled yet.
    WaitingForPlayers,
    /// All seats filled, no winner yet.
    InProgress,
    /// A winner (or tie) exists; only reset reopens the game.
    Finished,
}

/// What a join produced: the assigned role, the seat mark for players,
/// and whether an existing seat was restored (reconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub role: ParticipantRole,
    pub symbol: Option<Mark>,
    pub rejoined: bool,
}

/// Authoritative state of one game.
#[derive(Debug, Clone)]
pub struct GameState {
    id: GameId,
    mode: GameMode,
    ai_difficulty: Option<AiDifficulty>,
    global_board: GlobalBoard,
    active_board: Option<u8>,
    current_player: Mark,
    players: Vec<PlayerSeat>,
    watcher_count: u32,
    move_count: u32,
    winner: Option<GameWinner>,
}

impl GameState {
    /// Creates a fresh game: empty boards, free active board, X to move,
    /// no winner, no seats. The difficulty is kept only for AI games
    /// (defaulting to medium there) and passed through to every provider
    /// request.
    #[must_use]
    pub fn create(mode: GameMode, ai_difficulty: Option<AiDifficulty>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            ai_difficulty: matches!(mode, GameMode::Ai)
                .then(|| ai_difficulty.unwrap_or_default()),
            global_board: GlobalBoard::default(),
            active_board: None,
            current_player: Mark::X,
            players: Vec::new(),
            watcher_count: 0,
            move_count: 0,
            winner: None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    #[must_use]
    pub fn id(&self) -> GameId {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> GameMode {
        self.mode
    }

    #[must_use]
    pub fn ai_difficulty(&self) -> Option<AiDifficulty> {
        self.ai_difficulty
    }

    #[must_use]
    pub fn board(&self) -> &GlobalBoard {
        &self.global_board
    }

    #[must_use]
    pub fn active_board(&self) -> Option<u8> {
        self.active_board
    }

    #[must_use]
    pub fn current_player(&self) -> Mark {
        self.current_player
    }

    #[must_use]
    pub fn players(&self) -> &[PlayerSeat] {
        &self.players
    }

    #[must_use]
    pub fn watcher_count(&self) -> u32 {
        self.watcher_count
    }

    #[must_use]
    pub fn move_count(&self) -> u32 {
        self.move_count
    }

    #[must_use]
    pub fn winner(&self) -> Option<GameWinner> {
        self.winner
    }

    /// Lifecycle phase derived from seats and winner.
    #[must_use]
    pub fn phase(&self) -> GamePhase {
        if self.winner.is_some() {
            GamePhase::Finished
        } else if self.players.len() < self.mode.player_seats() {
            GamePhase::WaitingForPlayers
        } else {
            GamePhase::InProgress
        }
    }

    /// The wire snapshot of the current position.
    #[must_use]
    pub fn snapshot(&self) -> GameStateSnapshot {
        GameStateSnapshot {
            global_board: self.global_board,
            active_board: self.active_board,
            move_count: self.move_count,
            winner: self.winner,
            current_player: self.current_player,
        }
    }

    // ── Seats ───────────────────────────────────────────────────────

    /// Seats or re-seats `user_id`.
    ///
    /// The first joiner becomes PLAYER X, the second PLAYER O (in
    /// two-human modes), everyone after that a WATCHER. A user id
    /// matching an existing seat restores that seat instead of
    /// allocating a new one, which is what makes reconnects transparent.
    /// A full game is not an error; excess joiners silently watch.
    pub fn join(&mut self, user_id: &str) -> JoinOutcome {
        if let Some(seat) = self.players.iter().find(|p| p.user_id == user_id) {
            return JoinOutcome {
                role: ParticipantRole::Player,
                symbol: Some(seat.symbol),
                rejoined: true,
            };
        }
        if self.players.len() < self.mode.player_seats() {
            let symbol = if self.players.is_empty() {
                Mark::X
            } else {
                Mark::O
            };
            self.players.push(PlayerSeat {
                user_id: user_id.to_owned(),
                symbol,
            });
            return JoinOutcome {
                role: ParticipantRole::Player,
                symbol: Some(symbol),
                rejoined: false,
            };
        }
        JoinOutcome {
            role: ParticipantRole::Watcher,
            symbol: None,
            rejoined: false,
        }
    }

    /// The mark `user_id` may move with right now, or `None` for
    /// non-players. In LOCAL mode the single seat plays both marks, so
    /// it always moves as whichever mark is current.
    #[must_use]
    pub fn mover_symbol(&self, user_id: &str) -> Option<Mark> {
        let seat = self.players.iter().find(|p| p.user_id == user_id)?;
        match self.mode {
            GameMode::Local => Some(self.current_player),
            _ => Some(seat.symbol),
        }
    }

    // ── Watcher bookkeeping ─────────────────────────────────────────

    /// Counts one more watcher and returns the new count.
    pub fn add_watcher(&mut self) -> u32 {
        self.watcher_count += 1;
        self.watcher_count
    }

    /// Counts one watcher out (saturating) and returns the new count.
    pub fn remove_watcher(&mut self) -> u32 {
        self.watcher_count = self.watcher_count.saturating_sub(1);
        self.watcher_count
    }

    // ── Moves ───────────────────────────────────────────────────────

    /// Validates and applies a move submitted by `user_id`.
    ///
    /// Fails with [`GameError::NotYourTurn`] when the mover does not hold
    /// the current mark (or holds no seat at all), and with
    /// [`GameError::IllegalMove`] when the move violates any legality
    /// rule. On success the cell is marked, the move count incremented,
    /// both board levels re-resolved, the next active board derived from
    /// the played local index (free if that board is now resolved), the
    /// turn flipped (immaterial once a winner exists), and the new
    /// snapshot returned.
    pub fn apply_move(&mut self, user_id: &str, mv: Move) -> Result<GameStateSnapshot, GameError> {
        let symbol = self
            .mover_symbol(user_id)
            .ok_or(GameError::NotYourTurn)?;
        self.apply_move_as(symbol, mv)
    }

    /// Validates and applies a move for `symbol` directly.
    ///
    /// Provider-submitted moves go through here and get exactly the same
    /// checks as human moves; a misbehaving provider cannot corrupt the
    /// game.
    pub fn apply_move_as(
        &mut self,
        symbol: Mark,
        mv: Move,
    ) -> Result<GameStateSnapshot, GameError> {
        if self.winner.is_some() {
            return Err(IllegalMoveReason::GameFinished.into());
        }
        if symbol != self.current_player {
            return Err(GameError::NotYourTurn);
        }
        if let Some(active) = self.active_board {
            if active != mv.global_board_index {
                return Err(IllegalMoveReason::WrongBoard.into());
            }
        }
        self.global_board.place(mv, symbol)?;
        self.move_count += 1;
        self.winner = self.global_board.resolve();
        self.active_board = self
            .global_board
            .is_open(usize::from(mv.local_board_index))
            .then_some(mv.local_board_index);
        if self.winner.is_none() {
            self.current_player = self.current_player.other();
        }
        Ok(self.snapshot())
    }

    /// Every move currently legal; empty once the game is finished.
    #[must_use]
    pub fn legal_moves(&self) -> Vec<Move> {
        if self.winner.is_some() {
            return Vec::new();
        }
        self.global_board.legal_moves(self.active_board)
    }

    // ── AI seat ─────────────────────────────────────────────────────

    /// The provider-controlled mark in AI games. Always O: the human seat
    /// joins first and X always starts.
    #[must_use]
    pub fn ai_symbol(&self) -> Option<Mark> {
        matches!(self.mode, GameMode::Ai).then_some(Mark::O)
    }

    /// True when the game is waiting on a provider move.
    #[must_use]
    pub fn awaiting_ai_move(&self) -> bool {
        self.winner.is_none() && self.ai_symbol() == Some(self.current_player)
    }

    // ── Reset ───────────────────────────────────────────────────────

    /// Reinitializes boards, turn, winner, and move count, preserving id,
    /// seats, mode, and watcher count. Returns the fresh snapshot.
    pub fn reset(&mut self) -> GameStateSnapshot {
        self.global_board = GlobalBoard::default();
        self.active_board = None;
        self.current_player = Mark::X;
        self.move_count = 0;
        self.winner = None;
        self.snapshot()
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

    fn remote_pair() -> GameState {
        let mut game = GameState::create(GameMode::Remote, None);
        game.join("alice");
        game.join("bob");
        game
    }

    /// Applies the given (global, local) moves, each submitted by the
    /// seat whose turn it is, asserting every one is accepted.
    fn drive(game: &mut GameState, moves: &[(u8, u8)]) {
        for &(global, local) in moves {
            let mover = if game.current_player() == Mark::X {
                "alice"
            } else {
                "bob"
            };
            game.apply_move(mover, Move::new(global, local))
                .unwrap_or_else(|e| panic!("move ({global},{local}) rejected: {e}"));
        }
    }

    /// A legal sequence in which X wins small boards 0, 1, and 2 (the top
    /// meta-row) while O wins boards 3 and 4 along the way.
    const X_WINS_TOP_ROW: [(u8, u8); 17] = [
        (0, 3),
        (3, 0),
        (0, 4),
        (4, 0),
        (0, 5),
        (5, 1),
        (1, 3),
        (3, 1),
        (1, 4),
        (4, 1),
        (1, 5),
        (5, 2),
        (2, 3),
        (3, 2),
        (2, 4),
        (4, 2),
        (2, 5),
    ];

    #[test]
    fn create_opens_with_x_to_move_on_a_free_board() {
        let game = GameState::create(GameMode::Remote, None);
        assert_eq!(game.current_player(), Mark::X);
        assert_eq!(game.active_board(), None);
        assert_eq!(game.winner(), None);
        assert_eq!(game.move_count(), 0);
        assert!(game.players().is_empty());
        assert_eq!(game.phase(), GamePhase::WaitingForPlayers);
        assert_eq!(game.legal_moves().len(), 81);
    }

    #[test]
    fn difficulty_is_kept_for_ai_games_only() {
        let ai = GameState::create(GameMode::Ai, Some(AiDifficulty::Hard));
        assert_eq!(ai.ai_difficulty(), Some(AiDifficulty::Hard));
        let ai_default = GameState::create(GameMode::Ai, None);
        assert_eq!(ai_default.ai_difficulty(), Some(AiDifficulty::Medium));
        let remote = GameState::create(GameMode::Remote, Some(AiDifficulty::Hard));
        assert_eq!(remote.ai_difficulty(), None);
    }

    #[test]
    fn first_two_joiners_are_seated_then_everyone_watches() {
        let mut game = GameState::create(GameMode::Remote, None);
        let first = game.join("alice");
        assert_eq!(first.role, ParticipantRole::Player);
        assert_eq!(first.symbol, Some(Mark::X));
        assert!(!first.rejoined);

        let second = game.join("bob");
        assert_eq!(second.symbol, Some(Mark::O));
        assert_eq!(game.phase(), GamePhase::InProgress);

        let third = game.join("carol");
        assert_eq!(third.role, ParticipantRole::Watcher);
        assert_eq!(third.symbol, None);
        assert_eq!(game.players().len(), 2);
    }

    #[test]
    fn rejoining_restores_the_existing_seat() {
        let mut game = remote_pair();
        let back = game.join("alice");
        assert!(back.rejoined);
        assert_eq!(back.symbol, Some(Mark::X));
        assert_eq!(game.players().len(), 2);
    }

    #[test]
    fn ai_mode_seats_one_human() {
        let mut game = GameState::create(GameMode::Ai, None);
        assert_eq!(game.join("alice").symbol, Some(Mark::X));
        assert_eq!(game.phase(), GamePhase::InProgress);
        assert_eq!(game.join("bob").role, ParticipantRole::Watcher);
        assert_eq!(game.ai_symbol(), Some(Mark::O));
    }

    #[test]
    fn local_mode_single_seat_plays_both_marks() {
        let mut game = GameState::create(GameMode::Local, None);
        game.join("alice");
        assert_eq!(game.phase(), GamePhase::InProgress);
        game.apply_move("alice", Move::new(4, 4)).unwrap();
        assert_eq!(game.current_player(), Mark::O);
        game.apply_move("alice", Move::new(4, 0)).unwrap();
        assert_eq!(game.current_player(), Mark::X);
        assert_eq!(game.move_count(), 2);
    }

    #[test]
    fn moving_out_of_turn_is_rejected_without_state_change() {
        let mut game = remote_pair();
        let before = game.snapshot();
        assert_eq!(
            game.apply_move("bob", Move::new(4, 4)),
            Err(GameError::NotYourTurn)
        );
        assert_eq!(game.snapshot(), before);
    }

    #[test]
    fn watchers_have_no_move_rights() {
        let mut game = remote_pair();
        game.join("carol");
        assert_eq!(
            game.apply_move("carol", Move::new(4, 4)),
            Err(GameError::NotYourTurn)
        );
    }

    #[test]
    fn center_opening_forwards_to_the_center_board() {
        // Scenario: X plays (4,4) on an empty board.
        let mut game = remote_pair();
        game.apply_move("alice", Move::new(4, 4)).unwrap();
        assert_eq!(game.active_board(), Some(4));
        assert_eq!(game.current_player(), Mark::O);
        assert_eq!(game.move_count(), 1);
    }

    #[test]
    fn moves_outside_the_active_board_are_rejected() {
        let mut game = remote_pair();
        game.apply_move("alice", Move::new(4, 4)).unwrap();
        assert_eq!(
            game.apply_move("bob", Move::new(0, 0)),
            Err(GameError::IllegalMove(IllegalMoveReason::WrongBoard))
        );
        // The rejection consumed nothing: still O to move in board 4.
        assert_eq!(game.current_player(), Mark::O);
        game.apply_move("bob", Move::new(4, 0)).unwrap();
    }

    #[test]
    fn replaying_the_same_move_is_rejected_as_occupied() {
        let mut game = remote_pair();
        let mv = Move::new(4, 4);
        game.apply_move("alice", mv).unwrap();
        assert_eq!(
            game.apply_move("bob", mv),
            Err(GameError::IllegalMove(IllegalMoveReason::CellOccupied))
        );
        assert_eq!(game.move_count(), 1);
    }

    #[test]
    fn out_of_range_indexes_are_rejected() {
        let mut game = remote_pair();
        assert_eq!(
            game.apply_move("alice", Move::new(9, 0)),
            Err(GameError::IllegalMove(IllegalMoveReason::OutOfRange))
        );
        assert_eq!(
            game.apply_move("alice", Move::new(0, 9)),
            Err(GameError::IllegalMove(IllegalMoveReason::OutOfRange))
        );
    }

    #[test]
    fn turn_flips_exactly_once_per_accepted_move() {
        let mut game = remote_pair();
        assert_eq!(game.current_player(), Mark::X);
        game.apply_move("alice", Move::new(4, 4)).unwrap();
        assert_eq!(game.current_player(), Mark::O);
        // A rejected move leaves the turn untouched.
        let _ = game.apply_move("bob", Move::new(8, 8));
        assert_eq!(game.current_player(), Mark::O);
        game.apply_move("bob", Move::new(4, 0)).unwrap();
        assert_eq!(game.current_player(), Mark::X);
    }

    #[test]
    fn forwarding_into_a_resolved_board_frees_the_choice() {
        let mut game = remote_pair();
        // X wins board 0, then O's reply at local 0 points at the now
        // resolved board 0, so the constraint lifts.
        drive(&mut game, &[(0, 3), (3, 0), (0, 4), (4, 0), (0, 5)]);
        assert!(!game.board().is_open(0));
        assert_eq!(game.active_board(), Some(5));
        drive(&mut game, &[(5, 0)]);
        assert_eq!(game.active_board(), None);
        // Any open board is legal now, but board 0 stays closed.
        assert_eq!(
            game.apply_move("alice", Move::new(0, 8)),
            Err(GameError::IllegalMove(IllegalMoveReason::BoardResolved))
        );
        drive(&mut game, &[(8, 8)]);
    }

    #[test]
    fn winning_the_top_meta_row_finishes_the_game() {
        let mut game = remote_pair();
        drive(&mut game, &X_WINS_TOP_ROW);
        assert_eq!(game.winner(), Some(GameWinner::X));
        assert_eq!(game.phase(), GamePhase::Finished);
        assert_eq!(game.move_count(), 17);
        assert!(game.legal_moves().is_empty());
        assert_eq!(
            game.apply_move("bob", Move::new(8, 8)),
            Err(GameError::IllegalMove(IllegalMoveReason::GameFinished))
        );
    }

    #[test]
    fn reset_reopens_the_game_but_keeps_identity_and_seats() {
        let mut game = remote_pair();
        let id = game.id();
        drive(&mut game, &X_WINS_TOP_ROW);
        assert_eq!(game.phase(), GamePhase::Finished);

        let snapshot = game.reset();
        assert_eq!(game.id(), id);
        assert_eq!(game.players().len(), 2);
        assert_eq!(game.mode(), GameMode::Remote);
        assert_eq!(game.phase(), GamePhase::InProgress);
        assert_eq!(snapshot.move_count, 0);
        assert_eq!(snapshot.winner, None);
        assert_eq!(snapshot.active_board, None);
        assert_eq!(snapshot.current_player, Mark::X);
        game.apply_move("alice", Move::new(4, 4)).unwrap();
    }

    #[test]
    fn watcher_count_tracks_and_saturates() {
        let mut game = remote_pair();
        assert_eq!(game.add_watcher(), 1);
        assert_eq!(game.add_watcher(), 2);
        assert_eq!(game.remove_watcher(), 1);
        assert_eq!(game.remove_watcher(), 0);
        assert_eq!(game.remove_watcher(), 0);
    }

    #[test]
    fn snapshots_match_the_live_state() {
        let mut game = remote_pair();
        drive(&mut game, &[(4, 4), (4, 0)]);
        let snapshot = game.snapshot();
        assert_eq!(snapshot.move_count, 2);
        assert_eq!(snapshot.active_board, Some(0));
        assert_eq!(snapshot.current_player, Mark::X);
        assert_eq!(snapshot.global_board, *game.board());
    }
}
