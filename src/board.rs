//! Board model for the two-tier grid: nine small 3x3 boards arranged on a
//! 3x3 meta-board.
//!
//! Everything here is pure data plus resolution algorithms. No I/O, no
//! turn-keeping; the [`crate::game`] module layers turn and seat rules on
//! top. Serde shapes match the wire exactly: a board serializes as its raw
//! cell arrays, a [`Mark`] as `"X"`/`"O"`, and an empty cell as `null`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IllegalMoveReason;

// ── Marks and cells ─────────────────────────────────────────────────

/// A player mark. X always moves first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Mark {
    #[default]
    X,
    O,
}

impl Mark {
    /// The opposing mark.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("X"),
            Self::O => f.write_str("O"),
        }
    }
}

/// One grid position: a mark, or empty.
pub type Cell = Option<Mark>;

// ── Line detection ──────────────────────────────────────────────────

/// Checks the 8 standard three-in-a-row patterns (3 rows, 3 columns,
/// 2 diagonals) over a row-major 9-element sequence.
///
/// Returns the repeated mark if all three cells of any pattern hold the
/// same non-empty value, else `None`. Used identically for a small board's
/// cells and for the meta-sequence of small-board winners.
#[must_use]
pub fn line_winner(cells: &[Cell; 9]) -> Cell {
    let [a, b, c, d, e, f, g, h, i] = *cells;
    let lines = [
        [a, b, c],
        [d, e, f],
        [g, h, i],
        [a, d, g],
        [b, e, h],
        [c, f, i],
        [a, e, i],
        [c, e, g],
    ];
    lines.iter().find_map(|line| match line {
        [Some(x), Some(y), Some(z)] if x == y && y == z => Some(*x),
        _ => None,
    })
}

/// True iff no empty entries remain in the sequence.
#[must_use]
pub fn is_full(cells: &[Cell; 9]) -> bool {
    cells.iter().all(Option::is_some)
}

// ── Small board ─────────────────────────────────────────────────────

/// Resolution status of a single small board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallBoardStatus {
    /// Playable: no winning line yet and at least one empty cell.
    Open,
    /// Won by a line of the given mark. No further marks may be placed.
    Won(Mark),
    /// Full with no winning line. Counts as neither mark on the meta-board.
    Drawn,
}

impl SmallBoardStatus {
    /// True for `Won` and `Drawn`; a resolved board accepts no more marks.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Open)
    }

    /// The mark this board contributes to the meta-sequence, if any.
    /// Drawn and open boards both contribute `None`.
    #[must_use]
    pub fn winner(self) -> Cell {
        match self {
            Self::Won(mark) => Some(mark),
            Self::Open | Self::Drawn => None,
        }
    }
}

/// One 3x3 tic-tac-toe board, cells indexed 0-8 row-major.
///
/// Serializes transparently as its 9-element cell array.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct SmallBoard {
    cells: [Cell; 9],
}

impl SmallBoard {
    /// Builds a board from explicit cells.
    #[must_use]
    pub fn from_cells(cells: [Cell; 9]) -> Self {
        Self { cells }
    }

    /// The raw cells, row-major.
    #[must_use]
    pub fn cells(&self) -> &[Cell; 9] {
        &self.cells
    }

    /// The cell at `index`, or `None` when the index is out of range.
    #[must_use]
    pub fn cell(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// Resolves the board: winning line first; if none and the board is
    /// full, drawn; otherwise open.
    #[must_use]
    pub fn resolve(&self) -> SmallBoardStatus {
        if let Some(mark) = line_winner(&self.cells) {
            return SmallBoardStatus::Won(mark);
        }
        if is_full(&self.cells) {
            return SmallBoardStatus::Drawn;
        }
        SmallBoardStatus::Open
    }

    /// Places `mark` at `index`.
    ///
    /// Rejects marks on a resolved board (a won board keeps its empty cells
    /// empty forever), on an occupied cell, and on an out-of-range index.
    pub fn place(&mut self, index: usize, mark: Mark) -> Result<(), IllegalMoveReason> {
        if self.resolve().is_resolved() {
            return Err(IllegalMoveReason::BoardResolved);
        }
        let cell = self
            .cells
            .get_mut(index)
            .ok_or(IllegalMoveReason::OutOfRange)?;
        if cell.is_some() {
            return Err(IllegalMoveReason::CellOccupied);
        }
        *cell = Some(mark);
        Ok(())
    }
}

// ── Global board ────────────────────────────────────────────────────

/// Overall result of a finished game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GameWinner {
    X,
    O,
    /// Every small board resolved with no meta-line for either mark.
    #[serde(rename = "T")]
    Tie,
}

impl From<Mark> for GameWinner {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::X => Self::X,
            Mark::O => Self::O,
        }
    }
}

/// The nine small boards, outer index 0-8 matching the meta-cell position.
///
/// Serializes transparently as 9 arrays of 9 cell values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct GlobalBoard {
    boards: [SmallBoard; 9],
}

impl GlobalBoard {
    /// Builds a global board from explicit small boards.
    #[must_use]
    pub fn from_boards(boards: [SmallBoard; 9]) -> Self {
        Self { boards }
    }

    /// The small board at `index`, or `None` when out of range.
    #[must_use]
    pub fn board(&self, index: usize) -> Option<&SmallBoard> {
        self.boards.get(index)
    }

    /// True iff `index` names a small board that is still playable.
    /// A won board is never open, even while some of its cells are empty.
    #[must_use]
    pub fn is_open(&self, index: usize) -> bool {
        self.boards
            .get(index)
            .is_some_and(|board| !board.resolve().is_resolved())
    }

    /// The meta-sequence: each small board's winning mark, or `None` for
    /// open and drawn boards alike.
    #[must_use]
    pub fn meta_marks(&self) -> [Cell; 9] {
        self.boards.map(|board| board.resolve().winner())
    }

    /// Resolves the whole game: a meta-line of small-board winners wins;
    /// all nine boards resolved without one is a tie; otherwise in
    /// progress (`None`).
    #[must_use]
    pub fn resolve(&self) -> Option<GameWinner> {
        if let Some(mark) = line_winner(&self.meta_marks()) {
            return Some(mark.into());
        }
        if self
            .boards
            .iter()
            .all(|board| board.resolve().is_resolved())
        {
            return Some(GameWinner::Tie);
        }
        None
    }

    /// Places `mark` per `mv`, enforcing board-level legality (range,
    /// resolved target, occupied cell). Turn and active-board rules live
    /// in [`crate::game`].
    pub fn place(&mut self, mv: Move, mark: Mark) -> Result<(), IllegalMoveReason> {
        let board = self
            .boards
            .get_mut(usize::from(mv.global_board_index))
            .ok_or(IllegalMoveReason::OutOfRange)?;
        board.place(usize::from(mv.local_board_index), mark)
    }

    /// Every move currently legal under the active-board constraint.
    #[must_use]
    pub fn legal_moves(&self, active_board: Option<u8>) -> Vec<Move> {
        let mut moves = Vec::new();
        for (global, board) in self.boards.iter().enumerate() {
            if let Some(active) = active_board {
                if usize::from(active) != global {
                    continue;
                }
            }
            if board.resolve().is_resolved() {
                continue;
            }
            for (local, cell) in board.cells.iter().enumerate() {
                if cell.is_none() {
                    moves.push(Move {
                        global_board_index: global as u8,
                        local_board_index: local as u8,
                    });
                }
            }
        }
        moves
    }
}

// ── Moves ───────────────────────────────────────────────────────────

/// One placement: which small board, and which cell inside it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Move {
    /// Index of the targeted small board on the meta-grid (0-8).
    pub global_board_index: u8,
    /// Index of the targeted cell inside that board (0-8).
    pub local_board_index: u8,
}

impl Move {
    /// Builds a move from (global, local) indexes.
    #[must_use]
    pub fn new(global_board_index: u8, local_board_index: u8) -> Self {
        Self {
            global_board_index,
            local_board_index,
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

    const X: Cell = Some(Mark::X);
    const O: Cell = Some(Mark::O);
    const E: Cell = None;

    fn won_board(mark: Mark) -> SmallBoard {
        let m = Some(mark);
        SmallBoard::from_cells([m, m, m, E, E, E, E, E, E])
    }

    fn drawn_board() -> SmallBoard {
        // X O X / X O O / O X X: full, no line.
        SmallBoard::from_cells([X, O, X, X, O, O, O, X, X])
    }

    #[test]
    fn line_winner_finds_rows_columns_and_diagonals() {
        assert_eq!(line_winner(&[X, X, X, E, E, E, E, E, E]), X);
        assert_eq!(line_winner(&[E, E, E, O, O, O, E, E, E]), O);
        assert_eq!(line_winner(&[E, E, E, E, E, E, X, X, X]), X);
        assert_eq!(line_winner(&[O, E, E, O, E, E, O, E, E]), O);
        assert_eq!(line_winner(&[E, X, E, E, X, E, E, X, E]), X);
        assert_eq!(line_winner(&[E, E, O, E, E, O, E, E, O]), O);
        assert_eq!(line_winner(&[X, E, E, E, X, E, E, E, X]), X);
        assert_eq!(line_winner(&[E, E, O, E, O, E, O, E, E]), O);
    }

    #[test]
    fn line_winner_ignores_mixed_and_empty_lines() {
        assert_eq!(line_winner(&[X, O, X, E, E, E, E, E, E]), None);
        assert_eq!(line_winner(&[E; 9]), None);
        assert_eq!(line_winner(&drawn_board().cells().to_owned()), None);
    }

    #[test]
    fn is_full_requires_every_cell() {
        assert!(is_full(&[X, O, X, X, O, O, O, X, X]));
        assert!(!is_full(&[X, O, X, X, O, O, O, X, E]));
        assert!(!is_full(&[E; 9]));
    }

    #[test]
    fn small_board_resolution_covers_all_states() {
        assert_eq!(SmallBoard::default().resolve(), SmallBoardStatus::Open);
        assert_eq!(
            won_board(Mark::O).resolve(),
            SmallBoardStatus::Won(Mark::O)
        );
        assert_eq!(drawn_board().resolve(), SmallBoardStatus::Drawn);
    }

    #[test]
    fn place_rejects_occupied_cells() {
        let mut board = SmallBoard::default();
        board.place(4, Mark::X).unwrap();
        assert_eq!(
            board.place(4, Mark::O),
            Err(IllegalMoveReason::CellOccupied)
        );
    }

    #[test]
    fn place_rejects_resolved_boards_even_with_empty_cells() {
        let mut board = won_board(Mark::X);
        assert_eq!(
            board.place(8, Mark::O),
            Err(IllegalMoveReason::BoardResolved)
        );
        let mut drawn = drawn_board();
        assert_eq!(
            drawn.place(0, Mark::O),
            Err(IllegalMoveReason::BoardResolved)
        );
    }

    #[test]
    fn place_rejects_out_of_range_indexes() {
        let mut board = SmallBoard::default();
        assert_eq!(board.place(9, Mark::X), Err(IllegalMoveReason::OutOfRange));
        let mut global = GlobalBoard::default();
        assert_eq!(
            global.place(Move::new(9, 0), Mark::X),
            Err(IllegalMoveReason::OutOfRange)
        );
    }

    #[test]
    fn winning_local_row_wins_the_small_board() {
        // Scenario: top row already X X _, X completes it at local 2.
        let mut small = SmallBoard::from_cells([X, X, E, O, O, E, E, E, E]);
        small.place(2, Mark::X).unwrap();
        assert_eq!(small.resolve(), SmallBoardStatus::Won(Mark::X));

        let mut global = GlobalBoard::default();
        global.place(Move::new(0, 0), Mark::X).unwrap();
        global.place(Move::new(0, 3), Mark::O).unwrap();
        global.place(Move::new(0, 1), Mark::X).unwrap();
        global.place(Move::new(0, 4), Mark::O).unwrap();
        global.place(Move::new(0, 2), Mark::X).unwrap();
        assert_eq!(global.meta_marks()[0], X);
    }

    #[test]
    fn meta_line_of_won_boards_wins_the_game() {
        let mut boards = [SmallBoard::default(); 9];
        boards[0] = won_board(Mark::X);
        boards[4] = won_board(Mark::X);
        boards[8] = won_board(Mark::X);
        let global = GlobalBoard::from_boards(boards);
        assert_eq!(global.resolve(), Some(GameWinner::X));
    }

    #[test]
    fn drawn_boards_never_contribute_to_a_meta_line() {
        let mut boards = [SmallBoard::default(); 9];
        boards[0] = won_board(Mark::X);
        boards[1] = drawn_board();
        boards[2] = won_board(Mark::X);
        let global = GlobalBoard::from_boards(boards);
        assert_eq!(global.meta_marks()[1], None);
        assert_eq!(global.resolve(), None);
    }

    #[test]
    fn all_boards_resolved_without_a_meta_line_is_a_tie() {
        // Meta sequence X O X / X O O / O X X: all resolved, no line.
        let boards = [
            won_board(Mark::X),
            won_board(Mark::O),
            won_board(Mark::X),
            won_board(Mark::X),
            won_board(Mark::O),
            won_board(Mark::O),
            won_board(Mark::O),
            won_board(Mark::X),
            won_board(Mark::X),
        ];
        let global = GlobalBoard::from_boards(boards);
        assert_eq!(global.resolve(), Some(GameWinner::Tie));
    }

    #[test]
    fn drawn_boards_still_count_toward_a_tie() {
        let mut boards = [drawn_board(); 9];
        boards[3] = won_board(Mark::X);
        let global = GlobalBoard::from_boards(boards);
        assert_eq!(global.resolve(), Some(GameWinner::Tie));
    }

    #[test]
    fn won_boards_are_not_open_and_yield_no_legal_moves() {
        let mut boards = [SmallBoard::default(); 9];
        boards[2] = won_board(Mark::O);
        let global = GlobalBoard::from_boards(boards);
        assert!(!global.is_open(2));
        assert!(global.is_open(0));
        assert!(!global.is_open(9));
        assert!(global
            .legal_moves(None)
            .iter()
            .all(|mv| mv.global_board_index != 2));
    }

    #[test]
    fn legal_moves_respect_the_active_board_constraint() {
        let global = GlobalBoard::default();
        let constrained = global.legal_moves(Some(4));
        assert_eq!(constrained.len(), 9);
        assert!(constrained.iter().all(|mv| mv.global_board_index == 4));
        assert_eq!(global.legal_moves(None).len(), 81);
    }

    #[test]
    fn board_serializes_as_nested_cell_arrays() {
        let mut global = GlobalBoard::default();
        global.place(Move::new(4, 4), Mark::X).unwrap();
        let json = serde_json::to_value(global).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[4][4], serde_json::json!("X"));
        assert_eq!(rows[0][0], serde_json::Value::Null);
    }
}
