//! The 6×7 Connect Four grid
//!
//! Rows are counted from the bottom (row 0 is where the first piece in a
//! column lands) and columns from the left, both zero-based. A column's fill
//! height is derived from its cells rather than stored.

use crate::protocol::Color;
use crate::{COLUMNS, ROWS};
use thiserror::Error;

/// Pieces in a line needed to win
pub const CONNECT: usize = 4;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("column {0} is outside the board")]
    OutOfRange(usize),

    #[error("column {0} is full")]
    ColumnFull(usize),
}

/// The four axes checked for a line, as one of each opposing direction pair
const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[Option<Color>; COLUMNS]; ROWS],
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: [[None; COLUMNS]; ROWS],
        }
    }

    pub fn get(&self, row: usize, column: usize) -> Option<Color> {
        self.cells
            .get(row)
            .and_then(|cells| cells.get(column))
            .copied()
            .flatten()
    }

    /// Number of pieces already in a column, 0 for a column off the board
    pub fn height(&self, column: usize) -> usize {
        self.cells
            .iter()
            .take_while(|cells| matches!(cells.get(column), Some(Some(_))))
            .count()
    }

    pub fn can_drop(&self, column: usize) -> bool {
        column < COLUMNS && self.height(column) < ROWS
    }

    /// Drops a piece into a zero-based column and returns the row it landed in
    pub fn drop_piece(&mut self, column: usize, color: Color) -> Result<usize, MoveError> {
        if column >= COLUMNS {
            return Err(MoveError::OutOfRange(column));
        }
        let row = self.height(column);
        if row >= ROWS {
            return Err(MoveError::ColumnFull(column));
        }
        self.cells[row][column] = Some(color);
        Ok(row)
    }

    /// True when the piece at (row, column) completes a line of four.
    ///
    /// Only the lines through that cell are examined, so this must be asked
    /// right after each placement.
    pub fn is_winning_move(&self, row: usize, column: usize) -> bool {
        let Some(color) = self.get(row, column) else {
            return false;
        };

        AXES.iter().any(|&(dr, dc)| {
            let forward = self.run_length(row, column, dr, dc, color);
            let backward = self.run_length(row, column, -dr, -dc, color);
            forward + backward + 1 >= CONNECT
        })
    }

    /// Counts same-colored pieces stepping away from (row, column), excluding it
    fn run_length(&self, row: usize, column: usize, dr: isize, dc: isize, color: Color) -> usize {
        let mut count = 0;
        let (mut r, mut c) = (row as isize, column as isize);
        loop {
            r += dr;
            c += dc;
            if r < 0 || c < 0 || self.get(r as usize, c as usize) != Some(color) {
                return count;
            }
            count += 1;
        }
    }

    /// True once the top row has no empty cell
    pub fn is_full(&self) -> bool {
        self.cells[ROWS - 1].iter().all(Option::is_some)
    }

    pub fn pieces(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| cell.is_some()).count()
    }

    /// Rows from the bottom up
    pub fn rows(&self) -> impl DoubleEndedIterator<Item = &[Option<Color>; COLUMNS]> {
        self.cells.iter()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
