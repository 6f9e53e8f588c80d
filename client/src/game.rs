//! Local mirror of the server's board
//!
//! The mirror never decides anything. Own moves are placed when the server
//! answers `@legal`, opponent moves when it relays `@move`, so the grid
//! always matches the server's after each confirmed move.

use crate::connection::{EndReason, SessionEvent};
use crate::error::ClientError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use shared::{Board, Color};

/// Why the game ended, from this player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    YouResigned,
    OpponentResigned,
    OpponentDisconnected,
    YouOutOfTime,
    OpponentOutOfTime,
    YouWon,
    OpponentWon,
    Draw,
    ServerDisconnected,
    YouLeft,
}

/// Events for a frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    ConnectionEstablished {
        success: bool,
    },
    GameStarted {
        opponent: String,
        time_limit: u32,
        you_go_first: bool,
    },
    /// Row and column are 1-based, rows counted from the bottom
    MoveMade {
        row: usize,
        column: u8,
        by_you: bool,
    },
    IllegalMove,
    Tick {
        yours: bool,
        seconds: u32,
    },
    GameEnded {
        reason: GameOverReason,
    },
}

#[derive(Debug, Clone)]
pub struct ClientGame {
    name: String,
    board: Board,
    color: Option<Color>,
    your_turn: bool,
    /// Column of the move sent and not yet answered
    pending_move: Option<u8>,
}

impl ClientGame {
    pub fn new(name: impl Into<String>) -> Result<Self, ClientError> {
        let name = name.into();
        if name.contains(|c: char| c == '\n' || c == '\r') {
            return Err(ClientError::InvalidName(name));
        }

        Ok(Self {
            name,
            board: Board::new(),
            color: None,
            your_turn: false,
            pending_move: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Own color once a game has started
    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn is_your_turn(&self) -> bool {
        self.your_turn
    }

    /// Claims the turn for a move. Returns the column to send, or None if
    /// a move cannot be made now or the mirror already shows the column full.
    pub fn request_move(&mut self, column: u8) -> Option<u8> {
        let index = usize::from(column).wrapping_sub(1);
        if !self.board.can_drop(index) || !self.your_turn || self.pending_move.is_some() {
            return None;
        }
        self.pending_move = Some(column);
        Some(column)
    }

    /// Folds a session event into the mirror
    pub fn apply(&mut self, event: SessionEvent) -> Option<GameEvent> {
        match event {
            SessionEvent::Connected(success) => Some(GameEvent::ConnectionEstablished { success }),
            SessionEvent::GameStarted {
                opponent,
                time_limit,
                color,
            } => {
                self.board = Board::new();
                self.color = Some(color);
                self.your_turn = color == Color::Black;
                self.pending_move = None;
                Some(GameEvent::GameStarted {
                    opponent,
                    time_limit,
                    you_go_first: self.your_turn,
                })
            }
            SessionEvent::MoveAccepted => {
                let Some(column) = self.pending_move.take() else {
                    warn!("Server accepted a move we did not make");
                    return None;
                };
                self.your_turn = false;
                let color = self.color?;
                self.place(column, color, true)
            }
            SessionEvent::MoveRejected => {
                self.pending_move = None;
                Some(GameEvent::IllegalMove)
            }
            SessionEvent::OpponentMoved(column) => {
                self.your_turn = true;
                let color = self.color?.opponent();
                self.place(column, color, false)
            }
            SessionEvent::Tick { color, seconds } => Some(GameEvent::Tick {
                yours: self.color == Some(color),
                seconds,
            }),
            SessionEvent::Ended(reason) => {
                self.your_turn = false;
                self.pending_move = None;
                Some(GameEvent::GameEnded {
                    reason: self.relative(reason),
                })
            }
        }
    }

    fn place(&mut self, column: u8, color: Color, by_you: bool) -> Option<GameEvent> {
        match self.board.drop_piece(usize::from(column).wrapping_sub(1), color) {
            Ok(row) => Some(GameEvent::MoveMade {
                row: row + 1,
                column,
                by_you,
            }),
            Err(e) => {
                debug!("Mirror out of step with server: {}", e);
                None
            }
        }
    }

    fn relative(&self, reason: EndReason) -> GameOverReason {
        let mine = |color: Color| self.color == Some(color);
        match reason {
            EndReason::Won(color) if mine(color) => GameOverReason::YouWon,
            EndReason::Won(_) => GameOverReason::OpponentWon,
            EndReason::Resigned(color) if mine(color) => GameOverReason::YouResigned,
            EndReason::Resigned(_) => GameOverReason::OpponentResigned,
            EndReason::OutOfTime(color) if mine(color) => GameOverReason::YouOutOfTime,
            EndReason::OutOfTime(_) => GameOverReason::OpponentOutOfTime,
            EndReason::Draw => GameOverReason::Draw,
            EndReason::OpponentDisconnected => GameOverReason::OpponentDisconnected,
            EndReason::ServerDisconnected => GameOverReason::ServerDisconnected,
            EndReason::YouLeft => GameOverReason::YouLeft,
        }
    }
}
