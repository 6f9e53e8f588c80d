//! Terminal output: a text view for people, or one JSON event per line

use crate::error::ClientError;
use crate::game::{ClientGame, GameEvent, GameOverReason};
use crate::input::HELP;
use shared::{Board, Color, COLUMNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct Renderer {
    mode: OutputMode,
}

impl Renderer {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn render(&self, event: &GameEvent, game: &ClientGame) -> Result<(), ClientError> {
        match self.mode {
            OutputMode::Json => println!("{}", serde_json::to_string(event)?),
            OutputMode::Text => {
                if let Some(text) = describe(event, game) {
                    println!("{}", text);
                }
            }
        }
        Ok(())
    }

    /// Free-form feedback, shown in text mode only
    pub fn notice(&self, text: &str) {
        if self.mode == OutputMode::Text {
            println!("{}", text);
        }
    }

    pub fn show_board(&self, game: &ClientGame) {
        self.notice(&render_board(game.board(), game.color()));
    }

    pub fn help(&self) {
        self.notice(HELP);
    }
}

/// Text for an event, or None for events not worth a line
pub fn describe(event: &GameEvent, game: &ClientGame) -> Option<String> {
    let text = match event {
        GameEvent::ConnectionEstablished { success: true } => {
            format!("Connected as {}. Waiting for an opponent...", game.name())
        }
        GameEvent::ConnectionEstablished { success: false } => {
            "Could not connect to the server.".to_string()
        }
        GameEvent::GameStarted {
            opponent,
            time_limit,
            you_go_first,
        } => format!(
            "Playing {} with {}s each. You move {}.\n{}\n{}",
            opponent,
            time_limit,
            if *you_go_first { "first" } else { "second" },
            render_board(game.board(), game.color()),
            turn_prompt(game)
        ),
        GameEvent::MoveMade { column, by_you, .. } => format!(
            "{} column {}.\n{}\n{}",
            if *by_you { "You played" } else { "Opponent played" },
            column,
            render_board(game.board(), game.color()),
            turn_prompt(game)
        ),
        GameEvent::IllegalMove => "That column is full, pick another.".to_string(),
        GameEvent::Tick { yours: true, seconds } if *seconds <= 5 || seconds % 10 == 0 => {
            format!("{}s left", seconds)
        }
        GameEvent::Tick { .. } => return None,
        GameEvent::GameEnded { reason } => ending(*reason).to_string(),
    };
    Some(text)
}

fn turn_prompt(game: &ClientGame) -> &'static str {
    if game.is_your_turn() {
        "Your move (1-7):"
    } else {
        "Waiting for the opponent..."
    }
}

fn ending(reason: GameOverReason) -> &'static str {
    match reason {
        GameOverReason::YouWon => "You won!",
        GameOverReason::OpponentWon => "You lost.",
        GameOverReason::Draw => "The board is full, it's a draw.",
        GameOverReason::YouResigned => "You resigned.",
        GameOverReason::OpponentResigned => "Your opponent resigned. You win.",
        GameOverReason::YouOutOfTime => "You ran out of time.",
        GameOverReason::OpponentOutOfTime => "Your opponent ran out of time. You win.",
        GameOverReason::OpponentDisconnected => "Your opponent disconnected.",
        GameOverReason::ServerDisconnected => "Lost connection to the server.",
        GameOverReason::YouLeft => "You left.",
    }
}

/// Draws the board top row first; `X` is black, `O` is white
pub fn render_board(board: &Board, you: Option<Color>) -> String {
    let mut lines: Vec<String> = board
        .rows()
        .rev()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Some(Color::Black) => "X",
                    Some(Color::White) => "O",
                    None => ".",
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    lines.push((1..=COLUMNS).map(|c| c.to_string()).collect::<Vec<_>>().join(" "));
    if let Some(color) = you {
        let piece = if color == Color::Black { "X" } else { "O" };
        lines.push(format!("(you are {})", piece));
    }
    lines.join("\n")
}
