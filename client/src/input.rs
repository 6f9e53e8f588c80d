//! Console command parsing

use shared::COLUMNS;

/// A line typed by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    /// Drop a piece into a 1-based column
    Move(u8),
    Resign,
    /// Cancel before a game, or resign and leave during one
    Quit,
    Board,
    Help,
}

pub const HELP: &str = "Commands: 1-7 to drop a piece, resign, board, quit, help";

/// Parses one line of console input, ignoring case and surrounding space
pub fn parse_command(line: &str) -> Option<InputCommand> {
    let word = line.trim().to_ascii_lowercase();
    match word.as_str() {
        "r" | "resign" => Some(InputCommand::Resign),
        "q" | "quit" | "exit" => Some(InputCommand::Quit),
        "b" | "board" => Some(InputCommand::Board),
        "h" | "help" | "?" => Some(InputCommand::Help),
        _ => match word.parse::<u8>() {
            Ok(column) if (1..=COLUMNS as u8).contains(&column) => Some(InputCommand::Move(column)),
            _ => None,
        },
    }
}
