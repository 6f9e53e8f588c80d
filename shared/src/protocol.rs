//! Wire vocabulary for the line-oriented Connect Four protocol
//!
//! A command frame is an `@verb` line followed by exactly as many `#value`
//! lines as the verb requires. The number of parameters per verb is fixed
//! by a lookup table, and each direction of the connection has its own table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Verb→parameter-count table used by the frame codec.
pub type VerbTable = &'static [(&'static str, usize)];

/// Verbs a server accepts from a client.
pub const CLIENT_TO_SERVER: VerbTable = &[("name", 1), ("move", 1), ("resign", 0), ("ignoring", 1)];

/// Verbs a client accepts from a server.
pub const SERVER_TO_CLIENT: VerbTable = &[
    ("play", 3),
    ("move", 1),
    ("full", 0),
    ("legal", 0),
    ("win", 1),
    ("draw", 0),
    ("disconnected", 1),
    ("resigned", 1),
    ("tick", 2),
    ("time", 1),
    ("ignoring", 1),
];

/// Looks up how many parameter lines a verb requires in the given table
pub fn param_count(table: VerbTable, verb: &str) -> Option<usize> {
    table
        .iter()
        .find(|(name, _)| *name == verb)
        .map(|(_, count)| *count)
}

/// Errors raised when a parsed command does not form a valid typed message
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    #[error("verb {verb} expects {expected} parameters, got {actual}")]
    ParamCount {
        verb: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid column: {0}")]
    InvalidColumn(String),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("invalid color: {0}")]
    InvalidColor(String),
}

/// One of the two player roles. Black moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Black => "black",
            Color::White => "white",
        }
    }

    /// Index into per-color arrays (black = 0, white = 1)
    pub fn index(self) -> usize {
        match self {
            Color::Black => 0,
            Color::White => 1,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "black" => Ok(Color::Black),
            "white" => Ok(Color::White),
            other => Err(ProtocolError::InvalidColor(other.to_string())),
        }
    }
}

/// A verb plus its ordered parameters, as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub params: Vec<String>,
}

impl Command {
    pub fn new(verb: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            verb: verb.into(),
            params,
        }
    }

    /// Encodes the command as `@verb\r\n` followed by one `#value\r\n` per parameter
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.verb.len() + 3);
        out.push('@');
        out.push_str(&self.verb);
        out.push_str("\r\n");
        for param in &self.params {
            out.push('#');
            out.push_str(param);
            out.push_str("\r\n");
        }
        out
    }

    fn expect_params(&self, expected: usize) -> Result<(), ProtocolError> {
        if self.params.len() == expected {
            Ok(())
        } else {
            Err(ProtocolError::ParamCount {
                verb: self.verb.clone(),
                expected,
                actual: self.params.len(),
            })
        }
    }
}

/// Parses a column parameter, accepting only 1 through 7
pub fn parse_column(value: &str) -> Result<u8, ProtocolError> {
    match value.trim().parse::<u8>() {
        Ok(column) if (1..=crate::COLUMNS as u8).contains(&column) => Ok(column),
        _ => Err(ProtocolError::InvalidColumn(value.to_string())),
    }
}

fn parse_number(value: &str) -> Result<u32, ProtocolError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ProtocolError::InvalidNumber(value.to_string()))
}

/// Messages sent from a client to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Name { name: String },
    Move { column: u8 },
    Resign,
    Ignoring { verb: String },
}

impl From<&ClientMessage> for Command {
    fn from(message: &ClientMessage) -> Self {
        match message {
            ClientMessage::Name { name } => Command::new("name", vec![name.clone()]),
            ClientMessage::Move { column } => Command::new("move", vec![column.to_string()]),
            ClientMessage::Resign => Command::new("resign", vec![]),
            ClientMessage::Ignoring { verb } => Command::new("ignoring", vec![verb.clone()]),
        }
    }
}

impl TryFrom<&Command> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(command: &Command) -> Result<Self, Self::Error> {
        let expected = param_count(CLIENT_TO_SERVER, &command.verb)
            .ok_or_else(|| ProtocolError::UnknownVerb(command.verb.clone()))?;
        command.expect_params(expected)?;

        let params = &command.params;
        match command.verb.as_str() {
            "name" => Ok(ClientMessage::Name {
                name: params[0].clone(),
            }),
            "move" => Ok(ClientMessage::Move {
                column: parse_column(&params[0])?,
            }),
            "resign" => Ok(ClientMessage::Resign),
            "ignoring" => Ok(ClientMessage::Ignoring {
                verb: params[0].clone(),
            }),
            other => Err(ProtocolError::UnknownVerb(other.to_string())),
        }
    }
}

/// Messages sent from the server to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Play {
        opponent: String,
        time_limit: u32,
        color: Color,
    },
    Move {
        column: u8,
    },
    Full,
    Legal,
    Win {
        color: Color,
    },
    Draw,
    Disconnected {
        color: Color,
    },
    Resigned {
        color: Color,
    },
    Tick {
        color: Color,
        seconds: u32,
    },
    Time {
        color: Color,
    },
    Ignoring {
        verb: String,
    },
}

impl ServerMessage {
    pub fn encode(&self) -> String {
        Command::from(self).encode()
    }
}

impl ClientMessage {
    pub fn encode(&self) -> String {
        Command::from(self).encode()
    }
}

impl From<&ServerMessage> for Command {
    fn from(message: &ServerMessage) -> Self {
        let color_param = |color: &Color| vec![color.as_str().to_string()];
        match message {
            ServerMessage::Play {
                opponent,
                time_limit,
                color,
            } => Command::new(
                "play",
                vec![
                    opponent.clone(),
                    time_limit.to_string(),
                    color.as_str().to_string(),
                ],
            ),
            ServerMessage::Move { column } => Command::new("move", vec![column.to_string()]),
            ServerMessage::Full => Command::new("full", vec![]),
            ServerMessage::Legal => Command::new("legal", vec![]),
            ServerMessage::Win { color } => Command::new("win", color_param(color)),
            ServerMessage::Draw => Command::new("draw", vec![]),
            ServerMessage::Disconnected { color } => {
                Command::new("disconnected", color_param(color))
            }
            ServerMessage::Resigned { color } => Command::new("resigned", color_param(color)),
            ServerMessage::Tick { color, seconds } => Command::new(
                "tick",
                vec![color.as_str().to_string(), seconds.to_string()],
            ),
            ServerMessage::Time { color } => Command::new("time", color_param(color)),
            ServerMessage::Ignoring { verb } => Command::new("ignoring", vec![verb.clone()]),
        }
    }
}

impl TryFrom<&Command> for ServerMessage {
    type Error = ProtocolError;

    fn try_from(command: &Command) -> Result<Self, Self::Error> {
        let expected = param_count(SERVER_TO_CLIENT, &command.verb)
            .ok_or_else(|| ProtocolError::UnknownVerb(command.verb.clone()))?;
        command.expect_params(expected)?;

        let params = &command.params;
        let message = match command.verb.as_str() {
            "play" => ServerMessage::Play {
                opponent: params[0].clone(),
                time_limit: parse_number(&params[1])?,
                color: params[2].parse()?,
            },
            "move" => ServerMessage::Move {
                column: parse_column(&params[0])?,
            },
            "full" => ServerMessage::Full,
            "legal" => ServerMessage::Legal,
            "win" => ServerMessage::Win {
                color: params[0].parse()?,
            },
            "draw" => ServerMessage::Draw,
            "disconnected" => ServerMessage::Disconnected {
                color: params[0].parse()?,
            },
            "resigned" => ServerMessage::Resigned {
                color: params[0].parse()?,
            },
            "tick" => ServerMessage::Tick {
                color: params[0].parse()?,
                seconds: parse_number(&params[1])?,
            },
            "time" => ServerMessage::Time {
                color: params[0].parse()?,
            },
            "ignoring" => ServerMessage::Ignoring {
                verb: params[0].clone(),
            },
            other => return Err(ProtocolError::UnknownVerb(other.to_string())),
        };
        Ok(message)
    }
}
