//! Server configuration and the first-move policy

use crate::error::ServerError;
use clap::ValueEnum;
use shared::transport::DEFAULT_DRAIN_TIMEOUT;
use std::time::Duration;

/// Decides which of two paired connections plays black
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FirstMove {
    /// The connection that identified first plays black
    First,
    /// The connection that identified second plays black
    Second,
    /// A fair coin flip per game
    Random,
}

impl FirstMove {
    /// Orders a pair as (black, white)
    pub fn assign<T>(self, first: T, second: T) -> (T, T) {
        let first_is_black = match self {
            FirstMove::First => true,
            FirstMove::Second => false,
            FirstMove::Random => rand::random::<bool>(),
        };

        if first_is_black {
            (first, second)
        } else {
            (second, first)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds each color may spend thinking over the whole game
    pub time_limit: u32,
    pub first_move: FirstMove,
    /// Upper bound on waiting for queued output when a connection closes
    pub drain_timeout: Duration,
}

impl ServerConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        time_limit: u32,
        first_move: FirstMove,
    ) -> Result<Self, ServerError> {
        if time_limit == 0 {
            return Err(ServerError::InvalidTimeLimit);
        }

        Ok(Self {
            host: host.into(),
            port,
            time_limit,
            first_move,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
