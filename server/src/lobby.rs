//! Matchmaking for connections that are not in a game
//!
//! This module tracks every connection the server owns outside of a game:
//! - Unidentified connections, which have not sent `@name` yet
//! - The single waiting connection, which has a name but no opponent
//!
//! The lobby is generic over the connection handle so the pairing rules can
//! be exercised without sockets. Connections leave the lobby when they are
//! paired, when they disconnect, or when the server shuts down.

use log::{debug, info};
use std::collections::HashMap;

/// Server-assigned identifier for an accepted connection
pub type ConnectionId = u64;

/// A named connection ready to be seated in a game
#[derive(Debug)]
pub struct Player<C> {
    pub id: ConnectionId,
    pub name: String,
    pub conn: C,
}

/// Two players taken out of the lobby together
///
/// `first` is the one that identified first, i.e. the one that was waiting.
#[derive(Debug)]
pub struct Pairing<C> {
    pub first: Player<C>,
    pub second: Player<C>,
}

/// Result of a connection identifying itself
#[derive(Debug)]
pub enum Identified<C> {
    /// No opponent yet; the connection is now the waiting one
    Waiting,
    /// An opponent was waiting and both have left the lobby
    Paired(Pairing<C>),
    /// The id is not an unidentified connection in this lobby
    Unknown,
}

pub struct Lobby<C> {
    /// Connections that have not named themselves yet
    unidentified: HashMap<ConnectionId, C>,
    /// At most one named connection waiting for an opponent
    waiting: Option<Player<C>>,
}

impl<C> Lobby<C> {
    pub fn new() -> Self {
        Self {
            unidentified: HashMap::new(),
            waiting: None,
        }
    }

    /// Registers a freshly accepted connection
    pub fn add(&mut self, id: ConnectionId, conn: C) {
        debug!("Connection {} joined the lobby", id);
        self.unidentified.insert(id, conn);
    }

    /// Moves a connection from unidentified to waiting, or pairs it with
    /// the connection already waiting
    pub fn identify(&mut self, id: ConnectionId, name: String) -> Identified<C> {
        let Some(conn) = self.unidentified.remove(&id) else {
            return Identified::Unknown;
        };
        let player = Player { id, name, conn };

        match self.waiting.take() {
            Some(first) => {
                info!("Pairing {} with {}", first.name, player.name);
                Identified::Paired(Pairing {
                    first,
                    second: player,
                })
            }
            None => {
                info!("{} is waiting for an opponent", player.name);
                self.waiting = Some(player);
                Identified::Waiting
            }
        }
    }

    /// Forgets a connection wherever it sits in the lobby
    pub fn remove(&mut self, id: ConnectionId) -> Option<C> {
        if let Some(conn) = self.unidentified.remove(&id) {
            return Some(conn);
        }

        match self.waiting.take() {
            Some(player) if player.id == id => {
                info!("{} stopped waiting", player.name);
                Some(player.conn)
            }
            other => {
                self.waiting = other;
                None
            }
        }
    }

    pub fn waiting_name(&self) -> Option<&str> {
        self.waiting.as_ref().map(|player| player.name.as_str())
    }

    pub fn unidentified_count(&self) -> usize {
        self.unidentified.len()
    }

    pub fn len(&self) -> usize {
        self.unidentified.len() + usize::from(self.waiting.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the lobby, handing back every connection it held
    pub fn drain(&mut self) -> Vec<C> {
        let mut conns: Vec<C> = self.unidentified.drain().map(|(_, conn)| conn).collect();
        conns.extend(self.waiting.take().map(|player| player.conn));
        conns
    }
}

impl<C> Default for Lobby<C> {
    fn default() -> Self {
        Self::new()
    }
}
