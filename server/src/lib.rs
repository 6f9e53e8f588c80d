//! # Connect Four Server Library
//!
//! This library hosts Connect Four matches between TCP clients speaking the
//! line protocol defined in the `shared` crate. The server is the single
//! authority on every board: clients request moves and learn the result.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! Accepted connections wait in the lobby until they send `@name`. The first
//! named connection waits for an opponent; the next one is paired with it
//! and a game starts. Which of the two plays black is decided by the
//! configured [`FirstMove`] policy.
//!
//! ### Refereeing
//! Each game validates moves, detects wins and draws, and runs a per-color
//! thinking clock. Illegal requests are answered in the protocol (`@full`,
//! or `@ignoring` for commands that make no sense in the current state)
//! and never disturb the game.
//!
//! ### Connection Lifecycle
//! A connection is closed when its peer hangs up, when its game ends, or when
//! the server shuts down. Queued output is drained first, bounded by the
//! configured drain timeout, and the peer's opponent is told about
//! disconnects while a game is in progress.
//!
//! ## Architecture Design
//!
//! ### Tasks and Ownership
//! Every connection runs a reader task and a writer task. Every game runs
//! its own task owning both players and its timer, so all of a game's
//! inputs are applied in arrival order without shared locks. The
//! [`Server`] loop owns the listener and the lobby.
//!
//! ### Event Routing
//! A connection delivers its events to exactly one subscriber: the server
//! loop while it is in the lobby, then its game. Switching subscribers is
//! atomic with respect to the connection closing, so a disconnect is never
//! lost between the two.
//!
//! ## Module Organization
//!
//! - `config`: listening address, time limit, first-move policy
//! - `connection`: per-connection session state and frame dispatch
//! - `lobby`: unidentified and waiting connections, pairing
//! - `clock`: per-color countdown and tick scheduling
//! - `game`: rules as a pure state machine plus the game task
//! - `network`: the accept loop and graceful shutdown
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{FirstMove, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("0.0.0.0", 4000, 30, FirstMove::Random)?;
//!     let server = Server::bind(config).await?;
//!
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod lobby;
pub mod network;

pub use config::{FirstMove, ServerConfig};
pub use error::ServerError;
pub use network::{Server, ShutdownHandle};
