//! # Connect Four Client Library
//!
//! This library provides the client side of the Connect Four protocol: a
//! session that talks to the server, a local mirror of the board, and a
//! terminal frontend built on top of both.
//!
//! ## Architecture Overview
//!
//! ### Server Authority
//! The client never predicts. A move is only drawn once the server answers
//! `@legal`, and an opponent's move once the server relays it, so the local
//! board is always a replay of confirmed moves.
//!
//! ### Event Stream
//! The session reports what the server said as color-based
//! [`connection::SessionEvent`]s. [`game::ClientGame`] turns those into
//! player-relative [`game::GameEvent`]s ("you won", "opponent out of time"),
//! which is all a frontend needs to consume.
//!
//! ## Module Organization
//!
//! - `connection`: client session state machine, framing and send queue
//! - `game`: board mirror and player-relative events
//! - `input`: console command parsing
//! - `rendering`: text board and JSON event output
//! - `network`: the terminal client loop tying the above together
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use client::rendering::OutputMode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:4000", "Aric", OutputMode::Text)?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;

pub use error::ClientError;
