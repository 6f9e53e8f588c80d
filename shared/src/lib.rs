//! # Shared Protocol Library
//!
//! Types and logic used by both ends of a Connect Four connection: the wire
//! vocabulary, the byte-stream frame codec, the board, and the ordered send
//! pipeline that every connection writes through.
//!
//! ## Wire format
//!
//! UTF-8 text, one item per line. A frame is `@<verb>` followed by exactly
//! the number of `#<value>` lines that verb requires. Any other line between
//! frames is ignored. Lines end in `\n`; a preceding `\r` is accepted on
//! input and always emitted on output.
//!
//! ```text
//! @play
//! #Mia
//! #30
//! #black
//! ```

pub mod board;
pub mod codec;
pub mod protocol;
pub mod transport;

pub use board::{Board, MoveError};
pub use codec::{FrameCodec, FrameEvent};
pub use protocol::{
    ClientMessage, Color, Command, ProtocolError, ServerMessage, CLIENT_TO_SERVER,
    SERVER_TO_CLIENT,
};
pub use transport::Outbox;

pub const ROWS: usize = 6;
pub const COLUMNS: usize = 7;
