use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("player name must not contain line breaks: {0:?}")]
    InvalidName(String),

    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection attempt was cancelled")]
    Cancelled,

    #[error("session has already been used")]
    AlreadyStarted,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("could not encode event: {0}")]
    Json(#[from] serde_json::Error),
}
