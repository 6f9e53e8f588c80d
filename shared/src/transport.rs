//! Ordered, non-blocking send pipeline for one connection
//!
//! Text handed to [`Outbox::enqueue`] is appended to a FIFO and written by a
//! single writer task, so at most one write is in flight and writes never
//! interleave. Whatever piles up while a write is in progress is coalesced
//! into the next one.

use log::{debug, warn};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// How long a close waits for queued text to reach the socket
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

#[derive(Debug)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<Outgoing>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Outbox {
    /// Spawns the writer task that owns the write half of the connection
    pub fn spawn<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_loop(writer, receiver));
        Self {
            sender,
            writer: Mutex::new(Some(handle)),
        }
    }

    /// Queues text for sending. Returns false once the outbox has closed.
    pub fn enqueue(&self, text: impl Into<String>) -> bool {
        self.sender.send(Outgoing::Text(text.into())).is_ok()
    }

    /// Lets queued text drain for up to `drain_timeout`, then shuts down the
    /// write direction. Safe to call more than once.
    pub async fn close(&self, drain_timeout: Duration) {
        let _ = self.sender.send(Outgoing::Close);

        let Some(mut handle) = self.writer.lock().await.take() else {
            return;
        };

        if tokio::time::timeout(drain_timeout, &mut handle).await.is_err() {
            warn!("Send queue did not drain within {:?}, dropping it", drain_timeout);
            handle.abort();
        }
    }
}

async fn write_loop<W>(mut writer: W, mut receiver: mpsc::UnboundedReceiver<Outgoing>)
where
    W: AsyncWrite + Unpin,
{
    let mut closing = false;

    while !closing {
        let mut pending = match receiver.recv().await {
            Some(Outgoing::Text(text)) => text,
            Some(Outgoing::Close) | None => break,
        };

        loop {
            match receiver.try_recv() {
                Ok(Outgoing::Text(text)) => pending.push_str(&text),
                Ok(Outgoing::Close) => {
                    closing = true;
                    break;
                }
                Err(_) => break,
            }
        }

        if let Err(e) = writer.write_all(pending.as_bytes()).await {
            warn!("Write failed, dropping send queue: {}", e);
            break;
        }
    }

    receiver.close();
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of write half failed: {}", e);
    }
}
