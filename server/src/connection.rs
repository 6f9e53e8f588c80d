//! Server side of one TCP connection
//!
//! A [`ClientConnection`] owns a reader task that decodes client frames and
//! an [`Outbox`] that serialises everything sent back. Frames that pass the
//! state checks are forwarded as [`SessionEvent`]s to the connection's single
//! subscriber: the server's lobby loop at first, and the game once paired.
//! Frames that fail them are answered with `@ignoring`.

use crate::lobby::ConnectionId;
use log::{debug, info, warn};
use shared::protocol::{ClientMessage, Command, ServerMessage};
use shared::{Color, FrameCodec, FrameEvent, Outbox, CLIENT_TO_SERVER};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, Mutex, Notify};

/// Notifications a connection delivers to its subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Named { id: ConnectionId, name: String },
    MoveRequest { id: ConnectionId, column: u8 },
    Resign { id: ConnectionId },
    /// Sent once, when the connection closes for any reason
    Disconnected { id: ConnectionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotPlaying,
    Playing,
    Gone,
}

#[derive(Debug)]
struct SessionInner {
    name: Option<String>,
    state: SessionState,
    subscriber: Option<mpsc::UnboundedSender<SessionEvent>>,
}

#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    peer: String,
    inner: Mutex<SessionInner>,
    outbox: Outbox,
    stop_reading: Notify,
    drain_timeout: Duration,
}

impl ClientConnection {
    /// Takes ownership of a stream and starts reading from it
    pub fn spawn<S>(
        id: ConnectionId,
        peer: impl Display,
        stream: S,
        subscriber: mpsc::UnboundedSender<SessionEvent>,
        drain_timeout: Duration,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let conn = Arc::new(Self {
            id,
            peer: peer.to_string(),
            inner: Mutex::new(SessionInner {
                name: None,
                state: SessionState::NotPlaying,
                subscriber: Some(subscriber),
            }),
            outbox: Outbox::spawn(writer),
            stop_reading: Notify::new(),
            drain_timeout,
        });

        tokio::spawn(read_loop(Arc::clone(&conn), reader));
        conn
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn name(&self) -> Option<String> {
        self.inner.lock().await.name.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Replaces the subscriber. Returns false if the connection is already
    /// gone, in which case the caller will never hear from it.
    pub async fn subscribe(&self, subscriber: mpsc::UnboundedSender<SessionEvent>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Gone {
            return false;
        }
        inner.subscriber = Some(subscriber);
        true
    }

    pub async fn unsubscribe(&self) {
        self.inner.lock().await.subscriber = None;
    }

    /// Moves to Playing and announces the game. Returns false unless the
    /// connection was idle.
    pub async fn start_playing(&self, opponent: &str, time_limit: u32, color: Color) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::NotPlaying {
            return false;
        }
        inner.state = SessionState::Playing;
        self.send(&ServerMessage::Play {
            opponent: opponent.to_string(),
            time_limit,
            color,
        })
    }

    /// Queues a message. Returns false once the connection has closed.
    pub fn send(&self, message: &ServerMessage) -> bool {
        self.outbox.enqueue(message.encode())
    }

    /// Stops reading, drains queued output and tells the subscriber.
    /// Only the first call has any effect.
    pub async fn close(&self) {
        let subscriber = {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Gone {
                return;
            }
            inner.state = SessionState::Gone;
            inner.subscriber.take()
        };

        info!("Connection {} ({}) closed", self.id, self.peer);
        self.stop_reading.notify_one();
        self.outbox.close(self.drain_timeout).await;

        if let Some(subscriber) = subscriber {
            let _ = subscriber.send(SessionEvent::Disconnected { id: self.id });
        }
    }

    async fn handle_frame(&self, event: FrameEvent, codec: &mut FrameCodec) {
        match event {
            FrameEvent::BadCommand(verb) => {
                debug!("Connection {} sent unusable command {:?}", self.id, verb);
                self.send(&ServerMessage::Ignoring { verb });
            }
            FrameEvent::Command(command) => {
                if !self.dispatch(&command).await {
                    debug!(
                        "Connection {} cannot apply {:?} right now",
                        self.id, command.verb
                    );
                    codec.mark_bad(command.verb);
                }
            }
        }
    }

    /// Applies a decoded command. Returns false if it is not valid here.
    async fn dispatch(&self, command: &Command) -> bool {
        let message = match ClientMessage::try_from(command) {
            Ok(message) => message,
            Err(e) => {
                debug!("Connection {}: {}", self.id, e);
                return false;
            }
        };

        let mut inner = self.inner.lock().await;
        let event = match (message, inner.state) {
            (ClientMessage::Ignoring { verb }, _) => {
                debug!("Connection {} ignored our {:?}", self.id, verb);
                return true;
            }
            (ClientMessage::Name { name }, SessionState::NotPlaying) if inner.name.is_none() => {
                inner.name = Some(name.clone());
                SessionEvent::Named { id: self.id, name }
            }
            (ClientMessage::Move { column }, SessionState::Playing) => {
                SessionEvent::MoveRequest { id: self.id, column }
            }
            (ClientMessage::Resign, SessionState::Playing) => SessionEvent::Resign { id: self.id },
            _ => return false,
        };

        if let Some(subscriber) = &inner.subscriber {
            let _ = subscriber.send(event);
        }
        true
    }
}

async fn read_loop<R>(conn: Arc<ClientConnection>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut codec = FrameCodec::new(CLIENT_TO_SERVER);
    let mut buffer = [0u8; 1024];

    loop {
        let read = tokio::select! {
            _ = conn.stop_reading.notified() => break,
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => {
                debug!("Connection {} reached end of stream", conn.id);
                break;
            }
            Ok(len) => {
                codec.push(&buffer[..len]);
                while let Some(event) = codec.next_event() {
                    conn.handle_frame(event, &mut codec).await;
                }
            }
            Err(e) => {
                warn!("Read error on connection {}: {}", conn.id, e);
                break;
            }
        }
    }

    if let Some(verb) = codec.pending_bad() {
        debug!("Connection {} closed before {:?} could be reported", conn.id, verb);
    }
    conn.close().await;
}
