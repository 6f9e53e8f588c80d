//! Client side of the connection to a game server
//!
//! [`ServerConnection`] walks through
//! `Idle → Connecting → Unnamed → Waiting → Playing → GameOver` and never
//! goes back. Server frames are checked against the current state; the ones
//! that fit become [`SessionEvent`]s and the rest are answered with
//! `@ignoring`. Results are reported by color here and translated into the
//! player's point of view by [`crate::game::ClientGame`].

use crate::error::ClientError;
use log::{debug, info, warn};
use shared::protocol::{ClientMessage, Command, ServerMessage};
use shared::transport::DEFAULT_DRAIN_TIMEOUT;
use shared::{Color, FrameCodec, FrameEvent, Outbox, COLUMNS, SERVER_TO_CLIENT};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Unnamed,
    Waiting,
    Playing,
    GameOver,
}

/// Why a session ended, by color where the server names one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Won(Color),
    Resigned(Color),
    OutOfTime(Color),
    Draw,
    OpponentDisconnected,
    ServerDisconnected,
    YouLeft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Outcome of the connection attempt
    Connected(bool),
    GameStarted {
        opponent: String,
        time_limit: u32,
        color: Color,
    },
    MoveAccepted,
    MoveRejected,
    OpponentMoved(u8),
    Tick {
        color: Color,
        seconds: u32,
    },
    /// Sent at most once
    Ended(EndReason),
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    outbox: Option<Arc<Outbox>>,
}

#[derive(Debug)]
pub struct ServerConnection {
    inner: Mutex<SessionInner>,
    events: mpsc::UnboundedSender<SessionEvent>,
    stop: Notify,
}

impl ServerConnection {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                outbox: None,
            }),
            events,
            stop: Notify::new(),
        })
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Opens a TCP connection. Emits `Connected` with the result either way.
    pub async fn connect(self: &Arc<Self>, addr: &str) -> Result<(), ClientError> {
        self.begin_connect().await?;
        info!("Connecting to {}", addr);

        let connected = tokio::select! {
            result = TcpStream::connect(addr) => Some(result),
            _ = self.stop.notified() => None,
        };

        match connected {
            Some(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not disable Nagle: {}", e);
                }
                self.attach(stream).await
            }
            Some(Err(source)) => {
                warn!("Connection to {} failed: {}", addr, source);
                self.fail_connect().await;
                Err(ClientError::Connect {
                    addr: addr.to_string(),
                    source,
                })
            }
            None => {
                self.fail_connect().await;
                Err(ClientError::Cancelled)
            }
        }
    }

    /// Runs the session over an already established stream
    pub async fn connect_stream<S>(self: &Arc<Self>, stream: S) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.begin_connect().await?;
        self.attach(stream).await
    }

    async fn begin_connect(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Idle {
            return Err(ClientError::AlreadyStarted);
        }
        inner.state = SessionState::Connecting;
        Ok(())
    }

    async fn fail_connect(&self) {
        self.inner.lock().await.state = SessionState::GameOver;
        let _ = self.events.send(SessionEvent::Connected(false));
    }

    async fn attach<S>(self: &Arc<Self>, stream: S) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Connecting {
                drop(inner);
                let _ = self.events.send(SessionEvent::Connected(false));
                return Err(ClientError::Cancelled);
            }
            inner.state = SessionState::Unnamed;
            inner.outbox = Some(Arc::new(Outbox::spawn(writer)));
        }

        let _ = self.events.send(SessionEvent::Connected(true));
        tokio::spawn(read_loop(Arc::clone(self), reader));
        Ok(())
    }

    /// Identifies this player. Only valid once, right after connecting.
    pub async fn send_name(&self, name: &str) -> bool {
        if name.contains(|c: char| c == '\n' || c == '\r') {
            return false;
        }
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Unnamed {
            return false;
        }
        inner.state = SessionState::Waiting;
        send(
            &inner,
            &ClientMessage::Name {
                name: name.to_string(),
            },
        )
    }

    pub async fn send_move(&self, column: u8) -> bool {
        if !(1..=COLUMNS as u8).contains(&column) {
            return false;
        }
        let inner = self.inner.lock().await;
        inner.state == SessionState::Playing && send(&inner, &ClientMessage::Move { column })
    }

    pub async fn resign(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state == SessionState::Playing && send(&inner, &ClientMessage::Resign)
    }

    /// Abandons the session before a game has started. Returns false if
    /// there is nothing to cancel.
    pub async fn cancel(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Idle => {
                inner.state = SessionState::GameOver;
                let _ = self.events.send(SessionEvent::Ended(EndReason::YouLeft));
                info!("Left before connecting");
                true
            }
            SessionState::Connecting => {
                inner.state = SessionState::GameOver;
                self.stop.notify_one();
                true
            }
            SessionState::Unnamed | SessionState::Waiting => {
                inner.state = SessionState::GameOver;
                let _ = self.events.send(SessionEvent::Ended(EndReason::YouLeft));
                drop(inner);
                info!("Left before a game started");
                self.close_transport().await;
                true
            }
            _ => false,
        }
    }

    /// Ends the session quietly and releases the socket
    pub async fn close(&self) {
        self.inner.lock().await.state = SessionState::GameOver;
        self.close_transport().await;
    }

    async fn close_transport(&self) {
        let outbox = self.inner.lock().await.outbox.take();
        if let Some(outbox) = outbox {
            self.stop.notify_one();
            outbox.close(DEFAULT_DRAIN_TIMEOUT).await;
        }
    }

    /// Moves to GameOver and reports why, unless already there
    async fn finish(&self, reason: EndReason) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::GameOver {
            inner.state = SessionState::GameOver;
            let _ = self.events.send(SessionEvent::Ended(reason));
        }
    }

    async fn handle_frame(&self, event: FrameEvent, codec: &mut FrameCodec) {
        match event {
            FrameEvent::BadCommand(verb) => {
                debug!("Server sent unusable command {:?}", verb);
                let inner = self.inner.lock().await;
                send(&inner, &ClientMessage::Ignoring { verb });
            }
            FrameEvent::Command(command) => {
                if !self.dispatch(&command).await {
                    debug!("Cannot apply {:?} right now", command.verb);
                    codec.mark_bad(command.verb);
                }
            }
        }
    }

    async fn dispatch(&self, command: &Command) -> bool {
        let message = match ServerMessage::try_from(command) {
            Ok(message) => message,
            Err(e) => {
                debug!("Malformed server command: {}", e);
                return false;
            }
        };

        let mut inner = self.inner.lock().await;
        let event = match (message, inner.state) {
            (ServerMessage::Ignoring { verb }, _) => {
                debug!("Server ignored our {:?}", verb);
                return true;
            }
            (
                ServerMessage::Play {
                    opponent,
                    time_limit,
                    color,
                },
                SessionState::Waiting,
            ) => {
                inner.state = SessionState::Playing;
                info!("Playing {} as {}", opponent, color);
                SessionEvent::GameStarted {
                    opponent,
                    time_limit,
                    color,
                }
            }
            (message, SessionState::Playing) => match message {
                ServerMessage::Move { column } => SessionEvent::OpponentMoved(column),
                ServerMessage::Legal => SessionEvent::MoveAccepted,
                ServerMessage::Full => SessionEvent::MoveRejected,
                ServerMessage::Tick { color, seconds } => SessionEvent::Tick { color, seconds },
                ServerMessage::Win { color } => SessionEvent::Ended(EndReason::Won(color)),
                ServerMessage::Draw => SessionEvent::Ended(EndReason::Draw),
                ServerMessage::Resigned { color } => {
                    SessionEvent::Ended(EndReason::Resigned(color))
                }
                ServerMessage::Time { color } => SessionEvent::Ended(EndReason::OutOfTime(color)),
                ServerMessage::Disconnected { .. } => {
                    SessionEvent::Ended(EndReason::OpponentDisconnected)
                }
                ServerMessage::Play { .. } | ServerMessage::Ignoring { .. } => return false,
            },
            _ => return false,
        };

        if matches!(event, SessionEvent::Ended(_)) {
            inner.state = SessionState::GameOver;
        }
        let _ = self.events.send(event);
        true
    }
}

fn send(inner: &SessionInner, message: &ClientMessage) -> bool {
    inner
        .outbox
        .as_ref()
        .map_or(false, |outbox| outbox.enqueue(message.encode()))
}

async fn read_loop<R>(conn: Arc<ServerConnection>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut codec = FrameCodec::new(SERVER_TO_CLIENT);
    let mut buffer = [0u8; 1024];

    loop {
        let read = tokio::select! {
            _ = conn.stop.notified() => break,
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => {
                debug!("Server closed the connection");
                break;
            }
            Ok(len) => {
                codec.push(&buffer[..len]);
                while let Some(event) = codec.next_event() {
                    conn.handle_frame(event, &mut codec).await;
                }
            }
            Err(e) => {
                warn!("Error reading from server: {}", e);
                break;
            }
        }
    }

    conn.finish(EndReason::ServerDisconnected).await;
    conn.close_transport().await;
}
