//! Server network layer: accepting connections, matchmaking and shutdown

use crate::config::ServerConfig;
use crate::connection::{ClientConnection, SessionEvent};
use crate::error::ServerError;
use crate::game::{Game, GameFinished, GameHandle, GameId};
use crate::lobby::{ConnectionId, Identified, Lobby, Pairing};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};

/// Stops a running [`Server`] from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}

/// Main server coordinating the listener, the lobby and running games
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    lobby: Lobby<Arc<ClientConnection>>,
    games: HashMap<GameId, GameHandle>,
    next_connection_id: ConnectionId,
    next_game_id: GameId,
    shutdown: Arc<Notify>,

    // Communication channels
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    finished_tx: mpsc::UnboundedSender<GameFinished>,
    finished_rx: mpsc::UnboundedReceiver<GameFinished>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            config,
            lobby: Lobby::new(),
            games: HashMap::new(),
            next_connection_id: 1,
            next_game_id: 1,
            shutdown: Arc::new(Notify::new()),
            session_tx,
            session_rx,
            finished_tx,
            finished_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Serves until a shutdown is requested, then closes every connection
    /// and waits for every game to wind down
    pub async fn run(mut self) -> Result<(), ServerError> {
        info!(
            "Server listening on {} (time limit {}s, first move {:?})",
            self.local_addr()?,
            self.config.time_limit,
            self.config.first_move
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept(stream, addr),
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(event) = self.session_rx.recv() => self.handle_session_event(event),
                Some(done) = self.finished_rx.recv() => {
                    self.games.remove(&done.id);
                    debug!("Game {} finished, {} still running", done.id, self.games.len());
                }
                _ = self.shutdown.notified() => {
                    info!("Shutting down server...");
                    break;
                }
            }
        }

        self.shutdown_all().await;
        info!("Server stopped");
        Ok(())
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        let id = self.next_connection_id;
        self.next_connection_id += 1;

        let conn = ClientConnection::spawn(
            id,
            addr,
            stream,
            self.session_tx.clone(),
            self.config.drain_timeout,
        );
        self.lobby.add(id, conn);
        info!(
            "Client {} connected from {} ({} in lobby)",
            id,
            addr,
            self.lobby.len()
        );
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Named { id, name } => match self.lobby.identify(id, name) {
                Identified::Paired(pairing) => self.start_game(pairing),
                Identified::Waiting => self.log_lobby(),
                Identified::Unknown => debug!("Name from connection {} outside the lobby", id),
            },
            SessionEvent::Disconnected { id } => {
                if self.lobby.remove(id).is_some() {
                    info!("Client {} left the lobby", id);
                    self.log_lobby();
                }
            }
            SessionEvent::MoveRequest { id, .. } | SessionEvent::Resign { id } => {
                warn!("Game command from connection {} that is not in a game", id);
            }
        }
    }

    fn log_lobby(&self) {
        debug!(
            "Lobby: {} waiting, {} unnamed",
            self.lobby.waiting_name().unwrap_or("nobody"),
            self.lobby.unidentified_count()
        );
    }

    fn start_game(&mut self, pairing: Pairing<Arc<ClientConnection>>) {
        let id = self.next_game_id;
        self.next_game_id += 1;

        let (black, white) = self
            .config
            .first_move
            .assign(pairing.first, pairing.second);
        let handle = Game::spawn(
            id,
            black,
            white,
            self.config.time_limit,
            self.finished_tx.clone(),
        );
        self.games.insert(id, handle);
    }

    async fn shutdown_all(self) {
        let Server {
            listener,
            mut lobby,
            games,
            ..
        } = self;
        drop(listener);

        let mut closing = Vec::new();
        for conn in lobby.drain() {
            closing.push(tokio::spawn(async move {
                conn.unsubscribe().await;
                conn.close().await;
            }));
        }

        let mut handles: Vec<GameHandle> = games.into_values().collect();
        for handle in handles.iter_mut() {
            handle.abort();
        }

        for task in closing {
            let _ = task.await;
        }
        for handle in handles {
            handle.join().await;
        }
    }
}
