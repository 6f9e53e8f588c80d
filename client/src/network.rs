use crate::connection::{ServerConnection, SessionEvent};
use crate::error::ClientError;
use crate::game::{ClientGame, GameEvent};
use crate::input::{parse_command, InputCommand};
use crate::rendering::{OutputMode, Renderer};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Terminal client: one connection, one game, console input
pub struct Client {
    server: String,
    game: ClientGame,
    connection: Arc<ServerConnection>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    renderer: Renderer,
}

impl Client {
    pub fn new(server: &str, name: &str, mode: OutputMode) -> Result<Self, ClientError> {
        let game = ClientGame::new(name)?;
        let (events_tx, events) = mpsc::unbounded_channel();

        Ok(Client {
            server: server.to_string(),
            game,
            connection: ServerConnection::new(events_tx),
            events,
            renderer: Renderer::new(mode),
        })
    }

    /// Plays until the game ends, the connection fails or the player quits
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let connecting = {
            let connection = Arc::clone(&self.connection);
            let server = self.server.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.connect(&server).await {
                    debug!("Connect ended: {}", e);
                }
            })
        };

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    if self.handle_session_event(event).await? {
                        break;
                    }
                },

                line = stdin.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => self.handle_input(&line).await,
                    Ok(None) | Err(_) => {
                        info!("Input closed, leaving");
                        stdin_open = false;
                        self.leave().await;
                    }
                },
            }
        }

        self.connection.close().await;
        let _ = connecting.await;
        Ok(())
    }

    /// Returns true once the session is over
    async fn handle_session_event(&mut self, event: SessionEvent) -> Result<bool, ClientError> {
        let connected = matches!(event, SessionEvent::Connected(true));

        let Some(game_event) = self.game.apply(event) else {
            return Ok(false);
        };

        if connected && !self.connection.send_name(self.game.name()).await {
            warn!("Could not send name");
        }

        self.renderer.render(&game_event, &self.game)?;
        Ok(matches!(
            game_event,
            GameEvent::GameEnded { .. } | GameEvent::ConnectionEstablished { success: false }
        ))
    }

    async fn handle_input(&mut self, line: &str) {
        match parse_command(line) {
            Some(InputCommand::Move(column)) => match self.game.request_move(column) {
                Some(column) => {
                    if !self.connection.send_move(column).await {
                        warn!("Move to column {} was not sent", column);
                    }
                }
                None => self.renderer.notice("You cannot move there right now."),
            },
            Some(InputCommand::Resign) => {
                if !self.connection.resign().await {
                    self.renderer.notice("There is no game to resign.");
                }
            }
            Some(InputCommand::Quit) => self.leave().await,
            Some(InputCommand::Board) => self.renderer.show_board(&self.game),
            Some(InputCommand::Help) => self.renderer.help(),
            None => self.renderer.notice("Unknown command, type help."),
        }
    }

    /// Cancels before a game, resigns during one
    async fn leave(&self) {
        if !self.connection.cancel().await {
            self.connection.resign().await;
        }
    }
}
