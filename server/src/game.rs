//! One Connect Four match between two connections
//!
//! The rules live in [`GameState`], which never touches the network: every
//! input returns a [`Step`] listing the messages to send and, once the game
//! is decided, its outcome. [`Game`] wraps the state in a task that owns both
//! connections, so moves, resignations, disconnects, timer expiry and server
//! shutdown are all applied one at a time in arrival order.

use crate::clock::{ClockEvent, TurnClock};
use crate::connection::{ClientConnection, SessionEvent};
use crate::lobby::{ConnectionId, Player};
use log::{debug, info};
use shared::{Board, Color, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub type GameId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Only(Color),
    Both,
}

impl Recipient {
    pub fn includes(self, color: Color) -> bool {
        match self {
            Recipient::Only(only) => only == color,
            Recipient::Both => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub to: Recipient,
    pub message: ServerMessage,
}

/// How a game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Won(Color),
    Draw,
    Resigned(Color),
    Disconnected(Color),
    TimedOut(Color),
    /// Stopped by server shutdown
    Aborted,
}

/// What a single input did to the game
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Step {
    pub messages: Vec<Outgoing>,
    pub outcome: Option<GameOutcome>,
}

impl Step {
    fn send(&mut self, to: Recipient, message: ServerMessage) {
        self.messages.push(Outgoing { to, message });
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    clock: TurnClock,
    over: bool,
}

impl GameState {
    pub fn new(time_limit: Duration, now: Instant) -> Self {
        Self {
            board: Board::new(),
            clock: TurnClock::new(time_limit, now),
            over: false,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Color {
        self.clock.turn()
    }

    pub fn clock(&self) -> &TurnClock {
        &self.clock
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    /// When the next clock check is due, while the game is running
    pub fn deadline(&self) -> Option<Instant> {
        (!self.over).then(|| self.clock.deadline())
    }

    /// The first tick, sent as soon as both players know their colors
    pub fn opening(&self) -> Step {
        let mut step = Step::default();
        self.push_tick(&mut step);
        step
    }

    /// Applies a one-based column request from `from`.
    ///
    /// Requests out of turn are dropped. A request that arrives after the
    /// mover's time has run out ends the game on time instead.
    pub fn request_move(&mut self, from: Color, column: u8, now: Instant) -> Step {
        let mut step = Step::default();
        if self.over || from != self.turn() {
            debug!("Dropping move from {} out of turn", from);
            return step;
        }

        if self.clock.has_expired(now) {
            return self.expire(now);
        }

        let index = usize::from(column).wrapping_sub(1);
        let row = match self.board.drop_piece(index, from) {
            Ok(row) => row,
            Err(e) => {
                debug!("Rejected move by {}: {}", from, e);
                step.send(Recipient::Only(from), ServerMessage::Full);
                return step;
            }
        };

        step.send(Recipient::Only(from), ServerMessage::Legal);
        step.send(Recipient::Only(from.opponent()), ServerMessage::Move { column });
        self.clock.end_turn(now);

        if self.board.is_winning_move(row, index) {
            step.send(Recipient::Both, ServerMessage::Win { color: from });
            step.outcome = self.finish(GameOutcome::Won(from));
        } else if self.board.is_full() {
            step.send(Recipient::Both, ServerMessage::Draw);
            step.outcome = self.finish(GameOutcome::Draw);
        } else {
            self.push_tick(&mut step);
        }
        step
    }

    /// Handles the clock deadline firing
    pub fn tick(&mut self, now: Instant) -> Step {
        if self.over {
            return Step::default();
        }
        match self.clock.tick(now) {
            ClockEvent::Tick { color, seconds } => Step {
                messages: vec![Outgoing {
                    to: Recipient::Both,
                    message: ServerMessage::Tick { color, seconds },
                }],
                outcome: None,
            },
            ClockEvent::Expired(_) => self.expire(now),
        }
    }

    pub fn resign(&mut self, color: Color) -> Step {
        let mut step = Step::default();
        if self.over {
            return step;
        }
        step.send(Recipient::Both, ServerMessage::Resigned { color });
        step.outcome = self.finish(GameOutcome::Resigned(color));
        step
    }

    /// Only the player still connected is told
    pub fn disconnect(&mut self, color: Color) -> Step {
        let mut step = Step::default();
        if self.over {
            return step;
        }
        step.send(
            Recipient::Only(color.opponent()),
            ServerMessage::Disconnected { color },
        );
        step.outcome = self.finish(GameOutcome::Disconnected(color));
        step
    }

    /// Ends the game without telling either player
    pub fn abort(&mut self) -> Step {
        Step {
            messages: Vec::new(),
            outcome: self.finish(GameOutcome::Aborted),
        }
    }

    fn expire(&mut self, now: Instant) -> Step {
        self.clock.tick(now);
        let color = self.turn();
        let mut step = Step::default();
        step.send(Recipient::Both, ServerMessage::Tick { color, seconds: 0 });
        step.send(Recipient::Both, ServerMessage::Time { color });
        step.outcome = self.finish(GameOutcome::TimedOut(color));
        step
    }

    fn push_tick(&self, step: &mut Step) {
        if let ClockEvent::Tick { color, seconds } = self.clock.current_tick() {
            step.send(Recipient::Both, ServerMessage::Tick { color, seconds });
        }
    }

    fn finish(&mut self, outcome: GameOutcome) -> Option<GameOutcome> {
        if self.over {
            return None;
        }
        self.over = true;
        Some(outcome)
    }
}

/// Reported to the server once a game task has closed both connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameFinished {
    pub id: GameId,
    pub outcome: GameOutcome,
}

/// The server's grip on a running game task
#[derive(Debug)]
pub struct GameHandle {
    pub id: GameId,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl GameHandle {
    /// Asks the game to end without a result
    pub fn abort(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Waits until the game task has torn down both connections
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            debug!("Game {} task ended abnormally: {}", self.id, e);
        }
    }
}

pub struct Game {
    id: GameId,
    black: Player<Arc<ClientConnection>>,
    white: Player<Arc<ClientConnection>>,
    time_limit: u32,
    state: GameState,
}

impl Game {
    /// Seats two players and starts the game task
    pub fn spawn(
        id: GameId,
        black: Player<Arc<ClientConnection>>,
        white: Player<Arc<ClientConnection>>,
        time_limit: u32,
        finished: mpsc::UnboundedSender<GameFinished>,
    ) -> GameHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let game = Game {
            id,
            black,
            white,
            time_limit,
            state: GameState::new(Duration::from_secs(time_limit.into()), Instant::now()),
        };
        let task = tokio::spawn(game.run(stop_rx, finished));

        GameHandle {
            id,
            stop: Some(stop_tx),
            task,
        }
    }

    async fn run(
        mut self,
        mut stop: oneshot::Receiver<()>,
        finished: mpsc::UnboundedSender<GameFinished>,
    ) {
        let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
        let black_alive = self.black.conn.subscribe(inbox_tx.clone()).await;
        let white_alive = self.white.conn.subscribe(inbox_tx).await;

        info!(
            "Game {} started: {} (black) vs {} (white)",
            self.id, self.black.name, self.white.name
        );

        // A player already gone is skipped; the other hears `play` before any result
        self.black
            .conn
            .start_playing(&self.white.name, self.time_limit, Color::Black)
            .await;
        self.white
            .conn
            .start_playing(&self.black.name, self.time_limit, Color::White)
            .await;

        let mut step = if !black_alive {
            self.state.disconnect(Color::Black)
        } else if !white_alive {
            self.state.disconnect(Color::White)
        } else {
            self.state.opening()
        };

        let outcome = loop {
            if let Some(outcome) = self.deliver(step) {
                break outcome;
            }
            let Some(deadline) = self.state.deadline() else {
                break GameOutcome::Aborted;
            };

            step = tokio::select! {
                event = inbox.recv() => match event {
                    Some(event) => self.on_session_event(event),
                    None => self.state.abort(),
                },
                _ = sleep_until(deadline) => self.state.tick(Instant::now()),
                _ = &mut stop => self.state.abort(),
            };
        };

        self.teardown(outcome).await;
        let _ = finished.send(GameFinished {
            id: self.id,
            outcome,
        });
    }

    fn color_of(&self, id: ConnectionId) -> Option<Color> {
        if id == self.black.id {
            Some(Color::Black)
        } else if id == self.white.id {
            Some(Color::White)
        } else {
            None
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) -> Step {
        let now = Instant::now();
        match event {
            SessionEvent::MoveRequest { id, column } => match self.color_of(id) {
                Some(color) => self.state.request_move(color, column, now),
                None => Step::default(),
            },
            SessionEvent::Resign { id } => match self.color_of(id) {
                Some(color) => self.state.resign(color),
                None => Step::default(),
            },
            SessionEvent::Disconnected { id } => match self.color_of(id) {
                Some(color) => self.state.disconnect(color),
                None => Step::default(),
            },
            SessionEvent::Named { .. } => Step::default(),
        }
    }

    /// Sends a step's messages in order and passes its outcome through
    fn deliver(&self, step: Step) -> Option<GameOutcome> {
        for Outgoing { to, message } in &step.messages {
            if to.includes(Color::Black) {
                self.black.conn.send(message);
            }
            if to.includes(Color::White) {
                self.white.conn.send(message);
            }
        }
        step.outcome
    }

    async fn teardown(&self, outcome: GameOutcome) {
        let clock = self.state.clock();
        info!(
            "Game {} ({} vs {}) over: {:?}, {}s/{}s left",
            self.id,
            self.black.name,
            self.white.name,
            outcome,
            clock.seconds_left(Color::Black),
            clock.seconds_left(Color::White)
        );

        self.black.conn.unsubscribe().await;
        self.white.conn.unsubscribe().await;
        tokio::join!(self.black.conn.close(), self.white.conn.close());
    }
}
