//! Integration tests for the Connect Four server and client
//!
//! These tests run real servers on ephemeral ports and talk to them over TCP,
//! either with raw protocol text or through the client library.

use assert_approx_eq::assert_approx_eq;
use client::connection::{ServerConnection, SessionEvent};
use client::game::{ClientGame, GameEvent, GameOverReason};
use server::{FirstMove, Server, ServerConfig, ShutdownHandle};
use shared::protocol::{param_count, Command, SERVER_TO_CLIENT};
use shared::{Color, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Lets the server's reader tasks catch up so identification order is fixed
const SETTLE: Duration = Duration::from_millis(100);

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start(time_limit: u32, first_move: FirstMove) -> Self {
        let config = ServerConfig::new("127.0.0.1", 0, time_limit, first_move).unwrap();
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
        });
        TestServer {
            addr,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        timeout(WAIT, self.task)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}

/// Speaks the protocol as raw text
struct RawClient {
    stream: TcpStream,
    received: Vec<u8>,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        RawClient {
            stream: TcpStream::connect(addr).await.unwrap(),
            received: Vec::new(),
        }
    }

    async fn named(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("@name\n#{}\n", name)).await;
        sleep(SETTLE).await;
        client
    }

    async fn send(&mut self, text: &str) {
        self.stream.write_all(text.as_bytes()).await.unwrap();
    }

    /// Reads more bytes; false once the server has closed the connection
    async fn fill(&mut self) -> bool {
        let mut buf = [0u8; 1024];
        match timeout(WAIT, self.stream.read(&mut buf))
            .await
            .expect("timed out waiting for the server")
        {
            Ok(0) | Err(_) => false,
            Ok(len) => {
                self.received.extend_from_slice(&buf[..len]);
                true
            }
        }
    }

    async fn expect_bytes(&mut self, expected: &str) {
        while self.received.len() < expected.len() {
            assert!(self.fill().await, "closed while waiting for {:?}", expected);
        }
        let got: Vec<u8> = self.received.drain(..expected.len()).collect();
        assert_eq!(String::from_utf8_lossy(&got), expected);
    }

    async fn next_message(&mut self) -> Option<ServerMessage> {
        loop {
            if let Some((command, used)) = parse_frame(&self.received) {
                self.received.drain(..used);
                return Some(ServerMessage::try_from(&command).unwrap());
            }
            if !self.fill().await {
                return None;
            }
        }
    }

    async fn next_non_tick(&mut self) -> Option<ServerMessage> {
        loop {
            match self.next_message().await {
                Some(ServerMessage::Tick { .. }) => continue,
                other => return other,
            }
        }
    }

    /// Asserts that only ticks arrive before the server hangs up
    async fn expect_closed(&mut self) {
        while let Some(message) = self.next_message().await {
            assert!(
                matches!(message, ServerMessage::Tick { .. }),
                "unexpected {:?} before close",
                message
            );
        }
    }
}

/// Splits one well-formed server frame off the front of `bytes`
fn parse_frame(bytes: &[u8]) -> Option<(Command, usize)> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut lines = Vec::new();
    let mut used = 0;

    for line in text.split_inclusive('\n') {
        if !line.ends_with('\n') {
            break;
        }
        used += line.len();
        lines.push(line.trim_end_matches(['\r', '\n']).to_string());

        let verb = lines[0].strip_prefix('@')?;
        let count = param_count(SERVER_TO_CLIENT, verb)?;
        if lines.len() == count + 1 {
            let params = lines[1..]
                .iter()
                .map(|p| p.trim_start_matches('#').to_string())
                .collect();
            return Some((Command::new(verb, params), used));
        }
    }
    None
}

/// Pairs two raw clients; the first one plays black
async fn start_game(addr: SocketAddr) -> (RawClient, RawClient) {
    let mut black = RawClient::named(addr, "Aric").await;
    let mut white = RawClient::named(addr, "Mia").await;
    assert!(matches!(
        black.next_message().await,
        Some(ServerMessage::Play {
            color: Color::Black,
            ..
        })
    ));
    assert!(matches!(
        white.next_message().await,
        Some(ServerMessage::Play {
            color: Color::White,
            ..
        })
    ));
    (black, white)
}

/// MATCHMAKING TESTS
mod matchmaking_tests {
    use super::*;

    /// The first named connection waits and is paired with the next one
    #[tokio::test]
    async fn pairing_sends_complementary_play() {
        let server = TestServer::start(30, FirstMove::First).await;

        let mut aric = RawClient::named(server.addr, "Aric").await;
        let mut mia = RawClient::named(server.addr, "Mia").await;

        aric.expect_bytes("@play\r\n#Mia\r\n#30\r\n#black\r\n").await;
        mia.expect_bytes("@play\r\n#Aric\r\n#30\r\n#white\r\n").await;

        for client in [&mut aric, &mut mia] {
            assert_eq!(
                client.next_message().await,
                Some(ServerMessage::Tick {
                    color: Color::Black,
                    seconds: 30
                })
            );
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn second_policy_gives_black_to_the_newcomer() {
        let server = TestServer::start(30, FirstMove::Second).await;

        let mut aric = RawClient::named(server.addr, "Aric").await;
        let mut mia = RawClient::named(server.addr, "Mia").await;

        aric.expect_bytes("@play\r\n#Mia\r\n#30\r\n#white\r\n").await;
        mia.expect_bytes("@play\r\n#Aric\r\n#30\r\n#black\r\n").await;

        server.stop().await;
    }

    #[tokio::test]
    async fn random_policy_assigns_complementary_colors() {
        let server = TestServer::start(30, FirstMove::Random).await;

        let mut aric = RawClient::named(server.addr, "Aric").await;
        let mut mia = RawClient::named(server.addr, "Mia").await;

        let color_of = |message: Option<ServerMessage>| match message {
            Some(ServerMessage::Play { color, .. }) => color,
            other => panic!("expected play, got {:?}", other),
        };
        let aric_color = color_of(aric.next_message().await);
        let mia_color = color_of(mia.next_message().await);
        assert_eq!(aric_color.opponent(), mia_color);

        server.stop().await;
    }

    /// Four players in arrival order form two games
    #[tokio::test]
    async fn pairs_form_in_arrival_order() {
        let server = TestServer::start(30, FirstMove::First).await;

        let mut a = RawClient::named(server.addr, "A").await;
        let mut b = RawClient::named(server.addr, "B").await;
        let mut c = RawClient::named(server.addr, "C").await;
        let mut d = RawClient::named(server.addr, "D").await;

        a.expect_bytes("@play\r\n#B\r\n").await;
        b.expect_bytes("@play\r\n#A\r\n").await;
        c.expect_bytes("@play\r\n#D\r\n").await;
        d.expect_bytes("@play\r\n#C\r\n").await;

        server.stop().await;
    }

    #[tokio::test]
    async fn waiting_player_leaving_frees_the_slot() {
        let server = TestServer::start(30, FirstMove::First).await;

        let quitter = RawClient::named(server.addr, "Quitter").await;
        drop(quitter);
        sleep(SETTLE).await;

        let mut b = RawClient::named(server.addr, "B").await;
        let mut c = RawClient::named(server.addr, "C").await;
        b.expect_bytes("@play\r\n#C\r\n#30\r\n#black\r\n").await;
        c.expect_bytes("@play\r\n#B\r\n#30\r\n#white\r\n").await;

        server.stop().await;
    }

    /// Unknown verbs are echoed once the stream resynchronises
    #[tokio::test]
    async fn unknown_verb_is_echoed_before_the_next_command() {
        let server = TestServer::start(30, FirstMove::First).await;

        let mut x = RawClient::connect(server.addr).await;
        x.send("#bogus\n@unknown\n@name\n#X\n").await;
        x.expect_bytes("@ignoring\r\n#unknown\r\n").await;
        sleep(SETTLE).await;

        // The name still counted
        let mut y = RawClient::named(server.addr, "Y").await;
        x.expect_bytes("@play\r\n#Y\r\n#30\r\n#black\r\n").await;
        y.expect_bytes("@play\r\n#X\r\n#30\r\n#white\r\n").await;

        server.stop().await;
    }

    #[tokio::test]
    async fn frames_split_across_writes() {
        let server = TestServer::start(30, FirstMove::First).await;

        let mut aric = RawClient::connect(server.addr).await;
        for byte in "@na".bytes().chain("me\r\n#Ar".bytes()).chain("ic\r\n".bytes()) {
            aric.send(&(byte as char).to_string()).await;
            sleep(Duration::from_millis(2)).await;
        }
        sleep(SETTLE).await;

        let mut mia = RawClient::named(server.addr, "Mia").await;
        aric.expect_bytes("@play\r\n#Mia\r\n").await;
        mia.expect_bytes("@play\r\n#Aric\r\n").await;

        server.stop().await;
    }
}

/// GAME FLOW TESTS
mod game_flow_tests {
    use super::*;

    #[tokio::test]
    async fn vertical_win_ends_the_game() {
        let server = TestServer::start(30, FirstMove::First).await;
        let (mut black, mut white) = start_game(server.addr).await;

        for _ in 0..3 {
            black.send("@move\n#1\n").await;
            assert_eq!(black.next_non_tick().await, Some(ServerMessage::Legal));
            assert_eq!(
                white.next_non_tick().await,
                Some(ServerMessage::Move { column: 1 })
            );

            white.send("@move\n#2\n").await;
            assert_eq!(white.next_non_tick().await, Some(ServerMessage::Legal));
            assert_eq!(
                black.next_non_tick().await,
                Some(ServerMessage::Move { column: 2 })
            );
        }

        black.send("@move\n#1\n").await;
        assert_eq!(black.next_non_tick().await, Some(ServerMessage::Legal));
        assert_eq!(
            black.next_non_tick().await,
            Some(ServerMessage::Win {
                color: Color::Black
            })
        );
        assert_eq!(
            white.next_non_tick().await,
            Some(ServerMessage::Move { column: 1 })
        );
        assert_eq!(
            white.next_non_tick().await,
            Some(ServerMessage::Win {
                color: Color::Black
            })
        );

        black.expect_closed().await;
        white.expect_closed().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn full_column_and_bad_requests_do_not_end_the_game() {
        let server = TestServer::start(30, FirstMove::First).await;
        let (mut black, mut white) = start_game(server.addr).await;

        for i in 0..6 {
            let (mover, waiter) = if i % 2 == 0 {
                (&mut black, &mut white)
            } else {
                (&mut white, &mut black)
            };
            mover.send("@move\n#7\n").await;
            assert_eq!(mover.next_non_tick().await, Some(ServerMessage::Legal));
            assert_eq!(
                waiter.next_non_tick().await,
                Some(ServerMessage::Move { column: 7 })
            );
        }

        black.send("@move\n#7\n").await;
        assert_eq!(black.next_non_tick().await, Some(ServerMessage::Full));

        // Out of range: echoed as ignoring once another frame parses
        black.send("@move\n#9\n@move\n#3\n").await;
        assert_eq!(
            black.next_non_tick().await,
            Some(ServerMessage::Ignoring {
                verb: "move".to_string()
            })
        );
        assert_eq!(black.next_non_tick().await, Some(ServerMessage::Legal));
        assert_eq!(
            white.next_non_tick().await,
            Some(ServerMessage::Move { column: 3 })
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn resignation_is_announced_to_both() {
        let server = TestServer::start(30, FirstMove::First).await;
        let (mut black, mut white) = start_game(server.addr).await;

        white.send("@resign\n").await;
        let expected = Some(ServerMessage::Resigned {
            color: Color::White,
        });
        assert_eq!(black.next_non_tick().await, expected);
        assert_eq!(white.next_non_tick().await, expected);

        black.expect_closed().await;
        white.expect_closed().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn disconnect_is_announced_to_the_peer() {
        let server = TestServer::start(30, FirstMove::First).await;
        let (black, mut white) = start_game(server.addr).await;

        drop(black);
        assert_eq!(
            white.next_non_tick().await,
            Some(ServerMessage::Disconnected {
                color: Color::Black
            })
        );
        white.expect_closed().await;
        server.stop().await;
    }

    /// The color to move runs out of time within a tick of the limit
    #[tokio::test]
    async fn idle_player_times_out() {
        let server = TestServer::start(2, FirstMove::First).await;
        let (mut black, mut white) = start_game(server.addr).await;
        let started = Instant::now();

        let mut seconds_seen = Vec::new();
        loop {
            match black.next_message().await {
                Some(ServerMessage::Tick { color, seconds }) => {
                    assert_eq!(color, Color::Black);
                    seconds_seen.push(seconds);
                }
                Some(ServerMessage::Time { color }) => {
                    assert_eq!(color, Color::Black);
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        assert_approx_eq!(started.elapsed().as_secs_f64(), 2.0, 0.5);
        assert_eq!(seconds_seen, vec![2, 1, 0]);
        assert_eq!(
            white.next_non_tick().await,
            Some(ServerMessage::Time {
                color: Color::Black
            })
        );

        black.expect_closed().await;
        white.expect_closed().await;
        server.stop().await;
    }

    /// Shutdown closes games and waiting players without results
    #[tokio::test]
    async fn shutdown_closes_everything() {
        let server = TestServer::start(30, FirstMove::First).await;
        let (mut black, mut white) = start_game(server.addr).await;
        let mut waiting = RawClient::named(server.addr, "Lonely").await;
        let mut anonymous = RawClient::connect(server.addr).await;
        sleep(SETTLE).await;

        server.stop().await;

        black.expect_closed().await;
        white.expect_closed().await;
        waiting.expect_closed().await;
        anonymous.expect_closed().await;
    }
}

/// CLIENT LIBRARY TESTS
mod client_tests {
    use super::*;

    struct Player {
        game: ClientGame,
        connection: Arc<ServerConnection>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    }

    impl Player {
        async fn join(addr: SocketAddr, name: &str) -> Self {
            let (tx, events) = mpsc::unbounded_channel();
            let connection = ServerConnection::new(tx);
            connection.connect(&addr.to_string()).await.unwrap();
            let mut player = Player {
                game: ClientGame::new(name).unwrap(),
                connection,
                events,
            };
            assert_eq!(
                player.next_event().await,
                GameEvent::ConnectionEstablished { success: true }
            );
            assert!(player.connection.send_name(player.game.name()).await);
            player
        }

        /// Next frontend event, skipping ticks
        async fn next_event(&mut self) -> GameEvent {
            loop {
                let event = timeout(WAIT, self.events.recv())
                    .await
                    .expect("timed out waiting for an event")
                    .expect("session dropped");
                match self.game.apply(event) {
                    Some(GameEvent::Tick { .. }) | None => continue,
                    Some(event) => return event,
                }
            }
        }

        async fn play(&mut self, column: u8) {
            assert_eq!(self.game.request_move(column), Some(column));
            assert!(self.connection.send_move(column).await);
        }
    }

    /// Both mirrors end up identical to each other after a full game
    #[tokio::test]
    async fn mirrors_agree_after_a_horizontal_win() {
        let server = TestServer::start(30, FirstMove::First).await;

        let mut aric = Player::join(server.addr, "Aric").await;
        sleep(SETTLE).await;
        let mut mia = Player::join(server.addr, "Mia").await;

        assert_eq!(
            aric.next_event().await,
            GameEvent::GameStarted {
                opponent: "Mia".to_string(),
                time_limit: 30,
                you_go_first: true
            }
        );
        assert!(matches!(
            mia.next_event().await,
            GameEvent::GameStarted {
                you_go_first: false,
                ..
            }
        ));

        let moves: [(bool, u8); 7] = [
            (true, 4),
            (false, 4),
            (true, 3),
            (false, 5),
            (true, 2),
            (false, 6),
            (true, 1),
        ];
        for (aric_moves, column) in moves {
            let (mover, waiter) = if aric_moves {
                (&mut aric, &mut mia)
            } else {
                (&mut mia, &mut aric)
            };
            mover.play(column).await;
            assert!(matches!(
                mover.next_event().await,
                GameEvent::MoveMade {
                    by_you: true,
                    column: c,
                    ..
                } if c == column
            ));
            assert!(matches!(
                waiter.next_event().await,
                GameEvent::MoveMade {
                    by_you: false,
                    column: c,
                    ..
                } if c == column
            ));
        }

        assert_eq!(
            aric.next_event().await,
            GameEvent::GameEnded {
                reason: GameOverReason::YouWon
            }
        );
        assert_eq!(
            mia.next_event().await,
            GameEvent::GameEnded {
                reason: GameOverReason::OpponentWon
            }
        );
        assert_eq!(aric.game.board(), mia.game.board());
        assert_eq!(aric.game.board().pieces(), 7);

        server.stop().await;
    }

    #[tokio::test]
    async fn opponent_leaving_is_reported() {
        let server = TestServer::start(30, FirstMove::First).await;

        let mut aric = Player::join(server.addr, "Aric").await;
        sleep(SETTLE).await;
        let mut mia = Player::join(server.addr, "Mia").await;
        aric.next_event().await;
        mia.next_event().await;

        mia.connection.close().await;
        assert_eq!(
            aric.next_event().await,
            GameEvent::GameEnded {
                reason: GameOverReason::OpponentDisconnected
            }
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn server_going_away_is_reported() {
        let server = TestServer::start(30, FirstMove::First).await;
        let mut aric = Player::join(server.addr, "Aric").await;
        sleep(SETTLE).await;

        server.stop().await;
        assert_eq!(
            aric.next_event().await,
            GameEvent::GameEnded {
                reason: GameOverReason::ServerDisconnected
            }
        );
    }
}
