//! Integration tests for the TCP chat server.
//!
//! Each test binds a real server on an ephemeral port and drives it with
//! plain `TcpStream` clients speaking the line protocol.

use std::net::SocketAddr;
use std::time::Duration;

use line_chat::client::CONNECTED_BANNER;
use line_chat::config::MAX_LINE_LENGTH;
use line_chat::{chat, ChatConfig, ChatServer, ClientExit, SessionRegistry};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single expected event
const WAIT: Duration = Duration::from_secs(3);

/// How long to wait before concluding that no line is coming
const QUIET: Duration = Duration::from_millis(200);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: SessionRegistry,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), line_chat::AppError>>,
}

impl TestServer {
    async fn spawn() -> Self {
        let server = ChatServer::bind(&ChatConfig::with_bind_addr("127.0.0.1:0"))
            .await
            .expect("bind server");
        let addr = server.local_addr().expect("local addr");
        let registry = server.registry().clone();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));
        Self {
            addr,
            registry,
            shutdown,
            handle,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect");
        let (reader, writer) = stream.into_split();
        TestClient {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Connect and complete the handshake with `name`
    async fn join(&self, name: &str) -> TestClient {
        let before = self.registry.names().len();
        let mut client = self.connect().await;
        assert_eq!(client.read_line().await.as_deref(), Some("Enter your name:"));
        client.send(name).await;
        self.wait_for(|r| r.names().len() > before).await;
        client
    }

    async fn wait_for(&self, cond: impl Fn(&SessionRegistry) -> bool) {
        timeout(WAIT, async {
            while !cond(&self.registry) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry condition not reached");
    }
}

/// Next line printed by a terminal client
async fn read_screen(screen: &mut BufReader<DuplexStream>) -> String {
    let mut line = String::new();
    timeout(WAIT, screen.read_line(&mut line))
        .await
        .expect("timed out waiting for screen")
        .expect("read screen");
    line.trim_end_matches('\n').to_string()
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Next line, or None on end of stream
    async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for line")
            .expect("read line");
        (n > 0).then(|| line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Assert that nothing arrives for a short while
    async fn expect_silence(&mut self) {
        let mut line = String::new();
        if let Ok(result) = timeout(QUIET, self.reader.read_line(&mut line)).await {
            panic!("unexpected input: {:?} ({:?})", line, result);
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("write line");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_scenario() {
    let server = TestServer::spawn().await;

    let mut alice = server.join("Alice").await;

    let mut bob = server.connect().await;
    assert_eq!(bob.read_line().await.as_deref(), Some("Enter your name:"));
    bob.send("Bob").await;
    assert_eq!(alice.read_line().await.as_deref(), Some("Bob has joined the chat!"));

    bob.send("hello").await;
    assert_eq!(alice.read_line().await.as_deref(), Some("Bob: hello"));

    bob.send("/quit").await;
    assert_eq!(alice.read_line().await.as_deref(), Some("Bob has left the chat!"));

    // Bob got nothing from his own traffic; the server closed his connection
    assert_eq!(bob.read_line().await, None);
    server.wait_for(|r| r.len() == 1).await;

    alice.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chat_reaches_everyone_but_sender() {
    let server = TestServer::spawn().await;

    let mut s = server.join("S").await;
    let mut a = server.join("A").await;
    assert_eq!(s.read_line().await.as_deref(), Some("A has joined the chat!"));
    let mut b = server.join("B").await;
    assert_eq!(s.read_line().await.as_deref(), Some("B has joined the chat!"));
    assert_eq!(a.read_line().await.as_deref(), Some("B has joined the chat!"));
    let mut c = server.join("C").await;
    for peer in [&mut s, &mut a, &mut b] {
        assert_eq!(peer.read_line().await.as_deref(), Some("C has joined the chat!"));
    }

    s.send("ping").await;
    for peer in [&mut a, &mut b, &mut c] {
        assert_eq!(peer.read_line().await.as_deref(), Some("S: ping"));
    }
    s.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_departure_once_on_stream_drop() {
    let server = TestServer::spawn().await;

    let mut alice = server.join("Alice").await;
    let carol = server.join("Carol").await;
    assert_eq!(alice.read_line().await.as_deref(), Some("Carol has joined the chat!"));

    drop(carol);

    assert_eq!(alice.read_line().await.as_deref(), Some("Carol has left the chat!"));
    alice.expect_silence().await;
    server.wait_for(|r| r.len() == 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quit_is_case_insensitive() {
    let server = TestServer::spawn().await;

    let mut alice = server.join("Alice").await;
    let mut dan = server.join("Dan").await;
    assert_eq!(alice.read_line().await.as_deref(), Some("Dan has joined the chat!"));

    dan.send("/QuIt").await;
    assert_eq!(alice.read_line().await.as_deref(), Some("Dan has left the chat!"));
    assert_eq!(dan.read_line().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_and_empty_names_allowed() {
    let server = TestServer::spawn().await;

    let mut first = server.join("Sam").await;
    let mut second = server.join("Sam").await;
    assert_eq!(first.read_line().await.as_deref(), Some("Sam has joined the chat!"));
    let _blank = server.join("").await;
    assert_eq!(first.read_line().await.as_deref(), Some(" has joined the chat!"));
    assert_eq!(second.read_line().await.as_deref(), Some(" has joined the chat!"));

    assert_eq!(server.registry.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_and_disconnects() {
    let server = TestServer::spawn().await;

    let mut clients = Vec::new();
    for _ in 0..16 {
        clients.push(server.connect().await);
    }
    server.wait_for(|r| r.len() == 16).await;

    // Drop half of them at once
    let keep: Vec<_> = clients.drain(..8).collect();
    drop(clients);
    server.wait_for(|r| r.len() == 8).await;

    drop(keep);
    server.wait_for(|r| r.is_empty()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_stops_accepting_and_closes_sessions() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice").await;

    let TestServer {
        addr,
        registry,
        shutdown,
        handle,
    } = server;

    shutdown.cancel();
    let result = timeout(WAIT, handle).await.expect("server stops");
    assert!(result.expect("join").is_ok());

    assert_eq!(alice.read_line().await, None);
    timeout(WAIT, async {
        while !registry.is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sessions cleaned up");
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unnamed_departure_uses_placeholder() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice").await;

    let mut lurker = server.connect().await;
    assert_eq!(lurker.read_line().await.as_deref(), Some("Enter your name:"));
    server.wait_for(|r| r.len() == 2).await;
    drop(lurker);

    assert_eq!(alice.read_line().await.as_deref(), Some("Unknown has left the chat!"));
    alice.expect_silence().await;
    server.wait_for(|r| r.len() == 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_non_utf8_name_keeps_session() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("Alice").await;

    let mut jose = server.connect().await;
    assert_eq!(jose.read_line().await.as_deref(), Some("Enter your name:"));
    jose.writer.write_all(b"Jos\xe9\n").await.expect("write name");
    assert_eq!(
        alice.read_line().await.as_deref(),
        Some("Jos\u{FFFD} has joined the chat!")
    );

    jose.send("hola").await;
    assert_eq!(alice.read_line().await.as_deref(), Some("Jos\u{FFFD}: hola"));
    assert_eq!(server.registry.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_length_line_reaches_terminal_client() {
    let server = TestServer::spawn().await;

    // Alice uses the terminal client, fed through in-memory pipes
    let stream = TcpStream::connect(server.addr).await.expect("connect");
    let (server_read, server_write) = stream.into_split();
    let (mut keyboard, input) = tokio::io::duplex(1024);
    let (output, screen) = tokio::io::duplex(64 * 1024);
    let terminal = tokio::spawn(chat(server_read, server_write, input, output));
    let mut screen = BufReader::new(screen);

    assert_eq!(read_screen(&mut screen).await, CONNECTED_BANNER);
    assert_eq!(read_screen(&mut screen).await, "Enter your name:");
    keyboard.write_all(b"Alice\n").await.expect("type name");
    server.wait_for(|r| r.names().len() == 1).await;

    let mut bob = server.join("Bob").await;
    assert_eq!(read_screen(&mut screen).await, "Bob has joined the chat!");

    let long = "x".repeat(MAX_LINE_LENGTH);
    bob.send(&long).await;
    assert_eq!(read_screen(&mut screen).await, format!("Bob: {}", long));

    bob.send("/quit").await;
    assert_eq!(read_screen(&mut screen).await, "Bob has left the chat!");

    keyboard.write_all(b"/quit\n").await.expect("type quit");
    let exit = timeout(WAIT, terminal)
        .await
        .expect("client exits")
        .expect("join")
        .expect("chat");
    assert_eq!(exit, ClientExit::Quit);
}
