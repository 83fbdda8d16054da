//! End-to-end protocol tests against a live server on an ephemeral port.
//!
//! Each test starts its own server on `127.0.0.1:0` and talks to it over raw
//! TCP, one line at a time. Every read is guarded by a timeout so a missing
//! reply fails the test instead of hanging it.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use ircserv::config::ServerConfig;
use ircserv::server::Server;

const PASSWORD: &str = "secret";

/// How long to wait for a line before considering it failed.
const TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ──────────────────────────────────────────────────────

fn test_config() -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        password: PASSWORD.to_string(),
        ..Default::default()
    }
}

async fn start_server() -> (SocketAddr, CancellationToken, JoinHandle<anyhow::Result<()>>) {
    let cancel = CancellationToken::new();
    let (addr, handle) = Server::new(test_config())
        .start(cancel.clone())
        .await
        .expect("server should start");
    (addr, cancel, handle)
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Connect and complete PASS/NICK/USER, consuming the welcome burst.
    async fn register(addr: SocketAddr, nick: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("PASS {PASSWORD}")).await;
        client.send(&format!("NICK {nick}")).await;
        client.send(&format!("USER {nick} 0 * :{nick}")).await;
        client.expect_numeric("004").await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\r\n").as_bytes()).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
        self.writer.flush().await.expect("flush");
    }

    /// Next line, or `None` at EOF.
    async fn next_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .expect("read");
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn recv(&mut self) -> String {
        self.next_line().await.expect("connection closed early")
    }

    /// Read until a line satisfies `predicate`, returning it.
    async fn wait_for(&mut self, predicate: impl Fn(&str) -> bool, desc: &str) -> String {
        loop {
            match self.next_line().await {
                Some(line) if predicate(&line) => return line,
                Some(_) => continue,
                None => panic!("connection closed while waiting for {desc}"),
            }
        }
    }

    async fn expect_numeric(&mut self, numeric: &str) -> String {
        self.wait_for(|line| numeric_of(line) == Some(numeric), numeric)
            .await
    }

    /// Read everything up to EOF, returning what arrived.
    async fn read_to_close(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await {
            lines.push(line);
        }
        lines
    }
}

fn numeric_of(line: &str) -> Option<&str> {
    line.split(' ').nth(1)
}

// ── Registration ─────────────────────────────────────────────────

#[tokio::test]
async fn registration_sends_welcome_burst() {
    let (addr, cancel, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;
    client.send("PASS secret").await;
    client.send("NICK alice").await;
    client.send("USER alice 0 * :Alice").await;

    let burst = [
        client.recv().await,
        client.recv().await,
        client.recv().await,
        client.recv().await,
    ];
    let numerics: Vec<_> = burst.iter().filter_map(|l| numeric_of(l)).collect();
    assert_eq!(numerics, ["001", "002", "003", "004"]);
    assert_eq!(
        burst[0],
        ":ircserv 001 alice :Welcome to the Internet Relay Network alice!alice@127.0.0.1"
    );
    assert!(burst[3].starts_with(":ircserv 004 alice ircserv ircserv-"));
    cancel.cancel();
}

#[tokio::test]
async fn wrong_password_can_be_retried() {
    let (addr, cancel, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;
    client.send("PASS wrong").await;
    assert_eq!(client.recv().await, ":ircserv 464 * :Password incorrect");
    client.send("PASS secret").await;
    client.send("NICK bob").await;
    client.send("USER bob 0 * :Bob").await;
    client.expect_numeric("001").await;
    cancel.cancel();
}

#[tokio::test]
async fn unauthenticated_join_is_refused() {
    let (addr, cancel, _handle) = start_server().await;
    let mut stranger = Client::connect(addr).await;
    stranger.send("JOIN #test").await;
    assert_eq!(stranger.recv().await, ":ircserv 451 * :You have not registered");

    // #test was never created: the next joiner becomes its operator.
    let mut bob = Client::register(addr, "bob").await;
    bob.send("JOIN #test").await;
    let names = bob.expect_numeric("353").await;
    assert_eq!(names, ":ircserv 353 bob = #test :@bob");
    cancel.cancel();
}

#[tokio::test]
async fn nick_collision_across_connections() {
    let (addr, cancel, _handle) = start_server().await;
    let _alice = Client::register(addr, "Alice").await;
    let mut other = Client::connect(addr).await;
    other.send("PASS secret").await;
    other.send("NICK ALICE").await;
    assert_eq!(
        other.recv().await,
        ":ircserv 433 * ALICE :Nickname is already in use"
    );
    cancel.cancel();
}

// ── Channels ─────────────────────────────────────────────────────

#[tokio::test]
async fn kick_is_seen_by_everyone() {
    let (addr, cancel, _handle) = start_server().await;
    let mut alice = Client::register(addr, "alice").await;
    let mut bob = Client::register(addr, "bob").await;

    alice.send("JOIN #test").await;
    alice.expect_numeric("366").await;
    bob.send("JOIN #test").await;
    bob.expect_numeric("366").await;
    alice
        .wait_for(|l| l == ":bob!bob@127.0.0.1 JOIN #test", "bob's JOIN")
        .await;

    alice.send("KICK #test bob :bye").await;
    let expected = ":alice!alice@127.0.0.1 KICK #test bob :bye";
    assert_eq!(alice.recv().await, expected);
    assert_eq!(bob.recv().await, expected);

    // Not a ban: bob may come straight back.
    bob.send("JOIN #test").await;
    assert_eq!(bob.recv().await, ":bob!bob@127.0.0.1 JOIN #test");
    cancel.cancel();
}

#[tokio::test]
async fn channel_limit_turns_away_extra_joiners() {
    let (addr, cancel, _handle) = start_server().await;
    let mut op = Client::register(addr, "op").await;
    op.send("JOIN #test").await;
    op.expect_numeric("366").await;
    op.send("MODE #test +l 5").await;
    assert_eq!(op.recv().await, ":op!op@127.0.0.1 MODE #test +l 5");

    let mut outcomes = Vec::new();
    let mut clients = Vec::new();
    for n in 1..=10 {
        let mut client = Client::register(addr, &format!("user{n}")).await;
        client.send("JOIN #test").await;
        let reply = client
            .wait_for(
                |l| numeric_of(l) == Some("JOIN") || numeric_of(l) == Some("471"),
                "JOIN or 471",
            )
            .await;
        outcomes.push(numeric_of(&reply).map(str::to_string));
        clients.push(client);
    }

    let joined = outcomes.iter().filter(|o| o.as_deref() == Some("JOIN")).count();
    let refused = outcomes.iter().filter(|o| o.as_deref() == Some("471")).count();
    assert_eq!(joined, 4);
    assert_eq!(refused, 6);
    cancel.cancel();
}

#[tokio::test]
async fn channel_message_relay() {
    let (addr, cancel, _handle) = start_server().await;
    let mut alice = Client::register(addr, "alice").await;
    let mut bob = Client::register(addr, "bob").await;
    alice.send("JOIN #chat").await;
    alice.expect_numeric("366").await;
    bob.send("JOIN #chat").await;
    bob.expect_numeric("366").await;

    bob.send("PRIVMSG #chat :hello from bob").await;
    alice
        .wait_for(
            |l| l == ":bob!bob@127.0.0.1 PRIVMSG #chat :hello from bob",
            "bob's message",
        )
        .await;

    // Sender does not hear its own message; the next thing bob sees is the PONG.
    bob.send("PING marker").await;
    assert_eq!(bob.recv().await, ":ircserv PONG ircserv :marker");
    cancel.cancel();
}

// ── Framing ──────────────────────────────────────────────────────

#[tokio::test]
async fn fragmented_and_lf_only_lines() {
    let (addr, cancel, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;
    client.send_raw(b"PI").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.send_raw(b"NG one\r").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.send_raw(b"\nPING two\nPING three\r\n").await;

    assert_eq!(client.recv().await, ":ircserv PONG ircserv :one");
    assert_eq!(client.recv().await, ":ircserv PONG ircserv :two");
    assert_eq!(client.recv().await, ":ircserv PONG ircserv :three");
    cancel.cancel();
}

#[tokio::test]
async fn oversized_garbage_does_not_kill_the_connection() {
    let (addr, cancel, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;
    client.send_raw(&[b'x'; 4000]).await;
    client.send_raw(b"\r\nPING alive\r\n").await;
    assert_eq!(client.recv().await, ":ircserv PONG ircserv :alive");
    cancel.cancel();
}

// ── Disconnects ──────────────────────────────────────────────────

#[tokio::test]
async fn quit_closes_connection_and_informs_peers() {
    let (addr, cancel, _handle) = start_server().await;
    let mut alice = Client::register(addr, "alice").await;
    let mut bob = Client::register(addr, "bob").await;
    alice.send("JOIN #test").await;
    alice.expect_numeric("366").await;
    bob.send("JOIN #test").await;
    bob.expect_numeric("366").await;

    alice.send("QUIT :gone").await;
    let tail = alice.read_to_close().await;
    assert!(
        tail.iter()
            .any(|l| l == "ERROR :Closing Link: 127.0.0.1 (gone)"),
        "{tail:?}"
    );
    bob.wait_for(|l| l == ":alice!alice@127.0.0.1 QUIT :gone", "alice's QUIT")
        .await;

    // The nickname is free again.
    let _again = Client::register(addr, "alice").await;
    cancel.cancel();
}

#[tokio::test]
async fn dropped_socket_is_cleaned_up() {
    let cancel = CancellationToken::new();
    let listening = Server::new(test_config()).bind().await.unwrap();
    let addr = listening.local_addr().unwrap();
    let state = listening.state();
    let _handle = tokio::spawn(listening.serve(cancel.clone()));

    let mut alice = Client::register(addr, "alice").await;
    let mut bob = Client::register(addr, "bob").await;
    alice.send("JOIN #test").await;
    alice.expect_numeric("366").await;
    bob.send("JOIN #test,#bobs").await;
    bob.expect_numeric("366").await;
    bob.expect_numeric("366").await;
    drop(bob);

    alice
        .wait_for(
            |l| l == ":bob!bob@127.0.0.1 QUIT :Connection closed",
            "bob's QUIT",
        )
        .await;
    {
        let reg = state.registry.lock();
        assert_eq!(reg.client_count(), 1);
        assert!(reg.channel("#bobs").is_none());
        assert_eq!(reg.channel("#test").map(|c| c.member_count()), Some(1));
        assert_eq!(reg.client_by_nick("bob"), None);
    }
    cancel.cancel();
}

#[tokio::test]
async fn shutdown_says_goodbye_to_every_client() {
    let (addr, cancel, handle) = start_server().await;
    let mut alice = Client::register(addr, "alice").await;
    let mut stranger = Client::connect(addr).await;
    stranger.send("PING ready").await;
    stranger.recv().await;

    cancel.cancel();
    let goodbye = "ERROR :Closing Link: 127.0.0.1 (Server shutting down)";
    assert!(alice.read_to_close().await.iter().any(|l| l == goodbye));
    assert!(stranger.read_to_close().await.iter().any(|l| l == goodbye));

    let result = timeout(TIMEOUT, handle).await.expect("server stops in time");
    assert!(result.expect("server task").is_ok());
}
