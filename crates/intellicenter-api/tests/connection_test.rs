// Integration tests for `Connection` against a scripted local TCP peer.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;

use intellicenter_api::health::HealthConfig;
use intellicenter_api::message::command;
use intellicenter_api::{Connection, ConnectionConfig, ConnectionEvent, DisconnectReason, Error};

// ── Helpers ─────────────────────────────────────────────────────────

struct Peer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.unwrap();
        assert!(n > 0, "client closed the connection");
        assert!(line.ends_with("\r\n"), "line not terminated: {line:?}");
        serde_json::from_str(line.trim_end()).unwrap()
    }

    /// Assert nothing arrives for `wait`.
    async fn expect_silence(&mut self, wait: Duration) {
        let mut line = String::new();
        let got = tokio::time::timeout(wait, self.reader.read_line(&mut line)).await;
        assert!(got.is_err(), "unexpected line from client: {line:?}");
    }

    async fn send_raw(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).await.unwrap();
    }

    async fn send(&mut self, value: &Value) {
        self.send_raw(&format!("{value}\r\n")).await;
    }

    async fn respond(&mut self, request: &Value, code: &str) {
        self.send(&json!({
            "messageID": request["messageID"],
            "command": "SendParamList",
            "response": code,
            "objectList": [],
        }))
        .await;
    }
}

fn fast_config(port: u16) -> ConnectionConfig {
    ConnectionConfig {
        host: "127.0.0.1".into(),
        port,
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        ..ConnectionConfig::default()
    }
}

async fn setup_with(
    mut config: ConnectionConfig,
) -> (Connection, UnboundedReceiver<ConnectionEvent>, Peer) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    config.port = listener.local_addr().unwrap().port();
    let (client, accepted) = tokio::join!(Connection::connect(&config), listener.accept());
    let (conn, events) = client.unwrap();
    let (stream, _) = accepted.unwrap();
    (conn, events, peer(stream))
}

async fn setup() -> (Connection, UnboundedReceiver<ConnectionEvent>, Peer) {
    setup_with(fast_config(0)).await
}

fn peer(stream: TcpStream) -> Peer {
    let (read, writer) = stream.into_split();
    Peer {
        reader: BufReader::new(read),
        writer,
    }
}

async fn next_event(events: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn empty() -> Map<String, Value> {
    Map::new()
}

// ── Flow control ────────────────────────────────────────────────────

#[tokio::test]
async fn test_one_request_on_the_wire_at_a_time() {
    let (conn, _events, mut peer) = setup().await;

    for _ in 0..3 {
        conn.send_command(command::GET_PARAM_LIST, empty()).await.unwrap();
    }

    let first = peer.recv().await;
    assert_eq!(first["messageID"], "1");
    assert_eq!(first["command"], "GetParamList");
    peer.expect_silence(Duration::from_millis(150)).await;

    peer.respond(&first, "200").await;
    let second = peer.recv().await;
    assert_eq!(second["messageID"], "2");
    peer.expect_silence(Duration::from_millis(150)).await;

    peer.respond(&second, "200").await;
    let third = peer.recv().await;
    assert_eq!(third["messageID"], "3");
}

#[tokio::test]
async fn test_message_ids_restart_on_new_connection() {
    let (first_conn, _e1, mut first_peer) = setup().await;
    first_conn.send_command(command::GET_QUERY, empty()).await.unwrap();
    assert_eq!(first_peer.recv().await["messageID"], "1");

    let (second_conn, _e2, mut second_peer) = setup().await;
    second_conn.send_command(command::GET_QUERY, empty()).await.unwrap();
    assert_eq!(second_peer.recv().await["messageID"], "1");
}

// ── Awaited requests ────────────────────────────────────────────────

#[tokio::test]
async fn test_send_and_wait_resolves_by_message_id() {
    let (conn, mut events, mut peer) = setup().await;

    let server = tokio::spawn(async move {
        let request = peer.recv().await;
        peer.send(&json!({
            "messageID": request["messageID"],
            "command": "SendParamList",
            "response": "200",
            "objectList": [{ "objnam": "INCR", "params": { "MODE": "ENGLISH" } }],
        }))
        .await;
        peer
    });

    let reply = conn
        .send_command_and_wait(command::GET_PARAM_LIST, empty())
        .await
        .unwrap();
    assert!(reply.is_success());
    let entries = reply.object_list().unwrap().unwrap();
    assert_eq!(entries[0].params["MODE"], "ENGLISH");

    // Consumed by the waiter, so not forwarded.
    assert!(events.try_recv().is_err());
    let _peer = server.await.unwrap();

    let metrics = conn.metrics().await;
    assert_eq!(metrics.requests_sent, 1);
    assert_eq!(metrics.requests_completed, 1);
    assert_eq!(metrics.requests_failed, 0);
    assert!(metrics.average_response_time.is_some());
}

#[tokio::test]
async fn test_error_response_fails_the_command() {
    let (conn, _events, mut peer) = setup().await;

    let server = tokio::spawn(async move {
        let request = peer.recv().await;
        peer.respond(&request, "400").await;
        peer
    });

    let err = conn
        .send_command_and_wait(command::SET_PARAM_LIST, empty())
        .await
        .unwrap_err();
    match err {
        Error::CommandFailed { command, code } => {
            assert_eq!(command, "SetParamList");
            assert_eq!(code, "400");
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
    let _peer = server.await.unwrap();
}

#[tokio::test]
async fn test_pending_request_fails_when_peer_disconnects() {
    let (conn, _events, mut peer) = setup().await;

    let server = tokio::spawn(async move {
        let _ = peer.recv().await;
        drop(peer);
    });

    let err = conn
        .send_command_and_wait(command::GET_QUERY, empty())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Closed), "got {err:?}");
    server.await.unwrap();
}

// ── Inbound handling ────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_json_is_dropped_and_connection_survives() {
    let (conn, mut events, mut peer) = setup().await;

    peer.send_raw("{this is not json\r\n").await;
    peer.send_raw("{\"command\":\"NotifyList\"}\r\n").await;
    peer.send(&json!({
        "messageID": "push-1",
        "command": "NotifyList",
        "objectList": [{ "objnam": "PUMP1", "params": { "STATUS": "4" } }],
    }))
    .await;

    match next_event(&mut events).await {
        ConnectionEvent::Message(msg) => {
            assert_eq!(msg.command, "NotifyList");
            assert_eq!(msg.message_id, "push-1");
        }
        other => panic!("expected a message, got {other:?}"),
    }
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn test_non_object_json_closes_connection() {
    let (conn, mut events, mut peer) = setup().await;

    peer.send_raw("[1,2,3]\r\n").await;

    match next_event(&mut events).await {
        ConnectionEvent::Closed(DisconnectReason::Protocol(_)) => {}
        other => panic!("expected a protocol close, got {other:?}"),
    }
    assert!(conn.is_closed());
    assert!(matches!(
        conn.send_command(command::GET_QUERY, empty()).await,
        Err(Error::Closed)
    ));
}

#[tokio::test]
async fn test_overlong_line_closes_connection() {
    let config = ConnectionConfig {
        max_line_length: 64,
        ..fast_config(0)
    };
    let (_conn, mut events, mut peer) = setup_with(config).await;

    peer.send_raw(&"x".repeat(200)).await;

    match next_event(&mut events).await {
        ConnectionEvent::Closed(DisconnectReason::Protocol(reason)) => {
            assert!(reason.contains("too long"), "{reason}");
        }
        other => panic!("expected a protocol close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_peer_close_is_reported_as_eof() {
    let (_conn, mut events, peer) = setup().await;
    drop(peer);

    match next_event(&mut events).await {
        ConnectionEvent::Closed(reason) => assert_eq!(reason, DisconnectReason::Eof),
        other => panic!("expected close, got {other:?}"),
    }
}

// ── Health ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_idle_connection_closes_exactly_once() {
    let config = ConnectionConfig {
        health: HealthConfig {
            check_interval: Duration::from_millis(20),
            keepalive_interval: Duration::from_secs(60),
            flow_control_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_millis(100),
        },
        ..fast_config(0)
    };
    let (conn, mut events, _peer) = setup_with(config).await;

    match next_event(&mut events).await {
        ConnectionEvent::Closed(DisconnectReason::IdleTimeout { idle_for }) => {
            assert!(idle_for >= Duration::from_millis(100));
        }
        other => panic!("expected idle close, got {other:?}"),
    }

    assert!(!conn.close(DisconnectReason::Requested));
    let second = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
    assert!(second.is_err(), "got a second event: {second:?}");
}

#[tokio::test]
async fn test_keepalive_is_sent_when_quiet() {
    let config = ConnectionConfig {
        health: HealthConfig {
            check_interval: Duration::from_millis(20),
            keepalive_interval: Duration::from_millis(50),
            flow_control_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
        },
        ..fast_config(0)
    };
    let (_conn, _events, mut peer) = setup_with(config).await;

    let keepalive = tokio::time::timeout(Duration::from_secs(2), peer.recv())
        .await
        .unwrap();
    assert_eq!(keepalive["command"], "GetParamList");
    assert_eq!(keepalive["objectList"][0]["keys"], json!(["MODE"]));
}

// ── Connect failures ────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = Connection::connect(&fast_config(port)).await.unwrap_err();
    assert!(matches!(err, Error::Connect { .. }), "got {err:?}");
    assert!(err.is_transient());
}
