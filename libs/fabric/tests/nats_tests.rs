use pbxlink_fabric::{
    error::Error,
    request,
    transport::{ConnectOptions, Message, NatsConnection, Transport},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestMessage {
    id: u32,
    data: String,
}

/// How the in-process server behaves after accepting a client
#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Echo requests back to their inbox, route publishes to subscribers
    Echo,
    /// Answer the handshake, hang up and stop listening
    HangUp,
    /// Hang up the first client, echo for every later one
    HangUpOnce,
    /// Refuse the CONNECT with -ERR
    Reject,
}

struct FakeServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

/// Spawn a minimal NATS server on a free local port
async fn spawn_server(mode: Mode, max_payload: usize) -> FakeServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let nth = counter.fetch_add(1, Ordering::SeqCst);
            let client_mode = match mode {
                Mode::HangUpOnce if nth == 0 => Mode::HangUp,
                Mode::HangUpOnce => Mode::Echo,
                mode => mode,
            };

            if mode == Mode::HangUp {
                // Serve once, then drop the listener so reconnects fail
                serve(stream, client_mode, addr, max_payload).await;
                return;
            }
            tokio::spawn(serve(stream, client_mode, addr, max_payload));
        }
    });

    FakeServer { addr, accepted }
}

/// NATS subject match with `*` and `>` wildcards
fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut tokens = subject.split('.');
    for part in pattern.split('.') {
        match (part, tokens.next()) {
            (">", Some(_)) => return true,
            ("*", Some(_)) => {}
            (part, Some(token)) if part == token => {}
            _ => return false,
        }
    }
    tokens.next().is_none()
}

async fn serve(stream: TcpStream, mode: Mode, addr: SocketAddr, max_payload: usize) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let info = format!(
        "INFO {{\"server_id\":\"fake\",\"server_name\":\"fake\",\"version\":\"2.10.0\",\
         \"go\":\"go1.21\",\"host\":\"{}\",\"port\":{},\"proto\":1,\"headers\":true,\
         \"max_payload\":{}}}\r\n",
        addr.ip(),
        addr.port(),
        max_payload
    );
    if write.write_all(info.as_bytes()).await.is_err() {
        return;
    }

    let mut subs: HashMap<u64, String> = HashMap::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            break;
        }
        let parts: Vec<String> = line.split_whitespace().map(String::from).collect();
        let Some(op) = parts.first() else {
            continue;
        };
        let written = match op.to_ascii_uppercase().as_str() {
            "CONNECT" if mode == Mode::Reject => {
                let _ = write.write_all(b"-ERR 'Authorization Violation'\r\n").await;
                return;
            }
            "PING" => {
                let written = write.write_all(b"PONG\r\n").await;
                if mode == Mode::HangUp {
                    return;
                }
                written
            }
            "SUB" => {
                // SUB <subject> [queue] <sid>
                if let Ok(sid) = parts[parts.len() - 1].parse() {
                    subs.insert(sid, parts[1].clone());
                }
                Ok(())
            }
            "UNSUB" => {
                if let Ok(sid) = parts[1].parse::<u64>() {
                    if parts.len() == 2 {
                        subs.remove(&sid);
                    }
                }
                Ok(())
            }
            "PUB" => {
                let (subject, reply, len) = if parts.len() == 4 {
                    (parts[1].clone(), Some(parts[2].clone()), parts[3].parse().unwrap_or(0))
                } else {
                    (parts[1].clone(), None, parts[2].parse().unwrap_or(0))
                };
                let mut payload = vec![0u8; len + 2];
                if reader.read_exact(&mut payload).await.is_err() {
                    return;
                }
                payload.truncate(len);

                if subject == "silent" {
                    continue;
                }
                let target = reply.unwrap_or(subject);
                let mut frame = Vec::new();
                for (sid, pattern) in &subs {
                    if subject_matches(pattern, &target) {
                        frame.extend_from_slice(
                            format!("MSG {} {} {}\r\n", target, sid, payload.len()).as_bytes(),
                        );
                        frame.extend_from_slice(&payload);
                        frame.extend_from_slice(b"\r\n");
                    }
                }
                write.write_all(&frame).await
            }
            _ => Ok(()),
        };
        if written.is_err() {
            return;
        }
    }
}

fn options(addr: SocketAddr) -> ConnectOptions {
    ConnectOptions::parse(&format!("nats://{}", addr), "").unwrap()
}

async fn connect(addr: SocketAddr) -> NatsConnection {
    NatsConnection::connect(options(addr)).await.unwrap()
}

/// Poll `check` until it holds or `limit` passes
async fn wait_for(limit: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

fn test_message(id: u32, data: &str) -> TestMessage {
    TestMessage {
        id,
        data: data.to_string(),
    }
}

#[test]
fn wildcard_subjects_match() {
    assert!(subject_matches("_INBOX.abc.*", "_INBOX.abc.1"));
    assert!(subject_matches("_INBOX.>", "_INBOX.abc.1"));
    assert!(!subject_matches("_INBOX.abc.*", "_INBOX.abc.1.2"));
    assert!(!subject_matches("events", "events.more"));
}

#[tokio::test]
async fn request_receives_reply() {
    let server = spawn_server(Mode::Echo, 1024 * 1024).await;
    let connection = connect(server.addr).await;
    assert!(connection.is_connected());
    assert_eq!(connection.server_info().server_id, "fake");

    let msg = test_message(42, "test data");
    let reply: TestMessage = connection
        .request("test_pbx.host", &msg, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(reply, msg);
    connection.close().await;
}

#[tokio::test]
async fn request_timeout_fires() {
    let server = spawn_server(Mode::Echo, 1024 * 1024).await;
    let connection = connect(server.addr).await;

    let result: Result<TestMessage, _> = connection
        .request("silent", &test_message(1, "nobody listens"), Duration::from_millis(100))
        .await;

    match result.unwrap_err() {
        Error::Timeout { subject, timeout } => {
            assert_eq!(subject, "silent");
            assert_eq!(timeout, Duration::from_millis(100));
        }
        e => panic!("Expected timeout error, got {:?}", e),
    }

    // The connection stays usable after a timeout
    assert!(connection.is_connected());
    connection.close().await;
}

#[tokio::test]
async fn close_fails_request_in_flight() {
    let server = spawn_server(Mode::Echo, 1024 * 1024).await;
    let connection = Arc::new(connect(server.addr).await);

    let pending = {
        let connection = Arc::clone(&connection);
        tokio::spawn(async move {
            let result: Result<TestMessage, Error> = connection
                .request("silent", &test_message(1, "waiting"), Duration::from_secs(30))
                .await;
            result
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    connection.close().await;

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("request still waiting after close")
        .unwrap();
    assert!(matches!(result, Err(Error::NotConnected)));
}

#[tokio::test]
async fn undecodable_reply_is_decode_error() {
    let server = spawn_server(Mode::Echo, 1024 * 1024).await;
    let connection = connect(server.addr).await;

    // The echoed string cannot be read back as a TestMessage
    let result: Result<TestMessage, _> = connection
        .request("test_pbx.host", &"plain string".to_string(), Duration::from_secs(2))
        .await;

    assert!(matches!(result, Err(Error::Decode(_))));
}

#[tokio::test]
async fn publish_reaches_subscriber() {
    let server = spawn_server(Mode::Echo, 1024 * 1024).await;
    let connection = connect(server.addr).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let subscription = connection
        .subscribe(
            "events",
            Arc::new(move |msg: Message| {
                let _ = tx.send(msg);
            }),
        )
        .await
        .unwrap();
    assert_eq!(subscription.subject(), "events");
    assert!(subscription.is_active());

    let msg = test_message(7, "published");
    connection.publish("events", &msg).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.subject, "events");
    assert_eq!(received.reply, None);
    let decoded: TestMessage = received.decode(&pbxlink_fabric::JsonCodec).unwrap();
    assert_eq!(decoded, msg);

    subscription.unsubscribe();
    assert!(!subscription.is_active());
}

#[tokio::test]
async fn close_is_idempotent() {
    let server = spawn_server(Mode::Echo, 1024 * 1024).await;
    let connection = connect(server.addr).await;

    connection.close().await;
    connection.close().await;
    assert!(!connection.is_connected());

    let result: Result<TestMessage, _> = connection
        .request("test_pbx.host", &1u32, Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(Error::NotConnected)));
    assert!(matches!(
        connection.publish("events", &1u32).await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn server_hang_up_marks_connection_down() {
    let server = spawn_server(Mode::HangUp, 1024 * 1024).await;
    let connection = connect(server.addr).await;

    // Nothing listens any more, so reconnect attempts keep failing
    assert!(wait_for(Duration::from_secs(2), || !connection.is_connected()).await);

    let result: Result<TestMessage, _> = connection
        .request("test_pbx.host", &1u32, Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(Error::NotConnected)));
    connection.close().await;
}

#[tokio::test]
async fn reconnects_after_server_hang_up() {
    let server = spawn_server(Mode::HangUpOnce, 1024 * 1024).await;
    let connection = connect(server.addr).await;

    assert!(wait_for(Duration::from_secs(10), || server.accepted.load(Ordering::SeqCst) >= 2).await);
    assert!(wait_for(Duration::from_secs(10), || connection.is_connected()).await);

    let msg = test_message(3, "after reconnect");
    let reply: TestMessage = connection
        .request("test_pbx.host", &msg, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply, msg);
    connection.close().await;
}

#[tokio::test]
async fn unreachable_server_is_connect_error() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    match NatsConnection::connect(options(addr)).await {
        Err(Error::Connect { servers, .. }) => assert!(servers.contains(&addr.to_string())),
        Err(e) => panic!("Expected connect error, got {:?}", e),
        Ok(_) => panic!("Expected connect error"),
    }
}

#[tokio::test]
async fn falls_through_to_next_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);
    let live = spawn_server(Mode::Echo, 1024 * 1024).await;

    let options =
        ConnectOptions::parse(&format!("nats://{},nats://{}", dead, live.addr), "").unwrap();
    let connection = NatsConnection::connect(options).await.unwrap();

    assert!(connection.is_connected());
    assert_eq!(connection.server_info().port, live.addr.port());
    connection.close().await;
}

#[tokio::test]
async fn rejected_connect_is_connect_error() {
    let server = spawn_server(Mode::Reject, 1024 * 1024).await;

    match NatsConnection::connect(options(server.addr)).await {
        Err(Error::Connect { servers, reason }) => {
            assert!(servers.contains(&server.addr.to_string()));
            assert!(!reason.is_empty());
        }
        Err(e) => panic!("Expected connect error, got {:?}", e),
        Ok(_) => panic!("Expected connect error"),
    }
}

#[tokio::test]
async fn missing_ca_file_is_tls_error() {
    let options = ConnectOptions::parse("tls://127.0.0.1:4222", "/nonexistent/ca.pem").unwrap();

    match NatsConnection::connect(options).await {
        Err(Error::Tls(reason)) => assert!(reason.contains("/nonexistent/ca.pem")),
        Err(e) => panic!("Expected TLS error, got {:?}", e),
        Ok(_) => panic!("Expected TLS error"),
    }
}

#[tokio::test]
async fn rejects_payload_above_server_limit() {
    let server = spawn_server(Mode::Echo, 16).await;
    let connection = connect(server.addr).await;

    let result: Result<TestMessage, _> = connection
        .request(
            "test_pbx.host",
            &test_message(1, "far more than sixteen bytes of data"),
            Duration::from_secs(1),
        )
        .await;

    match result.unwrap_err() {
        Error::Protocol(msg) => assert!(msg.contains("exceeds")),
        e => panic!("Expected protocol error, got {:?}", e),
    }
}

#[tokio::test]
async fn one_off_request_and_publish() {
    let server = spawn_server(Mode::Echo, 1024 * 1024).await;

    let msg = test_message(9, "one off");
    let reply: TestMessage =
        request::request(options(server.addr), "test_pbx.host", &msg, Duration::from_secs(2))
            .await
            .unwrap();
    assert_eq!(reply, msg);

    request::publish(options(server.addr), "events", &msg)
        .await
        .unwrap();
    assert_eq!(server.accepted.load(Ordering::SeqCst), 2);
}
