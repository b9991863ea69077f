//! End-to-end tests: a real relay on an ephemeral port, real WebSocket clients

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use ws_relay::handler::{PushResponse, StatsResponse};
use ws_relay::{CancellationToken, Connection, Registry, Relay};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestRelay {
    addr: SocketAddr,
    registry: Registry,
    cancel: CancellationToken,
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_relay() -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Registry::new();
    let relay = Relay::builder()
        .registry(registry.clone())
        .cleanup_interval(Duration::from_millis(100))
        .build()
        .unwrap();
    let cancel = CancellationToken::new();
    let serve_cancel = cancel.clone();
    tokio::spawn(async move { relay.serve(listener, serve_cancel).await });
    TestRelay {
        addr,
        registry,
        cancel,
    }
}

/// Connect and wait for the greeting, which is sent after registration
async fn connect(addr: SocketAddr, user_id: &str) -> Client {
    let (mut ws, _) = connect_async(format!("ws://{addr}/web-socket/{user_id}"))
        .await
        .unwrap();
    assert_eq!(next_text(&mut ws).await, "connected");
    ws
}

async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return text.as_str().to_string();
        }
    }
}

async fn send_json(ws: &mut Client, value: serde_json::Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn wait_for_count(registry: &Registry, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while registry.online_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("online count stuck at {}", registry.online_count()));
}

/// True once the server has dropped this client
async fn is_terminated(ws: &mut Client) -> bool {
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    ended.is_ok()
}

async fn push(addr: SocketAddr, user_id: &str, message: &str) -> PushResponse {
    reqwest::get(format!("http://{addr}/push/{user_id}?message={message}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

// ============== Relay Scenarios ==============

#[tokio::test]
async fn test_two_users_exchange_message() {
    let relay = start_relay().await;

    let mut alice = connect(relay.addr, "alice").await;
    assert_eq!(relay.registry.online_count(), 1);
    let mut bob = connect(relay.addr, "bob").await;
    assert_eq!(relay.registry.online_count(), 2);

    send_json(&mut alice, serde_json::json!({"toUserId": "bob", "text": "hi"})).await;

    assert_eq!(
        next_text(&mut bob).await,
        r#"{"toUserId":"bob","text":"hi","fromUserId":"alice"}"#
    );
}

#[tokio::test]
async fn test_spoofed_sender_is_overwritten() {
    let relay = start_relay().await;
    let mut alice = connect(relay.addr, "alice").await;
    let mut bob = connect(relay.addr, "bob").await;

    send_json(
        &mut alice,
        serde_json::json!({"toUserId": "bob", "fromUserId": "mallory", "text": "hi"}),
    )
    .await;

    let frame: serde_json::Value = serde_json::from_str(&next_text(&mut bob).await).unwrap();
    assert_eq!(frame["fromUserId"], "alice");
    assert_eq!(frame["text"], "hi");
}

#[tokio::test]
async fn test_reconnect_keeps_count_and_routes_to_newest() {
    let relay = start_relay().await;
    let mut bob = connect(relay.addr, "bob").await;
    let mut alice_old = connect(relay.addr, "alice").await;
    let mut alice_new = connect(relay.addr, "alice").await;

    assert_eq!(relay.registry.online_count(), 2);
    assert!(is_terminated(&mut alice_old).await);

    send_json(&mut bob, serde_json::json!({"toUserId": "alice", "text": "again"})).await;
    let frame: serde_json::Value = serde_json::from_str(&next_text(&mut alice_new).await).unwrap();
    assert_eq!(frame["text"], "again");

    // The superseded session's teardown must not evict the new one
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(relay.registry.online_count(), 2);
    assert!(relay.registry.lookup("alice").is_some());
}

#[tokio::test]
async fn test_push_to_offline_user_fails() {
    let relay = start_relay().await;

    let response = push(relay.addr, "carol", "ping").await;

    assert!(!response.success);
    assert!(response.error.is_some());
}

#[tokio::test]
async fn test_disconnect_decrements_and_push_fails() {
    let relay = start_relay().await;
    let _alice = connect(relay.addr, "alice").await;
    let before = relay.registry.online_count();
    let mut bob = connect(relay.addr, "bob").await;
    assert_eq!(relay.registry.online_count(), before + 1);

    bob.close(None).await.unwrap();
    wait_for_count(&relay.registry, before).await;

    let response = push(relay.addr, "bob", "ping").await;
    assert!(!response.success);
}

#[tokio::test]
async fn test_protocol_error_unregisters() {
    let relay = start_relay().await;
    let _alice = connect(relay.addr, "alice").await;
    let before = relay.registry.online_count();
    let mut bob = connect(relay.addr, "bob").await;
    assert_eq!(relay.registry.online_count(), before + 1);

    // FIN + reserved opcode 0xF, masked, empty payload
    let MaybeTlsStream::Plain(tcp) = bob.get_mut() else {
        panic!("expected a plain TCP stream");
    };
    tcp.write_all(&[0x8F, 0x80, 0, 0, 0, 0]).await.unwrap();
    tcp.flush().await.unwrap();

    wait_for_count(&relay.registry, before).await;
    assert!(relay.registry.lookup("bob").is_none());
    assert!(!push(relay.addr, "bob", "ping").await.success);
}

#[tokio::test]
async fn test_dropped_transport_unregisters() {
    let relay = start_relay().await;
    let _alice = connect(relay.addr, "alice").await;
    let before = relay.registry.online_count();
    let bob = connect(relay.addr, "bob").await;
    assert_eq!(relay.registry.online_count(), before + 1);

    // No close frame, the socket just goes away
    drop(bob);

    wait_for_count(&relay.registry, before).await;
    assert!(relay.registry.lookup("bob").is_none());
}

#[tokio::test]
async fn test_cleanup_sweeps_dead_entries() {
    let relay = start_relay().await;
    let _alice = connect(relay.addr, "alice").await;
    let before = relay.registry.online_count();

    // Registered without a session; its writer is already gone
    let (ghost, receiver) = Connection::new("ghost", 8);
    relay.registry.register(ghost);
    drop(receiver);
    assert_eq!(relay.registry.online_count(), before + 1);

    wait_for_count(&relay.registry, before).await;
    assert!(relay.registry.lookup("ghost").is_none());
    assert!(relay.registry.lookup("alice").is_some());
}

#[tokio::test]
async fn test_push_to_online_user() {
    let relay = start_relay().await;
    let mut bob = connect(relay.addr, "bob").await;

    let response = push(relay.addr, "bob", "ping").await;

    assert!(response.success);
    assert_eq!(next_text(&mut bob).await, "ping");
}

#[tokio::test]
async fn test_undeliverable_messages_keep_connection_open() {
    let relay = start_relay().await;
    let mut alice = connect(relay.addr, "alice").await;
    let mut bob = connect(relay.addr, "bob").await;

    alice.send(Message::text("not json")).await.unwrap();
    alice.send(Message::text("   ")).await.unwrap();
    send_json(&mut alice, serde_json::json!({"toUserId": "carol"})).await;
    send_json(&mut alice, serde_json::json!({"text": "nobody"})).await;
    send_json(&mut alice, serde_json::json!({"toUserId": "bob", "text": "still here"})).await;

    let frame: serde_json::Value = serde_json::from_str(&next_text(&mut bob).await).unwrap();
    assert_eq!(frame["text"], "still here");
    assert_eq!(relay.registry.online_count(), 2);
}

// ============== HTTP Surface ==============

#[tokio::test]
async fn test_stats_endpoint() {
    let relay = start_relay().await;
    let _bob = connect(relay.addr, "bob").await;
    let _alice = connect(relay.addr, "alice").await;

    let stats: StatsResponse = reqwest::get(format!("http://{}/api/stats", relay.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats.online_count, 2);
    let users: Vec<&str> = stats.users.iter().map(|u| u.user_id.as_str()).collect();
    assert_eq!(users, vec!["alice", "bob"]);
    assert!(stats.users.iter().all(|u| u.is_alive));
}

#[tokio::test]
async fn test_status_page() {
    let relay = start_relay().await;

    let body = reqwest::get(format!("http://{}/index", relay.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("/web-socket/"));
    assert!(!body.contains("{{endpoint}}"));
}

#[tokio::test]
async fn test_health() {
    let relay = start_relay().await;

    let body = reqwest::get(format!("http://{}/health", relay.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body, "OK");
}

// ============== Builder ==============

#[test]
fn test_builder_rejects_bad_endpoint() {
    assert!(Relay::builder().endpoint("").build().is_err());
    assert!(Relay::builder().endpoint("a/b").build().is_err());
    assert!(Relay::builder().endpoint("push").build().is_err());
    assert!(Relay::builder().send_queue_capacity(0).build().is_err());
    assert!(Relay::builder().endpoint("/chat/").build().is_ok());
}
