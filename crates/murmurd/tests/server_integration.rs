//! End-to-end tests for the chat server over real sockets.
//!
//! A `ChatServer` is bound to an ephemeral port; clients use `reqwest` for
//! the account endpoints and `tokio-tungstenite` for the chat socket.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use murmur_core::ConnectionId;
use murmur_protocol::{OutboundFrame, TOKEN_QUERY_PARAM};
use murmurd::config::Config;
use murmurd::registry::RegistryHandle;
use murmurd::server::ChatServer;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for a frame
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between registry polls
const POLL_INTERVAL: Duration = Duration::from_millis(10);

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle.
struct TestServer {
    addr: SocketAddr,
    server: Arc<ChatServer>,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
    http: reqwest::Client,
    serving: JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let mut config = Config::default();
        config.auth.secret_key = Some("integration-secret".to_string());
        config.auth.bcrypt_cost = 4;
        config.server.send_timeout_ms = 500;

        let cancel_token = CancellationToken::new();
        let server = Arc::new(ChatServer::new(config, cancel_token.clone()).expect("build server"));
        let registry = server.registry().clone();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().unwrap();
        let serving = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                let _ = server.serve(listener).await;
            }
        });

        Self {
            addr,
            server,
            registry,
            cancel_token,
            http: reqwest::Client::new(),
            serving,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    fn ws_url_with_token(&self, token: &str) -> String {
        format!("{}?{TOKEN_QUERY_PARAM}={token}", self.ws_url())
    }

    /// Cancels the server and waits for `serve` to return.
    async fn shut_down(self) -> Arc<ChatServer> {
        self.cancel_token.cancel();
        timeout(RECV_TIMEOUT, self.serving)
            .await
            .expect("server should stop")
            .unwrap();
        self.server
    }

    async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        self.http
            .post(self.url("/register"))
            .json(&json!({
                "full_name": format!("{username} Tester"),
                "username": username,
                "email": format!("{username}@example.com"),
                "password": password,
            }))
            .send()
            .await
            .unwrap()
    }

    async fn register_raw(&self, body: Value) -> reqwest::Response {
        self.http
            .post(self.url("/register"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.http
            .post(self.url("/login"))
            .form(&[("username", email), ("password", password)])
            .send()
            .await
            .unwrap()
    }

    /// Registers and logs in, returning an access token.
    async fn token_for(&self, username: &str) -> String {
        assert!(self.register(username, "pw-123456").await.status().is_success());
        let body: Value = self
            .login(&format!("{username}@example.com"), "pw-123456")
            .await
            .json()
            .await
            .unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Connects with `?token=` and waits until the registry has `expected` members.
    async fn join(&self, token: &str, expected: usize) -> WsClient {
        let (ws, _) = connect_async(self.ws_url_with_token(token))
            .await
            .expect("websocket connect");
        self.wait_for_members(expected).await;
        ws
    }

    async fn wait_for_members(&self, expected: usize) {
        timeout(RECV_TIMEOUT, async {
            while self.registry.len().await != expected {
                sleep(POLL_INTERVAL).await;
            }
        })
        .await
        .expect("registry should reach expected size");
    }
}

/// Next text frame, skipping control frames.
async fn recv_text(ws: &mut WsClient) -> String {
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid frame");
        match msg {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text, got {other:?}"),
        }
    }
}

/// Next text frame, parsed.
async fn recv_frame(ws: &mut WsClient) -> OutboundFrame {
    let text = recv_text(ws).await;
    OutboundFrame::parse(&text).unwrap_or_else(|e| panic!("unparseable frame: {e}"))
}

/// Text frames received before the close frame, and its code.
async fn recv_until_close(ws: &mut WsClient) -> (Vec<OutboundFrame>, u16) {
    let mut frames = Vec::new();
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid frame");
        match msg {
            Message::Text(text) => frames.push(OutboundFrame::parse(text.as_str()).unwrap()),
            Message::Close(Some(frame)) => return (frames, u16::from(frame.code)),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text or close, got {other:?}"),
        }
    }
}

/// Close code of the next close frame.
async fn recv_close_code(ws: &mut WsClient) -> u16 {
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid frame");
        match msg {
            Message::Close(Some(frame)) => return u16::from(frame.code),
            Message::Close(None) => panic!("close without a code"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected close, got {other:?}"),
        }
    }
}

// ============================================================================
// HTTP Tests
// ============================================================================

#[tokio::test]
async fn test_root_says_hello() {
    let server = TestServer::spawn().await;
    let body: Value = reqwest::get(server.url("/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"message": "Hello"}));
}

#[tokio::test]
async fn test_register_and_login_flow() {
    let server = TestServer::spawn().await;

    let response = server.register("alice", "secret-pw").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"message": "User registered successfully"}));

    let response = server.register("alice", "other-pw").await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"detail": "Email already registered"}));

    let response = server.login("alice@example.com", "secret-pw").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token_type"], "bearer");
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));

    let response = server.login("alice@example.com", "wrong").await;
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"detail": "Invalid Credentials"}));

    let response = server.login("nobody@example.com", "secret-pw").await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let server = TestServer::spawn().await;

    let response = server
        .http
        .post(server.url("/register"))
        .header("content-type", "application/json")
        .body("{\"username\": \"half\"")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().is_some_and(|d| !d.is_empty()));

    let response = server
        .http
        .post(server.url("/register"))
        .json(&json!({"username": "nofields"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .http
        .post(server.url("/login"))
        .form(&[("username", "a@example.com")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].is_string());

    let response = server
        .register_raw(json!({
            "full_name": "Bad Email",
            "username": "bad",
            "email": "not-an-email",
            "password": "pw",
        }))
        .await;
    assert_eq!(response.status(), 400);
}

// ============================================================================
// WebSocket Tests
// ============================================================================

#[tokio::test]
async fn test_chat_between_three_clients() {
    let server = TestServer::spawn().await;
    let token_a = server.token_for("ann").await;
    let token_b = server.token_for("ben").await;
    let token_c = server.token_for("cat").await;

    let mut a = server.join(&token_a, 1).await;
    let mut b = server.join(&token_b, 2).await;
    assert_eq!(recv_frame(&mut a).await, OutboundFrame::joined("ben"));
    let mut c = server.join(&token_c, 3).await;
    assert_eq!(recv_frame(&mut a).await, OutboundFrame::joined("cat"));
    assert_eq!(recv_frame(&mut b).await, OutboundFrame::joined("cat"));

    a.send(Message::Text("hi".into())).await.unwrap();
    assert_eq!(recv_frame(&mut b).await, OutboundFrame::chat("ann", "hi"));
    assert_eq!(recv_frame(&mut c).await, OutboundFrame::chat("ann", "hi"));

    b.close(None).await.unwrap();
    assert_eq!(recv_text(&mut a).await, "ben has left the chat");
    assert_eq!(recv_text(&mut c).await, "ben has left the chat");
    server.wait_for_members(2).await;

    // The sender never hears its own message back
    c.send(Message::Text("bye".into())).await.unwrap();
    assert_eq!(recv_text(&mut a).await, "cat says: bye");
}

#[tokio::test]
async fn test_authorization_header_accepted() {
    let server = TestServer::spawn().await;
    let token = server.token_for("hal").await;

    let mut request = server.ws_url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    let (_ws, _) = connect_async(request).await.unwrap();

    server.wait_for_members(1).await;
}

#[tokio::test]
async fn test_missing_token_closed_with_policy_violation() {
    let server = TestServer::spawn().await;

    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();
    assert_eq!(recv_close_code(&mut ws).await, 1008);
    assert_eq!(server.registry.len().await, 0);
}

#[tokio::test]
async fn test_invalid_token_closed_with_policy_violation() {
    let server = TestServer::spawn().await;

    let (mut ws, _) = connect_async(server.ws_url_with_token("garbage"))
        .await
        .unwrap();
    assert_eq!(recv_close_code(&mut ws).await, 1008);
    assert_eq!(server.registry.len().await, 0);
}

#[tokio::test]
async fn test_shutdown_sends_going_away() {
    let server = TestServer::spawn().await;
    let token = server.token_for("sam").await;
    let mut ws = server.join(&token, 1).await;

    server.cancel_token.cancel();

    assert_eq!(recv_close_code(&mut ws).await, 1001);
    server.wait_for_members(0).await;
}

#[tokio::test]
async fn test_client_chosen_id_claimed_once() {
    let server = TestServer::spawn().await;
    let token_a = server.token_for("ann").await;
    let token_b = server.token_for("ben").await;
    let token_c = server.token_for("cat").await;
    let claimed = |token: &str| format!("ws://{}/ws/42?{TOKEN_QUERY_PARAM}={token}", server.addr);

    let (mut first, _) = connect_async(claimed(&token_a)).await.unwrap();
    server.wait_for_members(1).await;
    assert!(server.registry.contains(ConnectionId::new(42)).await);

    let (mut second, _) = connect_async(claimed(&token_b)).await.unwrap();
    assert_eq!(recv_close_code(&mut second).await, 1008);
    assert!(server.registry.contains(ConnectionId::new(42)).await);
    assert_eq!(server.registry.len().await, 1);

    // The first holder of the id is still live
    let mut c = server.join(&token_c, 2).await;
    assert_eq!(recv_frame(&mut first).await, OutboundFrame::joined("cat"));
    first.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(recv_frame(&mut c).await, OutboundFrame::chat("ann", "still here"));
}

#[tokio::test]
async fn test_non_numeric_client_id_refused() {
    let server = TestServer::spawn().await;
    let token = server.token_for("ann").await;

    let url = format!("ws://{}/ws/abc?{TOKEN_QUERY_PARAM}={token}", server.addr);
    assert!(connect_async(url).await.is_err());
    assert_eq!(server.registry.len().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_every_session() {
    let server = TestServer::spawn().await;
    let names = ["ann", "ben", "cat", "dan", "eve", "fay"];

    let mut clients = Vec::new();
    for (n, name) in names.iter().enumerate() {
        let token = server.token_for(name).await;
        clients.push(server.join(&token, n + 1).await);
    }

    let registry = server.registry.clone();
    let stopped = server.shut_down().await;

    // Every session finished its cleanup before serve returned
    assert_eq!(stopped.active_sessions(), 0);
    assert_eq!(registry.len().await, 0);

    for ws in &mut clients {
        let (_, code) = recv_until_close(ws).await;
        assert_eq!(code, 1001);
    }
}
