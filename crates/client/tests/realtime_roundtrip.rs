//! End-to-end tests of the native transport against a local axum server that
//! mimics the auth routes and the notification socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aeiouly_client::ws::{ConnectionSnapshot, LogBuffer};
use aeiouly_client::{
    ApiClient, AuthState, AuthStateTracker, ConnectionState, NativeTransport, ProbeReason,
    RealtimeHandle, ReconnectConfig,
};
use aeiouly_shared::{LoginRequest, CLOSE_NORMAL};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::watch;

const SESSION_COOKIE: &str = "access_token=secret";

#[derive(Clone, Default)]
struct ServerState {
    connections: Arc<AtomicUsize>,
    closes: Arc<Mutex<Vec<u16>>>,
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.split(';').any(|c| c.trim() == SESSION_COOKIE))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Not authenticated" })),
    )
        .into_response()
}

async fn login(Json(body): Json<LoginRequest>) -> Response {
    if body.password != "pw" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Incorrect username or password" })),
        )
            .into_response();
    }
    (
        [(SET_COOKIE, format!("{SESSION_COOKIE}; Path=/; HttpOnly"))],
        Json(json!({
            "access_token": "secret",
            "refresh_token": "refresh",
            "token_type": "bearer",
            "expires_in": 1800
        })),
    )
        .into_response()
}

async fn me(headers: HeaderMap) -> Response {
    if !has_session(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": 1,
        "email": "ana@example.com",
        "username": "ana",
        "full_name": "Ana",
        "role": "user",
        "is_active": true,
        "avatar_url": null
    }))
    .into_response()
}

async fn logout() -> Response {
    (
        [(SET_COOKIE, "access_token=; Path=/; Max-Age=0".to_string())],
        Json(json!({ "message": "Logged out" })),
    )
        .into_response()
}

async fn notifications(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<ServerState>,
) -> Response {
    state.connections.fetch_add(1, Ordering::SeqCst);
    // Unauthenticated sockets are refused before the upgrade.
    if !has_session(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: ServerState) {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                let reply = match text.as_str() {
                    "ping" => "pong".to_string(),
                    // Vanish without a close frame.
                    "drop" => return,
                    "bye" => {
                        let frame = CloseFrame {
                            code: CLOSE_NORMAL,
                            reason: "bye".into(),
                        };
                        if socket.send(Message::Close(Some(frame))).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    other => format!("Echo: {other}"),
                };
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    return;
                }
            }
            Message::Close(frame) => {
                let code = frame.map(|f| f.code).unwrap_or(1005);
                state.closes.lock().unwrap().push(code);
                return;
            }
            _ => {}
        }
    }
}

async fn spawn_server() -> (SocketAddr, ServerState) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let state = ServerState::default();
    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/refresh", post(|| async { unauthorized() }))
        .route("/api/v1/auth/logout", post(logout))
        .route("/notifications/ws", get(notifications))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn fast_retry() -> ReconnectConfig {
    ReconnectConfig::fixed(Duration::from_millis(100))
}

async fn wait_until(
    rx: &mut watch::Receiver<ConnectionSnapshot>,
    what: &str,
    predicate: impl FnMut(&ConnectionSnapshot) -> bool,
) -> ConnectionSnapshot {
    let snapshot = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("manager stopped");
    *snapshot
}

async fn wait_for_log(logs: &LogBuffer, text: &str) {
    for _ in 0..1000 {
        if logs.entries().iter().any(|e| e.text == text) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("log entry {text:?} never appeared: {:#?}", logs.entries());
}

#[tokio::test]
async fn test_login_connects_and_logout_closes() {
    let (addr, state) = spawn_server().await;
    let api = ApiClient::new(format!("http://{addr}")).unwrap();
    let realtime = RealtimeHandle::spawn(
        NativeTransport::new().with_cookies(Arc::new(api.clone())),
        format!("ws://{addr}/notifications/ws"),
        fast_retry(),
        LogBuffer::default(),
    );
    let tracker = AuthStateTracker::new(Arc::new(api.clone()));
    tracker.subscribe(Arc::new(realtime.notifier()));
    let mut rx = realtime.subscribe();

    assert_eq!(tracker.refresh(ProbeReason::Startup).await, AuthState::LoggedOut);
    assert_eq!(realtime.state(), ConnectionState::Closed);

    let wrong = api.login("ana", "nope").await.unwrap_err();
    assert_eq!(
        wrong.user_message(),
        "HTTP 401: Incorrect username or password"
    );

    api.login("ana", "pw").await.unwrap();
    assert_eq!(
        tracker.refresh(ProbeReason::LoginCompleted).await,
        AuthState::LoggedIn
    );
    wait_until(&mut rx, "open", |s| s.state == ConnectionState::Open).await;

    realtime.send("ping");
    wait_for_log(realtime.log_buffer(), "received: pong").await;
    realtime.send("hello");
    wait_for_log(realtime.log_buffer(), "received: Echo: hello").await;

    api.logout().await.unwrap();
    tracker.logout_completed();
    let snapshot = wait_until(&mut rx, "closed", |s| s.state == ConnectionState::Closed).await;
    assert!(!snapshot.auto_reconnect);

    // The server saw a normal closure and nothing reconnected.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*state.closes.lock().unwrap(), [CLOSE_NORMAL]);
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);

    realtime.send("ping");
    wait_for_log(realtime.log_buffer(), "not connected, dropping message: ping").await;

    realtime.shutdown().await;
}

#[tokio::test]
async fn test_dropped_socket_reconnects() {
    let (addr, state) = spawn_server().await;
    let api = ApiClient::new(format!("http://{addr}")).unwrap();
    api.login("ana", "pw").await.unwrap();

    let realtime = RealtimeHandle::spawn(
        NativeTransport::new().with_cookies(Arc::new(api.clone())),
        format!("ws://{addr}/notifications/ws"),
        fast_retry(),
        LogBuffer::default(),
    );
    let mut rx = realtime.subscribe();
    realtime.connect();
    let first = wait_until(&mut rx, "open", |s| s.state == ConnectionState::Open).await;

    realtime.send("drop");
    let second = wait_until(&mut rx, "reopen", |s| {
        s.state == ConnectionState::Open && s.generation > first.generation
    })
    .await;
    assert_eq!(second.attempt, 0);
    assert!(state.connections.load(Ordering::SeqCst) >= 2);

    realtime.send("ping");
    wait_for_log(realtime.log_buffer(), "received: pong").await;
    realtime.shutdown().await;
}

#[tokio::test]
async fn test_rejected_handshake_gives_up_when_capped() {
    let (addr, state) = spawn_server().await;
    let realtime = RealtimeHandle::spawn(
        NativeTransport::new(),
        format!("ws://{addr}/notifications/ws"),
        ReconnectConfig {
            max_attempts: 1,
            ..fast_retry()
        },
        LogBuffer::default(),
    );
    realtime.connect();

    wait_for_log(realtime.log_buffer(), "giving up after 1 reconnect attempts").await;
    assert_eq!(realtime.state(), ConnectionState::Closed);
    assert_eq!(state.connections.load(Ordering::SeqCst), 2);
    assert!(realtime
        .logs()
        .iter()
        .any(|e| e.text.starts_with("connection lost (code 1006: handshake failed")));
    assert!(realtime.logs().iter().all(|e| e.text != "connected"));
    realtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_sends_normal_close() {
    let (addr, state) = spawn_server().await;
    let api = ApiClient::new(format!("http://{addr}")).unwrap();
    api.login("ana", "pw").await.unwrap();

    let realtime = RealtimeHandle::spawn(
        NativeTransport::new().with_cookies(Arc::new(api)),
        format!("ws://{addr}/notifications/ws"),
        fast_retry(),
        LogBuffer::default(),
    );
    let mut rx = realtime.subscribe();
    realtime.connect();
    wait_until(&mut rx, "open", |s| s.state == ConnectionState::Open).await;

    realtime.shutdown().await;
    for _ in 0..100 {
        if !state.closes.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*state.closes.lock().unwrap(), [CLOSE_NORMAL]);
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_server_close_is_acknowledged() {
    let (addr, state) = spawn_server().await;
    let api = ApiClient::new(format!("http://{addr}")).unwrap();
    api.login("ana", "pw").await.unwrap();

    let realtime = RealtimeHandle::spawn(
        NativeTransport::new().with_cookies(Arc::new(api)),
        format!("ws://{addr}/notifications/ws"),
        fast_retry(),
        LogBuffer::default(),
    );
    let mut rx = realtime.subscribe();
    realtime.connect();
    wait_until(&mut rx, "open", |s| s.state == ConnectionState::Open).await;

    realtime.send("bye");
    wait_until(&mut rx, "closed", |s| s.state == ConnectionState::Closed).await;
    wait_for_log(realtime.log_buffer(), "disconnected (code 1000: bye)").await;

    // The server gets the echoed close frame rather than a dropped socket.
    for _ in 0..100 {
        if !state.closes.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*state.closes.lock().unwrap(), [CLOSE_NORMAL]);
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
    realtime.shutdown().await;
}
