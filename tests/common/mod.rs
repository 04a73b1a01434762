#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use presenced::gateway::heartbeat::LivenessPolicy;
use presenced::gateway::{Session, SessionOptions};
use presenced::rest::{RestClient, Token};
use presenced::settings::{Settings, SettingsStore};

pub const TOKEN: &str = "test-token";
pub const USER_ID: &str = "1001";
pub const VOICE_CHANNEL: &str = "voice-1";
pub const VOICE_GUILD: &str = "guild-1";
/// A channel that exists but has no parent guild.
pub const DM_CHANNEL: &str = "dm-1";

const WAIT: Duration = Duration::from_secs(5);

/// Scriptable stand-in for the gateway: every accepted WebSocket is handed
/// to the test, which plays the server side.
pub struct MockGateway {
    pub url: String,
    conns: mpsc::UnboundedReceiver<WebSocket>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(tx): State<mpsc::UnboundedSender<WebSocket>>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let _ = tx.send(socket);
    })
}

impl MockGateway {
    pub async fn spawn() -> Self {
        let (tx, conns) = mpsc::unbounded_channel();
        let app = Router::new().route("/", get(ws_handler)).with_state(tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("ws://127.0.0.1:{}/", addr.port()),
            conns,
        }
    }

    pub async fn accept(&mut self) -> MockConnection {
        self.accept_within(WAIT)
            .await
            .expect("client did not connect to the gateway in time")
    }

    pub async fn accept_within(&mut self, limit: Duration) -> Option<MockConnection> {
        tokio::time::timeout(limit, self.conns.recv())
            .await
            .ok()
            .flatten()
            .map(|socket| MockConnection { socket })
    }
}

pub struct MockConnection {
    socket: WebSocket,
}

impl MockConnection {
    pub async fn send(&mut self, frame: Value) {
        self.socket
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("failed to send frame to client");
    }

    pub async fn hello(&mut self, heartbeat_interval_ms: u64) {
        self.send(json!({
            "op": 10,
            "d": { "heartbeat_interval": heartbeat_interval_ms },
            "s": null,
            "t": null
        }))
        .await;
    }

    pub async fn dispatch(&mut self, event: &str, seq: u64, data: Value) {
        self.send(json!({ "op": 0, "d": data, "s": seq, "t": event }))
            .await;
    }

    pub async fn ready(&mut self, seq: u64) {
        self.dispatch(
            "READY",
            seq,
            json!({ "session_id": "session-abc", "user": { "id": USER_ID } }),
        )
        .await;
    }

    /// Next client frame, `None` once the client has closed the socket.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let msg = tokio::time::timeout(WAIT, self.socket.recv())
                .await
                .expect("timed out waiting for a client frame");
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str(text.as_str()).unwrap())
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Next client frame that is not a heartbeat.
    pub async fn recv_non_heartbeat(&mut self) -> Value {
        loop {
            let frame = self.recv().await.expect("client closed the connection");
            if frame["op"] != 1 {
                return frame;
            }
        }
    }

    /// Skip frames until one with opcode `op` arrives.
    pub async fn recv_op(&mut self, op: u64) -> Value {
        loop {
            let frame = self.recv().await.expect("client closed the connection");
            if frame["op"] == op {
                return frame;
            }
        }
    }

    /// HELLO with a long heartbeat interval, then wait for IDENTIFY.
    pub async fn handshake(&mut self) -> Value {
        self.hello(45_000).await;
        let identify = self.recv_non_heartbeat().await;
        assert_eq!(identify["op"], 2, "expected IDENTIFY, got {identify}");
        identify
    }

    /// Wait until the client closes its end.
    pub async fn closed(&mut self) {
        while self.recv().await.is_some() {}
    }
}

/// Minimal REST API: `/users/@me` and `/channels/{id}`.
pub struct MockApi {
    pub url: String,
    pub channel_lookups: Arc<AtomicUsize>,
}

async fn current_user(headers: HeaderMap) -> Response {
    let authorized = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == TOKEN);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "401: Unauthorized" })))
            .into_response();
    }
    Json(json!({ "id": USER_ID, "username": "tester", "discriminator": "0" })).into_response()
}

async fn channel(
    Path(id): Path<String>,
    State(lookups): State<Arc<AtomicUsize>>,
) -> Response {
    lookups.fetch_add(1, Ordering::SeqCst);
    match id.as_str() {
        VOICE_CHANNEL => Json(json!({ "id": id, "type": 2, "guild_id": VOICE_GUILD })).into_response(),
        DM_CHANNEL => Json(json!({ "id": id, "type": 1 })).into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "message": "Unknown Channel" }))).into_response(),
    }
}

impl MockApi {
    pub async fn spawn() -> Self {
        let lookups = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/users/@me", get(current_user))
            .route("/channels/{id}", get(channel))
            .with_state(lookups.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://127.0.0.1:{}", addr.port()),
            channel_lookups: lookups,
        }
    }

    pub fn lookups(&self) -> usize {
        self.channel_lookups.load(Ordering::SeqCst)
    }
}

/// Mock gateway + mock API + a throwaway settings file.
pub struct TestEnv {
    pub gateway: MockGateway,
    pub api: MockApi,
    pub settings: SettingsStore,
    _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_settings(Settings::default()).await
    }

    pub async fn with_settings(initial: Settings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsStore::load(dir.path().join("config.json")).unwrap();
        settings.update(|s| *s = initial).unwrap();
        Self {
            gateway: MockGateway::spawn().await,
            api: MockApi::spawn().await,
            settings,
            _dir: dir,
        }
    }

    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            gateway_url: self.gateway.url.clone(),
            backoff_unit: Duration::from_millis(20),
            invalid_session_delay: Duration::from_millis(10),
            liveness: LivenessPolicy::Disabled,
        }
    }

    pub fn rest(&self) -> RestClient {
        RestClient::new(self.api.url.clone(), Token::new(TOKEN))
    }

    pub async fn start_with(&self, options: SessionOptions) -> Session {
        let rest = self.rest();
        let user = rest.current_user().await.expect("mock API rejected token");
        Session::start(options, rest, user, self.settings.clone())
    }

    pub async fn start(&self) -> Session {
        self.start_with(self.options()).await
    }

    /// Accept the next connection, run HELLO/IDENTIFY/READY and consume the
    /// presence update the client sends on READY.
    pub async fn connect_ready(&mut self, session: &Session) -> MockConnection {
        let mut conn = self.gateway.accept().await;
        conn.handshake().await;
        conn.ready(1).await;
        let presence = conn.recv_op(3).await;
        assert_eq!(presence["d"]["afk"], false);
        eventually(|| async move { session.is_connected().await }).await;
        conn
    }
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached in time");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
