pub mod backoff;
pub mod events;
pub mod heartbeat;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::Config;
use crate::error::GatewayError;
use crate::rest::{CurrentUser, RestClient};
use crate::settings::SettingsStore;
use backoff::Backoff;
use events::{opcode, GatewayFrame, HelloData};
use heartbeat::{AckTracker, HeartbeatMonitor, LivenessPolicy};
use session::{ConnectionState, FrameAction, SessionState, SharedState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Knobs for the supervisor loop.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub gateway_url: String,
    pub backoff_unit: Duration,
    pub invalid_session_delay: Duration,
    pub liveness: LivenessPolicy,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            gateway_url: config.gateway_url.clone(),
            backoff_unit: config.backoff_unit,
            invalid_session_delay: config.invalid_session_delay,
            liveness: config.liveness,
        }
    }
}

/// Read-only view of the session for the console.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub connected: bool,
    pub voice_connected: bool,
    pub sequence: Option<u64>,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Handle to a running gateway session. Cheap to clone; every clone talks to
/// the same supervisor.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    state: SharedState,
    user: CurrentUser,
    rest: RestClient,
    settings: SettingsStore,
    options: SessionOptions,
    stop_tx: watch::Sender<bool>,
    /// Set by the supervisor once it has reached `Stopped`.
    finished_rx: watch::Receiver<bool>,
    started_at: DateTime<Utc>,
}

/// Why a single connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Closed,
    Reconnect,
    InvalidSession,
    Unresponsive,
    Stopped,
}

impl Session {
    /// Start supervising a gateway connection for an already validated
    /// account. Must be called from within a tokio runtime.
    pub fn start(
        options: SessionOptions,
        rest: RestClient,
        user: CurrentUser,
        settings: SettingsStore,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = watch::channel(false);
        let session = Self {
            inner: Arc::new(Inner {
                state: Arc::new(tokio::sync::RwLock::new(SessionState::default())),
                user,
                rest,
                settings,
                options,
                stop_tx,
                finished_rx,
                started_at: Utc::now(),
            }),
        };

        tokio::spawn(supervise(session.clone(), stop_rx, finished_tx));
        session
    }

    pub fn user(&self) -> &CurrentUser {
        &self.inner.user
    }

    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.inner.settings
    }

    pub(crate) fn state(&self) -> &SharedState {
        &self.inner.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.read().await;
        SessionSnapshot {
            state: state.state,
            connected: state.connected,
            voice_connected: state.voice_connected,
            sequence: state.sequence,
            session_id: state.session_id.clone(),
            started_at: self.inner.started_at,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.read().await.connected
    }

    /// Queue a frame on the live connection. Returns `false` when there is no
    /// connection to send on, which callers treat as a normal outcome.
    pub async fn send(&self, frame: &GatewayFrame) -> bool {
        self.inner.state.read().await.send(frame)
    }

    /// Stop the session for good: leave voice (best effort), close the
    /// connection and wait for the supervisor to exit. Every caller, including
    /// concurrent ones, returns only once the session is `Stopped`.
    pub async fn stop(&self) {
        let first = {
            let mut state = self.inner.state.write().await;
            let first = !state.stop_requested;
            state.stop_requested = true;
            first
        };

        if first {
            tracing::info!("stopping gateway session");
            if let Err(e) = crate::voice::leave(self).await {
                tracing::debug!("voice leave during stop failed: {e}");
            }
        }

        self.inner.stop_tx.send_replace(true);

        let mut finished = self.inner.finished_rx.clone();
        until_set(&mut finished).await;
    }
}

/// Resolves once the flag is set or its sender is gone.
async fn until_set(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn supervise(
    session: Session,
    mut stop_rx: watch::Receiver<bool>,
    finished_tx: watch::Sender<bool>,
) {
    let state = session.inner.state.clone();
    let mut backoff = Backoff::new(session.inner.options.backoff_unit);

    loop {
        if state.read().await.stop_requested {
            break;
        }

        let exit = match run_connection(&session, &mut stop_rx).await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::warn!("gateway connection failed: {e}");
                Exit::Closed
            }
        };

        {
            let mut st = state.write().await;
            st.end_attempt();
            let via = match exit {
                Exit::Reconnect => ConnectionState::Reconnecting,
                _ => ConnectionState::Closing,
            };
            if st.state != ConnectionState::Connecting {
                st.transition(via);
            }
            st.transition(ConnectionState::Disconnected);
        }

        if exit == Exit::Stopped || state.read().await.stop_requested {
            break;
        }

        if exit == Exit::Reconnect {
            tracing::info!("gateway asked us to reconnect");
            continue;
        }

        let delay = backoff.next_delay();
        tracing::info!("reconnecting in {:?} ({exit:?})", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = until_set(&mut stop_rx) => break,
        }
    }

    {
        let mut st = state.write().await;
        st.end_attempt();
        st.transition(ConnectionState::Stopped);
    }
    tracing::info!("gateway session stopped");
    finished_tx.send_replace(true);
}

/// One connection attempt, from TCP connect to teardown.
async fn run_connection(
    session: &Session,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<Exit, GatewayError> {
    let state = &session.inner.state;
    let options = &session.inner.options;

    {
        let mut st = state.write().await;
        st.begin_attempt();
        st.transition(ConnectionState::Connecting);
    }

    let ws = tokio::select! {
        res = connect_async(options.gateway_url.as_str()) => res?.0,
        _ = until_set(stop_rx) => return Ok(Exit::Stopped),
    };
    let (mut sink, mut source) = ws.split();
    state
        .write()
        .await
        .transition(ConnectionState::AwaitingHandshake);

    let hello = tokio::select! {
        frame = read_frame(&mut source) => frame?,
        _ = until_set(stop_rx) => {
            let _ = sink.close().await;
            return Ok(Exit::Stopped);
        }
    };
    if hello.op != opcode::HELLO {
        let _ = sink.close().await;
        return Err(GatewayError::ProtocolViolation(format!(
            "expected HELLO, got opcode {}",
            hello.op
        )));
    }
    let hello: HelloData = serde_json::from_value(hello.data)?;
    let interval = Duration::from_millis(hello.heartbeat_interval.max(1));

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    {
        let mut st = state.write().await;
        st.heartbeat_interval = Some(interval);
        st.outbound = Some(tx.clone());
    }
    tracing::debug!("HELLO received, heartbeat every {:?}", interval);

    let acks = Arc::new(AckTracker::default());
    let (dead_tx, mut dead_rx) = mpsc::unbounded_channel();
    let monitor = HeartbeatMonitor::spawn(
        interval,
        state.clone(),
        tx,
        acks.clone(),
        options.liveness,
        dead_tx,
    );

    let identify = GatewayFrame::identify(
        session.inner.rest.token().expose(),
        &session.inner.settings.get(),
    );
    let result = match sink.send(Message::Text(identify.to_text().into())).await {
        Ok(()) => {
            state.write().await.transition(ConnectionState::Identifying);
            dispatch_loop(
                session,
                &mut sink,
                &mut source,
                &mut rx,
                &mut dead_rx,
                &acks,
                stop_rx,
            )
            .await
        }
        Err(e) => Err(e.into()),
    };

    monitor.stop().await;
    state.write().await.outbound = None;

    // Flush what was queued before teardown, e.g. a voice leave from stop().
    while let Ok(text) = rx.try_recv() {
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;

    result
}

async fn dispatch_loop(
    session: &Session,
    sink: &mut WsSink,
    source: &mut WsSource,
    rx: &mut mpsc::UnboundedReceiver<String>,
    dead_rx: &mut mpsc::UnboundedReceiver<()>,
    acks: &AckTracker,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<Exit, GatewayError> {
    let state = &session.inner.state;

    loop {
        tokio::select! {
            Some(text) = rx.recv() => {
                sink.send(Message::Text(text.into())).await?;
            }
            frame = read_frame(source) => {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(GatewayError::Closed) => return Ok(Exit::Closed),
                    Err(e) => return Err(e),
                };

                let action = state
                    .write()
                    .await
                    .apply_frame(&frame, &session.inner.user.id);

                match action {
                    FrameAction::None => {}
                    FrameAction::Ready => {
                        tracing::info!(
                            "gateway session ready as {}",
                            session.inner.user.username
                        );
                        on_ready(session).await;
                    }
                    FrameAction::SendHeartbeat => {
                        let sequence = state.read().await.sequence;
                        sink.send(Message::Text(GatewayFrame::heartbeat(sequence).to_text().into()))
                            .await?;
                    }
                    FrameAction::HeartbeatAck => acks.acked(),
                    FrameAction::Reconnect => return Ok(Exit::Reconnect),
                    FrameAction::InvalidSession => {
                        tracing::warn!("gateway invalidated the session");
                        let delay = session.inner.options.invalid_session_delay;
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => return Ok(Exit::InvalidSession),
                            _ = until_set(stop_rx) => return Ok(Exit::Stopped),
                        }
                    }
                }
            }
            Some(()) = dead_rx.recv() => return Ok(Exit::Unresponsive),
            _ = until_set(stop_rx) => return Ok(Exit::Stopped),
        }
    }
}

/// Sync presence and, if configured, rejoin the voice channel.
async fn on_ready(session: &Session) {
    let settings = session.inner.settings.get();
    crate::presence::update_presence(session, &settings).await;

    if settings.auto_join_voice && !settings.voice_channel_id.is_empty() {
        // REST lookup must not stall the read loop.
        let session = session.clone();
        tokio::spawn(async move {
            let channel_id = settings.voice_channel_id;
            if let Err(e) = crate::voice::join(&session, &channel_id).await {
                tracing::warn!("auto-join of voice channel {channel_id} failed: {e}");
            }
        });
    }
}

/// Next gateway frame, skipping transport-level messages.
async fn read_frame(source: &mut WsSource) -> Result<GatewayFrame, GatewayError> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => {
                return Ok(serde_json::from_str::<GatewayFrame>(text.as_str())?);
            }
            Some(Ok(Message::Close(close))) => {
                if let Some(close) = close {
                    tracing::info!(
                        "gateway closed the connection: {} {}",
                        u16::from(close.code),
                        close.reason.as_str()
                    );
                }
                return Err(GatewayError::Closed);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(GatewayError::Closed),
        }
    }
}
