use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};

use super::events::{event, opcode, GatewayFrame, ReadyData, VoiceStateData};

pub type SharedState = Arc<RwLock<SessionState>>;

/// Lifecycle of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Identifying,
    Active,
    Closing,
    Reconnecting,
    Stopped,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            // stop may land from anywhere, and it is terminal
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Disconnected, Connecting) => true,
            (Connecting, AwaitingHandshake) => true,
            (Connecting, Disconnected) => true,
            (AwaitingHandshake, Identifying) => true,
            (AwaitingHandshake, Closing) => true,
            (Identifying, Active) => true,
            (Identifying | Active, Closing | Reconnecting) => true,
            (Closing | Reconnecting, Disconnected) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingHandshake => "awaiting_handshake",
            ConnectionState::Identifying => "identifying",
            ConnectionState::Active => "active",
            ConnectionState::Closing => "closing",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Stopped => "stopped",
        }
    }
}

/// Mutable session record shared by the connection task, the heartbeat
/// monitor and external callers. Only reachable through [`SharedState`].
#[derive(Debug, Default)]
pub struct SessionState {
    pub state: ConnectionState,
    pub sequence: Option<u64>,
    pub session_id: Option<String>,
    pub connected: bool,
    pub voice_connected: bool,
    pub heartbeat_interval: Option<Duration>,
    pub stop_requested: bool,
    /// Write queue of the live connection, if any.
    pub outbound: Option<mpsc::UnboundedSender<String>>,
}

impl SessionState {
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "rejected state transition {} -> {}",
                self.state.as_str(),
                next.as_str()
            );
            return false;
        }
        tracing::debug!("gateway {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        true
    }

    /// Reset the per-connection fields at the start of an attempt.
    pub fn begin_attempt(&mut self) {
        self.sequence = None;
        self.heartbeat_interval = None;
        self.connected = false;
        self.outbound = None;
    }

    /// Cleanup after the connection ends. `voice_connected` is kept as last
    /// known.
    pub fn end_attempt(&mut self) {
        self.connected = false;
        self.outbound = None;
    }

    /// Queue a frame on the live connection. `false` means there is none.
    pub fn send(&self, frame: &GatewayFrame) -> bool {
        match self.outbound {
            Some(ref tx) => tx.send(frame.to_text()).is_ok(),
            None => false,
        }
    }

    pub fn record_sequence(&mut self, sequence: Option<u64>) {
        if let Some(seq) = sequence {
            self.sequence = Some(match self.sequence {
                Some(prev) => prev.max(seq),
                None => seq,
            });
        }
    }

    /// Apply one frame received after IDENTIFY and say what the connection
    /// loop has to do about it.
    pub fn apply_frame(&mut self, frame: &GatewayFrame, local_user_id: &str) -> FrameAction {
        self.record_sequence(frame.sequence);

        match frame.op {
            opcode::DISPATCH => match frame.event_type.as_deref() {
                Some(event::READY) => {
                    let session_id = serde_json::from_value::<ReadyData>(frame.data.clone())
                        .ok()
                        .map(|r| r.session_id);
                    self.session_id = session_id;
                    self.connected = true;
                    self.transition(ConnectionState::Active);
                    FrameAction::Ready
                }
                Some(event::VOICE_STATE_UPDATE) => {
                    if let Ok(vs) = serde_json::from_value::<VoiceStateData>(frame.data.clone()) {
                        if vs.user_id == local_user_id {
                            self.voice_connected = vs.channel_id.is_some();
                            tracing::info!(
                                channel_id = ?vs.channel_id,
                                guild_id = ?vs.guild_id,
                                "voice state confirmed"
                            );
                        }
                    }
                    FrameAction::None
                }
                _ => FrameAction::None,
            },
            opcode::HEARTBEAT => FrameAction::SendHeartbeat,
            opcode::RECONNECT => FrameAction::Reconnect,
            opcode::INVALID_SESSION => FrameAction::InvalidSession,
            opcode::HEARTBEAT_ACK => FrameAction::HeartbeatAck,
            other => {
                tracing::trace!("ignoring opcode {other}");
                FrameAction::None
            }
        }
    }
}

/// Follow-up the connection loop performs after [`SessionState::apply_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    None,
    Ready,
    SendHeartbeat,
    HeartbeatAck,
    Reconnect,
    InvalidSession,
}
