use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::settings::Settings;

/// Opcodes for gateway messages.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const PRESENCE_UPDATE: u8 = 3;
    pub const VOICE_STATE_UPDATE: u8 = 4;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Dispatch event names the client reacts to.
pub mod event {
    pub const READY: &str = "READY";
    pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";
}

/// Activity type for a user-set custom status.
pub const ACTIVITY_CUSTOM_STATUS: u8 = 4;

/// Gateway message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(rename = "d", default)]
    pub data: serde_json::Value,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl GatewayFrame {
    pub fn new(op: u8, data: serde_json::Value) -> Self {
        Self {
            op,
            data,
            sequence: None,
            event_type: None,
        }
    }

    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self::new(opcode::HEARTBEAT, json!(sequence))
    }

    pub fn identify(token: &str, settings: &Settings) -> Self {
        Self::new(
            opcode::IDENTIFY,
            json!({
                "token": token,
                "properties": {
                    "$os": std::env::consts::OS,
                    "$browser": env!("CARGO_PKG_NAME"),
                    "$device": env!("CARGO_PKG_NAME")
                },
                "presence": {
                    "status": settings.status.as_str(),
                    "afk": false,
                    "since": 0,
                    "activities": []
                }
            }),
        )
    }

    pub fn presence_update(settings: &Settings) -> Self {
        let activities = if settings.custom_status.is_empty() {
            vec![]
        } else {
            vec![Activity::custom_status(&settings.custom_status)]
        };
        Self::new(
            opcode::PRESENCE_UPDATE,
            json!({
                "since": 0,
                "activities": activities,
                "status": settings.status.as_str(),
                "afk": false
            }),
        )
    }

    pub fn voice_state_update(guild_id: &str, channel_id: Option<&str>) -> Self {
        Self::new(
            opcode::VOICE_STATE_UPDATE,
            json!({
                "guild_id": guild_id,
                "channel_id": channel_id,
                "self_mute": false,
                "self_deaf": false
            }),
        )
    }

    pub fn to_text(&self) -> String {
        // A frame built from serde_json values always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: u8,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Activity {
    pub fn custom_status(text: &str) -> Self {
        Self {
            activity_type: ACTIVITY_CUSTOM_STATUS,
            name: "Custom Status".to_string(),
            state: Some(text.to_string()),
        }
    }
}

/// HELLO (opcode 10) payload data.
#[derive(Debug, Deserialize)]
pub struct HelloData {
    pub heartbeat_interval: u64,
}

/// READY dispatch payload data; only the fields the client uses.
#[derive(Debug, Deserialize)]
pub struct ReadyData {
    pub session_id: String,
}

/// VOICE_STATE_UPDATE dispatch payload data.
#[derive(Debug, Deserialize)]
pub struct VoiceStateData {
    pub user_id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
}
