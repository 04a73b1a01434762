use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::heartbeat::LivenessPolicy;

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=9&encoding=json";
pub const DEFAULT_API_URL: &str = "https://discord.com/api/v9";

/// Process configuration. Read once at startup; the user-editable settings
/// (status, voice channel, ...) live in [`crate::settings`] instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: Option<String>,
    pub gateway_url: String,
    pub api_url: String,
    pub settings_path: PathBuf,
    pub backoff_unit: Duration,
    pub invalid_session_delay: Duration,
    pub liveness: LivenessPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        let token = std::env::var("DISCORD_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let liveness = match std::env::var("PRESENCED_MAX_MISSED_ACKS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            Some(n) if n > 0 => LivenessPolicy::MissedAcks(n),
            _ => LivenessPolicy::Disabled,
        };

        Self {
            token,
            gateway_url: std::env::var("PRESENCED_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            api_url: std::env::var("PRESENCED_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            settings_path: std::env::var("PRESENCED_SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./config.json")),
            backoff_unit: Duration::from_millis(
                std::env::var("PRESENCED_BACKOFF_UNIT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|ms| *ms > 0)
                    .unwrap_or(1000),
            ),
            invalid_session_delay: Duration::from_millis(
                std::env::var("PRESENCED_INVALID_SESSION_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2000),
            ),
            liveness,
        }
    }
}
