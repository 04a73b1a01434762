use std::fmt;

/// Failures of a single gateway connection attempt. All of them are
/// retryable; the supervisor converts them into a teardown + backoff.
#[derive(Debug)]
pub enum GatewayError {
    Transport(tokio_tungstenite::tungstenite::Error),
    ProtocolViolation(String),
    Closed,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transport(e) => write!(f, "transport error: {e}"),
            GatewayError::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            GatewayError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::Transport(e)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::ProtocolViolation(format!("malformed frame: {e}"))
    }
}

#[derive(Debug)]
pub enum RestError {
    Http(reqwest::Error),
    CredentialInvalid { status: u16 },
    Status { status: u16, body: String },
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestError::Http(e) => write!(f, "HTTP error: {e}"),
            RestError::CredentialInvalid { status } => {
                write!(f, "credentials rejected (status {status})")
            }
            RestError::Status { status, body } => write!(f, "server returned {status}: {body}"),
        }
    }
}

impl std::error::Error for RestError {}

impl From<reqwest::Error> for RestError {
    fn from(e: reqwest::Error) -> Self {
        RestError::Http(e)
    }
}

/// Local failures of a voice operation. None of these are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    MissingChannel,
    ResolutionFailed(String),
    NotConnected,
    /// The request went out but the settings file could not be written.
    SettingsNotSaved(String),
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::MissingChannel => write!(f, "no voice channel id given"),
            VoiceError::ResolutionFailed(reason) => {
                write!(f, "could not resolve voice channel: {reason}")
            }
            VoiceError::NotConnected => write!(f, "gateway is not connected"),
            VoiceError::SettingsNotSaved(reason) => {
                write!(f, "voice settings were not saved: {reason}")
            }
        }
    }
}

impl std::error::Error for VoiceError {}

#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "settings file error: {e}"),
            SettingsError::Json(e) => write!(f, "settings file is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Json(e)
    }
}

/// Startup credential step failures.
#[derive(Debug)]
pub enum LoginError {
    /// Input ended before a valid token was entered.
    Aborted,
    Io(std::io::Error),
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginError::Aborted => write!(f, "no valid token entered"),
            LoginError::Io(e) => write!(f, "token input/output failed: {e}"),
        }
    }
}

impl std::error::Error for LoginError {}

impl From<std::io::Error> for LoginError {
    fn from(e: std::io::Error) -> Self {
        LoginError::Io(e)
    }
}
