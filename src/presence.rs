use crate::error::SettingsError;
use crate::gateway::events::GatewayFrame;
use crate::gateway::Session;
use crate::settings::{Settings, Status};

/// Push the configured status and custom status to the gateway. Returns
/// `false` if there was no live connection, in which case nothing is sent;
/// the next READY re-syncs from settings anyway.
pub async fn update_presence(session: &Session, settings: &Settings) -> bool {
    let frame = GatewayFrame::presence_update(settings);
    let sent = session.send(&frame).await;
    if sent {
        tracing::debug!(
            status = settings.status.as_str(),
            custom = !settings.custom_status.is_empty(),
            "presence update queued"
        );
    } else {
        tracing::debug!("presence not sent, gateway is not connected");
    }
    sent
}

/// Persist a new status, then sync it.
pub async fn set_status(session: &Session, status: Status) -> Result<bool, SettingsError> {
    let settings = session.settings().update(|s| s.status = status)?;
    Ok(update_presence(session, &settings).await)
}

/// Persist a new custom status (empty clears it), then sync it.
pub async fn set_custom_status(session: &Session, text: &str) -> Result<bool, SettingsError> {
    let text = text.trim().to_string();
    let settings = session.settings().update(|s| s.custom_status = text)?;
    Ok(update_presence(session, &settings).await)
}
