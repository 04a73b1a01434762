use crate::error::VoiceError;
use crate::gateway::events::GatewayFrame;
use crate::gateway::Session;

/// Result of [`toggle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Join request sent and auto-join persisted.
    Connected,
    /// Auto-join cleared and a leave attempted.
    Disabled,
    /// Turning on needs a channel id and none was given.
    MissingChannel,
    /// Join failed, or the settings change could not be saved.
    Failed(VoiceError),
}

/// Ask the gateway to put the account in `channel_id`.
///
/// Returns once the request is queued. The account only counts as
/// voice-connected when the gateway confirms with a VOICE_STATE_UPDATE.
pub async fn join(session: &Session, channel_id: &str) -> Result<(), VoiceError> {
    let channel_id = channel_id.trim();
    if channel_id.is_empty() {
        return Err(VoiceError::MissingChannel);
    }

    let guild_id = resolve_guild(session, channel_id).await?;
    let frame = GatewayFrame::voice_state_update(&guild_id, Some(channel_id));
    if !session.send(&frame).await {
        return Err(VoiceError::NotConnected);
    }

    tracing::info!(guild_id, channel_id, "voice join requested");
    Ok(())
}

/// Leave voice. The guild is resolved from the channel id currently in
/// settings, which may differ from the channel actually joined if settings
/// changed in between.
pub async fn leave(session: &Session) -> Result<(), VoiceError> {
    if !session.state().read().await.voice_connected {
        return Ok(());
    }

    let channel_id = session.settings().get().voice_channel_id;
    let result = if channel_id.is_empty() {
        tracing::debug!("no configured voice channel, clearing voice state locally");
        Ok(())
    } else {
        match resolve_guild(session, &channel_id).await {
            Ok(guild_id) => {
                if session
                    .send(&GatewayFrame::voice_state_update(&guild_id, None))
                    .await
                {
                    tracing::info!(guild_id, "voice leave requested");
                    Ok(())
                } else {
                    Err(VoiceError::NotConnected)
                }
            }
            Err(e) => Err(e),
        }
    };

    session.state().write().await.voice_connected = false;
    result
}

/// Flip auto-join. Turning on joins `channel_id` and persists it; turning
/// off leaves and clears the persisted channel.
///
/// Turning off leaves *before* clearing the stored channel id. `leave`
/// resolves the guild from that id, so clearing first would reduce the leave
/// to a local flag reset with no voice state update sent. The order therefore
/// differs from the documented clear-settings-then-leave sequence.
///
/// A settings write failure is reported as
/// `Failed(VoiceError::SettingsNotSaved)` even when the gateway request went
/// out; the stored settings are then unchanged.
pub async fn toggle(session: &Session, channel_id: Option<&str>) -> ToggleOutcome {
    let settings = session.settings().get();

    if !settings.auto_join_voice {
        let channel_id = channel_id.unwrap_or_default().trim().to_string();
        if channel_id.is_empty() {
            return ToggleOutcome::MissingChannel;
        }

        return match join(session, &channel_id).await {
            Ok(()) => match session.settings().update(|s| {
                s.auto_join_voice = true;
                s.voice_channel_id = channel_id;
            }) {
                Ok(_) => ToggleOutcome::Connected,
                Err(e) => {
                    tracing::error!("failed to persist voice settings: {e}");
                    ToggleOutcome::Failed(VoiceError::SettingsNotSaved(e.to_string()))
                }
            },
            Err(e) => ToggleOutcome::Failed(e),
        };
    }

    if let Err(e) = leave(session).await {
        tracing::warn!("voice leave failed: {e}");
    }
    match session.settings().update(|s| {
        s.auto_join_voice = false;
        s.voice_channel_id.clear();
    }) {
        Ok(_) => ToggleOutcome::Disabled,
        Err(e) => {
            tracing::error!("failed to persist voice settings: {e}");
            ToggleOutcome::Failed(VoiceError::SettingsNotSaved(e.to_string()))
        }
    }
}

/// Store a new voice channel id; if auto-join is on, move to it.
pub async fn switch_channel(session: &Session, channel_id: &str) -> Result<(), VoiceError> {
    let channel_id = channel_id.trim().to_string();
    if channel_id.is_empty() {
        return Err(VoiceError::MissingChannel);
    }

    let auto_join = session.settings().get().auto_join_voice;
    if auto_join {
        if let Err(e) = leave(session).await {
            tracing::warn!("voice leave before switching channel failed: {e}");
        }
    }

    let target = channel_id.clone();
    if let Err(e) = session.settings().update(|s| s.voice_channel_id = target) {
        tracing::error!("failed to persist voice channel id: {e}");
    }

    if auto_join {
        join(session, &channel_id).await
    } else {
        Ok(())
    }
}

async fn resolve_guild(session: &Session, channel_id: &str) -> Result<String, VoiceError> {
    match session.rest().channel_guild(channel_id).await {
        Ok(Some(guild_id)) => Ok(guild_id),
        Ok(None) => Err(VoiceError::ResolutionFailed(format!(
            "channel {channel_id} has no parent guild"
        ))),
        Err(e) => Err(VoiceError::ResolutionFailed(e.to_string())),
    }
}
