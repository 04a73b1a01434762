use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::RestError;

/// Account token. No `Display`, and `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// The account behind a token, as returned by `GET /users/@me`.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    #[serde(default)]
    guild_id: Option<String>,
}

/// Thin client for the two REST calls the gateway client needs.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: Token,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, token: Token) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header("Authorization", self.token.expose())
            .header("Content-Type", "application/json")
    }

    /// Validate the token. Any non-200 answer is `CredentialInvalid`.
    pub async fn current_user(&self) -> Result<CurrentUser, RestError> {
        if self.token.is_empty() {
            return Err(RestError::CredentialInvalid { status: 0 });
        }
        let resp = self.get("/users/@me").send().await?;
        if resp.status() != StatusCode::OK {
            return Err(RestError::CredentialInvalid {
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.json::<CurrentUser>().await?)
    }

    /// Resolve the parent group (guild) of a channel. `Ok(None)` means the
    /// channel exists but does not belong to a group.
    pub async fn channel_guild(&self, channel_id: &str) -> Result<Option<String>, RestError> {
        let resp = self.get(&format!("/channels/{channel_id}")).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RestError::Status { status, body });
        }

        let channel = resp.json::<ChannelInfo>().await?;
        Ok(channel.guild_id.filter(|g| !g.is_empty()))
    }
}
