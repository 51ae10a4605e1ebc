use std::fmt;

use serde::{Deserialize, Serialize};

/// Long-lived access token. `Debug` output is redacted.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token, for the auth handshake only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty or whitespace.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("AccessToken(<empty>)")
        } else {
            f.write_str("AccessToken(<redacted>)")
        }
    }
}

/// Connection to the Home Assistant WebSocket API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HomeAssistantSettings {
    /// Base URL, e.g. `http://192.168.1.100:8123`.
    pub base_url: String,
    /// Access credential. Required; no default.
    pub token: AccessToken,
    /// Entity to monitor.
    pub entity_id: String,
    /// Seconds between heartbeat pings; 0 disables the heartbeat.
    pub ping_interval_secs: u64,
    /// Upper bound for each handshake step, in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for HomeAssistantSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8123".to_string(),
            token: AccessToken::default(),
            entity_id: "input_boolean.dnd_status".to_string(),
            ping_interval_secs: 30,
            handshake_timeout_secs: 10,
        }
    }
}
