//! Home Assistant WebSocket API messages.
//!
//! Only the commands the daemon sends and the replies it reads are modelled.
//! Anything else the server sends deserializes to [`ServerMessage::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::SessionError;

/// Event type the daemon subscribes to.
pub const STATE_CHANGED: &str = "state_changed";

/// Path of the WebSocket endpoint, relative to the base URL.
const WEBSOCKET_PATH: &str = "api/websocket";

/// Messages sent to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Reply to `auth_required`.
    Auth {
        /// Long-lived access token.
        access_token: String,
    },
    /// Subscribe to one event type.
    SubscribeEvents {
        /// Command id; events for this subscription carry it.
        id: u64,
        /// Event type filter.
        event_type: String,
    },
    /// Fetch every entity's current state.
    GetStates {
        /// Command id.
        id: u64,
    },
    /// Liveness probe.
    Ping {
        /// Command id.
        id: u64,
    },
}

impl ClientMessage {
    /// Serialize to the JSON text frame.
    pub fn to_text(&self) -> String {
        // Serializing these variants cannot fail: only strings and integers.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Error object inside an unsuccessful `result`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ResultError {
    /// Machine-readable code, e.g. `unknown_command`.
    #[serde(default)]
    pub code: Value,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// Messages received from the server.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection.
    AuthRequired {
        /// Server version.
        ha_version: Option<String>,
    },
    /// Token accepted.
    AuthOk {
        /// Server version.
        ha_version: Option<String>,
    },
    /// Token rejected; the server closes the connection afterwards.
    AuthInvalid {
        /// Reason given by the server.
        message: Option<String>,
    },
    /// Reply to a command.
    Result {
        /// Id of the command this answers.
        id: u64,
        /// Whether the command succeeded.
        success: bool,
        /// Command payload (`get_states` returns an array of states).
        #[serde(default)]
        result: Value,
        /// Failure details.
        error: Option<ResultError>,
    },
    /// Event for a subscription.
    Event {
        /// Subscription id.
        id: u64,
        /// Raw event object (`event_type`, `data`, ...).
        event: Value,
    },
    /// Reply to `ping`.
    Pong {
        /// Id of the ping.
        id: u64,
    },
    /// Any message type the daemon does not use.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text)
            .map_err(|e| SessionError::Protocol(format!("malformed server message: {e}")))
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthRequired { .. } => "auth_required",
            Self::AuthOk { .. } => "auth_ok",
            Self::AuthInvalid { .. } => "auth_invalid",
            Self::Result { .. } => "result",
            Self::Event { .. } => "event",
            Self::Pong { .. } => "pong",
            Self::Unknown => "unknown",
        }
    }
}

/// Derive the WebSocket endpoint from the configured base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`; `ws`/`wss` are kept. Any path
/// prefix (reverse proxies) is preserved; query and fragment are dropped.
pub fn websocket_url(base_url: &str) -> Result<Url, SessionError> {
    let mut url = Url::parse(base_url.trim())
        .map_err(|e| SessionError::Config(format!("invalid base URL {base_url}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SessionError::Config(format!(
                "unsupported base URL scheme {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| SessionError::Config(format!("cannot use scheme {scheme} for {base_url}")))?;

    let prefix = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{prefix}/{WEBSOCKET_PATH}"));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
