//! Settings types.
//!
//! All structs use `camelCase` keys and `#[serde(default)]`, so a settings
//! file only needs the keys it overrides.

mod display;
mod home_assistant;

pub use display::{DisplayDriverKind, DisplaySettings, WaveshareSettings};
pub use home_assistant::{AccessToken, HomeAssistantSettings};

use dndink_core::BackoffConfig;
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DndSettings {
    /// Remote server connection.
    pub home_assistant: HomeAssistantSettings,
    /// Panel and redraw throttling.
    pub display: DisplaySettings,
    /// Reconnect timing.
    pub reconnect: BackoffConfig,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `info` or `dndink_session=debug`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
