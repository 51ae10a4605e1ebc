//! The tri-valued status derived from the remote entity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of the monitored toggle as last seen from the remote server.
///
/// Starts as [`ObservedState::Unknown`] until the first resync or event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedState {
    /// No relevant value received yet.
    #[default]
    Unknown,
    /// Do-not-disturb is active.
    Busy,
    /// Do-not-disturb is off.
    Free,
}

impl ObservedState {
    /// Whether this state can be drawn on the panel.
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Map a raw entity state string to a known state.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Returns `None` for anything that is neither truthy nor falsy
    /// (`unavailable`, `unknown`, empty strings, ...).
    pub fn from_entity_value(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "1" | "busy" | "dnd" => Some(Self::Busy),
            "off" | "false" | "no" | "0" | "free" => Some(Self::Free),
            _ => None,
        }
    }

    /// Lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Busy => "busy",
            Self::Free => "free",
        }
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request from the session task to the render throttler.
///
/// `state` carries a newly observed value, `forced` asks for a redraw even
/// when the value matches what the panel already shows. A resync after a
/// reconnect sets both in one request so they cannot be split.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderRequest {
    /// Newly observed state, if any.
    pub state: Option<ObservedState>,
    /// Redraw regardless of the rendered state.
    pub forced: bool,
}

impl RenderRequest {
    /// A relevant state-change notification.
    pub fn state(state: ObservedState) -> Self {
        Self {
            state: Some(state),
            forced: false,
        }
    }

    /// A redraw with whatever state is current.
    pub fn forced() -> Self {
        Self {
            state: None,
            forced: true,
        }
    }

    /// The outcome of a resync: the fetched state (if the entity was found)
    /// plus a forced redraw.
    pub fn resync(state: Option<ObservedState>) -> Self {
        Self {
            state,
            forced: true,
        }
    }
}
