//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
///
/// Every variant is fatal at startup: the daemon exits before connecting.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A required value was not provided by any layer.
    #[error("missing required setting: {0}")]
    MissingValue(String),
    /// A settings value was present but invalid.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
