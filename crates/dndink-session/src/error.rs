//! Session error taxonomy.

use thiserror::Error;

/// How the session loop reacts to a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    /// Exponential backoff, forever.
    Backoff,
    /// Fixed slow cadence, forever, logged at error level each time.
    SlowFixed,
    /// Stop the session and surface the error.
    Fatal,
}

/// Errors from the connection lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configuration cannot produce a usable connection (e.g. a base
    /// URL that has no WebSocket form).
    #[error("configuration error: {0}")]
    Config(String),

    /// The server rejected the access token.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The transport could not be established, failed, timed out or closed.
    #[error("network error: {0}")]
    Network(String),

    /// The server sent something the handshake did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Retry policy for this error.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Config(_) => RetryClass::Fatal,
            Self::Auth(_) => RetryClass::SlowFixed,
            Self::Network(_) | Self::Protocol(_) => RetryClass::Backoff,
        }
    }

    /// Whether the session loop should try again.
    pub fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Fatal
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Url(e) => Self::Config(format!("invalid WebSocket URL: {e}")),
            WsError::Protocol(e) => Self::Protocol(e.to_string()),
            other => Self::Network(other.to_string()),
        }
    }
}
