//! # dndink-session
//!
//! Keeps one authenticated, subscribed connection to the Home Assistant
//! WebSocket API alive and turns its `state_changed` events into
//! [`RenderRequest`]s for the display side.
//!
//! - [`manager::SessionManager`]: connect / authenticate / subscribe /
//!   resync / read loop with reconnect backoff, as an explicit state machine
//! - [`interpreter::StateInterpreter`]: payload → [`ObservedState`] mapping
//! - [`protocol`]: the subset of the Home Assistant wire messages we use
//! - [`transport`]: the [`transport::Connector`] / [`transport::Transport`]
//!   seam, with the `tokio-tungstenite` implementation
//!
//! [`RenderRequest`]: dndink_core::RenderRequest
//! [`ObservedState`]: dndink_core::ObservedState

#![deny(unsafe_code)]

pub mod error;
pub mod heartbeat;
pub mod interpreter;
pub mod manager;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod fake;

pub use error::{RetryClass, SessionError};
pub use interpreter::{Interpretation, StateInterpreter};
pub use manager::{SessionConfig, SessionManager, SessionState};
pub use transport::{Connector, Transport, WsConnector};
