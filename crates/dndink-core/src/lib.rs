//! # dndink-core
//!
//! Shared vocabulary for the dndink display daemon:
//!
//! - [`ObservedState`]: the busy / free / unknown value shown on the panel
//! - [`RenderRequest`]: what the session task asks the render throttler for
//! - [`retry`]: reconnect backoff parameters and delay calculation
//! - [`logging`]: `tracing` subscriber setup for the binary

#![deny(unsafe_code)]

pub mod logging;
pub mod retry;
pub mod state;

pub use retry::{BackoffConfig, calculate_backoff_delay, calculate_backoff_delay_with_random};
pub use state::{ObservedState, RenderRequest};
