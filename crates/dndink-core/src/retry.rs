//! Reconnect backoff parameters and delay calculation.
//!
//! - [`BackoffConfig`]: delays for network failures and rejected credentials
//! - [`calculate_backoff_delay`]: capped exponential delay, no jitter
//! - [`calculate_backoff_delay_with_random`]: same, with caller-supplied randomness

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;
/// Default fixed delay after a rejected credential, in milliseconds.
pub const DEFAULT_AUTH_RETRY_DELAY_MS: u64 = 60_000;

/// Reconnect timing.
///
/// Network failures back off exponentially from `base_delay_ms` up to
/// `max_delay_ms`. Authentication failures always wait `auth_retry_delay_ms`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    /// Base delay for exponential backoff in ms.
    pub base_delay_ms: u64,
    /// Maximum delay between network retries in ms.
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0.
    pub jitter_factor: f64,
    /// Fixed delay after an authentication failure in ms.
    pub auth_retry_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            auth_retry_delay_ms: DEFAULT_AUTH_RETRY_DELAY_MS,
        }
    }
}

impl BackoffConfig {
    /// Jittered delay before network retry number `attempt` (zero-based).
    pub fn network_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            rand::random::<f64>(),
        ))
    }

    /// Delay before retrying after the server rejected the credential.
    pub fn auth_delay(&self) -> Duration {
        Duration::from_millis(self.auth_retry_delay_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff without jitter: `min(max_delay, base_delay * 2^attempt)`.
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms
        .saturating_mul(1u64 << attempt.min(31))
        .min(max_delay_ms)
}

/// Exponential backoff with symmetric jitter, never above `max_delay_ms`.
///
/// `random` should be a value in `[0.0, 1.0)`; it maps to a multiplier in
/// `[1 - jitter, 1 + jitter)`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let capped = calculate_backoff_delay(attempt, base_delay_ms, max_delay_ms);
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    let with_jitter = (capped as f64) * jitter;

    (with_jitter.round().max(0.0) as u64).min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
