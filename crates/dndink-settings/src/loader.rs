//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DndSettings::default()`]
//! 2. If a settings file is given, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! A malformed override is an error; it is never skipped.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::errors::{Result, SettingsError};
use crate::types::{AccessToken, DisplayDriverKind, DndSettings};

/// Environment variable naming the settings file when `--config` is absent.
pub const CONFIG_PATH_ENV: &str = "DNDINK_CONFIG";

/// Upper bound for the redraw interval (one day).
const MAX_REFRESH_SECS: u64 = 86_400;

/// Load settings from an optional file with env var overrides, then validate.
///
/// `path` falls back to `$DNDINK_CONFIG`; with neither, only defaults and
/// the environment are used. A path that is given but missing is an error.
pub fn load_settings(path: Option<&Path>) -> Result<DndSettings> {
    let env_path = std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let path = path.map(Path::to_path_buf).or(env_path);

    let mut settings = load_file_layer(path.as_deref())?;
    apply_env_overrides(&mut settings)?;
    validate(&settings)?;
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: Option<&Path>) -> Result<DndSettings> {
    let defaults = serde_json::to_value(DndSettings::default())?;

    let merged = match path {
        Some(path) => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        None => {
            debug!("no settings file, using defaults");
            defaults
        }
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut DndSettings) -> Result<()> {
    apply_env_overrides_from(settings, |name| std::env::var(name).ok())
}

/// Apply overrides read through `lookup`.
///
/// Empty values count as unset.
pub fn apply_env_overrides_from<F>(settings: &mut DndSettings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // ── Home Assistant ──────────────────────────────────────────────
    if let Some(v) = read("HA_BASE_URL") {
        settings.home_assistant.base_url = v.trim().trim_end_matches('/').to_string();
    }
    if let Some(v) = read("HA_TOKEN") {
        settings.home_assistant.token = AccessToken::new(v.trim());
    }
    if let Some(v) = read("HA_ENTITY_ID") {
        settings.home_assistant.entity_id = v.trim().to_string();
    }
    if let Some(v) = read("HA_PING_INTERVAL_SECONDS") {
        settings.home_assistant.ping_interval_secs =
            parse_u64_range("HA_PING_INTERVAL_SECONDS", &v, 0, 3600)?;
    }
    if let Some(v) = read("HA_AUTH_RETRY_SECONDS") {
        settings.reconnect.auth_retry_delay_ms =
            parse_u64_range("HA_AUTH_RETRY_SECONDS", &v, 1, 86_400)? * 1000;
    }

    // ── Display ─────────────────────────────────────────────────────
    if let Some(v) = read("HA_MIN_REFRESH_SECONDS") {
        settings.display.min_refresh_secs =
            parse_u64_range("HA_MIN_REFRESH_SECONDS", &v, 0, MAX_REFRESH_SECS)?;
    }
    if let Some(v) = read("DNDINK_DISPLAY_DRIVER") {
        settings.display.driver = DisplayDriverKind::parse(&v).ok_or_else(|| {
            SettingsError::InvalidValue(format!(
                "DNDINK_DISPLAY_DRIVER={v} (expected simulated or waveshare)"
            ))
        })?;
    }
    if let Some(v) = read("DNDINK_OUTPUT_DIR") {
        settings.display.output_dir = PathBuf::from(v.trim());
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("DNDINK_LOG_LEVEL") {
        settings.logging.level = v.trim().to_string();
    }

    Ok(())
}

/// Check the merged settings before anything connects.
pub fn validate(settings: &DndSettings) -> Result<()> {
    let ha = &settings.home_assistant;

    if ha.token.is_empty() {
        return Err(SettingsError::MissingValue(
            "HA_TOKEN (Home Assistant long-lived access token)".to_string(),
        ));
    }

    let url = Url::parse(&ha.base_url)
        .map_err(|e| SettingsError::InvalidValue(format!("HA_BASE_URL={}: {e}", ha.base_url)))?;
    if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(SettingsError::InvalidValue(format!(
            "HA_BASE_URL={}: unsupported scheme {}",
            ha.base_url,
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(SettingsError::InvalidValue(format!(
            "HA_BASE_URL={}: missing host",
            ha.base_url
        )));
    }

    let entity = ha.entity_id.trim();
    if entity.is_empty() || !entity.contains('.') || entity.starts_with('.') || entity.ends_with('.')
    {
        return Err(SettingsError::InvalidValue(format!(
            "HA_ENTITY_ID={} (expected domain.object_id)",
            ha.entity_id
        )));
    }

    if settings.display.min_refresh_secs > MAX_REFRESH_SECS {
        return Err(SettingsError::InvalidValue(format!(
            "minRefreshSecs={} (max {MAX_REFRESH_SECS})",
            settings.display.min_refresh_secs
        )));
    }
    if ha.handshake_timeout_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "handshakeTimeoutSecs must be at least 1".to_string(),
        ));
    }

    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(name: &str, val: &str, min: u64, max: u64) -> Result<u64> {
    val.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
        .ok_or_else(|| {
            SettingsError::InvalidValue(format!("{name}={val} (expected integer {min}..={max})"))
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
