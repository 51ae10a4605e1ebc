//! # dndink-settings
//!
//! Configuration for the dndink daemon, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`DndSettings::default()`]
//! 2. **Settings file**: optional JSON, deep-merged over defaults
//! 3. **Environment variables**: `HA_*` / `DNDINK_*` overrides
//!
//! The merged result is checked by [`validate`] before anything connects.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_env_overrides_from, deep_merge, load_settings, validate};
pub use types::*;
