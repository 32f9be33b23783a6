//! # tapsync-settings
//!
//! Client settings loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TapsyncSettings::default()`]
//! 2. **User file**: `~/.tapsync/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TAPSYNC_*` overrides (highest priority)
//!
//! Command-line flags are applied by the binary on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path, tapsync_dir,
};
pub use types::*;
