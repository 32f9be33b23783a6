//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TapsyncSettings::default()`]
//! 2. If `~/.tapsync/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TAPSYNC_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::TapsyncSettings;

/// `~/.tapsync`, falling back to `/tmp/.tapsync` without a home directory.
pub fn tapsync_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tapsync")
}

/// Resolve the path to the settings file (`~/.tapsync/settings.json`).
pub fn settings_path() -> PathBuf {
    tapsync_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TapsyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TapsyncSettings> {
    let defaults = serde_json::to_value(TapsyncSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TapsyncSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
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

/// Apply `TAPSYNC_*` overrides read through `lookup`.
///
/// Numbers must parse and fall inside their range; anything else is ignored
/// with a warning and the file/default value stays.
pub fn apply_overrides<F>(settings: &mut TapsyncSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("TAPSYNC_SERVER_URL") {
        settings.server.url = v;
    }
    if let Some(v) = env.u32("TAPSYNC_RECONNECT_ATTEMPTS", 0, 100) {
        settings.connection.reconnect_attempts = v;
    }
    if let Some(v) = env.u64("TAPSYNC_RECONNECT_DELAY_MS", 0, 60_000) {
        settings.connection.reconnect_delay_ms = v;
    }
    if let Some(v) = env.u32("TAPSYNC_COUNTDOWN_TICKS", 1, 60) {
        // range-checked above
        settings.gameplay.countdown_ticks = u8::try_from(v).unwrap_or(5);
    }
    if let Some(v) = env.string("TAPSYNC_IDENTITY_DB") {
        settings.storage.identity_db = v;
    }
    if let Some(v) = env.string("TAPSYNC_PROFILE") {
        settings.storage.profile = v;
    }
    if let Some(v) = env.string("TAPSYNC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("TAPSYNC_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = (self.lookup)(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}
