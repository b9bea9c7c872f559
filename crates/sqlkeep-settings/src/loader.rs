//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StoreSettings::default()`]
//! 2. If `~/.sqlite/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SQLKEEP_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{JournalMode, StoreSettings};

/// Largest accepted per-store queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

/// Default store home: `~/.sqlite`.
pub fn default_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".sqlite")
}

/// Resolve the path to the settings file (`~/.sqlite/settings.json`).
pub fn settings_path() -> PathBuf {
    default_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<StoreSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an out-of-range value in
/// the file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<StoreSettings> {
    let defaults = serde_json::to_value(StoreSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: StoreSettings = serde_json::from_value(merged)?;
    validate(&settings)?;
    apply_env_overrides(&mut settings);
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

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut StoreSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning, keeping the file/default value.
pub fn apply_overrides<F>(settings: &mut StoreSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = read_string(&lookup, "SQLKEEP_HOME") {
        settings.home = PathBuf::from(v);
    }
    if let Some(v) = read_parsed(&lookup, "SQLKEEP_QUEUE_CAPACITY", |s| {
        parse_usize_range(s, 1, MAX_QUEUE_CAPACITY)
    }) {
        settings.queue_capacity = v;
    }
    if let Some(v) = read_parsed(&lookup, "SQLKEEP_BUSY_TIMEOUT_MS", |s| {
        parse_u32_range(s, 0, 3_600_000)
    }) {
        settings.busy_timeout_ms = v;
    }
    if let Some(v) = read_parsed(&lookup, "SQLKEEP_JOURNAL_MODE", JournalMode::parse) {
        settings.journal_mode = v;
    }
    if let Some(v) = read_parsed(&lookup, "SQLKEEP_FOREIGN_KEYS", parse_bool) {
        settings.foreign_keys = v;
    }
    if let Some(v) = read_string(&lookup, "SQLKEEP_LOG_LEVEL") {
        settings.log_level = v;
    }
}

fn validate(settings: &StoreSettings) -> Result<()> {
    if settings.queue_capacity == 0 || settings.queue_capacity > MAX_QUEUE_CAPACITY {
        return Err(SettingsError::InvalidValue(format!(
            "queueCapacity must be within 1..={MAX_QUEUE_CAPACITY}, got {}",
            settings.queue_capacity
        )));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Override readers (thin wrappers) ────────────────────────────────────────

fn read_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.is_empty())
}

fn read_parsed<F, T>(lookup: &F, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env override, ignoring");
    }
    result
}
