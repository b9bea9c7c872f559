//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every field has a default, so a
//! settings file only needs to name the values it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::default_home;

/// SQLite journal mode applied to every store connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalMode {
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Rollback journal truncated after each transaction.
    Truncate,
    /// Rollback journal kept and its header zeroed.
    Persist,
    /// Journal kept in memory.
    Memory,
    /// Write-ahead log.
    #[default]
    Wal,
    /// No journal (no atomic rollback).
    Off,
}

impl JournalMode {
    /// The keyword used in `PRAGMA journal_mode = ...`.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Off => "OFF",
        }
    }

    /// Parse a journal mode keyword (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_ascii_uppercase().as_str() {
            "DELETE" => Some(Self::Delete),
            "TRUNCATE" => Some(Self::Truncate),
            "PERSIST" => Some(Self::Persist),
            "MEMORY" => Some(Self::Memory),
            "WAL" => Some(Self::Wal),
            "OFF" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Root settings for a store registry.
///
/// ```json
/// {
///   "home": "/var/lib/myapp/stores",
///   "queueCapacity": 128,
///   "journalMode": "DELETE"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Directory holding the metadata store and default store files.
    pub home: PathBuf,
    /// Maximum number of jobs waiting in one store's queue before
    /// submitters block.
    pub queue_capacity: usize,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Journal mode applied on open.
    pub journal_mode: JournalMode,
    /// Whether `PRAGMA foreign_keys` is switched on.
    pub foreign_keys: bool,
    /// Default `tracing` filter directive, applied by
    /// `sqlkeep_logging::init_from_settings`.
    pub log_level: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            home: default_home(),
            queue_capacity: 64,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
            foreign_keys: true,
            log_level: "warn".to_string(),
        }
    }
}

impl StoreSettings {
    /// Settings rooted at `home`, everything else default.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(StoreSettings::default()).unwrap();
        assert_eq!(json["queueCapacity"], 64);
        assert_eq!(json["busyTimeoutMs"], 5000);
        assert_eq!(json["journalMode"], "WAL");
        assert_eq!(json["foreignKeys"], true);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: StoreSettings =
            serde_json::from_str(r#"{"queueCapacity": 8}"#).unwrap();
        assert_eq!(settings.queue_capacity, 8);
        assert_eq!(settings.busy_timeout_ms, 5000);
        assert_eq!(settings.journal_mode, JournalMode::Wal);
    }

    #[test]
    fn journal_mode_keywords() {
        assert_eq!(JournalMode::parse("wal"), Some(JournalMode::Wal));
        assert_eq!(JournalMode::parse("Delete"), Some(JournalMode::Delete));
        assert_eq!(JournalMode::parse("sideways"), None);
        assert_eq!(JournalMode::Truncate.as_sql(), "TRUNCATE");
    }

    #[test]
    fn with_home_keeps_other_defaults() {
        let settings = StoreSettings::with_home("/tmp/stores");
        assert_eq!(settings.home, PathBuf::from("/tmp/stores"));
        assert_eq!(settings.queue_capacity, 64);
    }
}
