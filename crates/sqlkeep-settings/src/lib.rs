//! # sqlkeep-settings
//!
//! Configuration for sqlkeep stores, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`StoreSettings::default()`]
//! 2. **User file**: `~/.sqlite/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SQLKEEP_*` overrides (highest priority)
//!
//! There is no global instance: callers load settings once at startup and
//! hand them to the store registry.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, default_home, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::{JournalMode, StoreSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = StoreSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = StoreSettings::default();
        assert_eq!(settings.home, default_home());
        assert_eq!(settings.queue_capacity, 64);
        assert_eq!(settings.busy_timeout_ms, 5000);
        assert_eq!(settings.journal_mode, JournalMode::Wal);
        assert!(settings.foreign_keys);
        assert_eq!(settings.log_level, "warn");
    }
}
