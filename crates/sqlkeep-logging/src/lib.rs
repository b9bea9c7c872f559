//! # sqlkeep-logging
//!
//! Structured logging for sqlkeep with `tracing`.
//!
//! - [`init_subscriber`] installs a compact stderr subscriber filtered by
//!   `RUST_LOG` or a caller-supplied directive.
//! - [`init_from_settings`] does the same with the `log_level` directive of
//!   loaded [`StoreSettings`] (`logLevel` in settings.json,
//!   `SQLKEEP_LOG_LEVEL` in the environment).
//! - [`capture_logs`] installs a thread-local capturing subscriber so tests
//!   can assert on what the store layer logged.

#![deny(unsafe_code)]

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

use sqlkeep_settings::StoreSettings;
use tracing_subscriber::EnvFilter;

/// Directive used when the configured one does not parse.
pub const FALLBACK_LEVEL: &str = "warn";

/// Filter for `level`, or [`FALLBACK_LEVEL`] if `level` is not a valid
/// directive.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|err| {
        eprintln!("invalid log level {level:?} ({err}), using {FALLBACK_LEVEL}");
        EnvFilter::new(FALLBACK_LEVEL)
    })
}

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` wins over `level` when set. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| env_filter(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// [`init_subscriber`] with the directive from `settings.log_level`.
pub fn init_from_settings(settings: &StoreSettings) {
    init_subscriber(&settings.log_level);
}

#[cfg(test)]
mod tests {
    use super::*;

    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::Layer;
    use tracing_subscriber::registry::Registry;

    fn max_level(filter: &EnvFilter) -> Option<LevelFilter> {
        Layer::<Registry>::max_level_hint(filter)
    }

    #[test]
    fn init_subscriber_twice_is_harmless() {
        init_subscriber("warn");
        init_subscriber("debug");
    }

    #[test]
    fn settings_level_becomes_the_filter() {
        assert_eq!(max_level(&env_filter("debug")), Some(LevelFilter::DEBUG));
        assert_eq!(max_level(&env_filter("sqlkeep=trace")), Some(LevelFilter::TRACE));
    }

    #[test]
    fn unparseable_level_falls_back_to_warn() {
        assert_eq!(max_level(&env_filter("sqlkeep=loud")), Some(LevelFilter::WARN));
    }

    #[test]
    fn init_from_settings_is_harmless() {
        let settings = StoreSettings {
            log_level: "sqlkeep=info".into(),
            ..StoreSettings::default()
        };
        init_from_settings(&settings);
        init_from_settings(&StoreSettings::default());
    }
}
