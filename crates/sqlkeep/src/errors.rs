//! Error types for the store layer.
//!
//! [`StoreError`] is returned by every fallible operation in this crate.
//! Engine failures are carried verbatim; nothing here retries.

use thiserror::Error;

/// Errors that can occur while defining, opening, or using a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` reported an error (malformed SQL, constraint, I/O).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A non-`SQLite` engine reported an error.
    #[error("engine error: {0}")]
    Engine(String),

    /// The schema definition is unusable.
    #[error("invalid schema definition: {message}")]
    Definition {
        /// What is wrong with the definition.
        message: String,
    },

    /// Work was submitted to a store whose channel has been stopped.
    #[error("{store} has been closed and its job queue is stopped")]
    ChannelClosed {
        /// Name of the closed store.
        store: String,
    },

    /// A row value could not be read as the requested type.
    #[error("column {column} holds {value:?}, which is not a valid {target}")]
    Coercion {
        /// Column that was read.
        column: String,
        /// Requested Rust type.
        target: &'static str,
        /// Textual form of the stored value.
        value: String,
    },

    /// A row value could not be parsed as a timestamp.
    #[error("column {column} holds {value:?}, which is not a timestamp: {source}")]
    DateParse {
        /// Column that was read.
        column: String,
        /// The stored text.
        value: String,
        /// Parser failure.
        #[source]
        source: chrono::ParseError,
    },

    /// A migration step failed; the stored version was left unchanged.
    #[error("migrating {store} to version {version} failed: {source}")]
    Migration {
        /// Store being migrated.
        store: String,
        /// Version the failed step would have produced.
        version: usize,
        /// Underlying failure.
        #[source]
        source: Box<StoreError>,
    },

    /// An insert or upsert plan cannot be turned into SQL.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Filesystem error (e.g. creating the store directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (worker spawn failure, worker exited mid-job).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether this is the "submitted after close" condition.
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, Self::ChannelClosed { .. })
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
