//! Versioned schema migration for stores.
//!
//! Every store's applied version lives in the metadata store, in the
//! `versions` table keyed by store name. Opening a store brings it up to the
//! number of steps in its [`SchemaDefinition`]: each missing step runs as one
//! atomic plan on the store's own channel, and the stored version advances
//! only after that plan commits. A crash between the two repeats the step on
//! the next open, so steps should be idempotent (`create table if not exists`).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::ExecutionChannel;
use crate::errors::{Result, StoreError};
use crate::schema::{SchemaDefinition, define_schema};
use crate::statement::StatementText;
use crate::transaction::TransactionPlan;

/// Name of the metadata store, and of its own version record.
pub const METADATA_STORE: &str = "database_info";

const VERSIONS_TABLE: &str = "create table if not exists versions ( \
     db_name text not null, \
     version integer not null, \
     primary key (db_name) \
     )";

/// Definition of the metadata store: a single step creating `versions`.
pub fn metadata_schema() -> Result<Arc<SchemaDefinition>> {
    define_schema(METADATA_STORE).step([VERSIONS_TABLE]).build()
}

/// Outcome of bringing one store up to date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    /// Store name.
    pub store: String,
    /// Version found before migrating.
    pub from: usize,
    /// Version after migrating.
    pub to: usize,
}

impl MigrationReport {
    /// Number of steps applied.
    pub fn applied(&self) -> usize {
        self.to.saturating_sub(self.from)
    }
}

/// Read the stored version of `store`, recording version 0 if it has none.
pub fn stored_version(metadata: &ExecutionChannel, store: &str) -> Result<usize> {
    let rows = metadata.query(
        &StatementText::new("select version from versions where db_name = ?").set(1, store),
    )?;
    if let Some(row) = rows.first() {
        let version = row.get_long("version")?.unwrap_or(0);
        return usize::try_from(version).map_err(|_| StoreError::Coercion {
            column: "version".into(),
            target: "usize",
            value: version.to_string(),
        });
    }
    let _ = metadata.execute_plan(&TransactionPlan::new().add(
        StatementText::new("insert into versions (db_name, version) values (?, 0)").set(1, store),
    ))?;
    Ok(0)
}

/// Apply every step of `definition` past the stored version to `target`.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] naming the store and the version whose
/// step failed. Steps before it stay applied and recorded.
pub fn migrate(
    target: &ExecutionChannel,
    metadata: &ExecutionChannel,
    definition: &SchemaDefinition,
) -> Result<MigrationReport> {
    let store = definition.name();
    let from = stored_version(metadata, store)?;
    let latest = definition.len();

    if from >= latest {
        if from > latest {
            warn!(store, stored = from, latest, "stored version is ahead of the definition");
        } else {
            debug!(store, version = from, "schema up to date");
        }
        return Ok(MigrationReport {
            store: store.to_string(),
            from,
            to: from,
        });
    }

    for (index, step) in definition.steps().iter().enumerate().skip(from) {
        let version = index + 1;
        info!(store, version, statements = step.statements().len(), "applying migration step");
        let wrap = |source: StoreError| StoreError::Migration {
            store: store.to_string(),
            version,
            source: Box::new(source),
        };
        let _ = target.execute_plan(&step.to_plan()).map_err(wrap)?;
        let _ = metadata
            .execute(
                &StatementText::new("update versions set version = ? where db_name = ?")
                    .set(1, version)
                    .set(2, store),
            )
            .map_err(wrap)?;
    }

    info!(store, from, to = latest, "migrations complete");
    Ok(MigrationReport {
        store: store.to_string(),
        from,
        to: latest,
    })
}

/// Prepare the metadata store: create `versions`, then track the metadata
/// store's own version in it like any other store.
pub fn bootstrap_metadata(
    metadata: &ExecutionChannel,
    definition: &SchemaDefinition,
) -> Result<MigrationReport> {
    if let Some(first) = definition.step(1) {
        let _ = metadata.execute_plan(&first.to_plan())?;
    }
    migrate(metadata, metadata, definition)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
