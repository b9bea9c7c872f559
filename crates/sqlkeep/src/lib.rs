//! # sqlkeep
//!
//! Versioned, single-writer access to embedded `SQLite` stores.
//!
//! - **Schema**: `define_schema(name).step([...])` declares a store as ordered migration steps
//! - **Migrations**: opening a store applies missing steps, one transaction per step,
//!   tracking versions in the `database_info` metadata store
//! - **Execution channel**: one worker thread per store file; callers block until their job ran
//! - **SQL building**: [`StatementText`] placeholders with escaped literal substitution,
//!   [`TransactionPlan`], and the [`InsertPlan`] / [`UpsertPlan`] generators
//! - **Rows**: [`Row`] with typed getters
//!
//! ```ignore
//! let settings = sqlkeep_settings::load_settings()?;
//! sqlkeep_logging::init_from_settings(&settings);
//! let registry = StoreRegistry::new(settings)?;
//! let def = define_schema("notes")
//!     .step(["create table if not exists note (id integer, body text)"])
//!     .build()?;
//! let notes = registry.open(&def, None)?;
//! let row = notes.insert(&InsertPlan::new("note").auto_next("id").field("body", "hello"))?;
//! ```

#![deny(unsafe_code)]

pub mod channel;
pub mod engine;
pub mod errors;
pub mod migrations;
pub mod plans;
pub mod registry;
pub mod row;
pub mod schema;
pub mod statement;
pub mod transaction;
pub mod value;

pub use channel::ExecutionChannel;
pub use engine::{Engine, EngineConnection, SqliteEngine};
pub use errors::{Result, StoreError};
pub use migrations::{METADATA_STORE, MigrationReport};
pub use plans::{InsertPlan, InsertValue, UpsertPlan};
pub use registry::{StoreHandle, StoreRegistry};
pub use row::Row;
pub use schema::{MigrationStep, SchemaBuilder, SchemaDefinition, define_schema};
pub use statement::StatementText;
pub use transaction::TransactionPlan;
pub use value::{Param, SqlValue, TIMESTAMP_FORMAT};
