//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sqlkeep::{Engine, EngineConnection, Result, Row, SchemaDefinition, SqliteEngine, StoreRegistry, define_schema};
use sqlkeep_settings::StoreSettings;
use tempfile::TempDir;

/// A statement seen by [`RecordingEngine`], tagged with its store file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    pub file: String,
    pub sql: String,
}

/// `SQLite` engine that records every statement and connection it serves.
#[derive(Default)]
pub struct RecordingEngine {
    inner: SqliteEngine,
    log: Arc<Mutex<Vec<Recorded>>>,
    opened: Mutex<Vec<PathBuf>>,
}

impl RecordingEngine {
    pub fn statements_for(&self, file: &str) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.file == file)
            .map(|r| r.sql.clone())
            .collect()
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
        self.opened.lock().clear();
    }
}

impl Engine for RecordingEngine {
    fn open(&self, path: &Path) -> Result<Box<dyn EngineConnection>> {
        let conn = self.inner.open(path)?;
        self.opened.lock().push(path.to_path_buf());
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Box::new(RecordingConnection {
            file,
            conn,
            log: Arc::clone(&self.log),
        }))
    }
}

struct RecordingConnection {
    file: String,
    conn: Box<dyn EngineConnection>,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingConnection {
    fn record(&self, sql: &str) {
        self.log.lock().push(Recorded {
            file: self.file.clone(),
            sql: sql.to_string(),
        });
    }
}

impl EngineConnection for RecordingConnection {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.record(sql);
        self.conn.query(sql)
    }

    fn exec(&mut self, sql: &str) -> Result<()> {
        self.record(sql);
        self.conn.exec(sql)
    }

    fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}

/// Registry on real `SQLite` files under a fresh temporary home.
pub fn sqlite_registry() -> (TempDir, StoreRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new(StoreSettings::with_home(dir.path())).unwrap();
    (dir, registry)
}

/// Registry over a [`RecordingEngine`] with `home` as its directory.
pub fn recording_registry(home: &Path) -> (Arc<RecordingEngine>, StoreRegistry) {
    let engine = Arc::new(RecordingEngine::default());
    let registry = StoreRegistry::with_engine(
        StoreSettings::with_home(home),
        Arc::clone(&engine) as Arc<dyn Engine>,
    )
    .unwrap();
    (engine, registry)
}

/// Single-table definition named `test`.
pub fn test_definition() -> Arc<SchemaDefinition> {
    define_schema("test")
        .step(["create table if not exists test_table ( id integer, value text )"])
        .build()
        .unwrap()
}

/// `test` plus a second step adding `test_table_2`.
pub fn test_definition_v2() -> Arc<SchemaDefinition> {
    define_schema("testv2")
        .step(["create table if not exists test_table ( id integer, value text )"])
        .step(["create table if not exists test_table_2 (id integer, value_2 text)"])
        .build()
        .unwrap()
}
