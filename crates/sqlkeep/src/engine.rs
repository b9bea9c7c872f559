//! The boundary to the embedded SQL engine.
//!
//! [`Engine`] opens connections; [`EngineConnection`] runs SQL text on one
//! of them. Connections are opened and used on a store's worker thread only,
//! so they need not be `Send`. [`SqliteEngine`] is the `rusqlite` backend;
//! tests substitute their own engines.

use std::path::Path;

use rusqlite::Connection;
use sqlkeep_settings::{JournalMode, StoreSettings};
use tracing::debug;

use crate::errors::Result;
use crate::row::Row;
use crate::value::SqlValue;

/// Opens connections to store files.
pub trait Engine: Send + Sync + 'static {
    /// Open (creating if needed) the store file at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn EngineConnection>>;

    /// Whether a store file exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// One open connection.
pub trait EngineConnection {
    /// Prepare `sql`, step through every result row, and decode each one.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Execute SQL that returns no rows. May contain several statements.
    fn exec(&mut self, sql: &str) -> Result<()>;

    /// `ROWID` of the most recent successful insert on this connection.
    fn last_insert_rowid(&self) -> i64;
}

/// `SQLite` engine configured from [`StoreSettings`].
#[derive(Clone, Debug)]
pub struct SqliteEngine {
    busy_timeout_ms: u32,
    journal_mode: JournalMode,
    foreign_keys: bool,
}

impl SqliteEngine {
    /// Engine applying the pragmas named in `settings`.
    pub fn new(settings: &StoreSettings) -> Self {
        Self {
            busy_timeout_ms: settings.busy_timeout_ms,
            journal_mode: settings.journal_mode,
            foreign_keys: settings.foreign_keys,
        }
    }

    fn pragmas(&self) -> String {
        format!(
            "PRAGMA busy_timeout = {};\
             PRAGMA journal_mode = {};\
             PRAGMA foreign_keys = {};",
            self.busy_timeout_ms,
            self.journal_mode.as_sql(),
            if self.foreign_keys { "ON" } else { "OFF" },
        )
    }
}

impl Default for SqliteEngine {
    fn default() -> Self {
        Self::new(&StoreSettings::default())
    }
}

impl Engine for SqliteEngine {
    fn open(&self, path: &Path) -> Result<Box<dyn EngineConnection>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(&self.pragmas())?;
        debug!(path = %path.display(), "sqlite connection opened");
        Ok(Box::new(SqliteConnection { conn }))
    }
}

/// A `rusqlite` connection behind [`EngineConnection`].
pub struct SqliteConnection {
    conn: Connection,
}

impl EngineConnection for SqliteConnection {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut columns = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                columns.push((name.clone(), SqlValue::from(row.get_ref(i)?)));
            }
            out.push(Row::new(columns));
        }
        Ok(out)
    }

    fn exec(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::errors::StoreError;

    fn open_temp() -> (tempfile::TempDir, Box<dyn EngineConnection>) {
        let dir = tempfile::tempdir().unwrap();
        let conn = SqliteEngine::default()
            .open(&dir.path().join("nested").join("store.db"))
            .unwrap();
        (dir, conn)
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("store.db");
        let engine = SqliteEngine::default();
        assert!(!engine.exists(&path));
        let _conn = engine.open(&path).unwrap();
        assert!(engine.exists(&path));
    }

    #[test]
    fn pragmas_follow_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = StoreSettings {
            journal_mode: JournalMode::Delete,
            foreign_keys: false,
            ..StoreSettings::with_home(dir.path())
        };
        let mut conn = SqliteEngine::new(&settings)
            .open(&dir.path().join("p.db"))
            .unwrap();
        let mode = conn.query("PRAGMA journal_mode").unwrap();
        assert_eq!(mode[0].get_string("journal_mode").as_deref(), Some("delete"));
        let fk = conn.query("PRAGMA foreign_keys").unwrap();
        assert_eq!(fk[0].get_int("foreign_keys").unwrap(), Some(0));
    }

    #[test]
    fn query_decodes_columns_by_name() {
        let (_dir, mut conn) = open_temp();
        conn.exec("create table t (id integer, value text, score real, raw blob)")
            .unwrap();
        conn.exec("insert into t values (1, 'one', 1.5, x'6869'), (2, NULL, NULL, NULL)")
            .unwrap();
        let rows = conn.query("select * from t order by id").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&SqlValue::Integer(1)));
        assert_eq!(rows[0].get_string("value").as_deref(), Some("one"));
        assert_eq!(rows[0].get_double("score").unwrap(), Some(1.5));
        assert_eq!(rows[0].get("raw"), Some(&SqlValue::Blob(b"hi".to_vec())));
        assert_eq!(rows[1].get("value"), Some(&SqlValue::Null));
    }

    #[test]
    fn exec_runs_multiple_statements() {
        let (_dir, mut conn) = open_temp();
        conn.exec("create table a (x); create table b (y); insert into a values (1);")
            .unwrap();
        assert_eq!(conn.last_insert_rowid(), 1);
        assert_eq!(conn.query("select * from b").unwrap().len(), 0);
    }

    #[test]
    fn engine_errors_surface_verbatim() {
        let (_dir, mut conn) = open_temp();
        assert_matches!(conn.query("select * from missing"), Err(StoreError::Sqlite(e))
            if e.to_string().contains("no such table"));
    }
}
