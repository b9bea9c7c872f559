//! Open stores, keyed by definition name and file path.
//!
//! A [`StoreRegistry`] owns the metadata store and hands out at most one live
//! [`StoreHandle`] per (definition name, absolute path). Opening a store for
//! the first time starts its channel and migrates it before the handle is
//! returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sqlkeep_settings::StoreSettings;
use tracing::{info, warn};

use crate::channel::ExecutionChannel;
use crate::engine::{Engine, SqliteEngine};
use crate::errors::{Result, StoreError};
use crate::migrations::{self, METADATA_STORE, MigrationReport};
use crate::plans::{InsertPlan, UpsertPlan};
use crate::row::Row;
use crate::schema::SchemaDefinition;
use crate::statement::StatementText;
use crate::transaction::TransactionPlan;

type StoreKey = (String, PathBuf);

/// One registry entry. Its own lock covers opening and migrating that store.
type StoreSlot = Arc<Mutex<Option<StoreHandle>>>;

/// Process-side owner of every open store.
pub struct StoreRegistry {
    settings: StoreSettings,
    engine: Arc<dyn Engine>,
    metadata: StoreHandle,
    stores: Mutex<HashMap<StoreKey, StoreSlot>>,
}

impl StoreRegistry {
    /// Registry backed by `SQLite`, storing files under `settings.home`.
    pub fn new(settings: StoreSettings) -> Result<Self> {
        let engine = Arc::new(SqliteEngine::new(&settings));
        Self::with_engine(settings, engine)
    }

    /// Registry using a caller-supplied engine.
    pub fn with_engine(settings: StoreSettings, engine: Arc<dyn Engine>) -> Result<Self> {
        let definition = migrations::metadata_schema()?;
        let path = std::path::absolute(settings.home.join(METADATA_STORE))?;
        let channel = Arc::new(ExecutionChannel::start(
            METADATA_STORE,
            &path,
            Arc::clone(&engine),
            settings.queue_capacity,
        )?);
        let report = migrations::bootstrap_metadata(&channel, &definition)?;
        info!(path = %path.display(), version = report.to, "metadata store ready");
        let metadata = StoreHandle {
            inner: Arc::new(HandleInner {
                definition,
                path,
                channel: Arc::clone(&channel),
                metadata: channel,
            }),
        };
        Ok(Self {
            settings,
            engine,
            metadata,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Settings this registry was built from.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// The metadata store holding every store's version record.
    pub fn metadata(&self) -> &StoreHandle {
        &self.metadata
    }

    /// Where a store lives when no path is given: `<home>/<name>`.
    pub fn default_path(&self, definition: &SchemaDefinition) -> PathBuf {
        self.settings.home.join(definition.name())
    }

    /// Return the open store for `definition` at `path` (default:
    /// [`Self::default_path`]), opening and migrating it first if needed.
    ///
    /// The registry lock only covers finding or inserting the store's slot.
    /// Opening and migrating happen under that slot's own lock, so concurrent
    /// callers never start two channels for one store while other stores
    /// open in parallel.
    pub fn open(
        &self,
        definition: &Arc<SchemaDefinition>,
        path: Option<&Path>,
    ) -> Result<StoreHandle> {
        if definition.name() == METADATA_STORE {
            return Err(StoreError::Definition {
                message: format!("{METADATA_STORE} is reserved for the metadata store"),
            });
        }
        let path = match path {
            Some(p) => std::path::absolute(p)?,
            None => std::path::absolute(self.default_path(definition))?,
        };

        let slot = Arc::clone(
            self.stores
                .lock()
                .entry((definition.name().to_string(), path.clone()))
                .or_default(),
        );
        let mut cached = slot.lock();
        if let Some(handle) = cached.as_ref().filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }
        *cached = None;
        let handle = self.start_store(definition, path)?;
        *cached = Some(handle.clone());
        Ok(handle)
    }

    fn start_store(
        &self,
        definition: &Arc<SchemaDefinition>,
        path: PathBuf,
    ) -> Result<StoreHandle> {
        let channel = Arc::new(ExecutionChannel::start(
            definition.name(),
            &path,
            Arc::clone(&self.engine),
            self.settings.queue_capacity,
        )?);
        let metadata = &self.metadata.inner.channel;
        let report = match migrations::migrate(&channel, metadata, definition) {
            Ok(report) => report,
            Err(err) => {
                if let Err(close_err) = channel.close() {
                    warn!(store = definition.name(), error = %close_err, "closing after failed migration");
                }
                return Err(err);
            }
        };
        info!(
            store = definition.name(),
            path = %path.display(),
            version = report.to,
            applied = report.applied(),
            "store opened"
        );
        Ok(StoreHandle {
            inner: Arc::new(HandleInner {
                definition: Arc::clone(definition),
                path,
                channel,
                metadata: Arc::clone(&self.metadata.inner.channel),
            }),
        })
    }

    fn slots(&self) -> Vec<StoreSlot> {
        self.stores.lock().values().cloned().collect()
    }

    /// Number of cached stores, closed ones included. Waits for opens in
    /// progress.
    pub fn len(&self) -> usize {
        self.slots().iter().filter(|slot| slot.lock().is_some()).count()
    }

    /// Whether no store is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every store, then the metadata store.
    ///
    /// All stores are closed even if one fails; the first error is returned.
    pub fn close_all(&self) -> Result<()> {
        let slots: Vec<StoreSlot> = self.stores.lock().drain().map(|(_, slot)| slot).collect();
        let handles: Vec<StoreHandle> =
            slots.iter().filter_map(|slot| slot.lock().take()).collect();
        let mut first_err = None;
        for handle in handles.iter().chain(std::iter::once(&self.metadata)) {
            if let Err(err) = handle.close() {
                warn!(store = handle.name(), error = %err, "failed to close store");
                let _ = first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("home", &self.settings.home)
            .field("stores", &self.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct HandleInner {
    definition: Arc<SchemaDefinition>,
    path: PathBuf,
    channel: Arc<ExecutionChannel>,
    metadata: Arc<ExecutionChannel>,
}

/// A store: its definition, its file, and the channel serving it.
///
/// Cheap to clone; clones share the channel.
#[derive(Clone, Debug)]
pub struct StoreHandle {
    inner: Arc<HandleInner>,
}

impl StoreHandle {
    /// Store name.
    pub fn name(&self) -> &str {
        self.inner.definition.name()
    }

    /// The schema this store was opened with.
    pub fn definition(&self) -> &Arc<SchemaDefinition> {
        &self.inner.definition
    }

    /// Absolute path of the store file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Run a row-returning statement. Empty if the file does not exist yet.
    pub fn query(&self, statement: &StatementText) -> Result<Vec<Row>> {
        self.inner.channel.query(statement)
    }

    /// Run one statement; rows are returned for a `select`.
    pub fn execute(&self, statement: &StatementText) -> Result<Vec<Row>> {
        self.inner.channel.execute(statement)
    }

    /// Run a plan atomically. One row list per `select` in the plan.
    pub fn execute_plan(&self, plan: &TransactionPlan) -> Result<Vec<Vec<Row>>> {
        self.inner.channel.execute_plan(plan)
    }

    /// Insert one row and return it as stored.
    pub fn insert(&self, plan: &InsertPlan) -> Result<Vec<Row>> {
        let results = self.execute_plan(&plan.build()?)?;
        Ok(results.into_iter().next().unwrap_or_default())
    }

    /// Insert or update one row by key. The plan selects nothing, so the
    /// list is empty; query by key to read the row back.
    pub fn upsert(&self, plan: &UpsertPlan) -> Result<Vec<Row>> {
        let results = self.execute_plan(&plan.build()?)?;
        Ok(results.into_iter().next().unwrap_or_default())
    }

    /// Applied schema version, read from the metadata store.
    pub fn version(&self) -> Result<usize> {
        migrations::stored_version(&self.inner.metadata, self.name())
    }

    /// Restart the channel of a closed store. No-op while open.
    pub fn open(&self) -> Result<()> {
        self.inner.channel.open()
    }

    /// Finish queued work and stop the channel. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.channel.close()
    }

    /// Whether the channel is stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.channel.is_stopped()
    }

    /// Bring the store up to its definition again, e.g. after reopening.
    pub fn migrate(&self) -> Result<MigrationReport> {
        migrations::migrate(&self.inner.channel, &self.inner.metadata, &self.inner.definition)
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::{Duration, Instant};

    use assert_matches::assert_matches;

    use super::*;
    use crate::channel::fake::FakeEngine;
    use crate::schema::define_schema;

    fn fake_registry(dir: &Path) -> (Arc<FakeEngine>, StoreRegistry) {
        let engine = Arc::new(FakeEngine::default());
        let registry = StoreRegistry::with_engine(
            StoreSettings::with_home(dir),
            Arc::clone(&engine) as Arc<dyn Engine>,
        )
        .unwrap();
        (engine, registry)
    }

    fn slow_registry(dir: &Path, name: &'static str, delay: Duration) -> StoreRegistry {
        let engine = Arc::new(FakeEngine {
            slow_file: Some((name, delay)),
            ..FakeEngine::default()
        });
        StoreRegistry::with_engine(StoreSettings::with_home(dir), engine).unwrap()
    }

    fn def(name: &str) -> Arc<SchemaDefinition> {
        define_schema(name)
            .step(["create table if not exists t (id integer)"])
            .build()
            .unwrap()
    }

    #[test]
    fn same_definition_and_path_share_a_handle() {
        let dir = tempfile::tempdir().unwrap();
        let (_engine, registry) = fake_registry(dir.path());
        let d = def("shared");
        let a = registry.open(&d, None).unwrap();
        let b = registry.open(&d, None).unwrap();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.path(), std::path::absolute(dir.path().join("shared")).unwrap());
    }

    #[test]
    fn distinct_paths_get_distinct_stores() {
        let dir = tempfile::tempdir().unwrap();
        let (_engine, registry) = fake_registry(dir.path());
        let d = def("split");
        let a = registry.open(&d, Some(dir.path().join("one").as_path())).unwrap();
        let b = registry.open(&d, Some(dir.path().join("two").as_path())).unwrap();
        assert!(!Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn open_runs_the_first_migration_step() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, registry) = fake_registry(dir.path());
        registry.open(&def("migrated"), None).unwrap();
        let log = engine.statements();
        assert!(log.iter().any(|s| s == "create table if not exists t (id integer)"));
        assert!(
            log.iter()
                .any(|s| s == "update versions set version = 1 where db_name = 'migrated'")
        );
    }

    #[test]
    fn metadata_name_is_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let (_engine, registry) = fake_registry(dir.path());
        assert_matches!(
            registry.open(&def(METADATA_STORE), None),
            Err(StoreError::Definition { .. })
        );
    }

    #[test]
    fn closed_handle_is_replaced_on_next_open() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, registry) = fake_registry(dir.path());
        let d = def("cycled");
        let first = registry.open(&d, None).unwrap();
        first.close().unwrap();
        assert!(first.execute(&StatementText::new("delete from t")).unwrap_err().is_channel_closed());
        let opens = engine.opens.load(Ordering::SeqCst);
        let second = registry.open(&d, None).unwrap();
        assert!(!second.is_closed());
        assert!(!Arc::ptr_eq(&first.inner, &second.inner));
        assert!(engine.opens.load(Ordering::SeqCst) > opens);
    }

    #[test]
    fn handle_reopen_restarts_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (_engine, registry) = fake_registry(dir.path());
        let handle = registry.open(&def("again"), None).unwrap();
        handle.close().unwrap();
        handle.open().unwrap();
        handle.execute(&StatementText::new("delete from t")).unwrap();
    }

    #[test]
    fn close_all_stops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (_engine, registry) = fake_registry(dir.path());
        let a = registry.open(&def("a"), None).unwrap();
        let b = registry.open(&def("b"), None).unwrap();
        registry.close_all().unwrap();
        assert!(a.is_closed());
        assert!(b.is_closed());
        assert!(registry.metadata().is_closed());
        assert!(registry.is_empty());
    }

    #[test]
    fn slow_migration_does_not_hold_up_other_stores() {
        let dir = tempfile::tempdir().unwrap();
        let registry = slow_registry(dir.path(), "slow", Duration::from_millis(300));
        let cached = registry.open(&def("cached"), None).unwrap();

        thread::scope(|s| {
            let slow = s.spawn(|| registry.open(&def("slow"), None).unwrap());
            thread::sleep(Duration::from_millis(100));

            let started = Instant::now();
            let again = registry.open(&def("cached"), None).unwrap();
            let fast = registry.open(&def("fast"), None).unwrap();
            assert!(started.elapsed() < Duration::from_millis(500));
            assert!(Arc::ptr_eq(&cached.inner, &again.inner));
            assert!(!fast.is_closed());

            let slow = slow.join().unwrap();
            assert!(!slow.is_closed());
        });
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn concurrent_opens_of_one_store_share_a_handle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = slow_registry(dir.path(), "busy", Duration::from_millis(20));
        let d = def("busy");

        let handles: Vec<StoreHandle> = thread::scope(|s| {
            let workers: Vec<_> = (0..4)
                .map(|_| s.spawn(|| registry.open(&d, None).unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });
        assert!(handles.iter().all(|h| Arc::ptr_eq(&h.inner, &handles[0].inner)));
        assert_eq!(registry.len(), 1);
    }
}
