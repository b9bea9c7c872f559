//! Single-writer execution channel.
//!
//! Every open store owns one named worker thread. Callers hand it jobs over
//! a bounded queue and block until the job's reply arrives, so all work
//! against a store file runs one job at a time, in submission order.
//!
//! Submission uses `blocking_send`/`blocking_recv` and therefore must not be
//! called from inside an async runtime; wrap calls in `spawn_blocking` there.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, debug_span, warn};

use crate::engine::{Engine, EngineConnection};
use crate::errors::{Result, StoreError};
use crate::row::Row;
use crate::statement::{StatementText, is_select_sql};
use crate::transaction::{BEGIN, COMMIT, ROLLBACK, TransactionPlan};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Job {
    Query { sql: String, reply: Reply<Vec<Row>> },
    Execute { sql: String, reply: Reply<Vec<Row>> },
    Plan { statements: Vec<String>, reply: Reply<Vec<Vec<Row>>> },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Execute { .. } => "execute",
            Self::Plan { .. } => "plan",
        }
    }
}

#[derive(Default)]
struct ChannelState {
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

/// The job queue and worker thread serving one store file.
pub struct ExecutionChannel {
    name: String,
    path: PathBuf,
    engine: Arc<dyn Engine>,
    capacity: usize,
    state: Mutex<ChannelState>,
}

impl ExecutionChannel {
    /// Create the channel for store `name` at `path` and start its worker.
    ///
    /// `capacity` bounds the number of queued jobs; submitters block while
    /// the queue is full.
    pub fn start(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        engine: Arc<dyn Engine>,
        capacity: usize,
    ) -> Result<Self> {
        let channel = Self {
            name: name.into(),
            path: path.into(),
            engine,
            capacity: capacity.max(1),
            state: Mutex::new(ChannelState::default()),
        };
        channel.open()?;
        Ok(channel)
    }

    /// Store name served by this channel.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store file served by this channel.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a worker if none is running. No-op on a running channel.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.sender.is_some() {
            return Ok(());
        }
        let (sender, receiver) = mpsc::channel(self.capacity);
        let name = self.name.clone();
        let path = self.path.clone();
        let engine = Arc::clone(&self.engine);
        let worker = thread::Builder::new()
            .name(format!("sqlkeep-{}", self.name))
            .spawn(move || Worker::new(name, path, engine).run(receiver))
            .map_err(|e| {
                StoreError::Internal(format!("failed to spawn worker for {}: {e}", self.name))
            })?;
        state.sender = Some(sender);
        state.worker = Some(worker);
        debug!(store = %self.name, path = %self.path.display(), "execution channel started");
        Ok(())
    }

    /// Whether the channel has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().sender.is_none()
    }

    /// Run a row-returning statement.
    ///
    /// Returns an empty list, without touching the engine, when the store
    /// file does not exist yet.
    pub fn query(&self, statement: &StatementText) -> Result<Vec<Row>> {
        if !self.engine.exists(&self.path) {
            return Ok(Vec::new());
        }
        let sql = statement.render();
        self.submit(|reply| Job::Query { sql, reply })
    }

    /// Run one statement. Returns its rows when it is a `select`, otherwise
    /// an empty list.
    pub fn execute(&self, statement: &StatementText) -> Result<Vec<Row>> {
        let sql = statement.render();
        self.submit(|reply| Job::Execute { sql, reply })
    }

    /// Run a plan atomically. Returns one row list per `select` statement.
    pub fn execute_plan(&self, plan: &TransactionPlan) -> Result<Vec<Vec<Row>>> {
        let statements = plan.render_body();
        self.submit(|reply| Job::Plan { statements, reply })
    }

    /// Stop accepting work, let queued jobs finish, and join the worker.
    /// Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let (sender, worker) = {
            let mut state = self.state.lock();
            (state.sender.take(), state.worker.take())
        };
        drop(sender);
        if let Some(worker) = worker {
            worker
                .join()
                .map_err(|_| StoreError::Internal(format!("{} worker panicked", self.name)))?;
            debug!(store = %self.name, "execution channel stopped");
        }
        Ok(())
    }

    fn submit<T>(&self, job: impl FnOnce(Reply<T>) -> Job) -> Result<T> {
        let sender = self
            .state
            .lock()
            .sender
            .clone()
            .ok_or_else(|| self.closed())?;
        let (reply, response) = oneshot::channel();
        sender.blocking_send(job(reply)).map_err(|_| self.closed())?;
        drop(sender);
        response.blocking_recv().map_err(|_| {
            StoreError::Internal(format!("{} worker exited before replying", self.name))
        })?
    }

    fn closed(&self) -> StoreError {
        StoreError::ChannelClosed {
            store: self.name.clone(),
        }
    }
}

impl Drop for ExecutionChannel {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(store = %self.name, error = %err, "execution channel did not stop cleanly");
        }
    }
}

impl std::fmt::Debug for ExecutionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionChannel")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

/// State owned by the worker thread. The connection never leaves it.
struct Worker {
    name: String,
    path: PathBuf,
    engine: Arc<dyn Engine>,
    conn: Option<Box<dyn EngineConnection>>,
}

impl Worker {
    fn new(name: String, path: PathBuf, engine: Arc<dyn Engine>) -> Self {
        Self {
            name,
            path,
            engine,
            conn: None,
        }
    }

    fn run(mut self, mut receiver: mpsc::Receiver<Job>) {
        while let Some(job) = receiver.blocking_recv() {
            let span = debug_span!("store_job", store = %self.name, kind = job.kind());
            let _enter = span.enter();
            // A dropped reply means the submitter is gone; nothing to report.
            match job {
                Job::Query { sql, reply } => {
                    let _ = reply.send(self.connection().and_then(|c| c.query(&sql)));
                }
                Job::Execute { sql, reply } => {
                    let _ = reply.send(self.connection().and_then(|c| run_one(c, &sql)));
                }
                Job::Plan { statements, reply } => {
                    let _ = reply.send(self.connection().and_then(|c| run_plan(c, &statements)));
                }
            }
        }
        debug!(store = %self.name, "worker drained its queue");
    }

    fn connection(&mut self) -> Result<&mut (dyn EngineConnection + 'static)> {
        if self.conn.is_none() {
            let conn = self.engine.open(&self.path)?;
            debug!(store = %self.name, "worker opened engine connection");
            self.conn = Some(conn);
        }
        self.conn
            .as_deref_mut()
            .ok_or_else(|| StoreError::Internal(format!("{} has no connection", self.name)))
    }
}

fn run_one(conn: &mut dyn EngineConnection, sql: &str) -> Result<Vec<Row>> {
    if is_select_sql(sql) {
        conn.query(sql)
    } else {
        conn.exec(sql)?;
        Ok(Vec::new())
    }
}

fn run_plan(conn: &mut dyn EngineConnection, statements: &[String]) -> Result<Vec<Vec<Row>>> {
    conn.exec(BEGIN)?;
    let outcome = run_statements(conn, statements).and_then(|results| {
        conn.exec(COMMIT)?;
        Ok(results)
    });
    if outcome.is_err() {
        if let Err(err) = conn.exec(ROLLBACK) {
            warn!(error = %err, "rollback after failed plan also failed");
        }
    }
    outcome
}

fn run_statements(
    conn: &mut dyn EngineConnection,
    statements: &[String],
) -> Result<Vec<Vec<Row>>> {
    let mut results = Vec::new();
    for sql in statements {
        if is_select_sql(sql) {
            results.push(conn.query(sql)?);
        } else {
            conn.exec(sql)?;
        }
    }
    Ok(results)
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory engine recording every statement it sees.

    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::engine::{Engine, EngineConnection};
    use crate::errors::{Result, StoreError};
    use crate::row::Row;
    use crate::value::SqlValue;

    #[derive(Default)]
    pub(crate) struct FakeEngine {
        pub(crate) log: Arc<Mutex<Vec<String>>>,
        pub(crate) opens: AtomicUsize,
        pub(crate) missing: AtomicBool,
        pub(crate) active: Arc<AtomicUsize>,
        pub(crate) max_active: Arc<AtomicUsize>,
        pub(crate) delay: Option<Duration>,
        /// Per-statement delay for connections to the file with this name.
        pub(crate) slow_file: Option<(&'static str, Duration)>,
    }

    impl FakeEngine {
        pub(crate) fn statements(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl Engine for FakeEngine {
        fn open(&self, path: &Path) -> Result<Box<dyn EngineConnection>> {
            let _ = self.opens.fetch_add(1, Ordering::SeqCst);
            let delay = match self.slow_file {
                Some((name, delay)) if path.file_name().is_some_and(|f| f == name) => Some(delay),
                _ => self.delay,
            };
            Ok(Box::new(FakeConnection {
                log: Arc::clone(&self.log),
                active: Arc::clone(&self.active),
                max_active: Arc::clone(&self.max_active),
                delay,
            }))
        }

        fn exists(&self, _path: &Path) -> bool {
            !self.missing.load(Ordering::SeqCst)
        }
    }

    struct FakeConnection {
        log: Arc<Mutex<Vec<String>>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    impl FakeConnection {
        fn record(&self, sql: &str) -> Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.max_active.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.log.lock().push(sql.to_string());
            let _ = self.active.fetch_sub(1, Ordering::SeqCst);
            if sql.contains("fail") {
                Err(StoreError::Engine(format!("cannot run: {sql}")))
            } else {
                Ok(())
            }
        }
    }

    impl EngineConnection for FakeConnection {
        fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
            self.record(sql)?;
            Ok(vec![Row::new(vec![("sql".into(), SqlValue::from(sql))])])
        }

        fn exec(&mut self, sql: &str) -> Result<()> {
            self.record(sql)
        }

        fn last_insert_rowid(&self) -> i64 {
            0
        }
    }
}
