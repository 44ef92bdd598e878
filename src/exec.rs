//! Storage execution context
//!
//! One worker thread owns query execution: callers hand finished-built
//! queries over a channel and receive replies through the query's sink. The
//! single consumer gives every mutating verb a serial, linearizable view of
//! storage without per-verb locking.
//!
//! The worker doubles as the timer pump: when the channel is idle for one
//! flush interval it pops every due expire/future timer and executes the
//! matching quiet internal query.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::query::{Query, Reply, ReplySink, RunCtx, Verb};
use crate::registry::{DbRef, Registry};
use crate::scheduler::{now_secs, Scheduler, TimerKind};

enum Task {
    Run(Box<Query>),
    Stop,
}

struct Shared {
    registry: Registry,
    scheduler: Scheduler,
    config: Config,
    paused: AtomicBool,
    shutdown: AtomicBool,
}

/// Handle to a running storage instance
pub struct StorageContext {
    shared: Arc<Shared>,
    tx: Sender<Task>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StorageContext {
    /// Open the registry and start the worker thread
    pub fn open(config: Config) -> Result<Self> {
        let registry = Registry::open(config.clone())?;
        let scheduler = Scheduler::new();
        scheduler.rebuild(&registry.core())?;

        let shared = Arc::new(Shared {
            registry,
            scheduler,
            config,
            paused: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        let (tx, rx) = channel::unbounded();

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("hexad-worker".into())
            .spawn(move || worker_loop(worker_shared, rx))?;

        Ok(Self {
            shared,
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Open (or create) a database and rebuild its timers on first open
    pub fn database(&self, name: &str) -> Result<DbRef> {
        let first_open = self.shared.registry.get(name).is_none();
        let db = self.shared.registry.open_db(name)?;
        if first_open {
            self.shared.scheduler.rebuild(&db)?;
        }
        Ok(db)
    }

    /// Queue a query for execution; its reply arrives through its sink
    pub fn submit(&self, query: Query) -> Result<()> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(StoreError::ContextShutdown);
        }
        self.tx
            .send(Task::Run(Box::new(query)))
            .map_err(|_| StoreError::ContextShutdown)
    }

    /// Run every currently-due timer on the calling thread.
    ///
    /// The worker does this on its own cadence; tests and administrative
    /// tooling call it for a deterministic flush.
    pub fn flush_timers(&self) {
        flush_due(&self.shared);
    }

    /// Suspend execution: queued queries wait, running scans abort
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
        tracing::info!("storage paused");
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        tracing::info!("storage resumed");
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Stop the worker and flush every open database. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.tx.send(Task::Stop);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked during shutdown");
            }
        }
        self.shared.registry.shutdown()
    }
}

impl Drop for StorageContext {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(error = %err, "shutdown failed");
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

fn worker_loop(shared: Arc<Shared>, rx: Receiver<Task>) {
    tracing::debug!("worker started");
    let mut last_flush = std::time::Instant::now();
    loop {
        match rx.recv_timeout(shared.config.timer_flush_interval) {
            Ok(Task::Run(mut query)) => {
                let ctx = run_ctx(&shared);
                query.run(&ctx);
                if let Some(reply) = query.process() {
                    query.sink.deliver(reply);
                }
                // Sustained traffic must not starve due timers: the idle
                // timeout alone never elapses while the queue stays hot
                if last_flush.elapsed() >= shared.config.timer_flush_interval {
                    flush_due(&shared);
                    last_flush = std::time::Instant::now();
                }
            }
            Ok(Task::Stop) => break,
            Err(RecvTimeoutError::Timeout) => {
                flush_due(&shared);
                last_flush = std::time::Instant::now();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("worker stopped");
}

fn run_ctx(shared: &Shared) -> RunCtx<'_> {
    RunCtx {
        registry: &shared.registry,
        scheduler: &shared.scheduler,
        config: &shared.config,
        paused: &shared.paused,
        shutdown: &shared.shutdown,
    }
}

/// Pop due timers and execute the matching quiet internal queries
fn flush_due(shared: &Shared) {
    for due in shared.scheduler.flush(now_secs()) {
        // Databases are referenced by name so a removed one just skips
        let Some(db) = shared.registry.get(&due.database) else {
            tracing::debug!(db = %due.database, key = %due.key, "timer for unopened database dropped");
            continue;
        };
        let verb = match due.kind {
            TimerKind::Expire => Verb::ExpireFired,
            TimerKind::Future => Verb::FuturePromote,
        };
        let mut query = Query::new(verb, crate::query::Shape::Key, Arc::new(crate::query::NullSink));
        query.flags.quiet = true;
        query.flags.internal = true;
        query.db = Some(db);
        query.namespace = due.namespace;
        query.key = due.key;
        let ctx = run_ctx(shared);
        query.run(&ctx);
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Sink that forwards replies over a channel; the receiving side blocks
/// until the terminal (non-partial) reply arrives
pub struct ChannelSink {
    tx: Sender<Reply>,
}

impl ChannelSink {
    pub fn pair() -> (Arc<Self>, Receiver<Reply>) {
        let (tx, rx) = channel::unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl ReplySink for ChannelSink {
    fn deliver(&self, reply: Reply) {
        // A dropped receiver just discards the reply
        let _ = self.tx.send(reply);
    }
}
