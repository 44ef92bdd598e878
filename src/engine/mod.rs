//! Ordered key-value engine
//!
//! The storage boundary every query runs against: Get / Put / Delete /
//! atomic WriteBatch / ordered iteration. Any LSM- or B-tree-backed engine
//! could sit behind this surface; the bundled implementation is deliberately
//! minimal — an ordered in-memory table made durable by an append-only log
//! that is replayed on open and rewritten compact on flush.
//!
//! ## Responsibilities
//! - Serialize writes (single-writer discipline at the storage layer)
//! - Log every mutation before applying it to the table
//! - Replay the log on open
//! - Bounded-batch ordered scans that never pin the read lock

mod log;
mod table;

pub use log::{replay, LogOp, LogRecord, LogWriter, ReplayStats, HEADER_SIZE};
pub use table::Table;

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::Result;

/// Rows copied out of the table per scan step
const SCAN_BATCH: usize = 128;

/// A set of mutations applied atomically
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<LogOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.ops.push(LogOp::Put { key, value });
        self
    }

    pub fn delete(&mut self, key: Vec<u8>) -> &mut Self {
        self.ops.push(LogOp::Delete { key });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// One engine instance: one directory, one log, one ordered table
pub struct Engine {
    /// Directory holding this instance's files
    path: PathBuf,

    /// Ordered table (internal RwLock)
    table: Table,

    /// Durability log (exclusive access needed)
    log: Mutex<LogWriter>,

    /// Serializes mutations: log append and table apply happen as one step
    write_lock: Mutex<()>,

    strategy: SyncStrategy,
}

impl Engine {
    const LOG_FILENAME: &'static str = "store.log";

    /// Open or create an engine instance in `path`.
    ///
    /// On startup:
    /// 1. Create the directory if absent
    /// 2. Replay the log into a fresh table
    /// 3. Ready to serve requests
    pub fn open(path: &Path, strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(path)?;
        let log_path = path.join(Self::LOG_FILENAME);

        let table = Table::new();
        let (ops, stats) = replay(&log_path)?;
        if stats.records_recovered > 0 || stats.records_dropped > 0 {
            tracing::debug!(
                path = %path.display(),
                recovered = stats.records_recovered,
                dropped = stats.records_dropped,
                last_lsn = stats.last_lsn,
                "log replay complete"
            );
        }
        for op in ops {
            apply(&table, op);
        }

        let log = LogWriter::open(&log_path, strategy, stats.last_lsn)?;

        Ok(Self {
            path: path.to_path_buf(),
            table,
            log: Mutex::new(log),
            write_lock: Mutex::new(()),
            strategy,
        })
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.table.get(key)
    }

    /// Whether a key exists
    pub fn contains(&self, key: &[u8]) -> bool {
        self.table.contains(key)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.log.lock().append(LogOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        self.table.put(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Delete a key; returns whether it existed
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.log.lock().append(LogOp::Delete { key: key.to_vec() })?;
        Ok(self.table.delete(key))
    }

    /// Apply a batch atomically: all records hit the log (and are synced)
    /// before any of them touches the table.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        {
            let mut log = self.log.lock();
            for op in &batch.ops {
                log.append(op.clone())?;
            }
            log.sync()?;
        }
        for op in batch.ops {
            apply(&self.table, op);
        }
        Ok(())
    }

    /// Ordered cursor over every key >= `start`
    pub fn scan_from(&self, start: &[u8]) -> ScanCursor<'_> {
        ScanCursor {
            engine: self,
            position: Position::Start(start.to_vec()),
            buffer: Vec::new(),
            pos: 0,
            done: false,
        }
    }

    /// Rewrite the log compact from the current table contents
    pub fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let snapshot = self.table.snapshot();
        let mut log = self.log.lock();
        log.truncate()?;
        for (key, value) in snapshot {
            log.append(LogOp::Put { key, value })?;
        }
        log.sync()
    }

    /// Drop every key (FLUSHALL at the engine level)
    pub fn wipe(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.table.clear();
        self.log.lock().truncate()
    }

    /// Flush and release the instance
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    /// Entry count
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Directory of this instance
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured sync strategy
    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }
}

fn apply(table: &Table, op: LogOp) {
    match op {
        LogOp::Put { key, value } => table.put(key, value),
        LogOp::Delete { key } => {
            table.delete(&key);
        }
    }
}

/// Where the next batch fetch resumes
enum Position {
    /// Inclusive: first fetch starts at this key
    Start(Vec<u8>),
    /// Exclusive: subsequent fetches resume after the last delivered key
    After(Vec<u8>),
}

/// Bounded-batch ordered iterator over engine entries.
///
/// Each step pulls at most `SCAN_BATCH` rows under the read lock; the caller
/// polls abort flags between rows.
pub struct ScanCursor<'a> {
    engine: &'a Engine,
    position: Position,
    buffer: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
    done: bool,
}

impl Iterator for ScanCursor<'_> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        use std::ops::Bound;

        if self.pos >= self.buffer.len() {
            if self.done {
                return None;
            }
            let lower = match &self.position {
                Position::Start(key) => Bound::Included(key.as_slice()),
                Position::After(key) => Bound::Excluded(key.as_slice()),
            };
            self.buffer = self.engine.table.fetch_range(lower, SCAN_BATCH);
            self.pos = 0;
            if self.buffer.len() < SCAN_BATCH {
                self.done = true;
            }
            if let Some((key, _)) = self.buffer.last() {
                self.position = Position::After(key.clone());
            }
            if self.buffer.is_empty() {
                return None;
            }
        }
        let item = self.buffer[self.pos].clone();
        self.pos += 1;
        Some(item)
    }
}
