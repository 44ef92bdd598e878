//! Expire / Future scheduler
//!
//! An in-memory index from trigger time to {database, namespace, key},
//! mirrored durably as reserved `e:`/`f:` key ranges so a restart can rebuild
//! the index with one prefix scan per database.
//!
//! Entry lifecycle: `Scheduled -> {Fired, Cancelled}`.
//! - `add` schedules (and re-schedules, replacing any previous timer on the
//!   same key)
//! - `cancel` removes a Scheduled entry — called whenever the owning key is
//!   deleted, renamed, or moved
//! - `flush(now)` walks the ordered index up to `now` and hands back the due
//!   timers; the execution context turns each into a quiet internal query
//!   (Expire ⇒ delete the key, Future ⇒ promote the staged value)
//!
//! The index lives behind a single coarse mutex: every mutation is an O(1)
//! or O(log n) map operation, never a scan.

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::Result;
use crate::keys::{self, escape, split_escaped, unescape, Tag};
use crate::registry::DbRef;

/// What happens when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Delete the owning key
    Expire,
    /// Promote a staged value into the live key
    Future,
}

impl TimerKind {
    pub fn tag(self) -> Tag {
        match self {
            TimerKind::Expire => Tag::Expire,
            TimerKind::Future => Tag::Future,
        }
    }
}

/// One scheduled timer
#[derive(Debug, Clone)]
pub struct TimerEntry {
    pub kind: TimerKind,
    /// Absolute trigger time (unix seconds)
    pub trigger_at: u64,
    /// When the timer was created (unix seconds)
    pub added_at: u64,
    /// Whether the caller passed an absolute epoch (vs relative seconds)
    pub absolute: bool,
    /// Owning database, by name: handles are resolved through the registry
    /// at fire time so a removed database can never dangle
    pub database: String,
    pub namespace: u32,
    pub key: String,
}

/// A timer returned by `flush` for the execution context to act on
#[derive(Debug, Clone)]
pub struct DueTimer {
    pub kind: TimerKind,
    pub database: String,
    pub namespace: u32,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TimerKey {
    database: String,
    namespace: u32,
    key: String,
    kind: TimerKind,
}

#[derive(Default)]
struct Index {
    /// Ordered by (trigger time, insertion sequence)
    by_time: BTreeMap<(u64, u64), TimerEntry>,
    /// Reverse lookup for cancel / trigger_time
    by_key: HashMap<TimerKey, (u64, u64)>,
    seq: u64,
}

/// The global expire/future scheduler
pub struct Scheduler {
    index: Mutex<Index>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            index: Mutex::new(Index::default()),
        }
    }

    /// Schedule a timer on `key`. `when` is absolute epoch seconds when
    /// `absolute`, otherwise seconds from now. `staged` carries the value a
    /// Future timer will promote; Expire timers pass `None`.
    ///
    /// The durable mirror row is written before the index is touched.
    pub fn add(
        &self,
        db: &DbRef,
        when: u64,
        key: &str,
        namespace: u32,
        absolute: bool,
        kind: TimerKind,
        staged: Option<&str>,
    ) -> Result<u64> {
        let now = now_secs();
        let trigger_at = if absolute { when } else { now + when };

        let row = keys::encode(kind.tag(), namespace, key, None);
        let value = match (kind, staged) {
            (TimerKind::Future, Some(staged)) => {
                format!("{trigger_at}:{}", escape(staged))
            }
            _ => trigger_at.to_string(),
        };
        db.engine().put(&row, value.as_bytes())?;

        let mut index = self.index.lock();
        let timer_key = TimerKey {
            database: db.name().to_string(),
            namespace,
            key: key.to_string(),
            kind,
        };
        // Re-scheduling replaces the previous timer on the same key
        if let Some(slot) = index.by_key.remove(&timer_key) {
            index.by_time.remove(&slot);
        }
        index.seq += 1;
        let slot = (trigger_at, index.seq);
        index.by_time.insert(
            slot,
            TimerEntry {
                kind,
                trigger_at,
                added_at: now,
                absolute,
                database: timer_key.database.clone(),
                namespace,
                key: key.to_string(),
            },
        );
        index.by_key.insert(timer_key, slot);
        Ok(trigger_at)
    }

    /// Cancel any Scheduled timer (either kind) on `key`; mirrors the removal
    /// by deleting the durable rows. Idempotent.
    pub fn cancel(&self, db: &DbRef, key: &str, namespace: u32) -> Result<()> {
        let mut index = self.index.lock();
        for kind in [TimerKind::Expire, TimerKind::Future] {
            let timer_key = TimerKey {
                database: db.name().to_string(),
                namespace,
                key: key.to_string(),
                kind,
            };
            if let Some(slot) = index.by_key.remove(&timer_key) {
                index.by_time.remove(&slot);
            }
            let row = keys::encode(kind.tag(), namespace, key, None);
            db.engine().delete(&row)?;
        }
        Ok(())
    }

    /// Absolute trigger time of a Scheduled timer on `key`, or `None` when
    /// the key is not expiring
    pub fn trigger_time(&self, database: &str, key: &str, namespace: u32) -> Option<u64> {
        let index = self.index.lock();
        for kind in [TimerKind::Expire, TimerKind::Future] {
            let timer_key = TimerKey {
                database: database.to_string(),
                namespace,
                key: key.to_string(),
                kind,
            };
            if let Some(slot) = index.by_key.get(&timer_key) {
                return Some(slot.0);
            }
        }
        None
    }

    /// Pop every timer due at or before `now` (Fired)
    pub fn flush(&self, now: u64) -> Vec<DueTimer> {
        let mut index = self.index.lock();
        let mut due = Vec::new();
        while let Some((&slot, entry)) = index.by_time.iter().next() {
            if slot.0 > now {
                break;
            }
            due.push(DueTimer {
                kind: entry.kind,
                database: entry.database.clone(),
                namespace: entry.namespace,
                key: entry.key.clone(),
            });
            let timer_key = TimerKey {
                database: entry.database.clone(),
                namespace: entry.namespace,
                key: entry.key.clone(),
                kind: entry.kind,
            };
            index.by_time.remove(&slot);
            index.by_key.remove(&timer_key);
        }
        if !due.is_empty() {
            tracing::trace!(count = due.len(), "timers due");
        }
        due
    }

    /// Rebuild this database's timers from its durable mirror rows.
    /// Called once when a database is opened; returns how many were loaded.
    pub fn rebuild(&self, db: &DbRef) -> Result<usize> {
        let mut loaded = 0;
        for kind in [TimerKind::Expire, TimerKind::Future] {
            let prefix = keys::bare_tag_prefix(kind.tag());
            let rows: Vec<(Vec<u8>, Vec<u8>)> = db
                .engine()
                .scan_from(&prefix)
                .take_while(|(raw, _)| raw.starts_with(&prefix))
                .collect();
            for (raw, value) in rows {
                let parsed = match keys::decode(&raw) {
                    Ok(p) if p.tag == kind.tag() => p,
                    _ => continue,
                };
                let text = String::from_utf8_lossy(&value);
                let trigger: u64 = match split_escaped(&text, 2)[0].parse() {
                    Ok(t) => t,
                    Err(_) => continue,
                };
                let mut index = self.index.lock();
                let timer_key = TimerKey {
                    database: db.name().to_string(),
                    namespace: parsed.namespace,
                    key: parsed.key.clone(),
                    kind,
                };
                if let Some(slot) = index.by_key.remove(&timer_key) {
                    index.by_time.remove(&slot);
                }
                index.seq += 1;
                let slot = (trigger, index.seq);
                index.by_time.insert(
                    slot,
                    TimerEntry {
                        kind,
                        trigger_at: trigger,
                        added_at: trigger,
                        absolute: true,
                        database: timer_key.database.clone(),
                        namespace: parsed.namespace,
                        key: parsed.key.clone(),
                    },
                );
                index.by_key.insert(timer_key, slot);
                loaded += 1;
            }
        }
        if loaded > 0 {
            tracing::debug!(db = db.name(), loaded, "timers rebuilt from mirror rows");
        }
        Ok(loaded)
    }

    /// Drop every in-memory timer of a removed database
    pub fn purge_database(&self, database: &str) {
        let mut index = self.index.lock();
        let doomed: Vec<(u64, u64)> = index
            .by_time
            .iter()
            .filter(|(_, e)| e.database == database)
            .map(|(slot, _)| *slot)
            .collect();
        for slot in doomed {
            if let Some(entry) = index.by_time.remove(&slot) {
                index.by_key.remove(&TimerKey {
                    database: entry.database,
                    namespace: entry.namespace,
                    key: entry.key,
                    kind: entry.kind,
                });
            }
        }
    }

    /// Read the staged value of a Future mirror row
    pub fn staged_value(db: &DbRef, key: &str, namespace: u32) -> Option<String> {
        let row = keys::encode(Tag::Future, namespace, key, None);
        let value = db.engine().get(&row)?;
        let text = String::from_utf8_lossy(&value).into_owned();
        let parts = split_escaped(&text, 2);
        parts.get(1).map(|staged| unescape(staged))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::Registry;
    use tempfile::tempdir;

    fn setup(dir: &std::path::Path) -> (Registry, Scheduler) {
        let registry = Registry::open(Config::builder().data_dir(dir).build()).unwrap();
        (registry, Scheduler::new())
    }

    #[test]
    fn add_then_cancel_clears_trigger() {
        let dir = tempdir().unwrap();
        let (registry, scheduler) = setup(dir.path());
        let db = registry.open_db("events").unwrap();

        scheduler
            .add(&db, 5, "k", 1, false, TimerKind::Expire, None)
            .unwrap();
        assert!(scheduler.trigger_time("events", "k", 1).is_some());

        scheduler.cancel(&db, "k", 1).unwrap();
        assert_eq!(scheduler.trigger_time("events", "k", 1), None);
        // Mirror row gone too
        let row = keys::encode(Tag::Expire, 1, "k", None);
        assert_eq!(db.engine().get(&row), None);
    }

    #[test]
    fn flush_pops_only_due_timers() {
        let dir = tempdir().unwrap();
        let (registry, scheduler) = setup(dir.path());
        let db = registry.open_db("events").unwrap();

        scheduler
            .add(&db, 100, "soon", 1, true, TimerKind::Expire, None)
            .unwrap();
        scheduler
            .add(&db, 200, "later", 1, true, TimerKind::Expire, None)
            .unwrap();

        let due = scheduler.flush(150);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key, "soon");
        assert_eq!(scheduler.trigger_time("events", "soon", 1), None);
        assert!(scheduler.trigger_time("events", "later", 1).is_some());

        // Firing is exactly-once
        assert!(scheduler.flush(150).is_empty());
    }

    #[test]
    fn reschedule_replaces_previous_timer() {
        let dir = tempdir().unwrap();
        let (registry, scheduler) = setup(dir.path());
        let db = registry.open_db("events").unwrap();

        scheduler
            .add(&db, 100, "k", 1, true, TimerKind::Expire, None)
            .unwrap();
        scheduler
            .add(&db, 500, "k", 1, true, TimerKind::Expire, None)
            .unwrap();

        assert!(scheduler.flush(200).is_empty());
        assert_eq!(scheduler.flush(600).len(), 1);
    }

    #[test]
    fn rebuild_restores_timers_from_rows() {
        let dir = tempdir().unwrap();
        let (registry, scheduler) = setup(dir.path());
        let db = registry.open_db("events").unwrap();
        scheduler
            .add(&db, 1234, "k", 3, true, TimerKind::Expire, None)
            .unwrap();
        scheduler
            .add(&db, 99, "staged", 4, true, TimerKind::Future, Some("v:alue"))
            .unwrap();

        let fresh = Scheduler::new();
        assert_eq!(fresh.rebuild(&db).unwrap(), 2);
        assert_eq!(fresh.trigger_time("events", "k", 3), Some(1234));
        assert_eq!(fresh.trigger_time("events", "staged", 4), Some(99));
        assert_eq!(
            Scheduler::staged_value(&db, "staged", 4).as_deref(),
            Some("v:alue")
        );
    }

    #[test]
    fn purge_drops_database_timers() {
        let dir = tempdir().unwrap();
        let (registry, scheduler) = setup(dir.path());
        let db = registry.open_db("events").unwrap();
        scheduler
            .add(&db, 10, "k", 1, true, TimerKind::Expire, None)
            .unwrap();
        scheduler.purge_database("events");
        assert_eq!(scheduler.trigger_time("events", "k", 1), None);
    }
}
