//! Database registry
//!
//! Owns one engine instance per logical database: named, on-disk, lazily
//! opened. One reserved core database holds system metadata and is opened at
//! startup; it is never subject to `remove`.
//!
//! ## Responsibilities
//! - Idempotent open (creates on-disk files if absent)
//! - Close / remove (remove deletes the storage directory — irreversible)
//! - Flush-all (drops every key of one database)
//! - Expose a `closing` flag long-running scans can observe

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::config::Config;
use crate::core::CoreStore;
use crate::engine::Engine;
use crate::error::{Result, StoreError};

/// Name of the reserved core database
pub const CORE_DB: &str = "core";

/// A named, on-disk, single-engine-instance logical database
pub struct Database {
    name: String,
    path: PathBuf,
    created_at: u64,
    engine: Engine,

    /// Set when the database is being closed or removed; in-flight scans
    /// poll this and abort early
    closing: AtomicBool,
}

/// Shared handle to one logical database
pub type DbRef = Arc<Database>;

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Creation timestamp (unix seconds)
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_core(&self) -> bool {
        self.name == CORE_DB
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }
}

/// Opens and owns every logical database
pub struct Registry {
    root: PathBuf,
    config: Config,
    core: DbRef,
    open_dbs: RwLock<HashMap<String, DbRef>>,
}

impl Registry {
    /// Open the registry: creates the root directory and the core database
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let root = config.data_dir.clone();

        let core = Arc::new(Database {
            name: CORE_DB.to_string(),
            path: root.join(CORE_DB),
            created_at: now_secs(),
            engine: Engine::open(&root.join(CORE_DB), config.sync_strategy)?,
            closing: AtomicBool::new(false),
        });
        tracing::debug!(root = %root.display(), "registry opened");

        Ok(Self {
            root,
            config,
            core,
            open_dbs: RwLock::new(HashMap::new()),
        })
    }

    /// Handle to the reserved core database
    pub fn core(&self) -> DbRef {
        Arc::clone(&self.core)
    }

    /// Typed facade over the core database's system tables
    pub fn core_store(&self) -> CoreStore {
        CoreStore::new(self.core())
    }

    /// Open a database by name, creating its files if absent. Idempotent:
    /// an already-open database returns the existing handle.
    pub fn open_db(&self, name: &str) -> Result<DbRef> {
        if name == CORE_DB {
            return Ok(self.core());
        }
        validate_name(name)?;

        if let Some(db) = self.open_dbs.read().get(name) {
            return Ok(Arc::clone(db));
        }

        let mut dbs = self.open_dbs.write();
        // Re-check: another caller may have opened it while we waited
        if let Some(db) = dbs.get(name) {
            return Ok(Arc::clone(db));
        }

        let path = self.root.join(name);
        let engine = Engine::open(&path, self.config.sync_strategy)?;

        let core_store = CoreStore::new(self.core());
        let created_at = match core_store.database_created_at(name)? {
            Some(ts) => ts,
            None => {
                let ts = now_secs();
                core_store.record_database(name, ts)?;
                ts
            }
        };

        let db: DbRef = Arc::new(Database {
            name: name.to_string(),
            path,
            created_at,
            engine,
            closing: AtomicBool::new(false),
        });
        dbs.insert(name.to_string(), Arc::clone(&db));
        tracing::debug!(name, "database opened");
        Ok(db)
    }

    /// Handle to an already-open database, without opening it
    pub fn get(&self, name: &str) -> Option<DbRef> {
        if name == CORE_DB {
            return Some(self.core());
        }
        self.open_dbs.read().get(name).map(Arc::clone)
    }

    /// Close a database: flush, mark closing, drop the registry's handle.
    /// In-flight queries holding the handle finish against the closing flag.
    pub fn close_db(&self, name: &str) -> Result<()> {
        if name == CORE_DB {
            return Err(StoreError::CoreDatabaseProtected);
        }
        let db = self
            .open_dbs
            .write()
            .remove(name)
            .ok_or_else(|| StoreError::DatabaseNotFound(name.to_string()))?;
        db.mark_closing();
        db.engine.flush()?;
        tracing::debug!(name, "database closed");
        Ok(())
    }

    /// Remove a database entirely: close it, then delete its directory.
    /// Irreversible. The core database is protected.
    pub fn remove_db(&self, name: &str) -> Result<()> {
        if name == CORE_DB {
            return Err(StoreError::CoreDatabaseProtected);
        }
        validate_name(name)?;

        if let Some(db) = self.open_dbs.write().remove(name) {
            db.mark_closing();
        }
        let path = self.root.join(name);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        } else {
            return Err(StoreError::DatabaseNotFound(name.to_string()));
        }
        CoreStore::new(self.core()).forget_database(name)?;
        tracing::debug!(name, "database removed");
        Ok(())
    }

    /// Drop every key of one database
    pub fn flush_all(&self, db: &DbRef) -> Result<()> {
        db.engine.wipe()
    }

    /// Names of currently open user databases
    pub fn open_names(&self) -> Vec<String> {
        self.open_dbs.read().keys().cloned().collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flush every open database and the core database
    pub fn shutdown(&self) -> Result<()> {
        for db in self.open_dbs.read().values() {
            db.engine.flush()?;
        }
        self.core.engine.flush()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Database names become directory names, so keep them to a safe alphabet
fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::Config(format!("invalid database name {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::tempdir;

    fn registry(dir: &std::path::Path) -> Registry {
        let config = Config::builder().data_dir(dir).build();
        Registry::open(config).unwrap()
    }

    #[test]
    fn open_is_idempotent() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let a = registry.open_db("events").unwrap();
        let b = registry.open_db("events").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.created_at(), b.created_at());
    }

    #[test]
    fn remove_deletes_directory() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let db = registry.open_db("scratch").unwrap();
        let path = db.path().to_path_buf();
        assert!(path.exists());
        registry.remove_db("scratch").unwrap();
        assert!(!path.exists());
        assert!(db.is_closing());
    }

    #[test]
    fn core_is_protected() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.remove_db(CORE_DB),
            Err(StoreError::CoreDatabaseProtected)
        ));
        assert!(matches!(
            registry.close_db(CORE_DB),
            Err(StoreError::CoreDatabaseProtected)
        ));
    }

    #[test]
    fn bad_names_are_rejected() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(registry.open_db("../escape").is_err());
        assert!(registry.open_db("").is_err());
    }

    #[test]
    fn created_at_survives_reopen() {
        let dir = tempdir().unwrap();
        let first;
        {
            let registry = registry(dir.path());
            first = registry.open_db("events").unwrap().created_at();
        }
        let registry = registry(dir.path());
        let again = registry.open_db("events").unwrap().created_at();
        assert_eq!(first, again);
    }
}
