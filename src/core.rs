//! Core database tables
//!
//! The reserved core database multiplexes its system tables onto fixed
//! namespaces of the shared keyspace:
//!
//! | table      | namespace | rows                                        |
//! |------------|-----------|---------------------------------------------|
//! | settings   | 1         | scalar per setting                          |
//! | users      | 2         | scalar per user                             |
//! | admins     | 3         | scalar per admin flag                       |
//! | database   | 4         | scalar per registered database (created_at) |
//! | autojoin   | 5         | one member row per list element             |
//! | counters   | 6         | scalar per per-list monotonic counter       |
//!
//! Autojoin elements are keyed by a zero-padded sequence number taken from
//! the counter table, so a plain range iteration yields insertion order.

use crate::error::Result;
use crate::keys::{self, Tag};
use crate::registry::DbRef;

/// Core-table namespaces (outside the user-selectable range)
pub mod ns {
    pub const SETTINGS: u32 = 1;
    pub const USERS: u32 = 2;
    pub const ADMINS: u32 = 3;
    pub const DATABASE: u32 = 4;
    pub const AUTOJOIN: u32 = 5;
    pub const COUNTERS: u32 = 6;
}

/// Width of the zero-padded sequence suffix
const SEQ_WIDTH: usize = 12;

/// Typed facade over the core database's system tables
pub struct CoreStore {
    db: DbRef,
}

impl CoreStore {
    pub fn new(db: DbRef) -> Self {
        Self { db }
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    pub fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        let key = keys::encode(Tag::Key, ns::SETTINGS, name, None);
        self.db.engine().put(&key, value.as_bytes())
    }

    pub fn get_setting(&self, name: &str) -> Option<String> {
        let key = keys::encode(Tag::Key, ns::SETTINGS, name, None);
        self.db
            .engine()
            .get(&key)
            .map(|v| String::from_utf8_lossy(&v).into_owned())
    }

    pub fn delete_setting(&self, name: &str) -> Result<bool> {
        let key = keys::encode(Tag::Key, ns::SETTINGS, name, None);
        self.db.engine().delete(&key)
    }

    // -------------------------------------------------------------------------
    // Users / admins
    // -------------------------------------------------------------------------

    pub fn add_user(&self, name: &str, secret: &str) -> Result<()> {
        let key = keys::encode(Tag::Key, ns::USERS, name, None);
        self.db.engine().put(&key, secret.as_bytes())
    }

    pub fn get_user(&self, name: &str) -> Option<String> {
        let key = keys::encode(Tag::Key, ns::USERS, name, None);
        self.db
            .engine()
            .get(&key)
            .map(|v| String::from_utf8_lossy(&v).into_owned())
    }

    pub fn remove_user(&self, name: &str) -> Result<bool> {
        let key = keys::encode(Tag::Key, ns::USERS, name, None);
        self.db.engine().delete(&key)
    }

    pub fn set_admin(&self, name: &str) -> Result<()> {
        let key = keys::encode(Tag::Key, ns::ADMINS, name, None);
        self.db.engine().put(&key, b"1")
    }

    pub fn is_admin(&self, name: &str) -> bool {
        let key = keys::encode(Tag::Key, ns::ADMINS, name, None);
        self.db.engine().contains(&key)
    }

    pub fn remove_admin(&self, name: &str) -> Result<bool> {
        let key = keys::encode(Tag::Key, ns::ADMINS, name, None);
        self.db.engine().delete(&key)
    }

    // -------------------------------------------------------------------------
    // Database registry metadata
    // -------------------------------------------------------------------------

    pub fn record_database(&self, name: &str, created_at: u64) -> Result<()> {
        let key = keys::encode(Tag::Key, ns::DATABASE, name, None);
        self.db
            .engine()
            .put(&key, created_at.to_string().as_bytes())
    }

    pub fn database_created_at(&self, name: &str) -> Result<Option<u64>> {
        let key = keys::encode(Tag::Key, ns::DATABASE, name, None);
        Ok(self
            .db
            .engine()
            .get(&key)
            .and_then(|v| String::from_utf8_lossy(&v).parse().ok()))
    }

    pub fn forget_database(&self, name: &str) -> Result<bool> {
        let key = keys::encode(Tag::Key, ns::DATABASE, name, None);
        self.db.engine().delete(&key)
    }

    /// Every registered database name, in key order
    pub fn databases(&self) -> Vec<String> {
        let prefix = keys::tag_prefix(Tag::Key, ns::DATABASE);
        let mut names = Vec::new();
        for (raw, _) in self.db.engine().scan_from(&prefix) {
            if !raw.starts_with(&prefix) {
                break;
            }
            if let Ok(parsed) = keys::decode(&raw) {
                names.push(parsed.key);
            }
        }
        names
    }

    // -------------------------------------------------------------------------
    // Autojoin lists
    // -------------------------------------------------------------------------

    /// Append an element to an autojoin list, preserving insertion order
    pub fn autojoin_add(&self, list: &str, entry: &str) -> Result<()> {
        let seq = self.next_sequence(list)?;
        let field = format!("{seq:0width$}", width = SEQ_WIDTH);
        let key = keys::encode(Tag::MultiMap, ns::AUTOJOIN, list, Some(&field));
        self.db.engine().put(&key, entry.as_bytes())
    }

    /// Remove every occurrence of `entry` from a list
    pub fn autojoin_remove(&self, list: &str, entry: &str) -> Result<usize> {
        let prefix = keys::field_prefix(Tag::MultiMap, ns::AUTOJOIN, list);
        let mut doomed = Vec::new();
        for (raw, value) in self.db.engine().scan_from(&prefix) {
            if !raw.starts_with(&prefix) {
                break;
            }
            if value == entry.as_bytes() {
                doomed.push(raw);
            }
        }
        let removed = doomed.len();
        for key in doomed {
            self.db.engine().delete(&key)?;
        }
        Ok(removed)
    }

    /// Elements of a list in insertion order
    pub fn autojoin_list(&self, list: &str) -> Vec<String> {
        let prefix = keys::field_prefix(Tag::MultiMap, ns::AUTOJOIN, list);
        let mut entries = Vec::new();
        for (raw, value) in self.db.engine().scan_from(&prefix) {
            if !raw.starts_with(&prefix) {
                break;
            }
            entries.push(String::from_utf8_lossy(&value).into_owned());
        }
        entries
    }

    /// Bump and return the per-list monotonic counter
    pub fn next_sequence(&self, list: &str) -> Result<u64> {
        let key = keys::encode(Tag::Key, ns::COUNTERS, list, None);
        let next = self
            .db
            .engine()
            .get(&key)
            .and_then(|v| String::from_utf8_lossy(&v).parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        self.db.engine().put(&key, next.to_string().as_bytes())?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::Registry;
    use tempfile::tempdir;

    fn store(dir: &std::path::Path) -> CoreStore {
        let registry = Registry::open(Config::builder().data_dir(dir).build()).unwrap();
        registry.core_store()
    }

    #[test]
    fn settings_roundtrip() {
        let dir = tempdir().unwrap();
        let core = store(dir.path());
        core.set_setting("motd", "hello").unwrap();
        assert_eq!(core.get_setting("motd").as_deref(), Some("hello"));
        assert!(core.delete_setting("motd").unwrap());
        assert_eq!(core.get_setting("motd"), None);
    }

    #[test]
    fn users_and_admins() {
        let dir = tempdir().unwrap();
        let core = store(dir.path());
        core.add_user("ada", "s3cret").unwrap();
        assert_eq!(core.get_user("ada").as_deref(), Some("s3cret"));
        assert!(!core.is_admin("ada"));
        core.set_admin("ada").unwrap();
        assert!(core.is_admin("ada"));
    }

    #[test]
    fn autojoin_preserves_insertion_order() {
        let dir = tempdir().unwrap();
        let core = store(dir.path());
        for entry in ["first", "second", "third"] {
            core.autojoin_add("lobby", entry).unwrap();
        }
        assert_eq!(core.autojoin_list("lobby"), vec!["first", "second", "third"]);

        assert_eq!(core.autojoin_remove("lobby", "second").unwrap(), 1);
        assert_eq!(core.autojoin_list("lobby"), vec!["first", "third"]);
    }

    #[test]
    fn sequences_are_monotonic_per_list() {
        let dir = tempdir().unwrap();
        let core = store(dir.path());
        assert_eq!(core.next_sequence("a").unwrap(), 1);
        assert_eq!(core.next_sequence("a").unwrap(), 2);
        assert_eq!(core.next_sequence("b").unwrap(), 1);
    }
}
