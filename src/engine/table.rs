//! Ordered in-memory table
//!
//! BTreeMap-based table with a RwLock for concurrency.
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for prefix scans over the composite keyspace)
//! - Many concurrent readers, one writer
//! - Simple and correct first, optimize later

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// The authoritative ordered key-value table of one engine instance.
///
/// Durability comes from the log, not from this structure; on open the log is
/// replayed into a fresh table.
pub struct Table {
    /// Key space, protected by RwLock (many readers, exclusive writer)
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,

    /// Approximate resident bytes (keys + values), lock-free
    approx_bytes: AtomicUsize,
}

impl Table {
    /// Create a new empty table
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            approx_bytes: AtomicUsize::new(0),
        }
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Whether a key is present (read lock)
    pub fn contains(&self, key: &[u8]) -> bool {
        self.data.read().contains_key(key)
    }

    /// Put a key-value pair (write lock)
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        let key_len = key.len();
        let value_len = value.len();
        let mut data = self.data.write();
        match data.insert(key, value) {
            Some(old) => {
                // Key already counted; swap the value contribution
                self.approx_bytes.fetch_sub(old.len(), Ordering::Relaxed);
                self.approx_bytes.fetch_add(value_len, Ordering::Relaxed);
            }
            None => {
                self.approx_bytes
                    .fetch_add(key_len + value_len, Ordering::Relaxed);
            }
        }
    }

    /// Delete a key (write lock); returns whether it existed
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut data = self.data.write();
        match data.remove(key) {
            Some(old) => {
                self.approx_bytes
                    .fetch_sub(key.len() + old.len(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Fetch up to `max` entries starting at `lower`.
    ///
    /// Scans copy out bounded batches instead of holding the read lock for
    /// the whole iteration, so a huge scan never starves writers.
    pub fn fetch_range(&self, lower: Bound<&[u8]>, max: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
        let data = self.data.read();
        data.range::<[u8], _>((lower, Bound::Unbounded))
            .take(max)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Convenience wrapper: entries strictly after `after`, or from the first
    /// key when `after` is `None`
    pub fn fetch_after(&self, after: Option<&[u8]>, max: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
        match after {
            Some(key) => self.fetch_range(Bound::Excluded(key), max),
            None => self.fetch_range(Bound::Unbounded, max),
        }
    }

    /// Snapshot every entry in key order (used by the compacting flush)
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.data.write().clear();
        self.approx_bytes.store(0, Ordering::Relaxed);
    }

    /// Entry count
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Approximate resident size in bytes
    pub fn approx_bytes(&self) -> usize {
        self.approx_bytes.load(Ordering::Relaxed)
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let table = Table::new();
        table.put(b"a".to_vec(), b"1".to_vec());
        assert_eq!(table.get(b"a"), Some(b"1".to_vec()));
        assert!(table.delete(b"a"));
        assert_eq!(table.get(b"a"), None);
        assert!(!table.delete(b"a"));
    }

    #[test]
    fn fetch_after_is_ordered_and_bounded() {
        let table = Table::new();
        for i in 0..10u8 {
            table.put(vec![i], vec![i]);
        }
        let first = table.fetch_after(None, 4);
        assert_eq!(first.len(), 4);
        assert_eq!(first[0].0, vec![0]);

        let rest = table.fetch_after(Some(&first[3].0), 100);
        assert_eq!(rest.len(), 6);
        assert_eq!(rest[0].0, vec![4]);
    }
}
