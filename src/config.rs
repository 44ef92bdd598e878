//! Configuration for Hexad
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a Hexad instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all databases.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── core/            (reserved core database)
    ///     └── <name>/          (one directory per user database)
    pub data_dir: PathBuf,

    /// Sync strategy: how often to fsync the durability log
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Namespace Configuration
    // -------------------------------------------------------------------------
    /// Lowest namespace selectable by the command layer
    pub namespace_min: u32,

    /// Highest namespace selectable by the command layer
    pub namespace_max: u32,

    // -------------------------------------------------------------------------
    // Scan Configuration
    // -------------------------------------------------------------------------
    /// Rows per streamed chunk for keyspace scans (KEYS, FIND, HKEYS, ...)
    pub scan_chunk_size: usize,

    /// Elements per streamed chunk for collection slices (LGET, VGET)
    pub list_chunk_size: usize,

    // -------------------------------------------------------------------------
    // Scheduler Configuration
    // -------------------------------------------------------------------------
    /// When true, EXPIRE arguments are absolute epoch seconds by default;
    /// when false they are relative offsets from now
    pub ttl_absolute: bool,

    /// How often the worker flushes due expire/future timers
    pub timer_flush_interval: Duration,
}

/// Durability log sync strategy
#[derive(Debug, Clone, Copy)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted records (balanced durability/performance)
    EveryNRecords { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./hexad_data"),
            sync_strategy: SyncStrategy::EveryNRecords { count: 100 },
            namespace_min: 1,
            namespace_max: 100,
            scan_chunk_size: 100,
            list_chunk_size: 200,
            ttl_absolute: false,
            timer_flush_interval: Duration::from_millis(250),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check a namespace against the configured range
    pub fn namespace_in_range(&self, namespace: u32) -> bool {
        namespace >= self.namespace_min && namespace <= self.namespace_max
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all databases)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the durability log sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the selectable namespace range
    pub fn namespace_range(mut self, min: u32, max: u32) -> Self {
        self.config.namespace_min = min;
        self.config.namespace_max = max;
        self
    }

    /// Set the rows-per-chunk size for keyspace scans
    pub fn scan_chunk_size(mut self, size: usize) -> Self {
        self.config.scan_chunk_size = size.max(1);
        self
    }

    /// Set the elements-per-chunk size for collection slices
    pub fn list_chunk_size(mut self, size: usize) -> Self {
        self.config.list_chunk_size = size.max(1);
        self
    }

    /// Treat EXPIRE arguments as absolute epoch seconds
    pub fn ttl_absolute(mut self, absolute: bool) -> Self {
        self.config.ttl_absolute = absolute;
        self
    }

    /// Set the expire/future flush interval
    pub fn timer_flush_interval(mut self, interval: Duration) -> Self {
        self.config.timer_flush_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
