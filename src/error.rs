//! Error types for Hexad
//!
//! Provides a unified error type for fallible infrastructure, plus the
//! per-query `Access` result codes recorded on every executed query.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for Hexad operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Durability Log Errors
    // -------------------------------------------------------------------------
    #[error("log corruption detected: {0}")]
    LogCorruption(String),

    #[error("log write failed: {0}")]
    LogWrite(String),

    // -------------------------------------------------------------------------
    // Key Codec Errors
    // -------------------------------------------------------------------------
    #[error("malformed composite key: {0}")]
    MalformedKey(String),

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("database is closing: {0}")]
    DatabaseClosing(String),

    #[error("the core database cannot be removed")]
    CoreDatabaseProtected,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Execution Errors
    // -------------------------------------------------------------------------
    #[error("storage context is shut down")]
    ContextShutdown,
}

/// Terminal result code of one executed query.
///
/// Recorded on the query by `run()`; `process()` branches on it to pick the
/// client-visible message. Failures never cross the run/process boundary as
/// `Err` — they travel as one of these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Access {
    /// Query has not finished running yet
    Pending = 0x00,

    /// Success
    Ok = 0x01,

    /// Key or member absent
    NotFound = 0x02,

    /// Required argument missing or empty
    MissingArgs = 0x03,

    /// NX-variant conflict: the entry already exists
    EntryExists = 0x04,

    /// Stored value is not numeric where a number was required
    NotNumeric = 0x05,

    /// Scan aborted by disconnect, shutdown, or database close
    Interrupted = 0x06,

    /// Underlying atomic batch was rejected by the engine
    BatchWriteFailed = 0x07,

    /// Query submitted without a bound database
    Broken = 0x08,
}

impl Access {
    /// Stable machine-readable code for the wire layer
    pub fn code(self) -> &'static str {
        match self {
            Access::Pending => "PENDING",
            Access::Ok => "OK",
            Access::NotFound => "NOT_FOUND",
            Access::MissingArgs => "MISSING_ARGS",
            Access::EntryExists => "ENTRY_EXISTS",
            Access::NotNumeric => "NOT_NUMERIC",
            Access::Interrupted => "INTERRUPTED",
            Access::BatchWriteFailed => "BATCH_WRITE_FAILED",
            Access::Broken => "BROKEN",
        }
    }

    /// Human-readable companion string
    pub fn message(self) -> &'static str {
        match self {
            Access::Pending => "query still pending",
            Access::Ok => "ok",
            Access::NotFound => "no such key or member",
            Access::MissingArgs => "missing required arguments",
            Access::EntryExists => "entry already exists",
            Access::NotNumeric => "value is not numeric",
            Access::Interrupted => "operation interrupted",
            Access::BatchWriteFailed => "atomic batch write failed",
            Access::Broken => "query has no bound database",
        }
    }

    pub fn is_ok(self) -> bool {
        self == Access::Ok
    }
}
