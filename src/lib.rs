//! # Hexad
//!
//! An embedded multi-model data store: scalars, maps, multimaps, lists,
//! vectors, and geo points multiplexed onto one ordered key-value engine
//! through a composite-key codec, with:
//! - Append-only durability log with crash recovery
//! - Expire and future (deferred write) timers
//! - A two-phase query model with chunked streaming scans
//! - Named databases behind one registry, plus a reserved core database
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Typed Facade                             │
//! │              (Session / SeqOps helpers)                      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Storage Context                             │
//! │          (Single Worker / Channel Submission)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼────────────┐
//!          │            │            │
//!          ▼            ▼            ▼
//!   ┌─────────────┐ ┌─────────┐ ┌───────────┐
//!   │    Query    │ │Scheduler│ │ Registry  │
//!   │ (run/proc)  │ │ (e:/f:) │ │ (core+dbs)│
//!   └──────┬──────┘ └────┬────┘ └─────┬─────┘
//!          │             │            │
//!          └─────────────┼────────────┘
//!                        ▼
//!                 ┌─────────────┐
//!                 │   Engine    │
//!                 │ (log+table) │
//!                 └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod engine;
pub mod keys;
pub mod pattern;
pub mod collections;
pub mod registry;
pub mod core;
pub mod scheduler;
pub mod query;
pub mod exec;
pub mod helpers;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Access, Result, StoreError};
pub use config::{Config, SyncStrategy};
pub use exec::StorageContext;
pub use helpers::{Outcome, Session};
pub use query::{Query, Reply, ReplySink, Shape, Verb};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Hexad
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
