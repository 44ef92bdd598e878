//! Query model
//!
//! One command invocation = one `Query` value. Instead of a subclass per
//! command, a query carries a [`Verb`] tag and runs through a static dispatch
//! table (a `match`, so exhaustiveness is checked at compile time).
//!
//! ## Two-phase contract
//! - `run()` executes against storage (registry, key codec, scheduler) and
//!   sets a terminal [`Access`] code. It never touches client-facing
//!   formatting.
//! - `process()` runs afterwards, reads only the query's own fields, and
//!   produces the protocol-visible [`Reply`]. It is idempotent with respect
//!   to storage.
//!
//! Large scans never materialize fully: mid-scan the query spawns chunk
//! queries (`partial = true`, incrementing `subresult`) that are delivered
//! immediately, bounding peak memory. The terminal chunk has
//! `partial = false`.

mod generic;
mod geo;
mod keys_verbs;
mod lists;
mod maps;
mod multis;
pub(crate) mod scan;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::error::Access;
use crate::keys::Tag;
use crate::registry::{DbRef, Registry};
use crate::scheduler::Scheduler;

/// Which of the six logical collection types a query addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Key,
    Map,
    MultiMap,
    List,
    Vector,
    Geo,
}

impl Shape {
    pub fn tag(self) -> Tag {
        match self {
            Shape::Key => Tag::Key,
            Shape::Map => Tag::Map,
            Shape::MultiMap => Tag::MultiMap,
            Shape::List => Tag::List,
            Shape::Vector => Tag::Vector,
            Shape::Geo => Tag::Geo,
        }
    }
}

/// Command verb. One entry per line-protocol command, plus the two quiet
/// internal verbs the scheduler generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    // -- scalar ------------------------------------------------------------
    Set,
    SetNx,
    Get,
    Keys,
    Find,
    Search,
    Count,
    // -- generic shape-dispatched ------------------------------------------
    Delete,
    Exists,
    Rename,
    RenameNx,
    Move,
    Copy,
    Clone,
    Diff,
    Transfer,
    // -- timers ------------------------------------------------------------
    Expire,
    ExpireAt,
    Persist,
    Ttl,
    Future,
    // -- numeric -----------------------------------------------------------
    Incr,
    Decr,
    Add,
    Sub,
    Mult,
    Div,
    Sqrt,
    Avg,
    // -- map (single-field hash) -------------------------------------------
    HSet,
    HGet,
    HDel,
    HExists,
    HKeys,
    HSearch,
    HCount,
    // -- multimap ----------------------------------------------------------
    MAdd,
    MGet,
    MDel,
    MExists,
    MKeys,
    MSearch,
    MCount,
    // -- list / vector (shape field picks the tag) --------------------------
    LPush,
    LPopFront,
    LPopBack,
    LGet,
    LSet,
    LRem,
    LExists,
    LFind,
    LSort,
    LReverse,
    LResize,
    LRepeats,
    LStats,
    LLen,
    LKeys,
    // -- geo ----------------------------------------------------------------
    GeoAdd,
    GeoGet,
    GeoDel,
    GeoCalc,
    GeoFind,
    GeoKeys,
    // -- internal (quiet) ----------------------------------------------------
    ExpireFired,
    FuturePromote,
}

/// Operation flags carried by a query
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFlags {
    /// Produce no client reply (internally generated work)
    pub quiet: bool,
    /// Generated by the store itself, not a client
    pub internal: bool,
    /// Report only the number of matches, not the matches themselves
    pub count_only: bool,
    /// Scan every namespace instead of the bound one
    pub global: bool,
    /// For removal verbs: stop after the first match
    pub first_only: bool,
}

/// Where finished queries (and their partial chunks) are delivered.
///
/// Implemented by the connection layer; `connected()` doubles as the
/// per-row disconnect check during scans.
pub trait ReplySink: Send + Sync {
    fn deliver(&self, reply: Reply);

    fn connected(&self) -> bool {
        true
    }
}

/// Sink for quiet internal queries
pub struct NullSink;

impl ReplySink for NullSink {
    fn deliver(&self, _reply: Reply) {}
}

/// The protocol-visible result of one query (or one chunk of one)
#[derive(Debug, Clone)]
pub struct Reply {
    pub verb: Verb,
    pub access: Access,
    /// Stable machine-readable code
    pub code: &'static str,
    /// Human-readable companion
    pub message: String,
    /// True for every chunk but the last
    pub partial: bool,
    /// 0 for unchunked replies; 1..=n for chunked ones
    pub subresult: u32,
    pub scalar: Option<String>,
    pub items: Vec<String>,
    pub pairs: Vec<(String, String)>,
}

/// Everything `run()` needs besides the query itself
pub struct RunCtx<'a> {
    pub registry: &'a Registry,
    pub scheduler: &'a Scheduler,
    pub config: &'a Config,
    /// Storage subsystem paused (maintenance)
    pub paused: &'a AtomicBool,
    /// Storage subsystem shutting down
    pub shutdown: &'a AtomicBool,
}

impl RunCtx<'_> {
    /// True when scans must stop (pause or shutdown)
    pub fn stopping(&self) -> bool {
        self.paused.load(Ordering::Acquire) || self.shutdown.load(Ordering::Acquire)
    }
}

/// One command invocation in flight
pub struct Query {
    pub verb: Verb,
    pub shape: Shape,
    pub db: Option<DbRef>,
    /// Destination database for TRANSFER
    pub target_db: Option<DbRef>,
    pub namespace: u32,
    /// Destination namespace for MOVE / CLONE
    pub target_namespace: u32,
    pub key: String,
    /// New key name (RENAME/COPY), comparison key (DIFF/GCALC), or pattern
    pub new_key: String,
    pub value: String,
    /// Hash / multimap member
    pub field: String,
    /// Trigger argument for EXPIRE / EXPIREAT / FUTURE
    pub when: Option<u64>,
    pub offset: i64,
    pub limit: i64,
    pub flags: QueryFlags,

    // Filled in by run()
    pub access: Access,
    pub finished: bool,
    pub partial: bool,
    pub subresult: u32,
    pub response: Option<String>,
    pub items: Vec<String>,
    pub pairs: Vec<(String, String)>,

    pub sink: Arc<dyn ReplySink>,
}

impl Query {
    /// New query with empty arguments; callers fill what the verb needs
    pub fn new(verb: Verb, shape: Shape, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            verb,
            shape,
            db: None,
            target_db: None,
            namespace: 0,
            target_namespace: 0,
            key: String::new(),
            new_key: String::new(),
            value: String::new(),
            field: String::new(),
            when: None,
            offset: 0,
            limit: -1,
            flags: QueryFlags::default(),
            access: Access::Pending,
            finished: false,
            partial: false,
            subresult: 0,
            response: None,
            items: Vec::new(),
            pairs: Vec::new(),
            sink,
        }
    }

    /// The composite-key tag this query's shape maps to
    pub fn tag(&self) -> Tag {
        self.shape.tag()
    }

    /// Execute against storage. Terminal: sets `access` and `finished`.
    pub fn run(&mut self, ctx: &RunCtx<'_>) {
        if self.finished {
            return;
        }

        let Some(db) = self.db.clone() else {
            self.access = Access::Broken;
            self.finished = true;
            return;
        };
        if db.is_closing() {
            self.access = Access::Interrupted;
            self.finished = true;
            return;
        }

        let access = match self.verb {
            Verb::Set
            | Verb::SetNx
            | Verb::Get
            | Verb::Keys
            | Verb::Find
            | Verb::Search
            | Verb::Count
            | Verb::Expire
            | Verb::ExpireAt
            | Verb::Persist
            | Verb::Ttl
            | Verb::Future
            | Verb::Incr
            | Verb::Decr
            | Verb::Add
            | Verb::Sub
            | Verb::Mult
            | Verb::Div
            | Verb::Sqrt
            | Verb::Avg => keys_verbs::run(self, ctx, &db),

            Verb::Delete
            | Verb::Exists
            | Verb::Rename
            | Verb::RenameNx
            | Verb::Move
            | Verb::Copy
            | Verb::Clone
            | Verb::Diff
            | Verb::Transfer
            | Verb::ExpireFired
            | Verb::FuturePromote => generic::run(self, ctx, &db),

            Verb::HSet | Verb::HGet | Verb::HDel | Verb::HExists | Verb::HKeys
            | Verb::HSearch | Verb::HCount => maps::run(self, ctx, &db),

            Verb::MAdd | Verb::MGet | Verb::MDel | Verb::MExists | Verb::MKeys
            | Verb::MSearch | Verb::MCount => multis::run(self, ctx, &db),

            Verb::LPush | Verb::LPopFront | Verb::LPopBack | Verb::LGet | Verb::LSet
            | Verb::LRem | Verb::LExists | Verb::LFind | Verb::LSort | Verb::LReverse
            | Verb::LResize | Verb::LRepeats | Verb::LStats | Verb::LLen | Verb::LKeys => {
                lists::run(self, ctx, &db)
            }

            Verb::GeoAdd | Verb::GeoGet | Verb::GeoDel | Verb::GeoCalc | Verb::GeoFind
            | Verb::GeoKeys => geo::run(self, ctx, &db),
        };

        self.access = access;
        self.finished = true;

        if !access.is_ok() && !self.flags.quiet {
            tracing::trace!(verb = ?self.verb, access = ?access, key = %self.key, "query failed");
        }
    }

    /// Build the client-visible reply. `None` when the query is quiet
    /// (internally generated); quiet failures stay silent by design.
    pub fn process(&self) -> Option<Reply> {
        if self.flags.quiet {
            return None;
        }
        Some(Reply {
            verb: self.verb,
            access: self.access,
            code: self.access.code(),
            message: self.access.message().to_string(),
            partial: self.partial,
            subresult: self.subresult,
            scalar: self.response.clone(),
            items: self.items.clone(),
            pairs: self.pairs.clone(),
        })
    }

    /// Split the accumulated batch off into an independent chunk query and
    /// deliver it. Chunks share the originating sink and count up through
    /// `subresult`.
    pub(crate) fn emit_chunk(&mut self) {
        self.subresult += 1;
        let mut chunk = Query::new(self.verb, self.shape, Arc::clone(&self.sink));
        chunk.db = self.db.clone();
        chunk.namespace = self.namespace;
        chunk.key = self.key.clone();
        chunk.flags = self.flags;
        chunk.access = Access::Ok;
        chunk.finished = true;
        chunk.partial = true;
        chunk.subresult = self.subresult;
        chunk.items = std::mem::take(&mut self.items);
        chunk.pairs = std::mem::take(&mut self.pairs);
        if let Some(reply) = chunk.process() {
            chunk.sink.deliver(reply);
        }
    }

    /// Mark the final (terminal) chunk counters on a streamed query
    pub(crate) fn finish_stream(&mut self) {
        if self.subresult > 0 {
            self.subresult += 1;
        }
        self.partial = false;
    }
}
