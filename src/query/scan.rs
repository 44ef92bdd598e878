//! Chunked scan protocol
//!
//! All unbounded reads (KEYS, FIND, SEARCH, HKEYS, GFIND, ...) run through
//! here: walk the engine's ordered keyspace from a computed prefix,
//! re-validate every decoded row against the expected tag and namespace,
//! apply an optional glob filter and an offset/limit window, and accumulate
//! matches into a bounded batch. A full batch is split off as an independent
//! partial chunk and delivered immediately, so peak memory stays bounded no
//! matter how large the keyspace is.
//!
//! Every row polls three abort conditions: client disconnected, storage
//! subsystem paused/shutting down, target database closing.

use crate::error::Access;
use crate::keys::{self, Tag};
use crate::pattern::glob_match;
use crate::registry::DbRef;

use super::{Query, RunCtx};

/// What a matching row contributes to the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// The logical key name
    Keys,
    /// (key, value) pairs
    Pairs,
    /// (field, value) pairs
    FieldPairs,
}

/// Which part of the row the glob pattern applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOn {
    Key,
    Field,
    Value,
}

/// One prefix scan request
pub struct Scan {
    pub prefix: Vec<u8>,
    pub tag: Tag,
    pub namespace: u32,
    pub pattern: Option<String>,
    pub filter_on: FilterOn,
    pub emit: Emit,
    /// Collapse consecutive rows of the same logical key (multimap keyspace
    /// listings, where one key owns many member rows)
    pub dedup_keys: bool,
}

/// True when the scan must stop right now
fn aborted(q: &Query, ctx: &RunCtx<'_>, db: &DbRef) -> bool {
    if !q.sink.connected() {
        tracing::trace!(verb = ?q.verb, "scan aborted: client disconnected");
        return true;
    }
    if ctx.stopping() {
        tracing::trace!(verb = ?q.verb, "scan aborted: storage stopping");
        return true;
    }
    if db.is_closing() {
        tracing::trace!(verb = ?q.verb, db = db.name(), "scan aborted: database closing");
        return true;
    }
    false
}

/// Execute a prefix scan with chunked delivery.
///
/// On success the terminal batch stays on `q` with `partial = false`; every
/// earlier batch has already been delivered as its own chunk.
pub(super) fn run_scan(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef, scan: Scan) -> Access {
    let chunk_size = ctx.config.scan_chunk_size;
    let offset = q.offset.max(0) as usize;
    let limit = if q.limit < 0 { usize::MAX } else { q.limit as usize };

    let mut matched = 0usize;
    let mut emitted = 0usize;
    let mut count = 0usize;
    let mut last_key: Option<String> = None;

    for (raw, value) in db.engine().scan_from(&scan.prefix) {
        if aborted(q, ctx, db) {
            return Access::Interrupted;
        }
        if !raw.starts_with(&scan.prefix) {
            break;
        }

        // Re-validate: an ordered keyspace interleaves all tags and
        // namespaces around lexicographic boundaries, so the prefix check
        // alone is not proof of membership.
        let parsed = match keys::decode(&raw) {
            Ok(p) => p,
            Err(_) => continue,
        };
        if parsed.tag != scan.tag || (!q.flags.global && parsed.namespace != scan.namespace) {
            continue;
        }

        if scan.dedup_keys {
            if last_key.as_deref() == Some(parsed.key.as_str()) {
                continue;
            }
            last_key = Some(parsed.key.clone());
        }

        let value_text = String::from_utf8_lossy(&value).into_owned();
        let field = parsed.field.clone().unwrap_or_default();
        let candidate = match scan.filter_on {
            FilterOn::Key => parsed.key.as_str(),
            FilterOn::Field => field.as_str(),
            FilterOn::Value => value_text.as_str(),
        };
        if let Some(pattern) = &scan.pattern {
            if !glob_match(pattern, candidate) {
                continue;
            }
        }

        matched += 1;
        if matched <= offset {
            continue;
        }
        if emitted >= limit {
            break;
        }
        emitted += 1;

        if q.flags.count_only {
            count += 1;
            continue;
        }

        // Emit the previous batch before this row would overflow it, so the
        // final batch is never empty and chunk count is exactly ceil(N/C)
        if q.items.len() + q.pairs.len() >= chunk_size {
            q.emit_chunk();
        }

        match scan.emit {
            Emit::Keys => q.items.push(parsed.key),
            Emit::Pairs => q.pairs.push((parsed.key, value_text)),
            Emit::FieldPairs => q.pairs.push((field, value_text)),
        }
    }

    if q.flags.count_only {
        q.response = Some(count.to_string());
        return Access::Ok;
    }

    q.finish_stream();
    Access::Ok
}

/// Chunk-deliver an in-memory sequence (list slices, diff output) using the
/// same protocol as keyspace scans.
pub(super) fn emit_items_chunked<I>(
    q: &mut Query,
    ctx: &RunCtx<'_>,
    db: &DbRef,
    items: I,
    chunk_size: usize,
) -> Access
where
    I: IntoIterator<Item = String>,
{
    for item in items {
        if aborted(q, ctx, db) {
            return Access::Interrupted;
        }
        if q.items.len() >= chunk_size {
            q.emit_chunk();
        }
        q.items.push(item);
    }
    q.finish_stream();
    Access::Ok
}
