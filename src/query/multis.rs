//! Multimap verbs
//!
//! A multimap stores one engine row per member, keyed `u:<ns>:<key>:<field>`.
//! Membership checks and removals address a single row; whole-key reads walk
//! the field prefix in field order and stream through the chunk protocol.

use crate::engine::WriteBatch;
use crate::error::Access;
use crate::keys;
use crate::registry::DbRef;

use super::keys_verbs::{pattern_of, scan_prefix, write_failed};
use super::scan::{run_scan, Emit, FilterOn, Scan};
use super::{Query, RunCtx, Verb};

pub(super) fn run(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    match q.verb {
        Verb::MAdd => madd(q, db),
        Verb::MGet => mget(q, ctx, db),
        Verb::MDel => mdel(q, db),
        Verb::MExists => mexists(q, db),
        Verb::MKeys => listing(q, ctx, db, FilterOn::Key, Emit::Keys, false),
        Verb::MSearch => listing(q, ctx, db, FilterOn::Value, Emit::Pairs, false),
        Verb::MCount => mcount(q, ctx, db),
        _ => Access::Broken,
    }
}

fn madd(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() || q.field.is_empty() {
        return Access::MissingArgs;
    }
    let row = keys::encode(q.tag(), q.namespace, &q.key, Some(&q.field));
    if db.engine().contains(&row) {
        return Access::EntryExists;
    }
    match db.engine().put(&row, q.value.as_bytes()) {
        Ok(()) => Access::Ok,
        Err(err) => write_failed(q, err),
    }
}

fn mget(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    if !q.field.is_empty() {
        let row = keys::encode(q.tag(), q.namespace, &q.key, Some(&q.field));
        return match db.engine().get(&row) {
            Some(value) => {
                q.response = Some(String::from_utf8_lossy(&value).into_owned());
                Access::Ok
            }
            None => Access::NotFound,
        };
    }
    // Whole-key read: every member as (field, value), chunked
    let tag = q.tag();
    let prefix = keys::field_prefix(tag, q.namespace, &q.key);
    let scan = Scan {
        prefix,
        tag,
        namespace: q.namespace,
        pattern: None,
        filter_on: FilterOn::Field,
        emit: Emit::FieldPairs,
        dedup_keys: false,
    };
    run_scan(q, ctx, db, scan)
}

fn mdel(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    if !q.field.is_empty() {
        let row = keys::encode(q.tag(), q.namespace, &q.key, Some(&q.field));
        return match db.engine().delete(&row) {
            Ok(true) => Access::Ok,
            Ok(false) => Access::NotFound,
            Err(err) => write_failed(q, err),
        };
    }
    let prefix = keys::field_prefix(q.tag(), q.namespace, &q.key);
    let rows: Vec<Vec<u8>> = db
        .engine()
        .scan_from(&prefix)
        .take_while(|(raw, _)| raw.starts_with(&prefix))
        .map(|(raw, _)| raw)
        .collect();
    if rows.is_empty() {
        return Access::NotFound;
    }
    let mut batch = WriteBatch::new();
    for raw in rows {
        batch.delete(raw);
    }
    match db.engine().write(batch) {
        Ok(()) => Access::Ok,
        Err(err) => write_failed(q, err),
    }
}

fn mexists(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let present = if q.field.is_empty() {
        let prefix = keys::field_prefix(q.tag(), q.namespace, &q.key);
        db.engine()
            .scan_from(&prefix)
            .next()
            .is_some_and(|(raw, _)| raw.starts_with(&prefix))
    } else {
        let row = keys::encode(q.tag(), q.namespace, &q.key, Some(&q.field));
        db.engine().contains(&row)
    };
    if present {
        Access::Ok
    } else {
        Access::NotFound
    }
}

/// Member count of one key, or a namespace-wide distinct-key count
fn mcount(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return listing(q, ctx, db, FilterOn::Key, Emit::Keys, true);
    }
    let prefix = keys::field_prefix(q.tag(), q.namespace, &q.key);
    let count = db
        .engine()
        .scan_from(&prefix)
        .take_while(|(raw, _)| raw.starts_with(&prefix))
        .count();
    q.response = Some(count.to_string());
    Access::Ok
}

fn listing(
    q: &mut Query,
    ctx: &RunCtx<'_>,
    db: &DbRef,
    filter_on: FilterOn,
    emit: Emit,
    count_only: bool,
) -> Access {
    if count_only {
        q.flags.count_only = true;
    }
    let scan = Scan {
        prefix: scan_prefix(q),
        tag: q.tag(),
        namespace: q.namespace,
        pattern: pattern_of(q),
        filter_on,
        emit,
        // One key owns many member rows; listings want each key once
        dedup_keys: matches!(emit, Emit::Keys),
    };
    run_scan(q, ctx, db, scan)
}
