//! Single-field map verbs
//!
//! A map holds at most one field per key. Setting a field atomically retires
//! any previous field row in the same batch, so the one-field invariant holds
//! even across a crash between the two writes.

use crate::engine::WriteBatch;
use crate::error::Access;
use crate::keys;
use crate::registry::DbRef;

use super::keys_verbs::{pattern_of, scan_prefix, write_failed};
use super::scan::{run_scan, Emit, FilterOn, Scan};
use super::{Query, RunCtx, Verb};

pub(super) fn run(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    match q.verb {
        Verb::HSet => hset(q, db),
        Verb::HGet => hget(q, db),
        Verb::HDel => hdel(q, db),
        Verb::HExists => hexists(q, db),
        Verb::HKeys => listing(q, ctx, db, FilterOn::Key, Emit::Keys, false),
        Verb::HSearch => listing(q, ctx, db, FilterOn::Value, Emit::Pairs, false),
        Verb::HCount => listing(q, ctx, db, FilterOn::Key, Emit::Keys, true),
        _ => Access::Broken,
    }
}

/// All field rows of one map key (zero or one for a well-formed map)
fn rows_of(q: &Query, db: &DbRef) -> Vec<(Vec<u8>, Vec<u8>)> {
    let prefix = keys::field_prefix(q.tag(), q.namespace, &q.key);
    db.engine()
        .scan_from(&prefix)
        .take_while(|(raw, _)| raw.starts_with(&prefix))
        .collect()
}

fn hset(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() || q.field.is_empty() {
        return Access::MissingArgs;
    }
    let mut batch = WriteBatch::new();
    let new_row = keys::encode(q.tag(), q.namespace, &q.key, Some(&q.field));
    for (raw, _) in rows_of(q, db) {
        if raw != new_row {
            batch.delete(raw);
        }
    }
    batch.put(new_row, q.value.clone().into_bytes());
    match db.engine().write(batch) {
        Ok(()) => Access::Ok,
        Err(err) => write_failed(q, err),
    }
}

fn hget(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    if q.field.is_empty() {
        // Field name unknown: hand back the sole row as a pair
        return match rows_of(q, db).into_iter().next() {
            Some((raw, value)) => {
                let field = keys::decode(&raw)
                    .ok()
                    .and_then(|p| p.field)
                    .unwrap_or_default();
                q.pairs
                    .push((field, String::from_utf8_lossy(&value).into_owned()));
                Access::Ok
            }
            None => Access::NotFound,
        };
    }
    let row = keys::encode(q.tag(), q.namespace, &q.key, Some(&q.field));
    match db.engine().get(&row) {
        Some(value) => {
            q.response = Some(String::from_utf8_lossy(&value).into_owned());
            Access::Ok
        }
        None => Access::NotFound,
    }
}

fn hdel(q: &mut Query, db: &DbRef) -> Access {
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
    let rows = rows_of(q, db);
    if rows.is_empty() {
        return Access::NotFound;
    }
    let mut batch = WriteBatch::new();
    for (raw, _) in rows {
        batch.delete(raw);
    }
    match db.engine().write(batch) {
        Ok(()) => Access::Ok,
        Err(err) => write_failed(q, err),
    }
}

fn hexists(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let present = if q.field.is_empty() {
        !rows_of(q, db).is_empty()
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
        dedup_keys: true,
    };
    run_scan(q, ctx, db, scan)
}
