//! Shape-dispatched verbs
//!
//! DELETE, EXISTS, and the relocation family work on a key whose shape the
//! caller does not have to know: the key is probed across all six tag ranges
//! first. Relocations (RENAME, MOVE, COPY, CLONE, TRANSFER) act on scalar
//! keys; a probe that lands on a collection shape reports `Ok` without
//! touching anything, matching the wire protocol's historical behavior.
//!
//! Also home to the two quiet internal verbs the timer flush generates:
//! expiration (delete the key and its mirror row) and promotion (move a
//! staged future value into the live key).

use std::collections::BTreeMap;

use crate::collections::Items;
use crate::engine::WriteBatch;
use crate::error::Access;
use crate::keys::{self, Tag};
use crate::registry::DbRef;
use crate::scheduler::{Scheduler, TimerKind};

use super::keys_verbs::write_failed;
use super::scan::emit_items_chunked;
use super::{Query, RunCtx, Shape, Verb};

pub(super) fn run(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    match q.verb {
        Verb::Delete => delete(q, ctx, db),
        Verb::Exists => exists(q, db),
        Verb::Rename => relocate(q, ctx, db, Destination::Rename { nx: false }),
        Verb::RenameNx => relocate(q, ctx, db, Destination::Rename { nx: true }),
        Verb::Move => relocate(q, ctx, db, Destination::Move),
        Verb::Copy => relocate(q, ctx, db, Destination::Copy),
        Verb::Clone => relocate(q, ctx, db, Destination::Clone),
        Verb::Transfer => relocate(q, ctx, db, Destination::Transfer),
        Verb::Diff => diff(q, ctx, db),
        Verb::ExpireFired => expire_fired(q, ctx, db),
        Verb::FuturePromote => future_promote(q, ctx, db),
        _ => Access::Broken,
    }
}

// =============================================================================
// Shape probing
// =============================================================================

/// Which shape, if any, a key currently holds in this namespace.
///
/// Single-row shapes are probed with an exact lookup; hash shapes with a
/// one-row prefix scan.
pub(super) fn probe_shape(db: &DbRef, namespace: u32, key: &str) -> Option<Shape> {
    for shape in [Shape::Key, Shape::List, Shape::Vector, Shape::Geo] {
        let row = keys::encode(shape.tag(), namespace, key, None);
        if db.engine().contains(&row) {
            return Some(shape);
        }
    }
    for shape in [Shape::Map, Shape::MultiMap] {
        let prefix = keys::field_prefix(shape.tag(), namespace, key);
        if let Some((raw, _)) = db.engine().scan_from(&prefix).next() {
            if raw.starts_with(&prefix) {
                return Some(shape);
            }
        }
    }
    None
}

/// Every field row of a hash-shaped key, in field order
fn field_rows(db: &DbRef, tag: Tag, namespace: u32, key: &str) -> Vec<(Vec<u8>, Vec<u8>)> {
    let prefix = keys::field_prefix(tag, namespace, key);
    db.engine()
        .scan_from(&prefix)
        .take_while(|(raw, _)| raw.starts_with(&prefix))
        .collect()
}

// =============================================================================
// Delete / Exists
// =============================================================================

fn delete(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    let Some(shape) = probe_shape(db, q.namespace, &q.key) else {
        return Access::NotFound;
    };

    let outcome = if shape.tag().is_prefixed_shape() {
        let mut batch = WriteBatch::new();
        for (raw, _) in field_rows(db, shape.tag(), q.namespace, &q.key) {
            batch.delete(raw);
        }
        db.engine().write(batch)
    } else {
        let row = keys::encode(shape.tag(), q.namespace, &q.key, None);
        db.engine().delete(&row).map(|_| ())
    };
    if let Err(err) = outcome {
        return write_failed(q, err);
    }

    // A deleted key must not fire later
    if let Err(err) = ctx.scheduler.cancel(db, &q.key, q.namespace) {
        return write_failed(q, err);
    }
    Access::Ok
}

fn exists(q: &mut Query, db: &DbRef) -> Access {
    match probe_shape(db, q.namespace, &q.key) {
        Some(_) => Access::Ok,
        None => Access::NotFound,
    }
}

// =============================================================================
// Relocation family
// =============================================================================

enum Destination {
    Rename { nx: bool },
    Move,
    Copy,
    Clone,
    Transfer,
}

fn relocate(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef, dest: Destination) -> Access {
    match probe_shape(db, q.namespace, &q.key) {
        Some(Shape::Key) => {}
        // Collection shapes are accepted but not relocated
        Some(_) => return Access::Ok,
        None => return Access::NotFound,
    }

    let (dest_db, dest_ns, dest_key, remove_source, move_timer, nx) = match dest {
        Destination::Rename { nx } => (db.clone(), q.namespace, q.new_key.clone(), true, true, nx),
        Destination::Move => (db.clone(), q.target_namespace, q.key.clone(), true, true, false),
        Destination::Copy => (db.clone(), q.namespace, q.new_key.clone(), false, false, false),
        Destination::Clone => (db.clone(), q.target_namespace, q.key.clone(), false, false, false),
        Destination::Transfer => match q.target_db.clone() {
            Some(target) => (target, q.namespace, q.key.clone(), true, true, false),
            None => return Access::MissingArgs,
        },
    };
    if dest_key.is_empty() {
        return Access::MissingArgs;
    }

    let source_row = keys::encode(Tag::Key, q.namespace, &q.key, None);
    let dest_row = keys::encode(Tag::Key, dest_ns, &dest_key, None);
    let same_engine = db.name() == dest_db.name();
    if same_engine && source_row == dest_row {
        return Access::Ok;
    }
    if nx && dest_db.engine().contains(&dest_row) {
        return Access::EntryExists;
    }

    let Some(value) = db.engine().get(&source_row) else {
        return Access::NotFound;
    };

    let outcome = if same_engine {
        let mut batch = WriteBatch::new();
        batch.put(dest_row, value);
        if remove_source {
            batch.delete(source_row);
        }
        db.engine().write(batch)
    } else {
        dest_db.engine().put(&dest_row, &value).and_then(|()| {
            if remove_source {
                db.engine().delete(&source_row).map(|_| ())
            } else {
                Ok(())
            }
        })
    };
    if let Err(err) = outcome {
        return write_failed(q, err);
    }

    if move_timer {
        if let Err(err) = carry_timer(q, ctx, db, &dest_db, dest_ns, &dest_key) {
            return write_failed(q, err);
        }
    }
    Access::Ok
}

/// Re-attach any scheduled timer on the source key to its new location
fn carry_timer(
    q: &Query,
    ctx: &RunCtx<'_>,
    db: &DbRef,
    dest_db: &DbRef,
    dest_ns: u32,
    dest_key: &str,
) -> crate::error::Result<()> {
    let Some(trigger_at) = ctx.scheduler.trigger_time(db.name(), &q.key, q.namespace) else {
        return Ok(());
    };
    let staged = Scheduler::staged_value(db, &q.key, q.namespace);
    let kind = if staged.is_some() {
        TimerKind::Future
    } else {
        TimerKind::Expire
    };
    ctx.scheduler.cancel(db, &q.key, q.namespace)?;
    ctx.scheduler.add(
        dest_db,
        trigger_at,
        dest_key,
        dest_ns,
        true,
        kind,
        staged.as_deref(),
    )?;
    Ok(())
}

// =============================================================================
// Diff
// =============================================================================

fn diff(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    if q.new_key.is_empty() {
        return Access::MissingArgs;
    }
    let Some(shape) = probe_shape(db, q.namespace, &q.key) else {
        return Access::NotFound;
    };

    match shape {
        Shape::Key | Shape::Geo => {
            let a_row = keys::encode(shape.tag(), q.namespace, &q.key, None);
            let b_row = keys::encode(shape.tag(), q.namespace, &q.new_key, None);
            let Some(a) = db.engine().get(&a_row) else {
                return Access::NotFound;
            };
            let Some(b) = db.engine().get(&b_row) else {
                return Access::NotFound;
            };
            if a != b {
                q.items.push(String::from_utf8_lossy(&a).into_owned());
                q.items.push(String::from_utf8_lossy(&b).into_owned());
            }
            Access::Ok
        }

        Shape::List | Shape::Vector => {
            let a = load_items(db, shape.tag(), q.namespace, &q.key);
            let b = load_items(db, shape.tag(), q.namespace, &q.new_key);
            let Some(a) = a else { return Access::NotFound };
            let Some(b) = b else { return Access::NotFound };
            // Symmetric difference, source order first
            let mut out: Vec<String> = Vec::new();
            for e in a.elements() {
                if !b.exists(e) {
                    out.push(e.clone());
                }
            }
            for e in b.elements() {
                if !a.exists(e) {
                    out.push(e.clone());
                }
            }
            emit_items_chunked(q, ctx, db, out, ctx.config.list_chunk_size)
        }

        Shape::Map | Shape::MultiMap => {
            let a = field_map(db, shape.tag(), q.namespace, &q.key);
            let b = field_map(db, shape.tag(), q.namespace, &q.new_key);
            if a.is_empty() || b.is_empty() {
                return Access::NotFound;
            }
            for (field, value) in &a {
                if b.get(field) != Some(value) {
                    q.pairs.push((field.clone(), value.clone()));
                }
            }
            for (field, value) in &b {
                if !a.contains_key(field) {
                    q.pairs.push((field.clone(), value.clone()));
                }
            }
            Access::Ok
        }
    }
}

fn load_items(db: &DbRef, tag: Tag, namespace: u32, key: &str) -> Option<Items> {
    let row = keys::encode(tag, namespace, key, None);
    db.engine().get(&row).map(|v| Items::from_value(&v))
}

fn field_map(db: &DbRef, tag: Tag, namespace: u32, key: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (raw, value) in field_rows(db, tag, namespace, key) {
        if let Ok(parsed) = keys::decode(&raw) {
            if let Some(field) = parsed.field {
                out.insert(field, String::from_utf8_lossy(&value).into_owned());
            }
        }
    }
    out
}

// =============================================================================
// Internal timer verbs
// =============================================================================

/// An expire timer fired: drop the key and its mirror row
fn expire_fired(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    let row = keys::encode(Tag::Key, q.namespace, &q.key, None);
    if let Err(err) = db.engine().delete(&row) {
        return write_failed(q, err);
    }
    // Index entry is already gone (flush popped it); this clears the rows
    if let Err(err) = ctx.scheduler.cancel(db, &q.key, q.namespace) {
        return write_failed(q, err);
    }
    tracing::debug!(db = db.name(), ns = q.namespace, key = %q.key, "key expired");
    Access::Ok
}

/// A future timer fired: promote the staged value into the live key
fn future_promote(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    let Some(staged) = Scheduler::staged_value(db, &q.key, q.namespace) else {
        return Access::NotFound;
    };
    let row = keys::encode(Tag::Key, q.namespace, &q.key, None);
    if let Err(err) = db.engine().put(&row, staged.as_bytes()) {
        return write_failed(q, err);
    }
    if let Err(err) = ctx.scheduler.cancel(db, &q.key, q.namespace) {
        return write_failed(q, err);
    }
    tracing::debug!(db = db.name(), ns = q.namespace, key = %q.key, "future value promoted");
    Access::Ok
}
