//! List and vector verbs
//!
//! Both shapes share one verb family; the query's shape picks the `l:` or
//! `v:` tag range. A collection is one engine value, decoded into [`Items`]
//! for the duration of the verb and written back (or deleted, when the last
//! element goes) afterwards. Slices and searches stream through the chunk
//! protocol with the list chunk size.

use crate::collections::Items;
use crate::error::Access;
use crate::keys;
use crate::registry::DbRef;

use super::keys_verbs::{format_number, pattern_of, scan_prefix, write_failed};
use super::scan::{emit_items_chunked, run_scan, Emit, FilterOn, Scan};
use super::{Query, RunCtx, Verb};

pub(super) fn run(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    if q.key.is_empty() && q.verb != Verb::LKeys {
        return Access::MissingArgs;
    }
    match q.verb {
        Verb::LPush => push(q, db),
        Verb::LPopFront => pop(q, db, true),
        Verb::LPopBack => pop(q, db, false),
        Verb::LGet => get_slice(q, ctx, db),
        Verb::LSet => set_at(q, db),
        Verb::LRem => remove(q, db),
        Verb::LExists => exists(q, db),
        Verb::LFind => find(q, ctx, db),
        Verb::LSort => rewrite(q, db, Items::sort),
        Verb::LReverse => rewrite(q, db, Items::reverse),
        Verb::LResize => resize(q, db),
        Verb::LRepeats => repeats(q, db),
        Verb::LStats => stats(q, db),
        Verb::LLen => len(q, db),
        Verb::LKeys => keys_listing(q, ctx, db),
        _ => Access::Broken,
    }
}

// =============================================================================
// Load / store
// =============================================================================

fn row_of(q: &Query) -> Vec<u8> {
    keys::encode(q.tag(), q.namespace, &q.key, None)
}

fn load(q: &Query, db: &DbRef) -> Option<Items> {
    db.engine().get(&row_of(q)).map(|v| Items::from_value(&v))
}

/// Write the collection back; an emptied collection deletes its key so that
/// absent and empty stay the same observable state
fn store(q: &Query, db: &DbRef, items: &Items) -> Access {
    let row = row_of(q);
    let outcome = if items.is_empty() {
        db.engine().delete(&row).map(|_| ())
    } else {
        db.engine().put(&row, &items.to_value())
    };
    match outcome {
        Ok(()) => Access::Ok,
        Err(err) => write_failed(q, err),
    }
}

// =============================================================================
// Mutations
// =============================================================================

fn push(q: &mut Query, db: &DbRef) -> Access {
    let mut items = load(q, db).unwrap_or_default();
    items.push(q.value.clone());
    let access = store(q, db, &items);
    if access.is_ok() {
        q.response = Some(items.len().to_string());
    }
    access
}

fn pop(q: &mut Query, db: &DbRef, front: bool) -> Access {
    let Some(mut items) = load(q, db) else {
        return Access::NotFound;
    };
    let (access, popped) = if front {
        items.pop_front()
    } else {
        items.pop_back()
    };
    if !access.is_ok() {
        return access;
    }
    let stored = store(q, db, &items);
    if stored.is_ok() {
        q.response = popped;
    }
    stored
}

fn set_at(q: &mut Query, db: &DbRef) -> Access {
    let Some(mut items) = load(q, db) else {
        return Access::NotFound;
    };
    let index = match usize::try_from(q.offset) {
        Ok(n) => n,
        Err(_) => return Access::NotFound,
    };
    let access = items.set(index, q.value.clone());
    if !access.is_ok() {
        return access;
    }
    store(q, db, &items)
}

fn remove(q: &mut Query, db: &DbRef) -> Access {
    let Some(mut items) = load(q, db) else {
        return Access::NotFound;
    };
    let (access, removed) = items.remove(&q.value, q.flags.first_only);
    if !access.is_ok() {
        return access;
    }
    let stored = store(q, db, &items);
    if stored.is_ok() {
        q.response = Some(removed.to_string());
    }
    stored
}

fn rewrite(q: &mut Query, db: &DbRef, op: fn(&mut Items)) -> Access {
    let Some(mut items) = load(q, db) else {
        return Access::NotFound;
    };
    op(&mut items);
    store(q, db, &items)
}

fn resize(q: &mut Query, db: &DbRef) -> Access {
    let Some(mut items) = load(q, db) else {
        return Access::NotFound;
    };
    let size = match usize::try_from(q.limit) {
        Ok(n) => n,
        Err(_) => return Access::MissingArgs,
    };
    let access = items.resize(size);
    if !access.is_ok() {
        return access;
    }
    store(q, db, &items)
}

// =============================================================================
// Reads
// =============================================================================

fn get_slice(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    let Some(items) = load(q, db) else {
        return Access::NotFound;
    };
    let offset = q.offset.max(0) as usize;
    let limit = if q.limit < 0 {
        usize::MAX
    } else {
        q.limit as usize
    };
    let window: Vec<String> = items
        .into_elements()
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect();
    emit_items_chunked(q, ctx, db, window, ctx.config.list_chunk_size)
}

fn exists(q: &mut Query, db: &DbRef) -> Access {
    match load(q, db) {
        Some(items) if items.exists(&q.value) => Access::Ok,
        Some(_) | None => Access::NotFound,
    }
}

fn find(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    let Some(items) = load(q, db) else {
        return Access::NotFound;
    };
    let Some(pattern) = pattern_of(q) else {
        return Access::MissingArgs;
    };
    let matches = items.find(&pattern);
    if q.flags.count_only {
        q.response = Some(matches.len().to_string());
        return Access::Ok;
    }
    emit_items_chunked(q, ctx, db, matches, ctx.config.list_chunk_size)
}

fn repeats(q: &mut Query, db: &DbRef) -> Access {
    let Some(items) = load(q, db) else {
        return Access::NotFound;
    };
    q.response = Some(items.repeats(&q.value).to_string());
    Access::Ok
}

fn stats(q: &mut Query, db: &DbRef) -> Access {
    let Some(items) = load(q, db) else {
        return Access::NotFound;
    };
    let (access, stats) = items.stats();
    if let Some(stats) = stats {
        q.pairs.push(("sum".into(), format_number(stats.sum)));
        q.pairs.push(("avg".into(), format_number(stats.avg)));
        q.pairs.push(("min".into(), format_number(stats.min)));
        q.pairs.push(("max".into(), format_number(stats.max)));
    }
    access
}

fn len(q: &mut Query, db: &DbRef) -> Access {
    // Absent and empty are the same observable state: zero
    let count = load(q, db).map(|items| items.len()).unwrap_or(0);
    q.response = Some(count.to_string());
    Access::Ok
}

fn keys_listing(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    let scan = Scan {
        prefix: scan_prefix(q),
        tag: q.tag(),
        namespace: q.namespace,
        pattern: pattern_of(q),
        filter_on: FilterOn::Key,
        emit: Emit::Keys,
        dedup_keys: false,
    };
    run_scan(q, ctx, db, scan)
}
