//! Scalar, timer, and numeric verbs
//!
//! Everything that addresses a single scalar row: SET/GET and the NX
//! variant, the keyspace listings (KEYS/FIND/SEARCH/COUNT), the expire and
//! future timers, and the arithmetic family. Arithmetic treats an absent key
//! as "0", prefers integer formatting when the result is whole, and reports
//! `NotNumeric` instead of failing the query.

use crate::error::Access;
use crate::keys;
use crate::registry::DbRef;
use crate::scheduler::{now_secs, TimerKind};

use super::scan::{run_scan, Emit, FilterOn, Scan};
use super::{Query, RunCtx, Verb};

pub(super) fn run(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    match q.verb {
        Verb::Set => set(q, db, false),
        Verb::SetNx => set(q, db, true),
        Verb::Get => get(q, db),

        Verb::Keys => listing(q, ctx, db, FilterOn::Key, Emit::Keys, false),
        Verb::Find => listing(q, ctx, db, FilterOn::Key, Emit::Pairs, false),
        Verb::Search => listing(q, ctx, db, FilterOn::Value, Emit::Pairs, false),
        Verb::Count => listing(q, ctx, db, FilterOn::Key, Emit::Keys, true),

        Verb::Expire | Verb::ExpireAt => expire(q, ctx, db),
        Verb::Persist => persist(q, ctx, db),
        Verb::Ttl => ttl(q, ctx, db),
        Verb::Future => future(q, ctx, db),

        Verb::Incr
        | Verb::Decr
        | Verb::Add
        | Verb::Sub
        | Verb::Mult
        | Verb::Div
        | Verb::Sqrt
        | Verb::Avg => arithmetic(q, db),

        _ => Access::Broken,
    }
}

// =============================================================================
// Scalars
// =============================================================================

fn set(q: &mut Query, db: &DbRef, nx: bool) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let row = keys::encode(q.tag(), q.namespace, &q.key, None);
    if nx && db.engine().contains(&row) {
        return Access::EntryExists;
    }
    match db.engine().put(&row, q.value.as_bytes()) {
        Ok(()) => Access::Ok,
        Err(err) => write_failed(q, err),
    }
}

fn get(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let row = keys::encode(q.tag(), q.namespace, &q.key, None);
    match db.engine().get(&row) {
        Some(value) => {
            q.response = Some(String::from_utf8_lossy(&value).into_owned());
            Access::Ok
        }
        None => Access::NotFound,
    }
}

// =============================================================================
// Keyspace listings
// =============================================================================

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
    let tag = q.tag();
    let scan = Scan {
        prefix: scan_prefix(q),
        tag,
        namespace: q.namespace,
        pattern: pattern_of(q),
        filter_on,
        emit,
        dedup_keys: tag.is_prefixed_shape(),
    };
    run_scan(q, ctx, db, scan)
}

/// Prefix covering the query's scan: one namespace, or the whole tag range
/// when the global flag is set
pub(super) fn scan_prefix(q: &Query) -> Vec<u8> {
    if q.flags.global {
        keys::bare_tag_prefix(q.tag())
    } else {
        keys::tag_prefix(q.tag(), q.namespace)
    }
}

/// The glob pattern carried by the query, if any
pub(super) fn pattern_of(q: &Query) -> Option<String> {
    if q.new_key.is_empty() {
        None
    } else {
        Some(q.new_key.clone())
    }
}

// =============================================================================
// Timers
// =============================================================================

fn expire(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    let Some(when) = q.when else {
        return Access::MissingArgs;
    };
    let row = keys::encode(q.tag(), q.namespace, &q.key, None);
    if !db.engine().contains(&row) {
        return Access::NotFound;
    }
    let absolute = q.verb == Verb::ExpireAt || ctx.config.ttl_absolute;
    match ctx.scheduler.add(
        db,
        when,
        &q.key,
        q.namespace,
        absolute,
        TimerKind::Expire,
        None,
    ) {
        Ok(trigger_at) => {
            q.response = Some(trigger_at.to_string());
            Access::Ok
        }
        Err(err) => write_failed(q, err),
    }
}

fn persist(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    if ctx
        .scheduler
        .trigger_time(db.name(), &q.key, q.namespace)
        .is_none()
    {
        return Access::NotFound;
    }
    match ctx.scheduler.cancel(db, &q.key, q.namespace) {
        Ok(()) => Access::Ok,
        Err(err) => write_failed(q, err),
    }
}

fn ttl(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    match ctx.scheduler.trigger_time(db.name(), &q.key, q.namespace) {
        Some(trigger_at) => {
            q.response = Some(trigger_at.saturating_sub(now_secs()).to_string());
        }
        // No timer on the key is still an answerable question
        None => q.response = Some("-1".to_string()),
    }
    Access::Ok
}

fn future(q: &mut Query, ctx: &RunCtx<'_>, db: &DbRef) -> Access {
    let Some(when) = q.when else {
        return Access::MissingArgs;
    };
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let absolute = ctx.config.ttl_absolute;
    match ctx.scheduler.add(
        db,
        when,
        &q.key,
        q.namespace,
        absolute,
        TimerKind::Future,
        Some(&q.value),
    ) {
        Ok(trigger_at) => {
            q.response = Some(trigger_at.to_string());
            Access::Ok
        }
        Err(err) => write_failed(q, err),
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

fn arithmetic(q: &mut Query, db: &DbRef) -> Access {
    if q.key.is_empty() {
        return Access::MissingArgs;
    }
    let row = keys::encode(q.tag(), q.namespace, &q.key, None);
    let current = match db.engine().get(&row) {
        Some(value) => {
            let text = String::from_utf8_lossy(&value).into_owned();
            match text.parse::<f64>() {
                Ok(n) => n,
                Err(_) => return Access::NotNumeric,
            }
        }
        None => 0.0,
    };

    let operand = || -> Option<f64> { q.value.parse::<f64>().ok() };
    let next = match q.verb {
        Verb::Incr => current + 1.0,
        Verb::Decr => current - 1.0,
        Verb::Add => match operand() {
            Some(n) => current + n,
            None => return Access::NotNumeric,
        },
        Verb::Sub => match operand() {
            Some(n) => current - n,
            None => return Access::NotNumeric,
        },
        Verb::Mult => match operand() {
            Some(n) => current * n,
            None => return Access::NotNumeric,
        },
        Verb::Div => match operand() {
            Some(n) if n != 0.0 => current / n,
            _ => return Access::NotNumeric,
        },
        Verb::Sqrt => {
            if current < 0.0 {
                return Access::NotNumeric;
            }
            current.sqrt()
        }
        Verb::Avg => match operand() {
            Some(n) => (current + n) / 2.0,
            None => return Access::NotNumeric,
        },
        _ => return Access::Broken,
    };
    if !next.is_finite() {
        return Access::NotNumeric;
    }

    let formatted = format_number(next);
    match db.engine().put(&row, formatted.as_bytes()) {
        Ok(()) => {
            q.response = Some(formatted);
            Access::Ok
        }
        Err(err) => write_failed(q, err),
    }
}

/// Integer formatting for whole results, decimal otherwise
pub(super) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

pub(super) fn write_failed(q: &Query, err: crate::error::StoreError) -> Access {
    tracing::error!(verb = ?q.verb, key = %q.key, error = %err, "storage write failed");
    Access::BatchWriteFailed
}
