//! Typed command facade
//!
//! Thin ergonomic layer over the query model: a [`Session`] binds a database
//! and namespace, builds one query per call, submits it to the storage
//! context, and blocks until the terminal reply arrives. Chunked replies are
//! folded back together here, so facade callers always see the complete
//! payload.

use crate::error::{Access, Result};
use crate::exec::{ChannelSink, StorageContext};
use crate::query::{Query, Shape, Verb};
use crate::registry::DbRef;

/// The folded result of one facade call
#[derive(Debug, Clone)]
pub struct Outcome {
    pub access: Access,
    pub scalar: Option<String>,
    pub items: Vec<String>,
    pub pairs: Vec<(String, String)>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.access.is_ok()
    }
}

/// A database + namespace binding for issuing commands
pub struct Session<'a> {
    ctx: &'a StorageContext,
    db: DbRef,
    namespace: u32,
}

impl StorageContext {
    /// Bind a session to `database` / `namespace`, opening the database if
    /// needed
    pub fn session(&self, database: &str, namespace: u32) -> Result<Session<'_>> {
        let db = self.database(database)?;
        Ok(Session {
            ctx: self,
            db,
            namespace,
        })
    }
}

impl Session<'_> {
    fn execute(
        &self,
        verb: Verb,
        shape: Shape,
        fill: impl FnOnce(&mut Query),
    ) -> Result<Outcome> {
        let (sink, rx) = ChannelSink::pair();
        let mut query = Query::new(verb, shape, sink);
        query.db = Some(self.db.clone());
        query.namespace = self.namespace;
        fill(&mut query);
        self.ctx.submit(query)?;

        let mut outcome = Outcome {
            access: Access::Pending,
            scalar: None,
            items: Vec::new(),
            pairs: Vec::new(),
        };
        for reply in rx {
            outcome.access = reply.access;
            if reply.scalar.is_some() {
                outcome.scalar = reply.scalar;
            }
            outcome.items.extend(reply.items);
            outcome.pairs.extend(reply.pairs);
            if !reply.partial {
                break;
            }
        }
        Ok(outcome)
    }

    pub fn database_name(&self) -> &str {
        self.db.name()
    }

    pub fn namespace(&self) -> u32 {
        self.namespace
    }

    // -------------------------------------------------------------------------
    // Scalars
    // -------------------------------------------------------------------------

    pub fn set(&self, key: &str, value: &str) -> Result<Outcome> {
        self.execute(Verb::Set, Shape::Key, |q| {
            q.key = key.into();
            q.value = value.into();
        })
    }

    pub fn set_nx(&self, key: &str, value: &str) -> Result<Outcome> {
        self.execute(Verb::SetNx, Shape::Key, |q| {
            q.key = key.into();
            q.value = value.into();
        })
    }

    pub fn get(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::Get, Shape::Key, |q| q.key = key.into())
    }

    pub fn keys(&self, pattern: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::Keys, Shape::Key, |q| {
            q.new_key = pattern.unwrap_or_default().into();
        })
    }

    pub fn find(&self, pattern: &str) -> Result<Outcome> {
        self.execute(Verb::Find, Shape::Key, |q| q.new_key = pattern.into())
    }

    pub fn search(&self, pattern: &str) -> Result<Outcome> {
        self.execute(Verb::Search, Shape::Key, |q| q.new_key = pattern.into())
    }

    pub fn count(&self, pattern: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::Count, Shape::Key, |q| {
            q.new_key = pattern.unwrap_or_default().into();
        })
    }

    // -------------------------------------------------------------------------
    // Generic
    // -------------------------------------------------------------------------

    pub fn delete(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::Delete, Shape::Key, |q| q.key = key.into())
    }

    pub fn exists(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::Exists, Shape::Key, |q| q.key = key.into())
    }

    pub fn rename(&self, key: &str, new_key: &str) -> Result<Outcome> {
        self.execute(Verb::Rename, Shape::Key, |q| {
            q.key = key.into();
            q.new_key = new_key.into();
        })
    }

    pub fn rename_nx(&self, key: &str, new_key: &str) -> Result<Outcome> {
        self.execute(Verb::RenameNx, Shape::Key, |q| {
            q.key = key.into();
            q.new_key = new_key.into();
        })
    }

    pub fn move_to(&self, key: &str, namespace: u32) -> Result<Outcome> {
        self.execute(Verb::Move, Shape::Key, |q| {
            q.key = key.into();
            q.target_namespace = namespace;
        })
    }

    pub fn copy(&self, key: &str, new_key: &str) -> Result<Outcome> {
        self.execute(Verb::Copy, Shape::Key, |q| {
            q.key = key.into();
            q.new_key = new_key.into();
        })
    }

    pub fn clone_to(&self, key: &str, namespace: u32) -> Result<Outcome> {
        self.execute(Verb::Clone, Shape::Key, |q| {
            q.key = key.into();
            q.target_namespace = namespace;
        })
    }

    pub fn transfer(&self, key: &str, database: &str) -> Result<Outcome> {
        let target = self.ctx.database(database)?;
        self.execute(Verb::Transfer, Shape::Key, |q| {
            q.key = key.into();
            q.target_db = Some(target);
        })
    }

    pub fn diff(&self, key: &str, other: &str) -> Result<Outcome> {
        self.execute(Verb::Diff, Shape::Key, |q| {
            q.key = key.into();
            q.new_key = other.into();
        })
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    pub fn expire(&self, key: &str, seconds: u64) -> Result<Outcome> {
        self.execute(Verb::Expire, Shape::Key, |q| {
            q.key = key.into();
            q.when = Some(seconds);
        })
    }

    pub fn expire_at(&self, key: &str, epoch: u64) -> Result<Outcome> {
        self.execute(Verb::ExpireAt, Shape::Key, |q| {
            q.key = key.into();
            q.when = Some(epoch);
        })
    }

    pub fn persist(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::Persist, Shape::Key, |q| q.key = key.into())
    }

    pub fn ttl(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::Ttl, Shape::Key, |q| q.key = key.into())
    }

    pub fn future(&self, key: &str, seconds: u64, value: &str) -> Result<Outcome> {
        self.execute(Verb::Future, Shape::Key, |q| {
            q.key = key.into();
            q.when = Some(seconds);
            q.value = value.into();
        })
    }

    // -------------------------------------------------------------------------
    // Arithmetic
    // -------------------------------------------------------------------------

    pub fn incr(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::Incr, Shape::Key, |q| q.key = key.into())
    }

    pub fn decr(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::Decr, Shape::Key, |q| q.key = key.into())
    }

    pub fn add(&self, key: &str, operand: &str) -> Result<Outcome> {
        self.arith(Verb::Add, key, operand)
    }

    pub fn sub(&self, key: &str, operand: &str) -> Result<Outcome> {
        self.arith(Verb::Sub, key, operand)
    }

    pub fn mult(&self, key: &str, operand: &str) -> Result<Outcome> {
        self.arith(Verb::Mult, key, operand)
    }

    pub fn div(&self, key: &str, operand: &str) -> Result<Outcome> {
        self.arith(Verb::Div, key, operand)
    }

    pub fn sqrt(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::Sqrt, Shape::Key, |q| q.key = key.into())
    }

    pub fn avg(&self, key: &str, operand: &str) -> Result<Outcome> {
        self.arith(Verb::Avg, key, operand)
    }

    fn arith(&self, verb: Verb, key: &str, operand: &str) -> Result<Outcome> {
        self.execute(verb, Shape::Key, |q| {
            q.key = key.into();
            q.value = operand.into();
        })
    }

    // -------------------------------------------------------------------------
    // Maps
    // -------------------------------------------------------------------------

    pub fn hset(&self, key: &str, field: &str, value: &str) -> Result<Outcome> {
        self.execute(Verb::HSet, Shape::Map, |q| {
            q.key = key.into();
            q.field = field.into();
            q.value = value.into();
        })
    }

    pub fn hget(&self, key: &str, field: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::HGet, Shape::Map, |q| {
            q.key = key.into();
            q.field = field.unwrap_or_default().into();
        })
    }

    pub fn hdel(&self, key: &str, field: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::HDel, Shape::Map, |q| {
            q.key = key.into();
            q.field = field.unwrap_or_default().into();
        })
    }

    pub fn hexists(&self, key: &str, field: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::HExists, Shape::Map, |q| {
            q.key = key.into();
            q.field = field.unwrap_or_default().into();
        })
    }

    pub fn hkeys(&self, pattern: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::HKeys, Shape::Map, |q| {
            q.new_key = pattern.unwrap_or_default().into();
        })
    }

    pub fn hsearch(&self, pattern: &str) -> Result<Outcome> {
        self.execute(Verb::HSearch, Shape::Map, |q| q.new_key = pattern.into())
    }

    pub fn hcount(&self, pattern: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::HCount, Shape::Map, |q| {
            q.new_key = pattern.unwrap_or_default().into();
        })
    }

    // -------------------------------------------------------------------------
    // Multimaps
    // -------------------------------------------------------------------------

    pub fn madd(&self, key: &str, field: &str, value: &str) -> Result<Outcome> {
        self.execute(Verb::MAdd, Shape::MultiMap, |q| {
            q.key = key.into();
            q.field = field.into();
            q.value = value.into();
        })
    }

    pub fn mget(&self, key: &str, field: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::MGet, Shape::MultiMap, |q| {
            q.key = key.into();
            q.field = field.unwrap_or_default().into();
        })
    }

    pub fn mdel(&self, key: &str, field: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::MDel, Shape::MultiMap, |q| {
            q.key = key.into();
            q.field = field.unwrap_or_default().into();
        })
    }

    pub fn mexists(&self, key: &str, field: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::MExists, Shape::MultiMap, |q| {
            q.key = key.into();
            q.field = field.unwrap_or_default().into();
        })
    }

    pub fn mkeys(&self, pattern: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::MKeys, Shape::MultiMap, |q| {
            q.new_key = pattern.unwrap_or_default().into();
        })
    }

    pub fn msearch(&self, pattern: &str) -> Result<Outcome> {
        self.execute(Verb::MSearch, Shape::MultiMap, |q| q.new_key = pattern.into())
    }

    pub fn mcount(&self, key: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::MCount, Shape::MultiMap, |q| {
            q.key = key.unwrap_or_default().into();
        })
    }

    // -------------------------------------------------------------------------
    // Lists / vectors
    // -------------------------------------------------------------------------

    pub fn list(&self) -> SeqOps<'_> {
        SeqOps {
            session: self,
            shape: Shape::List,
        }
    }

    pub fn vector(&self) -> SeqOps<'_> {
        SeqOps {
            session: self,
            shape: Shape::Vector,
        }
    }

    // -------------------------------------------------------------------------
    // Geo
    // -------------------------------------------------------------------------

    pub fn geo_add(&self, key: &str, latitude: f64, longitude: f64) -> Result<Outcome> {
        self.execute(Verb::GeoAdd, Shape::Geo, |q| {
            q.key = key.into();
            q.value = format!("{latitude}:{longitude}");
        })
    }

    pub fn geo_get(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::GeoGet, Shape::Geo, |q| q.key = key.into())
    }

    pub fn geo_del(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::GeoDel, Shape::Geo, |q| q.key = key.into())
    }

    /// Great-circle distance in kilometers between two stored points
    pub fn geo_calc(&self, key: &str, other: &str) -> Result<Outcome> {
        self.execute(Verb::GeoCalc, Shape::Geo, |q| {
            q.key = key.into();
            q.new_key = other.into();
        })
    }

    pub fn geo_find(&self, pattern: &str) -> Result<Outcome> {
        self.execute(Verb::GeoFind, Shape::Geo, |q| q.new_key = pattern.into())
    }

    pub fn geo_keys(&self, pattern: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::GeoKeys, Shape::Geo, |q| {
            q.new_key = pattern.unwrap_or_default().into();
        })
    }
}

/// List/vector verb family bound to one shape
pub struct SeqOps<'a> {
    session: &'a Session<'a>,
    shape: Shape,
}

impl SeqOps<'_> {
    fn execute(&self, verb: Verb, fill: impl FnOnce(&mut Query)) -> Result<Outcome> {
        self.session.execute(verb, self.shape, fill)
    }

    pub fn push(&self, key: &str, value: &str) -> Result<Outcome> {
        self.execute(Verb::LPush, |q| {
            q.key = key.into();
            q.value = value.into();
        })
    }

    pub fn pop_front(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::LPopFront, |q| q.key = key.into())
    }

    pub fn pop_back(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::LPopBack, |q| q.key = key.into())
    }

    /// A window of elements; `limit < 0` means "to the end"
    pub fn slice(&self, key: &str, offset: i64, limit: i64) -> Result<Outcome> {
        self.execute(Verb::LGet, |q| {
            q.key = key.into();
            q.offset = offset;
            q.limit = limit;
        })
    }

    /// The whole collection
    pub fn all(&self, key: &str) -> Result<Outcome> {
        self.slice(key, 0, -1)
    }

    pub fn set(&self, key: &str, index: i64, value: &str) -> Result<Outcome> {
        self.execute(Verb::LSet, |q| {
            q.key = key.into();
            q.offset = index;
            q.value = value.into();
        })
    }

    pub fn remove(&self, key: &str, value: &str, first_only: bool) -> Result<Outcome> {
        self.execute(Verb::LRem, |q| {
            q.key = key.into();
            q.value = value.into();
            q.flags.first_only = first_only;
        })
    }

    pub fn contains(&self, key: &str, value: &str) -> Result<Outcome> {
        self.execute(Verb::LExists, |q| {
            q.key = key.into();
            q.value = value.into();
        })
    }

    pub fn find(&self, key: &str, pattern: &str) -> Result<Outcome> {
        self.execute(Verb::LFind, |q| {
            q.key = key.into();
            q.new_key = pattern.into();
        })
    }

    pub fn sort(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::LSort, |q| q.key = key.into())
    }

    pub fn reverse(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::LReverse, |q| q.key = key.into())
    }

    pub fn resize(&self, key: &str, size: i64) -> Result<Outcome> {
        self.execute(Verb::LResize, |q| {
            q.key = key.into();
            q.limit = size;
        })
    }

    pub fn repeats(&self, key: &str, value: &str) -> Result<Outcome> {
        self.execute(Verb::LRepeats, |q| {
            q.key = key.into();
            q.value = value.into();
        })
    }

    pub fn stats(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::LStats, |q| q.key = key.into())
    }

    pub fn len(&self, key: &str) -> Result<Outcome> {
        self.execute(Verb::LLen, |q| q.key = key.into())
    }

    pub fn keys(&self, pattern: Option<&str>) -> Result<Outcome> {
        self.execute(Verb::LKeys, |q| {
            q.new_key = pattern.unwrap_or_default().into();
        })
    }
}
