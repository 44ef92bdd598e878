//! Integration tests for Hexad
//!
//! End-to-end coverage through the storage context and typed facade: every
//! collection shape, the timer lifecycle, and the chunked scan protocol.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::tempdir;

use hexad::exec::ChannelSink;
use hexad::{Access, Config, Query, Reply, ReplySink, Shape, StorageContext, Verb};

fn open(dir: &std::path::Path) -> StorageContext {
    let config = Config::builder().data_dir(dir).build();
    StorageContext::open(config).unwrap()
}

// =============================================================================
// Scalar Tests
// =============================================================================

#[test]
fn set_get_roundtrip() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    assert!(s.set("greeting", "hello").unwrap().is_ok());
    let got = s.get("greeting").unwrap();
    assert_eq!(got.access, Access::Ok);
    assert_eq!(got.scalar.as_deref(), Some("hello"));

    assert_eq!(s.get("absent").unwrap().access, Access::NotFound);
}

#[test]
fn setnx_respects_existing_entry() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    assert!(s.set_nx("k", "first").unwrap().is_ok());
    assert_eq!(s.set_nx("k", "second").unwrap().access, Access::EntryExists);
    assert_eq!(s.get("k").unwrap().scalar.as_deref(), Some("first"));
}

#[test]
fn namespaces_are_disjoint() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let a = ctx.session("events", 1).unwrap();
    let b = ctx.session("events", 2).unwrap();

    a.set("k", "one").unwrap();
    assert_eq!(b.get("k").unwrap().access, Access::NotFound);
}

#[test]
fn values_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let ctx = open(dir.path());
        let s = ctx.session("events", 1).unwrap();
        s.set("persisted", "yes").unwrap();
        ctx.shutdown().unwrap();
    }
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();
    assert_eq!(s.get("persisted").unwrap().scalar.as_deref(), Some("yes"));
}

// =============================================================================
// Keyspace Listing Tests
// =============================================================================

#[test]
fn keys_filters_by_pattern() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    for key in ["user:1", "user:2", "order:1"] {
        s.set(key, "x").unwrap();
    }
    let mut matched = s.keys(Some("user*")).unwrap().items;
    matched.sort();
    assert_eq!(matched, vec!["user:1", "user:2"]);

    let count = s.count(Some("user*")).unwrap();
    assert_eq!(count.scalar.as_deref(), Some("2"));
}

#[test]
fn search_filters_on_values() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.set("a", "apple").unwrap();
    s.set("b", "banana").unwrap();
    let pairs = s.search("app*").unwrap().pairs;
    assert_eq!(pairs, vec![("a".to_string(), "apple".to_string())]);
}

#[test]
fn scans_stream_in_chunks() {
    let dir = tempdir().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .scan_chunk_size(10)
        .build();
    let ctx = StorageContext::open(config).unwrap();
    let db = ctx.database("events").unwrap();

    let s = ctx.session("events", 1).unwrap();
    for i in 0..25 {
        s.set(&format!("key{i:03}"), "v").unwrap();
    }

    let (sink, rx) = ChannelSink::pair();
    let mut query = Query::new(Verb::Keys, Shape::Key, sink);
    query.db = Some(db);
    query.namespace = 1;
    ctx.submit(query).unwrap();

    let mut replies = Vec::new();
    for reply in rx {
        let terminal = !reply.partial;
        replies.push(reply);
        if terminal {
            break;
        }
    }

    // 25 keys at 10 per chunk: exactly 3 replies, last one terminal
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0].items.len(), 10);
    assert_eq!(replies[1].items.len(), 10);
    assert_eq!(replies[2].items.len(), 5);
    assert!(replies[0].partial && replies[1].partial);
    assert!(!replies[2].partial);
    assert_eq!(
        replies.iter().map(|r| r.subresult).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let total: usize = replies.iter().map(|r| r.items.len()).sum();
    assert_eq!(total, 25);
}

// =============================================================================
// Generic Verb Tests
// =============================================================================

#[test]
fn delete_works_across_shapes() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.set("scalar", "v").unwrap();
    s.madd("members", "a", "1").unwrap();
    s.madd("members", "b", "2").unwrap();
    s.list().push("seq", "x").unwrap();

    for key in ["scalar", "members", "seq"] {
        assert!(s.exists(key).unwrap().is_ok(), "key = {key}");
        assert!(s.delete(key).unwrap().is_ok(), "key = {key}");
        assert_eq!(s.exists(key).unwrap().access, Access::NotFound, "key = {key}");
    }
    assert_eq!(s.delete("scalar").unwrap().access, Access::NotFound);
}

#[test]
fn rename_moves_value_and_timer() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.set("old", "v").unwrap();
    s.expire("old", 1000).unwrap();
    assert!(s.rename("old", "new").unwrap().is_ok());

    assert_eq!(s.get("old").unwrap().access, Access::NotFound);
    assert_eq!(s.get("new").unwrap().scalar.as_deref(), Some("v"));
    assert_eq!(s.ttl("old").unwrap().scalar.as_deref(), Some("-1"));
    assert_ne!(s.ttl("new").unwrap().scalar.as_deref(), Some("-1"));
}

#[test]
fn renamenx_rejects_occupied_target() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.set("a", "1").unwrap();
    s.set("b", "2").unwrap();
    assert_eq!(s.rename_nx("a", "b").unwrap().access, Access::EntryExists);
    assert_eq!(s.get("a").unwrap().scalar.as_deref(), Some("1"));
}

#[test]
fn move_and_copy_between_namespaces() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let a = ctx.session("events", 1).unwrap();
    let b = ctx.session("events", 2).unwrap();

    a.set("k", "v").unwrap();
    a.move_to("k", 2).unwrap();
    assert_eq!(a.get("k").unwrap().access, Access::NotFound);
    assert_eq!(b.get("k").unwrap().scalar.as_deref(), Some("v"));

    b.clone_to("k", 1).unwrap();
    assert_eq!(a.get("k").unwrap().scalar.as_deref(), Some("v"));
    assert_eq!(b.get("k").unwrap().scalar.as_deref(), Some("v"));
}

#[test]
fn transfer_crosses_databases() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let src = ctx.session("alpha", 1).unwrap();

    src.set("k", "v").unwrap();
    assert!(src.transfer("k", "beta").unwrap().is_ok());
    assert_eq!(src.get("k").unwrap().access, Access::NotFound);

    let dst = ctx.session("beta", 1).unwrap();
    assert_eq!(dst.get("k").unwrap().scalar.as_deref(), Some("v"));
}

#[test]
fn diff_reports_list_difference() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    for v in ["a", "b", "c"] {
        s.list().push("x", v).unwrap();
    }
    for v in ["b", "c", "d"] {
        s.list().push("y", v).unwrap();
    }
    assert_eq!(s.diff("x", "y").unwrap().items, vec!["a", "d"]);
}

// =============================================================================
// Timer Tests
// =============================================================================

#[test]
fn expire_removes_key_on_flush() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.set("doomed", "v").unwrap();
    assert!(s.expire("doomed", 0).unwrap().is_ok());
    ctx.flush_timers();
    assert_eq!(s.get("doomed").unwrap().access, Access::NotFound);
}

#[test]
fn expire_on_missing_key_reports_not_found() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();
    assert_eq!(s.expire("ghost", 10).unwrap().access, Access::NotFound);
}

#[test]
fn persist_cancels_expiration() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.set("k", "v").unwrap();
    s.expire("k", 0).unwrap();
    assert!(s.persist("k").unwrap().is_ok());
    ctx.flush_timers();
    assert_eq!(s.get("k").unwrap().scalar.as_deref(), Some("v"));

    assert_eq!(s.persist("k").unwrap().access, Access::NotFound);
}

#[test]
fn future_promotes_staged_value() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    assert!(s.future("k", 0, "staged:value").unwrap().is_ok());
    assert_eq!(s.get("k").unwrap().access, Access::NotFound);
    ctx.flush_timers();
    assert_eq!(s.get("k").unwrap().scalar.as_deref(), Some("staged:value"));
}

#[test]
fn timers_fire_under_sustained_traffic() {
    let dir = tempdir().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .timer_flush_interval(Duration::from_millis(50))
        .build();
    let ctx = StorageContext::open(config).unwrap();
    let s = ctx.session("events", 1).unwrap();

    s.set("doomed", "v").unwrap();
    s.expire("doomed", 0).unwrap();

    // Keep the worker queue hot for several flush intervals; the due timer
    // must fire between queries, not only when the queue goes idle
    let deadline = Instant::now() + Duration::from_millis(400);
    while Instant::now() < deadline {
        s.get("keepalive").unwrap();
    }
    assert_eq!(s.get("doomed").unwrap().access, Access::NotFound);
}

#[test]
fn timers_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let ctx = open(dir.path());
        let s = ctx.session("events", 1).unwrap();
        s.set("doomed", "v").unwrap();
        s.expire("doomed", 0).unwrap();
        ctx.shutdown().unwrap();
    }
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();
    ctx.flush_timers();
    assert_eq!(s.get("doomed").unwrap().access, Access::NotFound);
}

// =============================================================================
// Arithmetic Tests
// =============================================================================

#[test]
fn arithmetic_treats_absent_as_zero() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    assert_eq!(s.incr("n").unwrap().scalar.as_deref(), Some("1"));
    assert_eq!(s.incr("n").unwrap().scalar.as_deref(), Some("2"));
    assert_eq!(s.add("n", "8").unwrap().scalar.as_deref(), Some("10"));
    assert_eq!(s.div("n", "4").unwrap().scalar.as_deref(), Some("2.5"));
    assert_eq!(s.decr("m").unwrap().scalar.as_deref(), Some("-1"));
}

#[test]
fn arithmetic_rejects_non_numeric() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.set("text", "hello").unwrap();
    assert_eq!(s.incr("text").unwrap().access, Access::NotNumeric);
    assert_eq!(s.get("text").unwrap().scalar.as_deref(), Some("hello"));
    assert_eq!(s.add("n", "nope").unwrap().access, Access::NotNumeric);
    assert_eq!(s.div("n", "0").unwrap().access, Access::NotNumeric);

    s.set("neg", "-4").unwrap();
    assert_eq!(s.sqrt("neg").unwrap().access, Access::NotNumeric);
}

// =============================================================================
// Map Tests
// =============================================================================

#[test]
fn map_holds_one_field_per_key() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.hset("profile", "name", "ada").unwrap();
    s.hset("profile", "email", "ada@example.com").unwrap();

    let pairs = s.hget("profile", None).unwrap().pairs;
    assert_eq!(
        pairs,
        vec![("email".to_string(), "ada@example.com".to_string())]
    );
    assert_eq!(s.hexists("profile", Some("name")).unwrap().access, Access::NotFound);
}

#[test]
fn map_field_lookup_and_delete() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.hset("profile", "name", "ada").unwrap();
    assert_eq!(
        s.hget("profile", Some("name")).unwrap().scalar.as_deref(),
        Some("ada")
    );
    assert!(s.hdel("profile", None).unwrap().is_ok());
    assert_eq!(s.hget("profile", None).unwrap().access, Access::NotFound);
}

// =============================================================================
// Multimap Tests
// =============================================================================

#[test]
fn multimap_members_roundtrip() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.madd("tags", "color", "red").unwrap();
    s.madd("tags", "size", "xl").unwrap();
    assert_eq!(s.madd("tags", "color", "blue").unwrap().access, Access::EntryExists);

    let pairs = s.mget("tags", None).unwrap().pairs;
    assert_eq!(
        pairs,
        vec![
            ("color".to_string(), "red".to_string()),
            ("size".to_string(), "xl".to_string()),
        ]
    );
    assert_eq!(s.mcount(Some("tags")).unwrap().scalar.as_deref(), Some("2"));

    assert!(s.mdel("tags", Some("color")).unwrap().is_ok());
    assert_eq!(s.mexists("tags", Some("color")).unwrap().access, Access::NotFound);
    assert!(s.mexists("tags", None).unwrap().is_ok());
}

#[test]
fn mkeys_lists_each_key_once() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.madd("tags", "a", "1").unwrap();
    s.madd("tags", "b", "2").unwrap();
    s.madd("labels", "a", "1").unwrap();

    let mut keys = s.mkeys(None).unwrap().items;
    keys.sort();
    assert_eq!(keys, vec!["labels", "tags"]);
}

// =============================================================================
// List / Vector Tests
// =============================================================================

#[test]
fn list_push_preserves_order() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    for v in ["first", "second", "third"] {
        s.list().push("seq", v).unwrap();
    }
    assert_eq!(s.list().all("seq").unwrap().items, vec!["first", "second", "third"]);
    assert_eq!(s.list().len("seq").unwrap().scalar.as_deref(), Some("3"));

    assert_eq!(
        s.list().pop_front("seq").unwrap().scalar.as_deref(),
        Some("first")
    );
    assert_eq!(
        s.list().pop_back("seq").unwrap().scalar.as_deref(),
        Some("third")
    );
}

#[test]
fn emptied_list_key_disappears() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.list().push("seq", "only").unwrap();
    s.list().pop_front("seq").unwrap();
    assert_eq!(s.exists("seq").unwrap().access, Access::NotFound);
    assert_eq!(s.list().pop_front("seq").unwrap().access, Access::NotFound);
}

#[test]
fn list_sort_and_stats() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    for v in ["30", "1", "200"] {
        s.list().push("nums", v).unwrap();
    }
    s.list().sort("nums").unwrap();
    assert_eq!(s.list().all("nums").unwrap().items, vec!["1", "30", "200"]);

    let stats = s.list().stats("nums").unwrap().pairs;
    assert!(stats.contains(&("sum".to_string(), "231".to_string())));
    assert!(stats.contains(&("min".to_string(), "1".to_string())));
    assert!(stats.contains(&("max".to_string(), "200".to_string())));
}

#[test]
fn list_values_with_delimiters_roundtrip() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    for v in ["a:b", "c\\d", "::"] {
        s.list().push("tricky", v).unwrap();
    }
    assert_eq!(s.list().all("tricky").unwrap().items, vec!["a:b", "c\\d", "::"]);
}

#[test]
fn vectors_are_separate_from_lists() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    s.list().push("k", "from-list").unwrap();
    s.vector().push("k", "from-vector").unwrap();
    assert_eq!(s.list().all("k").unwrap().items, vec!["from-list"]);
    assert_eq!(s.vector().all("k").unwrap().items, vec!["from-vector"]);
}

#[test]
fn list_remove_and_resize() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    for v in ["a", "b", "a", "c", "a"] {
        s.list().push("seq", v).unwrap();
    }
    let removed = s.list().remove("seq", "a", true).unwrap();
    assert_eq!(removed.scalar.as_deref(), Some("1"));
    let removed = s.list().remove("seq", "a", false).unwrap();
    assert_eq!(removed.scalar.as_deref(), Some("2"));

    s.list().resize("seq", 1).unwrap();
    assert_eq!(s.list().all("seq").unwrap().items, vec!["b"]);
}

// =============================================================================
// Geo Tests
// =============================================================================

#[test]
fn geo_roundtrip_and_distance() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    assert!(s.geo_add("paris", 48.8566, 2.3522).unwrap().is_ok());
    assert!(s.geo_add("london", 51.5074, -0.1278).unwrap().is_ok());
    assert_eq!(
        s.geo_get("paris").unwrap().scalar.as_deref(),
        Some("48.8566:2.3522")
    );

    let distance: f64 = s
        .geo_calc("paris", "london")
        .unwrap()
        .scalar
        .unwrap()
        .parse()
        .unwrap();
    assert!((distance - 344.0).abs() < 5.0, "got {distance}");

    assert!(s.geo_del("paris").unwrap().is_ok());
    assert_eq!(s.geo_get("paris").unwrap().access, Access::NotFound);
}

#[test]
fn geo_rejects_out_of_range_coordinates() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();
    assert_eq!(s.geo_add("bad", 91.0, 0.0).unwrap().access, Access::NotNumeric);
    assert_eq!(s.geo_add("bad", 0.0, -181.0).unwrap().access, Access::NotNumeric);
}

// =============================================================================
// Context Tests
// =============================================================================

#[test]
fn submit_after_shutdown_is_rejected() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    ctx.shutdown().unwrap();

    let (sink, _rx) = ChannelSink::pair();
    let query = Query::new(Verb::Get, Shape::Key, sink);
    assert!(ctx.submit(query).is_err());
}

#[test]
fn query_without_database_is_broken() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());

    let (sink, rx) = ChannelSink::pair();
    let mut query = Query::new(Verb::Get, Shape::Key, sink);
    query.key = "k".into();
    ctx.submit(query).unwrap();
    let reply = rx.recv().unwrap();
    assert_eq!(reply.access, Access::Broken);
}

/// Sink whose client has already gone away; replies still land on a channel
/// so the test can inspect what the scan delivered before giving up.
struct GoneSink {
    tx: Mutex<mpsc::Sender<Reply>>,
}

impl GoneSink {
    fn pair() -> (Arc<Self>, mpsc::Receiver<Reply>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self { tx: Mutex::new(tx) }), rx)
    }
}

impl ReplySink for GoneSink {
    fn deliver(&self, reply: Reply) {
        let _ = self.tx.lock().unwrap().send(reply);
    }

    fn connected(&self) -> bool {
        false
    }
}

#[test]
fn scan_aborts_for_disconnected_client() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let db = ctx.database("events").unwrap();

    let s = ctx.session("events", 1).unwrap();
    for i in 0..5 {
        s.set(&format!("key{i}"), "v").unwrap();
    }

    let (sink, rx) = GoneSink::pair();
    let mut query = Query::new(Verb::Keys, Shape::Key, sink);
    query.db = Some(db);
    query.namespace = 1;
    ctx.submit(query).unwrap();

    // The disconnect is seen before the first row, so the one and only
    // reply is the terminal abort with nothing streamed ahead of it
    let reply = rx.recv().unwrap();
    assert_eq!(reply.access, Access::Interrupted);
    assert!(!reply.partial);
    assert!(reply.items.is_empty());
}

#[test]
fn scan_aborts_while_paused() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path());
    let s = ctx.session("events", 1).unwrap();

    for i in 0..5 {
        s.set(&format!("key{i}"), "v").unwrap();
    }

    ctx.pause();
    assert_eq!(s.keys(None).unwrap().access, Access::Interrupted);

    ctx.resume();
    let listing = s.keys(None).unwrap();
    assert_eq!(listing.access, Access::Ok);
    assert_eq!(listing.items.len(), 5);
}
