//! Benchmarks for Hexad query execution

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::tempdir;

use hexad::{Config, StorageContext};

fn query_benchmarks(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let config = Config::builder().data_dir(dir.path()).build();
    let ctx = StorageContext::open(config).unwrap();
    let session = ctx.session("bench", 1).unwrap();

    c.bench_function("scalar_set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            session.set(&format!("key{i}"), "value").unwrap()
        });
    });

    session.set("read_target", "value").unwrap();
    c.bench_function("scalar_get", |b| {
        b.iter(|| session.get("read_target").unwrap());
    });

    c.bench_function("incr", |b| {
        b.iter(|| session.incr("counter").unwrap());
    });

    for i in 0..1000u32 {
        session.set(&format!("scan{i:04}"), "v").unwrap();
    }
    c.bench_function("keys_scan_1000", |b| {
        b.iter(|| session.keys(Some("scan*")).unwrap());
    });

    c.bench_function("list_push_pop", |b| {
        b.iter_batched(
            || (),
            |_| {
                session.list().push("bench_list", "x").unwrap();
                session.list().pop_back("bench_list").unwrap()
            },
            BatchSize::SmallInput,
        );
    });

    session.geo_add("a", 48.8566, 2.3522).unwrap();
    session.geo_add("b", 51.5074, -0.1278).unwrap();
    c.bench_function("geo_calc", |b| {
        b.iter(|| session.geo_calc("a", "b").unwrap());
    });
}

criterion_group!(benches, query_benchmarks);
criterion_main!(benches);
