//! Storage Benchmarks
//!
//! Measures the memory adapter through the engine facade under the
//! workloads the calling system leans on: scalar reads/writes, counter
//! increments, and the leaderboard path (zadd + zrevrange).

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use polystore::{StorageEngine, StoreConfig};
use serde_json::json;
use tokio::runtime::Runtime;

fn engine(rt: &Runtime) -> StorageEngine {
    rt.block_on(StorageEngine::connect(StoreConfig::memory()))
        .expect("memory engine")
}

/// Benchmark scalar SET and GET operations
fn bench_kv(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = engine(&rt);

    // Pre-populate for the read path
    rt.block_on(async {
        for i in 0..10_000 {
            store
                .set(&format!("key:{i}"), &json!(format!("value:{i}")), None)
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("kv");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(store.set(&format!("bench:{i}"), &json!("value"), None))
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            black_box(rt.block_on(store.get(&key)).unwrap());
            i += 1;
        });
    });

    group.bench_function("increment", |b| {
        b.iter(|| {
            black_box(rt.block_on(store.increment("counter", 1)).unwrap());
        });
    });

    group.finish();
}

/// Benchmark the leaderboard path
fn bench_leaderboard(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = engine(&rt);

    rt.block_on(async {
        for i in 0..10_000 {
            store
                .zadd("lb", (i % 977) as f64, &format!("user:{i}"))
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("leaderboard");
    group.throughput(Throughput::Elements(1));

    group.bench_function("zadd_update", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let member = format!("user:{}", i % 10_000);
            rt.block_on(store.zadd("lb", (i % 1013) as f64, &member))
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("zrevrange_top10", |b| {
        b.iter(|| {
            black_box(rt.block_on(store.zrevrange("lb", 0, 9)).unwrap());
        });
    });

    group.bench_function("zrank", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let member = format!("user:{}", i % 10_000);
            black_box(rt.block_on(store.zrank("lb", &member)).unwrap());
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_kv, bench_leaderboard);
criterion_main!(benches);
