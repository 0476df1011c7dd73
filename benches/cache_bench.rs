//! Cache hot-path benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use graphmem::cache::{AdaptiveLruCache, ClockCache};

fn bench_clock_get_hit(c: &mut Criterion) {
    let cache: ClockCache<u64, u64> = ClockCache::new("bench-nodes", 1024).unwrap();
    for i in 0..1024 {
        cache.put(i, Arc::new(i));
    }

    c.bench_function("clock_get_hit", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 7) % 1024;
            black_box(cache.get(&key));
        })
    });
}

fn bench_clock_put_churn(c: &mut Criterion) {
    let cache: ClockCache<u64, u64> = ClockCache::new("bench-nodes", 256).unwrap();

    c.bench_function("clock_put_churn", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key += 1;
            cache.put(black_box(key), Arc::new(key));
        })
    });
}

fn bench_lru_get_hit(c: &mut Criterion) {
    let cache: AdaptiveLruCache<u64, u64> = AdaptiveLruCache::new("bench-nodes", 1024).unwrap();
    for i in 0..1024 {
        cache.put(i, Arc::new(i));
    }

    c.bench_function("lru_get_hit", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 7) % 1024;
            black_box(cache.get(&key));
        })
    });
}

criterion_group!(
    benches,
    bench_clock_get_hit,
    bench_clock_put_churn,
    bench_lru_get_hit
);
criterion_main!(benches);
