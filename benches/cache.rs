//! Benchmarks for the answer cache.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use whack::cache::{AnswerCache, QueryKey};

const PAYLOAD: [u8; 96] = [0u8; 96];

fn query_keys(count: usize) -> Vec<QueryKey> {
    (0..count)
        .map(|i| QueryKey::new(&format!("host{i}.example.com"), 1, 1).unwrap())
        .collect()
}

fn filled_cache(keys: &[QueryKey], now: Instant) -> AnswerCache {
    let capacity = NonZeroUsize::new(keys.len()).unwrap();
    let mut cache = AnswerCache::new(capacity, Duration::from_secs(3600));
    for (i, key) in keys.iter().enumerate() {
        let ttl = Duration::from_secs(60 + (i % 600) as u64);
        cache.insert(key.clone(), PAYLOAD.to_vec(), Some(ttl), now).unwrap();
    }
    cache
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_lookup");
    let now = Instant::now();

    for size in [1_000, 10_000, 100_000] {
        let keys = query_keys(size);
        let mut cache = filled_cache(&keys, now);
        let miss = QueryKey::new("absent.example.com", 1, 1).unwrap();

        group.bench_with_input(BenchmarkId::new("hit", size), &keys, |b, keys| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % keys.len();
                black_box(cache.lookup(black_box(&keys[i]), now).is_some())
            });
        });

        group.bench_with_input(BenchmarkId::new("miss", size), &miss, |b, miss| {
            b.iter(|| black_box(cache.lookup(black_box(miss), now).is_none()));
        });
    }

    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_insert");
    let now = Instant::now();

    let keys = query_keys(10_000);
    group.bench_function("replace", |b| {
        let mut cache = filled_cache(&keys, now);
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            cache
                .insert(keys[i].clone(), PAYLOAD.to_vec(), None, now)
                .unwrap();
        });
    });

    let fresh = query_keys(20_000);
    group.bench_function("evict", |b| {
        let mut cache = filled_cache(&fresh[..10_000], now);
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % fresh.len();
            cache
                .insert(fresh[i].clone(), PAYLOAD.to_vec(), None, now)
                .unwrap();
        });
    });

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let now = Instant::now();
    let keys = query_keys(10_000);

    c.bench_function("cache_sweep_10k", |b| {
        b.iter_batched(
            || filled_cache(&keys, now),
            |mut cache| black_box(cache.sweep(now + Duration::from_secs(3600))),
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_lookup, bench_insert, bench_sweep);
criterion_main!(benches);
