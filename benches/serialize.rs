#![allow(missing_docs)]

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use featwire::{FeatureExample, Featwire, ReferenceEngine, SimpleLabel};
use std::collections::HashMap;
use std::hint::black_box;
use std::sync::Arc;

#[derive(Clone, FeatureExample, PartialEq, Eq, Hash)]
struct BenchUser {
    #[featwire(namespace = "user", group = 'u')]
    age: u32,
    #[featwire(namespace = "user", group = 'u', strings = "split")]
    interests: String,
}

#[derive(Clone, FeatureExample)]
struct BenchExample {
    #[featwire(label)]
    label: SimpleLabel,
    user: BenchUser,
    #[featwire(namespace = "emb", anchor)]
    embedding: Vec<f32>,
    #[featwire(namespace = "kw")]
    keywords: HashMap<String, f32>,
}

fn generate_data(count: usize) -> Vec<BenchExample> {
    (0..count)
        .map(|i| BenchExample {
            label: SimpleLabel::new((i % 2) as f32),
            user: BenchUser {
                age: (i % 90) as u32,
                interests: format!("sports music topic{}", i % 50),
            },
            embedding: (0..64).map(|j| ((i + j) % 7) as f32 * 0.25).collect(),
            keywords: (0..8).map(|k| (format!("kw{k}"), k as f32 + 0.5)).collect(),
        })
        .collect()
}

// --- BENCHMARKS ---

fn bench_serializers(c: &mut Criterion) {
    let item_count = 10_000;
    let data = generate_data(item_count);
    let engine = Arc::new(ReferenceEngine::new());

    let mut group = c.benchmark_group("Serialize");
    group.throughput(Throughput::Elements(item_count as u64));

    let native = Featwire::builder()
        .build::<BenchExample>(engine.clone())
        .expect("schema compiles");
    group.bench_function("native", |b| {
        b.iter(|| {
            for example in &data {
                black_box(native.serialize(black_box(example)).expect("serialize"));
            }
        })
    });

    let both = Featwire::builder()
        .text(true)
        .build::<BenchExample>(engine.clone())
        .expect("schema compiles");
    group.bench_function("native_and_text", |b| {
        b.iter(|| {
            for example in &data {
                black_box(both.serialize(black_box(example)).expect("serialize"));
            }
        })
    });

    group.bench_function("native_parallel_batch", |b| {
        b.iter(|| black_box(native.serialize_batch(black_box(&data)).expect("batch")))
    });

    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let users: Vec<BenchUser> = generate_data(1_000).into_iter().map(|e| e.user).collect();
    let engine = Arc::new(ReferenceEngine::new());

    let mut group = c.benchmark_group("Cache");
    group.throughput(Throughput::Elements(users.len() as u64));

    let cached = Featwire::builder()
        .cache_max_entries(512)
        .build_cached::<BenchUser>(engine.clone())
        .expect("schema compiles");
    group.bench_function("cached_hits", |b| {
        b.iter(|| {
            for user in &users {
                black_box(cached.serialize(black_box(user)).expect("serialize"));
            }
        })
    });

    let uncached = Featwire::builder()
        .build::<BenchUser>(engine)
        .expect("schema compiles");
    group.bench_function("uncached", |b| {
        b.iter(|| {
            for user in &users {
                black_box(uncached.serialize(black_box(user)).expect("serialize"));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_serializers, bench_cache);
criterion_main!(benches);
