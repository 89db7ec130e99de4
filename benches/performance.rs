//! Performance benchmarks for the active collection.

use active_collection::{
    ActiveCollection, ChangeEvent, CollectionConfig, Document, DocumentId, DocumentStore,
    MemoryStore, NoopObserver,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;

fn populated_store(count: i64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new("bench"));
    for i in 0..count {
        let doc = Document::from_value(json!({
            "_id": i,
            "title": format!("task {}", i),
            "done": i % 2 == 0,
        }))
        .unwrap();
        store.save(&doc).unwrap();
    }
    store
}

fn quiet(store: Arc<MemoryStore>) -> ActiveCollection {
    ActiveCollection::with_config(
        store,
        CollectionConfig {
            observer: Arc::new(NoopObserver),
            ..Default::default()
        },
    )
}

/// Benchmark a full load after flush with varying collection sizes
fn bench_reload(c: &mut Criterion) {
    let mut group = c.benchmark_group("reload");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("documents", size), &size, |b, &size| {
            let collection = quiet(populated_store(size));
            b.iter(|| {
                collection.flush();
                black_box(collection.len().unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark merging upsert events into a loaded collection
fn bench_event_merge(c: &mut Criterion) {
    let collection = quiet(populated_store(10_000));
    collection.ensure_loaded().unwrap();

    let changes = Document::from_value(json!({"done": true})).unwrap();
    let mut i = 0i64;

    c.bench_function("event_merge", |b| {
        b.iter(|| {
            i = (i + 1) % 10_000;
            black_box(collection.on_event(&ChangeEvent::upsert(i, changes.clone())));
        });
    });
}

/// Benchmark cached point reads
fn bench_get(c: &mut Criterion) {
    let collection = quiet(populated_store(10_000));
    collection.ensure_loaded().unwrap();
    let id = DocumentId::Int(5_000);

    c.bench_function("get", |b| {
        b.iter(|| black_box(collection.get(&id).unwrap()));
    });
}

criterion_group!(benches, bench_reload, bench_event_merge, bench_get);
criterion_main!(benches);
