use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use elemdex::collection::cache::CollectionCache;
use elemdex::collection::collection::{Collection, CollectionMetadata};
use elemdex::core::types::CollectionId;
use rand::Rng;
use std::sync::Arc;

fn collections(count: u16) -> Vec<Arc<Collection>> {
    (0..count)
        .map(|id| Arc::new(Collection::new(CollectionMetadata::new(CollectionId(id), &format!("/db/c{}", id)))))
        .collect()
}

fn bench_add_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_cache_add");
    for capacity in [16, 64, 256] {
        let pool = collections(4 * capacity as u16);
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            let mut rng = rand::thread_rng();
            let mut cache = CollectionCache::new(capacity, usize::MAX);
            b.iter(|| {
                let collection = pool[rng.gen_range(0..pool.len())].clone();
                black_box(cache.add(collection, 1).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let pool = collections(64);
    let mut cache = CollectionCache::new(64, usize::MAX);
    for collection in &pool {
        cache.add(collection.clone(), 1).unwrap();
    }
    let names: Vec<String> = pool.iter().map(|c| c.name().to_string()).collect();

    c.bench_function("collection_cache_get_by_name", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let name = &names[rng.gen_range(0..names.len())];
            black_box(cache.get_by_name(name))
        });
    });
}

criterion_group!(benches, bench_add_with_eviction, bench_lookup);
criterion_main!(benches);
