//! Music RAG Search Benchmarks
//!
//! Benchmarks for core retrieval operations using Criterion.
//! Run with: cargo bench -p music-rag-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use music_rag_core::embeddings::cosine_similarity;
use music_rag_core::search::fuse_modalities;
use music_rag_core::store::{
    MemoryVectorStore, MetadataFilter, MetadataRecord, MetadataValue, Modality, StoreHit,
    VectorStore,
};

const GENRES: [&str; 5] = ["Jazz", "Rock", "Blues", "Folk", "Electronic"];

fn hits(offset: usize, count: usize) -> Vec<StoreHit> {
    (0..count)
        .map(|i| StoreHit {
            id: format!("track-{}", offset + i),
            distance: i as f32 / count as f32,
            metadata: None,
        })
        .collect()
}

fn record(i: usize) -> MetadataRecord {
    let mut record = MetadataRecord::new();
    record.insert("genre".to_string(), MetadataValue::from(GENRES[i % GENRES.len()]));
    record.insert(
        "mood".to_string(),
        MetadataValue::from(vec!["calm".to_string(), format!("mood-{}", i % 7)]),
    );
    record.insert("tempo".to_string(), MetadataValue::from((60 + i % 100) as f64));
    record
}

fn embedding(seed: usize, dims: usize) -> Vec<f32> {
    (0..dims).map(|j| ((seed * dims + j) as f32).sin()).collect()
}

fn bench_fuse_modalities(c: &mut Criterion) {
    let text = hits(0, 40);
    let audio = hits(20, 40);

    c.bench_function("fuse_40x40", |b| {
        b.iter(|| {
            black_box(fuse_modalities(&text, &audio, 0.7, 20));
        })
    });
}

fn bench_filter_matching(c: &mut Criterion) {
    let records: Vec<MetadataRecord> = (0..1000).map(record).collect();
    let filter = MetadataFilter::new()
        .with_any_of("genre", ["Jazz", "Blues"])
        .with_exact("mood", "calm");

    c.bench_function("filter_match_1000", |b| {
        b.iter(|| {
            black_box(records.iter().filter(|r| filter.matches(r)).count());
        })
    });
}

fn bench_memory_store_query(c: &mut Criterion) {
    let store = MemoryVectorStore::new();
    for i in 0..2000 {
        let id = format!("track-{i}");
        store
            .upsert(&id, Some(&embedding(i, 384)), None, Some(&record(i)))
            .unwrap();
    }
    let query = embedding(4242, 384);
    let filter = MetadataFilter::new().with_any_of("genre", ["Jazz"]);

    c.bench_function("memory_query_2000x384", |b| {
        b.iter(|| {
            black_box(store.query(Modality::Text, &query, 20, None).unwrap());
        })
    });

    c.bench_function("memory_filtered_query_2000x384", |b| {
        b.iter(|| {
            black_box(store.query(Modality::Text, &query, 20, Some(&filter)).unwrap());
        })
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a = embedding(1, 384);
    let b = embedding(2, 384);

    c.bench_function("cosine_similarity_384d", |b_bench| {
        b_bench.iter(|| {
            black_box(cosine_similarity(&a, &b));
        })
    });
}

criterion_group!(
    benches,
    bench_fuse_modalities,
    bench_filter_matching,
    bench_memory_store_query,
    bench_cosine_similarity,
);
criterion_main!(benches);
