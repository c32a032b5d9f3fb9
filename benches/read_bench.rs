// Read performance benchmarks for segdex

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use segdex::{Document, Index, IndexSort, MemoryStore, Options, SortField, Term};
use std::hint::black_box;
use std::sync::Arc;

fn populated_index(segments: usize, docs_per_segment: usize) -> Index {
    let options = Options::default()
        .index_sort(IndexSort::new(vec![SortField::descending("v")]))
        .auto_merge(false);
    let index = Index::open_with_store(Arc::new(MemoryStore::new()), options).unwrap();
    let mut rng = rand::rng();

    for s in 0..segments {
        for i in 0..docs_per_segment {
            index
                .add_document(
                    Document::new()
                        .with_numeric("v", rng.random_range(0..10_000))
                        .with_stored("key", format!("key{:04}_{:06}", s, i)),
                )
                .unwrap();
        }
        index.flush().unwrap();
    }
    index
}

fn benchmark_numeric_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_lookup");

    for segments in [1, 8].iter() {
        let index = populated_index(*segments, 1000);
        let snapshot = index.snapshot();
        let num_docs = snapshot.num_docs();

        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::from_parameter(segments), segments, |b, _| {
            let mut rng = rand::rng();
            b.iter(|| {
                for _ in 0..1000 {
                    let id = rng.random_range(0..num_docs);
                    black_box(snapshot.numeric_value(id, "v").unwrap());
                }
            });
        });
    }

    group.finish();
}

fn benchmark_stored_fields(c: &mut Criterion) {
    let mut group = c.benchmark_group("stored_fields");

    let index = populated_index(4, 1000);
    let snapshot = index.snapshot();

    group.throughput(Throughput::Elements(1000));
    group.bench_function("sequential", |b| {
        b.iter(|| {
            for id in 0..1000 {
                black_box(snapshot.stored_fields(id).unwrap());
            }
        });
    });

    group.finish();
}

fn benchmark_search_sorted(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_sorted");

    for segments in [1, 8].iter() {
        let index = populated_index(*segments, 1000);
        let snapshot = index.snapshot();
        let sort = index.options().index_sort.clone();

        group.throughput(Throughput::Elements(snapshot.num_docs()));
        group.bench_with_input(BenchmarkId::from_parameter(segments), segments, |b, _| {
            b.iter(|| black_box(snapshot.search_sorted(&sort, 10).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_find_term(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_term");

    let index = populated_index(4, 1000);
    let snapshot = index.snapshot();

    group.bench_function("present", |b| {
        let term = Term::stored("key", "key0002_000500");
        b.iter(|| black_box(snapshot.find(&term).unwrap()));
    });

    // Field absent from every segment schema
    group.bench_function("missing_field", |b| {
        let term = Term::stored("absent", "x");
        b.iter(|| black_box(snapshot.find(&term).unwrap()));
    });

    group.finish();
}

fn benchmark_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    let index = populated_index(8, 1000);
    for i in 0..100 {
        index.delete_documents(&Term::stored("key", format!("key0000_{:06}", i))).unwrap();
    }

    group.bench_function("with_deletions", |b| {
        b.iter(|| black_box(index.snapshot().num_docs()));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_numeric_lookup,
    benchmark_stored_fields,
    benchmark_search_sorted,
    benchmark_find_term,
    benchmark_snapshot
);
criterion_main!(benches);
