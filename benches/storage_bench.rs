//! Benchmarks for mkstore codecs, indexes and segments
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mkstore::encoding::{self, EncodingKind};
use mkstore::index::{BurstTrie, IntComparator, SkipList, ValueIndex};
use mkstore::storage::*;
use tempfile::tempdir;

fn timestamps(count: usize) -> Vec<i64> {
    (0..count as i64).map(|i| 1_700_000_000_000 + i * 1000 + (i % 7)).collect()
}

fn bench_codecs(c: &mut Criterion) {
    let mut group = c.benchmark_group("codecs");

    for size in [100, 1000, 10000] {
        let ts = timestamps(size);
        let floats: Vec<f64> = (0..size).map(|i| 20.0 + (i % 50) as f64 * 0.25).collect();
        group.throughput(Throughput::Elements(size as u64));

        for kind in [EncodingKind::DoubleDelta, EncodingKind::Varint, EncodingKind::Plain] {
            group.bench_function(format!("encode_{}_{}", kind, size), |b| {
                let mut out = Vec::new();
                b.iter(|| {
                    out.clear();
                    encoding::encode_ints(kind, black_box(&ts), &mut out).unwrap()
                })
            });
        }

        let mut block = Vec::new();
        encoding::encode_ints(EncodingKind::DoubleDelta, &ts, &mut block).unwrap();
        group.bench_function(format!("decode_double_delta_{}", size), |b| {
            let mut out = Vec::new();
            b.iter(|| {
                encoding::decode_ints(EncodingKind::DoubleDelta, black_box(&block), &mut out)
                    .unwrap()
                    .len()
            })
        });

        group.bench_function(format!("encode_xor_{}", size), |b| {
            let mut out = Vec::new();
            b.iter(|| {
                out.clear();
                encoding::encode_floats(EncodingKind::Xor, black_box(&floats), &mut out).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_indexes(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexes");
    let terms: Vec<String> = (0..10_000).map(|i| format!("host-{:05}", i % 2_500)).collect();

    group.throughput(Throughput::Elements(terms.len() as u64));
    group.bench_function("trie_insert_10000", |b| {
        b.iter(|| {
            let mut trie = BurstTrie::default();
            for (row, term) in terms.iter().enumerate() {
                trie.insert(term.as_bytes(), row as u32).unwrap();
            }
            trie.cardinality()
        })
    });

    group.bench_function("skiplist_insert_10000", |b| {
        b.iter(|| {
            let mut index: ValueIndex<IntComparator> = ValueIndex::new(SkipList::with_seed(16, 0.5, 42));
            for row in 0..10_000u32 {
                index.insert((row % 997) as i64, row).unwrap();
            }
            index.cardinality()
        })
    });

    group.finish();
}

fn events(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            Event::new(1_700_000_000_000 + i as i64 * 100)
                .with("host", format!("web-{}", i % 16))
                .with("status", [200i64, 200, 200, 404, 500][i % 5])
                .with("message", format!("GET /api/item/{} took {}ms", i % 300, i % 90))
        })
        .collect()
}

fn schema() -> IndexInfo {
    IndexInfo::new("bench")
        .with_field("host", FieldType::Keyword, true)
        .unwrap()
        .with_field("status", FieldType::Int, true)
        .unwrap()
        .with_field("message", FieldType::Text, true)
        .unwrap()
}

fn bench_segments(c: &mut Criterion) {
    let mut group = c.benchmark_group("segments");
    let batch = events(10_000);
    let options = WriteOptions {
        sync: false, // No fsync for benchmarking raw performance
        ..WriteOptions::default()
    };

    group.throughput(Throughput::Elements(batch.len() as u64));
    group.bench_function("write_10000", |b| {
        b.iter(|| {
            let dir = tempdir().unwrap();
            let mut segment = Segment::with_options(schema(), options.clone());
            segment.add_batch(black_box(&batch)).unwrap();
            segment.write(dir.path()).unwrap();
            segment.close().unwrap();
        })
    });

    let dir = tempdir().unwrap();
    let mut segment = Segment::with_options(schema(), options.clone());
    segment.add_batch(&batch).unwrap();
    segment.write(dir.path()).unwrap();
    segment.close().unwrap();
    let reader = read_segment(dir.path()).unwrap();

    group.bench_function("lookup_keyword", |b| {
        let host = reader.column("host").unwrap();
        b.iter(|| host.lookup(black_box(&Value::from("web-3"))).unwrap())
    });

    group.bench_function("lookup_text", |b| {
        let message = reader.column("message").unwrap();
        b.iter(|| message.lookup(black_box(&Value::from("item 42"))).unwrap())
    });

    group.bench_function("scan_all", |b| {
        b.iter(|| reader.events(black_box(0..10_000)).unwrap().len())
    });

    group.finish();
}

criterion_group!(benches, bench_codecs, bench_indexes, bench_segments);
criterion_main!(benches);
