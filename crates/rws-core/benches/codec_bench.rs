//! Criterion benchmarks for the outbound wire formats.
//!
//! Every delivered batch passes through the encoder on the session task, so
//! its cost bounds per-session throughput.
//!
//! Run with:
//! ```bash
//! cargo bench --package rws-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rws_core::codec::{compress, decode_batch, decode_frame};
use rws_core::{Encoder, MessageFormat, StreamBatch, StreamEntry};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_batch(entries: usize) -> StreamBatch {
    StreamBatch::new(
        "orders",
        (0..entries)
            .map(|i| {
                let id = format!("1700000000000-{i}");
                StreamEntry::from_pairs(
                    &id,
                    [
                        ("sku", "A-1042"),
                        ("qty", "3"),
                        ("note", "gift wrap, deliver after 5pm"),
                        ("meta", r#"{"source":"web","tags":["promo","eu"]}"#),
                    ],
                )
            })
            .collect(),
    )
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let batch = make_batch(10);
    let mut group = c.benchmark_group("encode_batch_10");
    for format in [
        MessageFormat::Json,
        MessageFormat::Text,
        MessageFormat::Binary,
        MessageFormat::Csv,
    ] {
        let encoder = Encoder::new(format, false);
        group.bench_with_input(BenchmarkId::new("format", format), &batch, |b, batch| {
            b.iter(|| encoder.encode(black_box(batch)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let payload = Encoder::new(MessageFormat::Json, false)
        .encode(&make_batch(10))
        .unwrap()
        .as_bytes()
        .to_vec();
    let frame = br#"{"values":{"sku":"A-1042","qty":3,"meta":{"source":"web"}}}"#;

    let mut group = c.benchmark_group("decode");
    group.bench_function("batch_10", |b| {
        b.iter(|| decode_batch(black_box(&payload)).unwrap())
    });
    group.bench_function("client_frame", |b| {
        b.iter(|| decode_frame(black_box(frame)).unwrap())
    });
    group.finish();
}

fn bench_compress(c: &mut Criterion) {
    let payload = Encoder::new(MessageFormat::Json, false)
        .encode(&make_batch(100))
        .unwrap()
        .as_bytes()
        .to_vec();

    c.bench_function("compress_batch_100", |b| {
        b.iter(|| compress(black_box(&payload)).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_compress);
criterion_main!(benches);
