//! Throughput benchmarks for Herald.
//!
//! These benchmarks measure the raw throughput of the log and the codec.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use herald_bench::payload;
use herald_core::{MessageLog, PublishCoordinator};
use herald_protocol::{codec, Frame, Message};
use std::sync::Arc;

/// Benchmark appending to a bare log.
fn bench_log_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_append");
    group.throughput(Throughput::Elements(1));

    group.bench_function("text", |b| {
        let mut log = MessageLog::new();
        b.iter(|| log.append(black_box("HELLO # 1")));
    });

    group.bench_function("coordinator_publish", |b| {
        let coordinator = PublishCoordinator::new();
        b.iter(|| coordinator.publish(black_box("HELLO # 1")));
    });

    group.finish();
}

/// Benchmark walking a log from its head.
fn bench_log_traverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_traverse");

    for size in [1_000u64, 100_000] {
        let mut log = MessageLog::new();
        for i in 0..size {
            log.append(format!("msg {i}"));
        }

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &log, |b, log| {
            b.iter(|| MessageLog::iter_after(&log.head()).count());
        });
    }

    group.finish();
}

/// Benchmark message frame encoding and decoding by payload size.
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in [64usize, 1024, 65536] {
        let frame = Frame::message(Arc::new(Message::new(1, payload(size))));
        let encoded = codec::encode(&frame).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &frame, |b, frame| {
            b.iter(|| codec::encode(black_box(frame)))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| codec::decode(black_box(encoded)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_log_append, bench_log_traverse, bench_codec);
criterion_main!(benches);
