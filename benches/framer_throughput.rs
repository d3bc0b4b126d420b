//! Throughput benchmarks for the serial-line framer.
//!
//! Measures bytes-per-second through the parse state machine for:
//! - Clean traffic (every line well formed)
//! - Noisy traffic (lines interleaved with garbage bytes)
//! - Worst-case payload sizes (0 vs 8 data bytes per frame)
//!
//! Platform: Cross-platform (synthetic input, CI-safe)

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use chasecar::framer::Framer;
use chasecar::store::FrameStore;

/// One well-formed line for the given identifier and payload length.
fn line(id: u16, len: usize) -> Vec<u8> {
    let mut out = format!("t{id:03X}{len:X}").into_bytes();
    for byte in 0..len {
        out.extend_from_slice(format!("{byte:02X}").as_bytes());
    }
    out.push(b'\r');
    out
}

/// A buffer of `frames` lines cycling across identifiers.
fn traffic(frames: usize, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..frames {
        out.extend_from_slice(&line((i % 0x800) as u16, len));
    }
    out
}

fn bench_clean_traffic(c: &mut Criterion) {
    let mut group = c.benchmark_group("framer/clean");
    for &len in &[0usize, 4, 8] {
        let input = traffic(10_000, len);
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &input, |b, input| {
            let store = Arc::new(FrameStore::new());
            let mut framer = Framer::new(store);
            b.iter(|| black_box(framer.feed(black_box(input))));
        });
    }
    group.finish();
}

fn bench_noisy_traffic(c: &mut Criterion) {
    let clean = traffic(10_000, 8);
    let mut noisy = Vec::with_capacity(clean.len() * 2);
    for chunk in clean.chunks(24) {
        noisy.extend_from_slice(b"zz\x00\xffnoise");
        noisy.extend_from_slice(chunk);
    }

    let mut group = c.benchmark_group("framer/noisy");
    group.throughput(Throughput::Bytes(noisy.len() as u64));
    group.bench_function("interleaved_garbage", |b| {
        let store = Arc::new(FrameStore::new());
        let mut framer = Framer::new(store);
        b.iter(|| black_box(framer.feed(black_box(&noisy))));
    });
    group.finish();
}

criterion_group!(benches, bench_clean_traffic, bench_noisy_traffic);
criterion_main!(benches);
