//! Benchmarks for argument encoding.
//!
//! Measures request construction cost for typical call sites:
//! - Scalar-only argument lists
//! - Constant memory regions of growing size
//! - The full build-and-submit path through the typed façade

extern crate specreq;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use specreq::{
    encoding::{ArgDescriptor, ArgWriter},
    prelude::*,
};
use std::hint::black_box;

fn interpret(_code: *const u8, _len: u32, input: u64) -> u64 {
    input
}

/// Benchmark encoding four scalar descriptors.
fn bench_encode_scalars(c: &mut Criterion) {
    let args = [
        ArgDescriptor::I32(42),
        ArgDescriptor::I64(u64::MAX),
        ArgDescriptor::F64(0.5),
        ArgDescriptor::Runtime,
    ];

    c.bench_function("encode_scalars", |b| {
        b.iter(|| {
            let mut writer = ArgWriter::new();
            for arg in &args {
                writer.write_descriptor(black_box(arg)).unwrap();
            }
            black_box(writer.take())
        });
    });
}

/// Benchmark encoding a single memory region of increasing size.
fn bench_encode_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_buffer");
    for size in [16usize, 1024, 64 * 1024] {
        let data = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let mut writer = ArgWriter::new();
                writer
                    .write_descriptor(&ArgDescriptor::Buffer(black_box(data)))
                    .unwrap();
                black_box(writer.take())
            });
        });
    }
    group.finish();
}

/// Benchmark building, submitting and releasing a request.
fn bench_request_roundtrip(c: &mut Criterion) {
    let program = vec![0x11u8; 256];
    let slot = SpecializedSlot::<fn(*const u8, u32, u64) -> u64>::new();
    let mut ctx = SpecializationContext::new();

    c.bench_function("request_submit_release", |b| {
        b.iter(|| {
            let handle = request(
                &mut ctx,
                &slot,
                interpret,
                1,
                (
                    SpecializeMemory::new(black_box(&program)),
                    Specialize(256u32),
                    Runtime::new(),
                ),
            )
            .unwrap();
            black_box(ctx.release(handle))
        });
    });
}

criterion_group!(
    benches,
    bench_encode_scalars,
    bench_encode_buffer,
    bench_request_roundtrip,
);
criterion_main!(benches);
