//! Benchmarks for the kernel engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use voxgraph::graph::modules::decode_samples;
use voxgraph::graph::{
    create_gaussian_kernel, filter_image_data, laplace_kernel, plan_render_passes, KernelChain,
    SampleType, Samples,
};
use std::sync::Arc;

fn ramp_u16(len: usize) -> Samples {
    Samples::U16((0..len).map(|i| (i % 4096) as u16).collect())
}

fn bench_laplace(c: &mut Criterion) {
    let mut group = c.benchmark_group("laplace_convolution");
    let kernel = laplace_kernel();

    for side in [64usize, 128, 256].iter() {
        let depth = 4;
        let samples = ramp_u16(side * side * depth);
        group.throughput(Throughput::Elements((side * side * depth) as u64));
        group.bench_with_input(BenchmarkId::new("uint16", side), side, |b, &side| {
            b.iter(|| black_box(filter_image_data(&samples, side, side, depth, &kernel)));
        });
    }

    group.finish();
}

fn bench_gaussian(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaussian_convolution");
    let side = 128;
    let depth = 4;
    let samples = Samples::U8((0..side * side * depth).map(|i| (i % 251) as u8).collect());

    for sigma in [0.5f64, 1.0, 2.0].iter() {
        let kernel = create_gaussian_kernel(*sigma).unwrap();
        group.throughput(Throughput::Elements((side * side * depth) as u64));
        group.bench_with_input(BenchmarkId::new("uint8", sigma), &kernel, |b, kernel| {
            b.iter(|| black_box(filter_image_data(&samples, side, side, depth, kernel)));
        });
    }

    group.finish();
}

fn bench_kernel_synthesis(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_synthesis");

    group.bench_function("gaussian_sigma_2", |b| {
        b.iter(|| black_box(create_gaussian_kernel(black_box(2.0))));
    });

    let kernel = Arc::new(laplace_kernel());
    let chain = (0..8).fold(KernelChain::new(), |chain, _| chain.appended(Arc::clone(&kernel)));
    group.bench_function("plan_8_passes", |b| {
        b.iter(|| black_box(plan_render_passes(&chain)));
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_samples");
    let bytes: Vec<u8> = (0..256 * 256 * 16 * 2).map(|i| (i % 256) as u8).collect();

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("uint16", |b| {
        b.iter(|| black_box(decode_samples(&bytes, SampleType::Uint16)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_laplace,
    bench_gaussian,
    bench_kernel_synthesis,
    bench_decode,
);

criterion_main!(benches);
