//! Performance benchmarks for the sharpness metric
//!
//! Run with: cargo bench --bench sharpness_benchmarks
//!
//! Autofocus samples the metric once per stage step, so decoding plus the
//! Laplacian pass bounds how fast a focus sweep can run.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stagecam::sharpness::{laplacian_variance, luma_laplacian_variance};
use stagecam::testing::synthetic_data::{checkerboard, encode_jpeg, synthetic_frame};
use std::time::Duration;

fn bench_luma_laplacian(c: &mut Criterion) {
    let mut group = c.benchmark_group("Laplacian variance");

    let resolutions = [(640, 480, "480p"), (1640, 1232, "stream"), (4056, 3040, "still")];

    for (width, height, name) in resolutions {
        if width > 2000 {
            group.sample_size(10);
            group.measurement_time(Duration::from_secs(10));
        }
        let luma = checkerboard(width, height, 8, 120);
        group.throughput(Throughput::Elements(u64::from(width) * u64::from(height)));
        group.bench_with_input(BenchmarkId::new("luma", name), &luma, |b, luma| {
            b.iter(|| luma_laplacian_variance(black_box(luma)))
        });
    }

    group.finish();
}

fn bench_decode_and_measure(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stream frame sharpness");

    let jpeg = encode_jpeg(&synthetic_frame(1640, 1232, 0, 120), 85)
        .unwrap_or_else(|e| panic!("encoding benchmark frame: {}", e));
    group.throughput(Throughput::Bytes(jpeg.len() as u64));
    group.bench_function("jpeg_1640x1232", |b| {
        b.iter(|| laplacian_variance(black_box(&jpeg)))
    });

    group.finish();
}

criterion_group!(benches, bench_luma_laplacian, bench_decode_and_measure);
criterion_main!(benches);
