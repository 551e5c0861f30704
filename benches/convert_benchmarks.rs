//! Performance benchmarks for the capture-to-encoder path
//!
//! Run with: cargo bench --bench convert_benchmarks
//!
//! Measures plane repacking at common camera resolutions and the cost of a
//! frame round trip through the pool.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crabcorder::convert::convert;
use crabcorder::pool::FramePool;
use crabcorder::testing::{synthetic_planar_image, synthetic_semiplanar_image};
use crabcorder::types::{CropRect, PixelLayout};
use std::time::Duration;

const RESOLUTIONS: [(u32, u32, &str); 3] = [
    (640, 480, "480p"),
    (1280, 720, "720p"),
    (1920, 1080, "1080p"),
];

fn bench_planar_source(c: &mut Criterion) {
    let mut group = c.benchmark_group("Convert planar source");
    group.measurement_time(Duration::from_secs(5));

    for (width, height, name) in RESOLUTIONS {
        let image = synthetic_planar_image(0, width, height);
        let crop = CropRect::full(width, height);
        let mut out = vec![0u8; PixelLayout::Planar420.frame_size(width, height)];
        group.throughput(Throughput::Bytes(out.len() as u64));

        for layout in [PixelLayout::Planar420, PixelLayout::SemiPlanar420UFirst] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", layout), name),
                &image,
                |b, image| {
                    b.iter(|| {
                        convert(black_box(&image.as_image()), &crop, layout, &mut out).unwrap();
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_interleaved_source(c: &mut Criterion) {
    let mut group = c.benchmark_group("Convert interleaved source");
    group.measurement_time(Duration::from_secs(5));

    for (width, height, name) in RESOLUTIONS {
        let image = synthetic_semiplanar_image(0, width, height, true);
        let crop = CropRect::full(width, height);
        let mut out = vec![0u8; PixelLayout::Planar420.frame_size(width, height)];
        group.throughput(Throughput::Bytes(out.len() as u64));

        group.bench_with_input(BenchmarkId::new("NV21 to NV12", name), &image, |b, image| {
            b.iter(|| {
                convert(
                    black_box(&image.as_image()),
                    &crop,
                    PixelLayout::SemiPlanar420UFirst,
                    &mut out,
                )
                .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_pool_round_trip(c: &mut Criterion) {
    let pool = FramePool::new(15);
    let size = PixelLayout::default().frame_size(1280, 720);

    c.bench_function("Pool acquire/publish/consume/release 720p", |b| {
        b.iter(|| {
            let mut frame = pool.acquire_recyclable(size);
            frame.pts_us = Some(0);
            pool.publish(frame);
            if let Some(frame) = pool.consume() {
                pool.release(black_box(frame));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_planar_source,
    bench_interleaved_source,
    bench_pool_round_trip
);

criterion_main!(benches);
