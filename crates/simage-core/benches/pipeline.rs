//! Benchmarks for the message codec and the hashing path.
//!
//! Run with: cargo bench -p simage-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use simage_core::messaging::MessageFactory;
use simage_core::persistence::PendingHashImage;
use simage_core::pipeline::{resize_for_hashing, Hasher, ImageDecoder};
use std::path::Path;

fn sample_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn benchmark_codec(c: &mut Criterion) {
    c.bench_function("encode_decode_hash_result", |b| {
        b.iter(|| {
            let message = MessageFactory::hash_result(black_box(0xdead_beef_u64), black_box(7));
            let _ = MessageFactory::decode(message);
        })
    });

    let pending: Vec<PendingHashImage> = (0..1000)
        .map(|i| PendingHashImage::new(format!("/photos/{i:04}.jpg")))
        .collect();
    c.bench_function("encode_pending_response_1000", |b| {
        b.iter(|| {
            let _ = MessageFactory::pending_response(black_box(&pending));
        })
    });
}

fn benchmark_perceptual_hash(c: &mut Criterion) {
    let hasher = Hasher::new();
    let img = sample_image(256, 256);

    c.bench_function("perceptual_hash", |b| {
        b.iter(|| {
            let _ = hasher.perceptual_hash(black_box(&img));
        })
    });
}

fn benchmark_resize(c: &mut Criterion) {
    let img = sample_image(1920, 1080);

    c.bench_function("resize_for_hashing_32px", |b| {
        b.iter(|| {
            let _ = resize_for_hashing(black_box(&img), 32);
        })
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let mut encoded = std::io::Cursor::new(Vec::new());
    if sample_image(640, 480)
        .write_to(&mut encoded, image::ImageFormat::Png)
        .is_err()
    {
        eprintln!("Skipping decode benchmark: could not encode sample image");
        return;
    }
    let bytes = encoded.into_inner();

    c.bench_function("decode_png_640x480", |b| {
        b.iter(|| {
            let _ = ImageDecoder::decode_bytes_sync(black_box(bytes.clone()), Path::new("x.png"));
        })
    });
}

criterion_group!(
    benches,
    benchmark_codec,
    benchmark_perceptual_hash,
    benchmark_resize,
    benchmark_decode
);
criterion_main!(benches);
