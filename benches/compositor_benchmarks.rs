use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgba, RgbaImage};
use subject_highlight::{
    composite, extract_subjects, ConfidenceMask, MockBackend, SegmenterConfig, Subject,
    SubjectExtractionOptions, SubjectSegmenter,
};

const SIZES: [u32; 3] = [256, 640, 1280];

/// Gradient image with a grid of bright squares, one per subject
fn scene(size: u32, grid: u32) -> RgbaImage {
    let cell = size / grid;
    RgbaImage::from_fn(size, size, |x, y| {
        let (cx, cy) = (x % cell, y % cell);
        if cx > cell / 4 && cx < cell * 3 / 4 && cy > cell / 4 && cy < cell * 3 / 4 {
            Rgba([240, 240, 240, 255])
        } else {
            Rgba([(x % 100) as u8, 40, (y % 100) as u8, 255])
        }
    })
}

fn mask_for(image: &RgbaImage) -> ConfidenceMask {
    let values = image
        .pixels()
        .map(|p| if p[0] > 200 { 0.95 } else { 0.05 })
        .collect();
    ConfidenceMask::new(image.width(), image.height(), values).unwrap()
}

fn benchmark_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");

    for size in SIZES {
        let image = scene(size, 4);
        let mask = mask_for(&image);
        let subjects: Vec<Subject> = extract_subjects(&image, &mask, &SubjectExtractionOptions::default())
            .unwrap();

        group.bench_with_input(BenchmarkId::new("foreground_only", size), &size, |b, _| {
            b.iter(|| composite(black_box(&image), Some(&mask), &[]));
        });
        group.bench_with_input(BenchmarkId::new("with_subjects", size), &size, |b, _| {
            b.iter(|| composite(black_box(&image), Some(&mask), black_box(&subjects)));
        });
    }

    group.finish();
}

fn benchmark_subject_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("subject_extraction");

    for size in SIZES {
        let image = scene(size, 4);
        let mask = mask_for(&image);
        let options = SubjectExtractionOptions {
            max_subjects: 16,
            ..SubjectExtractionOptions::default()
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| extract_subjects(black_box(&image), black_box(&mask), &options).unwrap());
        });
    }

    group.finish();
}

fn benchmark_mock_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("mock_pipeline");
    group.sample_size(20);

    for input_size in [320u32, 1024] {
        let config = SegmenterConfig::builder()
            .input_size(input_size)
            .build()
            .unwrap();
        let mut segmenter =
            SubjectSegmenter::with_backend(config, Box::new(MockBackend::new())).unwrap();
        let image = DynamicImage::ImageRgba8(scene(640, 3));

        group.bench_with_input(
            BenchmarkId::new("process_image", input_size),
            &input_size,
            |b, _| {
                b.iter(|| segmenter.process_image(black_box(&image)));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_composite,
    benchmark_subject_extraction,
    benchmark_mock_pipeline
);
criterion_main!(benches);
