use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use inference::processing::{
    post::{PostProcessor, TransformParams},
    pre::{Letterbox, PreProcessor},
};
use ndarray::{Array, IxDyn};

/// Mock YOLO head output `[1, 5, anchors]` with `num_hits` overlapping
/// high-score boxes and background noise elsewhere.
fn create_mock_yolo_output(anchors: usize, num_hits: usize) -> ndarray::ArrayD<f32> {
    let mut data = vec![0.0f32; 5 * anchors];

    for i in 0..anchors {
        let hit = i < num_hits;
        let shift = (i % 40) as f32 * 12.0;
        data[i] = 100.0 + shift;
        data[anchors + i] = 200.0 + shift;
        data[2 * anchors + i] = 48.0;
        data[3 * anchors + i] = 32.0;
        data[4 * anchors + i] = if hit { 0.9 - i as f32 * 1e-4 } else { 0.01 };
    }

    Array::from_shape_vec(IxDyn(&[1, 5, anchors]), data).unwrap()
}

fn benchmark_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");

    let resolutions = [(640, 480), (1280, 720), (1920, 1080)];

    for (width, height) in resolutions.iter() {
        let image = RgbImage::from_pixel(*width, *height, Rgb([128, 128, 128]));
        let mut preprocessor = PreProcessor::default();

        group.bench_with_input(
            BenchmarkId::new("letterbox", format!("{}x{}", width, height)),
            &image,
            |b, image| {
                b.iter(|| preprocessor.preprocess_image(black_box(image)).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_postprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocessing");
    let post_processor = PostProcessor::new(0.25, 0.7, 300, 1);
    let transform = TransformParams {
        orig_width: 1920,
        orig_height: 1080,
        letterbox: Letterbox {
            scale: 1.0 / 3.0,
            offset_x: 0.0,
            offset_y: 140.0,
        },
    };

    let hit_counts = [0, 5, 50, 500];

    for num_hits in hit_counts.iter() {
        let predictions = create_mock_yolo_output(8400, *num_hits);

        group.bench_with_input(
            BenchmarkId::new("parse_detections", num_hits),
            &predictions,
            |b, predictions| {
                b.iter(|| {
                    post_processor
                        .parse_detections(black_box(&predictions.view()), black_box(&transform))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_preprocessing, benchmark_postprocessing);
criterion_main!(benches);
