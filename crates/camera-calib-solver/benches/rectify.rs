use camera_calib_core::{GrayImage, ImageSize};
use camera_calib_solver::{CameraParams, Distortion, Intrinsics, RectificationMap};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn camera() -> CameraParams {
    CameraParams::new(
        Intrinsics::new(800.0, 790.0, 319.5, 239.5),
        Distortion {
            k1: -0.2,
            k2: 0.05,
            ..Default::default()
        },
    )
}

fn bench_rectify(c: &mut Criterion) {
    let size = ImageSize::new(640, 480);
    let cam = camera();
    let data = (0..size.area()).map(|i| (i % 251) as u8).collect();
    let frame = GrayImage::from_raw(640, 480, data).expect("frame");

    c.bench_function("rectification_map_build_640x480", |b| {
        b.iter(|| RectificationMap::build(black_box(&cam), size))
    });

    let map = RectificationMap::build(&cam, size);
    let mut dst = GrayImage::new(640, 480);
    c.bench_function("rectification_apply_640x480", |b| {
        b.iter(|| map.apply_into(black_box(&frame.view()), &mut dst))
    });
}

criterion_group!(benches, bench_rectify);
criterion_main!(benches);
