use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use turnscore::{
    match_cross_checked, AngularPosition, FeatureConfig, FeatureDetector, Frame, IntensityProfile,
    MappingConfig, PixelToMusicMapper, RotationState, Scale, ScanConfig, ScanRegion,
    ScanlineExtractor, SelectionPolicy,
};

fn make_disc_fixture(w: u32, h: u32, seed: u64) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([40]));
    let mut rng = StdRng::seed_from_u64(seed);
    let spread = 0.3 * w.min(h) as f32;
    for _ in 0..400 {
        let r = spread * rng.gen::<f32>().sqrt();
        let a = rng.gen_range(0.0..std::f32::consts::TAU);
        let cx = (w as f32 / 2.0 + r * a.cos()) as u32;
        let cy = (h as f32 / 2.0 + r * a.sin()) as u32;
        let half = rng.gen_range(2..6u32);
        let v = rng.gen_range(150..=255u8);
        for y in cy.saturating_sub(half)..(cy + half).min(h) {
            for x in cx.saturating_sub(half)..(cx + half).min(w) {
                img.put_pixel(x, y, Luma([v]));
            }
        }
    }
    img
}

fn bench_mapping(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let profile = IntensityProfile::new((0..880).map(|_| rng.gen()).collect());

    for (name, selection) in [
        ("map_880_importance", SelectionPolicy::Importance),
        ("map_880_random", SelectionPolicy::Random),
    ] {
        let cfg = MappingConfig {
            selection,
            ..Default::default()
        };
        let mut mapper = PixelToMusicMapper::new(cfg, Scale::piano())
            .expect("piano scale is always in range");
        c.bench_function(name, |b| {
            b.iter(|| {
                let chord = mapper.map(black_box(&profile));
                black_box(chord.len())
            })
        });
    }
}

fn bench_scanline(c: &mut Criterion) {
    let frame = Frame::gray(0, make_disc_fixture(1280, 1024, 3));
    let extractor = ScanlineExtractor::new(ScanConfig::default());
    let rotation = RotationState::new(2.5, 30.0).expect("valid timing");
    let position: AngularPosition = rotation.position(137);
    let radial = ScanRegion::default_radial(1280, 1024, 40, 20);
    let strip = ScanRegion::Rectangular {
        x: 640,
        y: 0,
        width: 5,
        height: 1024,
    };

    c.bench_function("scanline_radial_1280x1024", |b| {
        b.iter(|| {
            let s = extractor.extract(black_box(&frame), &position, &radial);
            black_box(s.map(|s| s.profile.len()))
        })
    });

    c.bench_function("scanline_strip_5px", |b| {
        b.iter(|| {
            let s = extractor.extract(black_box(&frame), &position, &strip);
            black_box(s.map(|s| s.profile.len()))
        })
    });
}

fn bench_features(c: &mut Criterion) {
    let img = make_disc_fixture(640, 480, 9);
    let detector = FeatureDetector::new(FeatureConfig::default());

    c.bench_function("features_detect_640x480", |b| {
        b.iter(|| {
            let set = detector.detect(black_box(&img), None);
            black_box(set.len())
        })
    });

    let reference = detector.detect(&img, None);
    let current = detector.detect(&make_disc_fixture(640, 480, 9), None);
    c.bench_function("features_match_cross_checked", |b| {
        b.iter(|| {
            let m = match_cross_checked(
                black_box(&reference.descriptors),
                black_box(&current.descriptors),
                25,
            );
            black_box(m.len())
        })
    });
}

criterion_group!(hotpaths, bench_mapping, bench_scanline, bench_features);
criterion_main!(hotpaths);
