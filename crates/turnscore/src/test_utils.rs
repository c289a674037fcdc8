//! Synthetic frames shared by unit tests.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::prelude::*;

const SPECKLE_BACKGROUND: u8 = 40;

/// Dark frame with bright random squares clustered around the centre.
///
/// Square centres lie within `0.3 * min(w, h)` of the image centre, so a
/// central detection mask always sees texture.
pub(crate) fn draw_speckle_disc(w: u32, h: u32, seed: u64) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([SPECKLE_BACKGROUND]));
    let mut rng = StdRng::seed_from_u64(seed);
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let spread = 0.3 * w.min(h) as f32;
    for _ in 0..80 {
        let r = spread * rng.gen::<f32>().sqrt();
        let a = rng.gen_range(0.0..std::f32::consts::TAU);
        let sx = (cx + r * a.cos()) as i64;
        let sy = (cy + r * a.sin()) as i64;
        let half = rng.gen_range(2..=6i64);
        let value = rng.gen_range(150..=255u8);
        for y in (sy - half).max(0)..(sy + half).min(h as i64) {
            for x in (sx - half).max(0)..(sx + half).min(w as i64) {
                img.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
    }
    img
}

/// Rotate about the image centre, filling uncovered pixels with the speckle background.
pub(crate) fn rotate_gray(img: &GrayImage, theta_rad: f32) -> GrayImage {
    rotate_about_center(
        img,
        theta_rad,
        Interpolation::Bilinear,
        Luma([SPECKLE_BACKGROUND]),
    )
}

/// Frame whose luma equals the row index (clamped to 255).
pub(crate) fn vertical_gradient(w: u32, h: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |_, y| Luma([y.min(255) as u8]))
}

/// Frame whose luma equals the column index (clamped to 255).
pub(crate) fn horizontal_gradient(w: u32, h: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, _| Luma([x.min(255) as u8]))
}
