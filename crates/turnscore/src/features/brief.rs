//! Steered BRIEF descriptors.

use image::GrayImage;
use rand::prelude::*;

use super::Keypoint;

/// 256-bit binary descriptor.
pub type Descriptor = [u8; 32];

const N_PAIRS: usize = 256;
const PATTERN_HALF_SIZE: i32 = 13;
const PATTERN_SEED: u64 = 0x0bd5_2566;

/// Fixed set of point pairs sampled around each keypoint.
#[derive(Debug, Clone)]
pub struct BriefPattern {
    pairs: Vec<[f32; 4]>,
}

impl Default for BriefPattern {
    fn default() -> Self {
        Self::with_seed(PATTERN_SEED)
    }
}

impl BriefPattern {
    /// Uniform pairs inside a 27x27 patch; deterministic for a given seed.
    pub fn with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut coord = || rng.gen_range(-PATTERN_HALF_SIZE..=PATTERN_HALF_SIZE) as f32;
        let pairs = (0..N_PAIRS)
            .map(|_| [coord(), coord(), coord(), coord()])
            .collect();
        Self { pairs }
    }

    /// Describe `kp` on the (smoothed) image, rotating the pattern by `kp.angle`.
    ///
    /// The caller guarantees `kp` lies at least `FEATURE_BORDER` pixels inside
    /// the image, which covers the rotated pattern.
    pub fn describe(&self, smoothed: &GrayImage, kp: &Keypoint) -> Descriptor {
        let (sin, cos) = kp.angle.sin_cos();
        let raw = smoothed.as_raw();
        let stride = smoothed.width() as i64;
        let (kx, ky) = (kp.x as i64, kp.y as i64);
        let sample = |px: f32, py: f32| -> u8 {
            let rx = (px * cos - py * sin).round() as i64;
            let ry = (px * sin + py * cos).round() as i64;
            raw[((ky + ry) * stride + kx + rx) as usize]
        };

        let mut desc = [0u8; 32];
        for (i, p) in self.pairs.iter().enumerate() {
            if sample(p[0], p[1]) < sample(p[2], p[3]) {
                desc[i / 8] |= 1 << (i % 8);
            }
        }
        desc
    }
}

/// Number of differing bits between two descriptors.
#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_speckle_disc;

    #[test]
    fn hamming_counts_bits() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        assert_eq!(hamming_distance(&a, &b), 0);
        b[0] = 0b1011;
        b[31] = 0xFF;
        assert_eq!(hamming_distance(&a, &b), 11);
    }

    #[test]
    fn pattern_is_deterministic() {
        let a = BriefPattern::with_seed(7);
        let b = BriefPattern::with_seed(7);
        assert_eq!(a.pairs, b.pairs);
        assert_eq!(a.pairs.len(), N_PAIRS);
        assert!(a
            .pairs
            .iter()
            .flatten()
            .all(|v| v.abs() <= PATTERN_HALF_SIZE as f32));
    }

    #[test]
    fn same_patch_gives_same_descriptor() {
        let img = draw_speckle_disc(120, 120, 11);
        let pattern = BriefPattern::default();
        let kp = Keypoint {
            x: 60.0,
            y: 60.0,
            angle: 0.4,
            score: 0.0,
        };
        assert_eq!(pattern.describe(&img, &kp), pattern.describe(&img, &kp));
    }
}
