//! Sparse binary features for rotation tracking.
//!
//! FAST-9 corners ranked by score with radius non-maximum suppression,
//! intensity-centroid orientation, and steered BRIEF 256-bit descriptors
//! computed on a box-filtered copy of the image.

mod brief;
mod matcher;

use image::GrayImage;

pub use brief::{hamming_distance, BriefPattern, Descriptor};
pub use matcher::{match_cross_checked, FeatureMatch, MatchSet, MATCH_CAPACITY};

/// Half-size of the descriptor/orientation patch plus steering headroom.
pub const FEATURE_BORDER: u32 = 20;

/// Radius of the intensity-centroid orientation patch.
const ORIENTATION_RADIUS: i32 = 15;

/// FAST corner with orientation (radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub score: f32,
}

/// Feature detector tuning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Maximum keypoints kept per frame, strongest first.
    pub max_features: usize,
    /// Minimum distance (pixels) between kept keypoints.
    pub nms_radius: f32,
    /// Box-filter radius applied before descriptor sampling.
    pub smoothing_radius: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            max_features: 500,
            nms_radius: 3.0,
            smoothing_radius: 2,
        }
    }
}

/// Circular region of interest for detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularMask {
    pub center: [f32; 2],
    pub radius: f32,
}

impl CircularMask {
    /// Central disc covering the middle third of the frame.
    pub fn central(width: u32, height: u32, radius_divisor: u32) -> Self {
        Self {
            center: [(width / 2) as f32, (height / 2) as f32],
            radius: (width.min(height) / radius_divisor.max(1)) as f32,
        }
    }

    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let dx = x - self.center[0];
        let dy = y - self.center[1];
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

/// Keypoints with their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Reusable detector: owns the sampling pattern so it is built once.
#[derive(Debug, Clone)]
pub struct FeatureDetector {
    config: FeatureConfig,
    pattern: BriefPattern,
}

impl FeatureDetector {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            pattern: BriefPattern::default(),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Detect and describe features, optionally restricted to `mask`.
    pub fn detect(&self, gray: &GrayImage, mask: Option<CircularMask>) -> FeatureSet {
        let (w, h) = gray.dimensions();
        if w <= 2 * FEATURE_BORDER || h <= 2 * FEATURE_BORDER || self.config.max_features == 0 {
            return FeatureSet::default();
        }

        let mut corners: Vec<imageproc::corners::Corner> =
            imageproc::corners::corners_fast9(gray, self.config.fast_threshold)
                .into_iter()
                .filter(|c| {
                    c.x >= FEATURE_BORDER
                        && c.y >= FEATURE_BORDER
                        && c.x < w - FEATURE_BORDER
                        && c.y < h - FEATURE_BORDER
                })
                .filter(|c| mask.map_or(true, |m| m.contains(c.x as f32, c.y as f32)))
                .collect();
        // Strongest first; ties keep raster order.
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));

        let r2 = self.config.nms_radius * self.config.nms_radius;
        let mut keypoints: Vec<Keypoint> = Vec::with_capacity(self.config.max_features);
        for c in &corners {
            if keypoints.len() >= self.config.max_features {
                break;
            }
            let (x, y) = (c.x as f32, c.y as f32);
            let suppressed = keypoints.iter().any(|k| {
                let dx = k.x - x;
                let dy = k.y - y;
                dx * dx + dy * dy < r2
            });
            if suppressed {
                continue;
            }
            keypoints.push(Keypoint {
                x,
                y,
                angle: intensity_centroid_angle(gray, c.x, c.y),
                score: c.score,
            });
        }

        let smoothed = if self.config.smoothing_radius > 0 {
            imageproc::filter::box_filter(
                gray,
                self.config.smoothing_radius,
                self.config.smoothing_radius,
            )
        } else {
            gray.clone()
        };
        let descriptors = keypoints
            .iter()
            .map(|k| self.pattern.describe(&smoothed, k))
            .collect();

        tracing::trace!("{} corners, {} keypoints kept", corners.len(), keypoints.len());
        FeatureSet {
            keypoints,
            descriptors,
        }
    }
}

/// Orientation from the first-order moments of a circular patch.
fn intensity_centroid_angle(gray: &GrayImage, cx: u32, cy: u32) -> f32 {
    let raw = gray.as_raw();
    let stride = gray.width() as i64;
    let (cx, cy) = (cx as i64, cy as i64);
    let mut m01 = 0i64;
    let mut m10 = 0i64;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        let half = ((ORIENTATION_RADIUS * ORIENTATION_RADIUS - dy * dy) as f32).sqrt() as i32;
        let row = (cy + dy as i64) * stride;
        for dx in -half..=half {
            let v = raw[(row + cx + dx as i64) as usize] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_speckle_disc;
    use image::Luma;

    #[test]
    fn blank_image_has_no_features() {
        let img = GrayImage::from_pixel(160, 160, Luma([90]));
        let det = FeatureDetector::new(FeatureConfig::default());
        assert!(det.detect(&img, None).is_empty());
    }

    #[test]
    fn tiny_image_has_no_features() {
        let img = draw_speckle_disc(30, 30, 1);
        let det = FeatureDetector::new(FeatureConfig::default());
        assert!(det.detect(&img, None).is_empty());
    }

    #[test]
    fn speckle_disc_yields_bounded_aligned_features() {
        let img = draw_speckle_disc(240, 240, 3);
        let cfg = FeatureConfig {
            max_features: 40,
            ..Default::default()
        };
        let det = FeatureDetector::new(cfg);
        let set = det.detect(&img, None);
        assert!(set.len() >= 10, "only {} features", set.len());
        assert!(set.len() <= 40);
        assert_eq!(set.keypoints.len(), set.descriptors.len());
        for k in &set.keypoints {
            assert!(k.x >= FEATURE_BORDER as f32 && k.x < (240 - FEATURE_BORDER) as f32);
            assert!(k.angle.is_finite());
        }
    }

    #[test]
    fn mask_restricts_detection() {
        let img = draw_speckle_disc(240, 240, 5);
        let det = FeatureDetector::new(FeatureConfig::default());
        let mask = CircularMask::central(240, 240, 3);
        let set = det.detect(&img, Some(mask));
        assert!(!set.is_empty());
        assert!(set.keypoints.iter().all(|k| mask.contains(k.x, k.y)));
    }

    #[test]
    fn keypoints_respect_nms_radius() {
        let img = draw_speckle_disc(240, 240, 9);
        let cfg = FeatureConfig {
            nms_radius: 6.0,
            ..Default::default()
        };
        let det = FeatureDetector::new(cfg);
        let set = det.detect(&img, None);
        for (i, a) in set.keypoints.iter().enumerate() {
            for b in &set.keypoints[i + 1..] {
                let d2 = (a.x - b.x).powi(2) + (a.y - b.y).powi(2);
                assert!(d2 >= 36.0);
            }
        }
    }
}
