//! Feature-based turntable rotation-rate estimation.
//!
//! A reference template is extracted once from a central disc of the frame.
//! Each estimate matches the current frame against it, fits a rigid
//! transform, and converts the change in rotation angle since the previous
//! estimate into revolutions per minute, smoothed over a fixed window.

use image::GrayImage;

use crate::config::ConfigError;
use crate::features::{
    match_cross_checked, CircularMask, FeatureConfig, FeatureDetector, FeatureSet, MATCH_CAPACITY,
};
use crate::frame::Frame;
use crate::rigid::{fit_rigid_ransac, RansacRigidConfig};

/// Estimator tuning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub features: FeatureConfig,
    /// Reference frames with fewer features are rejected.
    pub min_reference_features: usize,
    /// Number of best (lowest distance) matches kept.
    pub good_matches: usize,
    /// Minimum matches required to attempt a transform fit.
    pub min_matches: usize,
    pub ransac: RansacRigidConfig,
    /// Length of the RPM moving-average window.
    pub smoothing_window: usize,
    /// Reference mask radius is `min(w, h) / mask_radius_divisor`.
    pub mask_radius_divisor: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            min_reference_features: 10,
            good_matches: 25,
            min_matches: 10,
            ransac: RansacRigidConfig::default(),
            smoothing_window: 30,
            mask_radius_divisor: 3,
        }
    }
}

impl EstimatorConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.good_matches == 0 || self.good_matches > MATCH_CAPACITY {
            return Err(ConfigError::InvalidValue {
                field: "estimator.good_matches",
                reason: format!("must be in 1..={}", MATCH_CAPACITY),
            });
        }
        if self.min_matches < 2 || self.min_matches > self.good_matches {
            return Err(ConfigError::InvalidValue {
                field: "estimator.min_matches",
                reason: "must be in 2..=good_matches".into(),
            });
        }
        if self.smoothing_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "estimator.smoothing_window",
                reason: "must be >= 1".into(),
            });
        }
        if self.mask_radius_divisor == 0 {
            return Err(ConfigError::InvalidValue {
                field: "estimator.mask_radius_divisor",
                reason: "must be >= 1".into(),
            });
        }
        if !(self.ransac.inlier_threshold.is_finite() && self.ransac.inlier_threshold > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "estimator.ransac.inlier_threshold",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

/// Hard failures of an estimator call.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorError {
    /// `estimate` was called before a reference was set.
    NoReference,
    /// The reference frame does not have enough features.
    NoFeaturesFound {
        /// Required minimum number of features.
        needed: usize,
        /// Number of features detected.
        found: usize,
    },
}

impl std::fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoReference => write!(f, "no reference template set"),
            Self::NoFeaturesFound { needed, found } => {
                write!(f, "too few reference features: need {}, found {}", needed, found)
            }
        }
    }
}

impl std::error::Error for EstimatorError {}

/// Why an estimate could not be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DegradedReason {
    TooFewFeatures,
    TooFewMatches,
    NoTransform,
}

/// Whether the returned RPM reflects this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimateStatus {
    Fresh {
        /// Absolute reference-to-current rotation, degrees.
        angle_deg: f64,
        /// Change since the previous fitted estimate, in `(-180, 180]`.
        /// Spread over the frames elapsed before conversion to rpm.
        delta_deg: f64,
        inliers: usize,
    },
    /// The previous RPM is carried unchanged.
    Degraded(DegradedReason),
}

/// Smoothed RPM with its provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpmEstimate {
    pub rpm: f64,
    pub status: EstimateStatus,
}

impl RpmEstimate {
    pub fn is_fresh(&self) -> bool {
        matches!(self.status, EstimateStatus::Fresh { .. })
    }
}

/// Fixed-capacity moving average.
#[derive(Debug, Clone)]
struct RpmWindow {
    values: Vec<f64>,
    capacity: usize,
    next: usize,
}

impl RpmWindow {
    fn new(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            next: 0,
        }
    }

    fn push(&mut self, v: f64) {
        if self.values.len() < self.capacity {
            self.values.push(v);
        } else {
            self.values[self.next] = v;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }

    fn clear(&mut self) {
        self.values.clear();
        self.next = 0;
    }
}

/// Wrap an angle difference into `(-180, 180]`.
pub fn wrap_delta_deg(delta: f64) -> f64 {
    let d = delta.rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Instantaneous RPM from a per-frame rotation in degrees.
#[inline]
pub fn rpm_from_delta(delta_deg: f64, fps: f64) -> f64 {
    (delta_deg * fps).abs() / 6.0
}

/// Tracks the turntable's rotation rate against a reference template.
#[derive(Debug, Clone)]
pub struct RotationEstimator {
    config: EstimatorConfig,
    fps: f64,
    detector: FeatureDetector,
    reference: Option<FeatureSet>,
    last_angle_deg: f64,
    /// Frame index at which `last_angle_deg` was measured.
    last_index: u64,
    window: RpmWindow,
    rpm: f64,
}

impl RotationEstimator {
    pub fn new(fps: f64, config: EstimatorConfig) -> Result<Self, ConfigError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ConfigError::InvalidFps(fps));
        }
        config.validate()?;
        Ok(Self {
            detector: FeatureDetector::new(config.features.clone()),
            window: RpmWindow::new(config.smoothing_window),
            config,
            fps,
            reference: None,
            last_angle_deg: 0.0,
            last_index: 0,
            rpm: 0.0,
        })
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Latest smoothed RPM (0 before the first fresh estimate).
    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    fn detect(&self, gray: &GrayImage) -> FeatureSet {
        let (w, h) = gray.dimensions();
        let mask = CircularMask::central(w, h, self.config.mask_radius_divisor);
        self.detector.detect(gray, Some(mask))
    }

    /// Replace the reference template; returns the number of features kept.
    ///
    /// On failure the previous template is left in place.
    pub fn set_reference(&mut self, frame: &Frame) -> Result<usize, EstimatorError> {
        let gray = frame.to_gray();
        let set = self.detect(&gray);
        let needed = self.config.min_reference_features;
        if set.len() < needed {
            tracing::warn!(
                "reference frame {} has {} features, need {}",
                frame.index(),
                set.len(),
                needed
            );
            return Err(EstimatorError::NoFeaturesFound {
                needed,
                found: set.len(),
            });
        }
        let n = set.len();
        self.reference = Some(set);
        self.last_angle_deg = 0.0;
        self.last_index = frame.index();
        self.window.clear();
        tracing::info!("reference template set from frame {} ({} features)", frame.index(), n);
        Ok(n)
    }

    fn degraded(&self, reason: DegradedReason) -> RpmEstimate {
        tracing::debug!("rotation estimate degraded: {:?}", reason);
        RpmEstimate {
            rpm: self.rpm,
            status: EstimateStatus::Degraded(reason),
        }
    }

    /// Estimate the smoothed RPM from `frame`.
    pub fn estimate(&mut self, frame: &Frame) -> Result<RpmEstimate, EstimatorError> {
        let Some(reference) = self.reference.as_ref() else {
            return Err(EstimatorError::NoReference);
        };
        let gray = frame.to_gray();
        let current = self.detect(&gray);
        if current.len() < 2 {
            return Ok(self.degraded(DegradedReason::TooFewFeatures));
        }

        let matches = match_cross_checked(
            &reference.descriptors,
            &current.descriptors,
            self.config.good_matches,
        );
        if matches.len() < self.config.min_matches {
            return Ok(self.degraded(DegradedReason::TooFewMatches));
        }

        let (src, dst): (Vec<[f64; 2]>, Vec<[f64; 2]>) = matches
            .as_slice()
            .iter()
            .map(|m| {
                let a = reference.keypoints[m.query];
                let b = current.keypoints[m.train];
                ([a.x as f64, a.y as f64], [b.x as f64, b.y as f64])
            })
            .unzip();
        let Some(fit) = fit_rigid_ransac(&src, &dst, &self.config.ransac) else {
            return Ok(self.degraded(DegradedReason::NoTransform));
        };

        let angle_deg = fit.transform.angle_deg();
        let delta_deg = wrap_delta_deg(angle_deg - self.last_angle_deg);
        let gap = frame.index().saturating_sub(self.last_index).max(1);
        self.last_angle_deg = angle_deg;
        self.last_index = frame.index();
        self.window.push(rpm_from_delta(delta_deg / gap as f64, self.fps));
        self.rpm = self.window.mean();
        tracing::trace!(
            "frame {}: angle {:.3} delta {:.3} rpm {:.3} ({} inliers)",
            frame.index(),
            angle_deg,
            delta_deg,
            self.rpm,
            fit.num_inliers
        );

        Ok(RpmEstimate {
            rpm: self.rpm,
            status: EstimateStatus::Fresh {
                angle_deg,
                delta_deg,
                inliers: fit.num_inliers,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{draw_speckle_disc, rotate_gray};
    use approx::assert_relative_eq;
    use image::Luma;

    fn estimator() -> RotationEstimator {
        RotationEstimator::new(30.0, EstimatorConfig::default()).unwrap()
    }

    #[test]
    fn delta_wraps_into_half_open_interval() {
        assert_relative_eq!(wrap_delta_deg(190.0), -170.0);
        assert_relative_eq!(wrap_delta_deg(-190.0), 170.0);
        assert_relative_eq!(wrap_delta_deg(180.0), 180.0);
        assert_relative_eq!(wrap_delta_deg(-180.0), 180.0);
        assert_relative_eq!(wrap_delta_deg(359.0), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn rpm_from_degrees_per_frame() {
        // 0.5 deg/frame at 30 fps is 15 deg/s, one turn per 24 s.
        assert_relative_eq!(rpm_from_delta(0.5, 30.0), 2.5);
        assert_relative_eq!(rpm_from_delta(-0.5, 30.0), 2.5);
    }

    #[test]
    fn window_mean_uses_last_values() {
        let mut w = RpmWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        assert_relative_eq!(w.mean(), 3.0);
        w.clear();
        assert_relative_eq!(w.mean(), 0.0);
    }

    #[test]
    fn estimate_requires_reference() {
        let mut est = estimator();
        let frame = Frame::gray(0, draw_speckle_disc(240, 240, 3));
        assert_eq!(est.estimate(&frame), Err(EstimatorError::NoReference));
    }

    #[test]
    fn blank_reference_is_rejected() {
        let mut est = estimator();
        let blank = Frame::gray(0, GrayImage::from_pixel(240, 240, Luma([60])));
        match est.set_reference(&blank) {
            Err(EstimatorError::NoFeaturesFound { needed, found }) => {
                assert_eq!(needed, 10);
                assert_eq!(found, 0);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!est.has_reference());
    }

    #[test]
    fn identical_frame_gives_zero_rotation() {
        let mut est = estimator();
        let img = draw_speckle_disc(240, 240, 3);
        est.set_reference(&Frame::gray(0, img.clone())).unwrap();
        let e = est.estimate(&Frame::gray(1, img)).unwrap();
        match e.status {
            EstimateStatus::Fresh { delta_deg, .. } => assert!(delta_deg.abs() < 1e-6),
            other => panic!("expected fresh estimate, got {:?}", other),
        }
        assert!(e.rpm < 1e-3);
    }

    #[test]
    fn rotated_frame_gives_expected_rpm() {
        let mut est = estimator();
        let img = draw_speckle_disc(240, 240, 3);
        est.set_reference(&Frame::gray(0, img.clone())).unwrap();
        // 4 degrees between two frames at 30 fps is 20 rpm.
        let rotated = rotate_gray(&img, 4f32.to_radians());
        let e = est.estimate(&Frame::gray(1, rotated)).unwrap();
        assert!(e.is_fresh(), "status {:?}", e.status);
        assert!((e.rpm - 20.0).abs() < 2.0, "rpm {}", e.rpm);
    }

    #[test]
    fn featureless_frame_keeps_previous_rpm() {
        let mut est = estimator();
        let img = draw_speckle_disc(240, 240, 3);
        est.set_reference(&Frame::gray(0, img.clone())).unwrap();
        est.estimate(&Frame::gray(1, rotate_gray(&img, 4f32.to_radians())))
            .unwrap();
        let before = est.rpm();
        let blank = Frame::gray(2, GrayImage::from_pixel(240, 240, Luma([60])));
        let e = est.estimate(&blank).unwrap();
        assert!(!e.is_fresh());
        assert_eq!(e.rpm, before);
        assert_eq!(est.rpm(), before);
    }

    #[test]
    fn rotation_is_spread_over_skipped_frames() {
        let mut est = RotationEstimator::new(12.0, EstimatorConfig::default()).unwrap();
        let img = draw_speckle_disc(240, 240, 3);
        est.set_reference(&Frame::gray(0, img.clone())).unwrap();
        // 1 degree per frame at 12 fps is 2 rpm; estimates run every 3rd frame.
        for k in 1..=3u64 {
            let rotated = rotate_gray(&img, (3.0 * k as f32).to_radians());
            let e = est.estimate(&Frame::gray(3 * k, rotated)).unwrap();
            assert!(e.is_fresh(), "status {:?}", e.status);
        }
        assert!((est.rpm() - 2.0).abs() < 0.5, "rpm {}", est.rpm());
    }

    #[test]
    fn unmatched_frame_keeps_previous_rpm() {
        let cfg = EstimatorConfig {
            features: FeatureConfig {
                nms_radius: 6.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut est = RotationEstimator::new(30.0, cfg).unwrap();
        let img = draw_speckle_disc(240, 240, 3);
        est.set_reference(&Frame::gray(0, img.clone())).unwrap();
        est.estimate(&Frame::gray(1, rotate_gray(&img, 4f32.to_radians())))
            .unwrap();
        let before = est.rpm();

        // A single square: a handful of corners, fewer than `min_matches`.
        let mut square = GrayImage::from_pixel(240, 240, Luma([40]));
        for y in 114..126 {
            for x in 114..126 {
                square.put_pixel(x, y, Luma([255]));
            }
        }
        let e = est.estimate(&Frame::gray(2, square)).unwrap();
        assert_eq!(e.status, EstimateStatus::Degraded(DegradedReason::TooFewMatches));
        assert_eq!(e.rpm, before);
        assert_eq!(est.rpm(), before);
    }

    #[test]
    fn unfittable_matches_keep_previous_rpm() {
        let mut cfg = EstimatorConfig::default();
        cfg.ransac.min_inliers = cfg.good_matches + 1;
        let mut est = RotationEstimator::new(30.0, cfg).unwrap();
        let img = draw_speckle_disc(240, 240, 3);
        est.set_reference(&Frame::gray(0, img.clone())).unwrap();
        let e = est.estimate(&Frame::gray(1, img)).unwrap();
        assert_eq!(e.status, EstimateStatus::Degraded(DegradedReason::NoTransform));
        assert_eq!(e.rpm, 0.0);
        assert_eq!(est.rpm(), 0.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = EstimatorConfig {
            good_matches: MATCH_CAPACITY + 1,
            ..Default::default()
        };
        assert!(RotationEstimator::new(30.0, cfg).is_err());
        assert_eq!(
            RotationEstimator::new(0.0, EstimatorConfig::default()).unwrap_err(),
            ConfigError::InvalidFps(0.0)
        );
    }
}
