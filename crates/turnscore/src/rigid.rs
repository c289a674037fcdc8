//! 2-D rigid transform (rotation + translation) fitting.
//!
//! Least-squares closed form on centred correspondences and a RANSAC wrapper
//! sampling 2-point minimal subsets.

use nalgebra::{Matrix2x3, Point2, Rotation2, Vector2};

/// Rotation followed by translation: `dst = R * src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub rotation: Rotation2<f64>,
    pub translation: Vector2<f64>,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation2::identity(),
            translation: Vector2::zeros(),
        }
    }

    pub fn new(angle_rad: f64, tx: f64, ty: f64) -> Self {
        Self {
            rotation: Rotation2::new(angle_rad),
            translation: Vector2::new(tx, ty),
        }
    }

    /// 2x3 `[R | t]` matrix.
    pub fn matrix(&self) -> Matrix2x3<f64> {
        let r = self.rotation.matrix();
        Matrix2x3::new(
            r[(0, 0)],
            r[(0, 1)],
            self.translation.x,
            r[(1, 0)],
            r[(1, 1)],
            self.translation.y,
        )
    }

    /// Rotation angle in degrees, `atan2(m10, m00)`.
    pub fn angle_deg(&self) -> f64 {
        let m = self.matrix();
        m[(1, 0)].atan2(m[(0, 0)]).to_degrees()
    }

    #[inline]
    pub fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let q = self.rotation * Point2::new(p[0], p[1]) + self.translation;
        [q.x, q.y]
    }

    /// Euclidean residual of one correspondence.
    #[inline]
    pub fn residual(&self, src: [f64; 2], dst: [f64; 2]) -> f64 {
        let q = self.apply(src);
        ((q[0] - dst[0]).powi(2) + (q[1] - dst[1]).powi(2)).sqrt()
    }
}

/// Closed-form least-squares rigid fit of `src[i] -> dst[i]`.
///
/// Returns `None` for fewer than two pairs or when the rotation is undefined
/// (all points coincide).
pub fn fit_rigid_least_squares(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<RigidTransform> {
    let n = src.len().min(dst.len());
    if n < 2 {
        return None;
    }
    let centroid = |pts: &[[f64; 2]]| {
        let (sx, sy) = pts[..n]
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
        Vector2::new(sx / n as f64, sy / n as f64)
    };
    let ca = centroid(src);
    let cb = centroid(dst);

    let mut dot = 0.0;
    let mut cross = 0.0;
    for (a, b) in src[..n].iter().zip(&dst[..n]) {
        let (ax, ay) = (a[0] - ca.x, a[1] - ca.y);
        let (bx, by) = (b[0] - cb.x, b[1] - cb.y);
        dot += ax * bx + ay * by;
        cross += ax * by - ay * bx;
    }
    if dot.abs() < 1e-12 && cross.abs() < 1e-12 {
        return None;
    }

    let rotation = Rotation2::new(cross.atan2(dot));
    let translation = cb - rotation * ca;
    Some(RigidTransform {
        rotation,
        translation,
    })
}

/// RANSAC parameters for rigid fitting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RansacRigidConfig {
    /// Maximum number of 2-point hypotheses.
    pub max_iters: usize,
    /// Reprojection residual (pixels) below which a pair is an inlier.
    pub inlier_threshold: f64,
    /// Minimum inliers for a model to be accepted.
    pub min_inliers: usize,
    /// RNG seed.
    pub seed: u64,
}

impl Default for RansacRigidConfig {
    fn default() -> Self {
        Self {
            max_iters: 200,
            inlier_threshold: 3.0,
            min_inliers: 6,
            seed: 42,
        }
    }
}

/// Result of a RANSAC rigid fit.
#[derive(Debug, Clone)]
pub struct RansacRigidResult {
    pub transform: RigidTransform,
    pub num_inliers: usize,
    pub inlier_mask: Vec<bool>,
}

fn count_inliers(
    model: &RigidTransform,
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    threshold: f64,
) -> (usize, Vec<bool>) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&a, &b)| model.residual(a, b) < threshold)
        .collect();
    (mask.iter().filter(|&&m| m).count(), mask)
}

/// Fit a rigid transform robustly from noisy correspondences.
///
/// The model with the most inliers is refit on its inliers and the inlier set
/// recounted with the refined model.
pub fn fit_rigid_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    config: &RansacRigidConfig,
) -> Option<RansacRigidResult> {
    use rand::prelude::*;

    let n = src.len().min(dst.len());
    if n < 2 {
        return None;
    }
    let (src, dst) = (&src[..n], &dst[..n]);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_count = 0usize;
    let mut best_model: Option<RigidTransform> = None;
    let mut best_mask = vec![false; n];

    for _ in 0..config.max_iters {
        let sample = sample_indices(&mut rng, n, 2);
        let (i, j) = (sample[0], sample[1]);

        // A rigid motion preserves the distance between the two samples.
        let d_src = ((src[i][0] - src[j][0]).powi(2) + (src[i][1] - src[j][1]).powi(2)).sqrt();
        let d_dst = ((dst[i][0] - dst[j][0]).powi(2) + (dst[i][1] - dst[j][1]).powi(2)).sqrt();
        if d_src < 1e-6 || (d_src - d_dst).abs() > 2.0 * config.inlier_threshold {
            continue;
        }

        let Some(model) = fit_rigid_least_squares(&[src[i], src[j]], &[dst[i], dst[j]]) else {
            continue;
        };
        let (count, mask) = count_inliers(&model, src, dst, config.inlier_threshold);
        if count > best_count {
            best_count = count;
            best_model = Some(model);
            best_mask = mask;

            if best_count * 10 > n * 9 {
                break;
            }
        }
    }

    if best_count < config.min_inliers.max(2) {
        return None;
    }

    let (in_src, in_dst): (Vec<[f64; 2]>, Vec<[f64; 2]>) = best_mask
        .iter()
        .zip(src.iter().zip(dst))
        .filter(|(&m, _)| m)
        .map(|(_, (&a, &b))| (a, b))
        .unzip();
    let transform = fit_rigid_least_squares(&in_src, &in_dst).or(best_model)?;
    let (num_inliers, inlier_mask) = count_inliers(&transform, src, dst, config.inlier_threshold);

    Some(RansacRigidResult {
        transform,
        num_inliers,
        inlier_mask,
    })
}

/// Sample `k` distinct indices from `0..n` using Fisher–Yates partial shuffle.
fn sample_indices(rng: &mut impl rand::Rng, n: usize, k: usize) -> Vec<usize> {
    debug_assert!(k <= n);
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}
