//! Angular timing model.
//!
//! Pure functions of `(rpm, fps)`: rotation period, frames per rotation and
//! per sector, and the angular position of any frame index. The turntable is
//! divided into [`SECTOR_COUNT`] contiguous 30° sectors.

use std::ops::Range;

use crate::config::ConfigError;

/// Number of fixed angular sectors per rotation.
pub const SECTOR_COUNT: u32 = 12;

/// Angular width of one sector in degrees.
pub const SECTOR_DEG: f64 = 360.0 / SECTOR_COUNT as f64;

/// Rotation rate and frame rate with derived frame counts.
///
/// `frames_per_rotation` is always at least 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationState {
    rpm: f64,
    fps: f64,
    frames_per_rotation: u64,
}

/// Angular position of one frame. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct AngularPosition {
    /// `frame_index mod frames_per_rotation`.
    pub frame_in_rotation: u64,
    /// Fraction of the rotation in `[0, 1)`.
    pub progress: f64,
    /// Angle in degrees in `[0, 360)`.
    pub angle_deg: f64,
    /// Sector index in `0..12`.
    pub sector: u8,
}

impl RotationState {
    /// Build a state; `rpm` and `fps` must be finite and strictly positive.
    pub fn new(rpm: f64, fps: f64) -> Result<Self, ConfigError> {
        if !(rpm.is_finite() && rpm > 0.0) {
            return Err(ConfigError::InvalidRpm(rpm));
        }
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ConfigError::InvalidFps(fps));
        }
        let frames = (60.0 / rpm * fps).round();
        let frames_per_rotation = if frames >= 1.0 { frames as u64 } else { 1 };
        Ok(Self {
            rpm,
            fps,
            frames_per_rotation,
        })
    }

    /// Same frame rate, new rotation rate.
    pub fn with_rpm(&self, rpm: f64) -> Result<Self, ConfigError> {
        Self::new(rpm, self.fps)
    }

    /// Rotation rate in revolutions per minute.
    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    /// Frame rate in frames per second.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Rotation period in seconds.
    pub fn period(&self) -> f64 {
        60.0 / self.rpm
    }

    /// Duration of one sector in seconds.
    pub fn sector_period(&self) -> f64 {
        self.period() / SECTOR_COUNT as f64
    }

    pub fn frames_per_rotation(&self) -> u64 {
        self.frames_per_rotation
    }

    /// `floor(frames_per_rotation / 12)`.
    pub fn frames_per_sector(&self) -> u64 {
        self.frames_per_rotation / SECTOR_COUNT as u64
    }

    pub fn degrees_per_frame(&self) -> f64 {
        360.0 / self.frames_per_rotation as f64
    }

    /// Angular position of `frame_index`.
    ///
    /// The sector is computed in integer arithmetic so sector boundaries fall
    /// on exact frame indices.
    pub fn position(&self, frame_index: u64) -> AngularPosition {
        let fpr = self.frames_per_rotation;
        let pos = frame_index % fpr;
        let progress = pos as f64 / fpr as f64;
        let sector = ((pos * SECTOR_COUNT as u64) / fpr) as u8;
        AngularPosition {
            frame_in_rotation: pos,
            progress,
            angle_deg: progress * 360.0,
            sector,
        }
    }

    pub fn angle_for_frame(&self, frame_index: u64) -> f64 {
        self.position(frame_index).angle_deg
    }

    pub fn sector_for_frame(&self, frame_index: u64) -> u8 {
        self.position(frame_index).sector
    }

    /// Frames (relative to the rotation start) covered by `sector`.
    pub fn sector_frame_span(&self, sector: u8) -> Range<u64> {
        let fpr = self.frames_per_rotation;
        let n = SECTOR_COUNT as u64;
        let s = (sector as u64).min(n - 1);
        let start = (s * fpr).div_ceil(n);
        let end = ((s + 1) * fpr).div_ceil(n);
        start..end
    }
}
