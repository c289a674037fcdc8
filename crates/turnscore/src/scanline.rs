//! Region-of-interest scanline extraction.
//!
//! Two coordinate systems are supported: a vertical strip whose active band
//! moves down by one `sector_height` per 30° sector, and a polar ray cast
//! from a centre point at the current rotation angle.

use crate::config::ConfigError;
use crate::frame::Frame;
use crate::timing::AngularPosition;

/// Which coordinate system a region uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiMode {
    Rectangular,
    Radial,
}

impl std::fmt::Display for RoiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rectangular => write!(f, "rectangular"),
            Self::Radial => write!(f, "radial"),
        }
    }
}

/// Configured sampling region.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScanRegion {
    /// Vertical strip at column `x` spanning `width` columns.
    Rectangular {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Ray from `(center_x, center_y)` of `max_radius` unit steps.
    Radial {
        center_x: f64,
        center_y: f64,
        max_radius: u32,
    },
}

impl ScanRegion {
    /// One-pixel strip at the frame's centre column, 50 px below the top edge.
    pub fn default_rectangular(frame_width: u32, frame_height: u32) -> Self {
        Self::Rectangular {
            x: frame_width / 2,
            y: 50,
            width: 1,
            height: frame_height.saturating_sub(100).min(880),
        }
    }

    /// Ray from the frame centre reaching the farthest corner, shortened by
    /// the spindle radius and an outer margin.
    pub fn default_radial(
        frame_width: u32,
        frame_height: u32,
        spindle_radius: u32,
        margin: u32,
    ) -> Self {
        let cx = frame_width as f64 / 2.0;
        let cy = frame_height as f64 / 2.0;
        let corner = cx.hypot(cy).floor() as u32;
        Self::Radial {
            center_x: cx,
            center_y: cy,
            max_radius: corner.saturating_sub(spindle_radius + margin),
        }
    }

    pub fn mode(&self) -> RoiMode {
        match self {
            Self::Rectangular { .. } => RoiMode::Rectangular,
            Self::Radial { .. } => RoiMode::Radial,
        }
    }
}

/// The concrete pixels read for one frame, for overlays.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessingRegion {
    /// Rows `y_start..y_end` of columns `x..x + width`.
    Strip {
        x: u32,
        y_start: u32,
        y_end: u32,
        width: u32,
    },
    Ray {
        center: [f64; 2],
        end: [f64; 2],
        angle_deg: f64,
        length: u32,
    },
}

/// Brightness samples ordered along the scan direction.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct IntensityProfile(Vec<u8>);

impl IntensityProfile {
    pub fn new(samples: Vec<u8>) -> Self {
        Self(samples)
    }

    pub fn samples(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for IntensityProfile {
    fn from(samples: Vec<u8>) -> Self {
        Self(samples)
    }
}

/// Extracted profile and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Scanline {
    pub profile: IntensityProfile,
    pub region: ProcessingRegion,
}

/// Scanline extraction parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Rows per sector band in rectangular mode.
    pub sector_height: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { sector_height: 88 }
    }
}

impl ScanConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.sector_height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan.sector_height",
                reason: "must be >= 1".into(),
            });
        }
        Ok(())
    }
}

/// Per-call extraction failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanlineError {
    /// Zero-area region, or a sector band lying entirely outside the frame.
    EmptyRegion,
}

impl std::fmt::Display for ScanlineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRegion => write!(f, "scan region is empty"),
        }
    }
}

impl std::error::Error for ScanlineError {}

/// Stateless profile extractor.
#[derive(Debug, Clone, Default)]
pub struct ScanlineExtractor {
    config: ScanConfig,
}

impl ScanlineExtractor {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Extract the profile for `position` from `frame`.
    pub fn extract(
        &self,
        frame: &Frame,
        position: &AngularPosition,
        region: &ScanRegion,
    ) -> Result<Scanline, ScanlineError> {
        match *region {
            ScanRegion::Rectangular {
                x,
                y,
                width,
                height,
            } => self.extract_strip(frame, position.sector, x, y, width, height),
            ScanRegion::Radial {
                center_x,
                center_y,
                max_radius,
            } => extract_ray(frame, position.angle_deg, center_x, center_y, max_radius),
        }
    }

    fn extract_strip(
        &self,
        frame: &Frame,
        sector: u8,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Scanline, ScanlineError> {
        if width == 0 || height == 0 {
            return Err(ScanlineError::EmptyRegion);
        }
        let (fw, fh) = frame.dimensions();
        let band = self.config.sector_height as u64;
        let y_start = y as u64 + sector as u64 * band;
        let y_end = (y_start + band).min(y as u64 + height as u64).min(fh as u64);
        let x_end = (x as u64 + width as u64).min(fw as u64) as u32;
        if y_start >= y_end || x >= x_end {
            return Err(ScanlineError::EmptyRegion);
        }
        let (y_start, y_end) = (y_start as u32, y_end as u32);

        let cols = x_end - x;
        let samples = (y_start..y_end)
            .map(|row| {
                let sum: u32 = (x..x_end).map(|col| frame.luma(col, row) as u32).sum();
                ((sum + cols / 2) / cols) as u8
            })
            .collect::<Vec<u8>>();

        Ok(Scanline {
            profile: IntensityProfile(samples),
            region: ProcessingRegion::Strip {
                x,
                y_start,
                y_end,
                width: cols,
            },
        })
    }
}

fn extract_ray(
    frame: &Frame,
    angle_deg: f64,
    cx: f64,
    cy: f64,
    max_radius: u32,
) -> Result<Scanline, ScanlineError> {
    if max_radius == 0 {
        return Err(ScanlineError::EmptyRegion);
    }
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let samples = (0..max_radius)
        .map(|r| {
            let px = (cx + r as f64 * cos).floor() as i64;
            let py = (cy + r as f64 * sin).floor() as i64;
            frame.luma_checked(px, py).unwrap_or(0)
        })
        .collect::<Vec<u8>>();
    let reach = max_radius as f64;
    Ok(Scanline {
        profile: IntensityProfile(samples),
        region: ProcessingRegion::Ray {
            center: [cx, cy],
            end: [cx + reach * cos, cy + reach * sin],
            angle_deg,
            length: max_radius,
        },
    })
}
