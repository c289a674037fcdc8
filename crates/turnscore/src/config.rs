//! Top-level configuration tree and the setup-time error type.
//!
//! Every section carries `#[serde(default)]`, so a JSON file only needs to
//! name the fields it overrides.

use std::path::{Path, PathBuf};

use crate::estimator::EstimatorConfig;
use crate::mapping::{MappingConfig, ScaleLibrary};
use crate::recorder::RecorderConfig;
use crate::scanline::ScanConfig;

/// Errors detected while validating configuration. Fatal at setup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Rotation rate must be finite and strictly positive.
    InvalidRpm(f64),
    /// Frame rate must be finite and strictly positive.
    InvalidFps(f64),
    /// A `[min, max]` pair is inverted or leaves its allowed domain.
    InvalidRange {
        /// Offending field name.
        field: &'static str,
        /// Configured lower bound.
        min: f64,
        /// Configured upper bound.
        max: f64,
    },
    /// A scalar field is outside its allowed domain.
    InvalidValue {
        /// Offending field name.
        field: &'static str,
        /// Human readable constraint.
        reason: String,
    },
    /// Scale name is neither builtin nor defined in the scale library.
    UnknownScale(String),
    /// Scale has no pitch inside the 88-key piano lattice.
    ScaleOutOfRange(String),
    /// Note name such as `"F#6"` could not be parsed.
    InvalidNoteName(String),
    /// Configuration file could not be read or parsed.
    Load {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying error message.
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRpm(rpm) => write!(f, "rpm must be > 0, got {}", rpm),
            Self::InvalidFps(fps) => write!(f, "fps must be > 0, got {}", fps),
            Self::InvalidRange { field, min, max } => {
                write!(f, "invalid range for {}: [{}, {}]", field, min, max)
            }
            Self::InvalidValue { field, reason } => write!(f, "invalid {}: {}", field, reason),
            Self::UnknownScale(name) => write!(f, "unknown scale '{}'", name),
            Self::ScaleOutOfRange(name) => {
                write!(f, "scale '{}' has no pitch within the piano range 21..=108", name)
            }
            Self::InvalidNoteName(name) => write!(f, "invalid note name '{}'", name),
            Self::Load { path, reason } => {
                write!(f, "failed to load config {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Nominal rotation and rotation-detection policy.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Configured turntable speed, used until a fresh estimate replaces it.
    pub nominal_rpm: f64,
    /// Run the vision-based rotation estimator.
    pub detect_rpm: bool,
    /// Estimates at or below this value are treated as noise.
    pub min_valid_rpm: f64,
    /// Run the estimator on every N-th frame.
    pub estimate_every: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            nominal_rpm: 2.5,
            detect_rpm: false,
            min_valid_rpm: 0.5,
            estimate_every: 1,
        }
    }
}

impl RotationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.nominal_rpm.is_finite() && self.nominal_rpm > 0.0) {
            return Err(ConfigError::InvalidRpm(self.nominal_rpm));
        }
        if !(self.min_valid_rpm.is_finite() && self.min_valid_rpm >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "rotation.min_valid_rpm",
                reason: "must be a finite value >= 0".into(),
            });
        }
        if self.estimate_every == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rotation.estimate_every",
                reason: "must be >= 1".into(),
            });
        }
        Ok(())
    }
}

/// Per-frame processing cadence.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Map (and record) every N-th frame; 1 processes all frames.
    pub frame_skip: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { frame_skip: 1 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TurnscoreConfig {
    /// Nominal RPM and detection policy.
    pub rotation: RotationConfig,
    /// Feature-based rotation estimator tuning.
    pub estimator: EstimatorConfig,
    /// Scanline extraction.
    pub scan: ScanConfig,
    /// Pixel-to-note mapping.
    pub mapping: MappingConfig,
    /// Active scale and custom scale definitions.
    pub scales: ScaleLibrary,
    /// One-rotation recording.
    pub recorder: RecorderConfig,
    /// Processing cadence.
    pub pipeline: PipelineConfig,
}

impl TurnscoreConfig {
    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data).map_err(|e| ConfigError::Load {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section; the first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rotation.validate()?;
        self.estimator.validate()?;
        self.scan.validate()?;
        self.mapping.validate()?;
        self.scales.resolve(&self.scales.default_scale)?;
        if self.pipeline.frame_skip == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.frame_skip",
                reason: "must be >= 1".into(),
            });
        }
        Ok(())
    }
}
