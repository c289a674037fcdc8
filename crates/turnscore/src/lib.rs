//! turnscore — rotational position and pixel-to-music engine for a
//! camera-observed turntable.
//!
//! A synthetic angular clock follows the physical platter, the image region
//! under the current angle is sampled, and its intensities become a bounded,
//! scale-quantized chord every frame. The stages are:
//!
//! 1. **Estimator** – FAST/BRIEF feature matching against a reference frame
//!    and a RANSAC rigid fit track the platter's rotation rate.
//! 2. **Timing** – frames per rotation, angle and 30° sector of any frame.
//! 3. **Scanline** – a rectangular strip (sector band) or a radial ray.
//! 4. **Mapping** – inversion, resampling to 88 keys, scale quantization,
//!    velocity shaping and note selection.
//! 5. **Recorder** – capture, persist and replay exactly one rotation.
//!
//! [`TurntablePipeline`] wires the stages together behind the
//! [`FrameSource`] and [`ChordSink`] traits.

mod config;
mod estimator;
mod features;
mod frame;
mod mapping;
mod pipeline;
mod recorder;
mod rigid;
mod scanline;
#[cfg(test)]
mod test_utils;
mod timing;

pub use config::{ConfigError, PipelineConfig, RotationConfig, TurnscoreConfig};
pub use estimator::{
    rpm_from_delta, wrap_delta_deg, DegradedReason, EstimateStatus, EstimatorConfig,
    EstimatorError, RotationEstimator, RpmEstimate,
};
pub use features::{
    hamming_distance, match_cross_checked, BriefPattern, CircularMask, Descriptor,
    FeatureConfig, FeatureDetector, FeatureMatch, FeatureSet, Keypoint, MatchSet,
    MATCH_CAPACITY,
};
pub use frame::{luma_601, Frame, FramePixels};
pub use mapping::{
    expand_pitch_classes, parse_note_name, resample_linear, Chord, MappingConfig, MappingLaw,
    NoteEvent, PixelToMusicMapper, Scale, ScaleDefinition, ScaleLibrary, SelectionPolicy,
    BUILTIN_SCALES, KEYBOARD_LEN, PIANO_HIGH, PIANO_LOW,
};
pub use pipeline::{
    ChordSink, FrameOutcome, FrameSource, OverlayState, PipelineError, PipelineMode,
    PipelineStats, TurntablePipeline,
};
pub use recorder::{
    ProfileFrame, RecordedFrame, RecorderConfig, RecorderError, RecorderPhase, Recording,
    RecordingMetadata, RecordingPayload, RotationRecorder, PANORAMA_FILE, SCORE_FILE,
};
pub use rigid::{
    fit_rigid_least_squares, fit_rigid_ransac, RansacRigidConfig, RansacRigidResult,
    RigidTransform,
};
pub use scanline::{
    IntensityProfile, ProcessingRegion, RoiMode, ScanConfig, ScanRegion, Scanline,
    ScanlineError, ScanlineExtractor,
};
pub use timing::{AngularPosition, RotationState, SECTOR_COUNT, SECTOR_DEG};
