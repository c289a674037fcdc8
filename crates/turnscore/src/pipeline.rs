//! Per-frame pass: estimate rotation -> compute angle -> extract scanline ->
//! map -> emit -> optionally record.
//!
//! One [`TurntablePipeline`] owns all frame-to-frame state (rotation,
//! estimator, mapper RNG, recorder). Frames come from a [`FrameSource`] and
//! chords leave through a [`ChordSink`]; both are implemented by callers.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{ConfigError, TurnscoreConfig};
use crate::estimator::{EstimateStatus, RotationEstimator};
use crate::frame::Frame;
use crate::mapping::{Chord, PixelToMusicMapper};
use crate::recorder::{Recording, RecorderError, RecorderPhase, RotationRecorder};
use crate::scanline::{ProcessingRegion, ScanRegion, ScanlineError, ScanlineExtractor};
use crate::timing::RotationState;

/// Supplies frames in index order.
pub trait FrameSource {
    /// Next frame, or `None` when the source is exhausted or stalled.
    fn next_frame(&mut self) -> Option<Frame>;
    /// Nominal frame rate.
    fn fps(&self) -> f64;
}

/// Receives chords. Must not block the pipeline.
pub trait ChordSink {
    fn emit(&mut self, chord: &Chord);
}

impl ChordSink for Vec<Chord> {
    fn emit(&mut self, chord: &Chord) {
        self.push(chord.clone());
    }
}

/// Live mapping from camera frames, or looping playback of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum PipelineMode {
    Live,
    Playback,
}

/// What a rendering layer needs to draw the current frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OverlayState {
    pub angle_deg: f64,
    pub sector: u8,
    /// Pixels read for the last processed frame.
    pub roi_region: Option<ProcessingRegion>,
    pub recording: bool,
    pub rpm: f64,
    /// Whether the last estimate was fresh.
    pub rpm_fresh: bool,
}

/// Counters over the lifetime of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStats {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub chords_emitted: u64,
    pub notes_emitted: u64,
    pub estimates_fresh: u64,
    pub estimates_degraded: u64,
    pub estimate_errors: u64,
    pub scan_errors: u64,
    pub rotations_recorded: u64,
}

/// Result of one [`TurntablePipeline::process_frame`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Not a processing frame under `frame_skip`.
    Skipped,
    /// A chord (possibly empty) was emitted.
    Emitted { notes: usize },
    /// The scan region was empty for this frame; nothing was emitted.
    ScanFailed(ScanlineError),
    /// A chord was emitted and it closed the recorded rotation.
    RotationComplete { notes: usize },
}

/// Setup and storage failures.
#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigError),
    Recorder(RecorderError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {}", err),
            Self::Recorder(err) => write!(f, "recorder error: {}", err),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<RecorderError> for PipelineError {
    fn from(err: RecorderError) -> Self {
        Self::Recorder(err)
    }
}

/// Owner of every per-frame state transition.
#[derive(Debug)]
pub struct TurntablePipeline {
    config: TurnscoreConfig,
    mode: PipelineMode,
    rotation: RotationState,
    estimator: Option<RotationEstimator>,
    extractor: ScanlineExtractor,
    mapper: PixelToMusicMapper,
    recorder: RotationRecorder,
    region: ScanRegion,
    record_pending: bool,
    overlay: OverlayState,
    stats: PipelineStats,
}

impl TurntablePipeline {
    /// Validate `config` and build all components for a source at `fps`.
    pub fn new(config: TurnscoreConfig, fps: f64, region: ScanRegion) -> Result<Self, PipelineError> {
        config.validate()?;
        let rotation = RotationState::new(config.rotation.nominal_rpm, fps)?;
        let estimator = if config.rotation.detect_rpm {
            Some(RotationEstimator::new(fps, config.estimator.clone())?)
        } else {
            None
        };
        let scale = config.scales.active()?;
        let mapper = PixelToMusicMapper::new(config.mapping.clone(), scale)?;
        let mut recorder = RotationRecorder::new(config.mapping.clone());
        recorder.set_frame_step(config.pipeline.frame_skip);
        tracing::info!(
            "pipeline ready: {} rpm at {} fps ({} frames/rotation), scale '{}', {} roi",
            rotation.rpm(),
            fps,
            rotation.frames_per_rotation(),
            mapper.scale().name,
            region.mode()
        );
        Ok(Self {
            extractor: ScanlineExtractor::new(config.scan.clone()),
            record_pending: config.recorder.record,
            overlay: OverlayState {
                angle_deg: 0.0,
                sector: 0,
                roi_region: None,
                recording: false,
                rpm: rotation.rpm(),
                rpm_fresh: false,
            },
            stats: PipelineStats::default(),
            mode: PipelineMode::Live,
            config,
            rotation,
            estimator,
            mapper,
            recorder,
            region,
        })
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn rotation(&self) -> &RotationState {
        &self.rotation
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn recorder(&self) -> &RotationRecorder {
        &self.recorder
    }

    pub fn current_overlay_state(&self) -> OverlayState {
        self.overlay.clone()
    }

    /// Start recording at the next processed frame.
    pub fn request_recording(&mut self) {
        self.record_pending = true;
    }

    /// Switch to looping playback of `recording`.
    pub fn enter_playback(&mut self, recording: Recording) -> Result<(), PipelineError> {
        let rotation = RotationState::new(recording.metadata.rpm, recording.metadata.fps)?;
        self.recorder.load(recording)?;
        self.rotation = rotation;
        self.mode = PipelineMode::Playback;
        self.record_pending = false;
        tracing::info!("playback mode: {} frames/rotation", rotation.frames_per_rotation());
        Ok(())
    }

    fn update_rotation(&mut self, frame: &Frame) {
        let Some(estimator) = self.estimator.as_mut() else {
            return;
        };
        if !estimator.has_reference() {
            if let Err(err) = estimator.set_reference(frame) {
                tracing::warn!("frame {}: {}", frame.index(), err);
                self.stats.estimate_errors += 1;
            }
            return;
        }
        if frame.index() % self.config.rotation.estimate_every != 0 {
            return;
        }
        match estimator.estimate(frame) {
            Ok(estimate) => {
                self.overlay.rpm_fresh = estimate.is_fresh();
                if let EstimateStatus::Fresh { .. } = estimate.status {
                    self.stats.estimates_fresh += 1;
                    if estimate.rpm > self.config.rotation.min_valid_rpm {
                        match self.rotation.with_rpm(estimate.rpm) {
                            Ok(rotation) => {
                                self.rotation = rotation;
                                self.recorder.update_rotation(&rotation);
                            }
                            Err(err) => tracing::warn!("rejected rpm estimate: {}", err),
                        }
                    }
                } else {
                    self.stats.estimates_degraded += 1;
                }
            }
            Err(err) => {
                tracing::warn!("frame {}: {}", frame.index(), err);
                self.stats.estimate_errors += 1;
            }
        }
        self.overlay.rpm = self.rotation.rpm();
    }

    /// Run one frame through the pipeline and emit its chord to `sink`.
    ///
    /// Per-frame failures are counted and logged; only storage errors while
    /// saving a finished session are returned.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        sink: &mut dyn ChordSink,
    ) -> Result<FrameOutcome, PipelineError> {
        self.stats.frames_seen += 1;
        let index = frame.index();

        if self.mode == PipelineMode::Playback {
            let position = self.rotation.position(index);
            self.overlay.angle_deg = position.angle_deg;
            self.overlay.sector = position.sector;
            let chord = self.recorder.play(index)?;
            return Ok(self.emit(&chord, sink));
        }

        self.update_rotation(frame);
        let position = self.rotation.position(index);
        self.overlay.angle_deg = position.angle_deg;
        self.overlay.sector = position.sector;
        if index % self.config.pipeline.frame_skip != 0 {
            return Ok(FrameOutcome::Skipped);
        }

        if self.record_pending {
            self.record_pending = false;
            self.recorder.start(
                index,
                &self.rotation,
                self.mapper.scale().clone(),
                self.region.mode(),
            );
        }
        self.overlay.recording = self.recorder.is_recording();

        let scanline = match self.extractor.extract(frame, &position, &self.region) {
            Ok(s) => s,
            Err(err) => {
                tracing::debug!("frame {}: {}", index, err);
                self.stats.scan_errors += 1;
                self.overlay.roi_region = None;
                return Ok(FrameOutcome::ScanFailed(err));
            }
        };
        self.overlay.roi_region = Some(scanline.region);

        let chord = self.mapper.map(&scanline.profile);
        let outcome = self.emit(&chord, sink);
        if !self.recorder.is_recording() {
            return Ok(outcome);
        }

        let notes = chord.len();
        self.recorder
            .add(index, chord, scanline.profile, position.sector);
        if !self.recorder.check_complete(index) {
            return Ok(outcome);
        }
        self.stats.rotations_recorded += 1;
        self.overlay.recording = false;
        if let Some(dir) = &self.config.recorder.session_dir {
            self.recorder.save_session(dir)?;
        }
        Ok(FrameOutcome::RotationComplete { notes })
    }

    fn emit(&mut self, chord: &Chord, sink: &mut dyn ChordSink) -> FrameOutcome {
        sink.emit(chord);
        self.stats.frames_processed += 1;
        self.stats.chords_emitted += 1;
        self.stats.notes_emitted += chord.len() as u64;
        FrameOutcome::Emitted { notes: chord.len() }
    }

    /// Process frames until the source ends, `cancel` is set, or a rotation
    /// is captured with `exit_on_complete`.
    ///
    /// An unfinished recording is discarded when the run stops.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn ChordSink,
        cancel: &AtomicBool,
    ) -> Result<PipelineStats, PipelineError> {
        loop {
            if cancel.load(Ordering::Relaxed) {
                tracing::info!("pipeline cancelled");
                break;
            }
            let Some(frame) = source.next_frame() else {
                tracing::info!("frame source ended");
                break;
            };
            let outcome = self.process_frame(&frame, sink)?;
            if matches!(outcome, FrameOutcome::RotationComplete { .. })
                && self.config.recorder.exit_on_complete
            {
                break;
            }
        }
        if self.recorder.phase() == RecorderPhase::Recording {
            self.recorder.abort();
            self.overlay.recording = false;
        }
        tracing::info!(
            "processed {} of {} frames, {} notes",
            self.stats.frames_processed,
            self.stats.frames_seen,
            self.stats.notes_emitted
        );
        Ok(self.stats.clone())
    }
}
