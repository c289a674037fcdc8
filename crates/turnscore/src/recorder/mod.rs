//! One-rotation recorder and player.
//!
//! `Idle -> Recording -> Finalized`. A recording captures the chords and raw
//! profiles of exactly one revolution; a finalized recording (captured or
//! loaded) is replayed by `frame_index mod frames_per_rotation`.

mod storage;

use std::path::{Path, PathBuf};

use crate::config::ConfigError;
use crate::mapping::{Chord, MappingConfig, PixelToMusicMapper, Scale};
use crate::scanline::{IntensityProfile, RoiMode};
use crate::timing::RotationState;

pub use storage::{PANORAMA_FILE, SCORE_FILE};

/// Recording policy.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Start recording automatically when the pipeline starts.
    pub record: bool,
    /// Where finalized sessions are written; `None` keeps them in memory.
    pub session_dir: Option<PathBuf>,
    /// Stop the pipeline once a rotation has been captured.
    pub exit_on_complete: bool,
}

/// Storage-layer failures. In-memory state is never modified on error.
#[derive(Debug)]
pub enum RecorderError {
    /// Operation needs a finalized recording.
    NotFinalized,
    /// Document could not be encoded or decoded.
    Serialization(String),
    Io(std::io::Error),
    /// Panorama image could not be encoded or decoded.
    Image(String),
    /// The recording's scale cannot drive a mapper.
    Config(ConfigError),
}

impl std::fmt::Display for RecorderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFinalized => write!(f, "no finalized recording"),
            Self::Serialization(msg) => write!(f, "recording serialization failed: {}", msg),
            Self::Io(err) => write!(f, "recording I/O failed: {}", err),
            Self::Image(msg) => write!(f, "panorama image failed: {}", msg),
            Self::Config(err) => write!(f, "recording scale rejected: {}", err),
        }
    }
}

impl std::error::Error for RecorderError {}

/// Rotation parameters and context captured with a recording.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecordingMetadata {
    pub rpm: f64,
    pub fps: f64,
    pub frames_per_rotation: u64,
    pub scale: Scale,
    pub roi_mode: RoiMode,
    /// Seconds since the Unix epoch.
    pub created_at_unix_s: u64,
}

impl RecordingMetadata {
    pub fn new(rotation: &RotationState, scale: Scale, roi_mode: RoiMode) -> Self {
        let created_at_unix_s = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            rpm: rotation.rpm(),
            fps: rotation.fps(),
            frames_per_rotation: rotation.frames_per_rotation(),
            scale,
            roi_mode,
            created_at_unix_s,
        }
    }
}

/// A captured frame with its chord.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub relative_index: u64,
    pub chord: Chord,
    pub profile: IntensityProfile,
    pub sector: u8,
}

/// A captured frame without chord; replay re-maps the profile.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProfileFrame {
    pub relative_index: u64,
    pub profile: IntensityProfile,
}

/// Frames of one rotation, sorted by strictly increasing `relative_index`.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingPayload {
    WithChords(Vec<RecordedFrame>),
    ProfilesOnly(Vec<ProfileFrame>),
}

impl RecordingPayload {
    pub fn len(&self) -> usize {
        match self {
            Self::WithChords(f) => f.len(),
            Self::ProfilesOnly(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Relative indices and raw profiles in order.
    pub fn profiles(&self) -> Vec<(u64, &IntensityProfile)> {
        match self {
            Self::WithChords(f) => f.iter().map(|r| (r.relative_index, &r.profile)).collect(),
            Self::ProfilesOnly(f) => f.iter().map(|r| (r.relative_index, &r.profile)).collect(),
        }
    }
}

/// One revolution of captured data.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub metadata: RecordingMetadata,
    pub payload: RecordingPayload,
}

impl Recording {
    /// Relative indices must be strictly increasing for lookup.
    fn check_order(&self) -> Result<(), RecorderError> {
        let profiles = self.payload.profiles();
        if profiles.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(RecorderError::Serialization(
                "frame indices must be strictly increasing".into(),
            ));
        }
        Ok(())
    }

    /// Position of `relative_index` in the payload.
    fn position(&self, relative_index: u64) -> Option<usize> {
        match &self.payload {
            RecordingPayload::WithChords(f) => f
                .binary_search_by_key(&relative_index, |r| r.relative_index)
                .ok(),
            RecordingPayload::ProfilesOnly(f) => f
                .binary_search_by_key(&relative_index, |r| r.relative_index)
                .ok(),
        }
    }
}

/// Public view of the recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RecorderPhase {
    Idle,
    Recording,
    Finalized,
}

#[derive(Debug)]
enum RecorderState {
    Idle,
    Recording {
        start_frame: u64,
        rotation: RotationState,
        scale: Scale,
        roi_mode: RoiMode,
        frames: Vec<RecordedFrame>,
    },
    Finalized {
        recording: Recording,
        /// Present for profile-only recordings.
        mapper: Option<PixelToMusicMapper>,
    },
}

/// Captures one rotation and plays it back.
#[derive(Debug)]
pub struct RotationRecorder {
    mapping: MappingConfig,
    /// Distance between consecutive processed frames.
    frame_step: u64,
    state: RecorderState,
}

impl RotationRecorder {
    /// `mapping` drives re-mapping of profile-only recordings.
    pub fn new(mapping: MappingConfig) -> Self {
        Self {
            mapping,
            frame_step: 1,
            state: RecorderState::Idle,
        }
    }

    /// Frames are added every `step` frames (the pipeline's frame skip).
    pub fn set_frame_step(&mut self, step: u64) {
        self.frame_step = step.max(1);
    }

    pub fn phase(&self) -> RecorderPhase {
        match self.state {
            RecorderState::Idle => RecorderPhase::Idle,
            RecorderState::Recording { .. } => RecorderPhase::Recording,
            RecorderState::Finalized { .. } => RecorderPhase::Finalized,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.phase() == RecorderPhase::Recording
    }

    /// Frames captured so far in the current recording.
    pub fn captured(&self) -> usize {
        match &self.state {
            RecorderState::Recording { frames, .. } => frames.len(),
            RecorderState::Finalized { recording, .. } => recording.payload.len(),
            RecorderState::Idle => 0,
        }
    }

    /// The finalized recording, if any.
    pub fn recording(&self) -> Option<&Recording> {
        match &self.state {
            RecorderState::Finalized { recording, .. } => Some(recording),
            _ => None,
        }
    }

    /// Begin a fresh recording at `frame_index`, discarding any previous one.
    pub fn start(
        &mut self,
        frame_index: u64,
        rotation: &RotationState,
        scale: Scale,
        roi_mode: RoiMode,
    ) {
        if self.is_recording() {
            tracing::warn!("restarting an unfinished recording at frame {}", frame_index);
        }
        tracing::info!(
            "recording started at frame {} ({} frames per rotation)",
            frame_index,
            rotation.frames_per_rotation()
        );
        self.state = RecorderState::Recording {
            start_frame: frame_index,
            rotation: *rotation,
            scale,
            roi_mode,
            frames: Vec::with_capacity(rotation.frames_per_rotation() as usize),
        };
    }

    /// Append a frame. No-op unless recording; stale indices and frames
    /// past the end of the rotation are ignored.
    pub fn add(&mut self, frame_index: u64, chord: Chord, profile: IntensityProfile, sector: u8) {
        let RecorderState::Recording {
            start_frame,
            rotation,
            frames,
            ..
        } = &mut self.state
        else {
            return;
        };
        let Some(relative_index) = frame_index.checked_sub(*start_frame) else {
            return;
        };
        if relative_index >= rotation.frames_per_rotation() {
            tracing::debug!("ignoring frame {} past the recorded rotation", frame_index);
            return;
        }
        if frames
            .last()
            .is_some_and(|last| last.relative_index >= relative_index)
        {
            tracing::debug!("ignoring out-of-order frame {}", frame_index);
            return;
        }
        frames.push(RecordedFrame {
            relative_index,
            chord,
            profile,
            sector,
        });
    }

    /// Follow RPM drift while recording.
    pub fn update_rotation(&mut self, new_rotation: &RotationState) {
        if let RecorderState::Recording { rotation, .. } = &mut self.state {
            *rotation = *new_rotation;
        }
    }

    /// Finalize once `frame_index` is the last processed frame of the
    /// rotation, i.e. the next one (`frame_step` later) would wrap.
    ///
    /// Returns `true` exactly once per recording.
    pub fn check_complete(&mut self, frame_index: u64) -> bool {
        let step = self.frame_step;
        let done = match &self.state {
            RecorderState::Recording {
                start_frame,
                rotation,
                ..
            } => frame_index
                .checked_sub(*start_frame)
                .is_some_and(|rel| rel + step >= rotation.frames_per_rotation()),
            _ => false,
        };
        if !done {
            return false;
        }
        let RecorderState::Recording {
            rotation,
            scale,
            roi_mode,
            frames,
            ..
        } = std::mem::replace(&mut self.state, RecorderState::Idle)
        else {
            return false;
        };
        tracing::info!(
            "rotation captured at frame {}: {} frames",
            frame_index,
            frames.len()
        );
        self.state = RecorderState::Finalized {
            recording: Recording {
                metadata: RecordingMetadata::new(&rotation, scale, roi_mode),
                payload: RecordingPayload::WithChords(frames),
            },
            mapper: None,
        };
        true
    }

    /// Discard an in-progress recording. Returns whether one was dropped.
    pub fn abort(&mut self) -> bool {
        if let RecorderState::Recording { frames, .. } = &self.state {
            tracing::info!("recording aborted after {} frames", frames.len());
            self.state = RecorderState::Idle;
            true
        } else {
            false
        }
    }

    /// Enter `Finalized` directly with an existing recording.
    pub fn load(&mut self, recording: Recording) -> Result<(), RecorderError> {
        if recording.metadata.frames_per_rotation == 0 {
            return Err(RecorderError::Serialization(
                "frames_per_rotation must be >= 1".into(),
            ));
        }
        recording.check_order()?;
        let mapper = match recording.payload {
            RecordingPayload::WithChords(_) => None,
            RecordingPayload::ProfilesOnly(_) => Some(
                PixelToMusicMapper::new(self.mapping.clone(), recording.metadata.scale.clone())
                    .map_err(RecorderError::Config)?,
            ),
        };
        tracing::info!(
            "loaded recording: {} frames, scale '{}'",
            recording.payload.len(),
            recording.metadata.scale.name
        );
        self.state = RecorderState::Finalized { recording, mapper };
        Ok(())
    }

    /// Parse a serialized recording and load it.
    pub fn load_json(&mut self, data: &str) -> Result<(), RecorderError> {
        let recording = Recording::from_json_str(data)?;
        self.load(recording)
    }

    /// Load `score.json` from a session directory.
    pub fn load_session(&mut self, dir: &Path) -> Result<(), RecorderError> {
        let recording = Recording::load_session(dir)?;
        self.load(recording)
    }

    /// Write the finalized recording to `dir`.
    pub fn save_session(&self, dir: &Path) -> Result<(), RecorderError> {
        self.recording()
            .ok_or(RecorderError::NotFinalized)?
            .save_session(dir)
    }

    /// Chord for `frame_index` in a looping replay.
    ///
    /// Profile-only frames are re-mapped with the mapper reseeded from
    /// `seed + relative_index`, so replays are deterministic.
    pub fn play(&mut self, frame_index: u64) -> Result<Chord, RecorderError> {
        let RecorderState::Finalized { recording, mapper } = &mut self.state else {
            return Err(RecorderError::NotFinalized);
        };
        let rel = frame_index % recording.metadata.frames_per_rotation.max(1);
        let Some(pos) = recording.position(rel) else {
            return Ok(Chord::new());
        };
        match (&recording.payload, mapper) {
            (RecordingPayload::WithChords(frames), _) => Ok(frames[pos].chord.clone()),
            (RecordingPayload::ProfilesOnly(frames), Some(mapper)) => {
                let seed = mapper.config().seed.wrapping_add(rel);
                mapper.reseed(seed);
                Ok(mapper.map(&frames[pos].profile))
            }
            (RecordingPayload::ProfilesOnly(_), None) => Err(RecorderError::NotFinalized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::NoteEvent;

    fn rotation(rpm: f64) -> RotationState {
        // At 12 fps, 60 rpm gives 12 frames per rotation.
        RotationState::new(rpm, 12.0).unwrap()
    }

    fn chord(note: u8) -> Chord {
        vec![NoteEvent {
            midi_note: note,
            velocity: 100,
            duration_s: 1.25,
        }]
    }

    fn profile(v: u8) -> IntensityProfile {
        IntensityProfile::new(vec![v; 88])
    }

    #[test]
    fn add_is_noop_when_idle() {
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.add(0, chord(60), profile(0), 0);
        assert_eq!(rec.phase(), RecorderPhase::Idle);
        assert_eq!(rec.captured(), 0);
        assert!(!rec.check_complete(100));
        assert!(matches!(rec.play(0), Err(RecorderError::NotFinalized)));
    }

    #[test]
    fn finalizes_on_nth_check_exactly_once() {
        let rot = rotation(60.0);
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.start(100, &rot, Scale::piano(), RoiMode::Rectangular);
        for i in 0..12u64 {
            rec.add(100 + i, chord(60 + i as u8), profile(i as u8), (i % 12) as u8);
            let done = rec.check_complete(100 + i);
            assert_eq!(done, i == 11, "frame {}", i);
        }
        assert_eq!(rec.phase(), RecorderPhase::Finalized);
        assert!(!rec.check_complete(112));
        let r = rec.recording().unwrap();
        assert_eq!(r.payload.len(), 12);
        assert_eq!(r.metadata.frames_per_rotation, 12);
        assert_eq!(r.metadata.roi_mode, RoiMode::Rectangular);
    }

    #[test]
    fn frame_step_completes_inside_the_rotation() {
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.set_frame_step(5);
        rec.start(0, &rotation(60.0), Scale::piano(), RoiMode::Rectangular);
        for i in [0u64, 5] {
            rec.add(i, chord(60), profile(0), 0);
            assert!(!rec.check_complete(i));
        }
        rec.add(10, chord(61), profile(0), 10);
        assert!(rec.check_complete(10));
        let indices: Vec<u64> = rec
            .recording()
            .unwrap()
            .payload
            .profiles()
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(indices, vec![0, 5, 10]);
    }

    #[test]
    fn unordered_recording_is_rejected_on_load() {
        let mut rec = RotationRecorder::new(MappingConfig::default());
        let frames = [3u64, 1]
            .into_iter()
            .map(|i| RecordedFrame {
                relative_index: i,
                chord: chord(60),
                profile: profile(0),
                sector: 0,
            })
            .collect();
        let recording = Recording {
            metadata: RecordingMetadata::new(&rotation(60.0), Scale::piano(), RoiMode::Radial),
            payload: RecordingPayload::WithChords(frames),
        };
        assert!(matches!(
            rec.load(recording),
            Err(RecorderError::Serialization(_))
        ));
        assert_eq!(rec.phase(), RecorderPhase::Idle);
    }

    #[test]
    fn frames_past_the_rotation_are_dropped() {
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.start(0, &rotation(60.0), Scale::piano(), RoiMode::Rectangular);
        rec.add(3, chord(60), profile(0), 3);
        rec.add(12, chord(61), profile(0), 0);
        assert_eq!(rec.captured(), 1);
    }

    #[test]
    fn stale_and_early_frames_are_ignored() {
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.start(10, &rotation(60.0), Scale::piano(), RoiMode::Radial);
        rec.add(5, chord(60), profile(0), 0);
        rec.add(10, chord(61), profile(0), 0);
        rec.add(10, chord(62), profile(0), 0);
        rec.add(12, chord(63), profile(0), 0);
        rec.add(11, chord(64), profile(0), 0);
        assert_eq!(rec.captured(), 2);
    }

    #[test]
    fn abort_discards_partial_recording() {
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.start(0, &rotation(60.0), Scale::piano(), RoiMode::Radial);
        rec.add(0, chord(60), profile(0), 0);
        assert!(rec.abort());
        assert_eq!(rec.phase(), RecorderPhase::Idle);
        assert!(rec.recording().is_none());
        assert!(!rec.abort());
    }

    #[test]
    fn rpm_drift_changes_completion_point() {
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.start(0, &rotation(60.0), Scale::piano(), RoiMode::Radial);
        rec.update_rotation(&rotation(120.0));
        assert!(!rec.check_complete(4));
        assert!(rec.check_complete(5));
        assert_eq!(rec.recording().unwrap().metadata.rpm, 120.0);
    }

    #[test]
    fn play_loops_captured_chords() {
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.start(0, &rotation(60.0), Scale::piano(), RoiMode::Rectangular);
        for i in 0..12u64 {
            rec.add(i, chord(40 + i as u8), profile(0), 0);
            rec.check_complete(i);
        }
        assert_eq!(rec.play(3).unwrap(), chord(43));
        assert_eq!(rec.play(12 * 7 + 3).unwrap(), chord(43));
    }

    #[test]
    fn profile_only_playback_is_deterministic() {
        let rot = rotation(60.0);
        let frames = (0..12u64)
            .map(|i| ProfileFrame {
                relative_index: i,
                profile: IntensityProfile::new((0..88).map(|k| ((k * 7 + i) % 256) as u8).collect()),
            })
            .collect();
        let recording = Recording {
            metadata: RecordingMetadata::new(&rot, Scale::builtin("CMajor").unwrap(), RoiMode::Radial),
            payload: RecordingPayload::ProfilesOnly(frames),
        };
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.load(recording).unwrap();
        assert_eq!(rec.phase(), RecorderPhase::Finalized);
        let first = rec.play(5).unwrap();
        assert!(!first.is_empty());
        assert_eq!(rec.play(5).unwrap(), first);
        assert_eq!(rec.play(17).unwrap(), first);
        let scale = Scale::builtin("CMajor").unwrap();
        assert!(first.iter().all(|n| scale.contains(n.midi_note)));
    }

    #[test]
    fn missing_frame_plays_silence() {
        let rot = rotation(60.0);
        let recording = Recording {
            metadata: RecordingMetadata::new(&rot, Scale::piano(), RoiMode::Radial),
            payload: RecordingPayload::WithChords(vec![RecordedFrame {
                relative_index: 2,
                chord: chord(70),
                profile: profile(0),
                sector: 2,
            }]),
        };
        let mut rec = RotationRecorder::new(MappingConfig::default());
        rec.load(recording).unwrap();
        assert!(rec.play(1).unwrap().is_empty());
        assert_eq!(rec.play(14).unwrap(), chord(70));
    }

    #[test]
    fn save_requires_finalized_recording() {
        let rec = RotationRecorder::new(MappingConfig::default());
        let dir = std::env::temp_dir().join("turnscore-unfinalized");
        assert!(matches!(
            rec.save_session(&dir),
            Err(RecorderError::NotFinalized)
        ));
    }
}
