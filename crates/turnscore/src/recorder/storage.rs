//! Recording persistence: JSON score document and panorama image.
//!
//! The JSON document has three parts: `metadata`, a frame-indexed `events`
//! log (absent for profile-only recordings) and the raw `profiles`. The
//! panorama stores one 88-sample profile per column.

use std::path::Path;

use image::{GrayImage, Luma};

use super::{
    ProfileFrame, RecordedFrame, Recording, RecorderError, RecordingMetadata, RecordingPayload,
};
use crate::mapping::{Chord, KEYBOARD_LEN};
use crate::scanline::IntensityProfile;

/// Score document written into a session directory.
pub const SCORE_FILE: &str = "score.json";
/// Panorama image written next to the score.
pub const PANORAMA_FILE: &str = "score.png";

#[derive(serde::Serialize, serde::Deserialize)]
struct EventEntry {
    relative_index: u64,
    sector: u8,
    notes: Chord,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ScoreDocument {
    metadata: RecordingMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    events: Option<Vec<EventEntry>>,
    profiles: Vec<ProfileFrame>,
}

impl ScoreDocument {
    fn from_recording(recording: &Recording) -> Self {
        let (events, profiles) = match &recording.payload {
            RecordingPayload::WithChords(frames) => {
                let events = frames
                    .iter()
                    .map(|f| EventEntry {
                        relative_index: f.relative_index,
                        sector: f.sector,
                        notes: f.chord.clone(),
                    })
                    .collect();
                let profiles = frames
                    .iter()
                    .map(|f| ProfileFrame {
                        relative_index: f.relative_index,
                        profile: f.profile.clone(),
                    })
                    .collect();
                (Some(events), profiles)
            }
            RecordingPayload::ProfilesOnly(frames) => (None, frames.clone()),
        };
        Self {
            metadata: recording.metadata.clone(),
            events,
            profiles,
        }
    }

    fn into_recording(self) -> Result<Recording, RecorderError> {
        let payload = match self.events {
            None => RecordingPayload::ProfilesOnly(self.profiles),
            Some(events) => {
                if events.len() != self.profiles.len() {
                    return Err(RecorderError::Serialization(format!(
                        "{} events but {} profiles",
                        events.len(),
                        self.profiles.len()
                    )));
                }
                let frames = events
                    .into_iter()
                    .zip(self.profiles)
                    .map(|(e, p)| {
                        if e.relative_index != p.relative_index {
                            return Err(RecorderError::Serialization(format!(
                                "event frame {} has no matching profile",
                                e.relative_index
                            )));
                        }
                        Ok(RecordedFrame {
                            relative_index: e.relative_index,
                            chord: e.notes,
                            profile: p.profile,
                            sector: e.sector,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                RecordingPayload::WithChords(frames)
            }
        };
        let recording = Recording {
            metadata: self.metadata,
            payload,
        };
        recording.check_order()?;
        Ok(recording)
    }
}

/// `n` evenly spaced samples of `profile` (integer positions, endpoints kept).
fn panorama_column(profile: &IntensityProfile, n: usize) -> Vec<u8> {
    let samples = profile.samples();
    if samples.is_empty() {
        return vec![0; n];
    }
    let last = samples.len() - 1;
    (0..n)
        .map(|j| samples[if n > 1 { j * last / (n - 1) } else { 0 }])
        .collect()
}

impl Recording {
    pub fn to_json_string(&self) -> Result<String, RecorderError> {
        serde_json::to_string_pretty(&ScoreDocument::from_recording(self))
            .map_err(|e| RecorderError::Serialization(e.to_string()))
    }

    pub fn from_json_str(data: &str) -> Result<Self, RecorderError> {
        let doc: ScoreDocument =
            serde_json::from_str(data).map_err(|e| RecorderError::Serialization(e.to_string()))?;
        doc.into_recording()
    }

    /// Image with one column per frame and 88 rows, top row first.
    pub fn to_panorama(&self) -> GrayImage {
        let profiles = self.payload.profiles();
        let mut img = GrayImage::new(profiles.len() as u32, KEYBOARD_LEN as u32);
        for (x, (_, profile)) in profiles.iter().enumerate() {
            for (y, v) in panorama_column(profile, KEYBOARD_LEN).into_iter().enumerate() {
                img.put_pixel(x as u32, y as u32, Luma([v]));
            }
        }
        img
    }

    /// Profile-only recording whose column `x` becomes frame `x`.
    ///
    /// One rotation spans the panorama's width, so `frames_per_rotation`
    /// and `rpm` are rederived from the column count at `metadata.fps`.
    pub fn from_panorama(mut metadata: RecordingMetadata, panorama: &GrayImage) -> Self {
        let (w, h) = panorama.dimensions();
        metadata.frames_per_rotation = (w as u64).max(1);
        metadata.rpm = 60.0 * metadata.fps / metadata.frames_per_rotation as f64;
        let frames = (0..w)
            .map(|x| ProfileFrame {
                relative_index: x as u64,
                profile: IntensityProfile::new((0..h).map(|y| panorama.get_pixel(x, y)[0]).collect()),
            })
            .collect();
        Self {
            metadata,
            payload: RecordingPayload::ProfilesOnly(frames),
        }
    }

    /// Write `score.json` and `score.png` into `dir`, creating it if needed.
    pub fn save_session(&self, dir: &Path) -> Result<(), RecorderError> {
        let json = self.to_json_string()?;
        std::fs::create_dir_all(dir).map_err(RecorderError::Io)?;
        std::fs::write(dir.join(SCORE_FILE), json).map_err(RecorderError::Io)?;
        if !self.payload.is_empty() {
            self.to_panorama()
                .save(dir.join(PANORAMA_FILE))
                .map_err(|e| RecorderError::Image(e.to_string()))?;
        }
        tracing::info!("session saved to {}", dir.display());
        Ok(())
    }

    /// Read `score.json` from `dir`.
    pub fn load_session(dir: &Path) -> Result<Self, RecorderError> {
        let data = std::fs::read_to_string(dir.join(SCORE_FILE)).map_err(RecorderError::Io)?;
        Self::from_json_str(&data)
    }

    /// Read a panorama image file as a profile-only recording.
    pub fn load_panorama(metadata: RecordingMetadata, path: &Path) -> Result<Self, RecorderError> {
        let img = image::open(path)
            .map_err(|e| RecorderError::Image(e.to_string()))?
            .into_luma8();
        Ok(Self::from_panorama(metadata, &img))
    }
}
