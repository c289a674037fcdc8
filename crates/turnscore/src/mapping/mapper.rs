//! Intensity profile to chord transform.

use rand::prelude::*;

use super::scale::{Scale, PIANO_HIGH};
use crate::config::ConfigError;
use crate::scanline::IntensityProfile;

/// Canonical profile length: one sample per piano key.
pub const KEYBOARD_LEN: usize = 88;

/// One note to be sent to the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NoteEvent {
    pub midi_note: u8,
    pub velocity: u8,
    pub duration_s: f64,
}

/// Notes produced from one profile, at most `max_notes` long.
pub type Chord = Vec<NoteEvent>;

/// How the candidate set is reduced to `max_notes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Loudest first.
    Importance,
    /// Seeded shuffle.
    Random,
}

/// Shaping curve applied to normalized intensity before scaling to velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingLaw {
    Linear,
    /// `n^2`: quieter midtones.
    Power,
    /// `sin(n * pi / 2)`: louder midtones.
    Sine,
}

impl MappingLaw {
    #[inline]
    fn shape(self, n: f64) -> f64 {
        match self {
            Self::Linear => n,
            Self::Power => n * n,
            Self::Sine => (n * std::f64::consts::FRAC_PI_2).sin(),
        }
    }
}

/// Mapper parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// `[min, max]` output velocity.
    pub velocity_range: [u8; 2],
    /// Notes quieter than this are dropped.
    pub velocity_threshold: u8,
    /// Inverted intensities at or below this map to the minimum velocity.
    pub intensity_floor: u8,
    /// `[min, max]` note duration in seconds.
    pub duration_range_s: [f64; 2],
    pub max_notes: usize,
    pub selection: SelectionPolicy,
    pub law: MappingLaw,
    /// Seed for shuffling and durations.
    pub seed: u64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            velocity_range: [32, 127],
            velocity_threshold: 32,
            intensity_floor: 100,
            duration_range_s: [0.8, 1.8],
            max_notes: 5,
            selection: SelectionPolicy::Importance,
            law: MappingLaw::Linear,
            seed: 0,
        }
    }
}

impl MappingConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let [vlo, vhi] = self.velocity_range;
        if vlo == 0 || vlo > vhi || vhi > 127 {
            return Err(ConfigError::InvalidRange {
                field: "mapping.velocity_range",
                min: vlo as f64,
                max: vhi as f64,
            });
        }
        if self.velocity_threshold > 127 {
            return Err(ConfigError::InvalidValue {
                field: "mapping.velocity_threshold",
                reason: "must be <= 127".into(),
            });
        }
        if self.intensity_floor == 255 {
            return Err(ConfigError::InvalidValue {
                field: "mapping.intensity_floor",
                reason: "must be < 255".into(),
            });
        }
        let [dlo, dhi] = self.duration_range_s;
        if !(dlo.is_finite() && dhi.is_finite() && dlo > 0.0 && dlo <= dhi) {
            return Err(ConfigError::InvalidRange {
                field: "mapping.duration_range_s",
                min: dlo,
                max: dhi,
            });
        }
        Ok(())
    }
}

/// Nearest pitch in `sorted` to `target`; an exact tie picks the lower pitch.
fn nearest_pitch(sorted: &[u8], target: u8) -> Option<u8> {
    let mut best: Option<u8> = None;
    for &p in sorted {
        let d = p.abs_diff(target);
        // Ascending scan with strict `<` keeps the lower pitch on ties.
        if best.map_or(true, |b| d < b.abs_diff(target)) {
            best = Some(p);
        }
    }
    best
}

/// Linear resampling with pixel-centre alignment.
pub fn resample_linear(src: &[f64], len: usize) -> Vec<f64> {
    if src.is_empty() || len == 0 {
        return Vec::new();
    }
    if src.len() == len {
        return src.to_vec();
    }
    let scale = src.len() as f64 / len as f64;
    let last = (src.len() - 1) as f64;
    (0..len)
        .map(|i| {
            let pos = ((i as f64 + 0.5) * scale - 0.5).clamp(0.0, last);
            let i0 = pos.floor() as usize;
            let i1 = (i0 + 1).min(src.len() - 1);
            let t = pos - i0 as f64;
            src[i0] * (1.0 - t) + src[i1] * t
        })
        .collect()
}

/// Converts intensity profiles into chords quantized to one scale.
#[derive(Debug, Clone)]
pub struct PixelToMusicMapper {
    config: MappingConfig,
    scale: Scale,
    lattice: [u8; KEYBOARD_LEN],
    rng: StdRng,
}

impl PixelToMusicMapper {
    /// Build a mapper; the quantized lattice is computed once here.
    pub fn new(config: MappingConfig, scale: Scale) -> Result<Self, ConfigError> {
        config.validate()?;
        let in_range: Vec<u8> = scale.piano_pitches().collect();
        if in_range.is_empty() {
            return Err(ConfigError::ScaleOutOfRange(scale.name.clone()));
        }
        let mut lattice = [0u8; KEYBOARD_LEN];
        for (i, slot) in lattice.iter_mut().enumerate() {
            let key = PIANO_HIGH - i as u8;
            *slot = nearest_pitch(&in_range, key).ok_or_else(|| {
                ConfigError::ScaleOutOfRange(scale.name.clone())
            })?;
        }
        tracing::debug!(
            "mapper for scale '{}' ({} pitches in range)",
            scale.name,
            in_range.len()
        );
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            scale,
            lattice,
            rng,
        })
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    /// Quantized pitch for each of the 88 positions, highest first.
    pub fn lattice(&self) -> &[u8; KEYBOARD_LEN] {
        &self.lattice
    }

    /// Restart the random stream; equal seeds give equal chords.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn velocity(&self, inverted: f64) -> f64 {
        let floor = self.config.intensity_floor as f64;
        let n = ((inverted - floor) / (255.0 - floor)).clamp(0.0, 1.0);
        let [lo, hi] = self.config.velocity_range;
        let v = lo as f64 + self.config.law.shape(n) * (hi as f64 - lo as f64);
        v.round().clamp(lo as f64, hi as f64)
    }

    /// Map one profile to a chord. Empty profiles give an empty chord.
    pub fn map(&mut self, profile: &IntensityProfile) -> Chord {
        if profile.is_empty() || self.config.max_notes == 0 {
            return Chord::new();
        }
        let inverted: Vec<f64> = profile
            .samples()
            .iter()
            .map(|&v| (255 - v) as f64)
            .collect();
        let keys = resample_linear(&inverted, KEYBOARD_LEN);

        let mut candidates: Vec<(u8, u8)> = Vec::new();
        for (i, &mag) in keys.iter().enumerate() {
            let velocity = self.velocity(mag) as u8;
            if velocity < self.config.velocity_threshold {
                continue;
            }
            let pitch = self.lattice[i];
            if candidates.iter().any(|&(p, _)| p == pitch) {
                continue;
            }
            candidates.push((pitch, velocity));
        }

        match self.config.selection {
            SelectionPolicy::Importance => candidates.sort_by(|a, b| b.1.cmp(&a.1)),
            SelectionPolicy::Random => candidates.shuffle(&mut self.rng),
        }
        candidates.truncate(self.config.max_notes);

        let [dlo, dhi] = self.config.duration_range_s;
        candidates
            .into_iter()
            .map(|(midi_note, velocity)| NoteEvent {
                midi_note,
                velocity,
                duration_s: self.rng.gen_range(dlo..=dhi),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mapper(config: MappingConfig, scale: &str) -> PixelToMusicMapper {
        PixelToMusicMapper::new(config, Scale::builtin(scale).unwrap()).unwrap()
    }

    #[test]
    fn nearest_pitch_prefers_lower_on_tie() {
        assert_eq!(nearest_pitch(&[60, 64], 62), Some(60));
        assert_eq!(nearest_pitch(&[60, 64], 63), Some(64));
        assert_eq!(nearest_pitch(&[], 63), None);
    }

    #[test]
    fn lattice_descends_and_stays_in_scale() {
        let m = mapper(MappingConfig::default(), "CPentatonic");
        let lat = m.lattice();
        assert!(lat.windows(2).all(|w| w[0] >= w[1]));
        assert!(lat.iter().all(|&p| m.scale().contains(p)));
        // Keys above A5 clamp to the top of the scale.
        assert_eq!(lat[0], 81);
        assert_eq!(lat[87], 36);

        let piano = mapper(MappingConfig::default(), "Piano");
        assert_eq!(piano.lattice()[0], 108);
        assert_eq!(piano.lattice()[87], 21);
    }

    #[test]
    fn resampling_keeps_endpoints_and_length() {
        let src: Vec<f64> = (0..10).map(|v| v as f64 * 10.0).collect();
        let out = resample_linear(&src, 88);
        assert_eq!(out.len(), 88);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[87], 90.0);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(resample_linear(&src, 10), src);
        assert!(resample_linear(&[], 88).is_empty());
        assert_eq!(resample_linear(&[7.0], 3), vec![7.0, 7.0, 7.0]);
    }

    #[test]
    fn black_profile_plays_at_max_velocity() {
        let mut m = mapper(MappingConfig::default(), "Piano");
        let chord = m.map(&IntensityProfile::new(vec![0; 88]));
        assert_eq!(chord.len(), 5);
        assert!(chord.iter().all(|n| n.velocity == 127));
        // Stable sort keeps the highest keys first.
        let notes: Vec<u8> = chord.iter().map(|n| n.midi_note).collect();
        assert_eq!(notes, vec![108, 107, 106, 105, 104]);
    }

    #[test]
    fn white_profile_is_silent_below_threshold() {
        let cfg = MappingConfig {
            velocity_threshold: 40,
            ..Default::default()
        };
        let mut m = mapper(cfg, "Piano");
        assert!(m.map(&IntensityProfile::new(vec![255; 300])).is_empty());
        assert!(m.map(&IntensityProfile::default()).is_empty());
    }

    #[test]
    fn chord_is_bounded_and_in_scale() {
        let cfg = MappingConfig {
            max_notes: 3,
            selection: SelectionPolicy::Random,
            seed: 5,
            ..Default::default()
        };
        let mut m = mapper(cfg, "CWhole");
        let profile = IntensityProfile::new((0..200).map(|i| (i % 97) as u8).collect());
        for _ in 0..10 {
            let chord = m.map(&profile);
            assert!(chord.len() <= 3);
            for n in &chord {
                assert!(m.scale().contains(n.midi_note));
                assert!((0.8..=1.8).contains(&n.duration_s));
                assert!(n.velocity >= 32 && n.velocity <= 127);
            }
            let mut pitches: Vec<u8> = chord.iter().map(|n| n.midi_note).collect();
            pitches.sort_unstable();
            pitches.dedup();
            assert_eq!(pitches.len(), chord.len());
        }
    }

    #[test]
    fn importance_orders_by_velocity() {
        let mut samples = vec![255u8; 88];
        samples[10] = 0;
        samples[40] = 120;
        samples[70] = 60;
        let cfg = MappingConfig {
            velocity_threshold: 40,
            ..Default::default()
        };
        let mut m = mapper(cfg, "Piano");
        let chord = m.map(&IntensityProfile::new(samples));
        let notes: Vec<u8> = chord.iter().map(|n| n.midi_note).collect();
        assert_eq!(notes, vec![98, 38, 68]);
        assert_eq!(chord[0].velocity, 127);
    }

    #[test]
    fn mapping_laws_shape_midtones() {
        let profile = IntensityProfile::new(vec![255 - 178; 88]);
        let velocity_for = |law: MappingLaw| {
            let cfg = MappingConfig {
                law,
                max_notes: 1,
                ..Default::default()
            };
            mapper(cfg, "Piano").map(&profile)[0].velocity
        };
        let linear = velocity_for(MappingLaw::Linear);
        let power = velocity_for(MappingLaw::Power);
        let sine = velocity_for(MappingLaw::Sine);
        assert!(power < linear && linear < sine, "{power} {linear} {sine}");
    }

    #[test]
    fn reseeding_reproduces_chords() {
        let cfg = MappingConfig {
            selection: SelectionPolicy::Random,
            seed: 11,
            ..Default::default()
        };
        let mut m = mapper(cfg, "CMajor");
        let profile = IntensityProfile::new((0..88).map(|i| (i * 3) as u8).collect());
        m.reseed(99);
        let a = m.map(&profile);
        m.reseed(99);
        let b = m.map(&profile);
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = MappingConfig {
            velocity_range: [100, 50],
            ..Default::default()
        };
        assert!(matches!(
            PixelToMusicMapper::new(bad, Scale::piano()),
            Err(ConfigError::InvalidRange { .. })
        ));
        assert_eq!(
            PixelToMusicMapper::new(MappingConfig::default(), Scale::new("Low", vec![1, 2]))
                .unwrap_err(),
            ConfigError::ScaleOutOfRange("Low".into())
        );
    }
}
