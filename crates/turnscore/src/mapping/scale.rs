//! Musical scales: builtin note sets, note-name parsing and the configurable
//! scale library.

use std::collections::BTreeMap;

use crate::config::ConfigError;

/// Lowest and highest MIDI pitch of the 88-key piano.
pub const PIANO_LOW: u8 = 21;
pub const PIANO_HIGH: u8 = 108;

const C_MAJOR: &[&str] = &[
    "C2", "D2", "E2", "F2", "G2", "A2", "B2", "C3", "D3", "E3", "F3", "G3", "A3", "B3", "C4", "D4",
    "E4", "F4", "G4", "A4", "B4", "C5", "D5", "E5", "F5", "G5", "A5", "B5",
];
const C_PENTATONIC: &[&str] = &[
    "C2", "D2", "E2", "G2", "A2", "C3", "D3", "E3", "G3", "A3", "C4", "D4", "E4", "G4", "A4", "C5",
    "D5", "E5", "G5", "A5",
];
// Voicing of Cmaj13#11.
const C_LYDIAN: &[&str] = &[
    "C1", "C2", "G2", "C3", "E3", "G3", "A3", "B3", "D4", "E4", "G4", "A4", "B4", "D5", "E5", "G5",
    "A5", "B5", "D6", "E6", "F#6", "G6", "A6",
];
const C_WHOLE: &[&str] = &[
    "C2", "D2", "E2", "F#2", "G#2", "A#2", "C3", "D3", "E3", "F#3", "G#3", "A#3", "C4", "D4", "E4",
    "F#4", "G#4", "A#4", "C5", "D5", "E5", "F#5", "G#5", "A#5",
];
const C_MINOR_CLASSES: &[u8] = &[60, 62, 63, 65, 67, 68, 70];

/// Names accepted by [`Scale::builtin`].
pub const BUILTIN_SCALES: &[&str] = &[
    "Piano",
    "CMajor",
    "CPentatonic",
    "CLydian",
    "CWhole",
    "CMinor",
    "Chromatic",
];

/// Parse scientific pitch notation (`"C4"` = 60, `"F#6"` = 90, `"Bb-1"` = 10).
pub fn parse_note_name(name: &str) -> Result<u8, ConfigError> {
    let err = || ConfigError::InvalidNoteName(name.to_string());
    let mut chars = name.trim().chars();
    let letter = chars.next().ok_or_else(err)?;
    let class: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(err()),
    };
    let rest = chars.as_str();
    let (accidental, octave) = if let Some(o) = rest.strip_prefix('#') {
        (1, o)
    } else if let Some(o) = rest.strip_prefix('b') {
        (-1, o)
    } else {
        (0, rest)
    };
    let octave: i32 = octave.parse().map_err(|_| err())?;
    let midi = class + accidental + (octave + 1) * 12;
    u8::try_from(midi).ok().filter(|m| *m <= 127).ok_or_else(err)
}

/// Repeat a one-octave pitch set `below` octaves down and `above` octaves
/// up (the base octave counts as the first one up).
pub fn expand_pitch_classes(base: &[u8], below: u8, above: u8) -> Vec<u8> {
    let mut out = Vec::new();
    for octave in -(below as i32)..(above as i32) {
        for &p in base {
            let v = p as i32 + 12 * octave;
            if (0..=127).contains(&v) {
                out.push(v as u8);
            }
        }
    }
    out
}

/// A named, sorted, duplicate-free set of MIDI pitches.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Scale {
    pub name: String,
    pub pitches: Vec<u8>,
}

impl Scale {
    pub fn new(name: impl Into<String>, mut pitches: Vec<u8>) -> Self {
        pitches.retain(|p| *p <= 127);
        pitches.sort_unstable();
        pitches.dedup();
        Self {
            name: name.into(),
            pitches,
        }
    }

    pub fn from_note_names<S: AsRef<str>>(
        name: impl Into<String>,
        notes: &[S],
    ) -> Result<Self, ConfigError> {
        let pitches = notes
            .iter()
            .map(|n| parse_note_name(n.as_ref()))
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(Self::new(name, pitches))
    }

    /// Full 88-key piano.
    pub fn piano() -> Self {
        Self::new("Piano", (PIANO_LOW..=PIANO_HIGH).collect())
    }

    pub fn builtin(name: &str) -> Option<Self> {
        let names = |list: &[&str]| Self::from_note_names(name, list).ok();
        match name {
            "Piano" => Some(Self::piano()),
            "CMajor" => names(C_MAJOR),
            "CPentatonic" => names(C_PENTATONIC),
            "CLydian" => names(C_LYDIAN),
            "CWhole" => names(C_WHOLE),
            "CMinor" => Some(Self::new(name, expand_pitch_classes(C_MINOR_CLASSES, 4, 4))),
            "Chromatic" => {
                let classes: Vec<u8> = (60..72).collect();
                Some(Self::new(name, expand_pitch_classes(&classes, 4, 4)))
            }
            _ => None,
        }
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.pitches.binary_search(&pitch).is_ok()
    }

    /// Pitches inside the piano range.
    pub fn piano_pitches(&self) -> impl Iterator<Item = u8> + '_ {
        self.pitches
            .iter()
            .copied()
            .filter(|p| (PIANO_LOW..=PIANO_HIGH).contains(p))
    }
}

/// A custom scale as written in configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ScaleDefinition {
    /// Explicit MIDI numbers.
    Pitches(Vec<u8>),
    /// Note names such as `"F#6"`.
    Names(Vec<String>),
}

/// Active scale name plus user-defined scales.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScaleLibrary {
    pub default_scale: String,
    /// Custom scales; these shadow builtins of the same name.
    pub definitions: BTreeMap<String, ScaleDefinition>,
}

impl Default for ScaleLibrary {
    fn default() -> Self {
        Self {
            default_scale: "CPentatonic".to_string(),
            definitions: BTreeMap::new(),
        }
    }
}

impl ScaleLibrary {
    /// Look up `name`, failing if unknown or outside the piano range.
    pub fn resolve(&self, name: &str) -> Result<Scale, ConfigError> {
        let scale = match self.definitions.get(name) {
            Some(ScaleDefinition::Pitches(p)) => Scale::new(name, p.clone()),
            Some(ScaleDefinition::Names(n)) => Scale::from_note_names(name, n)?,
            None => Scale::builtin(name).ok_or_else(|| ConfigError::UnknownScale(name.into()))?,
        };
        if scale.piano_pitches().next().is_none() {
            return Err(ConfigError::ScaleOutOfRange(name.into()));
        }
        Ok(scale)
    }

    pub fn active(&self) -> Result<Scale, ConfigError> {
        self.resolve(&self.default_scale)
    }

    /// Builtin names followed by custom names not shadowing a builtin.
    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = BUILTIN_SCALES.iter().map(|s| s.to_string()).collect();
        for name in self.definitions.keys() {
            if !BUILTIN_SCALES.contains(&name.as_str()) {
                out.push(name.clone());
            }
        }
        out
    }
}
