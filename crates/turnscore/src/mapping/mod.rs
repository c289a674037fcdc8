//! Pixel-intensity to note mapping and the scale library.

mod mapper;
mod scale;

pub use mapper::{
    resample_linear, Chord, MappingConfig, MappingLaw, NoteEvent, PixelToMusicMapper,
    SelectionPolicy, KEYBOARD_LEN,
};
pub use scale::{
    expand_pitch_classes, parse_note_name, Scale, ScaleDefinition, ScaleLibrary, BUILTIN_SCALES,
    PIANO_HIGH, PIANO_LOW,
};
