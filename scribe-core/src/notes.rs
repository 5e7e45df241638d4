//! # Note Naming Module
//!
//! Maps frequencies onto scientific pitch notation (A4 = 440 Hz) using
//! equal temperament, and spells the resulting notes for LilyPond.
//!
//! ## Rounding
//! The semitone distance from C0 is rounded half-to-even, so a frequency
//! exactly between two notes always resolves to the same name.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference pitch of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// Frequency of C0, the zero point of the semitone scale.
///
/// C0 sits 4.75 octaves (57 semitones) below A4.
static C0_FREQUENCY: Lazy<f64> = Lazy::new(|| A4_FREQUENCY * 2.0_f64.powf(-4.75));

/// The 12 pitch classes of the chromatic scale, starting at C.
pub const PITCH_CLASSES: [PitchClass; 12] = [
    PitchClass::C,
    PitchClass::CSharp,
    PitchClass::D,
    PitchClass::DSharp,
    PitchClass::E,
    PitchClass::F,
    PitchClass::FSharp,
    PitchClass::G,
    PitchClass::GSharp,
    PitchClass::A,
    PitchClass::ASharp,
    PitchClass::B,
];

/// One of the 12 note names of the chromatic scale, independent of octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// Position in the chromatic scale (C = 0 ... B = 11).
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// LilyPond note name (English sharps spelled with the Dutch `is` suffix).
    fn lilypond(self) -> &'static str {
        match self {
            PitchClass::C => "c",
            PitchClass::CSharp => "cis",
            PitchClass::D => "d",
            PitchClass::DSharp => "dis",
            PitchClass::E => "e",
            PitchClass::F => "f",
            PitchClass::FSharp => "fis",
            PitchClass::G => "g",
            PitchClass::GSharp => "gis",
            PitchClass::A => "a",
            PitchClass::ASharp => "ais",
            PitchClass::B => "b",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semitone distance from C0 of the lowest note a positive `f32` reaches
/// (the smallest subnormal, C-153).
pub const MIN_SEMITONE: i64 = -1836;

/// Semitone distance from C0 of `f32::MAX` (C124).
pub const MAX_SEMITONE: i64 = 1488;

/// A pitch class together with its octave number, e.g. `A4` or `C#-1`.
///
/// Values are derived from a frequency, or parsed back from their own
/// rendering as long as some frequency produces them; there is no
/// constructor taking arbitrary parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NoteName {
    pitch_class: PitchClass,
    octave: i32,
}

impl NoteName {
    /// Maps a frequency in Hz to the nearest equal-tempered note.
    ///
    /// Only meaningful for `frequency > 0`; filtering non-positive values is
    /// the caller's job. Results are clamped to the notes a positive finite
    /// `f32` can reach (C-153 to C124), so `0.0` and infinity land on the
    /// ends of that range.
    pub fn from_frequency(frequency: f32) -> Self {
        let semitones = 12.0 * (f64::from(frequency) / *C0_FREQUENCY).log2();
        // Saturating cast keeps non-finite input from panicking.
        let h = semitones.round_ties_even() as i64;
        Self::from_semitone(h.clamp(MIN_SEMITONE, MAX_SEMITONE))
    }

    /// Builds the note `h` semitones above C0 (negative values go below).
    fn from_semitone(h: i64) -> Self {
        let octave = h.div_euclid(12);
        let index = h.rem_euclid(12) as usize;
        Self {
            pitch_class: PITCH_CLASSES[index],
            octave: octave as i32,
        }
    }

    /// Semitones above C0 (negative below).
    fn semitone(&self) -> i64 {
        i64::from(self.octave) * 12 + self.pitch_class.index() as i64
    }

    pub fn pitch_class(&self) -> PitchClass {
        self.pitch_class
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// MIDI note number of this note (C4 = 60, A4 = 69).
    pub fn midi_number(&self) -> i32 {
        (self.octave + 1) * 12 + self.pitch_class.index() as i32
    }

    /// Absolute LilyPond pitch, where an unmarked `c` is C3.
    ///
    /// Each octave above adds a `'`, each octave below adds a `,`.
    pub fn lilypond(&self) -> String {
        let mut out = String::from(self.pitch_class.lilypond());
        let marks = self.octave - 3;
        let mark = if marks >= 0 { '\'' } else { ',' };
        for _ in 0..marks.unsigned_abs() {
            out.push(mark);
        }
        out
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

impl From<NoteName> for String {
    fn from(name: NoteName) -> Self {
        name.to_string()
    }
}

/// Error returned when a string is not a note name the mapper can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid note name: {0:?}")]
pub struct ParseNoteNameError(String);

impl FromStr for NoteName {
    type Err = ParseNoteNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseNoteNameError(s.to_string());
        let split = if s.get(1..2) == Some("#") { 2 } else { 1 };
        let (class, octave) = s.split_at_checked(split).ok_or_else(err)?;
        let pitch_class = PITCH_CLASSES
            .iter()
            .copied()
            .find(|pc| pc.name() == class)
            .ok_or_else(err)?;
        let octave = octave.parse::<i32>().map_err(|_| err())?;
        let name = Self { pitch_class, octave };
        // Only the canonical rendering is accepted ("A4", not "A+4" or "A04").
        if !(MIN_SEMITONE..=MAX_SEMITONE).contains(&name.semitone()) || name.to_string() != s {
            return Err(err());
        }
        Ok(name)
    }
}

impl TryFrom<String> for NoteName {
    type Error = ParseNoteNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Converts a frequency in Hz to its note name.
///
/// Shorthand for [`NoteName::from_frequency`].
pub fn note_name_for_frequency(frequency: f32) -> NoteName {
    NoteName::from_frequency(frequency)
}

/// A single transcribed note: its name, the frequency it came from and the
/// analysis frame that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub name: NoteName,
    pub frequency: f32,
    pub frame: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_pitch_is_a4() {
        assert_eq!(note_name_for_frequency(440.0).to_string(), "A4");
    }

    #[test]
    fn test_middle_c() {
        assert_eq!(note_name_for_frequency(261.625_565_3).to_string(), "C4");
        assert_eq!(note_name_for_frequency(261.625_565_3).midi_number(), 60);
    }

    #[test]
    fn test_octave_doubling_keeps_pitch_class() {
        for &f in &[27.5_f32, 55.0, 98.0, 146.83, 311.13, 440.0, 987.77, 3000.0] {
            let low = note_name_for_frequency(f);
            let high = note_name_for_frequency(f * 2.0);
            assert_eq!(low.pitch_class(), high.pitch_class(), "at {f} Hz");
            assert_eq!(low.octave() + 1, high.octave(), "at {f} Hz");
        }
    }

    #[test]
    fn test_mapping_is_deterministic() {
        for &f in &[16.0_f32, 123.4, 440.0, 1234.5] {
            assert_eq!(note_name_for_frequency(f), note_name_for_frequency(f));
        }
    }

    #[test]
    fn test_sharps_and_low_octaves() {
        assert_eq!(note_name_for_frequency(466.16).to_string(), "A#4");
        assert_eq!(note_name_for_frequency(27.5).to_string(), "A0");
        assert_eq!(note_name_for_frequency(16.35).to_string(), "C0");
        // Below C0 the octave goes negative with floor semantics.
        assert_eq!(note_name_for_frequency(15.43).to_string(), "B-1");
        assert_eq!(note_name_for_frequency(8.18).to_string(), "C-1");
    }

    #[test]
    fn test_quarter_tone_rounds_to_nearest() {
        // 40 cents sharp of A4 is still A4, 60 cents sharp is A#4.
        let a4_sharp_40 = 440.0 * 2.0_f32.powf(0.40 / 12.0);
        let a4_sharp_60 = 440.0 * 2.0_f32.powf(0.60 / 12.0);
        assert_eq!(note_name_for_frequency(a4_sharp_40).to_string(), "A4");
        assert_eq!(note_name_for_frequency(a4_sharp_60).to_string(), "A#4");
    }

    #[test]
    fn test_non_finite_input_does_not_panic() {
        let _ = note_name_for_frequency(f32::NAN);
        let _ = note_name_for_frequency(f32::INFINITY);
        let _ = note_name_for_frequency(0.0);
    }

    #[test]
    fn test_lilypond_spelling() {
        let spell = |f: f32| note_name_for_frequency(f).lilypond();
        assert_eq!(spell(261.63), "c'");
        assert_eq!(spell(440.0), "a'");
        assert_eq!(spell(130.81), "c");
        assert_eq!(spell(116.54), "ais,");
        assert_eq!(spell(41.2), "e,,");
        assert_eq!(spell(1108.73), "cis'''");
    }

    #[test]
    fn test_parse_round_trips_rendered_names() {
        for name in ["A4", "C#-1", "G#7", "B0"] {
            let parsed: NoteName = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
        }
        assert!("H4".parse::<NoteName>().is_err());
        assert!("A".parse::<NoteName>().is_err());
        assert!("".parse::<NoteName>().is_err());
    }

    #[test]
    fn test_parse_rejects_signs_and_padding() {
        for name in ["A+4", "A04", "C-0", "A 4"] {
            assert!(name.parse::<NoteName>().is_err(), "{name} parsed");
        }
        assert!(serde_json::from_str::<NoteName>("\"A+4\"").is_err());
        assert_eq!(serde_json::from_str::<NoteName>("\"A4\"").unwrap().to_string(), "A4");
    }

    #[test]
    fn test_parse_is_limited_to_reachable_notes() {
        let highest = note_name_for_frequency(f32::MAX);
        let lowest = note_name_for_frequency(f32::from_bits(1));
        assert_eq!(highest.to_string(), "C124");
        assert_eq!(lowest.to_string(), "C-153");
        assert_eq!("C124".parse::<NoteName>().unwrap(), highest);
        assert_eq!("C-153".parse::<NoteName>().unwrap(), lowest);
        assert!("B-153".parse::<NoteName>().is_ok());

        for name in ["C#124", "D125", "B-154", "A2000000000", "C-2147483648"] {
            assert!(name.parse::<NoteName>().is_err(), "{name} parsed");
        }
    }

    #[test]
    fn test_infinite_input_stays_in_range() {
        assert_eq!(note_name_for_frequency(f32::INFINITY).to_string(), "C124");
        assert_eq!(note_name_for_frequency(0.0).to_string(), "C-153");
        assert_eq!(note_name_for_frequency(f32::INFINITY).lilypond().len(), 1 + 121);
    }
}
