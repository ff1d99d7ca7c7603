//! # Score Model
//!
//! Typed event stream for one sung part.
//!
//! ## Type Hierarchy
//! ```text
//! Part
//!   ├── name: String
//!   └── Vec<Event>
//!
//! Event (enum)
//!   ├── Rest
//!   │     └── duration_ms: f64
//!   └── Pitch(PitchEvent)
//!         ├── notes: Vec<SubNote> (one per tied sub-duration)
//!         ├── lyric: Option<Syllable>
//!         └── word: Option<WordSpan> (filled by the lyric assembler)
//! ```
//!
//! ## Key Concepts
//!
//! ### Degrees
//! Pitches are chromatic degrees counted from A, not from C:
//! `A=0, Bb=1, B=2, C=3, ... G=10, Ab=11`. Octave numbers follow
//! scientific pitch notation, so the octave boundary sits at C (middle C
//! is C4, and A4 = 440 Hz sits above it in the same octave).
//!
//! ### Ties
//! A tied note folds into the event it continues. Each sub-note keeps its
//! own pitch and duration so the tuner can follow pitch changes under one
//! syllable (melisma).

/// Reference pitch for A4.
pub const A4_HZ: f64 = 440.0;

/// Degree of each step letter, counted in semitones from A.
pub fn step_degree(step: char) -> Option<i32> {
    match step {
        'A' => Some(0),
        'B' => Some(2),
        'C' => Some(3),
        'D' => Some(5),
        'E' => Some(7),
        'F' => Some(8),
        'G' => Some(10),
        _ => None,
    }
}

const DEGREE_NAMES: [&str; 12] = [
    "A", "Bb", "B", "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab",
];

/// Position of a syllable within its word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyllablePosition {
    Begin,
    Middle,
    End,
    Single,
}

impl SyllablePosition {
    /// Parse a MusicXML `<syllabic>` value.
    pub fn from_syllabic(s: &str) -> Option<Self> {
        match s.trim() {
            "begin" => Some(Self::Begin),
            "middle" => Some(Self::Middle),
            "end" => Some(Self::End),
            "single" => Some(Self::Single),
            _ => None,
        }
    }
}

/// One lyric fragment as written under a note
#[derive(Debug, Clone, PartialEq)]
pub struct Syllable {
    pub text: String,
    pub position: SyllablePosition,
}

/// The word a syllable belongs to, with the inclusive character range
/// the syllable covers inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct WordSpan {
    pub word: String,
    pub char_start: usize,
    pub char_end: usize,
}

impl WordSpan {
    /// The characters of `word` this syllable covers.
    pub fn syllable_text(&self) -> String {
        self.word
            .chars()
            .skip(self.char_start)
            .take(self.char_end + 1 - self.char_start)
            .collect()
    }
}

/// A single pitch/duration pair inside a (possibly tied) pitch event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubNote {
    /// Chromatic degree, 0-11, counted from A
    pub degree: u8,
    /// Octave number (middle C is C4)
    pub octave: i32,
    pub duration_ms: f64,
}

impl SubNote {
    /// MIDI note number for this degree/octave pair.
    pub fn midi_note(&self) -> i32 {
        let from_c = (self.degree as i32 - 3).rem_euclid(12);
        12 * (self.octave + 1) + from_c
    }

    /// Equal-tempered frequency in Hz (A4 = 440).
    pub fn frequency_hz(&self) -> f64 {
        A4_HZ * 2f64.powf((self.midi_note() - 69) as f64 / 12.0)
    }

    /// Note name such as "C4" or "Bb3".
    pub fn name(&self) -> String {
        format!("{}{}", DEGREE_NAMES[self.degree as usize % 12], self.octave)
    }
}

/// A pitched, sung event
#[derive(Debug, Clone, PartialEq)]
pub struct PitchEvent {
    pub notes: Vec<SubNote>,
    pub lyric: Option<Syllable>,
    pub word: Option<WordSpan>,
}

impl PitchEvent {
    pub fn new(note: SubNote, lyric: Option<Syllable>) -> Self {
        Self {
            notes: vec![note],
            lyric,
            word: None,
        }
    }

    pub fn degrees(&self) -> Vec<u8> {
        self.notes.iter().map(|n| n.degree).collect()
    }

    pub fn octaves(&self) -> Vec<i32> {
        self.notes.iter().map(|n| n.octave).collect()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.notes.iter().map(|n| n.duration_ms).collect()
    }
}

/// A note or rest (discriminated union)
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Rest { duration_ms: f64 },
    Pitch(PitchEvent),
}

impl Event {
    /// Total notated duration in milliseconds, including tied sub-notes.
    pub fn total_duration_ms(&self) -> f64 {
        match self {
            Event::Rest { duration_ms } => *duration_ms,
            Event::Pitch(p) => p.notes.iter().map(|n| n.duration_ms).sum(),
        }
    }

    pub fn as_pitch(&self) -> Option<&PitchEvent> {
        match self {
            Event::Pitch(p) => Some(p),
            Event::Rest { .. } => None,
        }
    }
}

/// A named voice part
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub id: String,
    pub name: String,
    pub events: Vec<Event>,
}

impl Part {
    /// Total duration of the part in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.events.iter().map(Event::total_duration_ms).sum()
    }
}

/// Lowercase a word and drop every non-letter character.
///
/// This is the key used for the word cache and the text sent to the
/// speech provider.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphabetic())
        .collect()
}
