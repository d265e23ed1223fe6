//! # Notation Model
//!
//! The in-memory form of a parsed score, shared by the MusicXML parser, the
//! excerpt slicer, the decomposer and the renderer.
//!
//! ## Type Hierarchy
//! ```text
//! Score
//!   ├── Metadata (title, composer, tempo)
//!   ├── divisions: ticks per quarter note, shared by every part
//!   └── Vec<Part>
//!         └── Vec<Measure>
//!               ├── number, offset, duration (ticks)
//!               ├── key / time: effective signatures at this measure
//!               └── Vec<Element>
//!                     ├── voice, offset (ticks in measure), duration (ticks)
//!                     └── kind: Rest | Note { Vec<Pitch> }
//! ```
//!
//! ## Timing
//! All positions are integer ticks, `divisions` ticks to the quarter note.
//! A quarter-note length is therefore `ticks / divisions`; nothing in the
//! model is floating point.
//!
//! ## Ties
//! - `Tie::Start`: first note of a tied group
//! - `Tie::Continue`: middle note (tied both ways)
//! - `Tie::Stop`: last note of a tied group
//!
//! Both `Continue` and `Stop` are continuations of an earlier note and never
//! start a new onset in the matrix representation.

use serde::{Deserialize, Serialize};

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats: 4,
            beat_type: 4,
        }
    }
}

impl TimeSignature {
    /// Length of one measure in ticks, or `None` when it is not a whole
    /// number of ticks at this resolution.
    pub fn measure_ticks(&self, divisions: u64) -> Option<u64> {
        let numerator = 4 * self.beats as u64 * divisions;
        let beat_type = self.beat_type as u64;
        if beat_type == 0 || numerator % beat_type != 0 {
            return None;
        }
        Some(numerator / beat_type)
    }
}

/// Mode for key signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Major,
    Minor,
}

/// Key signature (number of sharps/flats)
/// Positive = sharps, Negative = flats, Zero = C major / A minor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeySignature {
    pub fifths: i8, // -7 to +7 (flats to sharps)
    pub mode: Mode,
}

impl KeySignature {
    /// Alteration the key signature applies to a diatonic step.
    /// Order of sharps: F C G D A E B
    /// Order of flats: B E A D G C F
    pub fn alter_for_step(&self, step: Step) -> i8 {
        const SHARPS: [Step; 7] = [Step::F, Step::C, Step::G, Step::D, Step::A, Step::E, Step::B];
        const FLATS: [Step; 7] = [Step::B, Step::E, Step::A, Step::D, Step::G, Step::C, Step::F];

        let count = self.fifths.unsigned_abs().min(7) as usize;
        if self.fifths > 0 && SHARPS[..count].contains(&step) {
            1
        } else if self.fifths < 0 && FLATS[..count].contains(&step) {
            -1
        } else {
            0
        }
    }

    /// Spell a MIDI pitch in this key: sharps for sharp and neutral keys,
    /// flats for flat keys.
    pub fn spell(&self, midi: u8) -> SpelledPitch {
        const SHARP_SPELLING: [(Step, i8); 12] = [
            (Step::C, 0),
            (Step::C, 1),
            (Step::D, 0),
            (Step::D, 1),
            (Step::E, 0),
            (Step::F, 0),
            (Step::F, 1),
            (Step::G, 0),
            (Step::G, 1),
            (Step::A, 0),
            (Step::A, 1),
            (Step::B, 0),
        ];
        const FLAT_SPELLING: [(Step, i8); 12] = [
            (Step::C, 0),
            (Step::D, -1),
            (Step::D, 0),
            (Step::E, -1),
            (Step::E, 0),
            (Step::F, 0),
            (Step::G, -1),
            (Step::G, 0),
            (Step::A, -1),
            (Step::A, 0),
            (Step::B, -1),
            (Step::B, 0),
        ];

        let table = if self.fifths < 0 {
            &FLAT_SPELLING
        } else {
            &SHARP_SPELLING
        };
        let (step, alter) = table[(midi % 12) as usize];
        SpelledPitch {
            step,
            alter,
            octave: (midi / 12) as i8 - 1,
        }
    }
}

/// Diatonic step name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    pub fn from_letter(s: &str) -> Option<Self> {
        match s.trim() {
            "C" => Some(Step::C),
            "D" => Some(Step::D),
            "E" => Some(Step::E),
            "F" => Some(Step::F),
            "G" => Some(Step::G),
            "A" => Some(Step::A),
            "B" => Some(Step::B),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::C => "C",
            Step::D => "D",
            Step::E => "E",
            Step::F => "F",
            Step::G => "G",
            Step::A => "A",
            Step::B => "B",
        }
    }

    /// Semitone offset from C
    pub fn semitone(self) -> i32 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }
}

/// A pitch spelled as step, alteration and octave (middle C = C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpelledPitch {
    pub step: Step,
    pub alter: i8,
    pub octave: i8,
}

impl SpelledPitch {
    /// MIDI number, or `None` outside 0-127.
    pub fn midi(&self) -> Option<u8> {
        let midi = (self.octave as i32 + 1) * 12 + self.step.semitone() + self.alter as i32;
        u8::try_from(midi).ok().filter(|m| *m <= 127)
    }
}

/// Tie role of one pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tie {
    Start,
    Continue,
    Stop,
}

/// One sounding pitch of a note or chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pitch {
    pub midi: u8,
    pub tie: Option<Tie>,
}

impl Pitch {
    pub fn new(midi: u8) -> Self {
        Self { midi, tie: None }
    }

    /// True when this pitch continues a note started earlier.
    pub fn is_tied_from_previous(&self) -> bool {
        matches!(self.tie, Some(Tie::Continue) | Some(Tie::Stop))
    }

    /// True when this pitch continues into a later note.
    pub fn is_tied_to_next(&self) -> bool {
        matches!(self.tie, Some(Tie::Start) | Some(Tie::Continue))
    }

    pub(crate) fn with_ties(midi: u8, from_previous: bool, to_next: bool) -> Self {
        let tie = match (from_previous, to_next) {
            (false, false) => None,
            (false, true) => Some(Tie::Start),
            (true, true) => Some(Tie::Continue),
            (true, false) => Some(Tie::Stop),
        };
        Self { midi, tie }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Rest,
    /// A single note, or a chord when there is more than one pitch.
    Note { pitches: Vec<Pitch> },
}

/// A timed note, chord or rest within a measure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub voice: u8,
    /// Ticks from the start of the measure.
    pub offset: u64,
    pub duration: u64,
    pub kind: ElementKind,
}

impl Element {
    pub fn is_note(&self) -> bool {
        matches!(self.kind, ElementKind::Note { .. })
    }

    pub fn pitches(&self) -> &[Pitch] {
        match &self.kind {
            ElementKind::Note { pitches } => pitches,
            ElementKind::Rest => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub number: u32,
    /// Ticks from the start of the first measure of the part.
    pub offset: u64,
    pub duration: u64,
    pub key: Option<KeySignature>,
    pub time: Option<TimeSignature>,
    pub elements: Vec<Element>,
}

impl Measure {
    pub fn has_notes(&self) -> bool {
        self.elements.iter().any(Element::is_note)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub id: String,
    pub name: String,
    pub measures: Vec<Measure>,
}

impl Part {
    pub fn has_notes(&self) -> bool {
        self.measures.iter().any(Measure::has_notes)
    }

    /// Distinct voice numbers used by notes or rests, ascending.
    pub fn voices(&self) -> Vec<u8> {
        let mut voices: Vec<u8> = self
            .measures
            .iter()
            .flat_map(|m| m.elements.iter().map(|e| e.voice))
            .collect();
        voices.sort_unstable();
        voices.dedup();
        voices
    }

    /// A copy of this part holding only one voice, renumbered as voice 1.
    pub fn voice_part(&self, voice: u8) -> Part {
        let measures = self
            .measures
            .iter()
            .map(|m| Measure {
                elements: m
                    .elements
                    .iter()
                    .filter(|e| e.voice == voice)
                    .map(|e| Element { voice: 1, ..e.clone() })
                    .collect(),
                ..m.clone()
            })
            .collect();
        Part {
            id: self.id.clone(),
            name: format!("{} (voice {})", self.name, voice),
            measures,
        }
    }

    pub fn first_key(&self) -> Option<KeySignature> {
        self.measures.first().and_then(|m| m.key)
    }

    pub fn first_time(&self) -> Option<TimeSignature> {
        self.measures.first().and_then(|m| m.time)
    }

    pub fn last_measure_number(&self) -> Option<u32> {
        self.measures.last().map(|m| m.number)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub composer: Option<String>,
    /// Quarter notes per minute, from the first tempo marking.
    pub tempo: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub metadata: Metadata,
    /// Ticks per quarter note.
    pub divisions: u64,
    pub parts: Vec<Part>,
}

impl Score {
    /// A score holding a single part, keeping this score's metadata.
    pub fn with_part(&self, part: Part) -> Score {
        Score {
            metadata: self.metadata.clone(),
            divisions: self.divisions,
            parts: vec![part],
        }
    }

    pub fn first_time(&self) -> Option<TimeSignature> {
        self.parts.iter().find_map(Part::first_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spell_in_sharp_and_flat_keys() {
        let g_major = KeySignature { fifths: 1, mode: Mode::Major };
        let f_major = KeySignature { fifths: -1, mode: Mode::Major };

        let fs = g_major.spell(66);
        assert_eq!((fs.step, fs.alter, fs.octave), (Step::F, 1, 4));
        let gb = f_major.spell(66);
        assert_eq!((gb.step, gb.alter, gb.octave), (Step::G, -1, 4));
        assert_eq!(gb.midi(), Some(66));
    }

    #[test]
    fn test_alter_for_step() {
        let d_major = KeySignature { fifths: 2, mode: Mode::Major };
        assert_eq!(d_major.alter_for_step(Step::F), 1);
        assert_eq!(d_major.alter_for_step(Step::C), 1);
        assert_eq!(d_major.alter_for_step(Step::G), 0);

        let bb_major = KeySignature { fifths: -2, mode: Mode::Major };
        assert_eq!(bb_major.alter_for_step(Step::B), -1);
        assert_eq!(bb_major.alter_for_step(Step::E), -1);
        assert_eq!(bb_major.alter_for_step(Step::A), 0);
    }

    #[test]
    fn test_spelled_pitch_out_of_range() {
        let high = SpelledPitch { step: Step::A, alter: 0, octave: 9 };
        assert_eq!(high.midi(), None);
        let middle_c = SpelledPitch { step: Step::C, alter: 0, octave: 4 };
        assert_eq!(middle_c.midi(), Some(60));
    }

    #[test]
    fn test_measure_ticks() {
        assert_eq!(TimeSignature { beats: 6, beat_type: 8 }.measure_ticks(2), Some(6));
        assert_eq!(TimeSignature { beats: 3, beat_type: 8 }.measure_ticks(1), None);
    }

    #[test]
    fn test_tie_roles() {
        assert_eq!(Pitch::with_ties(60, true, false).tie, Some(Tie::Stop));
        assert!(Pitch::with_ties(60, true, true).is_tied_from_previous());
        assert!(!Pitch::with_ties(60, false, true).is_tied_from_previous());
    }
}
