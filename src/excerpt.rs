//! # Excerpts
//!
//! Measure-range slicing and the seconds → measure lookup used to pick an
//! excerpt from a playback position.
//!
//! ## Range Rules
//! - no bounds: the whole score, untouched
//! - missing start: measure 1
//! - missing end: the last measure number of the first part
//! - start or end below 1, beyond the last measure, or start after end:
//!   [`EtudeError::InvalidMeasureRange`]
//!
//! Ties that reach across the excerpt boundary are cut, so the first note of
//! an excerpt always starts a new onset.

use serde::{Deserialize, Serialize};

use crate::error::EtudeError;
use crate::score::{Element, ElementKind, Measure, Part, Pitch, Score};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureRange {
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl MeasureRange {
    pub fn new(start: Option<u32>, end: Option<u32>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Fill in missing bounds and validate against `score`.
    pub fn resolve(&self, score: &Score) -> Result<(u32, u32), EtudeError> {
        let last = score
            .parts
            .first()
            .and_then(Part::last_measure_number)
            .ok_or_else(|| EtudeError::InvalidMeasureRange("score has no measures".to_string()))?;

        let start = self.start.unwrap_or(1);
        let end = self.end.unwrap_or(last);

        if start < 1 {
            return Err(EtudeError::InvalidMeasureRange(
                "Start measure must be at least 1".to_string(),
            ));
        }
        if end < 1 {
            return Err(EtudeError::InvalidMeasureRange(
                "End measure must be at least 1".to_string(),
            ));
        }
        if start > last {
            return Err(EtudeError::InvalidMeasureRange(format!(
                "Start measure {} is beyond the last measure {}",
                start, last
            )));
        }
        if end > last {
            return Err(EtudeError::InvalidMeasureRange(format!(
                "End measure {} is beyond the last measure {}",
                end, last
            )));
        }
        if start > end {
            return Err(EtudeError::InvalidMeasureRange(
                "Start measure cannot be greater than end measure".to_string(),
            ));
        }
        Ok((start, end))
    }
}

/// Cut `score` down to the measures in `range`.
///
/// # Example
/// ```rust
/// use etude::{parse_musicxml, slice, MeasureRange};
///
/// let xml = r#"<score-partwise><part-list><score-part id="P1"/></part-list>
/// <part id="P1">
///   <measure number="1"><note><rest/><duration>4</duration></note></measure>
///   <measure number="2"><note><rest/><duration>4</duration></note></measure>
/// </part></score-partwise>"#;
/// let score = parse_musicxml(xml)?;
///
/// let second = slice(&score, MeasureRange::new(Some(2), None))?;
/// assert_eq!(second.parts[0].measures.len(), 1);
/// assert_eq!(second.parts[0].measures[0].offset, 0);
///
/// assert!(slice(&score, MeasureRange::new(Some(2), Some(1))).is_err());
/// # Ok::<(), etude::EtudeError>(())
/// ```
pub fn slice(score: &Score, range: MeasureRange) -> Result<Score, EtudeError> {
    if range.is_unbounded() {
        return Ok(score.clone());
    }
    let (start, end) = range.resolve(score)?;

    let parts = score
        .parts
        .iter()
        .map(|part| Part {
            id: part.id.clone(),
            name: part.name.clone(),
            measures: slice_measures(&part.measures, start, end),
        })
        .collect();

    Ok(Score {
        metadata: score.metadata.clone(),
        divisions: score.divisions,
        parts,
    })
}

fn slice_measures(measures: &[Measure], start: u32, end: u32) -> Vec<Measure> {
    let mut kept: Vec<Measure> = measures
        .iter()
        .filter(|m| (start..=end).contains(&m.number))
        .cloned()
        .collect();

    let base = kept.first().map(|m| m.offset).unwrap_or(0);
    for measure in &mut kept {
        measure.offset -= base;
    }
    if let Some(first) = kept.first_mut() {
        cut_ties(first, Boundary::Start);
    }
    if let Some(last) = kept.last_mut() {
        cut_ties(last, Boundary::End);
    }
    kept
}

#[derive(Clone, Copy)]
enum Boundary {
    Start,
    End,
}

/// Remove tie links that point outside the measure: a continuation with no
/// matching note earlier in the measure, or a tie start with nothing after it.
fn cut_ties(measure: &mut Measure, boundary: Boundary) {
    let snapshot = measure.elements.clone();
    for element in &mut measure.elements {
        let (voice, start, end) = (element.voice, element.offset, element.offset + element.duration);
        if let ElementKind::Note { pitches } = &mut element.kind {
            for pitch in pitches.iter_mut() {
                let midi = pitch.midi;
                match boundary {
                    Boundary::Start if pitch.is_tied_from_previous() => {
                        if !sounds_in(&snapshot, voice, midi, |e| e.offset + e.duration == start) {
                            *pitch = Pitch::with_ties(midi, false, pitch.is_tied_to_next());
                        }
                    }
                    Boundary::End if pitch.is_tied_to_next() => {
                        if !sounds_in(&snapshot, voice, midi, |e| e.offset == end) {
                            *pitch = Pitch::with_ties(midi, pitch.is_tied_from_previous(), false);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn sounds_in(elements: &[Element], voice: u8, midi: u8, at: impl Fn(&Element) -> bool) -> bool {
    elements
        .iter()
        .any(|e| e.voice == voice && at(e) && e.pitches().iter().any(|p| p.midi == midi))
}

/// Measure number sounding `second` seconds into the score:
/// `floor(second × bpm / (60 × beats)) + 1`.
///
/// The tempo is the score's first tempo marking, or `default_bpm`; `beats`
/// is the numerator of the first time signature (4 when there is none).
pub fn measure_at_second(score: &Score, second: f64, default_bpm: f64) -> u32 {
    let bpm = score.metadata.tempo.unwrap_or(default_bpm);
    let beats = score.first_time().map(|t| t.beats).unwrap_or(4).max(1) as f64;
    let measure = (second.max(0.0) * bpm / (60.0 * beats)).floor();
    if measure.is_finite() {
        measure.min(u32::MAX as f64 - 1.0) as u32 + 1
    } else {
        1
    }
}
