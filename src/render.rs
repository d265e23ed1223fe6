//! # Notation Renderer
//!
//! Turns a [`MusicMatrixRepresentation`] back into a single-part [`Score`]
//! that the MusicXML writer can serialize.
//!
//! ## Steps
//! 1. Group onsets by `(step, duration)`; each group becomes one chord
//! 2. Lay groups into voices: a group goes to the first voice that is free
//!    at its start, otherwise it opens a new voice
//! 3. Cut every note at barlines, then into notatable lengths, tying the
//!    pieces together
//! 4. Fill the gaps of every voice with rests
//!
//! One step is one tick, unless a measure would not hold a whole number of
//! steps; then every step is scaled to a few ticks so it does.

use std::collections::BTreeMap;

use crate::matrix::MusicMatrixRepresentation;
use crate::score::{Element, ElementKind, Measure, Metadata, Part, Pitch, Score, TimeSignature};

/// A chord placed on the tick grid.
#[derive(Debug, Clone)]
struct Placed {
    start: u64,
    duration: u64,
    pitches: Vec<u8>,
}

pub fn render(matrix: &MusicMatrixRepresentation) -> Score {
    let quantization = matrix.quantization.max(1) as u64;
    let (time, scale) = tick_scale(matrix.time_signature, quantization);
    let divisions = quantization * scale;
    let measure_len = time.measure_ticks(divisions).unwrap_or(4 * divisions).max(1);

    let mut groups: BTreeMap<(usize, u32), Vec<u8>> = BTreeMap::new();
    for (pitch, start, duration) in matrix.onsets() {
        groups.entry((start, duration)).or_default().push(pitch);
    }

    let mut voices: Vec<Vec<Placed>> = Vec::new();
    for ((start, duration), pitches) in groups {
        let placed = Placed {
            start: start as u64 * scale,
            duration: duration as u64 * scale,
            pitches,
        };
        let free = voices
            .iter_mut()
            .find(|voice| voice.last().map_or(true, |last| last.start + last.duration <= placed.start));
        match free {
            Some(voice) => voice.push(placed),
            None => voices.push(vec![placed]),
        }
    }

    let end = voices
        .iter()
        .flatten()
        .map(|p| p.start + p.duration)
        .max()
        .unwrap_or(0)
        .max(matrix.width() as u64 * scale);
    let measure_count = end.div_ceil(measure_len).max(1) as usize;

    let mut buckets: Vec<Vec<Element>> = vec![Vec::new(); measure_count];
    for (index, voice) in voices.iter().enumerate() {
        let voice_number = index as u8 + 1;
        for placed in voice {
            place_note(&mut buckets, placed, voice_number, measure_len, divisions);
        }
    }

    let voice_count = voices.len().max(1) as u8;
    let measures = buckets
        .into_iter()
        .enumerate()
        .map(|(index, mut elements)| {
            for voice in 1..=voice_count {
                let has_notes = elements.iter().any(|e| e.voice == voice);
                if voice == 1 || has_notes {
                    fill_rests(&mut elements, voice, measure_len, divisions);
                }
            }
            elements.sort_by_key(|e| (e.voice, e.offset));
            Measure {
                number: index as u32 + 1,
                offset: index as u64 * measure_len,
                duration: measure_len,
                key: matrix.key_signature,
                time: Some(time),
                elements,
            }
        })
        .collect();

    Score {
        metadata: Metadata::default(),
        divisions,
        parts: vec![Part {
            id: "P1".to_string(),
            name: "Exercise".to_string(),
            measures,
        }],
    }
}

/// Ticks per step so that a measure is a whole number of ticks. Falls back
/// to 4/4 for a meter with no beats.
fn tick_scale(time: TimeSignature, quantization: u64) -> (TimeSignature, u64) {
    (1..=time.beat_type.max(1) as u64)
        .find(|scale| matches!(time.measure_ticks(quantization * scale), Some(t) if t > 0))
        .map(|scale| (time, scale))
        .unwrap_or((TimeSignature::default(), 1))
}

fn place_note(buckets: &mut [Vec<Element>], placed: &Placed, voice: u8, measure_len: u64, divisions: u64) {
    // cut at barlines, then into notatable lengths
    let mut pieces: Vec<(u64, u64)> = Vec::new();
    let end = placed.start + placed.duration;
    let mut position = placed.start;
    while position < end {
        let barline = (position / measure_len + 1) * measure_len;
        let segment_end = end.min(barline);
        for length in split_notatable(segment_end - position, divisions) {
            pieces.push((position, length));
            position += length;
        }
    }

    let count = pieces.len();
    for (i, (start, length)) in pieces.into_iter().enumerate() {
        let index = (start / measure_len) as usize;
        let Some(bucket) = buckets.get_mut(index) else {
            continue;
        };
        bucket.push(Element {
            voice,
            offset: start - index as u64 * measure_len,
            duration: length,
            kind: ElementKind::Note {
                pitches: placed
                    .pitches
                    .iter()
                    .map(|&midi| Pitch::with_ties(midi, i > 0, i + 1 < count))
                    .collect(),
            },
        });
    }
}

fn fill_rests(elements: &mut Vec<Element>, voice: u8, measure_len: u64, divisions: u64) {
    let mut occupied: Vec<(u64, u64)> = elements
        .iter()
        .filter(|e| e.voice == voice)
        .map(|e| (e.offset, e.offset + e.duration))
        .collect();
    occupied.sort_unstable();

    let mut gaps = Vec::new();
    let mut position = 0;
    for (start, end) in occupied {
        if start > position {
            gaps.push((position, start));
        }
        position = position.max(end);
    }
    if position < measure_len {
        gaps.push((position, measure_len));
    }

    for (start, end) in gaps {
        let mut offset = start;
        for length in split_notatable(end - start, divisions) {
            elements.push(Element {
                voice,
                offset,
                duration: length,
                kind: ElementKind::Rest,
            });
            offset += length;
        }
    }
}

/// Note lengths in ticks, longest first: whole to 128th, plain and dotted,
/// keeping only those that are whole tick counts.
fn notatable_lengths(divisions: u64) -> Vec<u64> {
    let whole = 4 * divisions;
    let mut lengths = Vec::new();
    for exponent in 0..=7u32 {
        let denominator = 1u64 << exponent;
        if whole % denominator != 0 {
            continue;
        }
        let plain = whole / denominator;
        if plain % 2 == 0 {
            lengths.push(plain / 2 * 3);
        }
        lengths.push(plain);
    }
    lengths.sort_unstable_by(|a, b| b.cmp(a));
    lengths.dedup();
    lengths
}

/// Greedy split of `length` into notatable values. Whatever is left below the
/// shortest notatable value stays as one piece with no note type.
fn split_notatable(length: u64, divisions: u64) -> Vec<u64> {
    let lengths = notatable_lengths(divisions);
    let mut pieces = Vec::new();
    let mut remaining = length;
    while remaining > 0 {
        match lengths.iter().find(|l| **l <= remaining) {
            Some(&l) => {
                pieces.push(l);
                remaining -= l;
            }
            None => {
                pieces.push(remaining);
                remaining = 0;
            }
        }
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Tie;
    use crate::transform::test_support::matrix;

    fn notes(score: &Score) -> Vec<(u32, u8, u64, u64, Vec<u8>)> {
        score.parts[0]
            .measures
            .iter()
            .flat_map(|m| {
                m.elements
                    .iter()
                    .filter(|e| e.is_note())
                    .map(move |e| (m.number, e.voice, e.offset, e.duration, e.pitches().iter().map(|p| p.midi).collect()))
            })
            .collect()
    }

    #[test]
    fn test_split_notatable() {
        // divisions 2: whole 8, dotted half 6, half 4, dotted quarter 3, quarter 2, eighth 1
        assert_eq!(split_notatable(8, 2), vec![8]);
        assert_eq!(split_notatable(7, 2), vec![6, 1]);
        assert_eq!(split_notatable(5, 2), vec![4, 1]);
        assert_eq!(notatable_lengths(1), vec![6, 4, 3, 2, 1]);
    }

    #[test]
    fn test_chords_and_rests() {
        let score = render(&matrix(8, &[(60, 0, 2), (64, 0, 2), (62, 4, 2)]));
        assert_eq!(score.divisions, 2);
        assert_eq!(
            notes(&score),
            vec![(1, 1, 0, 2, vec![60, 64]), (1, 1, 4, 2, vec![62])]
        );
        let rests: Vec<(u64, u64)> = score.parts[0].measures[0]
            .elements
            .iter()
            .filter(|e| !e.is_note())
            .map(|e| (e.offset, e.duration))
            .collect();
        assert_eq!(rests, vec![(2, 2), (6, 2)]);
    }

    #[test]
    fn test_tie_across_barline() {
        let score = render(&matrix(10, &[(60, 6, 4)]));
        let measures = &score.parts[0].measures;
        assert_eq!(measures.len(), 2);

        let first = measures[0].elements.iter().find(|e| e.is_note()).unwrap();
        assert_eq!((first.offset, first.duration), (6, 2));
        assert_eq!(first.pitches()[0].tie, Some(Tie::Start));

        let second = measures[1].elements.iter().find(|e| e.is_note()).unwrap();
        assert_eq!((second.offset, second.duration), (0, 2));
        assert_eq!(second.pitches()[0].tie, Some(Tie::Stop));

        // the rest of the last measure is one dotted half rest
        let rest = measures[1].elements.iter().find(|e| !e.is_note()).unwrap();
        assert_eq!((rest.offset, rest.duration), (2, 6));
    }

    #[test]
    fn test_overlapping_durations_get_their_own_voice() {
        let score = render(&matrix(8, &[(60, 0, 8), (72, 0, 4), (74, 4, 4)]));
        let notes = notes(&score);
        assert!(notes.contains(&(1, 1, 0, 4, vec![72])));
        assert!(notes.contains(&(1, 1, 4, 4, vec![74])));
        assert!(notes.contains(&(1, 2, 0, 8, vec![60])));
    }

    #[test]
    fn test_empty_matrix_is_one_rest_measure() {
        let score = render(&matrix(0, &[]));
        let measures = &score.parts[0].measures;
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0].elements.len(), 1);
        assert!(!measures[0].elements[0].is_note());
    }

    #[test]
    fn test_steps_are_scaled_for_odd_meters() {
        let mut source = matrix(3, &[(60, 0, 1), (62, 1, 1), (64, 2, 1)]);
        source.quantization = 1;
        source.time_signature = TimeSignature { beats: 3, beat_type: 8 };
        let score = render(&source);
        // 3/8 holds 1.5 quarters: two ticks per step
        assert_eq!(score.divisions, 2);
        assert_eq!(score.parts[0].measures[0].duration, 3);
        assert_eq!(score.parts[0].measures.len(), 2);
    }
}
