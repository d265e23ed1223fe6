//! Chordify rewrite.
//!
//! Each run is cut into windows of `level` steps (the last may be shorter).
//! All onsets inside a window merge into one chord at the window's first
//! step, lasting the sum of the window's durations. A window that would need
//! a chord wider than an octave or with more than five pitches makes the
//! whole transform fail; both limits are configurable.

use std::collections::BTreeSet;

use super::{finish, pitches_outside_runs, Rejection, Transform, TransformResult};
use crate::matrix::MusicMatrixRepresentation;
use crate::score::TimeSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chordify {
    level: usize,
    max_span: u8,
    max_pitches: usize,
}

impl Chordify {
    pub fn new(level: usize) -> Self {
        Self {
            level,
            max_span: 12,
            max_pitches: 5,
        }
    }

    pub fn with_limits(level: usize, max_span: u8, max_pitches: usize) -> Self {
        Self {
            level,
            max_span,
            max_pitches,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }
}

impl Transform for Chordify {
    fn label(&self) -> String {
        format!("chordify level {}", self.level)
    }

    fn apply(&self, source: &MusicMatrixRepresentation) -> TransformResult {
        if self.level == 0 {
            return Err(Rejection::InvalidParameter("chord level must be at least 1".to_string()));
        }

        let flat = source.flatten();
        let runs = flat.runs();
        let mut durations = flat.durations.clone();
        let mut time_to_pitches = pitches_outside_runs(&flat, &runs);

        for run in &runs {
            for window_start in (run.start..run.end).step_by(self.level) {
                let window_end = (window_start + self.level).min(run.end);
                let window = window_start..window_end;

                let total: u32 = flat.durations[window.clone()].iter().sum();
                let pitches: BTreeSet<u8> = window
                    .clone()
                    .flat_map(|t| flat.pitches_at(t).iter().copied())
                    .collect();

                if let (Some(low), Some(high)) = (pitches.first(), pitches.last()) {
                    let span = high - low;
                    if span > self.max_span {
                        return Err(Rejection::SpanTooWide {
                            start: window_start,
                            span,
                            max: self.max_span,
                        });
                    }
                }
                if pitches.len() > self.max_pitches {
                    return Err(Rejection::TooManyPitches {
                        start: window_start,
                        count: pitches.len(),
                        max: self.max_pitches,
                    });
                }

                durations[window].fill(0);
                durations[window_start] = total;
                if !pitches.is_empty() {
                    time_to_pitches.insert(window_start, pitches.into_iter().collect());
                }
            }
        }

        finish(source, &flat.durations, durations, &time_to_pitches, Vec::new())
    }
}

/// Candidate chord levels for a line: the distinct values of
/// `q, 2q, q/2, d, 2d, d/2, n·d` (integer division) for quantization `q`
/// and time signature `n/d`, ascending. Levels below one are dropped.
pub fn chord_levels(quantization: usize, time_signature: TimeSignature) -> Vec<usize> {
    let numerator = time_signature.beats as usize;
    let denominator = time_signature.beat_type as usize;
    let levels: BTreeSet<usize> = [
        quantization,
        quantization * 2,
        quantization / 2,
        denominator,
        denominator * 2,
        denominator / 2,
        numerator * denominator,
    ]
    .into_iter()
    .filter(|level| *level > 0)
    .collect();
    levels.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::matrix;
    use super::*;

    #[test]
    fn test_pairs_of_eighths_become_quarters() {
        let source = matrix(8, &[(60, 0, 2), (62, 2, 2), (64, 4, 2), (65, 6, 2)]);
        let variant = Chordify::new(4).apply(&source).unwrap();
        let flat = variant.matrix.flatten();

        assert_eq!(flat.durations, vec![4, 0, 0, 0, 4, 0, 0, 0]);
        assert_eq!(flat.pitches_at(0), &[60, 62]);
        assert_eq!(flat.pitches_at(4), &[64, 65]);
        assert!(variant.matrix.is_consistent());
    }

    #[test]
    fn test_short_last_window() {
        let source = matrix(6, &[(60, 0, 2), (62, 2, 2), (64, 4, 2)]);
        let variant = Chordify::new(4).apply(&source).unwrap();
        let flat = variant.matrix.flatten();
        assert_eq!(flat.durations, vec![4, 0, 0, 0, 2, 0]);
        assert_eq!(flat.pitches_at(4), &[64]);
    }

    #[test]
    fn test_wide_interval_rejected_at_every_level() {
        // two simultaneous pitches 13 semitones apart, repeated
        let source = matrix(4, &[(60, 0, 1), (73, 0, 1), (60, 1, 1), (73, 1, 1), (60, 2, 1), (73, 2, 1), (60, 3, 1), (73, 3, 1)]);
        for level in 1..=8 {
            assert!(
                matches!(Chordify::new(level).apply(&source), Err(Rejection::SpanTooWide { span: 13, .. })),
                "level {} should be rejected",
                level
            );
        }
    }

    #[test]
    fn test_six_pitch_cluster_rejected() {
        let mut onsets = Vec::new();
        for start in [0usize, 2] {
            for pitch in 60..66u8 {
                onsets.push((pitch, start, 2));
            }
        }
        let source = matrix(4, &onsets);
        for level in [1, 2, 4] {
            assert!(matches!(
                Chordify::new(level).apply(&source),
                Err(Rejection::TooManyPitches { count: 6, .. })
            ));
        }
    }

    #[test]
    fn test_too_many_pitches_across_window() {
        // six different single notes merged into one window of 6 steps
        let onsets: Vec<_> = (0..6).map(|i| (60 + i as u8, i, 1)).collect();
        let source = matrix(6, &onsets);
        assert!(matches!(Chordify::new(6).apply(&source), Err(Rejection::TooManyPitches { .. })));
        assert!(Chordify::new(3).apply(&source).is_ok());
    }

    #[test]
    fn test_level_one_is_unchanged() {
        let source = matrix(4, &[(60, 0, 2), (62, 2, 2)]);
        assert_eq!(Chordify::new(1).apply(&source), Err(Rejection::Unchanged));
    }

    #[test]
    fn test_custom_span_limit() {
        let source = matrix(4, &[(60, 0, 2), (67, 2, 2)]);
        assert!(Chordify::with_limits(4, 12, 5).apply(&source).is_ok());
        assert!(matches!(
            Chordify::with_limits(4, 5, 5).apply(&source),
            Err(Rejection::SpanTooWide { span: 7, max: 5, .. })
        ));
    }

    #[test]
    fn test_chord_levels() {
        let four_four = TimeSignature { beats: 4, beat_type: 4 };
        assert_eq!(chord_levels(8, four_four), vec![2, 4, 8, 16]);

        let two_two = TimeSignature { beats: 2, beat_type: 2 };
        assert_eq!(chord_levels(1, two_two), vec![1, 2, 4]);
    }
}
