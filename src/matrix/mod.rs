//! # Matrix Representation
//!
//! A line of music as three aligned 128×T grids: rows are MIDI pitches,
//! columns are quantized time steps.
//!
//! - `piano_roll[p, t]`: pitch `p` is sounding at step `t`
//! - `onset_map[p, t]`: a note on pitch `p` starts at step `t`
//! - `durations[p, t]`: length in steps of the note starting at `(p, t)`,
//!   zero everywhere else
//!
//! A representation is built once, either from note events
//! ([`MusicMatrixRepresentation::from_events`]) or from a rewritten durations
//! grid ([`MusicMatrixRepresentation::from_durations`]), and never mutated.
//!
//! ## Related Modules
//! - `quantize` - the step resolution
//! - `flatten` - the single-sequence working view and the run finder
//! - `crate::transform` - rewrites producing new representations

mod flatten;
mod grid;
mod quantize;

pub use flatten::{find_runs, FlattenedDurations, Run};
pub use grid::{PitchGrid, PITCH_ROWS};
pub use quantize::{quantization, ticks_to_step};

use crate::error::EtudeError;
use crate::score::{KeySignature, TimeSignature};

/// One pitch of a note or chord, placed on the step grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub start_step: usize,
    pub duration_steps: usize,
    /// A tie continuation: sounds, but does not start a new onset.
    pub tied_from_previous: bool,
}

impl NoteEvent {
    pub fn end_step(&self) -> usize {
        self.start_step + self.duration_steps
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicMatrixRepresentation {
    pub key_signature: Option<KeySignature>,
    pub time_signature: TimeSignature,
    /// Steps per quarter note.
    pub quantization: usize,
    pub piano_roll: PitchGrid<bool>,
    pub onset_map: PitchGrid<bool>,
    pub durations: PitchGrid<u32>,
}

impl MusicMatrixRepresentation {
    /// Build the matrices for a line of note events.
    ///
    /// The width is the latest end step of any event. Tie continuations
    /// extend the piano roll without marking an onset, so the duration of a
    /// tied note covers the whole tied group. A duration is the run of
    /// sounding steps from its onset, cut short by the next onset on the same
    /// pitch. Events outside the MIDI range (pitch 128 and up) are ignored.
    ///
    /// # Errors
    /// [`EtudeError::MatrixTooWide`] when the width exceeds `max_width`.
    pub fn from_events(
        events: &[NoteEvent],
        key_signature: Option<KeySignature>,
        time_signature: TimeSignature,
        quantization: usize,
        max_width: usize,
    ) -> Result<Self, EtudeError> {
        let events: Vec<&NoteEvent> = events
            .iter()
            .filter(|e| usize::from(e.pitch) < PITCH_ROWS)
            .collect();
        let width = events.iter().map(|e| e.end_step()).max().unwrap_or(0);
        if width > max_width {
            return Err(EtudeError::MatrixTooWide { width, max: max_width });
        }

        let mut piano_roll = PitchGrid::new(width);
        let mut onset_map = PitchGrid::new(width);

        for event in events.iter().filter(|e| e.duration_steps > 0) {
            let pitch = event.pitch as usize;
            if !event.tied_from_previous {
                onset_map.set(pitch, event.start_step, true);
            }
            piano_roll.row_mut(pitch)[event.start_step..event.end_step()].fill(true);
        }

        let mut durations = PitchGrid::new(width);
        for pitch in 0..PITCH_ROWS {
            let sounding = piano_roll.row(pitch);
            let onsets = onset_map.row(pitch);
            for start in (0..width).filter(|t| onsets[*t]) {
                let length = 1 + (start + 1..width)
                    .take_while(|t| sounding[*t] && !onsets[*t])
                    .count();
                durations.set(pitch, start, length as u32);
            }
        }

        Ok(Self {
            key_signature,
            time_signature,
            quantization,
            piano_roll,
            onset_map,
            durations,
        })
    }

    /// Rebuild the onset map and piano roll from a durations grid.
    ///
    /// Every nonzero cell `(p, t) = d` is an onset and sounds over
    /// `[t, t + d)`, clipped at the grid width.
    pub fn from_durations(
        durations: PitchGrid<u32>,
        key_signature: Option<KeySignature>,
        time_signature: TimeSignature,
        quantization: usize,
    ) -> Self {
        let width = durations.width();
        let onset_map = durations.map(|d| d != 0);
        let mut piano_roll = PitchGrid::new(width);
        for (pitch, start, duration) in durations.nonzero() {
            let end = (start + duration as usize).min(width);
            piano_roll.row_mut(pitch)[start..end].fill(true);
        }

        Self {
            key_signature,
            time_signature,
            quantization,
            piano_roll,
            onset_map,
            durations,
        }
    }

    pub fn width(&self) -> usize {
        self.durations.width()
    }

    /// Collapse to the single-sequence working view.
    pub fn flatten(&self) -> FlattenedDurations {
        FlattenedDurations::from_durations(&self.durations)
    }

    /// Onsets as `(pitch, start, duration)` in row-major order.
    pub fn onsets(&self) -> impl Iterator<Item = (u8, usize, u32)> + '_ {
        self.durations
            .nonzero()
            .map(|(pitch, time, duration)| (pitch as u8, time, duration))
    }

    /// Check that the onset map is the nonzero mask of the durations grid
    /// and that the piano roll is exactly the union of every onset's span.
    /// Holds for every reconstructed representation; builder output with tie
    /// continuations over rests may not satisfy it.
    pub fn is_consistent(&self) -> bool {
        let rebuilt = Self::from_durations(
            self.durations.clone(),
            self.key_signature,
            self.time_signature,
            self.quantization,
        );
        rebuilt.onset_map == self.onset_map && rebuilt.piano_roll == self.piano_roll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pitch: u8, start: usize, duration: usize) -> NoteEvent {
        NoteEvent {
            pitch,
            start_step: start,
            duration_steps: duration,
            tied_from_previous: false,
        }
    }

    fn build(events: &[NoteEvent]) -> MusicMatrixRepresentation {
        MusicMatrixRepresentation::from_events(events, None, TimeSignature::default(), 4, 1024).unwrap()
    }

    #[test]
    fn test_width_from_latest_end() {
        let mmr = build(&[event(60, 0, 2), event(62, 2, 3)]);
        assert_eq!(mmr.width(), 5);
    }

    #[test]
    fn test_empty_events() {
        let mmr = build(&[]);
        assert_eq!(mmr.width(), 0);
        assert!(mmr.piano_roll.is_empty());
    }

    #[test]
    fn test_repeated_pitch_durations_stop_at_next_onset() {
        let mmr = build(&[event(60, 0, 2), event(60, 2, 2)]);
        assert_eq!(mmr.durations.get(60, 0), 2);
        assert_eq!(mmr.durations.get(60, 2), 2);
        assert!(mmr.is_consistent());
    }

    #[test]
    fn test_tie_continuation_extends_duration() {
        let mut tied = event(60, 2, 2);
        tied.tied_from_previous = true;
        let mmr = build(&[event(60, 0, 2), tied]);

        assert!(mmr.onset_map.get(60, 0));
        assert!(!mmr.onset_map.get(60, 2));
        assert_eq!(mmr.durations.get(60, 0), 4);
        assert_eq!(mmr.durations.get(60, 2), 0);
    }

    #[test]
    fn test_duration_stops_at_gap() {
        // note, rest, orphaned tie continuation: only the first two steps count
        let mut tied = event(60, 3, 1);
        tied.tied_from_previous = true;
        let mmr = build(&[event(60, 0, 2), tied]);
        assert_eq!(mmr.durations.get(60, 0), 2);
        assert!(mmr.piano_roll.get(60, 3));
    }

    #[test]
    fn test_chord_places_one_onset_per_pitch() {
        let mmr = build(&[event(60, 0, 4), event(64, 0, 4), event(67, 0, 4)]);
        for pitch in [60, 64, 67] {
            assert!(mmr.onset_map.get(pitch, 0));
            assert_eq!(mmr.durations.get(pitch, 0), 4);
        }
    }

    #[test]
    fn test_out_of_range_pitch_is_ignored() {
        let mmr = build(&[event(60, 0, 2), event(128, 0, 8), event(255, 4, 1)]);
        assert_eq!(mmr.width(), 2);
        assert_eq!(mmr.onsets().collect::<Vec<_>>(), vec![(60, 0, 2)]);
    }

    #[test]
    fn test_too_wide_is_rejected() {
        let err = MusicMatrixRepresentation::from_events(
            &[event(60, 0, 100)],
            None,
            TimeSignature::default(),
            4,
            64,
        )
        .unwrap_err();
        assert!(matches!(err, EtudeError::MatrixTooWide { width: 100, max: 64 }));
    }

    #[test]
    fn test_from_durations_clips_at_width() {
        let mut durations = PitchGrid::new(4);
        durations.set(62, 2, 5);
        let mmr = MusicMatrixRepresentation::from_durations(durations, None, TimeSignature::default(), 4);
        assert!(mmr.onset_map.get(62, 2));
        assert!(mmr.piano_roll.get(62, 3));
        assert_eq!(mmr.piano_roll.row(62).iter().filter(|on| **on).count(), 2);
    }
}
