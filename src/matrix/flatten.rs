//! # Flattened Durations
//!
//! The working view every transform consumes: one duration per time step
//! plus the set of pitches starting at that step.
//!
//! ## Homophony Assumption
//! Flattening assumes every onset in a column has the same duration. When
//! they disagree, the first nonzero duration in row order (the lowest pitch)
//! is taken and the column is recorded in `misaligned`, so callers can tell
//! a homophonic line from one that was flattened lossily.
//!
//! ## Runs
//! [`find_runs`] scans the flattened sequence for maximal spans repeating
//! one nonzero duration at least twice. Zero entries are sustain or rest
//! steps between onsets and do not break a run.

use std::collections::BTreeMap;

use super::grid::PitchGrid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedDurations {
    /// One entry per time step; nonzero exactly where something starts.
    pub durations: Vec<u32>,
    /// Pitches starting at each onset step, ascending.
    pub time_to_pitches: BTreeMap<usize, Vec<u8>>,
    /// Steps whose simultaneous onsets have differing durations.
    pub misaligned: Vec<usize>,
}

impl FlattenedDurations {
    pub fn from_durations(grid: &PitchGrid<u32>) -> Self {
        let mut durations = vec![0u32; grid.width()];
        let mut time_to_pitches: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
        let mut misaligned = Vec::new();

        for (pitch, time, duration) in grid.nonzero() {
            if durations[time] == 0 {
                durations[time] = duration;
            } else if durations[time] != duration && !misaligned.contains(&time) {
                misaligned.push(time);
            }
            time_to_pitches.entry(time).or_default().push(pitch as u8);
        }
        misaligned.sort_unstable();

        Self {
            durations,
            time_to_pitches,
            misaligned,
        }
    }

    /// True when every column's onsets agree on their duration.
    pub fn is_homophonic(&self) -> bool {
        self.misaligned.is_empty()
    }

    pub fn pitches_at(&self, time: usize) -> &[u8] {
        self.time_to_pitches.get(&time).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn runs(&self) -> Vec<Run> {
        find_runs(&self.durations)
    }

    /// Expand a sequence and pitch map back into a durations grid of
    /// `width` steps. Onsets whose step is out of range or whose duration
    /// is zero are dropped.
    pub fn to_grid(
        durations: &[u32],
        time_to_pitches: &BTreeMap<usize, Vec<u8>>,
        width: usize,
    ) -> PitchGrid<u32> {
        let mut grid = PitchGrid::new(width);
        for (&time, pitches) in time_to_pitches.range(..width) {
            let duration = durations.get(time).copied().unwrap_or(0);
            if duration == 0 {
                continue;
            }
            for &pitch in pitches {
                grid.set(pitch as usize, time, duration);
            }
        }
        grid
    }
}

/// A maximal span of one repeated nonzero duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    /// Exclusive: the next differing onset, or the end of the sequence.
    pub end: usize,
    /// Number of onsets in the run, at least 2.
    pub count: usize,
}

/// Find the runs of a duration sequence in one left-to-right pass.
pub fn find_runs(durations: &[u32]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut current: Option<(u32, usize, usize)> = None; // (value, start, count)

    for (t, &duration) in durations.iter().enumerate() {
        if duration == 0 {
            continue;
        }
        match current {
            Some((value, start, count)) if value == duration => {
                current = Some((value, start, count + 1));
            }
            Some((_, start, count)) => {
                if count > 1 {
                    runs.push(Run { start, end: t, count });
                }
                current = Some((duration, t, 1));
            }
            None => current = Some((duration, t, 1)),
        }
    }

    if let Some((_, start, count)) = current {
        if count > 1 {
            runs.push(Run {
                start,
                end: durations.len(),
                count,
            });
        }
    }

    runs
}
