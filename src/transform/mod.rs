//! # Transform Family
//!
//! Rewrites of a line's matrix representation into practice variants.
//!
//! ## Pipeline
//! Every transform follows the same steps:
//! 1. Flatten the durations grid ([`FlattenedDurations`])
//! 2. Find runs of repeated durations
//! 3. Rewrite the sequence and build a *new* time→pitches map
//! 4. Reject when nothing changed or nothing is left sounding
//! 5. Reconstruct onset map and piano roll from the rewritten durations
//!
//! ## Transforms
//! - [`Dotted`] - cyclic duration multipliers inside runs (long-short, short-long)
//! - [`Chordify`] - merge consecutive onsets of a run into playable chords
//! - [`SlowDown`] - integer time-stretch of the whole line
//!
//! A rejected transform is a normal outcome, not an error: the variant is
//! simply not produced.

mod chordify;
mod dotted;
mod slowdown;

pub use chordify::{chord_levels, Chordify};
pub use dotted::Dotted;
pub use slowdown::SlowDown;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::matrix::{FlattenedDurations, MusicMatrixRepresentation, Run};

/// Why a transform produced no variant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("rewrite left the durations unchanged")]
    Unchanged,

    #[error("rewrite left nothing sounding")]
    EmptyPianoRoll,

    #[error("chord at step {start} spans {span} semitones (maximum {max})")]
    SpanTooWide { start: usize, span: u8, max: u8 },

    #[error("chord at step {start} has {count} pitches (maximum {max})")]
    TooManyPitches { start: usize, count: usize, max: usize },

    #[error("variant would be {width} steps wide (maximum {max})")]
    TooWide { width: usize, max: usize },

    #[error("invalid transform parameter: {0}")]
    InvalidParameter(String),
}

pub type TransformResult = Result<Variant, Rejection>;

/// How far a run was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunRewrite {
    /// Every onset of the run was rewritten.
    Complete,
    /// Rewriting stopped early; the first `rewritten` onsets were kept and
    /// the rest of the run is silent. `stopped_at` is the step of the first
    /// onset that was not rewritten.
    Partial { rewritten: usize, stopped_at: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub run: Run,
    pub rewrite: RunRewrite,
}

/// An accepted transform output.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub matrix: MusicMatrixRepresentation,
    /// Per-run outcome, for transforms that can stop part-way through a run.
    pub runs: Vec<RunReport>,
}

impl Variant {
    pub fn has_partial_runs(&self) -> bool {
        self.runs
            .iter()
            .any(|r| matches!(r.rewrite, RunRewrite::Partial { .. }))
    }
}

/// A rewrite of a matrix representation into a new one.
pub trait Transform {
    /// Short human-readable label, used in logs.
    fn label(&self) -> String;

    fn apply(&self, source: &MusicMatrixRepresentation) -> TransformResult;
}

/// Pitches of the flattened view whose onset lies outside every run.
fn pitches_outside_runs(flat: &FlattenedDurations, runs: &[Run]) -> BTreeMap<usize, Vec<u8>> {
    flat.time_to_pitches
        .iter()
        .filter(|(time, _)| !runs.iter().any(|r| (r.start..r.end).contains(*time)))
        .map(|(time, pitches)| (*time, pitches.clone()))
        .collect()
}

/// Shared tail of the pipeline: unchanged check, reconstruction, empty check.
fn finish(
    source: &MusicMatrixRepresentation,
    original: &[u32],
    durations: Vec<u32>,
    time_to_pitches: &BTreeMap<usize, Vec<u8>>,
    runs: Vec<RunReport>,
) -> TransformResult {
    if durations.as_slice() == original {
        return Err(Rejection::Unchanged);
    }

    let grid = FlattenedDurations::to_grid(&durations, time_to_pitches, durations.len());
    let matrix = MusicMatrixRepresentation::from_durations(
        grid,
        source.key_signature,
        source.time_signature,
        source.quantization,
    );
    if matrix.piano_roll.is_empty() {
        return Err(Rejection::EmptyPianoRoll);
    }

    Ok(Variant { matrix, runs })
}
