//! Dotted-rhythm rewrite.
//!
//! Inside each run the old onsets are visited in order; each duration is
//! multiplied by the next pattern entry (cycling) and truncated, and the new
//! notes are packed back-to-back from the start of the run. With `[1.5, 0.5]`
//! four eighths `2 2 2 2` become `3 1 3 1`.
//!
//! A truncated duration below one step stops the rewrite of that run. The
//! notes already rewritten stay; the rest of the run becomes silence, and
//! the run is reported as [`RunRewrite::Partial`].

use tracing::debug;

use super::{finish, pitches_outside_runs, Rejection, RunReport, RunRewrite, Transform, TransformResult};
use crate::matrix::MusicMatrixRepresentation;

#[derive(Debug, Clone, PartialEq)]
pub struct Dotted {
    pattern: Vec<f64>,
}

impl Dotted {
    pub fn new(pattern: Vec<f64>) -> Self {
        Self { pattern }
    }

    pub fn pattern(&self) -> &[f64] {
        &self.pattern
    }
}

impl Transform for Dotted {
    fn label(&self) -> String {
        format!("dotted {:?}", self.pattern)
    }

    fn apply(&self, source: &MusicMatrixRepresentation) -> TransformResult {
        if self.pattern.is_empty() {
            return Err(Rejection::InvalidParameter("empty dotted pattern".to_string()));
        }

        let flat = source.flatten();
        let runs = flat.runs();
        let mut durations = flat.durations.clone();
        let mut time_to_pitches = pitches_outside_runs(&flat, &runs);
        let mut reports = Vec::with_capacity(runs.len());

        for run in &runs {
            let len = run.end - run.start;
            let mut phrase = vec![0u32; len];
            let mut old_i = 0;
            let mut new_i = 0;
            let mut step = 0;
            let mut rewritten = 0;

            while old_i < len && new_i < len {
                let old = flat.durations[run.start + old_i];
                let scaled = (old as f64 * self.pattern[step]).trunc();
                // also catches NaN
                if !(scaled >= 1.0) {
                    break;
                }
                let new = scaled.min(u32::MAX as f64) as u32;

                phrase[new_i] = new;
                time_to_pitches.insert(run.start + new_i, flat.pitches_at(run.start + old_i).to_vec());

                old_i += old as usize;
                new_i += new as usize;
                step = (step + 1) % self.pattern.len();
                rewritten += 1;
            }

            let rewrite = if old_i >= len {
                RunRewrite::Complete
            } else {
                debug!(
                    start = run.start,
                    end = run.end,
                    rewritten,
                    "dotted rewrite stopped part-way through a run"
                );
                RunRewrite::Partial {
                    rewritten,
                    stopped_at: run.start + old_i,
                }
            };

            durations[run.start..run.end].copy_from_slice(&phrase);
            reports.push(RunReport { run: *run, rewrite });
        }

        finish(source, &flat.durations, durations, &time_to_pitches, reports)
    }
}
