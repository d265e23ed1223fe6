//! Slowed-down rewrite: every onset step and every duration times `factor`.

use std::collections::BTreeMap;

use super::{finish, Rejection, Transform, TransformResult};
use crate::matrix::MusicMatrixRepresentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlowDown {
    factor: usize,
    max_width: usize,
}

impl SlowDown {
    pub fn new(factor: usize, max_width: usize) -> Self {
        Self { factor, max_width }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }
}

impl Transform for SlowDown {
    fn label(&self) -> String {
        format!("slowed down x{}", self.factor)
    }

    fn apply(&self, source: &MusicMatrixRepresentation) -> TransformResult {
        if self.factor == 0 {
            return Err(Rejection::InvalidParameter("slowdown factor must be at least 1".to_string()));
        }
        let width = source
            .width()
            .checked_mul(self.factor)
            .filter(|w| *w <= self.max_width)
            .ok_or(Rejection::TooWide {
                width: source.width().saturating_mul(self.factor),
                max: self.max_width,
            })?;

        let flat = source.flatten();
        let factor = self.factor as u32;

        let mut durations = vec![0u32; width];
        for (t, duration) in flat.durations.iter().enumerate() {
            durations[t * self.factor] = duration.saturating_mul(factor);
        }
        let time_to_pitches: BTreeMap<usize, Vec<u8>> = flat
            .time_to_pitches
            .iter()
            .map(|(time, pitches)| (time * self.factor, pitches.clone()))
            .collect();

        finish(source, &flat.durations, durations, &time_to_pitches, Vec::new())
    }
}
