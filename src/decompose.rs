//! # Score Decomposer
//!
//! Splits a score excerpt into the tree the exercises are generated from:
//!
//! ```text
//! ExerciseScore
//!   └── ExercisePart (one per part with notes)
//!         └── ExerciseLine (one per voice with notes)
//!               ├── MusicMatrixRepresentation
//!               └── accepted variants, by category
//! ```
//!
//! Every line computes its own quantization from its own shortest value and
//! time signature. A line with no time signature cannot be quantized and is
//! skipped with a warning.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::EtudeConfig;
use crate::error::EtudeError;
use crate::exercises::Category;
use crate::matrix::{quantization, ticks_to_step, MusicMatrixRepresentation, NoteEvent};
use crate::score::{Part, Score};
use crate::transform::{chord_levels, Chordify, Dotted, SlowDown, Transform, Variant};

#[derive(Debug, Clone)]
pub struct ExerciseScore {
    pub score: Score,
    pub parts: Vec<ExercisePart>,
}

#[derive(Debug, Clone)]
pub struct ExercisePart {
    /// The part alone, all voices.
    pub score: Score,
    pub lines: Vec<ExerciseLine>,
}

#[derive(Debug, Clone)]
pub struct ExerciseLine {
    pub voice: u8,
    /// The voice alone, renumbered as voice 1.
    pub score: Score,
    pub matrix: MusicMatrixRepresentation,
    /// Accepted transform outputs. Only the transform categories appear here
    /// and only when they hold at least one variant.
    pub variants: BTreeMap<Category, Vec<Variant>>,
}

impl ExerciseScore {
    pub fn decompose(score: &Score, config: &EtudeConfig) -> Result<Self, EtudeError> {
        let mut parts = Vec::new();
        for part in &score.parts {
            if !part.has_notes() {
                debug!(part = %part.name, "skipping part without notes");
                continue;
            }
            parts.push(ExercisePart::decompose(score, part, config)?);
        }
        Ok(Self {
            score: score.clone(),
            parts,
        })
    }

    pub fn lines(&self) -> impl Iterator<Item = &ExerciseLine> {
        self.parts.iter().flat_map(|p| p.lines.iter())
    }
}

impl ExercisePart {
    fn decompose(score: &Score, part: &Part, config: &EtudeConfig) -> Result<Self, EtudeError> {
        let mut lines = Vec::new();
        for voice in part.voices() {
            let voice_part = part.voice_part(voice);
            if !voice_part.has_notes() {
                debug!(part = %part.name, voice, "skipping voice without notes");
                continue;
            }
            if let Some(line) = ExerciseLine::build(score.with_part(voice_part), voice, config)? {
                lines.push(line);
            }
        }
        Ok(Self {
            score: score.with_part(part.clone()),
            lines,
        })
    }
}

impl ExerciseLine {
    /// Build the matrix for a single-voice score and run every transform on
    /// it. Returns `None` when the line cannot be quantized or its matrix
    /// would exceed `max_matrix_width`.
    pub fn build(score: Score, voice: u8, config: &EtudeConfig) -> Result<Option<Self>, EtudeError> {
        let Some(part) = score.parts.first() else {
            return Ok(None);
        };
        let time = part.first_time();
        let shortest = part
            .measures
            .iter()
            .flat_map(|m| m.elements.iter())
            .map(|e| e.duration)
            .filter(|d| *d > 0)
            .min();

        let (Some(time_signature), Some(q)) = (time, quantization(shortest, score.divisions, time)) else {
            warn!(
                part = %part.name,
                voice,
                "skipping line: no time signature, so no quantization"
            );
            return Ok(None);
        };

        let events = note_events(part, score.divisions, q);
        let matrix = match MusicMatrixRepresentation::from_events(
            &events,
            part.first_key(),
            time_signature,
            q,
            config.max_matrix_width,
        ) {
            Ok(matrix) => matrix,
            Err(EtudeError::MatrixTooWide { width, max }) => {
                warn!(part = %part.name, voice, width, max, "skipping line: matrix too wide");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let flat = matrix.flatten();
        if !flat.is_homophonic() {
            warn!(
                part = %part.name,
                voice,
                columns = ?flat.misaligned,
                "line is not homophonic; flattening keeps the lowest pitch's duration"
            );
        }

        let variants = generate_variants(&matrix, config);
        Ok(Some(Self {
            voice,
            score,
            matrix,
            variants,
        }))
    }
}

/// One event per sounding pitch, placed on the line's step grid.
fn note_events(part: &Part, divisions: u64, q: usize) -> Vec<NoteEvent> {
    let mut events = Vec::new();
    for measure in &part.measures {
        for element in measure.elements.iter().filter(|e| e.is_note()) {
            let start = measure.offset + element.offset;
            let start_step = ticks_to_step(start, divisions, q);
            let end_step = ticks_to_step(start + element.duration, divisions, q);
            for pitch in element.pitches() {
                events.push(NoteEvent {
                    pitch: pitch.midi,
                    start_step,
                    duration_steps: end_step.saturating_sub(start_step),
                    tied_from_previous: pitch.is_tied_from_previous(),
                });
            }
        }
    }
    events
}

fn generate_variants(matrix: &MusicMatrixRepresentation, config: &EtudeConfig) -> BTreeMap<Category, Vec<Variant>> {
    let mut transforms: Vec<(Category, Box<dyn Transform>)> = Vec::new();
    for pattern in &config.dotted_patterns {
        transforms.push((Category::VoiceDotted, Box::new(Dotted::new(pattern.clone()))));
    }
    for level in chord_levels(matrix.quantization, matrix.time_signature) {
        transforms.push((
            Category::VoiceChordified,
            Box::new(Chordify::with_limits(level, config.max_chord_span, config.max_chord_pitches)),
        ));
    }
    for &factor in &config.slowdown_factors {
        transforms.push((
            Category::VoiceSlowedDown,
            Box::new(SlowDown::new(factor, config.max_matrix_width)),
        ));
    }

    let mut variants: BTreeMap<Category, Vec<Variant>> = BTreeMap::new();
    for (category, transform) in transforms {
        match transform.apply(matrix) {
            Ok(variant) => variants.entry(category).or_default().push(variant),
            Err(rejection) => debug!(transform = %transform.label(), %rejection, "no variant"),
        }
    }
    variants
}
