pub mod config;
pub mod decompose;
pub mod engine;
pub mod error;
pub mod excerpt;
pub mod exercises;
pub mod library;
pub mod matrix;
pub mod musicxml;
pub mod parser;
pub mod render;
pub mod score;
pub mod slice;
pub mod transform;

pub use config::EtudeConfig;
pub use decompose::{ExerciseLine, ExercisePart, ExerciseScore};
pub use engine::{MusicXmlEngine, NotationEngine};
pub use error::*;
pub use excerpt::{measure_at_second, slice, MeasureRange};
pub use exercises::{generate_exercises, Category, Exercise, ExerciseSet};
pub use library::{validate_upload, DirectoryLibrary, MemoryLibrary, ScoreLibrary, ScoreRecord};
pub use matrix::{MusicMatrixRepresentation, NoteEvent};
pub use musicxml::to_musicxml;
pub use parser::{parse_musicxml, parse_musicxml_bytes};
pub use score::*;
pub use slice::{SliceCache, SliceHost};
pub use transform::{Rejection, Transform, Variant};

/// Generate every exercise for a MusicXML excerpt.
/// This is the main entry point for the library.
pub fn generate(bytes: &[u8], range: MeasureRange, config: &EtudeConfig) -> Result<ExerciseSet, EtudeError> {
    let engine = MusicXmlEngine;
    let score = engine.parse(bytes)?;
    let excerpt = engine.slice(&score, range)?;
    generate_exercises(&engine, &excerpt, config)
}
