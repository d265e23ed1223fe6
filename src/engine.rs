//! # Notation Engine
//!
//! The seam between the matrix core and a notation format. The core only
//! ever calls these four operations; [`MusicXmlEngine`] is the implementation
//! the crate ships.

use crate::error::EtudeError;
use crate::excerpt::{self, MeasureRange};
use crate::matrix::MusicMatrixRepresentation;
use crate::musicxml::to_musicxml;
use crate::parser::parse_musicxml_bytes;
use crate::render;
use crate::score::Score;

pub trait NotationEngine {
    /// Parse notation file bytes into a score.
    fn parse(&self, bytes: &[u8]) -> Result<Score, EtudeError>;

    /// Cut a score down to a measure range.
    fn slice(&self, score: &Score, range: MeasureRange) -> Result<Score, EtudeError>;

    /// Lay a matrix out as notation: measures, rests, ties, spelling.
    fn render(&self, matrix: &MusicMatrixRepresentation) -> Score;

    /// Write a score in the engine's exchange format.
    fn serialize(&self, score: &Score) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MusicXmlEngine;

impl NotationEngine for MusicXmlEngine {
    fn parse(&self, bytes: &[u8]) -> Result<Score, EtudeError> {
        parse_musicxml_bytes(bytes)
    }

    fn slice(&self, score: &Score, range: MeasureRange) -> Result<Score, EtudeError> {
        excerpt::slice(score, range)
    }

    fn render(&self, matrix: &MusicMatrixRepresentation) -> Score {
        render::render(matrix)
    }

    fn serialize(&self, score: &Score) -> String {
        to_musicxml(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::matrix;

    #[test]
    fn test_rendered_matrix_round_trips_through_musicxml() {
        let engine = MusicXmlEngine;
        let source = matrix(8, &[(60, 0, 1), (62, 1, 1), (64, 2, 2), (67, 4, 4)]);

        let xml = engine.serialize(&engine.render(&source));
        let score = engine.parse(xml.as_bytes()).unwrap();

        let part = &score.parts[0];
        assert_eq!(part.measures.len(), 1);
        let midis: Vec<u8> = part.measures[0]
            .elements
            .iter()
            .filter(|e| e.is_note())
            .map(|e| e.pitches()[0].midi)
            .collect();
        assert_eq!(midis, vec![60, 62, 64, 67]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            MusicXmlEngine.parse(b"not xml at all <"),
            Err(EtudeError::InputFormat(_))
        ));
    }
}
