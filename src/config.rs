//! # Configuration
//!
//! Tunables for exercise generation, loaded from YAML. Every key is optional;
//! missing keys fall back to [`EtudeConfig::default`].
//!
//! ```yaml
//! dotted-patterns: [[1.5, 0.5], [0.5, 1.5]]
//! slowdown-factors: [2, 4]
//! max-chord-span: 12
//! max-chord-pitches: 5
//! max-matrix-width: 16384
//! default-bpm: 120
//! allowed-extensions: [xml, musicxml]
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::EtudeError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EtudeConfig {
    /// Cyclic duration multipliers, one dotted exercise per pattern.
    pub dotted_patterns: Vec<Vec<f64>>,
    /// Integer time-stretch factors, one slowed-down exercise per factor.
    pub slowdown_factors: Vec<usize>,
    /// Widest playable chord, in semitones.
    pub max_chord_span: u8,
    /// Most distinct pitches in one chord.
    pub max_chord_pitches: usize,
    /// Cap on the number of time steps in any matrix.
    pub max_matrix_width: usize,
    /// Tempo assumed when a score has no tempo marking.
    pub default_bpm: f64,
    pub allowed_extensions: Vec<String>,
}

impl Default for EtudeConfig {
    fn default() -> Self {
        Self {
            dotted_patterns: vec![vec![1.5, 0.5], vec![0.5, 1.5]],
            slowdown_factors: vec![2, 4],
            max_chord_span: 12,
            max_chord_pitches: 5,
            max_matrix_width: 16384,
            default_bpm: 120.0,
            allowed_extensions: vec!["xml".into(), "musicxml".into()],
        }
    }
}

impl EtudeConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, EtudeError> {
        // An empty document deserializes to unit, not to a struct.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EtudeConfig =
            serde_yaml::from_str(content).map_err(|e| EtudeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, EtudeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    fn validate(&self) -> Result<(), EtudeError> {
        if let Some(pattern) = self.dotted_patterns.iter().find(|p| p.is_empty()) {
            return Err(EtudeError::Config(format!(
                "dotted pattern must not be empty: {:?}",
                pattern
            )));
        }
        if self.dotted_patterns.iter().flatten().any(|m| !m.is_finite()) {
            return Err(EtudeError::Config(
                "dotted pattern multipliers must be finite".to_string(),
            ));
        }
        if self.slowdown_factors.contains(&0) {
            return Err(EtudeError::Config(
                "slowdown factors must be at least 1".to_string(),
            ));
        }
        if self.max_matrix_width == 0 {
            return Err(EtudeError::Config(
                "max-matrix-width must be positive".to_string(),
            ));
        }
        if !(self.default_bpm.is_finite() && self.default_bpm > 0.0) {
            return Err(EtudeError::Config(format!(
                "default-bpm must be positive, got {}",
                self.default_bpm
            )));
        }
        Ok(())
    }

    /// True when the file name carries one of the allowed extensions.
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}
