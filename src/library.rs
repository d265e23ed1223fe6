//! # Score Library
//!
//! Persistence for uploaded scores and generated exercises, keyed by name.
//! A record holds the raw notation bytes, the title and composer read from
//! them, and an optional slice-hosting hash.
//!
//! ## Backends
//! - [`MemoryLibrary`] - two in-memory maps
//! - [`DirectoryLibrary`] - one directory per record kind; each record is a
//!   `<name>.yaml` metadata file plus the raw bytes stored under `<name>`
//!
//! ```text
//! library/
//!   ├── scores/
//!   │     ├── bach.xml
//!   │     └── bach.xml.yaml
//!   └── exercises/
//! ```
//!
//! Any backend failure is an [`EtudeError::Storage`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EtudeConfig;
use crate::engine::NotationEngine;
use crate::error::EtudeError;
use crate::score::Score;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub composer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_hash: Option<String>,
    /// Raw notation bytes; stored beside the metadata, never inside it.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ScoreRecord {
    pub fn new(name: impl Into<String>, data: Vec<u8>, score: &Score) -> Self {
        Self {
            name: name.into(),
            title: score.metadata.title.clone(),
            composer: score.metadata.composer.clone(),
            slice_hash: None,
            data,
        }
    }

    /// A record with only a name, for hashes recorded before any upload.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Check an upload's file name and parse its bytes, returning the record
/// to store.
pub fn validate_upload(
    engine: &dyn NotationEngine,
    config: &EtudeConfig,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<ScoreRecord, EtudeError> {
    if !config.is_allowed_file(filename) {
        return Err(EtudeError::InputFormat(format!(
            "'{}' is not one of the allowed file types ({})",
            filename,
            config.allowed_extensions.join(", ")
        )));
    }
    let score = engine.parse(&bytes)?;
    Ok(ScoreRecord::new(filename, bytes, &score))
}

pub trait ScoreLibrary {
    fn save_score(&mut self, record: ScoreRecord) -> Result<(), EtudeError>;

    fn get_score(&self, name: &str) -> Result<Option<ScoreRecord>, EtudeError>;

    /// Names of every stored score, sorted.
    fn list_scores(&self) -> Result<Vec<String>, EtudeError>;

    fn save_exercise(&mut self, record: ScoreRecord) -> Result<(), EtudeError>;

    fn get_exercise(&self, name: &str) -> Result<Option<ScoreRecord>, EtudeError>;

    /// Record a slice hash on a score, creating a bare record if needed.
    fn set_score_slice_hash(&mut self, name: &str, hash: &str) -> Result<(), EtudeError> {
        let mut record = self.get_score(name)?.unwrap_or_else(|| ScoreRecord::bare(name));
        record.slice_hash = Some(hash.to_string());
        self.save_score(record)
    }

    /// Record a slice hash on an exercise, creating a bare record if needed.
    fn set_exercise_slice_hash(&mut self, name: &str, hash: &str) -> Result<(), EtudeError> {
        let mut record = self.get_exercise(name)?.unwrap_or_else(|| ScoreRecord::bare(name));
        record.slice_hash = Some(hash.to_string());
        self.save_exercise(record)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    scores: BTreeMap<String, ScoreRecord>,
    exercises: BTreeMap<String, ScoreRecord>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScoreLibrary for MemoryLibrary {
    fn save_score(&mut self, record: ScoreRecord) -> Result<(), EtudeError> {
        self.scores.insert(record.name.clone(), record);
        Ok(())
    }

    fn get_score(&self, name: &str) -> Result<Option<ScoreRecord>, EtudeError> {
        Ok(self.scores.get(name).cloned())
    }

    fn list_scores(&self) -> Result<Vec<String>, EtudeError> {
        Ok(self.scores.keys().cloned().collect())
    }

    fn save_exercise(&mut self, record: ScoreRecord) -> Result<(), EtudeError> {
        self.exercises.insert(record.name.clone(), record);
        Ok(())
    }

    fn get_exercise(&self, name: &str) -> Result<Option<ScoreRecord>, EtudeError> {
        Ok(self.exercises.get(name).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

const SCORES_DIR: &str = "scores";
const EXERCISES_DIR: &str = "exercises";
const METADATA_SUFFIX: &str = ".yaml";

impl DirectoryLibrary {
    /// Open (and create if missing) a library rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EtudeError> {
        let root = root.into();
        for dir in [SCORES_DIR, EXERCISES_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| storage_error(&path, e))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn save(&self, dir: &str, record: &ScoreRecord) -> Result<(), EtudeError> {
        check_name(&record.name)?;
        let base = self.root.join(dir);

        let metadata_path = base.join(format!("{}{}", record.name, METADATA_SUFFIX));
        let yaml = serde_yaml::to_string(record).map_err(|e| EtudeError::Storage(e.to_string()))?;
        fs::write(&metadata_path, yaml).map_err(|e| storage_error(&metadata_path, e))?;

        if !record.data.is_empty() {
            let data_path = base.join(&record.name);
            fs::write(&data_path, &record.data).map_err(|e| storage_error(&data_path, e))?;
        }
        debug!(name = %record.name, dir, bytes = record.data.len(), "saved record");
        Ok(())
    }

    fn load(&self, dir: &str, name: &str) -> Result<Option<ScoreRecord>, EtudeError> {
        check_name(name)?;
        let base = self.root.join(dir);
        let metadata_path = base.join(format!("{}{}", name, METADATA_SUFFIX));
        if !metadata_path.exists() {
            return Ok(None);
        }

        let yaml = fs::read_to_string(&metadata_path).map_err(|e| storage_error(&metadata_path, e))?;
        let mut record: ScoreRecord = serde_yaml::from_str(&yaml)
            .map_err(|e| EtudeError::Storage(format!("{}: {}", metadata_path.display(), e)))?;

        let data_path = base.join(name);
        if data_path.exists() {
            record.data = fs::read(&data_path).map_err(|e| storage_error(&data_path, e))?;
        }
        Ok(Some(record))
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, EtudeError> {
        let base = self.root.join(dir);
        let entries = fs::read_dir(&base).map_err(|e| storage_error(&base, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| storage_error(&base, e))?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(METADATA_SUFFIX)) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl ScoreLibrary for DirectoryLibrary {
    fn save_score(&mut self, record: ScoreRecord) -> Result<(), EtudeError> {
        self.save(SCORES_DIR, &record)
    }

    fn get_score(&self, name: &str) -> Result<Option<ScoreRecord>, EtudeError> {
        self.load(SCORES_DIR, name)
    }

    fn list_scores(&self) -> Result<Vec<String>, EtudeError> {
        self.list(SCORES_DIR)
    }

    fn save_exercise(&mut self, record: ScoreRecord) -> Result<(), EtudeError> {
        self.save(EXERCISES_DIR, &record)
    }

    fn get_exercise(&self, name: &str) -> Result<Option<ScoreRecord>, EtudeError> {
        self.load(EXERCISES_DIR, name)
    }
}

/// Names become file names: no separators, no leading dot.
fn check_name(name: &str) -> Result<(), EtudeError> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(EtudeError::Storage(format!("invalid record name '{}'", name)));
    }
    Ok(())
}

fn storage_error(path: &Path, err: std::io::Error) -> EtudeError {
    EtudeError::Storage(format!("{}: {}", path.display(), err))
}
