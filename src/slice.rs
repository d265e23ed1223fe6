//! # Slice Hosting
//!
//! An interactive-rendering host turns MusicXML into an opaque hash. Hashes
//! are recorded on the score or exercise in the library, and [`SliceCache`]
//! only calls the host for a name it has never seen.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::EtudeError;
use crate::library::ScoreLibrary;

pub trait SliceHost {
    /// Upload notation and return the hash identifying the hosted slice.
    fn create_slice(
        &self,
        name: &str,
        musicxml: &str,
        title: Option<&str>,
        composer: Option<&str>,
    ) -> Result<String, EtudeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RecordKind {
    Score,
    Exercise,
}

pub struct SliceCache<L: ScoreLibrary, H: SliceHost> {
    library: L,
    host: H,
    hashes: HashMap<(RecordKind, String), String>,
}

impl<L: ScoreLibrary, H: SliceHost> SliceCache<L, H> {
    pub fn new(library: L, host: H) -> Self {
        Self {
            library,
            host,
            hashes: HashMap::new(),
        }
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    /// Hash for a stored score. Uses `musicxml` when given, otherwise the
    /// score's stored bytes.
    pub fn score_slice(&mut self, name: &str, musicxml: Option<&str>) -> Result<String, EtudeError> {
        let key = (RecordKind::Score, name.to_string());
        if let Some(hash) = self.hashes.get(&key) {
            return Ok(hash.clone());
        }

        let record = self.library.get_score(name)?;
        if let Some(hash) = record.as_ref().and_then(|r| r.slice_hash.clone()) {
            debug!(name, "slice hash found in library");
            self.hashes.insert(key, hash.clone());
            return Ok(hash);
        }

        let stored;
        let notation = match musicxml {
            Some(xml) => xml,
            None => {
                let data = record
                    .as_ref()
                    .map(|r| r.data.as_slice())
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| EtudeError::Storage(format!("score '{}' has no stored notation", name)))?;
                stored = String::from_utf8_lossy(data).into_owned();
                stored.as_str()
            }
        };

        let (title, composer) = record
            .as_ref()
            .map(|r| (r.title.as_deref(), r.composer.as_deref()))
            .unwrap_or((None, None));
        let hash = self.create(name, notation, title, composer)?;
        self.library.set_score_slice_hash(name, &hash)?;
        self.hashes.insert(key, hash.clone());
        Ok(hash)
    }

    /// Hash for a generated exercise.
    pub fn exercise_slice(&mut self, name: &str, musicxml: &str) -> Result<String, EtudeError> {
        let key = (RecordKind::Exercise, name.to_string());
        if let Some(hash) = self.hashes.get(&key) {
            return Ok(hash.clone());
        }
        if let Some(hash) = self.library.get_exercise(name)?.and_then(|r| r.slice_hash) {
            self.hashes.insert(key, hash.clone());
            return Ok(hash);
        }

        let hash = self.create(name, musicxml, None, None)?;
        self.library.set_exercise_slice_hash(name, &hash)?;
        self.hashes.insert(key, hash.clone());
        Ok(hash)
    }

    fn create(
        &self,
        name: &str,
        musicxml: &str,
        title: Option<&str>,
        composer: Option<&str>,
    ) -> Result<String, EtudeError> {
        let hash = self
            .host
            .create_slice(name, musicxml, title, composer)
            .map_err(|e| match e {
                EtudeError::ServiceUnavailable(_) => e,
                other => EtudeError::ServiceUnavailable(other.to_string()),
            })?;
        info!(name, %hash, "created slice");
        Ok(hash)
    }
}
