//! # Exercise Aggregator
//!
//! Runs the decomposition and every transform, renders the accepted results
//! and groups them into an [`ExerciseSet`] by category.
//!
//! ## Categories
//! In this order:
//! - `Score Level` - the whole excerpt
//! - `Part Level` - each part, all voices
//! - `Voice Level: original` - each voice alone
//! - `Voice Level: Dotted` - dotted-rhythm rewrites
//! - `Voice Level: Chordified` - runs merged into chords
//! - `Voice Level: Slowed Down` - time-stretched copies
//!
//! A category with no exercises is left out of the set.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::info;

use crate::config::EtudeConfig;
use crate::decompose::ExerciseScore;
use crate::engine::NotationEngine;
use crate::error::EtudeError;
use crate::score::Score;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    ScoreLevel,
    PartLevel,
    VoiceOriginal,
    VoiceDotted,
    VoiceChordified,
    VoiceSlowedDown,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::ScoreLevel,
        Category::PartLevel,
        Category::VoiceOriginal,
        Category::VoiceDotted,
        Category::VoiceChordified,
        Category::VoiceSlowedDown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::ScoreLevel => "Score Level",
            Category::PartLevel => "Part Level",
            Category::VoiceOriginal => "Voice Level: original",
            Category::VoiceDotted => "Voice Level: Dotted",
            Category::VoiceChordified => "Voice Level: Chordified",
            Category::VoiceSlowedDown => "Voice Level: Slowed Down",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::ScoreLevel => {
                "Full excerpt view with all parts together, unaltered.<br><br>Purpose: To isolate and target practice the selected measure(s)."
            }
            Category::PartLevel => {
                "Complete part view, showing all voices per part.<br><br>Purpose: To isolate and target practice one part at a time."
            }
            Category::VoiceOriginal => {
                "Single voice view, showing all notes in a single voice or melodic line.<br><br>Purpose: To isolate and target practice one voice at a time."
            }
            Category::VoiceDotted => {
                "Dotted exercise.<br><br>Purpose: To even out repeated note values by practicing them in long-short and short-long rhythms."
            }
            Category::VoiceChordified => {
                "Chordified exercise.<br><br>Purpose: To learn hand shapes and fingerings by playing groups of consecutive notes together."
            }
            Category::VoiceSlowedDown => {
                "Slowed Down exercise.<br><br>Purpose: To build accuracy by practicing the line at a fraction of its written speed."
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exercise {
    pub description: String,
    pub musicxml: String,
}

impl Exercise {
    fn new(category: Category, musicxml: String) -> Self {
        Self {
            description: category.description().to_string(),
            musicxml,
        }
    }
}

/// Exercises grouped by category. Serializes as a map from category name to
/// a list of exercises, in category order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExerciseSet {
    entries: BTreeMap<Category, Vec<Exercise>>,
}

impl ExerciseSet {
    pub fn push(&mut self, category: Category, exercise: Exercise) {
        self.entries.entry(category).or_default().push(exercise);
    }

    pub fn get(&self, category: Category) -> &[Exercise] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty categories, in order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries
            .iter()
            .filter(|(_, exercises)| !exercises.is_empty())
            .map(|(category, _)| *category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[Exercise])> {
        self.entries
            .iter()
            .filter(|(_, exercises)| !exercises.is_empty())
            .map(|(category, exercises)| (*category, exercises.as_slice()))
    }

    /// Total number of exercises.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for ExerciseSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.categories().count()))?;
        for (category, exercises) in self.iter() {
            map.serialize_entry(category.name(), exercises)?;
        }
        map.end()
    }
}

/// Build every exercise for a score excerpt.
pub fn generate_exercises(
    engine: &dyn NotationEngine,
    score: &Score,
    config: &EtudeConfig,
) -> Result<ExerciseSet, EtudeError> {
    let tree = ExerciseScore::decompose(score, config)?;
    let mut set = ExerciseSet::default();

    set.push(Category::ScoreLevel, Exercise::new(Category::ScoreLevel, engine.serialize(&tree.score)));

    for part in &tree.parts {
        set.push(Category::PartLevel, Exercise::new(Category::PartLevel, engine.serialize(&part.score)));

        for line in &part.lines {
            set.push(
                Category::VoiceOriginal,
                Exercise::new(Category::VoiceOriginal, engine.serialize(&line.score)),
            );

            for (&category, variants) in &line.variants {
                for variant in variants {
                    let mut rendered = engine.render(&variant.matrix);
                    rendered.metadata = line.score.metadata.clone();
                    if let (Some(target), Some(source)) = (rendered.parts.first_mut(), line.score.parts.first()) {
                        target.name = source.name.clone();
                    }
                    set.push(category, Exercise::new(category, engine.serialize(&rendered)));
                }
            }
        }
    }

    info!(
        parts = tree.parts.len(),
        lines = tree.lines().count(),
        exercises = set.len(),
        "generated exercises"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_order_and_names() {
        let mut sorted = Category::ALL.to_vec();
        sorted.reverse();
        sorted.sort();
        assert_eq!(sorted, Category::ALL.to_vec());
        assert_eq!(Category::VoiceSlowedDown.to_string(), "Voice Level: Slowed Down");
        assert_eq!(Category::from_name("Voice Level: original"), Some(Category::VoiceOriginal));
        assert_eq!(Category::from_name("Voice Level: Original"), None);
    }

    #[test]
    fn test_empty_categories_are_omitted() {
        let mut set = ExerciseSet::default();
        assert!(set.is_empty());
        set.push(Category::PartLevel, Exercise::new(Category::PartLevel, "<b/>".to_string()));
        set.push(Category::ScoreLevel, Exercise::new(Category::ScoreLevel, "<a/>".to_string()));

        let categories: Vec<Category> = set.categories().collect();
        assert_eq!(categories, vec![Category::ScoreLevel, Category::PartLevel]);
        assert!(set.get(Category::VoiceDotted).is_empty());
    }

    #[test]
    fn test_serializes_by_category_name() {
        let mut set = ExerciseSet::default();
        set.push(Category::VoiceDotted, Exercise::new(Category::VoiceDotted, "<x/>".to_string()));

        let json = serde_json::to_value(&set).unwrap();
        let dotted = &json["Voice Level: Dotted"];
        assert_eq!(dotted[0]["musicxml"], "<x/>");
        assert!(dotted[0]["description"].as_str().unwrap().starts_with("Dotted exercise."));
        assert_eq!(json.as_object().unwrap().len(), 1);
    }
}
