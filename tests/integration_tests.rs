//! Integration tests for etude
//!
//! Tests the full pipeline from MusicXML text to generated exercises.

use etude::{
    generate, measure_at_second, parse_musicxml, Category, EtudeConfig, EtudeError, ExerciseScore,
    MeasureRange,
};

const SCALE: [(&str, u8); 8] = [
    ("C", 4),
    ("D", 4),
    ("E", 4),
    ("F", 4),
    ("G", 4),
    ("A", 4),
    ("B", 4),
    ("C", 5),
];

fn eighth(step: &str, octave: u8, voice: u8) -> String {
    format!(
        "<note><pitch><step>{}</step><octave>{}</octave></pitch><duration>1</duration><voice>{}</voice><type>eighth</type></note>",
        step, octave, voice
    )
}

/// One part, two voices of running eighths, `measures` bars of 4/4.
fn two_voice_eighths(measures: u32, time: Option<(u8, u8)>) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <work><work-title>Two Voice Study</work-title></work>
  <part-list><score-part id="P1"><part-name>Piano</part-name></score-part></part-list>
  <part id="P1">
"#,
    );
    for number in 1..=measures {
        xml.push_str(&format!("<measure number=\"{}\">", number));
        if number == 1 {
            xml.push_str("<attributes><divisions>2</divisions><key><fifths>0</fifths></key>");
            if let Some((beats, beat_type)) = time {
                xml.push_str(&format!(
                    "<time><beats>{}</beats><beat-type>{}</beat-type></time>",
                    beats, beat_type
                ));
            }
            xml.push_str("</attributes>");
        }
        for (step, octave) in SCALE {
            xml.push_str(&eighth(step, octave, 1));
        }
        xml.push_str("<backup><duration>8</duration></backup>");
        for (step, octave) in SCALE {
            xml.push_str(&eighth(step, octave - 1, 2));
        }
        xml.push_str("</measure>\n");
    }
    xml.push_str("  </part>\n</score-partwise>\n");
    xml
}

#[test]
fn test_two_voice_excerpt_end_to_end() {
    let xml = two_voice_eighths(4, Some((4, 4)));
    let set = generate(xml.as_bytes(), MeasureRange::default(), &EtudeConfig::default()).unwrap();

    assert_eq!(set.get(Category::ScoreLevel).len(), 1);
    assert_eq!(set.get(Category::PartLevel).len(), 1);
    assert_eq!(set.get(Category::VoiceOriginal).len(), 2);
    // two patterns per voice
    assert_eq!(set.get(Category::VoiceDotted).len(), 4);
    // levels 8 and 16 merge notes; 2 and 4 hold one onset per window and change nothing
    assert_eq!(set.get(Category::VoiceChordified).len(), 4);
    assert_eq!(set.get(Category::VoiceSlowedDown).len(), 4);

    let categories: Vec<Category> = set.categories().collect();
    assert_eq!(categories, Category::ALL.to_vec());

    for (_, exercises) in set.iter() {
        for exercise in exercises {
            let score = parse_musicxml(&exercise.musicxml).unwrap();
            assert_eq!(score.metadata.title.as_deref(), Some("Two Voice Study"));
            assert!(!exercise.description.is_empty());
        }
    }
}

#[test]
fn test_line_matrices() {
    let score = parse_musicxml(&two_voice_eighths(4, Some((4, 4)))).unwrap();
    let tree = ExerciseScore::decompose(&score, &EtudeConfig::default()).unwrap();

    let lines: Vec<_> = tree.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        // eighths in 4/4: ceil(1 / 0.5) * 4 steps per quarter
        assert_eq!(line.matrix.quantization, 8);
        assert_eq!(line.matrix.width(), 128);

        let flat = line.matrix.flatten();
        assert!(flat.is_homophonic());
        let runs = flat.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!((runs[0].start, runs[0].end, runs[0].count), (0, 128, 32));
    }
}

#[test]
fn test_dotted_exercise_rhythm() {
    let score = parse_musicxml(&two_voice_eighths(1, Some((4, 4)))).unwrap();
    let tree = ExerciseScore::decompose(&score, &EtudeConfig::default()).unwrap();
    let line = tree.lines().next().unwrap();

    let long_short = &line.variants[&Category::VoiceDotted][0];
    let durations: Vec<u32> = long_short
        .matrix
        .flatten()
        .durations
        .iter()
        .copied()
        .filter(|d| *d != 0)
        .collect();
    assert_eq!(durations, vec![6, 2, 6, 2, 6, 2, 6, 2]);
    assert!(!long_short.has_partial_runs());
}

#[test]
fn test_excerpt_range() {
    let xml = two_voice_eighths(4, Some((4, 4)));
    let set = generate(xml.as_bytes(), MeasureRange::new(Some(2), Some(3)), &EtudeConfig::default()).unwrap();
    let part = parse_musicxml(&set.get(Category::PartLevel)[0].musicxml).unwrap();
    let numbers: Vec<u32> = part.parts[0].measures.iter().map(|m| m.number).collect();
    assert_eq!(numbers, vec![2, 3]);
}

#[test]
fn test_invalid_measure_ranges() {
    let xml = two_voice_eighths(4, Some((4, 4)));
    let config = EtudeConfig::default();
    for range in [
        MeasureRange::new(Some(3), Some(2)),
        MeasureRange::new(Some(0), None),
        MeasureRange::new(None, Some(5)),
        MeasureRange::new(Some(5), None),
    ] {
        assert!(
            matches!(
                generate(xml.as_bytes(), range, &config),
                Err(EtudeError::InvalidMeasureRange(_))
            ),
            "{:?} should be rejected",
            range
        );
    }
}

#[test]
fn test_missing_time_signature_keeps_only_unaltered_views() {
    let xml = two_voice_eighths(2, None);
    let set = generate(xml.as_bytes(), MeasureRange::default(), &EtudeConfig::default()).unwrap();
    let categories: Vec<Category> = set.categories().collect();
    assert_eq!(categories, vec![Category::ScoreLevel, Category::PartLevel]);
}

#[test]
fn test_config_controls_variants() {
    let config = EtudeConfig::from_yaml_str(
        "dotted-patterns: [[1.5, 0.5]]\nslowdown-factors: [3]\nmax-chord-pitches: 3\n",
    )
    .unwrap();
    let xml = two_voice_eighths(1, Some((4, 4)));
    let set = generate(xml.as_bytes(), MeasureRange::default(), &config).unwrap();

    assert_eq!(set.get(Category::VoiceDotted).len(), 2);
    assert_eq!(set.get(Category::VoiceSlowedDown).len(), 2);
    // level 16 groups four pitches and is now rejected
    assert_eq!(set.get(Category::VoiceChordified).len(), 2);
}

#[test]
fn test_too_wide_line_keeps_the_rest_of_the_excerpt() {
    let xml = r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Flute</part-name></score-part>
    <score-part id="P2"><part-name>Cello</part-name></score-part>
  </part-list>
  <part id="P1"><measure number="1">
    <attributes><divisions>2</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
    <note><pitch><step>C</step><octave>5</octave></pitch><duration>1</duration></note>
    <note><pitch><step>D</step><octave>5</octave></pitch><duration>1</duration></note>
    <note><pitch><step>E</step><octave>5</octave></pitch><duration>1</duration></note>
    <note><pitch><step>F</step><octave>5</octave></pitch><duration>1</duration></note>
    <note><pitch><step>G</step><octave>5</octave></pitch><duration>4</duration></note>
  </measure></part>
  <part id="P2"><measure number="1">
    <attributes><divisions>2</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
    <note><pitch><step>C</step><octave>3</octave></pitch><duration>8</duration></note>
  </measure></part>
</score-partwise>"#;
    // the flute line needs 32 steps, the cello line 16
    let config = EtudeConfig::from_yaml_str("max-matrix-width: 20\n").unwrap();
    let set = generate(xml.as_bytes(), MeasureRange::default(), &config).unwrap();

    assert_eq!(set.get(Category::ScoreLevel).len(), 1);
    assert_eq!(set.get(Category::PartLevel).len(), 2);
    assert_eq!(set.get(Category::VoiceOriginal).len(), 1);
}

#[test]
fn test_malformed_input() {
    let result = generate(b"<score-partwise><part-list>", MeasureRange::default(), &EtudeConfig::default());
    assert!(matches!(result, Err(EtudeError::InputFormat(_))));
}

#[test]
fn test_measure_lookup() {
    let mut score = parse_musicxml(&two_voice_eighths(4, Some((4, 4)))).unwrap();
    assert_eq!(measure_at_second(&score, 5.0, 120.0), 3);
    score.metadata.tempo = Some(240.0);
    assert_eq!(measure_at_second(&score, 5.0, 120.0), 6);
}

#[test]
fn test_json_output_uses_category_names() {
    let xml = two_voice_eighths(1, Some((4, 4)));
    let set = generate(xml.as_bytes(), MeasureRange::default(), &EtudeConfig::default()).unwrap();
    let json = serde_json::to_value(&set).unwrap();
    let object = json.as_object().unwrap();
    assert!(object.contains_key("Score Level"));
    assert!(object.contains_key("Voice Level: original"));
    assert!(object.contains_key("Voice Level: Slowed Down"));
}
