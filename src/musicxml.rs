//! # MusicXML Writer
//!
//! Serializes a [`Score`] as `score-partwise` MusicXML 4.0.
//!
//! ## Output Layout
//! - `<work>` / `<identification>` when the metadata has a title or composer
//! - one `<score-part>` per part
//! - `<attributes>` on the first measure and whenever key or time changes
//! - voices written one after another, joined by `<backup>`
//! - gaps inside a voice become `<forward>`
//!
//! Pitches are spelled from MIDI numbers in the measure's key. An
//! `<accidental>` is printed when the spelled alteration differs from what
//! the key signature (or an earlier accidental in the same measure) implies.
//!
//! Durations that are not a plain, dotted or double-dotted power-of-two
//! value are written without `<type>`.

use std::collections::HashMap;

use crate::score::{Element, ElementKind, KeySignature, Measure, Mode, Part, Pitch, Score, Step, TimeSignature};

const NOTE_TYPES: [(&str, u64, u64); 9] = [
    // name, length in quarters as num/den
    ("breve", 8, 1),
    ("whole", 4, 1),
    ("half", 2, 1),
    ("quarter", 1, 1),
    ("eighth", 1, 2),
    ("16th", 1, 4),
    ("32nd", 1, 8),
    ("64th", 1, 16),
    ("128th", 1, 32),
];

/// Note type name and dot count for a duration, if it has one.
pub(crate) fn note_type(duration: u64, divisions: u64) -> Option<(&'static str, u8)> {
    if duration == 0 {
        return None;
    }
    NOTE_TYPES.iter().find_map(|&(name, num, den)| {
        // duration / divisions == num / den * (1, 3/2, 7/4)
        let lhs = duration * den * 4;
        let base = divisions * num;
        if lhs == base * 4 {
            Some((name, 0))
        } else if lhs == base * 6 {
            Some((name, 1))
        } else if lhs == base * 7 {
            Some((name, 2))
        } else {
            None
        }
    })
}

/// Convert a Score to MusicXML format
pub fn to_musicxml(score: &Score) -> String {
    let mut xml = String::new();

    // XML declaration and doctype
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(r#"<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">"#);
    xml.push('\n');

    xml.push_str(r#"<score-partwise version="4.0">"#);
    xml.push('\n');

    if let Some(title) = &score.metadata.title {
        xml.push_str("  <work>\n");
        xml.push_str(&format!("    <work-title>{}</work-title>\n", escape_xml(title)));
        xml.push_str("  </work>\n");
    }

    if let Some(composer) = &score.metadata.composer {
        xml.push_str("  <identification>\n");
        xml.push_str(&format!(
            "    <creator type=\"composer\">{}</creator>\n",
            escape_xml(composer)
        ));
        xml.push_str("  </identification>\n");
    }

    xml.push_str("  <part-list>\n");
    for part in &score.parts {
        xml.push_str(&format!("    <score-part id=\"{}\">\n", escape_xml(&part.id)));
        xml.push_str(&format!("      <part-name>{}</part-name>\n", escape_xml(&part.name)));
        xml.push_str("    </score-part>\n");
    }
    xml.push_str("  </part-list>\n");

    for (index, part) in score.parts.iter().enumerate() {
        let tempo = if index == 0 { score.metadata.tempo } else { None };
        xml.push_str(&part_to_xml(part, score.divisions, tempo));
    }

    xml.push_str("</score-partwise>\n");
    xml
}

fn part_to_xml(part: &Part, divisions: u64, tempo: Option<f64>) -> String {
    let mut xml = String::new();
    xml.push_str(&format!("  <part id=\"{}\">\n", escape_xml(&part.id)));

    let clef = clef_for(part);
    let mut previous: Option<&Measure> = None;
    for measure in &part.measures {
        let first = previous.is_none();
        let key_changed = previous.map_or(true, |p| p.key != measure.key);
        let time_changed = previous.map_or(true, |p| p.time != measure.time);

        xml.push_str(&format!("    <measure number=\"{}\">\n", measure.number));
        if first || key_changed || time_changed {
            xml.push_str(&attributes_to_xml(
                first.then_some(divisions),
                (first || key_changed).then_some(measure.key).flatten(),
                (first || time_changed).then_some(measure.time).flatten(),
                first.then_some(clef),
            ));
        }
        if first {
            if let Some(bpm) = tempo {
                xml.push_str(&tempo_to_xml(bpm));
            }
        }
        xml.push_str(&measure_body_to_xml(measure, divisions));
        xml.push_str("    </measure>\n");
        previous = Some(measure);
    }

    xml.push_str("  </part>\n");
    xml
}

/// Treble clef unless the average pitch is below A3.
fn clef_for(part: &Part) -> (&'static str, u8) {
    let pitches: Vec<u64> = part
        .measures
        .iter()
        .flat_map(|m| m.elements.iter())
        .flat_map(|e| e.pitches().iter().map(|p| p.midi as u64))
        .collect();
    if pitches.is_empty() {
        return ("G", 2);
    }
    let mean = pitches.iter().sum::<u64>() / pitches.len() as u64;
    if mean < 57 {
        ("F", 4)
    } else {
        ("G", 2)
    }
}

fn attributes_to_xml(
    divisions: Option<u64>,
    key: Option<KeySignature>,
    time: Option<TimeSignature>,
    clef: Option<(&str, u8)>,
) -> String {
    let mut xml = String::new();
    xml.push_str("      <attributes>\n");
    if let Some(divisions) = divisions {
        xml.push_str(&format!("        <divisions>{}</divisions>\n", divisions));
    }
    if let Some(key) = key {
        xml.push_str("        <key>\n");
        xml.push_str(&format!("          <fifths>{}</fifths>\n", key.fifths));
        xml.push_str(&format!(
            "          <mode>{}</mode>\n",
            match key.mode {
                Mode::Major => "major",
                Mode::Minor => "minor",
            }
        ));
        xml.push_str("        </key>\n");
    }
    if let Some(time) = time {
        xml.push_str("        <time>\n");
        xml.push_str(&format!("          <beats>{}</beats>\n", time.beats));
        xml.push_str(&format!("          <beat-type>{}</beat-type>\n", time.beat_type));
        xml.push_str("        </time>\n");
    }
    if let Some((sign, line)) = clef {
        xml.push_str("        <clef>\n");
        xml.push_str(&format!("          <sign>{}</sign>\n", sign));
        xml.push_str(&format!("          <line>{}</line>\n", line));
        xml.push_str("        </clef>\n");
    }
    xml.push_str("      </attributes>\n");
    xml
}

fn tempo_to_xml(bpm: f64) -> String {
    let mut xml = String::new();
    xml.push_str("      <direction placement=\"above\">\n");
    xml.push_str("        <direction-type>\n");
    xml.push_str("          <metronome>\n");
    xml.push_str("            <beat-unit>quarter</beat-unit>\n");
    xml.push_str(&format!("            <per-minute>{}</per-minute>\n", bpm));
    xml.push_str("          </metronome>\n");
    xml.push_str("        </direction-type>\n");
    xml.push_str(&format!("        <sound tempo=\"{}\"/>\n", bpm));
    xml.push_str("      </direction>\n");
    xml
}

fn measure_body_to_xml(measure: &Measure, divisions: u64) -> String {
    let mut xml = String::new();

    let mut voices: Vec<u8> = measure.elements.iter().map(|e| e.voice).collect();
    voices.sort_unstable();
    voices.dedup();

    let key = measure.key.unwrap_or_default();
    let beat = measure
        .time
        .unwrap_or_default()
        .beat_type
        .max(1) as u64;
    let beat_ticks = (divisions * 4 / beat).max(1);
    let mut shown_alters: HashMap<(Step, i8), i8> = HashMap::new();
    let mut position = 0u64;

    for voice in voices {
        let mut elements: Vec<&Element> = measure.elements.iter().filter(|e| e.voice == voice).collect();
        elements.sort_by_key(|e| e.offset);

        if position > 0 {
            xml.push_str(&format!(
                "      <backup>\n        <duration>{}</duration>\n      </backup>\n",
                position
            ));
            position = 0;
        }

        let beams = calculate_beam_states(&elements, divisions, beat_ticks);
        for (element, beam) in elements.iter().zip(beams) {
            if element.offset > position {
                xml.push_str(&format!(
                    "      <forward>\n        <duration>{}</duration>\n      </forward>\n",
                    element.offset - position
                ));
                position = element.offset;
            }
            let full_measure = element.offset == 0 && element.duration == measure.duration;
            xml.push_str(&element_to_xml(
                element,
                divisions,
                &key,
                &mut shown_alters,
                beam,
                full_measure,
            ));
            position = position.max(element.offset + element.duration);
        }
    }
    xml
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BeamState {
    None,
    Begin,
    Continue,
    End,
}

fn is_beamable(element: &Element, divisions: u64) -> bool {
    element.is_note()
        && matches!(
            note_type(element.duration, divisions),
            Some(("eighth" | "16th" | "32nd" | "64th" | "128th", _))
        )
}

/// Calculate beam states for one voice of a measure: consecutive beamable
/// notes that sit inside the same beat are joined.
fn calculate_beam_states(elements: &[&Element], divisions: u64, beat_ticks: u64) -> Vec<BeamState> {
    let mut states = vec![BeamState::None; elements.len()];
    let mut i = 0;

    while i < elements.len() {
        if !is_beamable(elements[i], divisions) {
            i += 1;
            continue;
        }

        let beat = elements[i].offset / beat_ticks;
        let beat_end = (beat + 1) * beat_ticks;
        let start = i;
        let mut position = elements[i].offset;

        while i < elements.len() {
            let element = elements[i];
            let contiguous = element.offset == position;
            let end = element.offset + element.duration;
            if !is_beamable(element, divisions) || !contiguous || end > beat_end {
                break;
            }
            position = end;
            i += 1;
        }
        if i == start {
            // note crosses the beat boundary on its own
            i += 1;
            continue;
        }
        let end = i;

        // Only beam if we have 2 or more consecutive beamable notes
        if end - start >= 2 {
            states[start] = BeamState::Begin;
            for state in &mut states[start + 1..end - 1] {
                *state = BeamState::Continue;
            }
            states[end - 1] = BeamState::End;
        }
    }

    states
}

fn element_to_xml(
    element: &Element,
    divisions: u64,
    key: &KeySignature,
    shown_alters: &mut HashMap<(Step, i8), i8>,
    beam: BeamState,
    full_measure: bool,
) -> String {
    match &element.kind {
        ElementKind::Rest => rest_to_xml(element, divisions, full_measure),
        ElementKind::Note { pitches } => pitches
            .iter()
            .enumerate()
            .map(|(i, pitch)| {
                note_to_xml(
                    element,
                    pitch,
                    i > 0,
                    divisions,
                    key,
                    shown_alters,
                    if i == 0 { beam } else { BeamState::None },
                )
            })
            .collect(),
    }
}

fn note_to_xml(
    element: &Element,
    pitch: &Pitch,
    chord: bool,
    divisions: u64,
    key: &KeySignature,
    shown_alters: &mut HashMap<(Step, i8), i8>,
    beam: BeamState,
) -> String {
    let mut xml = String::new();
    let spelled = key.spell(pitch.midi);

    xml.push_str("      <note>\n");
    if chord {
        xml.push_str("        <chord/>\n");
    }

    xml.push_str("        <pitch>\n");
    xml.push_str(&format!("          <step>{}</step>\n", spelled.step.as_str()));
    if spelled.alter != 0 {
        xml.push_str(&format!("          <alter>{}</alter>\n", spelled.alter));
    }
    xml.push_str(&format!("          <octave>{}</octave>\n", spelled.octave));
    xml.push_str("        </pitch>\n");

    xml.push_str(&format!("        <duration>{}</duration>\n", element.duration));

    let tie_stop = pitch.is_tied_from_previous();
    let tie_start = pitch.is_tied_to_next();
    if tie_stop {
        xml.push_str("        <tie type=\"stop\"/>\n");
    }
    if tie_start {
        xml.push_str("        <tie type=\"start\"/>\n");
    }

    xml.push_str(&format!("        <voice>{}</voice>\n", element.voice));
    xml.push_str(&type_to_xml(element.duration, divisions));

    let slot = (spelled.step, spelled.octave);
    let expected = shown_alters
        .get(&slot)
        .copied()
        .unwrap_or_else(|| key.alter_for_step(spelled.step));
    if spelled.alter != expected {
        let name = match spelled.alter {
            -2 => "flat-flat",
            -1 => "flat",
            1 => "sharp",
            2 => "double-sharp",
            _ => "natural",
        };
        xml.push_str(&format!("        <accidental>{}</accidental>\n", name));
        shown_alters.insert(slot, spelled.alter);
    }

    let beam_text = match beam {
        BeamState::None => None,
        BeamState::Begin => Some("begin"),
        BeamState::Continue => Some("continue"),
        BeamState::End => Some("end"),
    };
    if let Some(text) = beam_text {
        xml.push_str(&format!("        <beam number=\"1\">{}</beam>\n", text));
    }

    if tie_stop || tie_start {
        xml.push_str("        <notations>\n");
        if tie_stop {
            xml.push_str("          <tied type=\"stop\"/>\n");
        }
        if tie_start {
            xml.push_str("          <tied type=\"start\"/>\n");
        }
        xml.push_str("        </notations>\n");
    }

    xml.push_str("      </note>\n");
    xml
}

fn rest_to_xml(element: &Element, divisions: u64, full_measure: bool) -> String {
    let mut xml = String::new();

    xml.push_str("      <note>\n");
    if full_measure {
        xml.push_str("        <rest measure=\"yes\"/>\n");
    } else {
        xml.push_str("        <rest/>\n");
    }
    xml.push_str(&format!("        <duration>{}</duration>\n", element.duration));
    xml.push_str(&format!("        <voice>{}</voice>\n", element.voice));
    if !full_measure {
        xml.push_str(&type_to_xml(element.duration, divisions));
    }
    xml.push_str("      </note>\n");
    xml
}

fn type_to_xml(duration: u64, divisions: u64) -> String {
    match note_type(duration, divisions) {
        Some((name, dots)) => {
            let mut xml = format!("        <type>{}</type>\n", name);
            for _ in 0..dots {
                xml.push_str("        <dot/>\n");
            }
            xml
        }
        None => String::new(),
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_musicxml;
    use crate::score::Metadata;

    fn note(voice: u8, offset: u64, duration: u64, midi: u8) -> Element {
        Element {
            voice,
            offset,
            duration,
            kind: ElementKind::Note {
                pitches: vec![Pitch::new(midi)],
            },
        }
    }

    fn one_measure(key: KeySignature, elements: Vec<Element>) -> Score {
        Score {
            metadata: Metadata {
                title: Some("Scales & Arpeggios".to_string()),
                composer: Some("Me".to_string()),
                tempo: None,
            },
            divisions: 2,
            parts: vec![Part {
                id: "P1".to_string(),
                name: "Violin".to_string(),
                measures: vec![Measure {
                    number: 1,
                    offset: 0,
                    duration: 8,
                    key: Some(key),
                    time: Some(TimeSignature::default()),
                    elements,
                }],
            }],
        }
    }

    #[test]
    fn test_note_types() {
        assert_eq!(note_type(2, 2), Some(("quarter", 0)));
        assert_eq!(note_type(3, 2), Some(("quarter", 1)));
        assert_eq!(note_type(1, 2), Some(("eighth", 0)));
        assert_eq!(note_type(8, 2), Some(("whole", 0)));
        assert_eq!(note_type(7, 4), Some(("quarter", 2)));
        assert_eq!(note_type(5, 4), None);
        assert_eq!(note_type(0, 4), None);
    }

    #[test]
    fn test_basic_musicxml_output() {
        let score = one_measure(KeySignature::default(), vec![note(1, 0, 8, 60)]);
        let xml = to_musicxml(&score);
        assert!(xml.contains("<score-partwise"));
        assert!(xml.contains("<work-title>Scales &amp; Arpeggios</work-title>"));
        assert!(xml.contains("<creator type=\"composer\">Me</creator>"));
        assert!(xml.contains("<part-name>Violin</part-name>"));
        assert!(xml.contains("<step>C</step>"));
        assert!(xml.contains("<type>whole</type>"));
        assert!(xml.contains("<divisions>2</divisions>"));
    }

    #[test]
    fn test_accidentals_follow_key() {
        let g_major = KeySignature { fifths: 1, mode: Mode::Major };
        // F# is in the key, F natural needs a sign, the second F natural does not
        let score = one_measure(
            g_major,
            vec![note(1, 0, 2, 66), note(1, 2, 2, 65), note(1, 4, 2, 65), note(1, 6, 2, 67)],
        );
        let xml = to_musicxml(&score);
        assert_eq!(xml.matches("<accidental>natural</accidental>").count(), 1);
        assert!(!xml.contains("<accidental>sharp</accidental>"));
    }

    #[test]
    fn test_beams_within_beat() {
        let eighths = (0..8).map(|i| note(1, i, 1, 60 + i as u8)).collect();
        let score = one_measure(KeySignature::default(), eighths);
        let xml = to_musicxml(&score);
        assert_eq!(xml.matches(">begin</beam>").count(), 4);
        assert_eq!(xml.matches(">end</beam>").count(), 4);
    }

    #[test]
    fn test_voices_use_backup_and_forward() {
        let score = one_measure(
            KeySignature::default(),
            vec![note(1, 0, 8, 72), note(2, 4, 4, 48)],
        );
        let xml = to_musicxml(&score);
        assert!(xml.contains("<backup>\n        <duration>8</duration>"));
        assert!(xml.contains("<forward>\n        <duration>4</duration>"));
    }

    #[test]
    fn test_ties_are_written() {
        let mut first = note(1, 0, 4, 60);
        let mut second = note(1, 4, 4, 60);
        first.kind = ElementKind::Note {
            pitches: vec![Pitch::with_ties(60, false, true)],
        };
        second.kind = ElementKind::Note {
            pitches: vec![Pitch::with_ties(60, true, false)],
        };
        let xml = to_musicxml(&one_measure(KeySignature::default(), vec![first, second]));
        assert!(xml.contains("<tie type=\"start\"/>"));
        assert!(xml.contains("<tied type=\"stop\"/>"));
    }

    #[test]
    fn test_output_parses_back() {
        let chord = Element {
            voice: 1,
            offset: 0,
            duration: 4,
            kind: ElementKind::Note {
                pitches: vec![Pitch::new(60), Pitch::new(64), Pitch::new(67)],
            },
        };
        let rest = Element {
            voice: 1,
            offset: 4,
            duration: 4,
            kind: ElementKind::Rest,
        };
        let mut score = one_measure(KeySignature { fifths: -3, mode: Mode::Minor }, vec![chord, rest]);
        score.metadata.tempo = Some(72.0);

        let parsed = parse_musicxml(&to_musicxml(&score)).unwrap();
        assert_eq!(parsed.metadata, score.metadata);
        assert_eq!(parsed.divisions, 2);
        assert_eq!(parsed.parts[0].measures, score.parts[0].measures);
    }
}
