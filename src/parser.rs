//! # MusicXML Parser
//!
//! Reads `score-partwise` MusicXML into a [`Score`].
//!
//! ## Pipeline
//! 1. Build a small element tree from `quick-xml` events
//! 2. Find the least common multiple of every `<divisions>` value so all
//!    parts share one tick resolution
//! 3. Walk each part measure by measure, tracking the current position
//!    through `<note>`, `<chord/>`, `<backup>` and `<forward>`
//!
//! ## What Is Read
//! - `<work-title>` / `<movement-title>`, `<creator type="composer">`
//! - `<part-list>` names
//! - `<attributes>`: `<divisions>`, `<key>`, `<time>`
//! - `<sound tempo>` (first one only)
//! - notes: pitch or rest, duration, voice, chord membership, ties
//!
//! Grace notes carry no duration and are skipped. Everything else
//! (dynamics, lyrics, layout, ...) is ignored.
//!
//! ## Errors
//! All failures are [`EtudeError::InputFormat`]: malformed XML, a
//! `score-timewise` or unknown root, a missing `<part-list>`, or a
//! non-numeric value where a number is required.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::EtudeError;
use crate::score::{
    Element, ElementKind, KeySignature, Measure, Metadata, Mode, Part, Pitch, Score, SpelledPitch,
    Step, TimeSignature,
};

/// Parse MusicXML bytes. Compressed `.mxl` archives are not supported.
pub fn parse_musicxml_bytes(bytes: &[u8]) -> Result<Score, EtudeError> {
    if bytes.starts_with(b"PK") {
        return Err(EtudeError::InputFormat(
            "compressed MusicXML (.mxl) is not supported".to_string(),
        ));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| EtudeError::InputFormat(format!("not UTF-8: {}", e)))?;
    parse_musicxml(text)
}

/// Parse a MusicXML document.
///
/// # Example
/// ```rust
/// let xml = r#"<?xml version="1.0"?>
/// <score-partwise version="4.0">
///   <part-list><score-part id="P1"><part-name>Flute</part-name></score-part></part-list>
///   <part id="P1">
///     <measure number="1">
///       <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
///       <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration></note>
///     </measure>
///   </part>
/// </score-partwise>"#;
///
/// let score = etude::parse_musicxml(xml)?;
/// assert_eq!(score.parts[0].name, "Flute");
/// assert_eq!(score.parts[0].measures[0].elements[0].pitches()[0].midi, 60);
/// # Ok::<(), etude::EtudeError>(())
/// ```
pub fn parse_musicxml(xml: &str) -> Result<Score, EtudeError> {
    let root = XmlNode::parse(xml)?;

    match root.name.as_str() {
        "score-partwise" => {}
        "score-timewise" => {
            return Err(EtudeError::InputFormat(
                "score-timewise documents are not supported".to_string(),
            ))
        }
        other => {
            return Err(EtudeError::InputFormat(format!(
                "expected <score-partwise>, found <{}>",
                other
            )))
        }
    }

    let part_names = parse_part_list(
        root.child("part-list")
            .ok_or_else(|| EtudeError::InputFormat("missing <part-list>".to_string()))?,
    );

    let divisions = common_divisions(&root)?;
    let mut metadata = parse_metadata(&root);

    let mut parts = Vec::new();
    for (index, part_node) in root.children_named("part").enumerate() {
        let id = part_node
            .attribute("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("P{}", index + 1));
        let name = part_names
            .get(&id)
            .cloned()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Part {}", index + 1));
        let measures = parse_part(part_node, divisions, &mut metadata)?;
        parts.push(Part { id, name, measures });
    }

    Ok(Score {
        metadata,
        divisions,
        parts,
    })
}

fn parse_metadata(root: &XmlNode) -> Metadata {
    let title = root
        .child("work")
        .and_then(|w| w.child("work-title"))
        .or_else(|| root.child("movement-title"))
        .map(|n| n.text.trim().to_string())
        .filter(|t| !t.is_empty());
    let composer = root
        .child("identification")
        .into_iter()
        .flat_map(|i| i.children_named("creator"))
        .find(|c| c.attribute("type") == Some("composer"))
        .map(|c| c.text.trim().to_string())
        .filter(|c| !c.is_empty());

    Metadata {
        title,
        composer,
        tempo: None,
    }
}

fn parse_part_list(node: &XmlNode) -> HashMap<String, String> {
    node.children_named("score-part")
        .filter_map(|sp| {
            let id = sp.attribute("id")?.to_string();
            let name = sp
                .child("part-name")
                .map(|n| n.text.trim().to_string())
                .unwrap_or_default();
            Some((id, name))
        })
        .collect()
}

/// LCM of every `<divisions>` in the document, 1 when there is none.
fn common_divisions(root: &XmlNode) -> Result<u64, EtudeError> {
    let mut lcm = 1u64;
    for node in root.descendants_named("divisions") {
        let value = parse_number::<u64>(node, "divisions")?;
        if value == 0 {
            return Err(EtudeError::InputFormat("<divisions> must be positive".to_string()));
        }
        lcm = lcm / gcd(lcm, value) * value;
    }
    Ok(lcm)
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Running state while walking one part.
struct PartState {
    target_divisions: u64,
    scale: u64,
    key: Option<KeySignature>,
    time: Option<TimeSignature>,
}

fn parse_part(
    part: &XmlNode,
    target_divisions: u64,
    metadata: &mut Metadata,
) -> Result<Vec<Measure>, EtudeError> {
    let mut state = PartState {
        target_divisions,
        scale: target_divisions,
        key: None,
        time: None,
    };
    let mut measures = Vec::new();
    let mut offset = 0u64;

    for (index, measure_node) in part.children_named("measure").enumerate() {
        let number = measure_node
            .attribute("number")
            .and_then(leading_number)
            .unwrap_or(index as u32 + 1);

        let mut elements: Vec<Element> = Vec::new();
        let mut position = 0u64;
        let mut furthest = 0u64;

        for child in &measure_node.children {
            match child.name.as_str() {
                "attributes" => parse_attributes(child, &mut state)?,
                "note" => {
                    if child.child("grace").is_some() {
                        continue;
                    }
                    let duration = child
                        .child("duration")
                        .map(|d| parse_number::<u64>(d, "duration"))
                        .transpose()?
                        .unwrap_or(0)
                        * state.scale;
                    let is_chord_member = child.child("chord").is_some();
                    let voice = child
                        .child("voice")
                        .and_then(|v| v.text.trim().parse::<u8>().ok())
                        .unwrap_or(1);

                    let pitch = parse_note_pitch(child)?;
                    if is_chord_member {
                        if let (Some(pitch), Some(previous)) = (pitch, elements.last_mut()) {
                            if let ElementKind::Note { pitches } = &mut previous.kind {
                                pitches.push(pitch);
                                continue;
                            }
                        }
                    }

                    let kind = match pitch {
                        Some(pitch) => ElementKind::Note {
                            pitches: vec![pitch],
                        },
                        None => ElementKind::Rest,
                    };
                    elements.push(Element {
                        voice,
                        offset: position,
                        duration,
                        kind,
                    });
                    position += duration;
                }
                "backup" => {
                    let duration = parse_child_number::<u64>(child, "duration")? * state.scale;
                    position = position.saturating_sub(duration);
                }
                "forward" => {
                    position += parse_child_number::<u64>(child, "duration")? * state.scale;
                }
                "direction" | "sound" => {
                    if metadata.tempo.is_none() {
                        metadata.tempo = find_tempo(child);
                    }
                }
                _ => {}
            }
            furthest = furthest.max(position);
        }

        measures.push(Measure {
            number,
            offset,
            duration: furthest,
            key: state.key,
            time: state.time,
            elements,
        });
        offset += furthest;
    }

    Ok(measures)
}

fn parse_attributes(node: &XmlNode, state: &mut PartState) -> Result<(), EtudeError> {
    if let Some(divisions) = node.child("divisions") {
        let divisions = parse_number::<u64>(divisions, "divisions")?;
        state.scale = state.target_divisions / divisions;
    }
    if let Some(key) = node.child("key") {
        if let Some(fifths) = key.child("fifths") {
            let fifths = parse_number::<i8>(fifths, "fifths")?;
            let mode = match key.child("mode").map(|m| m.text.trim()) {
                Some("minor") => Mode::Minor,
                _ => Mode::Major,
            };
            state.key = Some(KeySignature {
                fifths: fifths.clamp(-7, 7),
                mode,
            });
        }
    }
    if let Some(time) = node.child("time") {
        if let (Some(beats), Some(beat_type)) = (time.child("beats"), time.child("beat-type")) {
            // composite meters such as 3+2 count every group
            let beats = beats
                .text
                .split('+')
                .map(|b| b.trim().parse::<u8>())
                .sum::<Result<u8, _>>()
                .map_err(|_| invalid_number("beats", &beats.text))?;
            let beat_type = parse_number::<u8>(beat_type, "beat-type")?;
            state.time = Some(TimeSignature { beats, beat_type });
        }
    }
    Ok(())
}

/// The sounding pitch of a `<note>`, `None` for rests.
fn parse_note_pitch(note: &XmlNode) -> Result<Option<Pitch>, EtudeError> {
    if note.child("rest").is_some() {
        return Ok(None);
    }
    let (pitch, step_name, octave_name) = if let Some(p) = note.child("pitch") {
        (p, "step", "octave")
    } else if let Some(p) = note.child("unpitched") {
        (p, "display-step", "display-octave")
    } else {
        return Ok(None);
    };

    let step_text = pitch.child(step_name).map(|s| s.text.as_str()).unwrap_or("");
    let step = Step::from_letter(step_text).ok_or_else(|| invalid_number(step_name, step_text))?;
    let octave = parse_child_number::<i8>(pitch, octave_name)?;
    let alter = match pitch.child("alter") {
        Some(alter) => alter
            .text
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid_number("alter", &alter.text))?
            .round() as i8,
        None => 0,
    };

    let midi = SpelledPitch { step, alter, octave }
        .midi()
        .ok_or_else(|| EtudeError::InputFormat(format!("pitch {}{} out of MIDI range", step_text, octave)))?;

    let tie_types: Vec<&str> = note
        .children_named("tie")
        .filter_map(|t| t.attribute("type"))
        .collect();
    Ok(Some(Pitch::with_ties(
        midi,
        tie_types.contains(&"stop"),
        tie_types.contains(&"start"),
    )))
}

fn find_tempo(node: &XmlNode) -> Option<f64> {
    std::iter::once(node)
        .chain(node.descendants_named("sound"))
        .filter(|n| n.name == "sound")
        .find_map(|n| n.attribute("tempo"))
        .and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|t| *t > 0.0)
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn parse_number<T: std::str::FromStr>(node: &XmlNode, what: &str) -> Result<T, EtudeError> {
    node.text
        .trim()
        .parse()
        .map_err(|_| invalid_number(what, &node.text))
}

fn parse_child_number<T: std::str::FromStr>(node: &XmlNode, child: &str) -> Result<T, EtudeError> {
    let value = node
        .child(child)
        .ok_or_else(|| EtudeError::InputFormat(format!("<{}> missing <{}>", node.name, child)))?;
    parse_number(value, child)
}

fn invalid_number(what: &str, value: &str) -> EtudeError {
    EtudeError::InputFormat(format!("invalid <{}> value '{}'", what, value.trim()))
}

/// Minimal element tree built from `quick-xml` events.
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    fn parse(xml: &str) -> Result<XmlNode, EtudeError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                EtudeError::InputFormat(format!("XML error at byte {}: {}", reader.buffer_position(), e))
            })?;
            match event {
                Event::Start(start) => stack.push(XmlNode::from_start(&start)?),
                Event::Empty(start) => {
                    let node = XmlNode::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| EtudeError::InputFormat("unbalanced end tag".to_string()))?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|e| EtudeError::InputFormat(e.to_string()))?;
                        top.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(EtudeError::InputFormat("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| EtudeError::InputFormat("empty document".to_string()))
    }

    fn from_start(start: &BytesStart) -> Result<XmlNode, EtudeError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| EtudeError::InputFormat(e.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| EtudeError::InputFormat(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(XmlNode {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<(), EtudeError> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None if root.is_none() => *root = Some(node),
            None => {
                return Err(EtudeError::InputFormat(
                    "multiple root elements".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn descendants_named<'a>(&'a self, name: &'a str) -> Vec<&'a XmlNode> {
        let mut found = Vec::new();
        let mut pending: Vec<&XmlNode> = self.children.iter().rev().collect();
        while let Some(node) = pending.pop() {
            if node.name == name {
                found.push(node);
            }
            pending.extend(node.children.iter().rev());
        }
        found
    }
}
