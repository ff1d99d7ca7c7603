//! # MusicXML Reader
//!
//! Reads a partwise MusicXML 4.0 document into one [`Part`] per requested
//! part name.
//!
//! ## Timing
//! Note lengths in MusicXML are counted in *divisions* per quarter note,
//! defined exactly once in each part's first measure.
//!
//! Tempo belongs to the whole score. Exporters usually write
//! `<sound tempo="..."/>` into the top part only, so every part's tempo
//! directions are gathered into one [`TempoMap`] keyed by measure and beat.
//! A note takes the tempo in force where it starts: the configured default
//! until the first direction, then the latest direction at or before it.
//!
//! A note lasting `d` divisions therefore lasts
//! `d / divisions * 60000 / tempo` milliseconds.
//!
//! `<forward>` in the sung voice is an invisible rest; `<backup>` only
//! moves the beat position used for tempo lookups.
//!
//! ## Ties
//! A pitched note without a lyric continues the previous pitched note: its
//! pitch and duration are appended to that event instead of starting a
//! new one. A continuation at the start of a part or right after a rest is
//! a format error.
//!
//! ## Example
//! ```rust
//! use vocalise::config::ScoreConfig;
//! use vocalise::musicxml::parse_parts;
//!
//! let xml = r#"<score-partwise version="4.0">
//!   <part-list><score-part id="P1"><part-name>Voice</part-name></score-part></part-list>
//!   <part id="P1"><measure number="1">
//!     <attributes><divisions>1</divisions></attributes>
//!     <note><pitch><step>A</step><octave>4</octave></pitch><duration>1</duration>
//!       <lyric><syllabic>single</syllabic><text>la</text></lyric></note>
//!   </measure></part>
//! </score-partwise>"#;
//!
//! let config = ScoreConfig { default_tempo: 120.0, clef_octave_change: false };
//! let parts = parse_parts(xml, &["Voice".to_string()], &config).unwrap();
//! assert_eq!(parts[0].events.len(), 1);
//! assert_eq!(parts[0].events[0].total_duration_ms(), 500.0);
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use log::{debug, info};
use roxmltree::{Document, Node};

use crate::config::ScoreConfig;
use crate::error::{Result, VocaliseError};
use crate::score::{step_degree, Event, Part, PitchEvent, SubNote, Syllable, SyllablePosition};

/// The only MusicXML version accepted
pub const SUPPORTED_VERSION: &str = "4.0";

/// Parse the requested parts of a MusicXML document.
///
/// Parts are returned in document order. Every requested name must match
/// a `<part-name>` exactly (case-sensitive), otherwise
/// [`VocaliseError::PartNotFound`] lists the names that failed.
pub fn parse_parts(xml: &str, part_names: &[String], config: &ScoreConfig) -> Result<Vec<Part>> {
    let doc = Document::parse(xml)
        .map_err(|e| VocaliseError::Format(format!("couldn't parse XML: {}", e)))?;
    let root = doc.root_element();

    if root.tag_name().name() != "score-partwise" {
        return Err(VocaliseError::Format(format!(
            "expected root element to be score-partwise, found {}",
            root.tag_name().name()
        )));
    }
    match root.attribute("version") {
        Some(SUPPORTED_VERSION) => {}
        Some(other) => {
            return Err(VocaliseError::Format(format!(
                "expected version to be {}, found {}",
                SUPPORTED_VERSION, other
            )))
        }
        None => {
            return Err(VocaliseError::Format(format!(
                "expected version to be {}, found none",
                SUPPORTED_VERSION
            )))
        }
    }

    let part_list = child(root, "part-list")
        .ok_or_else(|| VocaliseError::Format("couldn't find part-list".to_string()))?;
    let ids = resolve_part_ids(part_list, part_names)?;
    info!("Resolved parts: {:?}", ids.values().collect::<Vec<_>>());
    let tempo_map = TempoMap::build(root, config.default_tempo)?;
    if tempo_map.is_empty() {
        debug!("No tempo directions, every part at {} bpm", config.default_tempo);
    }

    let mut parts = Vec::new();
    for part_node in root.children().filter(|n| n.has_tag_name("part")) {
        let Some(id) = part_node.attribute("id") else {
            return Err(VocaliseError::Format("part without id".to_string()));
        };
        let Some(name) = ids.get(id) else {
            continue;
        };
        let part = PartReader::new(id, config, &tempo_map).read(part_node, name)?;
        info!("Parsed part '{}' ({} events)", part.name, part.events.len());
        parts.push(part);
    }

    // A part-list entry with no matching <part> body is as good as missing.
    let found: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
    let missing: Vec<String> = part_names
        .iter()
        .filter(|n| !found.contains(&n.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(VocaliseError::PartNotFound { missing });
    }

    Ok(parts)
}

/// Map part ids to their names, for every requested name in the part list.
/// A requested name carried by two part-list entries is a format error.
fn resolve_part_ids(part_list: Node, part_names: &[String]) -> Result<HashMap<String, String>> {
    let mut ids = HashMap::new();
    for score_part in part_list.children().filter(|n| n.has_tag_name("score-part")) {
        let Some(name) = child(score_part, "part-name").and_then(|n| n.text()) else {
            continue;
        };
        if !part_names.iter().any(|requested| requested == name) {
            continue;
        }
        let id = score_part
            .attribute("id")
            .ok_or_else(|| VocaliseError::Format(format!("score-part '{}' has no id", name)))?;
        if let Some((other, _)) = ids.iter().find(|(_, existing)| *existing == name) {
            return Err(VocaliseError::Format(format!(
                "part name '{}' is ambiguous: used by parts {} and {}",
                name, other, id
            )));
        }
        ids.insert(id.to_string(), name.to_string());
    }

    let missing: Vec<String> = part_names
        .iter()
        .filter(|requested| !ids.values().any(|name| name == *requested))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(VocaliseError::PartNotFound { missing });
    }
    Ok(ids)
}

const BEAT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoChange {
    measure: usize,
    /// Quarter notes from the start of the measure
    beat: f64,
    bpm: f64,
}

/// Every tempo direction in the score, from all parts
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    default_bpm: f64,
    changes: Vec<TempoChange>,
}

impl TempoMap {
    /// Collect the `<sound tempo>` directions of every part in `root`.
    ///
    /// Positions are tracked per part through notes, `<backup>` and
    /// `<forward>`, so parts with different divisions share one timeline.
    /// Only tempo values are validated here; the parts that are sung get
    /// their full checks when they are read.
    pub fn build(root: Node, default_bpm: f64) -> Result<Self> {
        let mut changes = Vec::new();
        for part in root.children().filter(|n| n.has_tag_name("part")) {
            let mut divisions: Option<f64> = None;
            for (index, measure) in part
                .children()
                .filter(|n| n.has_tag_name("measure"))
                .enumerate()
            {
                let number = measure.attribute("number").unwrap_or("?");
                let mut offset = 0.0f64;
                for node in measure.children().filter(Node::is_element) {
                    match node.tag_name().name() {
                        "attributes" => {
                            if let Some(d) = child_text(node, "divisions")
                                .and_then(|t| t.parse::<f64>().ok())
                                .filter(|d| *d > 0.0)
                            {
                                divisions = Some(d);
                            }
                        }
                        "note" if child(node, "chord").is_none() => {
                            offset += duration_of(node).unwrap_or(0.0);
                        }
                        "forward" => offset += duration_of(node).unwrap_or(0.0),
                        "backup" => offset = (offset - duration_of(node).unwrap_or(0.0)).max(0.0),
                        "direction" => {
                            let at = offset + child_text(node, "offset")
                                .and_then(|t| t.parse::<f64>().ok())
                                .unwrap_or(0.0);
                            for sound in node.descendants().filter(|n| n.has_tag_name("sound")) {
                                if let Some(bpm) = read_tempo(sound, number)? {
                                    push_change(&mut changes, index, at, divisions, bpm);
                                }
                            }
                        }
                        "sound" => {
                            if let Some(bpm) = read_tempo(node, number)? {
                                push_change(&mut changes, index, offset, divisions, bpm);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        // Stable, so directions at the same beat keep document order
        changes.sort_by(|a, b| {
            a.measure.cmp(&b.measure).then(a.beat.total_cmp(&b.beat))
        });
        Ok(Self {
            default_bpm,
            changes,
        })
    }

    /// Tempo in force at `beat` quarter notes into measure `measure`.
    pub fn tempo_at(&self, measure: usize, beat: f64) -> f64 {
        self.changes
            .iter()
            .rev()
            .find(|c| c.measure < measure || (c.measure == measure && c.beat <= beat + BEAT_EPSILON))
            .map_or(self.default_bpm, |c| c.bpm)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn push_change(
    changes: &mut Vec<TempoChange>,
    measure: usize,
    offset: f64,
    divisions: Option<f64>,
    bpm: f64,
) {
    let beat = match divisions {
        Some(d) => offset / d,
        None if offset == 0.0 => 0.0,
        None => {
            debug!("Tempo {} bpm in measure {} has no divisions to place it", bpm, measure + 1);
            return;
        }
    };
    debug!("Tempo {} bpm at measure {} beat {}", bpm, measure + 1, beat);
    changes.push(TempoChange {
        measure,
        beat: beat.max(0.0),
        bpm,
    });
}

fn read_tempo(sound: Node, measure: &str) -> Result<Option<f64>> {
    let Some(text) = sound.attribute("tempo") else {
        return Ok(None);
    };
    let bpm: f64 = parse_number(text, "tempo", measure)?;
    if !(bpm > 0.0 && bpm.is_finite()) {
        return Err(VocaliseError::Format(format!(
            "tempo must be positive (measure {})",
            measure
        )));
    }
    Ok(Some(bpm))
}

/// Lenient `<duration>` read for notes that are not sung
fn duration_of(node: Node) -> Option<f64> {
    child_text(node, "duration").and_then(|t| t.parse().ok())
}

/// Running state while walking one part's measures
struct PartReader<'c> {
    id: String,
    config: &'c ScoreConfig,
    tempo_map: &'c TempoMap,
    divisions: Option<f64>,
    measure_index: usize,
    /// Divisions from the start of the current measure
    offset: f64,
    octave_change: i32,
    /// First `<voice>` seen; notes in other voices are skipped
    voice: Option<String>,
    events: Vec<Event>,
}

impl<'c> PartReader<'c> {
    fn new(id: &str, config: &'c ScoreConfig, tempo_map: &'c TempoMap) -> Self {
        Self {
            id: id.to_string(),
            config,
            tempo_map,
            divisions: None,
            measure_index: 0,
            offset: 0.0,
            octave_change: 0,
            voice: None,
            events: Vec::new(),
        }
    }

    fn read(mut self, part_node: Node, name: &str) -> Result<Part> {
        for (index, measure) in part_node
            .children()
            .filter(|n| n.has_tag_name("measure"))
            .enumerate()
        {
            self.measure_index = index;
            self.offset = 0.0;
            self.read_measure(measure)?;
        }
        Ok(Part {
            id: self.id,
            name: name.to_string(),
            events: self.events,
        })
    }

    fn read_measure(&mut self, measure: Node) -> Result<()> {
        let number = measure.attribute("number").unwrap_or("?").to_string();

        let defines_divisions = measure
            .children()
            .filter(|n| n.has_tag_name("attributes"))
            .any(|a| child(a, "divisions").is_some());
        if self.divisions.is_none() && !defines_divisions {
            return Err(VocaliseError::Format(format!(
                "missing divisions for part {} (measure {})",
                self.id, number
            )));
        }

        for node in measure.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "attributes" => self.read_attributes(node, &number)?,
                "note" => self.read_note(node, &number)?,
                "forward" => self.read_forward(node, &number)?,
                "backup" => {
                    self.offset = (self.offset - duration_of(node).unwrap_or(0.0)).max(0.0)
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn read_attributes(&mut self, attributes: Node, measure: &str) -> Result<()> {
        if let Some(text) = child_text(attributes, "divisions") {
            if self.divisions.is_some() {
                return Err(VocaliseError::Format(format!(
                    "divisions redefined for part {} (measure {})",
                    self.id, measure
                )));
            }
            let divisions: f64 = parse_number(text, "divisions", measure)?;
            if divisions <= 0.0 {
                return Err(VocaliseError::Format(format!(
                    "divisions must be positive (measure {})",
                    measure
                )));
            }
            self.divisions = Some(divisions);
        }

        if let Some(clef) = child(attributes, "clef") {
            self.octave_change = match child_text(clef, "clef-octave-change") {
                Some(text) if self.config.clef_octave_change => {
                    parse_number(text, "clef-octave-change", measure)?
                }
                _ => 0,
            };
        }
        Ok(())
    }

    /// Whether `node` belongs to the sung voice. The first voice seen wins.
    fn in_sung_voice(&mut self, node: Node) -> bool {
        let Some(voice) = child_text(node, "voice") else {
            return true;
        };
        match &self.voice {
            None => {
                self.voice = Some(voice.to_string());
                true
            }
            Some(first) => first == voice,
        }
    }

    /// Length of `node` in milliseconds at the tempo where it starts,
    /// advancing the beat position past it.
    fn take_duration(&mut self, node: Node, measure: &str) -> Result<f64> {
        let divisions = self.divisions.ok_or_else(|| {
            VocaliseError::Format(format!("missing divisions for part {}", self.id))
        })?;
        let what = node.tag_name().name();
        let length: f64 = match child_text(node, "duration") {
            Some(text) => parse_number(text, "duration", measure)?,
            None => {
                return Err(VocaliseError::Format(format!(
                    "{} without duration (measure {})",
                    what, measure
                )))
            }
        };
        if !(length > 0.0 && length.is_finite()) {
            return Err(VocaliseError::Format(format!(
                "{} duration must be positive, found {} (measure {})",
                what, length, measure
            )));
        }

        let tempo = self
            .tempo_map
            .tempo_at(self.measure_index, self.offset / divisions);
        self.offset += length;
        Ok(length / divisions * 60000.0 / tempo)
    }

    fn read_forward(&mut self, forward: Node, measure: &str) -> Result<()> {
        if !self.in_sung_voice(forward) {
            self.offset += duration_of(forward).unwrap_or(0.0);
            return Ok(());
        }
        let duration_ms = self.take_duration(forward, measure)?;
        self.events.push(Event::Rest { duration_ms });
        Ok(())
    }

    fn read_note(&mut self, note: Node, measure: &str) -> Result<()> {
        let chord = child(note, "chord").is_some();
        if !self.in_sung_voice(note) {
            debug!("Skipping note in another voice (measure {})", measure);
            if !chord {
                self.offset += duration_of(note).unwrap_or(0.0);
            }
            return Ok(());
        }

        if chord {
            return Err(VocaliseError::Format(format!(
                "chords are not supported in a sung part (measure {})",
                measure
            )));
        }

        let duration_ms = self.take_duration(note, measure)?;

        if child(note, "rest").is_some() {
            self.events.push(Event::Rest { duration_ms });
            return Ok(());
        }

        let Some(pitch) = child(note, "pitch") else {
            return Err(VocaliseError::Format(format!(
                "note has neither pitch nor rest (measure {})",
                measure
            )));
        };
        let sub_note = self.read_pitch(pitch, duration_ms, measure)?;

        match read_lyric(note)? {
            Some(syllable) => {
                self.events
                    .push(Event::Pitch(PitchEvent::new(sub_note, Some(syllable))));
            }
            None => match self.events.last_mut() {
                Some(Event::Pitch(previous)) => previous.notes.push(sub_note),
                Some(Event::Rest { .. }) => {
                    return Err(VocaliseError::Format(format!(
                        "note without lyric follows a rest, so it can't continue a tie (measure {})",
                        measure
                    )))
                }
                None => {
                    return Err(VocaliseError::Format(format!(
                        "part {} starts with a note without lyric (measure {})",
                        self.id, measure
                    )))
                }
            },
        }
        Ok(())
    }

    fn read_pitch(&self, pitch: Node, duration_ms: f64, measure: &str) -> Result<SubNote> {
        let step = child_text(pitch, "step")
            .ok_or_else(|| VocaliseError::Format(format!("pitch without step (measure {})", measure)))?;
        let degree = step
            .chars()
            .next()
            .filter(|_| step.len() == 1)
            .and_then(step_degree)
            .ok_or_else(|| {
                VocaliseError::Format(format!("invalid step '{}' (measure {})", step, measure))
            })?;
        let alter: i32 = match child_text(pitch, "alter") {
            Some(text) => parse_number(text, "alter", measure)?,
            None => 0,
        };
        let octave: i32 = match child_text(pitch, "octave") {
            Some(text) => parse_number(text, "octave", measure)?,
            None => {
                return Err(VocaliseError::Format(format!(
                    "pitch without octave (measure {})",
                    measure
                )))
            }
        };

        Ok(SubNote {
            degree: (degree + alter).rem_euclid(12) as u8,
            octave: octave + self.octave_change,
            duration_ms,
        })
    }
}

/// Read the first lyric of a note, if it has one.
fn read_lyric(note: Node) -> Result<Option<Syllable>> {
    let Some(lyric) = child(note, "lyric") else {
        return Ok(None);
    };
    let position = match child_text(lyric, "syllabic") {
        Some(s) => SyllablePosition::from_syllabic(s)
            .ok_or_else(|| VocaliseError::Format(format!("unknown syllabic value '{}'", s)))?,
        None => SyllablePosition::Single,
    };
    let text = child(lyric, "text")
        .and_then(|t| t.text())
        .unwrap_or_default()
        .to_string();
    Ok(Some(Syllable { text, position }))
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(|n| n.text()).map(str::trim)
}

fn parse_number<T: FromStr>(text: &str, what: &str, measure: &str) -> Result<T> {
    text.trim().parse().map_err(|_| {
        VocaliseError::Format(format!(
            "invalid {} '{}' (measure {})",
            what, text, measure
        ))
    })
}
