//! Decoding of the instance and submission documents into the typed model.
//!
//! Parsing is all-or-nothing: either a fully cross-referenced [`Instance`] /
//! [`Submission`] comes back, or a [`ParseError`] naming the document and the
//! first problem found.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::error::Category;

use crate::model::{
    ChannelId, Instance, Interval, Minute, Parameters, Placement, PreferenceWindow, PriorityBlock,
    Program, Submission,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    Instance,
    Submission,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Instance => f.write_str("instance"),
            Document::Submission => f.write_str("submission"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{document} document is not valid JSON: {source}")]
    MalformedDocument {
        document: Document,
        #[source]
        source: serde_json::Error,
    },
    #[error("{document} document violates the schema: {detail}")]
    SchemaViolation { document: Document, detail: String },
    #[error("{document} document references unknown {detail}")]
    UnknownReference { document: Document, detail: String },
}

impl ParseError {
    pub fn document(&self) -> Document {
        match self {
            ParseError::MalformedDocument { document, .. }
            | ParseError::SchemaViolation { document, .. }
            | ParseError::UnknownReference { document, .. } => *document,
        }
    }

    fn schema(document: Document, detail: impl Into<String>) -> Self {
        ParseError::SchemaViolation {
            document,
            detail: detail.into(),
        }
    }
}

fn decode<T: DeserializeOwned>(document: Document, text: &str) -> Result<T, ParseError> {
    serde_json::from_str(text).map_err(|e| match e.classify() {
        Category::Data => ParseError::schema(document, e.to_string()),
        Category::Io | Category::Syntax | Category::Eof => ParseError::MalformedDocument {
            document,
            source: e,
        },
    })
}

// ---------------------------------------------------------------------------
// Raw document shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawInstance {
    opening_time: Option<Minute>,
    closing_time: Option<Minute>,
    max_consecutive_genre: Option<usize>,
    min_duration: Option<Minute>,
    channels: Vec<RawChannel>,
    #[serde(default)]
    priority_blocks: Vec<RawPriorityBlock>,
    #[serde(default)]
    time_preferences: Vec<RawTimePreference>,
    #[serde(default)]
    parameters: RawParameters,
    switch_penalty: Option<i64>,
    termination_penalty: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    #[serde(alias = "id")]
    channel_id: ChannelId,
    #[serde(default)]
    programs: Vec<RawProgram>,
}

#[derive(Debug, Deserialize)]
struct RawProgram {
    #[serde(alias = "id")]
    program_id: String,
    start: Minute,
    end: Option<Minute>,
    duration: Option<Minute>,
    genre: Option<String>,
    score: Option<i64>,
    optimal_window: Option<RawWindow>,
    bonus: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawWindow {
    start: Minute,
    end: Minute,
}

#[derive(Debug, Deserialize)]
struct RawPriorityBlock {
    start: Minute,
    end: Minute,
    channel: Option<ChannelId>,
    #[serde(default)]
    allowed_channels: Vec<ChannelId>,
}

#[derive(Debug, Deserialize)]
struct RawTimePreference {
    start: Minute,
    end: Minute,
    preferred_genre: String,
    bonus: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParameters {
    #[serde(rename = "D")]
    d: Option<i64>,
    #[serde(rename = "R")]
    r: Option<i64>,
    #[serde(rename = "S")]
    s: Option<i64>,
    #[serde(rename = "T")]
    t: Option<i64>,
    #[serde(rename = "O")]
    o: Option<Minute>,
    #[serde(rename = "E")]
    e: Option<Minute>,
}

#[derive(Debug, Deserialize)]
struct RawSubmission {
    #[serde(alias = "schedule")]
    scheduled_programs: Vec<RawPlacement>,
    num_programs: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawPlacement {
    program_id: String,
    channel_id: ChannelId,
    start: Minute,
}

/// Bonus unit used when a window declares no explicit magnitude.
const DEFAULT_BONUS_UNIT: i64 = 1;

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// Parse and cross-check an instance document.
pub fn parse_instance(text: &str) -> Result<Instance, ParseError> {
    const DOC: Document = Document::Instance;
    let raw: RawInstance = decode(DOC, text)?;

    if let (Some(open), Some(close)) = (raw.opening_time, raw.closing_time) {
        if open >= close {
            return Err(ParseError::schema(
                DOC,
                format!("opening_time {} must precede closing_time {}", open, close),
            ));
        }
    }

    if let Some(min) = raw.min_duration {
        if min <= 0 {
            return Err(ParseError::schema(
                DOC,
                format!("min_duration must be positive, got {}", min),
            ));
        }
    }

    let parameters = build_parameters(&raw)?;

    let mut preferences: Vec<(String, PreferenceWindow)> = Vec::new();
    for pref in &raw.time_preferences {
        if pref.preferred_genre.is_empty() {
            return Err(ParseError::schema(DOC, "time preference has an empty preferred_genre"));
        }
        let window = checked_window(pref.start, pref.end, "time preference")?;
        preferences.push((
            pref.preferred_genre.clone(),
            PreferenceWindow {
                window,
                unit: non_negative(pref.bonus.unwrap_or(DEFAULT_BONUS_UNIT), "time preference bonus")?,
            },
        ));
    }

    let mut channels: BTreeSet<ChannelId> = BTreeSet::new();
    let mut programs: BTreeMap<String, Program> = BTreeMap::new();

    for ch in raw.channels {
        if !channels.insert(ch.channel_id) {
            return Err(ParseError::schema(
                DOC,
                format!("duplicate channel_id {}", ch.channel_id),
            ));
        }

        for p in ch.programs {
            let program = build_program(ch.channel_id, p, &preferences, &parameters)?;
            if programs.contains_key(&program.id) {
                return Err(ParseError::schema(
                    DOC,
                    format!("duplicate program_id '{}'", program.id),
                ));
            }
            programs.insert(program.id.clone(), program);
        }
    }

    let mut priority_blocks = Vec::with_capacity(raw.priority_blocks.len());
    for block in raw.priority_blocks {
        let window = checked_window(block.start, block.end, "priority block")?;
        let mut allowed: Vec<ChannelId> = Vec::new();
        for c in block.channel.into_iter().chain(block.allowed_channels) {
            if !channels.contains(&c) {
                return Err(ParseError::UnknownReference {
                    document: DOC,
                    detail: format!("channel {} in priority block {}", c, window),
                });
            }
            if !allowed.contains(&c) {
                allowed.push(c);
            }
        }
        if allowed.is_empty() {
            return Err(ParseError::schema(
                DOC,
                format!("priority block {} names no channel", window),
            ));
        }
        priority_blocks.push(PriorityBlock {
            window,
            allowed_channels: allowed,
        });
    }

    debug!(
        "parsed instance: {} channels, {} programs, {} priority blocks",
        channels.len(),
        programs.len(),
        priority_blocks.len()
    );

    Ok(Instance {
        channels,
        programs,
        priority_blocks,
        parameters,
        opening_time: raw.opening_time,
        closing_time: raw.closing_time,
        max_consecutive_genre: raw.max_consecutive_genre,
        min_duration: raw.min_duration,
    })
}

fn build_parameters(raw: &RawInstance) -> Result<Parameters, ParseError> {
    let defaults = Parameters::default();
    let p = &raw.parameters;
    Ok(Parameters {
        default_value: non_negative(p.d.unwrap_or(defaults.default_value), "parameter D")?,
        bonus_multiplier: non_negative(p.r.unwrap_or(defaults.bonus_multiplier), "parameter R")?,
        switch_penalty: non_negative(
            p.s.or(raw.switch_penalty).unwrap_or(defaults.switch_penalty),
            "parameter S",
        )?,
        early_late_penalty: non_negative(
            p.t.or(raw.termination_penalty).unwrap_or(defaults.early_late_penalty),
            "parameter T",
        )?,
        early_threshold: non_negative(p.o.unwrap_or(defaults.early_threshold), "parameter O")?,
        late_threshold: non_negative(p.e.unwrap_or(defaults.late_threshold), "parameter E")?,
    })
}

fn build_program(
    channel: ChannelId,
    raw: RawProgram,
    genre_preferences: &[(String, PreferenceWindow)],
    parameters: &Parameters,
) -> Result<Program, ParseError> {
    const DOC: Document = Document::Instance;

    let duration = match (raw.end, raw.duration) {
        (_, Some(d)) => d,
        (Some(end), None) => end.checked_sub(raw.start).unwrap_or(0),
        (None, None) => {
            return Err(ParseError::schema(
                DOC,
                format!("program '{}' declares neither end nor duration", raw.program_id),
            ))
        }
    };
    if duration <= 0 || raw.start.checked_add(duration).is_none() {
        return Err(ParseError::schema(
            DOC,
            format!("program '{}' must have a positive duration", raw.program_id),
        ));
    }
    if let (Some(end), Some(d)) = (raw.end, raw.duration) {
        if raw.start.checked_add(d) != Some(end) {
            return Err(ParseError::schema(
                DOC,
                format!(
                    "program '{}' end {} disagrees with start {} + duration {}",
                    raw.program_id, end, raw.start, d
                ),
            ));
        }
    }

    let mut preferences = Vec::new();
    match (raw.optimal_window, raw.bonus) {
        (Some(w), bonus) => preferences.push(PreferenceWindow {
            window: checked_window(w.start, w.end, "optimal window")?,
            unit: non_negative(bonus.unwrap_or(DEFAULT_BONUS_UNIT), "program bonus")?,
        }),
        (None, Some(_)) => {
            return Err(ParseError::schema(
                DOC,
                format!("program '{}' declares a bonus without an optimal_window", raw.program_id),
            ))
        }
        (None, None) => {}
    }
    if let Some(genre) = raw.genre.as_deref() {
        preferences.extend(
            genre_preferences
                .iter()
                .filter(|(g, _)| g == genre)
                .map(|(_, w)| w.clone()),
        );
    }

    Ok(Program {
        id: raw.program_id,
        channel,
        genre: raw.genre.filter(|g| !g.is_empty()),
        duration,
        base_value: raw.score.unwrap_or(parameters.default_value),
        canonical_start: raw.start,
        preferences,
    })
}

fn checked_window(start: Minute, end: Minute, what: &str) -> Result<Interval, ParseError> {
    let window = Interval::new(start, end);
    if window.is_empty() {
        return Err(ParseError::schema(
            Document::Instance,
            format!("{} [{}, {}) is empty", what, start, end),
        ));
    }
    Ok(window)
}

fn non_negative(value: i64, what: &str) -> Result<i64, ParseError> {
    if value < 0 {
        return Err(ParseError::schema(
            Document::Instance,
            format!("{} must be non-negative, got {}", what, value),
        ));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Parse a submission document. References to programs and channels are
/// resolved later by the timeline builder, where dangling ones become
/// violations instead of fatal errors.
pub fn parse_submission(text: &str) -> Result<Submission, ParseError> {
    const DOC: Document = Document::Submission;
    let raw: RawSubmission = decode(DOC, text)?;

    if let Some(declared) = raw.num_programs {
        if declared != raw.scheduled_programs.len() {
            return Err(ParseError::schema(
                DOC,
                format!(
                    "num_programs is {} but {} programs are scheduled",
                    declared,
                    raw.scheduled_programs.len()
                ),
            ));
        }
    }

    let placements: Vec<Placement> = raw
        .scheduled_programs
        .into_iter()
        .map(|p| Placement {
            program_id: p.program_id,
            channel_id: p.channel_id,
            start: p.start,
        })
        .collect();

    debug!("parsed submission: {} placements", placements.len());
    Ok(Submission { placements })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE: &str = r#"{
        "opening_time": 480,
        "closing_time": 1440,
        "channels": [
            { "channel_id": 0, "programs": [
                { "program_id": "n1", "start": 540, "end": 600, "genre": "news", "score": 100 },
                { "program_id": "s1", "start": 600, "duration": 120, "genre": "sports",
                  "optimal_window": { "start": 600, "end": 660 }, "bonus": 15 }
            ] },
            { "id": 1, "programs": [
                { "program_id": "m1", "start": 840, "end": 900, "genre": "music" }
            ] }
        ],
        "priority_blocks": [ { "start": 600, "end": 720, "channel": 0 } ],
        "time_preferences": [
            { "start": 540, "end": 600, "preferred_genre": "news", "bonus": 30 }
        ],
        "parameters": { "D": 7, "R": 2, "S": 5 },
        "termination_penalty": 10
    }"#;

    #[test]
    fn test_parse_instance_builds_model() {
        let ins = parse_instance(INSTANCE).unwrap();
        assert_eq!(ins.channels.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(ins.programs.len(), 3);

        let n1 = ins.program("n1").unwrap();
        assert_eq!(n1.duration, 60);
        assert_eq!(n1.base_value, 100);
        assert_eq!(n1.preferences.len(), 1);
        assert_eq!(n1.preferences[0].unit, 30);

        let s1 = ins.program("s1").unwrap();
        assert_eq!(s1.duration, 120);
        assert_eq!(s1.base_value, 7, "missing score falls back to D");
        assert_eq!(s1.preferences[0].window, Interval::new(600, 660));

        let m1 = ins.program("m1").unwrap();
        assert_eq!(m1.channel, 1);
        assert!(m1.preferences.is_empty());

        assert_eq!(ins.parameters.bonus_multiplier, 2);
        assert_eq!(ins.parameters.switch_penalty, 5);
        assert_eq!(ins.parameters.early_late_penalty, 10);
        assert_eq!(ins.priority_blocks[0].allowed_channels, vec![0]);
    }

    #[test]
    fn test_malformed_instance() {
        let err = parse_instance("{ not json").unwrap_err();
        assert!(matches!(err, ParseError::MalformedDocument { .. }));
        assert_eq!(err.document(), Document::Instance);
    }

    #[test]
    fn test_missing_channels_is_schema_violation() {
        let err = parse_instance(r#"{ "priority_blocks": [] }"#).unwrap_err();
        assert!(matches!(err, ParseError::SchemaViolation { .. }));
    }

    #[test]
    fn test_duplicate_program_id() {
        let text = r#"{ "channels": [
            { "channel_id": 0, "programs": [ { "program_id": "a", "start": 0, "end": 10 } ] },
            { "channel_id": 1, "programs": [ { "program_id": "a", "start": 0, "end": 10 } ] }
        ] }"#;
        let err = parse_instance(text).unwrap_err();
        assert!(err.to_string().contains("duplicate program_id 'a'"));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let text = r#"{ "channels": [
            { "channel_id": 0, "programs": [ { "program_id": "a", "start": 10, "end": 10 } ] }
        ] }"#;
        assert!(matches!(
            parse_instance(text).unwrap_err(),
            ParseError::SchemaViolation { .. }
        ));
    }

    #[test]
    fn test_priority_block_unknown_channel() {
        let text = r#"{ "channels": [ { "channel_id": 0, "programs": [] } ],
            "priority_blocks": [ { "start": 0, "end": 60, "allowed_channels": [3] } ] }"#;
        assert!(matches!(
            parse_instance(text).unwrap_err(),
            ParseError::UnknownReference { .. }
        ));
    }

    #[test]
    fn test_negative_penalty_rejected() {
        let text = r#"{ "channels": [], "parameters": { "S": -1 } }"#;
        assert!(parse_instance(text).is_err());
    }

    fn schema_detail(text: &str) -> String {
        match parse_instance(text) {
            Err(ParseError::SchemaViolation { detail, .. }) => detail,
            other => panic!("expected a schema violation, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_channel_id() {
        let detail = schema_detail(
            r#"{ "channels": [ { "channel_id": 4, "programs": [] }, { "id": 4, "programs": [] } ] }"#,
        );
        assert!(detail.contains("duplicate channel_id 4"), "{}", detail);
    }

    #[test]
    fn test_opening_must_precede_closing() {
        let detail = schema_detail(r#"{ "opening_time": 600, "closing_time": 600, "channels": [] }"#);
        assert!(detail.contains("opening_time 600"), "{}", detail);
    }

    #[test]
    fn test_end_and_duration_must_agree() {
        let detail = schema_detail(
            r#"{ "channels": [ { "channel_id": 0, "programs": [
                { "program_id": "a", "start": 0, "end": 60, "duration": 45 }
            ] } ] }"#,
        );
        assert!(detail.contains("disagrees"), "{}", detail);
    }

    #[test]
    fn test_bonus_requires_optimal_window() {
        let detail = schema_detail(
            r#"{ "channels": [ { "channel_id": 0, "programs": [
                { "program_id": "a", "start": 0, "end": 60, "bonus": 5 }
            ] } ] }"#,
        );
        assert!(detail.contains("without an optimal_window"), "{}", detail);
    }

    #[test]
    fn test_empty_preferred_genre() {
        let detail = schema_detail(
            r#"{ "channels": [],
                 "time_preferences": [ { "start": 0, "end": 60, "preferred_genre": "" } ] }"#,
        );
        assert!(detail.contains("empty preferred_genre"), "{}", detail);
    }

    #[test]
    fn test_priority_block_without_channel() {
        let detail = schema_detail(
            r#"{ "channels": [ { "channel_id": 0, "programs": [] } ],
                 "priority_blocks": [ { "start": 0, "end": 60 } ] }"#,
        );
        assert!(detail.contains("names no channel"), "{}", detail);
    }

    #[test]
    fn test_negative_default_value_rejected() {
        let detail = schema_detail(
            r#"{ "channels": [ { "channel_id": 0, "programs": [
                { "program_id": "a", "start": 0, "end": 60 }
            ] } ], "parameters": { "D": -5 } }"#,
        );
        assert!(detail.contains("parameter D"), "{}", detail);
    }

    #[test]
    fn test_min_duration() {
        let ins = parse_instance(r#"{ "min_duration": 15, "channels": [] }"#).unwrap();
        assert_eq!(ins.min_duration, Some(15));
        assert_eq!(parse_instance(INSTANCE).unwrap().min_duration, None);

        let detail = schema_detail(r#"{ "min_duration": 0, "channels": [] }"#);
        assert!(detail.contains("min_duration"), "{}", detail);
    }

    #[test]
    fn test_parse_submission_aliases() {
        let sub = parse_submission(
            r#"{ "schedule": [ { "program_id": "n1", "channel_id": 0, "start": 540 } ] }"#,
        )
        .unwrap();
        assert_eq!(sub.placements.len(), 1);
        assert_eq!(sub.placements[0].start, 540);
    }

    #[test]
    fn test_submission_count_mismatch() {
        let err = parse_submission(
            r#"{ "num_programs": 2,
                 "scheduled_programs": [ { "program_id": "n1", "channel_id": 0, "start": 540 } ] }"#,
        )
        .unwrap_err();
        assert_eq!(err.document(), Document::Submission);
        assert!(matches!(err, ParseError::SchemaViolation { .. }));
    }

    #[test]
    fn test_submission_negative_channel_rejected() {
        let err = parse_submission(
            r#"{ "scheduled_programs": [ { "program_id": "n1", "channel_id": -1, "start": 0 } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::SchemaViolation { .. }));
    }
}
