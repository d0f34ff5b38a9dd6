use serde::Serialize;

use crate::model::{ChannelId, Minute, Violation};
use crate::scorer::ScoreBreakdown;

/// Version stamped on every result.
pub const VALIDATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Ordered, human-readable log of grading decisions. Collects nothing unless
/// verbose output was requested; never consulted for status or score.
#[derive(Debug, Default)]
pub struct Trace {
    lines: Option<Vec<String>>,
}

impl Trace {
    pub fn new(verbose: bool) -> Self {
        Trace {
            lines: verbose.then(Vec::new),
        }
    }

    pub fn disabled() -> Self {
        Trace { lines: None }
    }

    /// Append a line. The closure only runs when tracing is enabled.
    pub fn record(&mut self, line: impl FnOnce() -> String) {
        if let Some(lines) = self.lines.as_mut() {
            lines.push(line());
        }
    }

    pub fn into_lines(self) -> Option<Vec<String>> {
        self.lines
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Valid,
    Invalid,
    Error,
}

/// One placed program as shown in the timeline view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub program_id: String,
    pub channel_id: ChannelId,
    pub genre: String,
    pub start: Minute,
    pub end: Minute,
}

/// The outcome of one grading request. Built once by the assembler and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<ScoreBreakdown>,
    violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    timeline: Vec<TimelineEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verbose: Option<Vec<String>>,
    validator_version: &'static str,
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl ValidationResult {
    /// Combine a finished check and score into a result. Status is `VALID`
    /// exactly when `violations` is empty.
    pub fn assemble(
        violations: Vec<Violation>,
        score: ScoreBreakdown,
        timeline: Vec<TimelineEntry>,
        mut trace: Trace,
        elapsed_ms: u64,
    ) -> Self {
        let status = if violations.is_empty() {
            Status::Valid
        } else {
            Status::Invalid
        };
        trace.record(|| format!("Final status: {}", status.as_str()));
        ValidationResult {
            status,
            score: Some(score),
            violations,
            timeline,
            verbose: trace.into_lines(),
            validator_version: VALIDATOR_VERSION,
            elapsed_ms,
            error_message: None,
        }
    }

    /// A fatal outcome: no score, no violations.
    pub fn error(message: impl Into<String>, mut trace: Trace, elapsed_ms: u64) -> Self {
        let message = message.into();
        trace.record(|| format!("Final status: ERROR ({})", message));
        ValidationResult {
            status: Status::Error,
            score: None,
            violations: Vec::new(),
            timeline: Vec::new(),
            verbose: trace.into_lines(),
            validator_version: VALIDATOR_VERSION,
            elapsed_ms,
            error_message: Some(message),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status == Status::Valid
    }

    pub fn score(&self) -> Option<&ScoreBreakdown> {
        self.score.as_ref()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn trace(&self) -> Option<&[String]> {
        self.verbose.as_deref()
    }

    pub fn validator_version(&self) -> &str {
        self.validator_version
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The five score rows as CSV, or `None` when no score was computed.
    pub fn score_csv(&self) -> Option<String> {
        let s = self.score.as_ref()?;
        let rows = [
            "Component,Value,Details".to_string(),
            format!("Base,{},Sum of program base values", s.base),
            format!("Bonuses,{},Optimal time bonuses", s.bonuses),
            format!(
                "Switches,{},{} switches x S({})",
                s.switches.total, s.switches.count, s.switches.per_switch_cost
            ),
            format!(
                "Early/Late,{},T({}) x ({} early + {} late)",
                s.early_late.total,
                s.early_late.per_occurrence_cost,
                s.early_late.early,
                s.early_late.late
            ),
            format!("Total,{},", s.total),
        ];
        Some(rows.join("\n"))
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Valid => "VALID",
            Status::Invalid => "INVALID",
            Status::Error => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ViolationKind;
    use crate::scorer::{EarlyLateStats, SwitchStats};

    fn breakdown() -> ScoreBreakdown {
        ScoreBreakdown {
            total: 245,
            base: 280,
            bonuses: 40,
            switches: SwitchStats {
                count: 1,
                per_switch_cost: 25,
                total: -25,
            },
            early_late: EarlyLateStats {
                early: 0,
                late: 1,
                per_occurrence_cost: 50,
                total: -50,
            },
        }
    }

    #[test]
    fn test_disabled_trace_skips_closure() {
        let mut trace = Trace::disabled();
        trace.record(|| panic!("must not be evaluated"));
        assert!(trace.into_lines().is_none());
    }

    #[test]
    fn test_status_follows_violations() {
        let valid = ValidationResult::assemble(vec![], breakdown(), vec![], Trace::disabled(), 0);
        assert_eq!(valid.status(), Status::Valid);

        let v = Violation::new(ViolationKind::Overlap, 660, 0, "overlap");
        let invalid =
            ValidationResult::assemble(vec![v], breakdown(), vec![], Trace::disabled(), 0);
        assert_eq!(invalid.status(), Status::Invalid);
        assert!(invalid.score().is_some());
    }

    #[test]
    fn test_json_field_names() {
        let r = ValidationResult::assemble(vec![], breakdown(), vec![], Trace::new(true), 3);
        let json: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "VALID");
        assert_eq!(json["score"]["switches"]["S"], 25);
        assert_eq!(json["score"]["early_late"]["T"], 50);
        assert_eq!(json["score"]["early_late"]["late"], 1);
        assert_eq!(json["validator_version"], VALIDATOR_VERSION);
        assert_eq!(json["elapsed_ms"], 3);
        assert_eq!(json["verbose"][0], "Final status: VALID");
        assert!(json.get("error_message").is_none());
        assert!(json.get("timeline").is_none());
    }

    #[test]
    fn test_error_result_shape() {
        let r = ValidationResult::error("boom", Trace::disabled(), 1);
        let json: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "ERROR");
        assert!(json.get("score").is_none());
        assert_eq!(json["violations"].as_array().unwrap().len(), 0);
        assert_eq!(json["error_message"], "boom");
        assert!(json.get("verbose").is_none());
        assert!(r.score_csv().is_none());
    }

    #[test]
    fn test_score_csv_rows() {
        let r = ValidationResult::assemble(vec![], breakdown(), vec![], Trace::disabled(), 0);
        let csv = r.score_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "Base,280,Sum of program base values");
        assert_eq!(lines[3], "Switches,-25,1 switches x S(25)");
        assert_eq!(lines[4], "Early/Late,-50,T(50) x (0 early + 1 late)");
        assert_eq!(lines[5], "Total,245,");
    }
}
