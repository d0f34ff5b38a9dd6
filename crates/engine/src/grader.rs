use std::collections::HashSet;
use std::time::Instant;

use log::{info, warn};

use crate::config::{GradingOptions, ScoreScope};
use crate::model::Violation;
use crate::parse::{parse_instance, parse_submission, ParseError};
use crate::report::{TimelineEntry, Trace, ValidationResult};
use crate::scorer::ScoreBreakdown;
use crate::timeline::Timeline;
use crate::{scorer, validator};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal grading failures. Any of these turns the result into `ERROR`.
#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("integer overflow while computing {0}")]
    Overflow(&'static str),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Grade `submission_text` against `instance_text` with default options.
pub fn grade(instance_text: &str, submission_text: &str, verbose: bool) -> ValidationResult {
    grade_with_options(instance_text, submission_text, verbose, &GradingOptions::default())
}

/// Grade a submission.
///
/// 1. Parses both documents; any failure ends the run with status `ERROR`.
/// 2. Builds the timeline, setting aside placements with dangling references
///    or repeated programs.
/// 3. Runs the constraint passes.
/// 4. Scores the schedule whether or not violations were found.
/// 5. Assembles the result, stamping version and elapsed time.
///
/// Never panics on well-formed calls; every failure comes back as a result.
pub fn grade_with_options(
    instance_text: &str,
    submission_text: &str,
    verbose: bool,
    options: &GradingOptions,
) -> ValidationResult {
    let started = Instant::now();
    let mut trace = Trace::new(verbose);

    let outcome = run(instance_text, submission_text, options, &mut trace);
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(graded) => {
            let result = ValidationResult::assemble(
                graded.violations,
                graded.score,
                graded.timeline,
                trace,
                elapsed_ms,
            );
            info!(
                "graded submission: status={} violations={} total={}",
                result.status().as_str(),
                result.violations().len(),
                result.score().map_or(0, |s| s.total)
            );
            result
        }
        Err(err) => {
            warn!("grading failed: {}", err);
            ValidationResult::error(err.to_string(), trace, elapsed_ms)
        }
    }
}

struct Graded {
    violations: Vec<Violation>,
    score: ScoreBreakdown,
    timeline: Vec<TimelineEntry>,
}

fn run(
    instance_text: &str,
    submission_text: &str,
    options: &GradingOptions,
    trace: &mut Trace,
) -> Result<Graded, GradeError> {
    let instance = parse_instance(instance_text)?;
    trace.record(|| {
        format!(
            "Parsed instance: {} channels, {} programs, {} priority blocks.",
            instance.channels.len(),
            instance.programs.len(),
            instance.priority_blocks.len()
        )
    });
    let submission = parse_submission(submission_text)?;
    trace.record(|| format!("Parsed submission: {} placements.", submission.placements.len()));

    let timeline = Timeline::build(&instance, &submission, trace)?;
    let outcome = validator::check(&instance, &timeline, options, trace);
    let bonus_rule = options.effective_bonus_rule(instance.min_duration);

    let score = match options.score_scope {
        ScoreScope::AllPlaced => {
            scorer::score(&instance, timeline.master(), bonus_rule, trace)?
        }
        ScoreScope::ConflictFree => {
            let implicated: HashSet<&str> = outcome
                .violations
                .iter()
                .flat_map(|v| v.programs.iter().map(String::as_str))
                .collect();
            let clean = timeline.retain(|s| !implicated.contains(s.program_id()));
            trace.record(|| {
                format!(
                    "Scoring conflict-free subset only: {} / {} placements.",
                    clean.len(),
                    timeline.len()
                )
            });
            scorer::score(&instance, clean.master(), bonus_rule, trace)?
        }
    };

    Ok(Graded {
        timeline: timeline.entries(),
        violations: outcome.violations,
        score,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
