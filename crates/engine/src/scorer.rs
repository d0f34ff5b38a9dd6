use log::debug;
use serde::Serialize;

use crate::config::BonusRule;
use crate::grader::GradeError;
use crate::model::{clock, Instance, PreferenceWindow};
use crate::report::Trace;
use crate::timeline::Slot;

// ---------------------------------------------------------------------------
// Score types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwitchStats {
    pub count: i64,
    #[serde(rename = "S")]
    pub per_switch_cost: i64,
    /// `-S × count`.
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EarlyLateStats {
    pub early: i64,
    pub late: i64,
    #[serde(rename = "T")]
    pub per_occurrence_cost: i64,
    /// `-T × (early + late)`.
    pub total: i64,
}

/// The four score terms and their sum. Penalty totals are non-positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub total: i64,
    pub base: i64,
    pub bonuses: i64,
    pub switches: SwitchStats,
    pub early_late: EarlyLateStats,
}

// ---------------------------------------------------------------------------
// Checked arithmetic
// ---------------------------------------------------------------------------

fn add(a: i64, b: i64, what: &'static str) -> Result<i64, GradeError> {
    a.checked_add(b).ok_or(GradeError::Overflow(what))
}

fn mul(a: i64, b: i64, what: &'static str) -> Result<i64, GradeError> {
    a.checked_mul(b).ok_or(GradeError::Overflow(what))
}

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

fn base_term(slots: &[Slot<'_>], trace: &mut Trace) -> Result<i64, GradeError> {
    let mut base = 0;
    for slot in slots {
        base = add(base, slot.program.base_value, "base score")?;
        trace.record(|| format!(" + base: {} -> {}", slot.program_id(), slot.program.base_value));
    }
    trace.record(|| format!("Base total = {}", base));
    Ok(base)
}

fn is_eligible(slot: &Slot<'_>, pref: &PreferenceWindow, rule: BonusRule) -> bool {
    match rule {
        BonusRule::StartInWindow => pref.window.contains(slot.airing.start),
        BonusRule::MinOverlap { minutes } => slot.airing.overlap_len(&pref.window) >= minutes,
    }
}

fn bonus_term(
    instance: &Instance,
    slots: &[Slot<'_>],
    rule: BonusRule,
    trace: &mut Trace,
) -> Result<i64, GradeError> {
    let r = instance.parameters.bonus_multiplier;
    let mut bonuses = 0;
    for slot in slots {
        for pref in &slot.program.preferences {
            if is_eligible(slot, pref, rule) {
                let amount = mul(pref.unit, r, "bonus")?;
                bonuses = add(bonuses, amount, "bonus total")?;
                trace.record(|| {
                    format!(
                        "[BONUS] +{} for {} starting {} inside {} ({} x R={})",
                        amount,
                        slot.program_id(),
                        clock(slot.airing.start),
                        pref.window,
                        pref.unit,
                        r
                    )
                });
            } else {
                trace.record(|| {
                    format!(
                        "[NO BONUS] {} at {} misses {}",
                        slot.program_id(),
                        clock(slot.airing.start),
                        pref.window
                    )
                });
            }
        }
    }
    trace.record(|| format!("Bonus total = {}", bonuses));
    Ok(bonuses)
}

/// Count channel changes between neighbours of the viewing sequence.
pub fn count_switches(slots: &[Slot<'_>], trace: &mut Trace) -> i64 {
    let mut count = 0;
    for pair in slots.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.channel != next.channel {
            count += 1;
            trace.record(|| {
                format!(
                    "[SWITCH] {} (ch {}) -> {} (ch {}) at {}",
                    prev.program_id(),
                    prev.channel,
                    next.program_id(),
                    next.channel,
                    clock(next.airing.start)
                )
            });
        }
    }
    count
}

fn switch_term(
    instance: &Instance,
    slots: &[Slot<'_>],
    trace: &mut Trace,
) -> Result<SwitchStats, GradeError> {
    let s = instance.parameters.switch_penalty;
    let count = count_switches(slots, trace);
    let total = mul(count, s, "switch penalty")?
        .checked_neg()
        .ok_or(GradeError::Overflow("switch penalty"))?;
    trace.record(|| format!("Switches = {} S = {} penalty = {}", count, s, total));
    Ok(SwitchStats {
        count,
        per_switch_cost: s,
        total,
    })
}

fn early_late_term(
    instance: &Instance,
    slots: &[Slot<'_>],
    trace: &mut Trace,
) -> Result<EarlyLateStats, GradeError> {
    let params = &instance.parameters;
    let (mut early, mut late) = (0i64, 0i64);

    for slot in slots {
        let deviation = slot.deviation();
        if deviation.saturating_neg() > params.early_threshold {
            early += 1;
            trace.record(|| {
                format!(
                    "[EARLY] {} starts {} min before {} (O = {})",
                    slot.program_id(),
                    deviation.saturating_neg(),
                    clock(slot.program.canonical_start),
                    params.early_threshold
                )
            });
        } else if deviation > params.late_threshold {
            late += 1;
            trace.record(|| {
                format!(
                    "[LATE] {} starts {} min after {} (E = {})",
                    slot.program_id(),
                    deviation,
                    clock(slot.program.canonical_start),
                    params.late_threshold
                )
            });
        }
    }

    let t = params.early_late_penalty;
    let total = mul(add(early, late, "early/late count")?, t, "early/late penalty")?
        .checked_neg()
        .ok_or(GradeError::Overflow("early/late penalty"))?;
    trace.record(|| format!("Early = {} Late = {} T = {} penalty = {}", early, late, t, total));
    Ok(EarlyLateStats {
        early,
        late,
        per_occurrence_cost: t,
        total,
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Score a viewing sequence. `slots` must be in master chronological order;
/// the switch term depends on it.
///
/// Runs whether or not the schedule is valid. All arithmetic is exact; an
/// overflow is reported instead of wrapping.
pub fn score(
    instance: &Instance,
    slots: &[Slot<'_>],
    rule: BonusRule,
    trace: &mut Trace,
) -> Result<ScoreBreakdown, GradeError> {
    trace.record(|| format!("Scoring {} placements.", slots.len()));

    let base = base_term(slots, trace)?;
    let bonuses = bonus_term(instance, slots, rule, trace)?;
    let switches = switch_term(instance, slots, trace)?;
    let early_late = early_late_term(instance, slots, trace)?;

    let total = [bonuses, switches.total, early_late.total]
        .into_iter()
        .try_fold(base, |acc, term| add(acc, term, "total score"))?;
    trace.record(|| format!("[TOTAL] {}", total));
    debug!(
        "score: base={} bonuses={} switches={} early_late={} total={}",
        base, bonuses, switches.total, early_late.total, total
    );

    Ok(ScoreBreakdown {
        total,
        base,
        bonuses,
        switches,
        early_late,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
