use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::config::{BlockReportTime, GradingOptions};
use crate::model::{clock, ChannelId, Instance, Program, Violation, ViolationKind};
use crate::report::Trace;
use crate::timeline::{Slot, Timeline};

// ---------------------------------------------------------------------------
// Check outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    /// Every defect found, in report order: overlaps, priority blocks,
    /// opening hours, genre runs, input overlaps, then reference/duplicate
    /// problems.
    pub violations: Vec<Violation>,
}

impl CheckOutcome {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Same-channel overlaps, channel by channel in ascending id, in time order.
///
/// Each placement is compared against the furthest-reaching earlier
/// placement on its channel, so an overlap hidden behind a short program is
/// still caught. The violation carries the later placement's start.
fn overlap_pass(timeline: &Timeline<'_>, trace: &mut Trace) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (channel, lane) in timeline.lanes() {
        let mut reach: Option<&Slot<'_>> = None;
        for slot in lane {
            if let Some(prev) = reach {
                if slot.airing.start < prev.airing.end {
                    violations.push(
                        Violation::new(
                            ViolationKind::Overlap,
                            slot.airing.start,
                            channel,
                            format!("Overlap between {} and {}", prev.describe(), slot.describe()),
                        )
                        .implicating([prev.program_id(), slot.program_id()]),
                    );
                }
            }
            match reach {
                Some(prev) if prev.airing.end >= slot.airing.end => {}
                _ => reach = Some(slot),
            }
        }
    }

    for v in &violations {
        trace.record(|| format!("[VIOL] OVERLAP at {} on ch {}", clock(v.time), v.channel));
    }
    violations
}

/// Placements watched on a disallowed channel while a priority block runs.
/// The output is stable-sorted by reported time.
fn priority_block_pass(
    instance: &Instance,
    timeline: &Timeline<'_>,
    report_time: BlockReportTime,
    trace: &mut Trace,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for block in &instance.priority_blocks {
        for slot in timeline.master() {
            if !slot.airing.intersects(&block.window) || block.allows(slot.channel) {
                continue;
            }
            let time = match report_time {
                BlockReportTime::BlockEnd => block.window.end,
                BlockReportTime::BreachStart => slot.airing.start.max(block.window.start),
            };
            violations.push(
                Violation::new(
                    ViolationKind::PriorityBlock,
                    time,
                    slot.channel,
                    format!(
                        "Program {} is on channel {} during priority block {} reserved for {}",
                        slot.describe(),
                        slot.channel,
                        block.window,
                        channel_list(&block.allowed_channels)
                    ),
                )
                .implicating([slot.program_id()]),
            );
        }
    }

    violations.sort_by_key(|v| v.time);
    for v in &violations {
        trace.record(|| format!("[VIOL] PRIORITY_BLOCK at {} on ch {}", clock(v.time), v.channel));
    }
    violations
}

fn channel_list(channels: &[ChannelId]) -> String {
    let names: Vec<String> = channels.iter().map(|c| format!("channel {}", c)).collect();
    names.join(", ")
}

/// Placements airing before opening or after closing time.
fn opening_hours_pass(
    instance: &Instance,
    timeline: &Timeline<'_>,
    trace: &mut Trace,
) -> Vec<Violation> {
    if instance.opening_time.is_none() && instance.closing_time.is_none() {
        return Vec::new();
    }

    let mut violations = Vec::new();
    for slot in timeline.master() {
        let too_early = instance.opening_time.is_some_and(|open| slot.airing.start < open);
        let too_late = instance.closing_time.is_some_and(|close| slot.airing.end > close);
        if too_early || too_late {
            violations.push(
                Violation::new(
                    ViolationKind::OutsideWindow,
                    slot.airing.start,
                    slot.channel,
                    format!(
                        "Program {} airs outside opening hours [{}, {})",
                        slot.describe(),
                        instance.opening_time.map_or_else(|| "-".to_string(), clock),
                        instance.closing_time.map_or_else(|| "-".to_string(), clock)
                    ),
                )
                .implicating([slot.program_id()]),
            );
        }
    }

    for v in &violations {
        trace.record(|| format!("[VIOL] OUTSIDE_WINDOW at {} on ch {}", clock(v.time), v.channel));
    }
    violations
}

/// Runs of equal genres in viewing order longer than the instance allows.
/// Programs without a genre break a run.
fn genre_run_pass(
    instance: &Instance,
    timeline: &Timeline<'_>,
    trace: &mut Trace,
) -> Vec<Violation> {
    let limit = match instance.max_consecutive_genre {
        Some(limit) => limit,
        None => return Vec::new(),
    };

    let mut violations = Vec::new();
    let mut run = 0usize;
    let mut last: Option<&str> = None;

    for slot in timeline.master() {
        let genre = match slot.program.genre.as_deref() {
            Some(g) => g,
            None => {
                last = None;
                run = 0;
                continue;
            }
        };
        if last == Some(genre) {
            run += 1;
        } else {
            last = Some(genre);
            run = 1;
        }
        if run > limit {
            violations.push(
                Violation::new(
                    ViolationKind::GenreRun,
                    slot.airing.start,
                    slot.channel,
                    format!(
                        "More than {} consecutive '{}' programs; offending program {}",
                        limit,
                        genre,
                        slot.describe()
                    ),
                )
                .implicating([slot.program_id()]),
            );
        }
    }

    for v in &violations {
        trace.record(|| format!("[VIOL] GENRE_RUN at {} on ch {}", clock(v.time), v.channel));
    }
    violations
}

/// Ids of programs whose own airing overlaps another program of the same
/// channel in the instance.
fn overlapping_in_instance(instance: &Instance) -> BTreeSet<&str> {
    let mut by_channel: BTreeMap<ChannelId, Vec<&Program>> = BTreeMap::new();
    for program in instance.programs.values() {
        by_channel.entry(program.channel).or_default().push(program);
    }

    let mut overlapping = BTreeSet::new();
    for programs in by_channel.values_mut() {
        programs.sort_by_key(|p| (p.canonical_start, p.id.as_str()));
        for (i, &a) in programs.iter().enumerate() {
            let a_end = a.canonical_start.saturating_add(a.duration);
            for &b in programs[i + 1..].iter().take_while(|b| b.canonical_start < a_end) {
                overlapping.insert(a.id.as_str());
                overlapping.insert(b.id.as_str());
            }
        }
    }
    overlapping
}

/// Placements of programs that collide with another program of their channel
/// in the instance itself.
fn input_overlap_pass(
    instance: &Instance,
    timeline: &Timeline<'_>,
    trace: &mut Trace,
) -> Vec<Violation> {
    let overlapping = overlapping_in_instance(instance);
    if overlapping.is_empty() {
        return Vec::new();
    }

    let violations: Vec<Violation> = timeline
        .master()
        .iter()
        .filter(|slot| overlapping.contains(slot.program_id()))
        .map(|slot| {
            Violation::new(
                ViolationKind::InputOverlap,
                slot.airing.start,
                slot.channel,
                format!(
                    "Program {} overlaps another program of channel {} in the instance",
                    slot.describe(),
                    slot.channel
                ),
            )
            .implicating([slot.program_id()])
        })
        .collect();

    for v in &violations {
        trace.record(|| format!("[VIOL] INPUT_OVERLAP at {} on ch {}", clock(v.time), v.channel));
    }
    violations
}

// ---------------------------------------------------------------------------
// Check implementation
// ---------------------------------------------------------------------------

/// Run every constraint pass over the timeline and merge the results.
///
/// All passes are exhaustive; nothing stops at the first defect. The result
/// order is fixed, so identical input always yields an identical list.
pub fn check(
    instance: &Instance,
    timeline: &Timeline<'_>,
    options: &GradingOptions,
    trace: &mut Trace,
) -> CheckOutcome {
    let mut violations = overlap_pass(timeline, trace);
    violations.extend(priority_block_pass(
        instance,
        timeline,
        options.priority_block_time,
        trace,
    ));
    violations.extend(opening_hours_pass(instance, timeline, trace));
    violations.extend(genre_run_pass(instance, timeline, trace));
    if options.flag_input_overlaps {
        violations.extend(input_overlap_pass(instance, timeline, trace));
    }
    violations.extend(timeline.rejected().iter().cloned());

    debug!("check: {} violations", violations.len());
    trace.record(|| format!("Constraint checks found {} violation(s).", violations.len()));
    CheckOutcome { violations }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
