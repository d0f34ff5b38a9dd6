use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::grader::GradeError;
use crate::model::{
    clock, ChannelId, Instance, Interval, Program, Submission, Violation, ViolationKind,
};
use crate::report::{TimelineEntry, Trace};

// ---------------------------------------------------------------------------
// Placed programs
// ---------------------------------------------------------------------------

/// A placement resolved against the instance.
#[derive(Debug, Clone, Copy)]
pub struct Slot<'a> {
    pub program: &'a Program,
    pub channel: ChannelId,
    pub airing: Interval,
}

impl<'a> Slot<'a> {
    pub fn program_id(&self) -> &'a str {
        &self.program.id
    }

    /// `start - canonical_start`; negative when the program airs early.
    pub fn deviation(&self) -> i64 {
        self.airing.start.saturating_sub(self.program.canonical_start)
    }

    pub fn describe(&self) -> String {
        format!(
            "'{}' [ch {}, {}-{}]",
            self.program.id,
            self.channel,
            clock(self.airing.start),
            clock(self.airing.end)
        )
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// The submission in chronological order, once as a single viewing sequence
/// and once partitioned per channel.
///
/// Master order is `(start, program_id)`, so equal start times always break
/// the same way regardless of submission order.
#[derive(Debug, Clone)]
pub struct Timeline<'a> {
    master: Vec<Slot<'a>>,
    /// Indices into `master`, per channel in ascending channel id.
    lanes: BTreeMap<ChannelId, Vec<usize>>,
    rejected: Vec<Violation>,
}

impl<'a> Timeline<'a> {
    /// Resolve every placement of `submission` against `instance`.
    ///
    /// Placements naming an unknown program or channel, placing a program on a
    /// channel that does not carry it, or repeating an already placed program
    /// are left out and reported as violations (see [`Timeline::rejected`]).
    pub fn build(
        instance: &'a Instance,
        submission: &Submission,
        trace: &mut Trace,
    ) -> Result<Self, GradeError> {
        let mut slots: Vec<Slot<'a>> = Vec::with_capacity(submission.placements.len());
        let mut rejected: Vec<Violation> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for placement in &submission.placements {
            let id = placement.program_id.as_str();
            let ch = placement.channel_id;

            // Every occurrence counts, including ones rejected below.
            if !seen.insert(id) {
                rejected.push(
                    Violation::new(
                        ViolationKind::DuplicatePlacement,
                        placement.start,
                        ch,
                        format!("Program '{}' is placed more than once", id),
                    )
                    .implicating([id]),
                );
                continue;
            }

            let program = match instance.program(id) {
                Some(p) => p,
                None => {
                    rejected.push(
                        Violation::new(
                            ViolationKind::UnknownReference,
                            placement.start,
                            ch,
                            format!("Program '{}' does not exist in the instance", id),
                        )
                        .implicating([id]),
                    );
                    continue;
                }
            };

            if !instance.has_channel(ch) {
                rejected.push(
                    Violation::new(
                        ViolationKind::UnknownReference,
                        placement.start,
                        ch,
                        format!("Channel {} for program '{}' does not exist in the instance", ch, id),
                    )
                    .implicating([id]),
                );
                continue;
            }

            if program.channel != ch {
                rejected.push(
                    Violation::new(
                        ViolationKind::UnknownReference,
                        placement.start,
                        ch,
                        format!(
                            "Program '{}' is broadcast on channel {}, not channel {}",
                            id, program.channel, ch
                        ),
                    )
                    .implicating([id]),
                );
                continue;
            }

            let end = placement
                .start
                .checked_add(program.duration)
                .ok_or(GradeError::Overflow("placement end time"))?;

            slots.push(Slot {
                program,
                channel: ch,
                airing: Interval::new(placement.start, end),
            });
        }

        for v in &rejected {
            trace.record(|| format!("[VIOL] {:?}: {}", v.kind, v.message));
        }

        let timeline = Self::from_slots(slots, rejected);
        debug!(
            "timeline: {} placed, {} rejected, {} channels in use",
            timeline.master.len(),
            timeline.rejected.len(),
            timeline.lanes.len()
        );
        trace.record(|| {
            format!(
                "Built timeline with {} placements on {} channels ({} rejected).",
                timeline.master.len(),
                timeline.lanes.len(),
                timeline.rejected.len()
            )
        });
        Ok(timeline)
    }

    fn from_slots(mut slots: Vec<Slot<'a>>, rejected: Vec<Violation>) -> Self {
        slots.sort_by(|a, b| {
            a.airing
                .start
                .cmp(&b.airing.start)
                .then_with(|| a.program.id.cmp(&b.program.id))
        });

        let mut lanes: BTreeMap<ChannelId, Vec<usize>> = BTreeMap::new();
        for (i, slot) in slots.iter().enumerate() {
            lanes.entry(slot.channel).or_default().push(i);
        }

        Timeline {
            master: slots,
            lanes,
            rejected,
        }
    }

    /// All placed programs in viewing order.
    pub fn master(&self) -> &[Slot<'a>] {
        &self.master
    }

    /// Per-channel placements in time order, channels ascending.
    pub fn lanes(&self) -> impl Iterator<Item = (ChannelId, Vec<&Slot<'a>>)> + '_ {
        self.lanes
            .iter()
            .map(move |(ch, idxs)| (*ch, idxs.iter().map(|&i| &self.master[i]).collect()))
    }

    /// Reference and duplicate violations found while resolving placements,
    /// in submission order.
    pub fn rejected(&self) -> &[Violation] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.master.len()
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }

    /// A timeline holding only the slots accepted by `keep`. Ordering is
    /// preserved; rejected violations are not carried over.
    pub fn retain(&self, keep: impl Fn(&Slot<'a>) -> bool) -> Timeline<'a> {
        let slots = self.master.iter().filter(|s| keep(s)).copied().collect();
        Self::from_slots(slots, Vec::new())
    }

    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.master
            .iter()
            .map(|s| TimelineEntry {
                program_id: s.program.id.clone(),
                channel_id: s.channel,
                genre: s.program.genre_label().to_string(),
                start: s.airing.start,
                end: s.airing.end,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Placement;
    use crate::parse::parse_instance;

    fn instance() -> Instance {
        parse_instance(
            r#"{ "channels": [
                { "channel_id": 0, "programs": [
                    { "program_id": "a", "start": 0, "end": 60 },
                    { "program_id": "c", "start": 60, "end": 120 }
                ] },
                { "channel_id": 1, "programs": [
                    { "program_id": "b", "start": 0, "end": 30 }
                ] }
            ] }"#,
        )
        .unwrap()
    }

    fn place(id: &str, ch: ChannelId, start: i64) -> Placement {
        Placement {
            program_id: id.to_string(),
            channel_id: ch,
            start,
        }
    }

    #[test]
    fn test_master_order_ties_break_on_program_id() {
        let ins = instance();
        let sub = Submission {
            placements: vec![place("c", 0, 60), place("b", 1, 0), place("a", 0, 0)],
        };
        let tl = Timeline::build(&ins, &sub, &mut Trace::disabled()).unwrap();
        let ids: Vec<&str> = tl.master().iter().map(|s| s.program_id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(tl.master()[2].airing, Interval::new(60, 120));
        assert!(tl.rejected().is_empty());
    }

    #[test]
    fn test_lanes_are_grouped_by_channel() {
        let ins = instance();
        let sub = Submission {
            placements: vec![place("c", 0, 60), place("b", 1, 0), place("a", 0, 0)],
        };
        let tl = Timeline::build(&ins, &sub, &mut Trace::disabled()).unwrap();
        let lanes: Vec<(ChannelId, Vec<&str>)> = tl
            .lanes()
            .map(|(ch, slots)| (ch, slots.iter().map(|s| s.program_id()).collect()))
            .collect();
        assert_eq!(lanes, vec![(0, vec!["a", "c"]), (1, vec!["b"])]);
    }

    #[test]
    fn test_bad_references_are_rejected() {
        let ins = instance();
        let sub = Submission {
            placements: vec![
                place("a", 0, 0),
                place("zzz", 0, 10),
                place("b", 7, 10),
                place("c", 1, 10),
                place("a", 0, 200),
            ],
        };
        let tl = Timeline::build(&ins, &sub, &mut Trace::disabled()).unwrap();
        assert_eq!(tl.len(), 1);
        let kinds: Vec<ViolationKind> = tl.rejected().iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::UnknownReference,
                ViolationKind::UnknownReference,
                ViolationKind::UnknownReference,
                ViolationKind::DuplicatePlacement,
            ]
        );
        assert_eq!(tl.rejected()[3].time, 200);
    }

    #[test]
    fn test_repeat_of_rejected_placement_is_duplicate() {
        let ins = instance();
        // first "a" sits on the wrong channel and is rejected
        let sub = Submission {
            placements: vec![place("a", 1, 0), place("a", 0, 0)],
        };
        let tl = Timeline::build(&ins, &sub, &mut Trace::disabled()).unwrap();
        assert!(tl.is_empty());
        let kinds: Vec<ViolationKind> = tl.rejected().iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![ViolationKind::UnknownReference, ViolationKind::DuplicatePlacement]
        );
    }

    #[test]
    fn test_end_overflow_is_fatal() {
        let ins = instance();
        let sub = Submission {
            placements: vec![place("a", 0, i64::MAX - 1)],
        };
        assert!(matches!(
            Timeline::build(&ins, &sub, &mut Trace::disabled()),
            Err(GradeError::Overflow(_))
        ));
    }
}
