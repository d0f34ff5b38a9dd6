use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveTime;
use serde::Serialize;

/// Channel identifiers are non-negative integers declared by the instance.
pub type ChannelId = u32;

/// Minutes from the start of the broadcast day.
pub type Minute = i64;

const MINUTES_PER_DAY: Minute = 24 * 60;

/// Render a minute offset as a wall-clock time (`09:00`) when it falls inside
/// a single day; other offsets are shown raw.
pub fn clock(minute: Minute) -> String {
    if (0..MINUTES_PER_DAY).contains(&minute) {
        let secs = u32::try_from(minute * 60).ok();
        if let Some(t) = secs.and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, 0)) {
            return t.format("%H:%M").to_string();
        }
    }
    format!("t={}", minute)
}

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: Minute,
    pub end: Minute,
}

impl Interval {
    pub fn new(start: Minute, end: Minute) -> Self {
        Interval { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when the two ranges share at least one minute. Touching ranges
    /// (`a.end == b.start`) do not intersect.
    pub fn intersects(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, minute: Minute) -> bool {
        self.start <= minute && minute < self.end
    }

    /// Number of minutes shared with `other` (zero when disjoint).
    pub fn overlap_len(&self, other: &Interval) -> Minute {
        self.end
            .min(other.end)
            .saturating_sub(self.start.max(other.start))
            .max(0)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}-{})", clock(self.start), clock(self.end))
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// A window in which airing a program earns `unit × R` bonus points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceWindow {
    pub window: Interval,
    /// Program-specific bonus magnitude, scaled by the instance's `R`.
    pub unit: i64,
}

/// A program offered by the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub id: String,
    /// The channel that carries this program.
    pub channel: ChannelId,
    pub genre: Option<String>,
    /// Airing length in minutes. Always > 0.
    pub duration: Minute,
    /// `D_i`: points earned for placing the program.
    pub base_value: i64,
    /// Start time the instance expects; drives the early/late penalty.
    pub canonical_start: Minute,
    /// Optimal windows for bonus eligibility.
    pub preferences: Vec<PreferenceWindow>,
}

impl Program {
    pub fn genre_label(&self) -> &str {
        self.genre.as_deref().unwrap_or("")
    }
}

/// During `window`, only `allowed_channels` may be watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityBlock {
    pub window: Interval,
    pub allowed_channels: Vec<ChannelId>,
}

impl PriorityBlock {
    pub fn allows(&self, channel: ChannelId) -> bool {
        self.allowed_channels.contains(&channel)
    }
}

/// Scoring parameters of a competition instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    /// `D`: base value for programs that declare none.
    pub default_value: i64,
    /// `R`: multiplier applied to each preference window's bonus unit.
    pub bonus_multiplier: i64,
    /// `S`: cost of one channel switch.
    pub switch_penalty: i64,
    /// `T`: cost of one early or late placement.
    pub early_late_penalty: i64,
    /// `O`: minutes a placement may start ahead of its canonical start.
    pub early_threshold: Minute,
    /// `E`: minutes a placement may start behind its canonical start.
    pub late_threshold: Minute,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            default_value: 0,
            bonus_multiplier: 1,
            switch_penalty: 0,
            early_late_penalty: 0,
            early_threshold: 0,
            late_threshold: 0,
        }
    }
}

/// The validated problem definition. Cross references are guaranteed to
/// resolve: every program's channel and every priority-block channel exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub channels: BTreeSet<ChannelId>,
    pub programs: BTreeMap<String, Program>,
    pub priority_blocks: Vec<PriorityBlock>,
    pub parameters: Parameters,
    pub opening_time: Option<Minute>,
    pub closing_time: Option<Minute>,
    /// Longest allowed run of same-genre programs in viewing order.
    pub max_consecutive_genre: Option<usize>,
    /// Minutes of window overlap a placement needs to earn a bonus.
    pub min_duration: Option<Minute>,
}

impl Instance {
    pub fn program(&self, id: &str) -> Option<&Program> {
        self.programs.get(id)
    }

    pub fn has_channel(&self, channel: ChannelId) -> bool {
        self.channels.contains(&channel)
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// One program assigned to one channel at one start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub program_id: String,
    pub channel_id: ChannelId,
    pub start: Minute,
}

/// The candidate schedule. Placement order is kept as submitted but never
/// trusted for chronology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub placements: Vec<Placement>,
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// Two placements on one channel share airtime.
    Overlap,
    /// A channel outside the block's allowed set is watched during the block.
    PriorityBlock,
    /// A placement airs outside the instance's opening/closing hours.
    OutsideWindow,
    /// Too many same-genre programs in a row.
    GenreRun,
    /// A placement names a program or channel the instance does not offer.
    UnknownReference,
    /// A program is placed more than once.
    DuplicatePlacement,
    /// The placed program already overlaps another program of its channel
    /// in the instance.
    InputOverlap,
}

/// A schedule defect found while grading. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub message: String,
    pub time: Minute,
    pub channel: ChannelId,
    /// Program ids implicated in the defect.
    #[serde(skip)]
    pub programs: Vec<String>,
}

impl Violation {
    pub fn new(
        kind: ViolationKind,
        time: Minute,
        channel: ChannelId,
        message: impl Into<String>,
    ) -> Self {
        Violation {
            kind,
            message: message.into(),
            time,
            channel,
            programs: Vec::new(),
        }
    }

    pub fn implicating<I, S>(mut self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.programs.extend(programs.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touching_intervals_do_not_intersect() {
        let a = Interval::new(600, 720);
        let b = Interval::new(720, 780);
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
        assert_eq!(a.overlap_len(&b), 0);
    }

    #[test]
    fn test_overlap_len() {
        let a = Interval::new(600, 720);
        let b = Interval::new(660, 780);
        assert!(a.intersects(&b));
        assert_eq!(a.overlap_len(&b), 60);
        assert!(a.contains(600));
        assert!(!a.contains(720));
    }

    #[test]
    fn test_clock_rendering() {
        assert_eq!(clock(540), "09:00");
        assert_eq!(clock(0), "00:00");
        assert_eq!(clock(1439), "23:59");
        assert_eq!(clock(1440), "t=1440");
        assert_eq!(clock(-5), "t=-5");
    }

    #[test]
    fn test_violation_serializes_type_tag() {
        let v = Violation::new(ViolationKind::PriorityBlock, 720, 1, "blocked")
            .implicating(["m1"]);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "PRIORITY_BLOCK");
        assert_eq!(json["time"], 720);
        assert_eq!(json["channel"], 1);
        assert!(json.get("programs").is_none());
    }
}
