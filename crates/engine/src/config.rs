use serde::Deserialize;

use crate::model::Minute;

/// Which preference windows a placement qualifies for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusRule {
    /// The placement's start minute lies inside the window.
    #[default]
    StartInWindow,
    /// The airing shares at least `minutes` with the window.
    MinOverlap { minutes: Minute },
}

/// Time stamped on a priority-block violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReportTime {
    /// The end boundary of the breached block.
    #[default]
    BlockEnd,
    /// The first minute the offending placement airs inside the block.
    BreachStart,
}

/// Which placements feed the scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScope {
    /// Every placement that made it into the timeline.
    #[default]
    AllPlaced,
    /// Only placements not implicated in any violation.
    ConflictFree,
}

/// Grading policies left open by the competition rules. Every field has a
/// default, so `{}` is a complete configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GradingOptions {
    /// When unset, an instance declaring `min_duration` grades with
    /// `MinOverlap { minutes: min_duration }`, otherwise `StartInWindow`.
    pub bonus_rule: Option<BonusRule>,
    pub priority_block_time: BlockReportTime,
    pub score_scope: ScoreScope,
    /// Report placements of programs that already overlap another program
    /// of their channel in the instance itself.
    pub flag_input_overlaps: bool,
}

impl GradingOptions {
    /// The bonus rule in force for an instance with the given `min_duration`.
    pub fn effective_bonus_rule(&self, min_duration: Option<Minute>) -> BonusRule {
        self.bonus_rule
            .or(min_duration.map(|minutes| BonusRule::MinOverlap { minutes }))
            .unwrap_or_default()
    }
}
