use chrono::{DateTime, FixedOffset};

use crate::model::structures::match_outcome::MatchOutcome;

/// Lifecycle of one rating period. Transitions only move forward;
/// `Failed` periods are retried from their retained snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodState {
    Open,
    Snapshotting,
    Computing,
    Committing,
    Closed,
    Failed
}

/// A batch of outcomes rated together. Outcomes may only be added while
/// the period is `Open`; anything arriving later belongs to a later period.
#[derive(Debug, Clone)]
pub struct RatingPeriod {
    pub id: i32,
    pub state: PeriodState,
    pub outcomes: Vec<MatchOutcome>
}

impl RatingPeriod {
    pub fn open(id: i32) -> RatingPeriod {
        RatingPeriod {
            id,
            state: PeriodState::Open,
            outcomes: Vec::new()
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == PeriodState::Open
    }
}

/// When a period boundary falls. The original game rates after every
/// finished session; the wall-clock window groups sessions instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodPolicy {
    PerSession,
    FixedWindow { minutes: i64 }
}

impl PeriodPolicy {
    /// True when `next` no longer belongs to the period that `first`
    /// opened, i.e. the open period must be sealed before admitting it.
    pub fn is_boundary(&self, first: DateTime<FixedOffset>, next: DateTime<FixedOffset>) -> bool {
        match self {
            PeriodPolicy::PerSession => true,
            PeriodPolicy::FixedWindow { minutes } => next - first >= chrono::Duration::minutes(*minutes)
        }
    }
}
