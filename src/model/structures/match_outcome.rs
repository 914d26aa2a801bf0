use serde::{Deserialize, Serialize};

/// The score of a single outcome, restricted to the three values Glicko-2
/// is defined over. Anything outside {0, 0.5, 1} is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeScore {
    Loss,
    Draw,
    Win
}

impl OutcomeScore {
    pub fn value(&self) -> f64 {
        match self {
            OutcomeScore::Loss => 0.0,
            OutcomeScore::Draw => 0.5,
            OutcomeScore::Win => 1.0
        }
    }

    /// The same outcome seen from the other side of the pairing.
    pub fn inverted(&self) -> OutcomeScore {
        match self {
            OutcomeScore::Loss => OutcomeScore::Win,
            OutcomeScore::Draw => OutcomeScore::Draw,
            OutcomeScore::Win => OutcomeScore::Loss
        }
    }
}

/// The other side of an outcome: a tracked player, or the synthetic
/// environment opponent used for reference-time comparisons. The
/// environment has a fixed rating triple and is never updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opponent {
    Player(i32),
    Environment
}

/// One normalized pairing produced by the outcome aggregator and consumed
/// by the period coordinator. Ephemeral; never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub subject_id: i32,
    pub opponent: Opponent,
    pub score: OutcomeScore,
    pub period_id: i32
}
