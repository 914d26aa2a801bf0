use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use itertools::Itertools;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    database::db_structs::{RatingAdjustment, RatingRecord},
    model::{
        constants::{DEFAULT_VOLATILITY, REFERENCE_RATING, REFERENCE_RATING_DEVIATION},
        glicko::{self, Glicko2Config, RatingError, RatingTriple},
        store::{RatingStore, StoreError},
        structures::{
            match_outcome::{MatchOutcome, Opponent, OutcomeScore},
            period::{PeriodState, RatingPeriod},
            rating_adjustment_type::RatingAdjustmentType
        }
    }
};

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Rating(#[from] RatingError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("period {period_id} cannot be processed from state {state:?}")]
    InvalidState { period_id: i32, state: PeriodState },

    #[error("record for player {player_id} was last updated in period {last_period}; refusing to apply period {period_id}")]
    PeriodOrdering {
        player_id: i32,
        last_period: i32,
        period_id: i32
    },

    #[error("period {0} is failed and must be retried before a later period commits")]
    FailedPeriodPending(i32),

    #[error("no failed period to retry")]
    NothingToRetry
}

/// What a committed period did, for logging and assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSummary {
    pub period_id: i32,
    pub players_rated: usize,
    pub players_decayed: usize
}

/// A period whose commit failed. Outcomes and the pre-period snapshot are
/// retained unchanged, so a retry recomputes the identical result.
struct FailedPeriod {
    period: RatingPeriod,
    snapshot: HashMap<i32, RatingRecord>
}

/// Orchestrates one rating period at a time: collect outcomes while the
/// period is open, then snapshot, compute every touched player exactly
/// once, and commit the whole batch atomically.
pub struct PeriodCoordinator<S: RatingStore> {
    store: S,
    config: Glicko2Config,
    current: RatingPeriod,
    failed: Option<FailedPeriod>
}

impl<S: RatingStore> PeriodCoordinator<S> {
    pub fn new(store: S, config: Glicko2Config, first_period_id: i32) -> PeriodCoordinator<S> {
        PeriodCoordinator {
            store,
            config,
            current: RatingPeriod::open(first_period_id),
            failed: None
        }
    }

    pub fn current_period_id(&self) -> i32 {
        self.current.id
    }

    pub fn has_failed_period(&self) -> bool {
        self.failed.is_some()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Admits outcomes to the open period. An outcome stamped for an
    /// earlier period arrived after that period sealed; it is restamped
    /// and simply joins the open one.
    pub fn submit(&mut self, outcomes: Vec<MatchOutcome>) {
        for mut outcome in outcomes {
            if outcome.period_id != self.current.id {
                debug!(
                    subject_id = outcome.subject_id,
                    stamped = outcome.period_id,
                    open = self.current.id,
                    "late outcome deferred to open period"
                );
                outcome.period_id = self.current.id;
            }
            self.current.outcomes.push(outcome);
        }
    }

    /// Seals the open period and runs it through the state machine:
    /// Snapshotting -> Computing -> Committing -> Closed. The next period
    /// opens regardless of the outcome; a failed commit is retained for
    /// retry and blocks later commits until it succeeds.
    pub async fn close_current_period(&mut self) -> Result<PeriodSummary, ProcessorError> {
        if let Some(failed) = &self.failed {
            return Err(ProcessorError::FailedPeriodPending(failed.period.id));
        }
        if !self.current.is_open() {
            return Err(ProcessorError::InvalidState {
                period_id: self.current.id,
                state: self.current.state
            });
        }

        let period_id = self.current.id;

        self.current.state = PeriodState::Snapshotting;
        let snapshot = match self.build_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Nothing was computed or written; the period may be sealed again
                self.current.state = PeriodState::Open;
                return Err(e.into());
            }
        };

        for record in snapshot.values() {
            if let Some(last_period) = record.last_period {
                if last_period >= period_id {
                    self.current.state = PeriodState::Open;
                    return Err(ProcessorError::PeriodOrdering {
                        player_id: record.player_id,
                        last_period,
                        period_id
                    });
                }
            }
        }

        self.current.state = PeriodState::Computing;
        let now = Utc::now().fixed_offset();
        let computed = Self::compute(&snapshot, &self.current.outcomes, period_id, &self.config, now);

        let (records, adjustments, summary) = match computed {
            Ok(result) => result,
            Err(e) => {
                self.fail_current(snapshot);
                return Err(e);
            }
        };

        self.current.state = PeriodState::Committing;
        if let Err(e) = self.store.commit_period(period_id, &records, &adjustments).await {
            self.fail_current(snapshot);
            return Err(e.into());
        }

        self.current.state = PeriodState::Closed;
        info!(
            period_id,
            players_rated = summary.players_rated,
            players_decayed = summary.players_decayed,
            "rating period committed"
        );

        self.current = RatingPeriod::open(period_id + 1);
        Ok(summary)
    }

    /// Re-runs a failed period from its retained snapshot. Computation is
    /// pure, so the retry produces the same records the failed attempt did.
    pub async fn retry_failed_period(&mut self) -> Result<PeriodSummary, ProcessorError> {
        let mut failed = self.failed.take().ok_or(ProcessorError::NothingToRetry)?;
        let period_id = failed.period.id;

        failed.period.state = PeriodState::Computing;
        let now = Utc::now().fixed_offset();
        let computed = Self::compute(&failed.snapshot, &failed.period.outcomes, period_id, &self.config, now);

        let (records, adjustments, summary) = match computed {
            Ok(result) => result,
            Err(e) => {
                failed.period.state = PeriodState::Failed;
                self.failed = Some(failed);
                return Err(e);
            }
        };

        failed.period.state = PeriodState::Committing;
        if let Err(e) = self.store.commit_period(period_id, &records, &adjustments).await {
            failed.period.state = PeriodState::Failed;
            self.failed = Some(failed);
            return Err(e.into());
        }

        info!(period_id, "failed rating period committed on retry");
        Ok(summary)
    }

    fn fail_current(&mut self, snapshot: HashMap<i32, RatingRecord>) {
        let period_id = self.current.id;
        let mut period = std::mem::replace(&mut self.current, RatingPeriod::open(period_id + 1));
        period.state = PeriodState::Failed;
        self.failed = Some(FailedPeriod { period, snapshot });
    }

    /// Pre-period state for every player ever seen plus defaults for
    /// players sighted for the first time in this period's outcomes.
    async fn build_snapshot(&self) -> Result<HashMap<i32, RatingRecord>, StoreError> {
        let mut snapshot = self.store.rating_records().await?;

        for outcome in &self.current.outcomes {
            snapshot
                .entry(outcome.subject_id)
                .or_insert_with(|| RatingRecord::new_default(outcome.subject_id));

            if let Opponent::Player(opponent_id) = outcome.opponent {
                snapshot
                    .entry(opponent_id)
                    .or_insert_with(|| RatingRecord::new_default(opponent_id));
            }
        }

        Ok(snapshot)
    }

    fn environment_triple() -> RatingTriple {
        RatingTriple {
            rating: REFERENCE_RATING,
            deviation: REFERENCE_RATING_DEVIATION,
            volatility: DEFAULT_VOLATILITY
        }
    }

    /// Pure computation step: one engine invocation per player against the
    /// immutable snapshot. Safe to parallelize because nothing here reads
    /// a partially-updated neighbor.
    fn compute(
        snapshot: &HashMap<i32, RatingRecord>,
        outcomes: &[MatchOutcome],
        period_id: i32,
        config: &Glicko2Config,
        now: DateTime<FixedOffset>
    ) -> Result<(Vec<RatingRecord>, Vec<RatingAdjustment>, PeriodSummary), ProcessorError> {
        let mut grouped: IndexMap<i32, Vec<&MatchOutcome>> = IndexMap::new();
        for outcome in outcomes {
            grouped.entry(outcome.subject_id).or_default().push(outcome);
        }

        let player_ids = snapshot.keys().copied().sorted().collect_vec();

        let results: Result<Vec<(RatingRecord, Vec<RatingAdjustment>)>, ProcessorError> = player_ids
            .par_iter()
            .map(|player_id| {
                let record = &snapshot[player_id];
                let player_outcomes = grouped.get(player_id).map(Vec::as_slice).unwrap_or(&[]);

                Self::compute_player(record, player_outcomes, snapshot, period_id, config, now)
            })
            .collect();

        let results = results?;
        let players_rated = grouped.len();
        let players_decayed = results.len() - players_rated;

        let mut records = Vec::with_capacity(results.len());
        let mut adjustments = Vec::new();
        for (record, player_adjustments) in results {
            records.push(record);
            adjustments.extend(player_adjustments);
        }

        Ok((records, adjustments, PeriodSummary {
            period_id,
            players_rated,
            players_decayed
        }))
    }

    fn compute_player(
        record: &RatingRecord,
        player_outcomes: &[&MatchOutcome],
        snapshot: &HashMap<i32, RatingRecord>,
        period_id: i32,
        config: &Glicko2Config,
        now: DateTime<FixedOffset>
    ) -> Result<(RatingRecord, Vec<RatingAdjustment>), ProcessorError> {
        let before = RatingTriple::from(record);

        let mut opponents = Vec::with_capacity(player_outcomes.len());
        let mut scores: Vec<OutcomeScore> = Vec::with_capacity(player_outcomes.len());
        for outcome in player_outcomes {
            let triple = match outcome.opponent {
                Opponent::Player(opponent_id) => RatingTriple::from(&snapshot[&opponent_id]),
                Opponent::Environment => Self::environment_triple()
            };
            opponents.push(triple);
            scores.push(outcome.score);
        }

        let after = glicko::rate(&before, &opponents, &scores, config)?;

        let updated = RatingRecord {
            player_id: record.player_id,
            rating: after.rating,
            rating_deviation: after.deviation,
            volatility: after.volatility,
            last_period: Some(period_id),
            games_played: record.games_played + player_outcomes.len() as i32
        };

        let adjustment_type = if player_outcomes.is_empty() {
            RatingAdjustmentType::Decay
        } else {
            RatingAdjustmentType::Rated
        };

        let mut adjustments = Vec::with_capacity(2);
        if record.last_period.is_none() && record.games_played == 0 {
            // First sighting: record the default starting point
            adjustments.push(RatingAdjustment {
                player_id: record.player_id,
                period_id,
                adjustment_type: RatingAdjustmentType::Initial,
                rating_before: record.rating,
                rating_after: record.rating,
                rating_deviation_before: record.rating_deviation,
                rating_deviation_after: record.rating_deviation,
                volatility_before: record.volatility,
                volatility_after: record.volatility,
                timestamp: now
            });
        }
        adjustments.push(RatingAdjustment {
            player_id: record.player_id,
            period_id,
            adjustment_type,
            rating_before: before.rating,
            rating_after: updated.rating,
            rating_deviation_before: before.deviation,
            rating_deviation_after: updated.rating_deviation,
            volatility_before: before.volatility,
            volatility_after: updated.volatility,
            timestamp: now
        });

        Ok((updated, adjustments))
    }
}
