use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::{
    database::db_structs::GameSession,
    model::{
        aggregator::{aggregate_session, AggregatorConfig},
        coordinator::{PeriodCoordinator, ProcessorError},
        store::RatingStore,
        structures::period::PeriodPolicy
    },
    utils::progress_utils::progress_bar
};

pub mod aggregator;
pub mod constants;
pub mod coordinator;
pub mod glicko;
pub mod store;
pub mod structures;

/// What a processing run did, for logging and assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    pub periods_committed: usize,
    pub outcomes_rated: usize,
    pub sessions_skipped: usize
}

/// Drives the full pipeline over a batch of finished sessions: aggregate
/// each session, group outcomes into rating periods per the boundary
/// policy, and commit period by period in session-start order.
///
/// Malformed sessions are logged and skipped; they never abort the run.
/// Only outcome-bearing sessions open a period, so solo practice does not
/// advance the period counter.
pub async fn process_sessions<S: RatingStore>(
    coordinator: &mut PeriodCoordinator<S>,
    sessions: &[GameSession],
    policy: PeriodPolicy,
    aggregator_config: &AggregatorConfig
) -> Result<ProcessingSummary, ProcessorError> {
    let mut sessions = sessions.to_vec();
    sessions.sort_by_key(|s| s.started_at);

    let bar = progress_bar(sessions.len() as u64, "Rating sessions".to_string());
    let mut summary = ProcessingSummary::default();
    let mut window_start: Option<DateTime<FixedOffset>> = None;

    for session in &sessions {
        if let Some(first) = window_start {
            if policy.is_boundary(first, session.started_at) {
                coordinator.close_current_period().await?;
                summary.periods_committed += 1;
                window_start = None;
            }
        }

        match aggregate_session(session, coordinator.current_period_id(), aggregator_config) {
            Ok(outcomes) => {
                if !outcomes.is_empty() {
                    summary.outcomes_rated += outcomes.len();
                    coordinator.submit(outcomes);
                    window_start.get_or_insert(session.started_at);
                }
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "skipping malformed session");
                summary.sessions_skipped += 1;
            }
        }

        bar.inc(1);
    }

    if window_start.is_some() {
        coordinator.close_current_period().await?;
        summary.periods_committed += 1;
    }

    bar.finish();
    info!(
        periods = summary.periods_committed,
        outcomes = summary.outcomes_rated,
        skipped = summary.sessions_skipped,
        "session processing complete"
    );

    Ok(summary)
}
