use std::collections::HashSet;

use thiserror::Error;

use crate::{
    database::db_structs::{FootballSide, GameSession, RaceEntry, SessionResult},
    model::structures::{
        game_mode::GameMode,
        match_outcome::{MatchOutcome, Opponent, OutcomeScore}
    }
};

#[derive(Debug, Error, PartialEq)]
pub enum MalformedSessionError {
    #[error("session {0} has no recorded splits")]
    EmptySplits(String),

    #[error("session {0} has no terminal result")]
    MissingResult(String),

    #[error("session {0} terminal result does not match mode {1:?}")]
    ModeMismatch(String, GameMode),

    #[error("session {0} lists player {1} more than once")]
    DuplicateEntrant(String, i32)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregatorConfig {
    /// When set, race sessions carrying a reference time also rate each
    /// tracked entrant against the synthetic environment opponent.
    /// Off by default: solo comparisons are rating-inert.
    pub rate_reference_times: bool
}

/// Turns a finished session into normalized outcomes for the given rating
/// period. Produces nothing for sessions without tracked opposition, and
/// refuses to guess on malformed input.
pub fn aggregate_session(
    session: &GameSession,
    period_id: i32,
    config: &AggregatorConfig
) -> Result<Vec<MatchOutcome>, MalformedSessionError> {
    if session.splits.is_empty() {
        return Err(MalformedSessionError::EmptySplits(session.id.clone()));
    }

    let result = session
        .result
        .as_ref()
        .ok_or_else(|| MalformedSessionError::MissingResult(session.id.clone()))?;

    match (session.mode, result) {
        (
            GameMode::Racing,
            SessionResult::Race {
                entries,
                reference_time_ms
            }
        ) => aggregate_race(session, entries, *reference_time_ms, period_id, config),
        (GameMode::Football, SessionResult::Football { home, away }) => {
            aggregate_football(session, home, away, period_id)
        }
        _ => Err(MalformedSessionError::ModeMismatch(session.id.clone(), session.mode))
    }
}

/// Finishing-order comparison: the lower recorded time wins, identical
/// times draw.
fn score_for_times(time_ms: i64, other_ms: i64) -> OutcomeScore {
    match time_ms.cmp(&other_ms) {
        std::cmp::Ordering::Less => OutcomeScore::Win,
        std::cmp::Ordering::Equal => OutcomeScore::Draw,
        std::cmp::Ordering::Greater => OutcomeScore::Loss
    }
}

fn aggregate_race(
    session: &GameSession,
    entries: &[RaceEntry],
    reference_time_ms: Option<i64>,
    period_id: i32,
    config: &AggregatorConfig
) -> Result<Vec<MatchOutcome>, MalformedSessionError> {
    let tracked: Vec<(i32, i64)> = entries
        .iter()
        .filter_map(|e| e.player_id.map(|id| (id, e.finish_time_ms)))
        .collect();

    let mut seen = HashSet::new();
    for (player_id, _) in &tracked {
        if !seen.insert(*player_id) {
            return Err(MalformedSessionError::DuplicateEntrant(session.id.clone(), *player_id));
        }
    }

    let mut outcomes = Vec::new();
    for (subject_id, subject_time) in &tracked {
        for (opponent_id, opponent_time) in &tracked {
            if subject_id == opponent_id {
                continue;
            }

            outcomes.push(MatchOutcome {
                subject_id: *subject_id,
                opponent: Opponent::Player(*opponent_id),
                score: score_for_times(*subject_time, *opponent_time),
                period_id
            });
        }

        if config.rate_reference_times {
            if let Some(reference) = reference_time_ms {
                outcomes.push(MatchOutcome {
                    subject_id: *subject_id,
                    opponent: Opponent::Environment,
                    score: score_for_times(*subject_time, reference),
                    period_id
                });
            }
        }
    }

    Ok(outcomes)
}

fn aggregate_football(
    session: &GameSession,
    home: &FootballSide,
    away: &FootballSide,
    period_id: i32
) -> Result<Vec<MatchOutcome>, MalformedSessionError> {
    let mut seen = HashSet::new();
    for player_id in home.player_ids.iter().chain(&away.player_ids) {
        if !seen.insert(*player_id) {
            return Err(MalformedSessionError::DuplicateEntrant(session.id.clone(), *player_id));
        }
    }

    let home_score = match home.goals.cmp(&away.goals) {
        std::cmp::Ordering::Greater => OutcomeScore::Win,
        std::cmp::Ordering::Equal => OutcomeScore::Draw,
        std::cmp::Ordering::Less => OutcomeScore::Loss
    };

    let mut outcomes = Vec::new();
    for subject_id in &home.player_ids {
        for opponent_id in &away.player_ids {
            outcomes.push(MatchOutcome {
                subject_id: *subject_id,
                opponent: Opponent::Player(*opponent_id),
                score: home_score,
                period_id
            });
            outcomes.push(MatchOutcome {
                subject_id: *opponent_id,
                opponent: Opponent::Player(*subject_id),
                score: home_score.inverted(),
                period_id
            });
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use crate::{
        database::db_structs::{FootballSide, SessionResult},
        model::{
            aggregator::{aggregate_session, AggregatorConfig, MalformedSessionError},
            structures::match_outcome::{MatchOutcome, Opponent, OutcomeScore}
        },
        utils::test_utils::{generate_football_session, generate_race_session}
    };

    fn score_of(outcomes: &[MatchOutcome], subject: i32, opponent: i32) -> OutcomeScore {
        outcomes
            .iter()
            .find(|o| o.subject_id == subject && o.opponent == Opponent::Player(opponent))
            .expect("expected outcome for pairing")
            .score
    }

    #[test]
    fn test_race_pairings_by_finish_time() {
        let session = generate_race_session(&[(Some(1), 61_500), (Some(2), 59_800), (None, 58_000)], None);
        let outcomes = aggregate_session(&session, 1, &AggregatorConfig::default()).unwrap();

        // Two tracked entrants, both directions; the bot is rating-inert
        assert_eq!(outcomes.len(), 2);
        assert_eq!(score_of(&outcomes, 2, 1), OutcomeScore::Win);
        assert_eq!(score_of(&outcomes, 1, 2), OutcomeScore::Loss);
    }

    #[test]
    fn test_race_identical_times_draw() {
        let session = generate_race_session(&[(Some(1), 60_000), (Some(2), 60_000)], None);
        let outcomes = aggregate_session(&session, 1, &AggregatorConfig::default()).unwrap();

        assert_eq!(score_of(&outcomes, 1, 2), OutcomeScore::Draw);
        assert_eq!(score_of(&outcomes, 2, 1), OutcomeScore::Draw);
    }

    #[test]
    fn test_solo_race_produces_no_outcomes() {
        let session = generate_race_session(&[(Some(1), 60_000), (None, 58_000), (None, 63_000)], None);
        let outcomes = aggregate_session(&session, 1, &AggregatorConfig::default()).unwrap();

        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_reference_time_requires_opt_in() {
        let session = generate_race_session(&[(Some(1), 58_000)], Some(60_000));

        let inert = aggregate_session(&session, 1, &AggregatorConfig::default()).unwrap();
        assert!(inert.is_empty());

        let config = AggregatorConfig {
            rate_reference_times: true
        };
        let rated = aggregate_session(&session, 1, &config).unwrap();

        assert_eq!(rated.len(), 1);
        assert_eq!(rated[0].opponent, Opponent::Environment);
        assert_eq!(rated[0].score, OutcomeScore::Win);
    }

    #[test]
    fn test_football_win_and_mirror() {
        let session = generate_football_session(&[1, 2], 3, &[3], 1);
        let outcomes = aggregate_session(&session, 5, &AggregatorConfig::default()).unwrap();

        // 2 home players x 1 away player, both directions
        assert_eq!(outcomes.len(), 4);
        assert_eq!(score_of(&outcomes, 1, 3), OutcomeScore::Win);
        assert_eq!(score_of(&outcomes, 2, 3), OutcomeScore::Win);
        assert_eq!(score_of(&outcomes, 3, 1), OutcomeScore::Loss);
        assert_eq!(score_of(&outcomes, 3, 2), OutcomeScore::Loss);
        assert!(outcomes.iter().all(|o| o.period_id == 5));
    }

    #[test]
    fn test_football_equal_goals_draw() {
        let session = generate_football_session(&[1], 2, &[2], 2);
        let outcomes = aggregate_session(&session, 1, &AggregatorConfig::default()).unwrap();

        assert_eq!(score_of(&outcomes, 1, 2), OutcomeScore::Draw);
        assert_eq!(score_of(&outcomes, 2, 1), OutcomeScore::Draw);
    }

    #[test]
    fn test_empty_splits_rejected() {
        let mut session = generate_race_session(&[(Some(1), 60_000), (Some(2), 61_000)], None);
        session.splits.clear();

        let result = aggregate_session(&session, 1, &AggregatorConfig::default());

        assert_eq!(result, Err(MalformedSessionError::EmptySplits(session.id.clone())));
    }

    #[test]
    fn test_missing_result_rejected() {
        let mut session = generate_race_session(&[(Some(1), 60_000)], None);
        session.result = None;

        let result = aggregate_session(&session, 1, &AggregatorConfig::default());

        assert_eq!(result, Err(MalformedSessionError::MissingResult(session.id.clone())));
    }

    #[test]
    fn test_mode_mismatch_rejected() {
        let mut session = generate_race_session(&[(Some(1), 60_000)], None);
        session.result = Some(SessionResult::Football {
            home: FootballSide {
                player_ids: vec![1],
                goals: 1
            },
            away: FootballSide {
                player_ids: vec![2],
                goals: 0
            }
        });

        let result = aggregate_session(&session, 1, &AggregatorConfig::default());

        assert!(matches!(result, Err(MalformedSessionError::ModeMismatch(_, _))));
    }

    #[test]
    fn test_duplicate_entrant_rejected() {
        let session = generate_race_session(&[(Some(1), 60_000), (Some(1), 61_000)], None);

        let result = aggregate_session(&session, 1, &AggregatorConfig::default());

        assert_eq!(result, Err(MalformedSessionError::DuplicateEntrant(session.id.clone(), 1)));
    }

    #[test]
    fn test_player_on_both_football_sides_rejected() {
        let session = generate_football_session(&[1, 2], 1, &[2], 0);

        let result = aggregate_session(&session, 1, &AggregatorConfig::default());

        assert_eq!(result, Err(MalformedSessionError::DuplicateEntrant(session.id.clone(), 2)));
    }
}
