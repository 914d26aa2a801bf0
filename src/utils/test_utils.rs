use chrono::{DateTime, FixedOffset, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::{
    database::db_structs::{FootballSide, GameSession, RaceEntry, RatingRecord, SessionResult, Split},
    model::structures::{
        game_mode::GameMode,
        match_outcome::{MatchOutcome, Opponent, OutcomeScore}
    }
};

const BOT_NAMES: [&str; 5] = ["Bot-Alpha", "Bot-Bravo", "Bot-Charlie", "Bot-Delta", "Bot-Echo"];

fn session_id() -> String {
    format!("s_{}", &Uuid::new_v4().simple().to_string()[..8])
}

pub fn generate_rating_record(player_id: i32, rating: f64, rating_deviation: f64, volatility: f64) -> RatingRecord {
    RatingRecord {
        player_id,
        rating,
        rating_deviation,
        volatility,
        last_period: None,
        games_played: 0
    }
}

pub fn generate_outcome(subject_id: i32, opponent_id: i32, score: OutcomeScore, period_id: i32) -> MatchOutcome {
    MatchOutcome {
        subject_id,
        opponent: Opponent::Player(opponent_id),
        score,
        period_id
    }
}

/// Evenly spaced tick splits with a jittered, monotonically growing score.
/// Seeded RNG keeps generated sessions reproducible.
pub fn generate_splits(duration_ms: i64, total_score: f64) -> Vec<Split> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let ticks = 10;

    (1..=ticks)
        .map(|i| {
            let progress = i as f64 / ticks as f64;
            let jitter: f64 = rng.random_range(-0.05..=0.05);

            Split {
                t_ms: duration_ms * i / ticks,
                lap: 1,
                score: (total_score * (progress + jitter)).max(0.0),
                note: None
            }
        })
        .collect()
}

pub fn generate_race_session(entries: &[(Option<i32>, i64)], reference_time_ms: Option<i64>) -> GameSession {
    generate_race_session_at(Utc::now().fixed_offset(), entries, reference_time_ms)
}

pub fn generate_race_session_at(
    started_at: DateTime<FixedOffset>,
    entries: &[(Option<i32>, i64)],
    reference_time_ms: Option<i64>
) -> GameSession {
    let mut bots = BOT_NAMES.iter().cycle();
    let entries = entries
        .iter()
        .map(|(player_id, finish_time_ms)| RaceEntry {
            player_id: *player_id,
            display_name: match player_id {
                Some(id) => format!("Player {}", id),
                None => bots.next().unwrap().to_string()
            },
            finish_time_ms: *finish_time_ms
        })
        .collect::<Vec<_>>();

    let duration_ms = entries.iter().map(|e| e.finish_time_ms).max().unwrap_or(60_000);

    GameSession {
        id: session_id(),
        mode: GameMode::Racing,
        started_at,
        duration_ms,
        splits: generate_splits(duration_ms, 100.0),
        result: Some(SessionResult::Race {
            entries,
            reference_time_ms
        })
    }
}

pub fn generate_football_session(home_ids: &[i32], home_goals: i32, away_ids: &[i32], away_goals: i32) -> GameSession {
    generate_football_session_at(Utc::now().fixed_offset(), home_ids, home_goals, away_ids, away_goals)
}

pub fn generate_football_session_at(
    started_at: DateTime<FixedOffset>,
    home_ids: &[i32],
    home_goals: i32,
    away_ids: &[i32],
    away_goals: i32
) -> GameSession {
    let duration_ms = 90_000;
    let mut splits = generate_splits(duration_ms, home_goals as f64);

    // Tag goal events the way the game records them
    for i in 0..home_goals {
        splits.push(Split {
            t_ms: duration_ms * (i as i64 + 1) / (home_goals as i64 + 1),
            lap: 1,
            score: (i + 1) as f64,
            note: Some("GOAL A FAVOR".to_string())
        });
    }
    for i in 0..away_goals {
        splits.push(Split {
            t_ms: duration_ms * (i as i64 + 1) / (away_goals as i64 + 1),
            lap: 2,
            score: home_goals as f64,
            note: Some("GOAL EN CONTRA".to_string())
        });
    }
    splits.sort_by_key(|s| s.t_ms);

    GameSession {
        id: session_id(),
        mode: GameMode::Football,
        started_at,
        duration_ms,
        splits,
        result: Some(SessionResult::Football {
            home: FootballSide {
                player_ids: home_ids.to_vec(),
                goals: home_goals
            },
            away: FootballSide {
                player_ids: away_ids.to_vec(),
                goals: away_goals
            }
        })
    }
}
