use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::model::{
    constants::{DEFAULT_RATING, DEFAULT_RATING_DEVIATION, DEFAULT_VOLATILITY},
    structures::{game_mode::GameMode, rating_adjustment_type::RatingAdjustmentType}
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: i32,
    pub username: String
}

/// One timestamped in-game event. Tick splits carry no note; goals,
/// shots and power-up pickups are tagged (e.g. `GOAL A FAVOR`,
/// `POWERUP_TURBO`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Split {
    pub t_ms: i64,
    pub lap: i32,
    pub score: f64,
    pub note: Option<String>
}

/// A race participant's terminal result. `player_id` is `None` for
/// untracked entrants (bots), which never enter the rating pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceEntry {
    pub player_id: Option<i32>,
    pub display_name: String,
    pub finish_time_ms: i64
}

/// One side of a football session: tracked roster plus its goal count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootballSide {
    pub player_ids: Vec<i32>,
    pub goals: i32
}

/// Terminal result of a finished session, shaped per mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionResult {
    Race {
        entries: Vec<RaceEntry>,
        reference_time_ms: Option<i64>
    },
    Football {
        home: FootballSide,
        away: FootballSide
    }
}

/// A finished game session as handed over by the game/session layer:
/// identity, mode, the ordered split trail and the terminal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub mode: GameMode,
    pub started_at: DateTime<FixedOffset>,
    pub duration_ms: i64,
    pub splits: Vec<Split>,
    pub result: Option<SessionResult>
}

/// A player's current skill estimate. Created with defaults on first
/// sighting, mutated only by a committed rating period, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub player_id: i32,
    pub rating: f64,
    pub rating_deviation: f64,
    pub volatility: f64,
    pub last_period: Option<i32>,
    pub games_played: i32
}

impl RatingRecord {
    pub fn new_default(player_id: i32) -> RatingRecord {
        RatingRecord {
            player_id,
            rating: DEFAULT_RATING,
            rating_deviation: DEFAULT_RATING_DEVIATION,
            volatility: DEFAULT_VOLATILITY,
            last_period: None,
            games_played: 0
        }
    }
}

/// Audit row for one committed change to a rating record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingAdjustment {
    pub player_id: i32,
    pub period_id: i32,
    pub adjustment_type: RatingAdjustmentType,
    pub rating_before: f64,
    pub rating_after: f64,
    pub rating_deviation_before: f64,
    pub rating_deviation_after: f64,
    pub volatility_before: f64,
    pub volatility_after: f64,
    pub timestamp: DateTime<FixedOffset>
}

#[cfg(test)]
mod tests {
    use crate::database::db_structs::{GameSession, RatingRecord, SessionResult};
    use crate::model::constants::{DEFAULT_RATING, DEFAULT_RATING_DEVIATION, DEFAULT_VOLATILITY};
    use crate::utils::test_utils::generate_race_session;

    #[test]
    fn test_default_record() {
        let record = RatingRecord::new_default(7);

        assert_eq!(record.player_id, 7);
        assert_eq!(record.rating, DEFAULT_RATING);
        assert_eq!(record.rating_deviation, DEFAULT_RATING_DEVIATION);
        assert_eq!(record.volatility, DEFAULT_VOLATILITY);
        assert_eq!(record.last_period, None);
        assert_eq!(record.games_played, 0);
    }

    #[test]
    fn test_session_json_round_trip() {
        let session = generate_race_session(&[(Some(1), 61_000), (None, 59_000)], Some(60_000));

        let json = serde_json::to_string(&session).unwrap();
        let parsed: GameSession = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, session.id);
        assert_eq!(parsed.mode, session.mode);
        assert_eq!(parsed.splits.len(), session.splits.len());
        match parsed.result.unwrap() {
            SessionResult::Race { entries, .. } => assert_eq!(entries.len(), 2),
            _ => panic!("expected race result")
        }
    }
}
