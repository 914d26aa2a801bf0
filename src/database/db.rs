use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use itertools::Itertools;
use postgres_types::ToSql;
use tokio_postgres::{Client, Error, NoTls, Row};
use tracing::{error, info, warn};

use crate::{
    database::db_structs::{FootballSide, GameSession, Player, RaceEntry, RatingAdjustment, RatingRecord, SessionResult, Split},
    model::{
        store::{RatingStore, StoreError},
        structures::game_mode::GameMode
    }
};

pub struct DbClient {
    client: Client
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient { client })
    }

    /// Fetches every session not yet covered by a committed rating period,
    /// with its splits and entrant rows linked back in, ordered by start
    /// time. Sessions with an unknown mode are logged and dropped.
    pub async fn get_unrated_sessions(&self) -> Result<Vec<GameSession>, StoreError> {
        info!("Fetching unrated sessions...");

        let session_rows = self
            .client
            .query(
                "SELECT id, mode, started_at, duration_ms, reference_time_ms \
                FROM sessions WHERE rated = FALSE ORDER BY started_at, id",
                &[]
            )
            .await?;

        let mut sessions: IndexMap<String, GameSession> = IndexMap::new();
        let mut reference_times: HashMap<String, Option<i64>> = HashMap::new();

        for row in &session_rows {
            let id: String = row.get("id");
            let mode_str: String = row.get("mode");

            let mode = match GameMode::try_from(mode_str.as_str()) {
                Ok(mode) => mode,
                Err(_) => {
                    warn!(session_id = %id, mode = %mode_str, "unknown session mode, dropping session");
                    continue;
                }
            };

            reference_times.insert(id.clone(), row.get("reference_time_ms"));
            sessions.insert(id.clone(), GameSession {
                id,
                mode,
                started_at: row.get("started_at"),
                duration_ms: row.get("duration_ms"),
                splits: Vec::new(),
                result: None
            });
        }

        let split_rows = self
            .client
            .query(
                "SELECT sp.session_id, sp.t_ms, sp.lap, sp.score, sp.note \
                FROM splits sp JOIN sessions s ON s.id = sp.session_id \
                WHERE s.rated = FALSE ORDER BY sp.session_id, sp.t_ms",
                &[]
            )
            .await?;

        for row in &split_rows {
            let session_id: String = row.get("session_id");
            if let Some(session) = sessions.get_mut(&session_id) {
                session.splits.push(Self::split_from_row(row));
            }
        }

        let entrant_rows = self
            .client
            .query(
                "SELECT se.session_id, se.player_id, se.display_name, se.side, se.finish_time_ms, se.goals \
                FROM session_entrants se JOIN sessions s ON s.id = se.session_id \
                WHERE s.rated = FALSE ORDER BY se.id",
                &[]
            )
            .await?;

        let mut entrants_by_session: IndexMap<String, Vec<&Row>> = IndexMap::new();
        for row in &entrant_rows {
            entrants_by_session
                .entry(row.get::<_, String>("session_id"))
                .or_default()
                .push(row);
        }

        for (session_id, rows) in entrants_by_session {
            let Some(session) = sessions.get_mut(&session_id) else {
                continue;
            };

            session.result = match session.mode {
                GameMode::Racing => {
                    Self::race_result_from_rows(&session_id, &rows, reference_times[&session_id])
                }
                GameMode::Football => Self::football_result_from_rows(&rows)
            };
        }

        info!("Fetched {} unrated sessions", sessions.len());
        Ok(sessions.into_values().collect_vec())
    }

    fn split_from_row(row: &Row) -> Split {
        Split {
            t_ms: row.get("t_ms"),
            lap: row.get("lap"),
            score: row.get("score"),
            note: row.get("note")
        }
    }

    fn race_result_from_rows(session_id: &str, rows: &[&Row], reference_time_ms: Option<i64>) -> Option<SessionResult> {
        let mut entries = Vec::with_capacity(rows.len());

        for row in rows {
            let finish_time_ms: Option<i64> = row.get("finish_time_ms");
            match finish_time_ms {
                Some(finish_time_ms) => entries.push(RaceEntry {
                    player_id: row.get("player_id"),
                    display_name: row.get("display_name"),
                    finish_time_ms
                }),
                None => {
                    // A race entrant with no recorded time never finished
                    warn!(session_id, "race entrant without finish time ignored");
                }
            }
        }

        if entries.is_empty() {
            return None;
        }

        Some(SessionResult::Race {
            entries,
            reference_time_ms
        })
    }

    fn football_result_from_rows(rows: &[&Row]) -> Option<SessionResult> {
        let mut home = FootballSide {
            player_ids: Vec::new(),
            goals: 0
        };
        let mut away = FootballSide {
            player_ids: Vec::new(),
            goals: 0
        };
        let mut saw_home = false;
        let mut saw_away = false;

        for row in rows {
            let side: Option<String> = row.get("side");
            let goals: Option<i32> = row.get("goals");
            let player_id: Option<i32> = row.get("player_id");

            let (side_record, seen) = match side.as_deref() {
                Some("home") => (&mut home, &mut saw_home),
                Some("away") => (&mut away, &mut saw_away),
                _ => continue
            };

            *seen = true;
            if let Some(player_id) = player_id {
                side_record.player_ids.push(player_id);
            }
            if let Some(goals) = goals {
                side_record.goals = goals;
            }
        }

        if !saw_home || !saw_away {
            return None;
        }

        Some(SessionResult::Football { home, away })
    }

    pub async fn get_players(&self) -> Result<Vec<Player>, StoreError> {
        let rows = self
            .client
            .query("SELECT id, name FROM players ORDER BY id", &[])
            .await?;

        Ok(rows
            .iter()
            .map(|row| Player {
                id: row.get("id"),
                username: row.get("name")
            })
            .collect_vec())
    }

    /// Flags sessions as covered by committed rating periods. Called only
    /// after every period touching them has committed.
    pub async fn mark_sessions_rated(&self, session_ids: &[String]) -> Result<(), StoreError> {
        self.client
            .execute("UPDATE sessions SET rated = TRUE WHERE id = ANY($1)", &[&session_ids])
            .await?;

        Ok(())
    }

    fn rating_record_from_row(row: &Row) -> RatingRecord {
        RatingRecord {
            player_id: row.get("player_id"),
            rating: row.get("rating"),
            rating_deviation: row.get("rating_deviation"),
            volatility: row.get("volatility"),
            last_period: row.get("last_period"),
            games_played: row.get("games_played")
        }
    }
}

#[async_trait]
impl RatingStore for DbClient {
    async fn rating_record(&self, player_id: i32) -> Result<Option<RatingRecord>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT player_id, rating, rating_deviation, volatility, last_period, games_played \
                FROM ratings WHERE player_id = $1",
                &[&player_id]
            )
            .await?;

        Ok(row.map(|row| Self::rating_record_from_row(&row)))
    }

    async fn rating_records(&self) -> Result<HashMap<i32, RatingRecord>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT player_id, rating, rating_deviation, volatility, last_period, games_played FROM ratings",
                &[]
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let record = Self::rating_record_from_row(row);
                (record.player_id, record)
            })
            .collect())
    }

    async fn next_period_id(&self) -> Result<i32, StoreError> {
        let row = self
            .client
            .query_one("SELECT COALESCE(MAX(last_period), 0) + 1 AS next FROM ratings", &[])
            .await?;

        Ok(row.get("next"))
    }

    /// One transaction per period: every rating upsert and audit row
    /// lands, or none do.
    async fn commit_period(
        &mut self,
        period_id: i32,
        records: &[RatingRecord],
        adjustments: &[RatingAdjustment]
    ) -> Result<(), StoreError> {
        let transaction = self.client.transaction().await?;

        let upsert = transaction
            .prepare(
                "INSERT INTO ratings (player_id, rating, rating_deviation, volatility, last_period, games_played) \
                VALUES ($1, $2, $3, $4, $5, $6) \
                ON CONFLICT (player_id) DO UPDATE SET \
                    rating = EXCLUDED.rating, \
                    rating_deviation = EXCLUDED.rating_deviation, \
                    volatility = EXCLUDED.volatility, \
                    last_period = EXCLUDED.last_period, \
                    games_played = EXCLUDED.games_played"
            )
            .await?;

        for record in records {
            let params: [&(dyn ToSql + Sync); 6] = [
                &record.player_id,
                &record.rating,
                &record.rating_deviation,
                &record.volatility,
                &record.last_period,
                &record.games_played
            ];
            transaction.execute(&upsert, &params).await?;
        }

        let insert_adjustment = transaction
            .prepare(
                "INSERT INTO rating_history (player_id, period_id, adjustment_type, \
                    rating_before, rating_after, rating_deviation_before, rating_deviation_after, \
                    volatility_before, volatility_after, timestamp) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            )
            .await?;

        for adjustment in adjustments {
            let adjustment_type = adjustment.adjustment_type as i32;
            let params: [&(dyn ToSql + Sync); 10] = [
                &adjustment.player_id,
                &adjustment.period_id,
                &adjustment_type,
                &adjustment.rating_before,
                &adjustment.rating_after,
                &adjustment.rating_deviation_before,
                &adjustment.rating_deviation_after,
                &adjustment.volatility_before,
                &adjustment.volatility_after,
                &adjustment.timestamp
            ];
            transaction.execute(&insert_adjustment, &params).await?;
        }

        transaction.commit().await?;
        info!(period_id, records = records.len(), "rating period persisted");

        Ok(())
    }
}
