use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use itertools::Itertools;
use thiserror::Error;

use crate::database::db_structs::{RatingAdjustment, RatingRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("commit rejected: {0}")]
    CommitRejected(String)
}

/// Narrow persistence contract consumed by the period coordinator. All
/// rating mutation funnels through `commit_period`, which must be
/// all-or-nothing: either every record of the period becomes visible or
/// none does.
#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn rating_record(&self, player_id: i32) -> Result<Option<RatingRecord>, StoreError>;

    /// Snapshot of every record ever stored, keyed by player id.
    async fn rating_records(&self) -> Result<HashMap<i32, RatingRecord>, StoreError>;

    async fn players_ever_seen(&self) -> Result<Vec<i32>, StoreError> {
        Ok(self.rating_records().await?.into_keys().collect())
    }

    /// The id the next rating period should open with.
    async fn next_period_id(&self) -> Result<i32, StoreError> {
        let max_committed = self
            .rating_records()
            .await?
            .values()
            .filter_map(|r| r.last_period)
            .max()
            .unwrap_or(0);

        Ok(max_committed + 1)
    }

    async fn commit_period(
        &mut self,
        period_id: i32,
        records: &[RatingRecord],
        adjustments: &[RatingAdjustment]
    ) -> Result<(), StoreError>;
}

/// IndexMap-backed store used by tests and local runs. Commits are
/// trivially atomic because the map is only touched after validation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: IndexMap<i32, RatingRecord>,
    adjustments: Vec<RatingAdjustment>
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }

    /// Records sorted by rating, best first.
    pub fn leaderboard(&self) -> Vec<&RatingRecord> {
        self.records
            .values()
            .sorted_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap())
            .collect()
    }

    pub fn adjustments_for(&self, player_id: i32) -> Vec<&RatingAdjustment> {
        self.adjustments.iter().filter(|a| a.player_id == player_id).collect()
    }
}

#[async_trait]
impl RatingStore for InMemoryStore {
    async fn rating_record(&self, player_id: i32) -> Result<Option<RatingRecord>, StoreError> {
        Ok(self.records.get(&player_id).cloned())
    }

    async fn rating_records(&self) -> Result<HashMap<i32, RatingRecord>, StoreError> {
        Ok(self.records.iter().map(|(id, r)| (*id, r.clone())).collect())
    }

    async fn commit_period(
        &mut self,
        period_id: i32,
        records: &[RatingRecord],
        adjustments: &[RatingAdjustment]
    ) -> Result<(), StoreError> {
        for record in records {
            if record.last_period != Some(period_id) {
                return Err(StoreError::CommitRejected(format!(
                    "record for player {} is stamped {:?}, expected period {}",
                    record.player_id, record.last_period, period_id
                )));
            }
        }

        for record in records {
            self.records.insert(record.player_id, record.clone());
        }
        self.adjustments.extend_from_slice(adjustments);

        Ok(())
    }
}
