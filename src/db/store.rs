//! Durable, deduplicated waypoint storage.
//!
//! The `(topic, latitude, longitude, time)` uniqueness constraint is enforced by the database.
//! A violation of it is an expected outcome of at-least-once delivery and re-run imports, so it
//! is reported as [`WriteOutcome::DuplicateSkipped`] instead of an error.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteQueryResult, SqliteStatement};
use sqlx::{Executor, Sqlite, Statement, Transaction};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{init_pool, queries, DbPool};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::waypoint::{Waypoint, WaypointRow};

/// Result of inserting a single waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new row was persisted with this id.
    Inserted(i64),
    /// The dedup key already existed; nothing was written.
    DuplicateSkipped,
    /// The insert failed for another reason and the row was skipped.
    Failed,
}

/// Per-row outcome counts of a bulk transaction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkStats {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl BulkStats {
    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Inserted(_) => self.inserted += 1,
            WriteOutcome::DuplicateSkipped => self.duplicates += 1,
            WriteOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaypointStore {
    pool: DbPool,
}

impl WaypointStore {
    /// Connects to the configured database and makes sure the waypoint table exists.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = init_pool(&config.url, config.max_connections, config.busy_timeout)
            .await
            .map_err(StoreError::Connect)?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: DbPool) -> Result<Self, StoreError> {
        sqlx::query(queries::CREATE_WAYPOINTS_TABLE)
            .execute(&pool)
            .await
            .map_err(StoreError::Schema)?;
        sqlx::query(queries::CREATE_TOPIC_TIME_INDEX)
            .execute(&pool)
            .await
            .map_err(StoreError::Schema)?;
        Ok(Self { pool })
    }

    /// Stores one waypoint in its own transaction.
    ///
    /// Returns `Inserted` or `DuplicateSkipped`; any other insert failure rolls back and is
    /// returned as [`StoreError::Write`]. The store stays usable either way.
    pub async fn write_one(
        &self,
        topic: &str,
        latitude: f64,
        longitude: f64,
        datetime: DateTime<Utc>,
    ) -> Result<WriteOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Begin)?;

        let result = sqlx::query(queries::INSERT_WAYPOINT)
            .bind(topic)
            .bind(latitude)
            .bind(longitude)
            .bind(datetime.timestamp())
            .execute(&mut *tx)
            .await;

        match classify(result) {
            Ok(WriteOutcome::Inserted(id)) => {
                tx.commit().await.map_err(StoreError::Commit)?;
                Ok(WriteOutcome::Inserted(id))
            }
            Ok(outcome) => {
                info!("Received duplicate location for topic '{}', ignoring it", topic);
                tx.rollback().await.map_err(StoreError::Write)?;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Unable to write waypoint for topic '{}': {}", topic, e);
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback after failed write also failed: {}", rollback);
                }
                Err(StoreError::Write(e))
            }
        }
    }

    /// Opens a long-lived write transaction with a prepared insert statement.
    pub async fn begin_bulk(&self) -> Result<BulkTransaction, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Begin)?;
        let insert = (&mut *tx)
            .prepare(queries::INSERT_WAYPOINT)
            .await
            .map_err(StoreError::Prepare)?;

        Ok(BulkTransaction {
            tx,
            insert,
            stats: BulkStats::default(),
        })
    }

    /// Waypoints of `topic` with `start <= time <= end`, oldest first, at most `max_count` rows.
    pub async fn query(
        &self,
        topic: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_count: u32,
    ) -> Result<Vec<Waypoint>, StoreError> {
        let rows: Vec<WaypointRow> = sqlx::query_as(queries::SELECT_WAYPOINTS_IN_RANGE)
            .bind(topic)
            .bind(start.timestamp())
            .bind(end.timestamp())
            .bind(i64::from(max_count))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Query)?;

        rows.into_iter().map(Waypoint::try_from).collect()
    }

    pub async fn list_topics(&self) -> Result<BTreeSet<String>, StoreError> {
        sqlx::query_scalar::<_, String>(queries::SELECT_TOPICS)
            .fetch(&self.pool)
            .try_collect()
            .await
            .map_err(StoreError::Query)
    }
}

/// An open bulk write. Dropping it without [`commit`](Self::commit) rolls everything back.
pub struct BulkTransaction {
    tx: Transaction<'static, Sqlite>,
    insert: SqliteStatement<'static>,
    stats: BulkStats,
}

impl BulkTransaction {
    /// Inserts one row inside the transaction. Duplicates and failures skip the row only.
    pub async fn write(
        &mut self,
        topic: &str,
        latitude: f64,
        longitude: f64,
        datetime: DateTime<Utc>,
    ) -> WriteOutcome {
        let result = self
            .insert
            .query()
            .bind(topic)
            .bind(latitude)
            .bind(longitude)
            .bind(datetime.timestamp())
            .execute(&mut *self.tx)
            .await;

        let outcome = match classify(result) {
            Ok(WriteOutcome::DuplicateSkipped) => {
                debug!(
                    "Skipping duplicate waypoint {} {} {} for topic '{}'",
                    latitude, longitude, datetime, topic
                );
                WriteOutcome::DuplicateSkipped
            }
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Unable to write waypoint for topic '{}': {}", topic, e);
                WriteOutcome::Failed
            }
        };
        self.stats.record(outcome);
        outcome
    }

    /// Commits every row written so far. On failure none of them become visible.
    pub async fn commit(self) -> Result<BulkStats, StoreError> {
        self.tx.commit().await.map_err(StoreError::Commit)?;
        Ok(self.stats)
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(StoreError::Write)
    }
}

fn classify(result: Result<SqliteQueryResult, sqlx::Error>) -> Result<WriteOutcome, sqlx::Error> {
    match result {
        Ok(done) => Ok(WriteOutcome::Inserted(done.last_insert_rowid())),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Ok(WriteOutcome::DuplicateSkipped)
        }
        Err(e) => Err(e),
    }
}
