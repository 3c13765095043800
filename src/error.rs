use chrono::{DateTime, Utc};
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unable to open database connection: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("unable to create waypoint table: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("unable to open transaction: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("unable to prepare insert statement: {0}")]
    Prepare(#[source] sqlx::Error),

    #[error("unable to write waypoint: {0}")]
    Write(#[source] sqlx::Error),

    #[error("unable to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("unable to query waypoints: {0}")]
    Query(#[source] sqlx::Error),

    #[error("waypoint {id} has out of range timestamp {seconds}")]
    InvalidTimestamp { id: i64, seconds: i64 },
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl StoreError {
    /// True when the write lost the race for the database lock and can be retried as is.
    pub fn is_busy(&self) -> bool {
        let source = match self {
            StoreError::Begin(e) | StoreError::Write(e) | StoreError::Commit(e) => e,
            _ => return false,
        };
        match source {
            sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                // extended result codes keep the primary code in the low byte
                .map_or(false, |code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("unable to open import file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The input stopped decoding after `processed` records; nothing was committed.
    #[error("malformed import input after {processed} records: {source}")]
    Decode {
        processed: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("import decoder stopped unexpectedly: {0}")]
    Decoder(#[from] tokio::task::JoinError),
}

/// A location-history record that decoded as JSON but cannot become a waypoint.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("location record has no timestamp")]
    MissingTimestamp,

    #[error("location record has no {0}")]
    MissingCoordinate(&'static str),

    #[error("invalid timestampMs '{value}': {source}")]
    InvalidMillis {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("timestampMs {0} is outside years 0000 to 9999")]
    MillisOutOfRange(i64),

    #[error("timestamp {0} is outside years 0000 to 9999")]
    TimestampOutOfRange(DateTime<Utc>),
}
