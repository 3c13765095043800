use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;

use crate::error::StoreError;

/// 0000-01-01T00:00:00Z, the earliest instant a track document can carry.
const MIN_TRACK_SECONDS: i64 = -62_167_219_200;
/// 9999-12-31T23:59:59Z, the latest instant a track document can carry.
const MAX_TRACK_SECONDS: i64 = 253_402_300_799;

/// Unix seconds as a waypoint timestamp. Instants outside years 0000 to 9999 are rejected,
/// since exported tracks could not represent them.
pub fn datetime_from_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    if !(MIN_TRACK_SECONDS..=MAX_TRACK_SECONDS).contains(&seconds) {
        return None;
    }
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

/// A single stored location observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    pub id: i64,
    pub topic: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "time")]
    pub datetime: DateTime<Utc>,
}

/// Raw `waypoints` row; `time` is unix seconds.
#[derive(Debug, FromRow)]
pub struct WaypointRow {
    pub id: i64,
    pub topic: String,
    pub latitude: f64,
    pub longitude: f64,
    pub time: i64,
}

impl TryFrom<WaypointRow> for Waypoint {
    type Error = StoreError;

    fn try_from(row: WaypointRow) -> Result<Self, Self::Error> {
        let datetime =
            DateTime::<Utc>::from_timestamp(row.time, 0).ok_or(StoreError::InvalidTimestamp {
                id: row.id,
                seconds: row.time,
            })?;
        Ok(Self {
            id: row.id,
            topic: row.topic,
            latitude: row.latitude,
            longitude: row.longitude,
            datetime,
        })
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.6} - {:.6} @ {}",
            self.topic,
            self.latitude,
            self.longitude,
            self.datetime.to_rfc3339()
        )
    }
}
