use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::waypoint::datetime_from_seconds;
use crate::error::RecordError;

const E7: f64 = 10_000_000.0;

/// One element of the `locations` array of a location-history export.
///
/// Members other than the timestamp and the coordinates are ignored.
#[derive(Debug, Deserialize)]
pub struct LocationRecord {
    /// Milliseconds since the epoch. Older exports write it as a string.
    #[serde(rename = "timestampMs", default)]
    pub timestamp_ms: Option<MillisValue>,
    /// RFC 3339 timestamp used by newer exports instead of `timestampMs`.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "latitudeE7")]
    pub latitude_e7: Option<i64>,
    #[serde(rename = "longitudeE7")]
    pub longitude_e7: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MillisValue {
    String(String),
    Number(i64),
}

/// A decoded record ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub datetime: DateTime<Utc>,
}

impl LocationRecord {
    pub fn into_location(self) -> Result<TimelineLocation, RecordError> {
        let datetime = match (&self.timestamp_ms, self.timestamp) {
            (Some(ms), _) => from_millis(ms)?,
            (None, Some(ts)) if datetime_from_seconds(ts.timestamp()).is_some() => ts,
            (None, Some(ts)) => return Err(RecordError::TimestampOutOfRange(ts)),
            (None, None) => return Err(RecordError::MissingTimestamp),
        };
        let latitude = self
            .latitude_e7
            .ok_or(RecordError::MissingCoordinate("latitudeE7"))?;
        let longitude = self
            .longitude_e7
            .ok_or(RecordError::MissingCoordinate("longitudeE7"))?;

        Ok(TimelineLocation {
            latitude: latitude as f64 / E7,
            longitude: longitude as f64 / E7,
            datetime,
        })
    }
}

fn from_millis(value: &MillisValue) -> Result<DateTime<Utc>, RecordError> {
    let millis = match value {
        MillisValue::Number(ms) => *ms,
        MillisValue::String(s) => {
            s.trim()
                .parse::<i64>()
                .map_err(|source| RecordError::InvalidMillis {
                    value: s.clone(),
                    source,
                })?
        }
    };
    // floor, so pre-1970 timestamps round down as well
    datetime_from_seconds(millis.div_euclid(1000)).ok_or(RecordError::MillisOutOfRange(millis))
}
