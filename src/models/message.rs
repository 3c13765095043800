use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::waypoint::datetime_from_seconds;

/// Location message published by the OwnTracks app.
///
/// Only `lat`, `lon` and `tst` are persisted; the remaining fields are device metadata that is
/// only logged.
#[derive(Debug, Deserialize)]
pub struct OwnTracksMessage {
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    #[serde(rename = "lat", default, deserialize_with = "parse_f64_option")]
    pub latitude: Option<f64>,
    #[serde(rename = "lon", default, deserialize_with = "parse_f64_option")]
    pub longitude: Option<f64>,
    #[serde(rename = "tst", default, deserialize_with = "parse_i64_option")]
    pub timestamp: Option<i64>,
    #[serde(rename = "batt", default, deserialize_with = "parse_f64_option")]
    pub battery: Option<f64>,
    #[serde(rename = "acc", default, deserialize_with = "parse_f64_option")]
    pub accuracy: Option<f64>,
    #[serde(rename = "alt", default, deserialize_with = "parse_f64_option")]
    pub altitude: Option<f64>,
    #[serde(rename = "t")]
    pub trigger: Option<String>,
    #[serde(rename = "conn")]
    pub connectivity: Option<String>,
    #[serde(rename = "tid")]
    pub tracker_id: Option<String>,
}

impl OwnTracksMessage {
    /// Messages without `_type` are treated as locations, like older OwnTracks releases send them.
    pub fn is_location(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == "location")
    }

    /// `tst` as a UTC timestamp. Zero and values outside years 0000 to 9999 count as missing.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .filter(|tst| *tst != 0)
            .and_then(datetime_from_seconds)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber<T> {
    String(String),
    Number(T),
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    parse_option(deserializer)
}

fn parse_i64_option<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    parse_option(deserializer)
}

fn parse_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let v: Option<StringOrNumber<T>> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrNumber::Number(n)) => Ok(Some(n)),
        Some(StringOrNumber::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<T>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing_location_payload() {
        let payload = r#"
        {
            "_type": "location",
            "acc": 12,
            "alt": 48,
            "batt": 81,
            "bs": 1,
            "conn": "w",
            "lat": 52.520008,
            "lon": 13.404954,
            "p": 101.2,
            "t": "u",
            "tid": "dp",
            "tst": 1600000000,
            "vac": 3
        }
        "#;

        let msg: OwnTracksMessage = serde_json::from_str(payload).unwrap();
        assert!(msg.is_location());
        assert_eq!(msg.latitude, Some(52.520008));
        assert_eq!(msg.longitude, Some(13.404954));
        assert_eq!(msg.battery, Some(81.0));
        assert_eq!(msg.tracker_id.as_deref(), Some("dp"));
        assert_eq!(msg.datetime().map(|d| d.timestamp()), Some(1_600_000_000));
    }

    #[test]
    fn test_parsing_string_numbers() {
        let payload = r#"{"lat": "+20.652494", "lon": "-100.391404", "tst": "1764396915", "acc": ""}"#;

        let msg: OwnTracksMessage = serde_json::from_str(payload).unwrap();
        assert!(msg.is_location());
        assert_eq!(msg.latitude, Some(20.652494));
        assert_eq!(msg.longitude, Some(-100.391404));
        assert_eq!(msg.timestamp, Some(1_764_396_915));
        assert_eq!(msg.accuracy, None);
    }

    #[test]
    fn test_zero_or_missing_timestamp() {
        let zero: OwnTracksMessage =
            serde_json::from_str(r#"{"_type": "location", "lat": 1, "lon": 2, "tst": 0}"#).unwrap();
        assert_eq!(zero.datetime(), None);

        let missing: OwnTracksMessage =
            serde_json::from_str(r#"{"_type": "location", "lat": 1, "lon": 2}"#).unwrap();
        assert_eq!(missing.datetime(), None);
    }

    #[test]
    fn test_far_future_timestamp_counts_as_missing() {
        let msg: OwnTracksMessage = serde_json::from_str(
            r#"{"_type": "location", "lat": 1, "lon": 2, "tst": 300000000000}"#,
        )
        .unwrap();
        assert_eq!(msg.timestamp, Some(300_000_000_000));
        assert_eq!(msg.datetime(), None);
    }

    #[test]
    fn test_non_location_types() {
        let msg: OwnTracksMessage =
            serde_json::from_str(r#"{"_type": "lwt", "tst": 1600000000}"#).unwrap();
        assert!(!msg.is_location());
    }
}
