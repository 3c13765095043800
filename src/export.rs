use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::WaypointStore;
use crate::error::StoreError;
use crate::models::waypoint::Waypoint;

pub const DEFAULT_MAX_COUNT: u32 = 1_000_000;

/// Optional bounds of a track export. Missing values mean "all of it".
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TrackRequest {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub max: Option<u32>,
}

impl TrackRequest {
    pub fn start(&self) -> DateTime<Utc> {
        self.from.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.to.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn max_count(&self) -> u32 {
        self.max.unwrap_or(DEFAULT_MAX_COUNT)
    }
}

pub async fn export_track(
    store: &WaypointStore,
    topic: &str,
    request: &TrackRequest,
) -> Result<Vec<Waypoint>, StoreError> {
    store
        .query(topic, request.start(), request.end(), request.max_count())
        .await
}
