use crate::db::{WaypointStore, WriteOutcome};
use crate::models::message::OwnTracksMessage;
use tracing::{debug, info, warn};

/// Persists one OwnTracks payload received on `topic`.
///
/// Returns `Ok(None)` when the message is not a usable location; those are logged and dropped.
/// Store failures are returned so the transport loop can report them.
pub async fn process_message(
    store: &WaypointStore,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<Option<WriteOutcome>> {
    debug!(
        "Got message on topic '{}': {}",
        topic,
        String::from_utf8_lossy(payload)
    );

    let message: OwnTracksMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse message on topic '{}': {}", topic, e);
            return Ok(None);
        }
    };

    if !message.is_location() {
        debug!(
            "Ignoring '{}' message on topic '{}'",
            message.kind.as_deref().unwrap_or_default(),
            topic
        );
        return Ok(None);
    }

    let (latitude, longitude) = match (message.latitude, message.longitude) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            warn!("Location message on topic '{}' has no coordinates, skipping", topic);
            return Ok(None);
        }
    };

    let datetime = match message.datetime() {
        Some(t) => t,
        None => {
            warn!(
                "Location message on topic '{}' has invalid timestamp {:?}, skipping",
                topic, message.timestamp
            );
            return Ok(None);
        }
    };

    info!(
        "Received message with timestamp {}, lat {}, lon {}",
        datetime, latitude, longitude
    );
    debug!(
        "Device '{}': battery {:?}, accuracy {:?}, altitude {:?}, trigger {:?}, connection {:?}",
        message.tracker_id.as_deref().unwrap_or_default(),
        message.battery,
        message.accuracy,
        message.altitude,
        message.trigger,
        message.connectivity
    );

    let outcome = store.write_one(topic, latitude, longitude, datetime).await?;
    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use chrono::{DateTime, Utc};

    async fn stored(store: &WaypointStore, topic: &str) -> usize {
        store
            .query(topic, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC, u32::MAX)
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_location_is_stored_under_transport_topic() {
        let (store, _dir) = temp_store().await;
        let payload = br#"{"_type":"location","lat":52.5,"lon":13.5,"tst":1600000000,"batt":90,"tid":"ph"}"#;

        let outcome = process_message(&store, "owntracks/anna/phone", payload)
            .await
            .unwrap();

        assert!(matches!(outcome, Some(WriteOutcome::Inserted(_))));
        let rows = store
            .query(
                "owntracks/anna/phone",
                DateTime::<Utc>::MIN_UTC,
                DateTime::<Utc>::MAX_UTC,
                10,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].latitude, 52.5);
        assert_eq!(rows[0].longitude, 13.5);
        assert_eq!(rows[0].datetime.timestamp(), 1_600_000_000);
    }

    #[tokio::test]
    async fn test_redelivery_is_deduplicated() {
        let (store, _dir) = temp_store().await;
        let payload = br#"{"_type":"location","lat":1.0,"lon":2.0,"tst":1600000000}"#;

        process_message(&store, "t", payload).await.unwrap();
        let again = process_message(&store, "t", payload).await.unwrap();

        assert_eq!(again, Some(WriteOutcome::DuplicateSkipped));
        assert_eq!(stored(&store, "t").await, 1);
    }

    #[tokio::test]
    async fn test_unusable_messages_are_skipped() {
        let (store, _dir) = temp_store().await;
        let payloads: [&[u8]; 6] = [
            b"not json",
            br#"{"_type":"transition","lat":1.0,"lon":2.0,"tst":1600000000}"#,
            br#"{"_type":"location","lon":2.0,"tst":1600000000}"#,
            br#"{"_type":"location","lat":1.0,"lon":2.0,"tst":0}"#,
            br#"{"_type":"location","lat":1.0,"lon":2.0}"#,
            br#"{"_type":"location","lat":1.0,"lon":2.0,"tst":300000000000}"#,
        ];

        for payload in payloads {
            assert_eq!(process_message(&store, "t", payload).await.unwrap(), None);
        }
        assert!(store.list_topics().await.unwrap().is_empty());
    }
}
