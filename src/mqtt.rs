use crate::config::MqttConfig;
use crate::db::{WaypointStore, WriteOutcome};
use crate::error::StoreError;
use crate::processor::message_processor;
use anyhow::anyhow;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Publish, QoS, Transport};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const KEEP_ALIVE: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(5);
/// Publishes buffered between the polling task and the store writer.
const DELIVERY_QUEUE: usize = 1000;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_WRITE_RETRY_DELAY: Duration = Duration::from_secs(30);

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let client_id = format!("{}-{}", config.client_prefix, Uuid::new_v4());
    let mut mqttoptions = MqttOptions::new(client_id, &config.host, config.port);
    mqttoptions.set_keep_alive(KEEP_ALIVE);
    mqttoptions.set_clean_session(true);
    // acked by the writer once the waypoint is stored
    mqttoptions.set_manual_acks(true);
    if !config.username.is_empty() {
        mqttoptions.set_credentials(&config.username, &config.password);
    }
    if config.tls {
        mqttoptions.set_transport(Transport::tls_with_default_config());
    }
    mqttoptions
}

/// Subscribes to the configured topic filter and stores every location message it delivers.
///
/// The polling task only forwards publishes; a single writer task stores them in arrival order
/// and acknowledges each one after its write finished, so a long bulk import holding the
/// database lock neither stalls keep-alives nor loses acknowledged messages. Never returns under
/// normal operation; connection errors are logged and the event loop reconnects on the next poll.
pub async fn start_mqtt_client(config: &MqttConfig, store: WaypointStore) -> anyhow::Result<()> {
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(config), 100);
    let (deliveries, queue) = mpsc::channel(DELIVERY_QUEUE);
    let writer = tokio::spawn(store_deliveries(store, client.clone(), queue));
    info!("Connecting to MQTT broker {}:{}", config.host, config.port);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if deliveries.send(publish).await.is_err() {
                    writer.await?;
                    return Err(anyhow!("waypoint writer stopped"));
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT Connected!");
                // clean sessions drop subscriptions on every reconnect
                if let Err(e) = client.subscribe(&config.topic, QoS::AtLeastOnce).await {
                    error!("Failed to subscribe to {}: {}", config.topic, e);
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                info!("Subscribed to {}", config.topic);
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                error!("MQTT Connection error: {}", e);
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn store_deliveries(
    store: WaypointStore,
    client: AsyncClient,
    mut queue: mpsc::Receiver<Publish>,
) {
    while let Some(publish) = queue.recv().await {
        deliver(&store, &publish.topic, &publish.payload, WRITE_RETRY_DELAY).await;
        if let Err(e) = client.ack(&publish).await {
            error!("Failed to acknowledge message on '{}': {}", publish.topic, e);
        }
    }
}

/// Hands one payload to the ingestion adapter. Writes that lost the database lock to another
/// writer are retried with a doubling delay until they go through; other failures are logged.
async fn deliver(
    store: &WaypointStore,
    topic: &str,
    payload: &[u8],
    mut retry_delay: Duration,
) -> Option<WriteOutcome> {
    loop {
        match message_processor::process_message(store, topic, payload).await {
            Ok(outcome) => return outcome,
            Err(e) if is_busy(&e) => {
                warn!(
                    "Database busy while storing message on '{}', retrying in {:?}",
                    topic, retry_delay
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_WRITE_RETRY_DELAY);
            }
            Err(e) => {
                error!("Error processing message on '{}': {}", topic, e);
                return None;
            }
        }
    }
}

fn is_busy(e: &anyhow::Error) -> bool {
    e.downcast_ref::<StoreError>().map_or(false, StoreError::is_busy)
}
