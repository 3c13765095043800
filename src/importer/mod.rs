use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::db::{BulkStats, WaypointStore};
use crate::error::ImportError;

pub mod stream;

/// Decoded records buffered between the decoder thread and the writer.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// Records decoded and written into the transaction.
    pub records: usize,
    pub stats: BulkStats,
}

/// Imports a location-history export for `topic` inside a single transaction.
///
/// Any decode or read error discards the whole import; [`ImportError::Decode`] carries the number
/// of records processed before the failure.
pub async fn import_file(
    store: &WaypointStore,
    path: &Path,
    topic: &str,
) -> Result<ImportSummary, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut bulk = store.begin_bulk().await?;
    info!("Importing {} for topic '{}'", path.display(), topic);

    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    let decoder =
        tokio::task::spawn_blocking(move || stream::decode_locations(BufReader::new(file), &tx));

    let mut records = 0;
    while let Some(location) = rx.recv().await {
        bulk.write(topic, location.latitude, location.longitude, location.datetime)
            .await;
        records += 1;
    }

    let decoded = match decoder.await {
        Ok(decoded) => decoded,
        Err(e) => {
            discard(bulk.rollback().await);
            return Err(ImportError::Decoder(e));
        }
    };
    if let Err(source) = decoded {
        warn!("Aborting import of {} after {} records: {}", path.display(), records, source);
        discard(bulk.rollback().await);
        return Err(ImportError::Decode {
            processed: records,
            source,
        });
    }

    let stats = bulk.commit().await?;
    info!(
        "Imported {} records for topic '{}' ({} new, {} duplicates, {} failed)",
        records, topic, stats.inserted, stats.duplicates, stats.failed
    );
    Ok(ImportSummary { records, stats })
}

fn discard(rollback: Result<(), crate::error::StoreError>) {
    if let Err(e) = rollback {
        warn!("Rollback of aborted import failed: {}", e);
    }
}
