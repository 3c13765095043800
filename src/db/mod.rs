use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

pub mod queries;
pub mod store;

pub use store::{BulkStats, WaypointStore, WriteOutcome};

pub type DbPool = Pool<Sqlite>;

pub async fn init_pool(
    database_url: &str,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;
    Ok(pool)
}
