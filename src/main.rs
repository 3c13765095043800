mod cli;
mod config;
mod db;
mod error;
mod export;
mod http;
mod importer;
mod models;
mod mqtt;
mod processor;
mod track;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command, OutputFormat};
use config::AppConfig;
use db::WaypointStore;
use export::TrackRequest;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = AppConfig::load(cli.env_file.as_deref())?;

    // Init logging
    let log_level = if cli.debug { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Init DB
    let store = WaypointStore::open(&config.database)
        .await
        .context("unable to open the location database")?;
    info!("Connected to database");

    match cli.command {
        Command::Run => {
            info!("Starting location history collector...");
            tokio::try_join!(
                mqtt::start_mqtt_client(&config.mqtt, store.clone()),
                http::serve(&config.http, store),
            )?;
        }
        Command::Topics => {
            let topics = store.list_topics().await?;
            println!("There is data available for the following topics:");
            for topic in topics {
                println!(" - {}", topic);
            }
        }
        Command::Query {
            topic,
            file,
            from,
            to,
            max,
            format,
        } => {
            let request = TrackRequest { from, to, max };
            let waypoints = export::export_track(&store, &topic, &request).await?;
            let data = match format {
                OutputFormat::Json => serde_json::to_vec_pretty(&waypoints)?,
                OutputFormat::Gpx => track::to_xml(&track::build_gpx(&waypoints)?)?,
            };
            tokio::fs::write(&file, data)
                .await
                .with_context(|| format!("unable to write {}", file.display()))?;
            info!("Wrote {} waypoints to {}", waypoints.len(), file.display());
        }
        Command::Import { topic, file } => {
            let summary = importer::import_file(&store, &file, &topic).await?;
            info!(
                "Imported {} waypoints ({} new)",
                summary.records, summary.stats.inserted
            );
        }
    }

    Ok(())
}
