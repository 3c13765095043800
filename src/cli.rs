use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "location-history", version)]
#[command(about = "Collects OwnTracks MQTT messages and serves them as GPX tracks")]
pub struct Cli {
    /// Load environment variables from FILE before reading the configuration
    #[arg(short, long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the history collector and the map server
    Run,

    /// List all topics for which location data is stored
    Topics,

    /// Write the waypoints of TOPIC into FILE
    Query {
        topic: String,
        file: PathBuf,

        /// Earliest timestamp to include (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Latest timestamp to include (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Maximum number of waypoints
        #[arg(long)]
        max: Option<u32>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Import a location-history export (JSON) FILE for TOPIC
    Import { topic: String, file: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Gpx,
}
