//! CLI command implementations

pub mod error;
pub mod harvest;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub use error::CliError;
pub use harvest::{LookupArgs, SearchArgs, TimelineArgs, UsersArgs};

use crate::accumulator::AccumulationMode;
use crate::output::SaveFormat;

/// Tweet Harvester CLI
#[derive(Parser, Debug)]
#[command(name = "tweet-harvester")]
#[command(about = "Harvest tweets, users and media from the Twitter v2 API", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// YAML configuration file
    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Override `local.output_dir`
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Override the table format (csv or json)
    #[arg(long, global = true)]
    pub save_format: Option<SaveFormat>,

    /// Override the accumulation mode (buffered or streaming)
    #[arg(long, global = true)]
    pub accumulation: Option<AccumulationMode>,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Report format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest user timelines
    Timeline(TimelineArgs),

    /// Full-archive keyword search
    Search(SearchArgs),

    /// Look up tweets by id
    Lookup(LookupArgs),

    /// Look up user profiles
    Users(UsersArgs),
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}
