//! CLI error types and conversions

use crate::config::ConfigError;
use crate::fetcher::FetcherError;
use crate::harvester::HarvestError;
use crate::query::QueryError;
use crate::targets::TargetError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Harvest error
    #[error("harvest error: {0}")]
    Harvest(#[from] HarvestError),

    /// Target list error
    #[error("target list error: {0}")]
    Target(#[from] TargetError),

    /// Transport could not be built
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Query error
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Every timeline target failed
    #[error("all {0} targets failed")]
    AllTargetsFailed(usize),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Run directory could not be created
    #[error("IO error: {0}")]
    Io(String),
}
