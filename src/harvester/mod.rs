//! Harvest-run orchestration
//!
//! A harvest run ties one [`crate::query::QueryDescriptor`] to a request
//! executor, a pagination strategy and a response accumulator, and persists
//! the accumulated tables into one directory.
//!
//! # Overview
//!
//! 1. **Planning**: bounded queries are split by [`batch::plan_batches`]
//! 2. **Execution**: [`Harvester`] builds the requests for each query mode
//!    and drives them through [`crate::fetcher::PaginationDriver`]
//! 3. **Spacing**: per-endpoint minimum intervals via [`spacing::RequestSpacer`]
//! 4. **Reporting**: each run yields a [`RunReport`]; timelines yield one
//!    [`TargetOutcome`] per target in a [`TimelineReport`]
//!
//! # Error Handling
//!
//! Setup errors (invalid query, unwritable directory) fail the run before
//! any request is made. Failures while paging are absorbed by the driver and
//! counted in the report. A timeline target that cannot be resolved fails
//! that target only.
//!
//! # Components
//!
//! - [`runner`] - the [`Harvester`] and its four query shapes
//! - [`batch`] - batch planning for search and lookups
//! - [`report`] - run reports and `query.json` metadata
//! - [`spacing`] - minimum request spacing
//! - [`config`] - constants and rate-limit wait calculation

pub mod batch;
pub mod config;
pub mod report;
pub mod runner;
pub mod spacing;

pub use batch::plan_batches;
pub use report::{RunReport, TargetOutcome, TimelineReport};
pub use runner::Harvester;

use crate::accumulator::AccumulateError;
use crate::config::ConfigError;
use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::query::QueryError;
use crate::resolver::ResolveError;
use crate::targets::TargetError;

/// Harvest errors
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Batch ceiling outside the API limits
    #[error("invalid batch plan: {0}")]
    InvalidBatch(String),

    /// Query could not be built
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Target list error
    #[error("target list error: {0}")]
    Target(#[from] TargetError),

    /// Identifier could not be resolved
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Request failed outside pagination
    #[error("fetch error: {0}")]
    Fetch(#[from] FetcherError),

    /// Accumulator failed to persist
    #[error("accumulate error: {0}")]
    Accumulate(#[from] AccumulateError),

    /// Output error
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Run directory or metadata could not be written
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type for harvest runs
pub type HarvestResult<T> = Result<T, HarvestError>;
