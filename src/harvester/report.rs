//! Harvest run reports and run metadata

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{HarvestError, HarvestResult};
use crate::accumulator::ResponseAccumulator;
use crate::config::HarvestOptions;
use crate::fetcher::PaginationSummary;
use crate::query::{QueryDescriptor, QueryMode};
use crate::Category;

/// Name of the metadata file written to every run directory
pub const METADATA_FILE: &str = "query.json";

/// Outcome of one harvest run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Query mode
    pub mode: QueryMode,
    /// Target identifier (timelines only)
    pub target: Option<String>,
    /// Directory the tables were written to
    pub output_dir: PathBuf,
    /// Request and page counters
    pub pagination: PaginationSummary,
    /// Rows per table
    pub rows: BTreeMap<Category, usize>,
    /// Identifiers dropped before any request was made
    pub skipped: Vec<String>,
}

impl RunReport {
    pub(crate) fn new(
        mode: QueryMode,
        output_dir: &Path,
        pagination: PaginationSummary,
        accumulator: &ResponseAccumulator,
    ) -> Self {
        let rows = Category::ALL
            .iter()
            .map(|c| (*c, accumulator.row_count(*c)))
            .filter(|(_, n)| *n > 0)
            .collect();
        Self {
            mode,
            target: None,
            output_dir: output_dir.to_path_buf(),
            pagination,
            rows,
            skipped: Vec::new(),
        }
    }

    /// Rows written to `category`
    pub fn row_count(&self, category: Category) -> usize {
        self.rows.get(&category).copied().unwrap_or(0)
    }

    /// Rows across every table
    pub fn total_rows(&self) -> usize {
        self.rows.values().sum()
    }
}

/// Result of harvesting one timeline target
#[derive(Debug)]
pub struct TargetOutcome {
    /// Identifier as given by the caller
    pub identifier: String,
    /// Run report, or why the target failed
    pub result: Result<RunReport, HarvestError>,
}

/// Per-target outcomes of a timeline harvest
#[derive(Debug, Default)]
pub struct TimelineReport {
    /// Outcomes in target order
    pub targets: Vec<TargetOutcome>,
    /// Remaining targets were skipped after a shutdown request
    pub cancelled: bool,
}

impl TimelineReport {
    /// Reports of targets that completed
    pub fn completed(&self) -> Vec<&RunReport> {
        self.targets
            .iter()
            .filter_map(|t| t.result.as_ref().ok())
            .collect()
    }

    /// Targets that failed, with their errors
    pub fn failed(&self) -> Vec<(&str, &HarvestError)> {
        self.targets
            .iter()
            .filter_map(|t| t.result.as_ref().err().map(|e| (t.identifier.as_str(), e)))
            .collect()
    }

    /// Outcome of `identifier`
    pub fn outcome(&self, identifier: &str) -> Option<&TargetOutcome> {
        self.targets.iter().find(|t| t.identifier == identifier)
    }
}

#[derive(Serialize)]
struct RunMetadata<'a> {
    started_at: DateTime<Utc>,
    query: &'a QueryDescriptor,
    options: &'a HarvestOptions,
}

/// Write `query.json` describing the run into `dir`
pub fn write_metadata(
    dir: &Path,
    descriptor: &QueryDescriptor,
    options: &HarvestOptions,
) -> HarvestResult<PathBuf> {
    let path = dir.join(METADATA_FILE);
    let metadata = RunMetadata {
        started_at: Utc::now(),
        query: descriptor,
        options,
    };
    File::create(&path)
        .and_then(|file| write_pretty(file, &metadata))
        .map_err(|e| HarvestError::Io(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), "Wrote run metadata");
    Ok(path)
}

/// Pretty-print `value` through a buffered writer, surfacing flush errors
fn write_pretty<W: Write, T: Serialize>(inner: W, value: &T) -> io::Result<()> {
    let mut writer = BufWriter::new(inner);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()
}
