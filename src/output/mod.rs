//! Table output writers
//!
//! Every category table is persisted as `data_<category>.<format>` inside a
//! run directory. CSV quotes every field; JSON uses a table-oriented layout
//! (`schema` + `data`). Both support an append mode for streaming runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::{Category, Record};

pub mod csv;
pub mod json;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// On-disk table format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    /// Comma separated, all fields quoted
    #[default]
    Csv,
    /// Table-oriented JSON document
    Json,
}

impl SaveFormat {
    /// File extension
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Csv => "csv",
            SaveFormat::Json => "json",
        }
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SaveFormat::Csv),
            "json" => Ok(SaveFormat::Json),
            _ => Err(format!("Invalid save format: {s}. Valid options: csv, json")),
        }
    }
}

/// Path of `category`'s table inside `dir`
pub fn table_path(dir: &Path, category: Category, format: SaveFormat) -> PathBuf {
    dir.join(format!("data_{}.{}", category.file_stem(), format.extension()))
}

/// Column order for `rows`: key columns first, then every other column seen
pub fn column_order(rows: &[Record], key_columns: &[&str]) -> Vec<String> {
    let mut rest = BTreeSet::new();
    for row in rows {
        for column in row.keys() {
            if !key_columns.contains(&column.as_str()) {
                rest.insert(column.clone());
            }
        }
    }
    key_columns
        .iter()
        .filter(|key| rows.iter().any(|row| row.contains_key(**key)))
        .map(|key| key.to_string())
        .chain(rest)
        .collect()
}

/// Text form of a cell; null becomes the empty string
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Destination for category tables
pub trait TableSink: Send {
    /// Write `rows` of `category`. With `append`, rows are added after any
    /// rows already persisted; otherwise the table is replaced.
    fn write_table(&mut self, category: Category, rows: &[Record], append: bool) -> OutputResult<()>;
}

/// Writes tables as files inside one directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    format: SaveFormat,
}

impl DirectorySink {
    /// Sink writing `format` files into `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>, format: SaveFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Table format
    pub fn format(&self) -> SaveFormat {
        self.format
    }
}

impl TableSink for DirectorySink {
    fn write_table(&mut self, category: Category, rows: &[Record], append: bool) -> OutputResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;

        let path = table_path(&self.dir, category, self.format);
        debug!(
            path = %path.display(),
            rows = rows.len(),
            append,
            "Writing table"
        );
        match self.format {
            SaveFormat::Csv => csv::write_table(&path, category, rows, append),
            SaveFormat::Json => json::write_table(&path, category, rows, append),
        }
    }
}

/// One write observed by a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    /// Table written
    pub category: Category,
    /// Rows in this write
    pub rows: Vec<Record>,
    /// Whether the write appended
    pub append: bool,
}

/// In-memory sink keeping every write, shareable across clones
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    writes: Arc<Mutex<Vec<RecordedWrite>>>,
}

impl RecordingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every write so far
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }

    /// Concatenation of all rows written to `category`, in write order
    pub fn rows(&self, category: Category) -> Vec<Record> {
        self.writes()
            .into_iter()
            .filter(|w| w.category == category)
            .flat_map(|w| w.rows)
            .collect()
    }
}

impl TableSink for RecordingSink {
    fn write_table(&mut self, category: Category, rows: &[Record], append: bool) -> OutputResult<()> {
        let mut writes = self
            .writes
            .lock()
            .map_err(|e| OutputError::IoError(format!("recording sink poisoned: {e}")))?;
        writes.push(RecordedWrite {
            category,
            rows: rows.to_vec(),
            append,
        });
        Ok(())
    }
}
