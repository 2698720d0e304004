//! CSV table writer
//!
//! All fields are quoted. A fresh table gets a header row. Appending to an
//! existing file keeps its column order; columns first seen in the appended
//! rows are added at the end of the header, and earlier rows are rewritten
//! once with empty cells for them.

use csv::{QuoteStyle, Reader, Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

use super::{cell_text, column_order, OutputError, OutputResult};
use crate::{Category, Record};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Row writer for one CSV table file
pub struct CsvTableWriter {
    writer: Writer<BufWriter<File>>,
    columns: Vec<String>,
    rows_written: u64,
}

impl CsvTableWriter {
    /// Truncate `path` and write a header of `columns`
    pub fn create<P: AsRef<Path>>(path: P, columns: Vec<String>) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating CSV writer: path={}", path.display());

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        let mut writer = Self::build(file, columns);
        writer
            .writer
            .write_record(&writer.columns)
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
        Ok(writer)
    }

    /// Open `path` for appending, reusing its header.
    ///
    /// Columns of `columns` missing from the header are added to it first
    /// (see [`CsvTableWriter::widen`]). Falls back to
    /// [`CsvTableWriter::create`] when the file is missing or empty.
    pub fn append<P: AsRef<Path>>(path: P, columns: Vec<String>) -> OutputResult<Self> {
        let path = path.as_ref();
        let existing = match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => Self::read_header(path)?,
            _ => None,
        };

        let Some(mut header) = existing else {
            return Self::create(path, columns);
        };

        let extra: Vec<String> = columns
            .into_iter()
            .filter(|column| !header.contains(column))
            .collect();
        if !extra.is_empty() {
            header = Self::widen(path, header, extra)?;
        }

        debug!(
            path = %path.display(),
            columns = header.len(),
            "Appending to existing CSV table"
        );
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| OutputError::IoError(format!("Failed to open file for append: {e}")))?;
        Ok(Self::build(file, header))
    }

    fn build(file: File, columns: Vec<String>) -> Self {
        let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
        let writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .has_headers(false)
            .from_writer(buf_writer);
        Self {
            writer,
            columns,
            rows_written: 0,
        }
    }

    /// Rewrite `path` with `extra` columns appended to `header`, padding
    /// every existing row with empty cells.
    ///
    /// Rows are streamed through a sibling temporary file, which then
    /// replaces the table.
    fn widen(path: &Path, header: Vec<String>, extra: Vec<String>) -> OutputResult<Vec<String>> {
        let widened: Vec<String> = header.iter().cloned().chain(extra).collect();
        let padding = widened.len() - header.len();
        let tmp = path.with_extension("csv.tmp");

        {
            let mut reader = Reader::from_path(path)
                .map_err(|e| OutputError::CsvError(format!("Failed to open existing table: {e}")))?;
            let mut writer = Self::create(&tmp, widened.clone())?;
            for record in reader.records() {
                let record =
                    record.map_err(|e| OutputError::CsvError(format!("Failed to read row: {e}")))?;
                let cells = record.iter().chain(std::iter::repeat("").take(padding));
                writer
                    .writer
                    .write_record(cells)
                    .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
                writer.rows_written += 1;
            }
            writer.close()?;
        }

        std::fs::rename(&tmp, path)
            .map_err(|e| OutputError::IoError(format!("Failed to replace table: {e}")))?;
        info!(
            path = %path.display(),
            columns = widened.len(),
            added = padding,
            "Widened CSV header"
        );
        Ok(widened)
    }

    fn read_header(path: &Path) -> OutputResult<Option<Vec<String>>> {
        let mut reader = Reader::from_path(path)
            .map_err(|e| OutputError::CsvError(format!("Failed to open existing table: {e}")))?;
        let header = reader
            .headers()
            .map_err(|e| OutputError::CsvError(format!("Failed to read header: {e}")))?;
        if header.is_empty() {
            return Ok(None);
        }
        Ok(Some(header.iter().map(str::to_string).collect()))
    }

    /// Columns rows are projected onto
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows written through this writer
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Write one row; columns missing from the row are left empty
    pub fn write_row(&mut self, row: &Record) -> OutputResult<()> {
        let cells = self.columns.iter().map(|column| cell_text(row.get(column)));
        self.writer
            .write_record(cells)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush buffered rows to disk
    pub fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }

    /// Flush and sync the file
    pub fn close(mut self) -> OutputResult<()> {
        self.flush()?;
        let buf_writer = self
            .writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get file handle: {e}")))?;
        file.sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;
        debug!(rows = self.rows_written, "CSV writer closed");
        Ok(())
    }
}

/// Write `rows` of `category` to `path`, replacing or appending
pub fn write_table(path: &Path, category: Category, rows: &[Record], append: bool) -> OutputResult<()> {
    let columns = column_order(rows, category.key_columns());
    let mut writer = if append {
        CsvTableWriter::append(path, columns)?
    } else {
        CsvTableWriter::create(path, columns)?
    };

    for row in rows {
        writer.write_row(row)?;
    }
    writer.close()
}
