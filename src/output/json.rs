//! Table-oriented JSON writer
//!
//! Layout:
//!
//! ```json
//! {"data": [{"id": "1"}],
//!  "schema": {"fields": [{"name": "id", "type": "string"}], "primary_key": ["id"]}}
//! ```
//!
//! `data` comes first so append mode never reads earlier rows: it locates the
//! trailing `],"schema":` from the end of the file, truncates there, writes
//! the new rows and a merged schema. Rows written before a column first
//! appeared do not carry that column; readers treat it as null.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

use super::{column_order, OutputError, OutputResult};
use crate::{Category, Record};

/// One column of the table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Column name
    pub name: String,
    /// `string`, `integer`, `number`, `boolean` or `any`
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Table schema
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in order
    pub fields: Vec<FieldSchema>,
    /// Natural key columns
    #[serde(default)]
    pub primary_key: Vec<String>,
}

/// Whole JSON table document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableDocument {
    /// Rows; columns added by later appends are absent from earlier rows
    pub data: Vec<Record>,
    /// Schema
    pub schema: TableSchema,
}

/// Separator between the row list and the schema in a written document
const SCHEMA_MARKER: &[u8] = b"],\"schema\":";

/// Initial window read from the end of a document to find the schema
const TAIL_CHUNK: u64 = 64 * 1024;

fn value_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some("boolean"),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some("integer"),
        Value::Number(_) => Some("number"),
        Value::String(_) => Some("string"),
        Value::Array(_) | Value::Object(_) => Some("any"),
    }
}

fn merge_types(a: &'static str, b: &'static str) -> &'static str {
    match (a, b) {
        (a, b) if a == b => a,
        ("integer", "number") | ("number", "integer") => "number",
        _ => "any",
    }
}

/// Type shared by every non-null value of `column`, `None` when all are null
fn observed_type(rows: &[Record], column: &str) -> Option<&'static str> {
    let mut seen: Option<&'static str> = None;
    for value in rows.iter().filter_map(|row| row.get(column)) {
        let Some(ty) = value_type(value) else { continue };
        let merged = seen.map_or(ty, |prev| merge_types(prev, ty));
        if merged == "any" {
            return Some("any");
        }
        seen = Some(merged);
    }
    seen
}

/// Schema type of `column`; all-null columns are strings
fn column_type(rows: &[Record], column: &str) -> &'static str {
    observed_type(rows, column).unwrap_or("string")
}

fn static_type(name: &str) -> &'static str {
    match name {
        "boolean" => "boolean",
        "integer" => "integer",
        "number" => "number",
        "string" => "string",
        _ => "any",
    }
}

impl TableSchema {
    /// Add the columns of `rows` not yet in the schema and widen the types
    /// of existing ones
    fn extend(&mut self, category: Category, rows: &[Record]) {
        for name in column_order(rows, category.key_columns()) {
            let observed = observed_type(rows, &name);
            match self.fields.iter_mut().find(|f| f.name == name) {
                Some(field) => {
                    if let Some(ty) = observed {
                        field.field_type =
                            merge_types(static_type(&field.field_type), ty).to_string();
                    }
                }
                None => self.fields.push(FieldSchema {
                    name,
                    field_type: observed.unwrap_or("string").to_string(),
                }),
            }
        }
    }

    /// `row` with every schema column present
    fn pad(&self, row: &Record) -> Record {
        let mut row = row.clone();
        for field in &self.fields {
            row.entry(field.name.clone()).or_insert(Value::Null);
        }
        row
    }
}

impl TableDocument {
    /// Build a document for `rows` of `category`
    pub fn from_rows(category: Category, rows: Vec<Record>) -> Self {
        let columns = column_order(&rows, category.key_columns());
        let fields = columns
            .iter()
            .map(|name| FieldSchema {
                name: name.clone(),
                field_type: column_type(&rows, name).to_string(),
            })
            .collect();

        let data = rows
            .into_iter()
            .map(|mut row| {
                for column in &columns {
                    row.entry(column.clone()).or_insert(Value::Null);
                }
                row
            })
            .collect();

        Self {
            schema: TableSchema {
                fields,
                primary_key: category.key_columns().iter().map(|k| k.to_string()).collect(),
            },
            data,
        }
    }

    /// Read a document from `path`
    pub fn read(path: &Path) -> OutputResult<Self> {
        let file = File::open(path)
            .map_err(|e| OutputError::IoError(format!("Failed to open existing table: {e}")))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| OutputError::SerializationError(format!("Failed to parse existing table: {e}")))
    }

    /// Write the document to `path`, replacing it
    pub fn write(&self, path: &Path) -> OutputResult<()> {
        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)
            .map_err(|e| OutputError::SerializationError(format!("Failed to write table: {e}")))?;
        writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }
}

/// Position of the schema tail in an existing document
struct Tail {
    /// Offset of the `]` closing `data`
    offset: u64,
    /// Whether `data` holds no rows yet
    data_empty: bool,
    schema: TableSchema,
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

/// Locate the schema tail, reading a growing window from the end of `file`
fn read_tail(file: &mut File) -> OutputResult<Tail> {
    let len = file
        .metadata()
        .map_err(|e| OutputError::IoError(format!("Failed to stat table: {e}")))?
        .len();
    let mut window = TAIL_CHUNK.min(len);
    loop {
        let start = len - window;
        let mut buf = Vec::with_capacity(window as usize);
        file.seek(SeekFrom::Start(start))
            .and_then(|_| Read::by_ref(file).take(window).read_to_end(&mut buf))
            .map_err(|e| OutputError::IoError(format!("Failed to read table tail: {e}")))?;

        // the byte before the marker tells whether `data` is empty
        if let Some(pos) = find_subslice(&buf, SCHEMA_MARKER).filter(|pos| *pos > 0 || start == 0) {
            let schema_text = std::str::from_utf8(&buf[pos + SCHEMA_MARKER.len()..])
                .map_err(|e| OutputError::SerializationError(format!("Invalid table tail: {e}")))?
                .trim_end();
            let schema_text = schema_text.strip_suffix('}').ok_or_else(|| {
                OutputError::SerializationError("Table document is not closed".to_string())
            })?;
            let schema = serde_json::from_str(schema_text).map_err(|e| {
                OutputError::SerializationError(format!("Failed to parse table schema: {e}"))
            })?;
            return Ok(Tail {
                offset: start + pos as u64,
                data_empty: pos > 0 && buf[pos - 1] == b'[',
                schema,
            });
        }

        if window == len {
            return Err(OutputError::SerializationError(
                "Existing file is not a table document".to_string(),
            ));
        }
        window = (window * 2).min(len);
    }
}

/// Append `rows` to the document at `path` without reading earlier rows
fn append_rows(path: &Path, category: Category, rows: &[Record]) -> OutputResult<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| OutputError::IoError(format!("Failed to open file for append: {e}")))?;
    let Tail {
        offset,
        data_empty,
        mut schema,
    } = read_tail(&mut file)?;
    schema.extend(category, rows);

    file.set_len(offset)
        .and_then(|_| file.seek(SeekFrom::End(0)))
        .map_err(|e| OutputError::IoError(format!("Failed to truncate table tail: {e}")))?;

    let io_err = |e: std::io::Error| OutputError::IoError(format!("Failed to append rows: {e}"));
    let ser_err = |e: serde_json::Error| OutputError::SerializationError(format!("Failed to write row: {e}"));
    let mut writer = BufWriter::new(file);
    for (index, row) in rows.iter().enumerate() {
        if index > 0 || !data_empty {
            writer.write_all(b",").map_err(io_err)?;
        }
        serde_json::to_writer(&mut writer, &schema.pad(row)).map_err(ser_err)?;
    }
    writer.write_all(SCHEMA_MARKER).map_err(io_err)?;
    serde_json::to_writer(&mut writer, &schema).map_err(ser_err)?;
    writer.write_all(b"}").map_err(io_err)?;
    writer
        .flush()
        .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))?;

    debug!(
        path = %path.display(),
        appended = rows.len(),
        columns = schema.fields.len(),
        "Appended to JSON table"
    );
    Ok(())
}

/// Write `rows` of `category` to `path`, replacing or appending
pub fn write_table(path: &Path, category: Category, rows: &[Record], append: bool) -> OutputResult<()> {
    let existing = append
        && std::fs::metadata(path)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);
    if existing {
        append_rows(path, category, rows)
    } else {
        TableDocument::from_rows(category, rows.to_vec()).write(path)
    }
}
