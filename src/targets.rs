//! Target lists read from CSV files
//!
//! A target list names one identifier column, either handles or numeric
//! author ids (never both), and may carry a skip column whose rows with
//! value `1` are left out.

use csv::Reader;
use std::path::Path;
use tracing::{debug, info};

use crate::resolver::IdentifierKind;

/// Default name of the skip column
pub const DEFAULT_SKIP_COLUMN: &str = "skip";

/// Target list errors
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// Neither or both identifier columns were given
    #[error("exactly one of handle_column and author_id_column must be given")]
    AmbiguousColumns,

    /// A named column is not in the header
    #[error("column '{0}' not found in target list")]
    MissingColumn(String),

    /// File could not be read
    #[error("failed to read target list: {0}")]
    Csv(String),
}

/// How to read a target list
#[derive(Debug, Clone, Default)]
pub struct TargetListSource {
    /// Column of handles
    pub handle_column: Option<String>,
    /// Column of numeric author ids
    pub author_id_column: Option<String>,
    /// Skip column, when skipping is enabled
    pub skip_column: Option<String>,
}

/// Identifiers read from a target list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetList {
    /// How identifiers are interpreted
    pub kind: IdentifierKind,
    /// Identifiers in file order, blanks removed
    pub identifiers: Vec<String>,
}

impl TargetListSource {
    /// Identifier column and its kind
    pub fn column(&self) -> Result<(&str, IdentifierKind), TargetError> {
        match (&self.handle_column, &self.author_id_column) {
            (Some(column), None) => Ok((column, IdentifierKind::Handle)),
            (None, Some(column)) => Ok((column, IdentifierKind::NumericId)),
            _ => Err(TargetError::AmbiguousColumns),
        }
    }

    /// Read the identifiers from `path`
    pub fn read(&self, path: impl AsRef<Path>) -> Result<TargetList, TargetError> {
        let path = path.as_ref();
        let (column, kind) = self.column()?;
        let mut reader = Reader::from_path(path).map_err(|e| TargetError::Csv(e.to_string()))?;
        let headers = reader
            .headers()
            .map_err(|e| TargetError::Csv(e.to_string()))?
            .clone();

        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| TargetError::MissingColumn(name.to_string()))
        };
        let ident_index = position(column)?;
        let skip_index = self.skip_column.as_deref().map(position).transpose()?;

        let mut identifiers = Vec::new();
        let mut skipped = 0;
        for record in reader.records() {
            let record = record.map_err(|e| TargetError::Csv(e.to_string()))?;
            let skip = skip_index
                .and_then(|i| record.get(i))
                .map(|v| v.trim() == "1")
                .unwrap_or(false);
            if skip {
                skipped += 1;
                continue;
            }
            match record.get(ident_index).map(str::trim) {
                Some(ident) if !ident.is_empty() => identifiers.push(ident.to_string()),
                _ => debug!(line = ?record.position().map(|p| p.line()), "Blank identifier, ignoring row"),
            }
        }

        info!(
            path = %path.display(),
            kind = %kind,
            targets = identifiers.len(),
            skipped,
            "Loaded target list"
        );
        Ok(TargetList { kind, identifiers })
    }
}

/// Read one column of a CSV file as a list of values (blank cells dropped)
pub fn read_column(path: impl AsRef<Path>, column: &str) -> Result<Vec<String>, TargetError> {
    let source = TargetListSource {
        author_id_column: Some(column.to_string()),
        ..TargetListSource::default()
    };
    Ok(source.read(path)?.identifiers)
}
