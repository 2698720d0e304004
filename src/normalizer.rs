//! Record normalization
//!
//! Turns one raw API entity into a flat [`Record`]: nested objects become
//! dotted columns (`public_metrics.like_count`), arrays are kept as JSON text
//! in a single column. The reduced fidelity keeps a curated set of columns
//! per entity kind.

use serde_json::Value;

use crate::{EntityKind, Record};

/// Normalization errors
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// Entity is not an object or lacks its key field
    #[error("malformed {kind} record: {reason}")]
    MalformedRecord {
        /// Entity kind being normalized
        kind: EntityKind,
        /// What was wrong
        reason: String,
    },
}

/// Result type for normalization
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Converts raw entities into flat rows
pub trait RecordNormalizer: Send + Sync {
    /// Normalize one entity of `kind`
    fn normalize(&self, kind: EntityKind, entity: &Value) -> NormalizeResult<Record>;
}

const REDUCED_TWEET_COLUMNS: &[&str] = &[
    "id",
    "text",
    "author_id",
    "conversation_id",
    "created_at",
    "in_reply_to_user_id",
    "lang",
    "possibly_sensitive",
    "public_metrics",
    "referenced_tweets",
    "reply_settings",
    "source",
];

const REDUCED_USER_COLUMNS: &[&str] = &[
    "id",
    "username",
    "name",
    "created_at",
    "description",
    "location",
    "pinned_tweet_id",
    "protected",
    "public_metrics",
    "verified",
];

const REDUCED_MEDIA_COLUMNS: &[&str] = &[
    "media_key",
    "type",
    "url",
    "preview_image_url",
    "duration_ms",
    "height",
    "width",
    "public_metrics",
];

fn reduced_columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Tweet => REDUCED_TWEET_COLUMNS,
        EntityKind::User => REDUCED_USER_COLUMNS,
        EntityKind::Media => REDUCED_MEDIA_COLUMNS,
    }
}

/// Flattening normalizer with full or reduced fidelity
#[derive(Debug, Clone, Copy)]
pub struct FlatNormalizer {
    full: bool,
}

impl FlatNormalizer {
    /// `full = true` keeps every field, otherwise the curated subset
    pub fn new(full: bool) -> Self {
        Self { full }
    }
}

impl Default for FlatNormalizer {
    fn default() -> Self {
        Self::new(true)
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Record) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let column = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&column, child, out);
            }
        }
        Value::Array(_) => {
            out.insert(prefix.to_string(), Value::String(value.to_string()));
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

impl RecordNormalizer for FlatNormalizer {
    fn normalize(&self, kind: EntityKind, entity: &Value) -> NormalizeResult<Record> {
        let malformed = |reason: String| NormalizeError::MalformedRecord { kind, reason };

        let object = entity
            .as_object()
            .ok_or_else(|| malformed(format!("expected an object, got {entity}")))?;

        let key = kind.key_field();
        let key_value = match object.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Value::String(s.clone()),
            Some(Value::Number(n)) => Value::String(n.to_string()),
            _ => return Err(malformed(format!("missing '{key}'"))),
        };

        let mut record = Record::new();
        if self.full {
            flatten_into("", entity, &mut record);
        } else {
            for column in reduced_columns(kind) {
                if let Some(value) = object.get(*column) {
                    flatten_into(column, value, &mut record);
                }
            }
        }
        record.insert(key.to_string(), key_value);
        Ok(record)
    }
}
