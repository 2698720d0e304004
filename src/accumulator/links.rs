//! Parent to referenced-tweet link rows

use serde_json::Value;

use crate::normalizer::{NormalizeError, NormalizeResult};
use crate::{EntityKind, Record};

/// Link rows for every `referenced_tweets` entry of `entities`.
///
/// Each entry `{type, id}` of a tweet with id `P` yields
/// `{parent_id: P, referenced_id: id, relation_type: type}`. Tweets without
/// references yield nothing.
pub fn derive_links(entities: &[Value]) -> NormalizeResult<Vec<Record>> {
    let mut links = Vec::new();
    for entity in entities {
        let malformed = |reason: &str| NormalizeError::MalformedRecord {
            kind: EntityKind::Tweet,
            reason: reason.to_string(),
        };

        let refs = match entity.get("referenced_tweets") {
            None | Some(Value::Null) => continue,
            Some(Value::Array(refs)) => refs,
            Some(_) => return Err(malformed("referenced_tweets is not a list")),
        };
        let parent_id = entity
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("referencing tweet has no id"))?;

        for reference in refs {
            let referenced_id = reference
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("reference entry has no id"))?;
            let relation_type = reference
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("reference entry has no type"))?;

            let mut link = Record::new();
            link.insert("parent_id".into(), Value::String(parent_id.to_string()));
            link.insert("referenced_id".into(), Value::String(referenced_id.to_string()));
            link.insert("relation_type".into(), Value::String(relation_type.to_string()));
            links.push(link);
        }
    }
    Ok(links)
}
