//! JSON document codec.
//!
//! The wire format is a bare pretty-printed array (schema version 1). An
//! envelope `{"schemaVersion": n, "records": ...}` with `n <= 1` is also
//! read, so a future writer can announce itself without breaking this one.

use crate::entity::{ImageSet, Record, MAX_IMAGES_PER_PLATE};
use crate::error::{ModelError, ModelResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Highest schema version this build reads.
pub const SCHEMA_VERSION: u64 = 1;

/// Parses `text` and strips an envelope if present.
///
/// Blank text reads as `null`.
pub fn parse_payload(text: &str) -> ModelResult<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Object(mut map) if map.contains_key("schemaVersion") => {
            let found = map
                .get("schemaVersion")
                .and_then(Value::as_u64)
                .ok_or(ModelError::UnexpectedShape {
                    expected: "an integer schemaVersion",
                })?;
            if found > SCHEMA_VERSION {
                return Err(ModelError::UnsupportedSchema {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
            Ok(map.remove("records").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

/// Decodes an array-of-records document.
///
/// Elements that do not decode as `T` are skipped with a warning; local ids
/// in the document are discarded.
///
/// # Errors
///
/// Fails when the text is not JSON or the payload is not an array.
pub fn decode_records<T: Record>(text: &str) -> ModelResult<Vec<T>> {
    let items = match parse_payload(text)? {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(ModelError::UnexpectedShape { expected: "a JSON array" }),
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(mut record) => {
                record.set_local_id(None);
                records.push(record);
            }
            Err(e) => tracing::warn!(index, error = %e, "skipping malformed record"),
        }
    }
    Ok(records)
}

/// Encodes records as a pretty-printed JSON array.
pub fn encode_records<T: Serialize>(records: &[T]) -> ModelResult<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Decodes the image map `{plate: [image, ...]}`.
///
/// A single string instead of a list is read as a one-image list. Non-string
/// entries are dropped and each list is capped.
pub fn decode_image_map(text: &str) -> ModelResult<Vec<ImageSet>> {
    let map = match parse_payload(text)? {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        _ => return Err(ModelError::UnexpectedShape { expected: "a JSON object" }),
    };

    Ok(map
        .into_iter()
        .map(|(plate, images)| {
            let images = match images {
                Value::String(single) => vec![single],
                Value::Array(list) => list
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            ImageSet::new(plate, images)
        })
        .collect())
}

/// Encodes the image map. Plates without images are left out.
pub fn encode_image_map(sets: &[ImageSet]) -> ModelResult<String> {
    let map: BTreeMap<&str, &[String]> = sets
        .iter()
        .filter(|set| !set.images.is_empty())
        .map(|set| {
            let keep = set.images.len().min(MAX_IMAGES_PER_PLATE);
            (set.plate.as_str(), &set.images[..keep])
        })
        .collect();
    Ok(serde_json::to_string_pretty(&map)?)
}
