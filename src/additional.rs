//! Additional-Field Detector.
//!
//! Walks the document and schema trees in parallel and reports every field
//! present in the data but not declared by the schema. Paths are *shape*
//! paths (array indices elided), so the same extra field across every record
//! of an array folds into one entry with a summed occurrence count.
//!
//! Missing schema information for a subtree is treated as "no fields
//! declared": everything under it is additional, and malformed schema
//! segments never raise.

use serde::{Deserialize, Serialize};

use crate::schema::Schema;
use crate::value::{Path, Value};

/// A field present in the data but absent from the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalField {
    /// Shape path, unique within one detection result.
    pub path: Path,
    /// First value seen at this path, stringified for display.
    pub example: String,
    /// Occurrences across all records sharing this path shape.
    pub count: u64,
}

/// Detects additional fields, ordered by descending count then ascending
/// path. Idempotent: identical inputs yield an identical sequence.
pub fn detect(document: &Value, schema: &Schema) -> Vec<AdditionalField> {
    let mut found: Vec<AdditionalField> = Vec::new();
    walk(document, Some(schema.root()), &Path::root(), schema, &mut found);
    found.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));
    found
}

fn walk(
    value: &Value,
    node: Option<&Value>,
    path: &Path,
    schema: &Schema,
    found: &mut Vec<AdditionalField>,
) {
    match value {
        Value::Object(entries) => {
            let properties = node.map(|n| schema.properties(n)).unwrap_or(&[]);
            for (key, child) in entries {
                let declared = properties
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, prop)| prop);
                let child_path = path.push_key(key);
                if declared.is_none() {
                    record(&child_path, child, found);
                }
                // Recurse regardless so nested additional structure under an
                // additional field still surfaces.
                walk(child, declared, &child_path, schema, found);
            }
        }
        Value::Array(items) => {
            let item_schema = node.and_then(|n| schema.items(n));
            for (i, item) in items.iter().enumerate() {
                walk(item, item_schema, &path.push_index(i), schema, found);
            }
        }
        _ => {}
    }
}

fn record(path: &Path, value: &Value, found: &mut Vec<AdditionalField>) {
    let shape = path.shape();
    match found.iter_mut().find(|f| f.path == shape) {
        Some(existing) => existing.count += 1,
        None => found.push(AdditionalField {
            path: shape,
            example: example_repr(value),
            count: 1,
        }),
    }
}

fn example_repr(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(d) => d.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("[array of {}]", items.len()),
        Value::Object(_) => "[object]".to_string(),
    }
}
