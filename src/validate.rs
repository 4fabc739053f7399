//! Schema Validator.
//!
//! Walks the document against its schema depth-first in document order and
//! collects every violation. Two deliberate departures from stock JSON
//! Schema semantics:
//!
//! * `patternProperties` is never evaluated. Loosely-specified schemas in
//!   this domain produce false positives through it; skipping it is a
//!   documented limitation, not a bug.
//! * `uniqueItems` is replaced by a uniqueness check over configured
//!   identifying fields (usually `id`) instead of deep value equality. Each
//!   duplicate group yields one error carrying the colliding value and every
//!   colliding element path.
//!
//! Unknown extra fields never produce errors here; they are the
//! additional-field detector's concern.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::schema::Schema;
use crate::value::{Path, Value};

/// Which schema rule a [`ValidationError`] violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Type,
    Required,
    Enum,
    Format,
    MinLength,
    MaxLength,
    Minimum,
    Maximum,
    Pattern,
    UniqueIds,
}

/// Extra payload for a uniqueness violation: the colliding identifying value
/// and the paths of every element sharing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub value: String,
    pub paths: Vec<Path>,
}

/// One schema violation. Ordered by document traversal order within the
/// sequence returned from [`validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: Path,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<DuplicateGroup>,
}

/// Validates `document` against `schema`. Pure: the same inputs always yield
/// the same ordered error sequence, so results are cacheable by content.
pub fn validate(document: &Value, schema: &Schema, unique_fields: &[String]) -> Vec<ValidationError> {
    let mut walker = Walker {
        schema,
        unique_fields,
        errors: Vec::new(),
    };
    walker.walk(document, schema.root(), &Path::root());
    walker.errors
}

struct Walker<'a> {
    schema: &'a Schema,
    unique_fields: &'a [String],
    errors: Vec<ValidationError>,
}

impl Walker<'_> {
    fn walk(&mut self, value: &Value, node: &Value, path: &Path) {
        let node = self.schema.resolve(node);

        self.check_type(value, node, path);
        self.check_enum(value, node, path);
        self.check_string_keywords(value, node, path);
        self.check_number_keywords(value, node, path);

        match value {
            Value::Object(entries) => {
                self.check_required(value, node, path);
                let properties = self.schema.properties(node);
                for (key, child) in entries {
                    if let Some((_, prop)) = properties.iter().find(|(name, _)| name == key) {
                        self.walk(child, prop, &path.push_key(key));
                    }
                    // Undeclared keys tolerated; patternProperties skipped.
                }
            }
            Value::Array(items) => {
                if node.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
                    self.check_unique_ids(items, path);
                }
                if let Some(item_schema) = self.schema.items(node) {
                    for (i, item) in items.iter().enumerate() {
                        self.walk(item, item_schema, &path.push_index(i));
                    }
                }
            }
            _ => {}
        }
    }

    fn push(&mut self, path: &Path, kind: ErrorKind, message: String) {
        self.errors.push(ValidationError {
            path: path.clone(),
            kind,
            message,
            duplicates: None,
        });
    }

    fn check_type(&mut self, value: &Value, node: &Value, path: &Path) {
        let Some(declared) = node.get("type") else {
            return;
        };
        let allowed: Vec<&str> = match declared {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => return,
        };
        if allowed.is_empty() {
            return;
        }
        let matches = allowed.iter().any(|t| type_matches(value, t));
        if !matches {
            self.push(
                path,
                ErrorKind::Type,
                format!("{} is not of type {}", value.type_name(), allowed.join(" or ")),
            );
        }
    }

    fn check_required(&mut self, value: &Value, node: &Value, path: &Path) {
        for name in self.schema.required(node) {
            if value.get(name).is_none() {
                self.push(
                    path,
                    ErrorKind::Required,
                    format!("{:?} is missing but required", name),
                );
            }
        }
    }

    fn check_enum(&mut self, value: &Value, node: &Value, path: &Path) {
        let Some(Value::Array(allowed)) = node.get("enum") else {
            return;
        };
        if !allowed.contains(value) {
            self.push(
                path,
                ErrorKind::Enum,
                format!("value is not one of the {} allowed values", allowed.len()),
            );
        }
    }

    fn check_string_keywords(&mut self, value: &Value, node: &Value, path: &Path) {
        let Value::String(s) = value else {
            return;
        };
        if let Some(format) = node.get("format").and_then(Value::as_str) {
            if !format_matches(s, format) {
                self.push(
                    path,
                    ErrorKind::Format,
                    format!("{:?} is not a valid {}", s, format),
                );
            }
        }
        let len = rust_decimal::Decimal::from(s.chars().count() as u64);
        if let Some(min) = node.get("minLength").and_then(Value::as_number) {
            if len < min {
                self.push(
                    path,
                    ErrorKind::MinLength,
                    format!("string is shorter than minLength {}", min),
                );
            }
        }
        if let Some(max) = node.get("maxLength").and_then(Value::as_number) {
            if len > max {
                self.push(
                    path,
                    ErrorKind::MaxLength,
                    format!("string is longer than maxLength {}", max),
                );
            }
        }
        if let Some(pattern) = node.get("pattern").and_then(Value::as_str) {
            // A pattern that fails to compile is a malformed schema segment:
            // skipped, never raised.
            if let Ok(re) = Regex::new(pattern) {
                if !re.is_match(s) {
                    self.push(
                        path,
                        ErrorKind::Pattern,
                        format!("{:?} does not match pattern {:?}", s, pattern),
                    );
                }
            }
        }
    }

    fn check_number_keywords(&mut self, value: &Value, node: &Value, path: &Path) {
        let Value::Number(n) = value else {
            return;
        };
        if let Some(min) = node.get("minimum").and_then(Value::as_number) {
            if *n < min {
                self.push(
                    path,
                    ErrorKind::Minimum,
                    format!("{} is less than minimum {}", n, min),
                );
            }
        }
        if let Some(max) = node.get("maximum").and_then(Value::as_number) {
            if *n > max {
                self.push(
                    path,
                    ErrorKind::Maximum,
                    format!("{} is greater than maximum {}", n, max),
                );
            }
        }
    }

    /// Replaced `uniqueItems`: group elements by their identifying-field
    /// values and report one error per group of two or more.
    fn check_unique_ids(&mut self, items: &[Value], path: &Path) {
        // (identifying value, element paths), insertion-ordered.
        let mut groups: Vec<(String, Vec<Path>)> = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let Some(id) = self.identifying_value(item) else {
                continue;
            };
            let element_path = path.push_index(i);
            match groups.iter_mut().find(|(value, _)| *value == id) {
                Some((_, paths)) => paths.push(element_path),
                None => groups.push((id, vec![element_path])),
            }
        }
        for (value, paths) in groups {
            if paths.len() > 1 {
                let field_list = self.unique_fields.join(", ");
                self.errors.push(ValidationError {
                    path: path.clone(),
                    kind: ErrorKind::UniqueIds,
                    message: format!(
                        "non-unique {} value {:?} appears {} times",
                        field_list,
                        value,
                        paths.len()
                    ),
                    duplicates: Some(DuplicateGroup { value, paths }),
                });
            }
        }
    }

    fn identifying_value(&self, item: &Value) -> Option<String> {
        let mut parts = Vec::new();
        for field in self.unique_fields {
            if let Some(v) = item.get(field) {
                parts.push(scalar_repr(v));
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\u{1f}"))
        }
    }
}

fn scalar_repr(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(d) => d.normalize().to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) => "[array]".to_string(),
        Value::Object(_) => "[object]".to_string(),
    }
}

fn type_matches(value: &Value, declared: &str) -> bool {
    match declared {
        "null" => matches!(value, Value::Null),
        "boolean" => matches!(value, Value::Bool(_)),
        "string" => matches!(value, Value::String(_)),
        "array" => matches!(value, Value::Array(_)),
        "object" => matches!(value, Value::Object(_)),
        "number" => matches!(value, Value::Number(_)),
        "integer" => match value {
            Value::Number(d) => d.fract().is_zero(),
            _ => false,
        },
        _ => true,
    }
}

fn format_matches(s: &str, format: &str) -> bool {
    match format {
        "date-time" => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
        "date" => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        "uri" => {
            let mut chars = s.chars();
            chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
                && s.contains(':')
                && !s.contains(char::is_whitespace)
        }
        "email" => {
            let mut halves = s.splitn(2, '@');
            let local = halves.next().unwrap_or("");
            let domain = halves.next().unwrap_or("");
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        // Unknown formats pass, matching permissive draft-4 behavior.
        _ => true,
    }
}
