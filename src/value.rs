//! Tagged JSON value tree used throughout the pipeline.
//!
//! Documents are held as an explicit recursive enum rather than
//! `serde_json::Value` for two reasons: object entries must preserve source
//! order (error ordering and detector idempotence are defined in document
//! traversal order), and numbers must survive as exact decimals so monetary
//! values round-trip without floating-point drift.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One node of a parsed document or schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Decimal),
    String(String),
    Array(Vec<Value>),
    /// Entries keep the order they appeared in the source document.
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Looks up a key on an object node. `None` for non-objects.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// JSON type name as used in validation messages ("string", "object", ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// One step into a document: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Ordered location of a node within a document, displayed slash-joined
/// (`grants/0/amountAwarded`).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(pub Vec<Segment>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn push_key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.to_string()));
        Path(segments)
    }

    pub fn push_index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Path(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Same path with array index segments removed. Used by the
    /// additional-field detector so repeated records fold into one entry.
    pub fn shape(&self) -> Path {
        Path(
            self.0
                .iter()
                .filter(|s| matches!(s, Segment::Key(_)))
                .cloned()
                .collect(),
        )
    }

    /// Parses a slash-joined path. Purely numeric segments become indices.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Path::root();
        }
        Path(
            text.split('/')
                .map(|part| match part.parse::<usize>() {
                    Ok(i) => Segment::Index(i),
                    Err(_) => Segment::Key(part.to_string()),
                })
                .collect(),
        )
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match segment {
                Segment::Key(k) => f.write_str(k)?,
                Segment::Index(n) => write!(f, "{}", n)?,
            }
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Path::parse(&text))
    }
}

/// Document parse failure. `Syntax` carries the parser's own message so the
/// caller can surface it verbatim.
#[derive(Debug)]
pub enum ParseError {
    Syntax(String),
    /// A numeric literal that does not fit exact decimal representation.
    NumberRange(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Syntax(msg) => write!(f, "malformed JSON: {}", msg),
            ParseError::NumberRange(lit) => {
                write!(f, "number {} does not fit exact decimal representation", lit)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses raw JSON bytes into a [`Value`] tree, keeping object order and
/// exact decimal numbers.
pub fn parse_document(bytes: &[u8]) -> Result<Value, ParseError> {
    let raw: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::Syntax(e.to_string()))?;
    from_serde(raw)
}

/// Converts a `serde_json::Value` (parsed with `arbitrary_precision`) into a
/// [`Value`] tree.
pub fn from_serde(raw: serde_json::Value) -> Result<Value, ParseError> {
    Ok(match raw {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(parse_decimal(&n.to_string())?),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_serde(item)?);
            }
            Value::Array(out)
        }
        serde_json::Value::Object(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (k, v) in map {
                entries.push((k, from_serde(v)?));
            }
            Value::Object(entries)
        }
    })
}

fn parse_decimal(literal: &str) -> Result<Decimal, ParseError> {
    literal
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(literal))
        .map_err(|_| ParseError::NumberRange(literal.to_string()))
}

/// Converts back to `serde_json::Value` for artifact writing.
pub fn to_serde(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(d) => d
            .to_string()
            .parse::<serde_json::Number>()
            .map(serde_json::Value::Number)
            .unwrap_or_else(|_| serde_json::Value::String(d.to_string())),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_serde).collect()),
        Value::Object(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(k.clone(), to_serde(v));
            }
            serde_json::Value::Object(map)
        }
    }
}
