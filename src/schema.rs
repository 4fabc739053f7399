//! Schema loading, caching and traversal helpers.
//!
//! Schemas are fetched once per URL and held process-wide. The cache is an
//! explicit object handed to the pipeline (never an ambient singleton) so
//! tests inject fixed schema content with [`SchemaCache::insert`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::value::{self, Value};

/// Follow at most this many `$ref` hops from one node. Guards against
/// self-referential definitions.
const MAX_REF_HOPS: usize = 16;

#[derive(Debug)]
pub enum SchemaError {
    /// URL unreachable, non-success status, or body that is not JSON.
    Unavailable { url: String, detail: String },
    /// Body parsed as JSON but is not a schema object.
    InvalidSchema { url: String, detail: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Unavailable { url, detail } => {
                write!(f, "schema {} unavailable: {}", url, detail)
            }
            SchemaError::InvalidSchema { url, detail } => {
                write!(f, "schema {} is not a valid schema: {}", url, detail)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// A loaded schema document plus the URL that identifies its version.
#[derive(Debug, Clone)]
pub struct Schema {
    url: String,
    root: Arc<Value>,
}

impl Schema {
    pub fn new(url: impl Into<String>, root: Value) -> Self {
        Schema {
            url: url.into(),
            root: Arc::new(root),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Follows local `$ref` pointers (`#/definitions/...`) to the referenced
    /// node. Unresolvable refs resolve to an empty schema: traversal treats
    /// the subtree as undescribed rather than inventing errors.
    pub fn resolve<'a>(&'a self, node: &'a Value) -> &'a Value {
        static EMPTY: Value = Value::Object(Vec::new());
        let mut current = node;
        for _ in 0..MAX_REF_HOPS {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return current;
            };
            match self.lookup_pointer(reference) {
                Some(target) => current = target,
                None => return &EMPTY,
            }
        }
        &EMPTY
    }

    fn lookup_pointer(&self, reference: &str) -> Option<&Value> {
        let pointer = reference.strip_prefix('#')?;
        let mut current: &Value = &self.root;
        for raw in pointer.split('/').skip(1) {
            let key = raw.replace("~1", "/").replace("~0", "~");
            current = current.get(&key)?;
        }
        Some(current)
    }

    /// Declared properties of an object schema node, `$ref`s resolved.
    pub fn properties<'a>(&'a self, node: &'a Value) -> &'a [(String, Value)] {
        self.resolve(node)
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&[])
    }

    /// Item schema of an array schema node, `$ref`s resolved.
    pub fn items<'a>(&'a self, node: &'a Value) -> Option<&'a Value> {
        self.resolve(node).get("items")
    }

    /// Required property names of an object schema node.
    pub fn required<'a>(&'a self, node: &'a Value) -> Vec<&'a str> {
        self.resolve(node)
            .get("required")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Top-level properties declared as arrays. Drives spreadsheet sheet-name
    /// recognition: each sheet must feed one of these fields.
    pub fn top_level_array_fields(&self) -> Vec<String> {
        self.properties(&self.root)
            .iter()
            .filter(|(_, prop)| {
                let resolved = self.resolve(prop);
                resolved.get("type").and_then(Value::as_str) == Some("array")
                    || resolved.get("items").is_some()
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Process-wide schema cache keyed by URL. Content is immutable once fetched;
/// refresh happens only on process restart or explicit [`SchemaCache::clear`].
pub struct SchemaCache {
    client: reqwest::blocking::Client,
    entries: Mutex<HashMap<String, Schema>>,
    /// Per-URL gates serializing first fetches, so concurrent callers of the
    /// same URL produce one HTTP request.
    fetch_gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self::with_client(client)
    }

    /// Builds a cache around a preconfigured HTTP client.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        SchemaCache {
            client,
            entries: Mutex::new(HashMap::new()),
            fetch_gates: Mutex::new(HashMap::new()),
        }
    }

    /// Seeds the cache with fixed content. Used by tests and by callers that
    /// ship schemas on disk.
    pub fn insert(&self, url: impl Into<String>, root: Value) {
        let url = url.into();
        let schema = Schema::new(url.clone(), root);
        self.entries
            .lock()
            .expect("schema cache lock poisoned")
            .insert(url, schema);
    }

    /// Returns the schema for `url`, fetching it over HTTP on first use.
    /// Concurrent first fetches of one URL collapse into a single request;
    /// the losers find the entry cached once the winner inserts it.
    pub fn fetch(&self, url: &str) -> Result<Schema, SchemaError> {
        if let Some(schema) = self
            .entries
            .lock()
            .expect("schema cache lock poisoned")
            .get(url)
        {
            return Ok(schema.clone());
        }

        let gate = self
            .fetch_gates
            .lock()
            .expect("schema cache lock poisoned")
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _fetching = gate.lock().expect("schema cache lock poisoned");

        if let Some(schema) = self
            .entries
            .lock()
            .expect("schema cache lock poisoned")
            .get(url)
        {
            return Ok(schema.clone());
        }

        let body = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.bytes())
            .map_err(|e| SchemaError::Unavailable {
                url: url.to_string(),
                detail: e.to_string(),
            })?;

        let root = value::parse_document(&body).map_err(|e| SchemaError::Unavailable {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        if !root.is_object() {
            return Err(SchemaError::InvalidSchema {
                url: url.to_string(),
                detail: format!("top level is {}, expected object", root.type_name()),
            });
        }

        let schema = Schema::new(url, root);
        self.entries
            .lock()
            .expect("schema cache lock poisoned")
            .insert(url.to_string(), schema.clone());
        Ok(schema)
    }

    /// Drops all cached schemas.
    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("schema cache lock poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::parse_document;

    fn schema_from(json: &str) -> Schema {
        Schema::new("https://example.org/schema.json", parse_document(json.as_bytes()).unwrap())
    }

    #[test]
    fn resolves_local_refs() {
        let schema = schema_from(
            r##"{
                "properties": {"grant": {"$ref": "#/definitions/Grant"}},
                "definitions": {"Grant": {"type": "object", "required": ["id"]}}
            }"##,
        );
        let grant = schema.root().get("properties").unwrap().get("grant").unwrap();
        assert_eq!(schema.required(grant), vec!["id"]);
    }

    #[test]
    fn unresolvable_ref_is_empty_schema() {
        let schema =
            schema_from(r##"{"properties": {"x": {"$ref": "#/definitions/Missing"}}}"##);
        let x = schema.root().get("properties").unwrap().get("x").unwrap();
        assert!(schema.properties(x).is_empty());
        assert!(schema.required(x).is_empty());
    }

    #[test]
    fn top_level_array_fields_listed() {
        let schema = schema_from(
            r#"{
                "properties": {
                    "grants": {"type": "array", "items": {"type": "object"}},
                    "publisher": {"type": "object"},
                    "version": {"type": "string"}
                }
            }"#,
        );
        assert_eq!(schema.top_level_array_fields(), vec!["grants"]);
    }

    #[test]
    fn concurrent_first_fetches_hit_the_network_once() {
        use std::io::{Read, Write};
        use std::sync::atomic::{AtomicUsize, Ordering};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let server_hits = hits.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                server_hits.fetch_add(1, Ordering::SeqCst);
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let body = br#"{"properties": {}}"#;
                let _ = write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(body);
            }
        });

        let cache = Arc::new(SchemaCache::new());
        let url = format!("http://{}/schema.json", addr);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let url = url.clone();
            handles.push(std::thread::spawn(move || cache.fetch(&url).unwrap()));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        cache.fetch(&url).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_insert_short_circuits_fetch() {
        let cache = SchemaCache::new();
        cache.insert(
            "https://example.org/s.json",
            parse_document(br#"{"properties": {}}"#).unwrap(),
        );
        let schema = cache.fetch("https://example.org/s.json").unwrap();
        assert_eq!(schema.url(), "https://example.org/s.json");
    }
}
