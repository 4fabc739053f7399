//! On-disk artifacts: the converted document and cached validation results.
//!
//! Every write is write-temp-then-rename inside the destination directory,
//! so a cancelled or crashed run never leaves a truncated artifact behind.
//! Cached validation results carry a content key (SHA-256 over the canonical
//! document bytes and the schema URL); a cache file whose key no longer
//! matches is ignored rather than replayed.

use std::fs;
use std::path::Path as FsPath;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::validate::ValidationError;
use crate::value::{self, Value};

/// File name of the converted canonical document inside an artifact dir.
pub const CONVERTED_FILE: &str = "converted.json";
/// File name of the cached validation errors inside an artifact dir.
pub const VALIDATION_FILE: &str = "validation_errors.json";

/// Content key binding cached validation results to one (document, schema)
/// pair.
pub fn content_key(document: &Value, schema_url: &str) -> String {
    let canonical = serde_json::to_vec(&value::to_serde(document)).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hasher.update(schema_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedValidation {
    key: String,
    errors: Vec<ValidationError>,
}

/// Writes JSON atomically: temp file in the same directory, then rename.
pub fn write_json_atomic<T: Serialize>(path: &FsPath, payload: &T) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("artifact path {} has no parent directory", path.display()))?;
    let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
    let bytes = serde_json::to_vec_pretty(payload)
        .with_context(|| format!("failed to serialize artifact {}", path.display()))?;
    fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        // Leave nothing behind when the rename itself fails.
        let _ = fs::remove_file(&tmp);
        return Err(e)
            .with_context(|| format!("failed to move artifact into place at {}", path.display()));
    }
    Ok(())
}

/// Writes the converted canonical document.
pub fn write_converted(dir: &FsPath, document: &Value) -> Result<()> {
    write_json_atomic(&dir.join(CONVERTED_FILE), &value::to_serde(document))
}

/// Stores validation results under `key`.
pub fn store_validation(dir: &FsPath, key: &str, errors: &[ValidationError]) -> Result<()> {
    let cached = CachedValidation {
        key: key.to_string(),
        errors: errors.to_vec(),
    };
    write_json_atomic(&dir.join(VALIDATION_FILE), &cached)
}

/// Loads cached validation results if present and keyed to `key`. A missing,
/// unreadable or stale cache file reads as a miss.
pub fn load_validation(dir: &FsPath, key: &str) -> Option<Vec<ValidationError>> {
    let bytes = fs::read(dir.join(VALIDATION_FILE)).ok()?;
    let cached: CachedValidation = serde_json::from_slice(&bytes).ok()?;
    if cached.key != key {
        return None;
    }
    Some(cached.errors)
}
