//! Upload file-type detection.
//!
//! Uses the file extension when present, otherwise sniffs the first
//! meaningful byte: a leading `{` or `[` (after optional UTF-8 BOM and
//! whitespace) is taken as JSON. Anything else is an unrecognised upload.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Json,
    Csv,
    Xlsx,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Json => f.write_str("json"),
            FileType::Csv => f.write_str("csv"),
            FileType::Xlsx => f.write_str("xlsx"),
        }
    }
}

/// The upload could not be identified as json, csv or xlsx.
#[derive(Debug)]
pub struct InputFormatError {
    pub file_name: String,
}

impl fmt::Display for InputFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not recognise the file type of {:?}: only json, csv and xlsx are accepted",
            self.file_name
        )
    }
}

impl std::error::Error for InputFormatError {}

/// Identifies the upload format from its name and leading bytes.
pub fn detect(file_name: &str, bytes: &[u8]) -> Result<FileType, InputFormatError> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".json") {
        return Ok(FileType::Json);
    }
    if lower.ends_with(".csv") {
        return Ok(FileType::Csv);
    }
    if lower.ends_with(".xlsx") {
        return Ok(FileType::Xlsx);
    }
    if sniff_json(bytes) {
        return Ok(FileType::Json);
    }
    Err(InputFormatError {
        file_name: file_name.to_string(),
    })
}

fn sniff_json(bytes: &[u8]) -> bool {
    let without_bom = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    without_bom
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|b| *b == b'{' || *b == b'[')
        .unwrap_or(false)
}
