//! Format Normalizer: turns an upload into canonical nested JSON.
//!
//! JSON uploads get a well-formedness check and a top-level-shape check only.
//! CSV and XLSX uploads are reconstructed into schema-shaped JSON: column
//! headers encode nested paths (`parties/0/id`), one row is one record, and
//! each workbook sheet feeds one top-level array field of the package.
//!
//! On any failure no partial result is produced.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::formats::FileType;
use crate::value::{self, ParseError, Path, Segment, Value};

/// Decompressed-size cap for a single workbook XML entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum ConversionError {
    /// JSON upload that does not parse; carries the parser message verbatim.
    MalformedJson(String),
    /// Structurally unusable input: non-object top level, non-contiguous
    /// array indices, conflicting header shapes, unreadable spreadsheet.
    MalformedStructure(String),
    /// A workbook where no sheet name matched a recognised package field.
    UnrecognizedSheet { sheets: Vec<String> },
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::MalformedJson(msg) => write!(f, "malformed JSON: {}", msg),
            ConversionError::MalformedStructure(msg) => {
                write!(f, "malformed structure: {}", msg)
            }
            ConversionError::UnrecognizedSheet { sheets } => write!(
                f,
                "no sheet matched a recognised field (sheets: {})",
                sheets.join(", ")
            ),
        }
    }
}

impl std::error::Error for ConversionError {}

/// Non-fatal conversion finding, surfaced alongside the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionWarning {
    pub sheet: Option<String>,
    pub message: String,
}

/// Output of [`normalize`]: the canonical document plus which format was
/// converted and any warnings gathered on the way.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub format: FileType,
    pub document: Value,
    pub warnings: Vec<ConversionWarning>,
}

/// Top-level array fields a spreadsheet may feed. The primary field takes
/// rows from CSV input and from the sheet sharing its name.
#[derive(Debug, Clone)]
pub struct PackageFields {
    pub primary: String,
    pub others: Vec<String>,
}

impl PackageFields {
    pub fn new(primary: impl Into<String>, others: Vec<String>) -> Self {
        PackageFields {
            primary: primary.into(),
            others,
        }
    }

    /// Canonical field name for a sheet, matched case-insensitively.
    fn recognise(&self, sheet: &str) -> Option<&str> {
        if sheet.eq_ignore_ascii_case(&self.primary) {
            return Some(&self.primary);
        }
        self.others
            .iter()
            .find(|f| sheet.eq_ignore_ascii_case(f))
            .map(String::as_str)
    }
}

/// Converts upload bytes of `format` into canonical nested JSON.
pub fn normalize(
    bytes: &[u8],
    format: FileType,
    fields: &PackageFields,
) -> Result<ConversionResult, ConversionError> {
    match format {
        FileType::Json => normalize_json(bytes),
        FileType::Csv => normalize_csv(bytes, fields),
        FileType::Xlsx => normalize_xlsx(bytes, fields),
    }
}

fn normalize_json(bytes: &[u8]) -> Result<ConversionResult, ConversionError> {
    let document = value::parse_document(bytes).map_err(|e| match e {
        ParseError::Syntax(msg) => ConversionError::MalformedJson(msg),
        ParseError::NumberRange(_) => ConversionError::MalformedJson(e.to_string()),
    })?;
    if !document.is_object() {
        return Err(ConversionError::MalformedStructure(format!(
            "top level is {}, expected an object",
            document.type_name()
        )));
    }
    Ok(ConversionResult {
        format: FileType::Json,
        document,
        warnings: Vec::new(),
    })
}

fn normalize_csv(bytes: &[u8], fields: &PackageFields) -> Result<ConversionResult, ConversionError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ConversionError::MalformedStructure(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    let (columns, mut warnings) = parse_headers(&headers, None);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ConversionError::MalformedStructure(e.to_string()))?;
        let cells: Vec<Option<Value>> = row
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    None
                } else {
                    Some(Value::String(cell.to_string()))
                }
            })
            .collect();
        if cells.iter().all(Option::is_none) {
            continue;
        }
        records.push(build_record(&columns, cells)?);
    }

    if records.is_empty() {
        warnings.push(ConversionWarning {
            sheet: None,
            message: "no data rows found".to_string(),
        });
    }

    Ok(ConversionResult {
        format: FileType::Csv,
        document: Value::Object(vec![(fields.primary.clone(), Value::Array(records))]),
        warnings,
    })
}

/// Resolves headers to paths, deduplicating repeats. A repeated header keeps
/// its first column; later columns are dropped with a warning (ambiguous).
fn parse_headers(
    headers: &[String],
    sheet: Option<&str>,
) -> (Vec<Option<Path>>, Vec<ConversionWarning>) {
    let mut seen: Vec<&str> = Vec::new();
    let mut warnings = Vec::new();
    let mut columns = Vec::with_capacity(headers.len());
    for header in headers {
        let trimmed = header.trim();
        if trimmed.is_empty() {
            columns.push(None);
            continue;
        }
        if seen.contains(&trimmed) {
            warnings.push(ConversionWarning {
                sheet: sheet.map(str::to_string),
                message: format!("ambiguous column header {:?}: repeated column ignored", trimmed),
            });
            columns.push(None);
            continue;
        }
        seen.push(trimmed);
        columns.push(Some(Path::parse(trimmed)));
    }
    (columns, warnings)
}

/// Reassembles one spreadsheet row into a nested record.
fn build_record(
    columns: &[Option<Path>],
    cells: Vec<Option<Value>>,
) -> Result<Value, ConversionError> {
    let mut root = Node::Object(Vec::new());
    for (column, cell) in columns.iter().zip(cells) {
        let (Some(path), Some(cell)) = (column, cell) else {
            continue;
        };
        insert(&mut root, path, &path.0, cell)?;
    }
    finish(root, &Path::root())
}

/// Intermediate tree during unflattening. Arrays are sparse until [`finish`]
/// checks index contiguity.
enum Node {
    Leaf(Value),
    Object(Vec<(String, Node)>),
    Array(BTreeMap<usize, Node>),
}

fn insert(
    node: &mut Node,
    full_path: &Path,
    remaining: &[Segment],
    cell: Value,
) -> Result<(), ConversionError> {
    let Some((head, rest)) = remaining.split_first() else {
        // Empty header paths never reach here: parse_headers drops them.
        return Err(conflict(full_path));
    };

    match head {
        Segment::Key(key) => {
            let Node::Object(entries) = node else {
                return Err(conflict(full_path));
            };
            let position = match entries.iter().position(|(k, _)| k == key) {
                Some(i) => i,
                None => {
                    entries.push((key.clone(), empty_for(rest)));
                    entries.len() - 1
                }
            };
            descend(&mut entries[position].1, full_path, rest, cell)
        }
        Segment::Index(index) => {
            let Node::Array(slots) = node else {
                return Err(conflict(full_path));
            };
            let child = slots.entry(*index).or_insert_with(|| empty_for(rest));
            descend(child, full_path, rest, cell)
        }
    }
}

fn descend(
    child: &mut Node,
    full_path: &Path,
    rest: &[Segment],
    cell: Value,
) -> Result<(), ConversionError> {
    if rest.is_empty() {
        match child {
            Node::Leaf(slot) => {
                *slot = cell;
                Ok(())
            }
            _ => Err(conflict(full_path)),
        }
    } else {
        insert(child, full_path, rest, cell)
    }
}

fn empty_for(rest: &[Segment]) -> Node {
    match rest.first() {
        None => Node::Leaf(Value::Null),
        Some(Segment::Key(_)) => Node::Object(Vec::new()),
        Some(Segment::Index(_)) => Node::Array(BTreeMap::new()),
    }
}

fn conflict(path: &Path) -> ConversionError {
    ConversionError::MalformedStructure(format!(
        "column {} conflicts with another column's structure",
        path
    ))
}

/// Converts the intermediate tree to a [`Value`], rejecting arrays whose
/// indices are not contiguous from 0.
fn finish(node: Node, at: &Path) -> Result<Value, ConversionError> {
    match node {
        Node::Leaf(v) => Ok(v),
        Node::Object(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, child) in entries {
                let child_path = at.push_key(&key);
                out.push((key, finish(child, &child_path)?));
            }
            Ok(Value::Object(out))
        }
        Node::Array(slots) => {
            let len = slots.len();
            let mut out = Vec::with_capacity(len);
            for (expected, (index, child)) in slots.into_iter().enumerate() {
                if index != expected {
                    return Err(ConversionError::MalformedStructure(format!(
                        "array indices under {} are not contiguous from 0 (missing index {})",
                        at, expected
                    )));
                }
                out.push(finish(child, &at.push_index(index))?);
            }
            Ok(Value::Array(out))
        }
    }
}

/// Inverse of unflattening: one record back to `(header, value)` pairs in
/// document order. Nulls and empty containers produce no pair.
pub fn flatten_record(record: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(record, &Path::root(), &mut out);
    out
}

fn flatten_into(value: &Value, at: &Path, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((at.to_string(), b.to_string())),
        Value::Number(d) => out.push((at.to_string(), d.to_string())),
        Value::String(s) => out.push((at.to_string(), s.clone())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(item, &at.push_index(i), out);
            }
        }
        Value::Object(entries) => {
            for (key, child) in entries {
                flatten_into(child, &at.push_key(key), out);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

fn normalize_xlsx(
    bytes: &[u8],
    fields: &PackageFields,
) -> Result<ConversionResult, ConversionError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ConversionError::MalformedStructure(e.to_string()))?;

    let sheets = read_workbook_sheets(&mut archive)?;
    let rels = read_workbook_rels(&mut archive)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let fallback_entries = list_worksheet_entries(&mut archive);

    let mut warnings = Vec::new();
    let mut document_entries: Vec<(String, Value)> = Vec::new();
    let mut recognised_any = false;

    for (sheet_index, sheet) in sheets.iter().enumerate() {
        let sheet_name = &sheet.name;
        let Some(field) = fields.recognise(sheet_name).map(str::to_string) else {
            warnings.push(ConversionWarning {
                sheet: Some(sheet_name.clone()),
                message: format!("sheet {:?} does not match a recognised field; skipped", sheet_name),
            });
            continue;
        };
        recognised_any = true;

        // Sheet order and part numbering diverge after sheet reordering, so
        // the relationship id is authoritative when present.
        let entry_name = sheet
            .rel_id
            .as_deref()
            .and_then(|rid| rels.iter().find(|(id, _)| id == rid).map(|(_, t)| t.clone()))
            .or_else(|| fallback_entries.get(sheet_index).cloned());
        let Some(entry_name) = entry_name else {
            return Err(ConversionError::MalformedStructure(format!(
                "workbook lists sheet {:?} but the worksheet part is missing",
                sheet_name
            )));
        };
        let xml = read_zip_entry_bounded(&mut archive, &entry_name)?;
        let rows = parse_sheet_rows(&xml, &shared_strings)?;

        let mut row_iter = rows.into_iter();
        let Some(header_row) = row_iter.next() else {
            warnings.push(ConversionWarning {
                sheet: Some(sheet_name.clone()),
                message: "sheet is empty".to_string(),
            });
            document_entries.push((field, Value::Array(Vec::new())));
            continue;
        };
        let headers: Vec<String> = header_row
            .into_iter()
            .map(|cell| match cell {
                Some(Value::String(s)) => s,
                Some(other) => flatten_scalar(&other),
                None => String::new(),
            })
            .collect();
        let (columns, mut sheet_warnings) = parse_headers(&headers, Some(sheet_name));
        warnings.append(&mut sheet_warnings);

        let mut records = Vec::new();
        for row in row_iter {
            if row.iter().all(Option::is_none) {
                continue;
            }
            let mut cells = row;
            cells.resize(columns.len(), None);
            records.push(build_record(&columns, cells)?);
        }
        document_entries.push((field, Value::Array(records)));
    }

    if !recognised_any {
        return Err(ConversionError::UnrecognizedSheet {
            sheets: sheets.into_iter().map(|s| s.name).collect(),
        });
    }

    Ok(ConversionResult {
        format: FileType::Xlsx,
        document: Value::Object(document_entries),
        warnings,
    })
}

fn flatten_scalar(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(d) => d.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ConversionError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ConversionError::MalformedStructure(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ConversionError::MalformedStructure(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ConversionError::MalformedStructure(format!(
            "workbook entry {} exceeds size limit",
            name
        )));
    }
    Ok(out)
}

/// One `<sheet>` declaration from `xl/workbook.xml`.
struct WorkbookSheet {
    name: String,
    rel_id: Option<String>,
}

/// Sheet declarations from `xl/workbook.xml`, in workbook order.
fn read_workbook_sheets(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<WorkbookSheet>, ConversionError> {
    let xml = read_zip_entry_bounded(archive, "xl/workbook.xml")?;
    let mut sheets = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    let mut name = None;
                    let mut rel_id = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"name" => {
                                name = Some(
                                    String::from_utf8_lossy(attr.value.as_ref()).into_owned(),
                                );
                            }
                            // `r:id`; `sheetId` has a different local name.
                            b"id" => {
                                rel_id = Some(
                                    String::from_utf8_lossy(attr.value.as_ref()).into_owned(),
                                );
                            }
                            _ => {}
                        }
                    }
                    if let Some(name) = name {
                        sheets.push(WorkbookSheet { name, rel_id });
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ConversionError::MalformedStructure(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if sheets.is_empty() {
        return Err(ConversionError::MalformedStructure(
            "workbook declares no sheets".to_string(),
        ));
    }
    Ok(sheets)
}

/// Relationship id to worksheet part path, from `xl/_rels/workbook.xml.rels`.
/// Absent rels read as empty; resolution then falls back to part numbering.
fn read_workbook_rels(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<(String, String)>, ConversionError> {
    if archive.by_name("xl/_rels/workbook.xml.rels").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels")?;
    let mut rels = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut target = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"Id" => {
                                id = Some(
                                    String::from_utf8_lossy(attr.value.as_ref()).into_owned(),
                                );
                            }
                            b"Target" => {
                                target = Some(
                                    String::from_utf8_lossy(attr.value.as_ref()).into_owned(),
                                );
                            }
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(target)) = (id, target) {
                        rels.push((id, workbook_part_path(&target)));
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ConversionError::MalformedStructure(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Rels targets are relative to `xl/` unless they start with `/`.
fn workbook_part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

/// Worksheet part names sorted by sheet number. Fallback for workbooks whose
/// sheets carry no relationship ids; position then matches workbook order.
fn list_worksheet_entries(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ConversionError> {
    // Absent in workbooks with no string cells.
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ConversionError::MalformedStructure(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Parses one worksheet into a dense grid of optional cell values.
fn parse_sheet_rows(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Vec<Vec<Option<Value>>>, ConversionError> {
    let mut rows: Vec<Vec<Option<Value>>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut current_row: Vec<Option<Value>> = Vec::new();
    let mut in_row = false;
    let mut cell_kind = CellKind::Number;
    let mut cell_column: Option<usize> = None;
    let mut in_v = false;
    let mut in_is_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                match e.local_name().as_ref() {
                    b"row" => {
                        in_row = true;
                        current_row = Vec::new();
                    }
                    b"c" if in_row => {
                        cell_kind = CellKind::Number;
                        cell_column = None;
                        for attr in e.attributes().flatten() {
                            match attr.key.local_name().as_ref() {
                                b"r" => {
                                    cell_column = column_index(&attr.value);
                                }
                                b"t" => {
                                    cell_kind = match attr.value.as_ref() {
                                        b"s" => CellKind::SharedString,
                                        b"inlineStr" => CellKind::InlineString,
                                        b"str" => CellKind::FormulaString,
                                        b"b" => CellKind::Bool,
                                        _ => CellKind::Number,
                                    };
                                }
                                _ => {}
                            }
                        }
                    }
                    b"v" => in_v = true,
                    b"t" if cell_kind == CellKind::InlineString => in_is_t = true,
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_v || in_is_t => {
                let raw = te.unescape().unwrap_or_default().into_owned();
                let parsed = if in_is_t {
                    Some(Value::String(raw))
                } else {
                    parse_cell_value(&raw, cell_kind, shared_strings)
                };
                if let Some(v) = parsed {
                    let column = cell_column.unwrap_or(current_row.len());
                    if current_row.len() <= column {
                        current_row.resize(column + 1, None);
                    }
                    current_row[column] = Some(v);
                }
                in_v = false;
                in_is_t = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"row" => {
                    rows.push(std::mem::take(&mut current_row));
                    in_row = false;
                }
                b"v" => in_v = false,
                b"t" => in_is_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ConversionError::MalformedStructure(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Kind of worksheet cell, from the `t` attribute of `<c>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Number,
    SharedString,
    InlineString,
    FormulaString,
    Bool,
}

fn parse_cell_value(raw: &str, kind: CellKind, shared_strings: &[String]) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match kind {
        CellKind::SharedString => {
            let index: usize = trimmed.parse().ok()?;
            shared_strings.get(index).map(|s| Value::String(s.clone()))
        }
        CellKind::InlineString | CellKind::FormulaString => {
            Some(Value::String(trimmed.to_string()))
        }
        CellKind::Bool => Some(Value::Bool(trimmed == "1")),
        CellKind::Number => trimmed
            .parse::<Decimal>()
            .or_else(|_| Decimal::from_scientific(trimmed))
            .ok()
            .map(Value::Number),
    }
}

/// Zero-based column index from a cell reference like `B2` or `AA10`.
fn column_index(cell_ref: &[u8]) -> Option<usize> {
    let letters: Vec<u8> = cell_ref
        .iter()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for letter in letters {
        index = index * 26 + (letter - b'A' + 1) as usize;
    }
    Some(index - 1)
}
