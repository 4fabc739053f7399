//! End-to-end pipeline tests over JSON, CSV and XLSX uploads.
//!
//! XLSX fixtures are built in-test with `zip::ZipWriter` so no binary files
//! live in the repository.

use std::io::Write;
use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::TempDir;

use datavet::aggregate::MetricValue;
use datavet::config::PipelineConfig;
use datavet::convert::ConversionError;
use datavet::formats::FileType;
use datavet::pipeline::{Pipeline, RunOptions, Stage, StageError, UploadInput};
use datavet::schema::SchemaCache;
use datavet::validate::ErrorKind;
use datavet::value::parse_document;

const GRANTS_SCHEMA_URL: &str = "https://example.org/grants-package.json";

fn grants_schema_cache() -> Arc<SchemaCache> {
    let cache = Arc::new(SchemaCache::new());
    cache.insert(
        GRANTS_SCHEMA_URL,
        parse_document(
            br#"{
                "type": "object",
                "required": ["grants"],
                "properties": {
                    "grants": {
                        "type": "array",
                        "uniqueItems": true,
                        "items": {
                            "type": "object",
                            "required": ["id"],
                            "properties": {
                                "id": {"type": "string"},
                                "amountAwarded": {"type": "string"},
                                "currency": {"type": "string"},
                                "parties": {
                                    "type": "array",
                                    "items": {
                                        "type": "object",
                                        "properties": {"id": {"type": "string"}}
                                    }
                                }
                            }
                        }
                    },
                    "publisher": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"name": {"type": "string"}}
                        }
                    }
                }
            }"#,
        )
        .unwrap(),
    );
    cache
}

fn grants_pipeline() -> Pipeline {
    Pipeline::new(
        PipelineConfig::for_grants(GRANTS_SCHEMA_URL),
        grants_schema_cache(),
    )
}

fn run_json(pipeline: &Pipeline, body: &[u8]) -> datavet::pipeline::PipelineReport {
    pipeline.run(
        UploadInput {
            bytes: body,
            file_name: "grants.json",
            declared: None,
        },
        &RunOptions::default(),
    )
}

/// Minimal workbook with the given sheets, each a grid of inline-string and
/// numeric cells (numbers are cells starting with `#`).
fn build_xlsx(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();

        let mut workbook =
            String::from("<?xml version=\"1.0\"?><workbook><sheets>");
        for (i, (name, _)) in sheets.iter().enumerate() {
            workbook.push_str(&format!(
                "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
                name,
                i + 1,
                i + 1
            ));
        }
        workbook.push_str("</sheets></workbook>");
        zip.start_file("xl/workbook.xml", options).unwrap();
        zip.write_all(workbook.as_bytes()).unwrap();

        for (i, (_, rows)) in sheets.iter().enumerate() {
            let mut xml = String::from("<?xml version=\"1.0\"?><worksheet><sheetData>");
            for (r, row) in rows.iter().enumerate() {
                xml.push_str(&format!("<row r=\"{}\">", r + 1));
                for (c, cell) in row.iter().enumerate() {
                    if cell.is_empty() {
                        continue;
                    }
                    let cell_ref = format!("{}{}", column_letter(c), r + 1);
                    if let Some(number) = cell.strip_prefix('#') {
                        xml.push_str(&format!(
                            "<c r=\"{}\"><v>{}</v></c>",
                            cell_ref, number
                        ));
                    } else {
                        xml.push_str(&format!(
                            "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                            cell_ref, cell
                        ));
                    }
                }
                xml.push_str("</row>");
            }
            xml.push_str("</sheetData></worksheet>");
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn column_letter(index: usize) -> String {
    // Single letters cover every fixture here.
    ((b'A' + index as u8) as char).to_string()
}

#[test]
fn duplicate_id_scenario_end_to_end() {
    let pipeline = grants_pipeline();
    let report = run_json(
        &pipeline,
        br#"{"grants": [
            {"id": "1", "amountAwarded": "10.50"},
            {"id": "1", "amountAwarded": "5.00"}
        ]}"#,
    );

    assert_eq!(report.reached, Stage::Done);
    let errors = report.validation_errors.as_ref().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::UniqueIds);
    let group = errors[0].duplicates.as_ref().unwrap();
    let paths: Vec<String> = group.paths.iter().map(|p| p.to_string()).collect();
    assert_eq!(paths, ["grants/0", "grants/1"]);

    // Aggregation ran with ignore_invalid_records and kept exact decimals.
    let aggregates = report.aggregates.as_ref().unwrap();
    assert_eq!(
        aggregates.metrics["total_amount_awarded"],
        MetricValue::Sum("15.50".parse::<Decimal>().unwrap())
    );
}

#[test]
fn csv_upload_produces_nested_records() {
    let pipeline = grants_pipeline();
    let report = pipeline.run(
        UploadInput {
            bytes: b"id,parties/0/id,parties/1/id\n1,P1,P2\n2,P3,P4\n",
            file_name: "grants.csv",
            declared: None,
        },
        &RunOptions::default(),
    );

    assert_eq!(report.reached, Stage::Done);
    assert_eq!(report.file_type, Some(FileType::Csv));
    let document = report.document.as_ref().unwrap();
    let grants = document.get("grants").unwrap().as_array().unwrap();
    assert_eq!(grants.len(), 2);
    assert_eq!(
        grants[0].get("parties").unwrap().as_array().unwrap().len(),
        2
    );
    assert!(report.validation_errors.as_ref().unwrap().is_empty());
}

#[test]
fn xlsx_sheets_feed_top_level_fields() {
    let pipeline = grants_pipeline();
    let bytes = build_xlsx(&[
        (
            "grants",
            &[
                &["id", "amountAwarded"][..],
                &["1", "10.50"][..],
                &["2", "5.00"][..],
            ][..],
        ),
        ("publisher", &[&["name"][..], &["Example Trust"][..]][..]),
        ("scratch", &[&["note"][..], &["ignore me"][..]][..]),
    ]);
    let report = pipeline.run(
        UploadInput {
            bytes: &bytes,
            file_name: "grants.xlsx",
            declared: None,
        },
        &RunOptions::default(),
    );

    assert_eq!(report.reached, Stage::Done);
    let document = report.document.as_ref().unwrap();
    let grants = document.get("grants").unwrap().as_array().unwrap();
    assert_eq!(grants.len(), 2);
    assert_eq!(grants[0].get("id").unwrap().as_str(), Some("1"));
    // The publisher sheet is recognised via the schema's top-level arrays.
    let publisher = document.get("publisher").unwrap().as_array().unwrap();
    assert_eq!(publisher[0].get("name").unwrap().as_str(), Some("Example Trust"));
    // The scratch sheet was skipped with a warning.
    assert_eq!(report.conversion_warnings.len(), 1);
    assert_eq!(
        report.conversion_warnings[0].sheet.as_deref(),
        Some("scratch")
    );
}

#[test]
fn xlsx_with_no_recognised_sheet_fails() {
    let pipeline = grants_pipeline();
    let bytes = build_xlsx(&[("scratch", &[&["a"][..], &["b"][..]][..])]);
    let report = pipeline.run(
        UploadInput {
            bytes: &bytes,
            file_name: "grants.xlsx",
            declared: None,
        },
        &RunOptions::default(),
    );
    let (stage, error) = report.failure.as_ref().unwrap();
    assert_eq!(*stage, Stage::Normalized);
    assert!(matches!(
        error,
        StageError::Conversion(ConversionError::UnrecognizedSheet { .. })
    ));
}

#[test]
fn numeric_xlsx_cells_stay_exact() {
    let pipeline = grants_pipeline();
    let bytes = build_xlsx(&[(
        "grants",
        &[&["id", "score"][..], &["1", "#10.50"][..]][..],
    )]);
    let report = pipeline.run(
        UploadInput {
            bytes: &bytes,
            file_name: "grants.xlsx",
            declared: None,
        },
        &RunOptions::default(),
    );
    let document = report.document.as_ref().unwrap();
    let grants = document.get("grants").unwrap().as_array().unwrap();
    let score = grants[0].get("score").unwrap().as_number().unwrap();
    assert_eq!(score.to_string(), "10.50");
}

#[test]
fn worksheet_parts_follow_workbook_relationships() {
    // Part numbering reversed relative to sheet order, as Excel produces
    // after reordering sheets: grants is rId2 -> sheet2.xml.
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/workbook.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><workbook><sheets><sheet name="grants" sheetId="1" r:id="rId2"/><sheet name="publisher" sheetId="2" r:id="rId1"/></sheets></workbook>"#,
        )
        .unwrap();
        zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/></Relationships>"#,
        )
        .unwrap();
        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>Example Trust</t></is></c></row></sheetData></worksheet>"#,
        )
        .unwrap();
        zip.start_file("xl/worksheets/sheet2.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>id</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>1</t></is></c></row></sheetData></worksheet>"#,
        )
        .unwrap();
        zip.finish().unwrap();
    }

    let fields =
        datavet::convert::PackageFields::new("grants", vec!["publisher".to_string()]);
    let result = datavet::convert::normalize(&buf, FileType::Xlsx, &fields).unwrap();
    let grants = result.document.get("grants").unwrap().as_array().unwrap();
    assert_eq!(grants[0].get("id").unwrap().as_str(), Some("1"));
    let publisher = result.document.get("publisher").unwrap().as_array().unwrap();
    assert_eq!(
        publisher[0].get("name").unwrap().as_str(),
        Some("Example Trust")
    );
}

#[test]
fn xlsx_and_csv_convert_to_the_same_document() {
    let fields = datavet::convert::PackageFields::new("grants", Vec::new());
    let from_csv = datavet::convert::normalize(
        b"id,amountAwarded\n1,10.50\n2,5.00\n",
        FileType::Csv,
        &fields,
    )
    .unwrap();
    let bytes = build_xlsx(&[(
        "grants",
        &[
            &["id", "amountAwarded"][..],
            &["1", "10.50"][..],
            &["2", "5.00"][..],
        ][..],
    )]);
    let from_xlsx = datavet::convert::normalize(&bytes, FileType::Xlsx, &fields).unwrap();
    assert_eq!(from_csv.document, from_xlsx.document);
}

#[test]
fn artifacts_written_and_validation_cache_replayed() {
    let pipeline = grants_pipeline();
    let dir = TempDir::new().unwrap();
    let body = br#"{"grants": [{"id": "1"}, {"id": "1"}]}"#;
    let opts = RunOptions {
        artifact_dir: Some(dir.path().to_path_buf()),
        cancel: None,
    };

    let first = pipeline.run(
        UploadInput {
            bytes: body,
            file_name: "grants.json",
            declared: None,
        },
        &opts,
    );
    assert!(dir.path().join("converted.json").exists());
    assert!(dir.path().join("validation_errors.json").exists());

    // Tamper with the cached message, keeping the key: a second run must
    // replay the cache rather than re-validate.
    let cache_path = dir.path().join("validation_errors.json");
    let mut cached: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&cache_path).unwrap()).unwrap();
    cached["errors"][0]["message"] = serde_json::Value::String("replayed".to_string());
    std::fs::write(&cache_path, serde_json::to_vec(&cached).unwrap()).unwrap();

    let second = pipeline.run(
        UploadInput {
            bytes: body,
            file_name: "grants.json",
            declared: None,
        },
        &opts,
    );
    assert_eq!(
        second.validation_errors.as_ref().unwrap()[0].message,
        "replayed"
    );
    assert_eq!(
        first.validation_errors.as_ref().unwrap().len(),
        second.validation_errors.as_ref().unwrap().len()
    );
}

#[test]
fn record_package_selects_record_schema() {
    let cache = Arc::new(SchemaCache::new());
    cache.insert(
        "https://example.org/release-package.json",
        parse_document(br#"{"type": "object", "properties": {"releases": {"type": "array"}}}"#)
            .unwrap(),
    );
    cache.insert(
        "https://example.org/record-package.json",
        parse_document(br#"{"type": "object", "properties": {"records": {"type": "array"}}}"#)
            .unwrap(),
    );
    let pipeline = Pipeline::new(
        PipelineConfig::for_releases(
            "https://example.org/release-package.json",
            "https://example.org/record-package.json",
        ),
        cache,
    );

    let report = run_json(
        &pipeline,
        br#"{"records": [{"ocid": "ocds-1"}, {"ocid": "ocds-2"}]}"#,
    );
    assert_eq!(
        report.schema_url.as_deref(),
        Some("https://example.org/record-package.json")
    );
    let aggregates = report.aggregates.as_ref().unwrap();
    assert_eq!(aggregates.metrics["record_count"], MetricValue::Count(2));
    assert_eq!(aggregates.metrics["distinct_ocids"], MetricValue::Distinct(2));
}

#[test]
fn empty_package_aggregates_to_zero() {
    let pipeline = grants_pipeline();
    let report = run_json(&pipeline, br#"{"grants": []}"#);
    assert_eq!(report.reached, Stage::Done);
    let aggregates = report.aggregates.as_ref().unwrap();
    assert_eq!(aggregates.metrics["grant_count"], MetricValue::Count(0));
    assert_eq!(
        aggregates.metrics["average_amount_awarded"],
        MetricValue::Average(Decimal::ZERO)
    );
}

#[test]
fn additional_fields_reported_with_counts() {
    let pipeline = grants_pipeline();
    let report = run_json(
        &pipeline,
        br#"{"grants": [
            {"id": "1", "customField": "a"},
            {"id": "2", "customField": "b"}
        ]}"#,
    );
    let fields = report.additional_fields.as_ref().unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].path.to_string(), "grants/customField");
    assert_eq!(fields[0].count, 2);
}
