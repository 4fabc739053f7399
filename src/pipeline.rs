//! Pipeline Orchestrator.
//!
//! Sequences the full run: normalize → parse → validate → detect additional
//! fields → aggregate, assembling one [`PipelineReport`]. The stage machine
//! is linear with no branching back; a failure at any stage stops the run
//! and the report keeps everything produced before it, so callers can render
//! partial results (conversion succeeded, validation failed, and so on).
//!
//! Schema unavailability is deliberately not a failure: validation and
//! additional-field detection are skipped and the document can still be
//! explored and aggregated.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::additional::{self, AdditionalField};
use crate::aggregate::{self, AggregateError, AggregateResult};
use crate::cache;
use crate::config::PipelineConfig;
use crate::convert::{self, ConversionError, ConversionWarning, PackageFields};
use crate::formats::{self, FileType, InputFormatError};
use crate::schema::SchemaCache;
use crate::validate::{self, ValidationError};
use crate::value::Value;

/// Stages of one run, in order. `Failed` is represented separately as the
/// report's `failure` field so partial results stay addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Uploaded,
    Normalized,
    Parsed,
    Validated,
    FieldsDetected,
    Aggregated,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Uploaded => "uploaded",
            Stage::Normalized => "normalized",
            Stage::Parsed => "parsed",
            Stage::Validated => "validated",
            Stage::FieldsDetected => "fields-detected",
            Stage::Aggregated => "aggregated",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why a stage failed.
#[derive(Debug)]
pub enum StageError {
    InputFormat(InputFormatError),
    Conversion(ConversionError),
    Aggregate(AggregateError),
    /// Artifact IO failure (converted document or validation cache).
    Artifact(anyhow::Error),
    /// The caller abandoned the run.
    Cancelled,
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageError::InputFormat(e) => e.fmt(f),
            StageError::Conversion(e) => e.fmt(f),
            StageError::Aggregate(e) => e.fmt(f),
            StageError::Artifact(e) => write!(f, "artifact write failed: {}", e),
            StageError::Cancelled => f.write_str("run cancelled"),
        }
    }
}

impl std::error::Error for StageError {}

/// Raw upload handed to the pipeline by the surrounding application.
pub struct UploadInput<'a> {
    pub bytes: &'a [u8],
    pub file_name: &'a str,
    /// Format declared by the caller; sniffed from the name/bytes if absent.
    pub declared: Option<FileType>,
}

/// Per-run options.
#[derive(Default)]
pub struct RunOptions {
    /// Directory for on-disk artifacts (converted document, validation
    /// cache). Nothing is written when absent.
    pub artifact_dir: Option<PathBuf>,
    /// Checked between stages; setting it abandons the run.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Everything one run produced. Fields are filled in stage order; a failure
/// leaves later fields `None`.
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: String,
    pub file_type: Option<FileType>,
    pub conversion_warnings: Vec<ConversionWarning>,
    pub document: Option<Value>,
    pub schema_url: Option<String>,
    /// Why the schema could not be loaded, when validation was skipped.
    pub schema_unavailable: Option<String>,
    pub validation_errors: Option<Vec<ValidationError>>,
    pub additional_fields: Option<Vec<AdditionalField>>,
    pub aggregates: Option<AggregateResult>,
    /// Last stage that completed.
    pub reached: Stage,
    pub failure: Option<(Stage, StageError)>,
}

impl PipelineReport {
    fn new() -> Self {
        PipelineReport {
            run_id: Uuid::new_v4().to_string(),
            file_type: None,
            conversion_warnings: Vec::new(),
            document: None,
            schema_url: None,
            schema_unavailable: None,
            validation_errors: None,
            additional_fields: None,
            aggregates: None,
            reached: Stage::Uploaded,
            failure: None,
        }
    }

    fn fail(mut self, stage: Stage, error: StageError) -> Self {
        self.failure = Some((stage, error));
        self
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// The orchestrator. Holds configuration and the process-wide schema cache.
pub struct Pipeline {
    config: PipelineConfig,
    schemas: Arc<SchemaCache>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, schemas: Arc<SchemaCache>) -> Self {
        Pipeline { config, schemas }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the full pipeline over one upload.
    pub fn run(&self, input: UploadInput<'_>, opts: &RunOptions) -> PipelineReport {
        let mut report = PipelineReport::new();

        // Uploaded -> Normalized
        let file_type = match input
            .declared
            .map(Ok)
            .unwrap_or_else(|| formats::detect(input.file_name, input.bytes))
        {
            Ok(ft) => ft,
            Err(e) => return report.fail(Stage::Uploaded, StageError::InputFormat(e)),
        };
        report.file_type = Some(file_type);

        if cancelled(opts) {
            return report.fail(Stage::Normalized, StageError::Cancelled);
        }

        // Sheet recognition uses the schema's declared top-level array
        // fields when the schema is reachable, falling back to config.
        let fields = self.sheet_fields(file_type);

        let conversion = match convert::normalize(input.bytes, file_type, &fields) {
            Ok(c) => c,
            Err(e) => {
                // A JSON body that fails to parse is a parse-stage failure;
                // spreadsheet failures belong to normalization.
                let stage = match file_type {
                    FileType::Json => Stage::Parsed,
                    _ => Stage::Normalized,
                };
                if file_type == FileType::Json {
                    report.reached = Stage::Normalized;
                }
                return report.fail(stage, StageError::Conversion(e));
            }
        };
        report.reached = Stage::Normalized;
        report.conversion_warnings = conversion.warnings.clone();

        let document = conversion.document;
        report.reached = Stage::Parsed;

        if let Some(dir) = &opts.artifact_dir {
            if let Err(e) = cache::write_converted(dir, &document) {
                report.document = Some(document);
                return report.fail(Stage::Parsed, StageError::Artifact(e));
            }
        }

        if cancelled(opts) {
            report.document = Some(document);
            return report.fail(Stage::Validated, StageError::Cancelled);
        }

        // Parsed -> Validated
        let schema_url = self.select_schema_url(&document);
        report.schema_url = Some(schema_url.clone());

        let is_record_package = self.is_record_package(&document);

        match self.schemas.fetch(&schema_url) {
            Ok(schema) => {
                let key = cache::content_key(&document, &schema_url);
                let cached = opts
                    .artifact_dir
                    .as_deref()
                    .and_then(|dir| cache::load_validation(dir, &key));
                let errors = match cached {
                    Some(errors) => errors,
                    None => {
                        let errors = validate::validate(
                            &document,
                            &schema,
                            &self.config.validation.unique_fields,
                        );
                        if let Some(dir) = &opts.artifact_dir {
                            if let Err(e) = cache::store_validation(dir, &key, &errors) {
                                report.document = Some(document);
                                return report.fail(Stage::Validated, StageError::Artifact(e));
                            }
                        }
                        errors
                    }
                };
                report.validation_errors = Some(errors);
                report.reached = Stage::Validated;

                if cancelled(opts) {
                    report.document = Some(document);
                    return report.fail(Stage::FieldsDetected, StageError::Cancelled);
                }

                // Validated -> FieldsDetected
                report.additional_fields = Some(additional::detect(&document, &schema));
                report.reached = Stage::FieldsDetected;
            }
            Err(e) => {
                // Not fatal: the document can still be explored without
                // validation.
                report.schema_unavailable = Some(e.to_string());
                report.reached = Stage::FieldsDetected;
            }
        }

        if cancelled(opts) {
            report.document = Some(document);
            return report.fail(Stage::Aggregated, StageError::Cancelled);
        }

        // FieldsDetected -> Aggregated
        let record_field = if is_record_package {
            self.config.schema.record_key.clone()
        } else {
            self.config.package.list_field.clone()
        };
        let metrics = self.config.metric_defs(&record_field);
        let ignore_invalid = report
            .validation_errors
            .as_ref()
            .map(|errors| !errors.is_empty())
            .unwrap_or(true);
        match aggregate::aggregate(&document, &record_field, &metrics, ignore_invalid) {
            Ok(result) => {
                report.aggregates = Some(result);
                report.reached = Stage::Aggregated;
            }
            Err(e) => {
                report.document = Some(document);
                return report.fail(Stage::Aggregated, StageError::Aggregate(e));
            }
        }

        report.document = Some(document);
        report.reached = Stage::Done;
        report
    }

    fn select_schema_url(&self, document: &Value) -> String {
        match &self.config.schema.record_url {
            Some(record_url) if self.is_record_package(document) => record_url.clone(),
            _ => self.config.schema.url.clone(),
        }
    }

    fn is_record_package(&self, document: &Value) -> bool {
        self.config.schema.record_url.is_some()
            && document.get(&self.config.schema.record_key).is_some()
    }

    /// Recognised sheet fields: config plus whatever the package schema
    /// declares as top-level arrays, when reachable. Only consulted for
    /// spreadsheet input.
    fn sheet_fields(&self, file_type: FileType) -> PackageFields {
        let mut fields = self.config.package_fields();
        if file_type == FileType::Json {
            return fields;
        }
        if let Ok(schema) = self.schemas.fetch(&self.config.schema.url) {
            for name in schema.top_level_array_fields() {
                if name != fields.primary && !fields.others.contains(&name) {
                    fields.others.push(name);
                }
            }
        }
        fields
    }
}

fn cancelled(opts: &RunOptions) -> bool {
    opts.cancel
        .as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}
