//! # Datavet
//!
//! A schema validation and format-conversion pipeline for structured
//! open-data submissions (procurement releases, grants, beneficial-ownership
//! records).
//!
//! Datavet takes one uploaded file (JSON, CSV or XLSX), converts spreadsheets
//! into schema-shaped nested JSON, validates the document against a versioned
//! JSON Schema, reports fields the schema does not describe, and computes
//! domain summary statistics — assembling everything into one report the
//! surrounding application renders.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌────────────┐   ┌────────────┐
//! │  Upload   │──▶│ Normalize  │──▶│ Validate   │──▶│ Additional  │──▶│ Aggregate   │
//! │ json/csv/ │   │ CSV/XLSX → │   │ vs schema  │   │ field       │   │ sums/counts │
//! │ xlsx      │   │ JSON       │   │ (cached)   │   │ detection   │   │ histograms  │
//! └──────────┘   └───────────┘   └───────────┘   └────────────┘   └────────────┘
//! ```
//!
//! Data flows strictly forward; the orchestrator in [`pipeline`] is the only
//! module that knows all the others. A failure at any stage preserves the
//! partial results produced before it.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use datavet::config::PipelineConfig;
//! use datavet::pipeline::{Pipeline, RunOptions, UploadInput};
//! use datavet::schema::SchemaCache;
//!
//! let config = PipelineConfig::for_grants("https://example.org/grants-package.json");
//! let pipeline = Pipeline::new(config, Arc::new(SchemaCache::new()));
//! let report = pipeline.run(
//!     UploadInput { bytes: b"{\"grants\": []}", file_name: "grants.json", declared: None },
//!     &RunOptions::default(),
//! );
//! assert!(!report.is_failed());
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`value`] | Tagged JSON tree with exact-decimal numbers and paths |
//! | [`formats`] | Upload file-type detection |
//! | [`convert`] | CSV/XLSX → nested JSON conversion and flattening |
//! | [`schema`] | Schema loading, caching, `$ref` resolution |
//! | [`validate`] | Schema validation with uniqueness override |
//! | [`additional`] | Additional-field detection |
//! | [`aggregate`] | Summary metrics over the record list |
//! | [`cache`] | Atomic on-disk artifacts and validation cache |
//! | [`config`] | TOML pipeline configuration |
//! | [`pipeline`] | Stage machine tying everything together |

pub mod additional;
pub mod aggregate;
pub mod cache;
pub mod config;
pub mod convert;
pub mod formats;
pub mod pipeline;
pub mod schema;
pub mod validate;
pub mod value;
