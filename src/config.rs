//! TOML pipeline configuration.
//!
//! Carries what the pipeline cannot infer: which schema URLs to validate
//! against, which top-level field holds the record list, which fields count
//! as identifying for the uniqueness check, and any custom metrics.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::aggregate::{self, MetricDef, MetricKind, MetricPath};
use crate::convert::PackageFields;

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub schema: SchemaConfig,
    pub package: PackageConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchemaConfig {
    /// Package schema URL, used for every document unless a record URL
    /// applies.
    pub url: String,
    /// Schema for record packages; selected when the document carries
    /// `record_key` at top level.
    #[serde(default)]
    pub record_url: Option<String>,
    #[serde(default = "default_record_key")]
    pub record_key: String,
}

fn default_record_key() -> String {
    "records".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PackageConfig {
    /// Top-level field holding the record list ("grants", "releases", ...).
    pub list_field: String,
    /// Further top-level array fields spreadsheet sheets may feed.
    #[serde(default)]
    pub extra_list_fields: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default = "default_unique_fields")]
    pub unique_fields: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            unique_fields: default_unique_fields(),
        }
    }
}

fn default_unique_fields() -> Vec<String> {
    vec!["id".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricConfig {
    pub name: String,
    pub path: String,
    pub kind: MetricKind,
    #[serde(default)]
    pub filter: Option<MetricFilterConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricFilterConfig {
    pub path: String,
    pub equals: String,
}

impl PipelineConfig {
    /// Preset for 360Giving-style grant packages.
    pub fn for_grants(schema_url: impl Into<String>) -> Self {
        PipelineConfig {
            schema: SchemaConfig {
                url: schema_url.into(),
                record_url: None,
                record_key: default_record_key(),
            },
            package: PackageConfig {
                list_field: "grants".to_string(),
                extra_list_fields: Vec::new(),
            },
            validation: ValidationConfig::default(),
            metrics: Vec::new(),
        }
    }

    /// Preset for OCDS release/record package pairs.
    pub fn for_releases(
        release_schema_url: impl Into<String>,
        record_schema_url: impl Into<String>,
    ) -> Self {
        PipelineConfig {
            schema: SchemaConfig {
                url: release_schema_url.into(),
                record_url: Some(record_schema_url.into()),
                record_key: default_record_key(),
            },
            package: PackageConfig {
                list_field: "releases".to_string(),
                extra_list_fields: Vec::new(),
            },
            validation: ValidationConfig::default(),
            metrics: Vec::new(),
        }
    }

    pub fn package_fields(&self) -> PackageFields {
        PackageFields::new(
            self.package.list_field.clone(),
            self.package.extra_list_fields.clone(),
        )
    }

    /// Metric definitions: configured metrics, or the built-in set matching
    /// the record list field.
    pub fn metric_defs(&self, list_field: &str) -> Vec<MetricDef> {
        if !self.metrics.is_empty() {
            return self
                .metrics
                .iter()
                .map(|m| {
                    let mut def = MetricDef {
                        name: m.name.clone(),
                        path: MetricPath::parse(&m.path),
                        kind: m.kind,
                        filter: None,
                    };
                    if let Some(filter) = &m.filter {
                        def = def.with_filter(&filter.path, &filter.equals);
                    }
                    def
                })
                .collect();
        }
        match list_field {
            "grants" => aggregate::grant_metrics(),
            "releases" => aggregate::release_metrics(),
            "records" => aggregate::record_metrics(),
            _ => vec![MetricDef::new("record_count", "", MetricKind::Count)],
        }
    }
}

/// Loads and validates a config file.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parses and validates config text.
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.schema.url.trim().is_empty() {
        anyhow::bail!("schema.url must not be empty");
    }
    if let Some(record_url) = &config.schema.record_url {
        if record_url.trim().is_empty() {
            anyhow::bail!("schema.record_url must not be empty when set");
        }
    }
    if config.package.list_field.trim().is_empty() {
        anyhow::bail!("package.list_field must not be empty");
    }
    if config.validation.unique_fields.is_empty() {
        anyhow::bail!("validation.unique_fields must name at least one field");
    }
    for metric in &config.metrics {
        if metric.name.trim().is_empty() {
            anyhow::bail!("metrics entries must have a non-empty name");
        }
        if metric.path.contains("//") {
            anyhow::bail!(
                "metric {:?} has a malformed path: {}",
                metric.name,
                metric.path
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = parse_config(
            r#"
            [schema]
            url = "https://example.org/package-schema.json"

            [package]
            list_field = "grants"
            "#,
        )
        .unwrap();
        assert_eq!(config.validation.unique_fields, vec!["id"]);
        assert_eq!(config.schema.record_key, "records");
        assert!(config.metrics.is_empty());
    }

    #[test]
    fn custom_metrics_override_builtins() {
        let config = parse_config(
            r#"
            [schema]
            url = "https://example.org/s.json"

            [package]
            list_field = "grants"

            [[metrics]]
            name = "gbp_total"
            path = "amountAwarded"
            kind = "sum"
            filter = { path = "currency", equals = "GBP" }
            "#,
        )
        .unwrap();
        let defs = config.metric_defs("grants");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "gbp_total");
        assert!(defs[0].filter.is_some());
    }

    #[test]
    fn builtin_metrics_selected_by_list_field() {
        let config = PipelineConfig::for_grants("https://example.org/s.json");
        let defs = config.metric_defs("grants");
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"total_amount_awarded"));
    }

    #[test]
    fn empty_schema_url_rejected() {
        let err = parse_config(
            r#"
            [schema]
            url = ""

            [package]
            list_field = "grants"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("schema.url"));
    }

    #[test]
    fn unknown_metric_kind_rejected() {
        assert!(parse_config(
            r#"
            [schema]
            url = "https://example.org/s.json"

            [package]
            list_field = "grants"

            [[metrics]]
            name = "x"
            path = "a"
            kind = "median"
            "#,
        )
        .is_err());
    }
}
