//! Aggregator: summary statistics over a package's record list.
//!
//! Each metric names a source field path relative to a record, an
//! aggregation kind, and an optional equality filter. All numeric work uses
//! exact decimal arithmetic; nothing is coerced through floating point.
//!
//! An empty record list is not an error: every metric comes back zero-valued
//! and rate-style metrics (average) are 0, never NaN.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One step of a metric source path. `Any` fans out over every array element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricSegment {
    Key(String),
    Index(usize),
    Any,
}

/// Field path relative to one record, e.g. `awards/*/value/amount`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricPath(pub Vec<MetricSegment>);

impl MetricPath {
    /// Parses a slash-joined path; `*` fans out, digits index, empty string
    /// addresses the record itself.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return MetricPath(Vec::new());
        }
        MetricPath(
            text.split('/')
                .map(|part| {
                    if part == "*" {
                        MetricSegment::Any
                    } else if let Ok(i) = part.parse::<usize>() {
                        MetricSegment::Index(i)
                    } else {
                        MetricSegment::Key(part.to_string())
                    }
                })
                .collect(),
        )
    }
}

impl fmt::Display for MetricPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match segment {
                MetricSegment::Key(k) => f.write_str(k)?,
                MetricSegment::Index(n) => write!(f, "{}", n)?,
                MetricSegment::Any => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

/// How a metric folds its source values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    Sum,
    Count,
    CountDistinct,
    Histogram,
    Average,
}

/// Keeps only records where `path` yields a value equal to `equals`.
#[derive(Debug, Clone)]
pub struct MetricFilter {
    pub path: MetricPath,
    pub equals: String,
}

/// One metric definition.
#[derive(Debug, Clone)]
pub struct MetricDef {
    pub name: String,
    pub path: MetricPath,
    pub kind: MetricKind,
    pub filter: Option<MetricFilter>,
}

impl MetricDef {
    pub fn new(name: &str, path: &str, kind: MetricKind) -> Self {
        MetricDef {
            name: name.to_string(),
            path: MetricPath::parse(path),
            kind,
            filter: None,
        }
    }

    pub fn with_filter(mut self, path: &str, equals: &str) -> Self {
        self.filter = Some(MetricFilter {
            path: MetricPath::parse(path),
            equals: equals.to_string(),
        });
        self
    }
}

/// Computed value of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Sum(Decimal),
    Count(u64),
    Distinct(u64),
    Histogram(BTreeMap<String, u64>),
    Average(Decimal),
}

/// All metrics of one run, keyed by metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct AggregateResult {
    pub metrics: BTreeMap<String, MetricValue>,
}

/// A record value that cannot feed a numeric metric. Only raised when
/// `ignore_invalid_records` is unset.
#[derive(Debug)]
pub struct AggregateError {
    pub metric: String,
    pub detail: String,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metric {:?}: {}", self.metric, self.detail)
    }
}

impl std::error::Error for AggregateError {}

/// Computes `metrics` over `document`'s record list at `record_field`.
///
/// With `ignore_invalid_records` set, a record failing a metric's type
/// expectation is skipped for that metric only; other metrics still see it.
pub fn aggregate(
    document: &Value,
    record_field: &str,
    metrics: &[MetricDef],
    ignore_invalid_records: bool,
) -> Result<AggregateResult, AggregateError> {
    let empty: [Value; 0] = [];
    let records: &[Value] = document
        .get(record_field)
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut result = AggregateResult::default();
    for metric in metrics {
        let value = compute(metric, records, ignore_invalid_records)?;
        result.metrics.insert(metric.name.clone(), value);
    }
    Ok(result)
}

fn compute(
    metric: &MetricDef,
    records: &[Value],
    ignore_invalid: bool,
) -> Result<MetricValue, AggregateError> {
    let mut sum = Decimal::ZERO;
    let mut count: u64 = 0;
    let mut distinct: BTreeMap<String, u64> = BTreeMap::new();

    for record in records {
        if let Some(filter) = &metric.filter {
            let mut matched = Vec::new();
            collect(record, &filter.path.0, &mut matched);
            if !matched.iter().any(|v| scalar_repr(v) == filter.equals) {
                continue;
            }
        }

        let mut values = Vec::new();
        collect(record, &metric.path.0, &mut values);
        for value in values {
            match metric.kind {
                MetricKind::Count => count += 1,
                MetricKind::CountDistinct | MetricKind::Histogram => {
                    *distinct.entry(scalar_repr(value)).or_insert(0) += 1;
                }
                MetricKind::Sum | MetricKind::Average => match numeric(value) {
                    Some(n) => {
                        sum = sum.checked_add(n).ok_or_else(|| AggregateError {
                            metric: metric.name.clone(),
                            detail: "sum overflowed decimal range".to_string(),
                        })?;
                        count += 1;
                    }
                    None => {
                        if !ignore_invalid {
                            return Err(AggregateError {
                                metric: metric.name.clone(),
                                detail: format!(
                                    "value at {} is {} where a number was expected",
                                    metric.path,
                                    value.type_name()
                                ),
                            });
                        }
                    }
                },
            }
        }
    }

    Ok(match metric.kind {
        MetricKind::Sum => MetricValue::Sum(sum),
        MetricKind::Count => MetricValue::Count(count),
        MetricKind::CountDistinct => MetricValue::Distinct(distinct.len() as u64),
        MetricKind::Histogram => MetricValue::Histogram(distinct),
        MetricKind::Average => {
            if count == 0 {
                MetricValue::Average(Decimal::ZERO)
            } else {
                MetricValue::Average(sum / Decimal::from(count))
            }
        }
    })
}

/// Gathers every value addressed by `segments` under `value`.
fn collect<'a>(value: &'a Value, segments: &[MetricSegment], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match head {
        MetricSegment::Key(key) => {
            if let Some(child) = value.get(key) {
                collect(child, rest, out);
            }
        }
        MetricSegment::Index(index) => {
            if let Some(child) = value.as_array().and_then(|items| items.get(*index)) {
                collect(child, rest, out);
            }
        }
        MetricSegment::Any => {
            if let Some(items) = value.as_array() {
                for item in items {
                    collect(item, rest, out);
                }
            }
        }
    }
}

/// Numeric view of a source value: numbers directly, strings parsed as exact
/// decimals (monetary amounts frequently arrive as strings).
fn numeric(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(d) => Some(*d),
        Value::String(s) => s
            .trim()
            .parse::<Decimal>()
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok(),
        _ => None,
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

/// Metrics for 360Giving-style grant packages.
pub fn grant_metrics() -> Vec<MetricDef> {
    vec![
        MetricDef::new("grant_count", "", MetricKind::Count),
        MetricDef::new("total_amount_awarded", "amountAwarded", MetricKind::Sum),
        MetricDef::new("currency_histogram", "currency", MetricKind::Histogram),
        MetricDef::new(
            "distinct_funders",
            "fundingOrganization/*/id",
            MetricKind::CountDistinct,
        ),
        MetricDef::new(
            "distinct_recipients",
            "recipientOrganization/*/id",
            MetricKind::CountDistinct,
        ),
        MetricDef::new("average_amount_awarded", "amountAwarded", MetricKind::Average),
    ]
}

/// Metrics for OCDS release packages.
pub fn release_metrics() -> Vec<MetricDef> {
    vec![
        MetricDef::new("release_count", "", MetricKind::Count),
        MetricDef::new("distinct_ocids", "ocid", MetricKind::CountDistinct),
        MetricDef::new("tag_histogram", "tag/*", MetricKind::Histogram),
        MetricDef::new("total_award_value", "awards/*/value/amount", MetricKind::Sum),
        MetricDef::new(
            "total_contract_value",
            "contracts/*/value/amount",
            MetricKind::Sum,
        ),
    ]
}

/// Metrics for OCDS record packages.
pub fn record_metrics() -> Vec<MetricDef> {
    vec![
        MetricDef::new("record_count", "", MetricKind::Count),
        MetricDef::new("distinct_ocids", "ocid", MetricKind::CountDistinct),
        MetricDef::new("total_releases", "releases/*", MetricKind::Count),
    ]
}
