//! Registry of named metrics.
//!
//! Every metric announces the sub-aggregations it needs, the other
//! metrics it depends on, and how to read its value back out of one
//! primary-dimension bucket. Query construction and response reshaping
//! both dispatch through this table, so an unknown name is a single
//! lookup miss.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::error::QueryError;
use crate::request::QueryConfig;
use crate::response::HistogramValue;
use crate::timerange::JsTime;

/// One primary-dimension bucket of the raw search answer.
pub type Bucket = Map<String, Value>;

pub type Extractor = fn(&Bucket, &QueryConfig) -> Result<Vec<(String, f64)>, QueryError>;
pub type HistogramExtractor = fn(&Bucket, &QueryConfig) -> Result<Vec<HistogramValue>, QueryError>;

/// Scalar metric names every registry must provide.
pub const METRIC_NAMES: [&str; 6] = [
    "volume",
    "rt_max",
    "rt_avg",
    "rt_percentiles",
    "secondary_count",
    "errors_rate",
];

/// Histogram metric names every registry must provide.
pub const HISTOGRAM_METRIC_NAMES: [&str; 1] = ["volume"];

/// Inputs a sub-aggregation fragment is derived from.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub config: &'a QueryConfig,
    pub timestamp_field: &'a str,
    /// Histogram bucket width, present when histogram metrics were requested.
    pub interval: Option<&'a str>,
}

/// Named sub-aggregations nested under each primary-dimension bucket.
/// Their keys are reserved in the merged aggregation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubAggregation {
    Volume,
    RtStats,
    RtPercentiles,
    SecondaryCard,
    ErrorsCount,
    VolumeHist,
}

impl SubAggregation {
    pub const ALL: [SubAggregation; 6] = [
        SubAggregation::Volume,
        SubAggregation::RtStats,
        SubAggregation::RtPercentiles,
        SubAggregation::SecondaryCard,
        SubAggregation::ErrorsCount,
        SubAggregation::VolumeHist,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SubAggregation::Volume => "volume",
            SubAggregation::RtStats => "rt_stats",
            SubAggregation::RtPercentiles => "rt_percentiles",
            SubAggregation::SecondaryCard => "secondary_card",
            SubAggregation::ErrorsCount => "errors_count",
            SubAggregation::VolumeHist => "volume_hist",
        }
    }

    /// Builds the fragment for this key. The result depends only on the
    /// context, so building it twice yields equal trees.
    pub fn build(self, ctx: &BuildContext<'_>) -> Result<Value, QueryError> {
        let c = ctx.config;
        let fragment = match self {
            SubAggregation::Volume => sum_of(&c.count_field),
            SubAggregation::RtStats => json!({
                "stats": {"field": c.responsetime_field}
            }),
            SubAggregation::RtPercentiles => json!({
                "percentiles": {
                    "field": c.responsetime_field,
                    "percents": c.percentiles,
                }
            }),
            SubAggregation::SecondaryCard => json!({
                "cardinality": {"field": c.secondary_dimension}
            }),
            SubAggregation::ErrorsCount => {
                let mut ok_term = Map::new();
                ok_term.insert(c.status_field.clone(), Value::from(c.status_value_ok.clone()));
                json!({
                    "filter": {"bool": {"must_not": {"term": ok_term}}},
                    "aggs": {"count": sum_of(&c.count_field)},
                })
            }
            SubAggregation::VolumeHist => {
                let interval = ctx.interval.ok_or_else(|| {
                    QueryError::Internal("histogram interval was not computed".to_string())
                })?;
                json!({
                    "date_histogram": {
                        "field": ctx.timestamp_field,
                        "fixed_interval": interval,
                        "min_doc_count": 1,
                    },
                    "aggs": {"volume": sum_of(&c.count_field)},
                })
            }
        };
        Ok(fragment)
    }
}

fn sum_of(field: &str) -> Value {
    json!({"sum": {"field": field}})
}

#[derive(Debug, Clone, Copy)]
pub struct MetricEntry {
    pub name: &'static str,
    pub requires: &'static [SubAggregation],
    /// Metrics whose sub-aggregations must also be present.
    pub depends_on: &'static [&'static str],
    pub extract: Extractor,
}

#[derive(Debug, Clone, Copy)]
pub struct HistogramEntry {
    pub name: &'static str,
    pub requires: &'static [SubAggregation],
    pub extract: HistogramExtractor,
}

#[derive(Debug, Clone)]
pub struct MetricRegistry {
    metrics: BTreeMap<&'static str, MetricEntry>,
    histograms: BTreeMap<&'static str, HistogramEntry>,
}

impl MetricRegistry {
    pub fn empty() -> Self {
        Self {
            metrics: BTreeMap::new(),
            histograms: BTreeMap::new(),
        }
    }

    /// The built-in metric table.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(MetricEntry {
                name: "volume",
                requires: &[SubAggregation::Volume],
                depends_on: &[],
                extract: extract_volume,
            })
            .register(MetricEntry {
                name: "rt_max",
                requires: &[SubAggregation::RtStats],
                depends_on: &[],
                extract: extract_rt_max,
            })
            .register(MetricEntry {
                name: "rt_avg",
                requires: &[SubAggregation::RtStats],
                depends_on: &[],
                extract: extract_rt_avg,
            })
            .register(MetricEntry {
                name: "rt_percentiles",
                requires: &[SubAggregation::RtPercentiles],
                depends_on: &[],
                extract: extract_rt_percentiles,
            })
            .register(MetricEntry {
                name: "secondary_count",
                requires: &[SubAggregation::SecondaryCard],
                depends_on: &[],
                extract: extract_secondary_count,
            })
            .register(MetricEntry {
                name: "errors_rate",
                requires: &[SubAggregation::ErrorsCount],
                depends_on: &["volume"],
                extract: extract_errors_rate,
            })
            .register_histogram(HistogramEntry {
                name: "volume",
                requires: &[SubAggregation::VolumeHist],
                extract: extract_volume_hist,
            });
        registry
    }

    pub fn register(&mut self, entry: MetricEntry) -> &mut Self {
        self.metrics.insert(entry.name, entry);
        self
    }

    pub fn register_histogram(&mut self, entry: HistogramEntry) -> &mut Self {
        self.histograms.insert(entry.name, entry);
        self
    }

    /// Checks the table against the declared metric names and makes sure
    /// every dependency resolves.
    pub fn validate(&self) -> Result<(), QueryError> {
        for name in METRIC_NAMES {
            if !self.metrics.contains_key(name) {
                return Err(QueryError::Internal(format!(
                    "metric registry is missing '{}'",
                    name
                )));
            }
        }
        for name in HISTOGRAM_METRIC_NAMES {
            if !self.histograms.contains_key(name) {
                return Err(QueryError::Internal(format!(
                    "metric registry is missing histogram metric '{}'",
                    name
                )));
            }
        }
        for entry in self.metrics.values() {
            for dependency in entry.depends_on {
                if !self.metrics.contains_key(dependency) {
                    return Err(QueryError::Internal(format!(
                        "metric '{}' depends on unregistered metric '{}'",
                        entry.name, dependency
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn metric(&self, name: &str) -> Result<&MetricEntry, QueryError> {
        self.metrics
            .get(name)
            .ok_or_else(|| QueryError::UnknownMetric(name.to_string()))
    }

    pub fn histogram(&self, name: &str) -> Result<&HistogramEntry, QueryError> {
        self.histograms
            .get(name)
            .ok_or_else(|| QueryError::UnknownHistogramMetric(name.to_string()))
    }

    /// Resolves the requested names, including dependencies, to the
    /// deduplicated list of sub-aggregations to build, in first-requested
    /// order. Fails on the first unknown name.
    pub fn required_sub_aggregations(
        &self,
        metrics: &[String],
        histogram_metrics: &[String],
    ) -> Result<Vec<SubAggregation>, QueryError> {
        let mut required = Vec::new();
        let mut visited = Vec::new();
        for name in metrics {
            self.collect_metric(name, &mut visited, &mut required)?;
        }
        for name in histogram_metrics {
            let entry = self.histogram(name)?;
            push_unique(&mut required, entry.requires);
        }
        Ok(required)
    }

    fn collect_metric<'a>(
        &'a self,
        name: &str,
        visited: &mut Vec<&'a str>,
        required: &mut Vec<SubAggregation>,
    ) -> Result<(), QueryError> {
        let entry = self.metric(name)?;
        if visited.contains(&entry.name) {
            return Ok(());
        }
        visited.push(entry.name);
        push_unique(required, entry.requires);
        for dependency in entry.depends_on {
            self.collect_metric(dependency, visited, required)?;
        }
        Ok(())
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn push_unique(required: &mut Vec<SubAggregation>, subs: &[SubAggregation]) {
    for sub in subs {
        if !required.contains(sub) {
            required.push(*sub);
        }
    }
}

fn sub_result<'a>(bucket: &'a Bucket, sub: SubAggregation) -> Result<&'a Value, QueryError> {
    bucket
        .get(sub.key())
        .ok_or_else(|| QueryError::malformed(format!("bucket is missing '{}'", sub.key())))
}

/// Reads a numeric field. Elasticsearch answers `null` for metrics over
/// no values; that reads as zero.
fn number_at(value: &Value, field: &str, context: &str) -> Result<f64, QueryError> {
    match value.get(field) {
        Some(Value::Null) => Ok(0.0),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| QueryError::malformed(format!("'{}.{}' is not a number", context, field))),
        None => Err(QueryError::malformed(format!("'{}' has no '{}'", context, field))),
    }
}

fn single_value(bucket: &Bucket, sub: SubAggregation) -> Result<f64, QueryError> {
    number_at(sub_result(bucket, sub)?, "value", sub.key())
}

fn extract_volume(bucket: &Bucket, _: &QueryConfig) -> Result<Vec<(String, f64)>, QueryError> {
    Ok(vec![("volume".to_string(), single_value(bucket, SubAggregation::Volume)?)])
}

fn extract_rt_max(bucket: &Bucket, _: &QueryConfig) -> Result<Vec<(String, f64)>, QueryError> {
    let stats = sub_result(bucket, SubAggregation::RtStats)?;
    Ok(vec![("rt_max".to_string(), number_at(stats, "max", "rt_stats")?)])
}

fn extract_rt_avg(bucket: &Bucket, _: &QueryConfig) -> Result<Vec<(String, f64)>, QueryError> {
    let stats = sub_result(bucket, SubAggregation::RtStats)?;
    Ok(vec![("rt_avg".to_string(), number_at(stats, "avg", "rt_stats")?)])
}

/// Formats a percentile the way Elasticsearch keys it: shortest decimal
/// form with at least one fractional digit (`50.0`, `99.995`).
pub fn percentile_key(percentile: f64) -> String {
    format!("{:?}", percentile)
}

fn extract_rt_percentiles(
    bucket: &Bucket,
    config: &QueryConfig,
) -> Result<Vec<(String, f64)>, QueryError> {
    let values = sub_result(bucket, SubAggregation::RtPercentiles)?
        .get("values")
        .and_then(Value::as_object)
        .ok_or_else(|| QueryError::malformed("'rt_percentiles' has no 'values' object"))?;

    config
        .percentiles
        .iter()
        .map(|&percentile| {
            let key = percentile_key(percentile);
            let value = values.get(&key).or_else(|| {
                values
                    .iter()
                    .find(|(k, _)| k.parse::<f64>().is_ok_and(|p| (p - percentile).abs() < 1e-9))
                    .map(|(_, v)| v)
            });
            let value = match value {
                Some(Value::Null) => 0.0,
                Some(v) => v.as_f64().ok_or_else(|| {
                    QueryError::malformed(format!("percentile '{}' is not a number", key))
                })?,
                None => {
                    return Err(QueryError::malformed(format!(
                        "percentile '{}' missing from 'rt_percentiles'",
                        key
                    )))
                }
            };
            Ok((format!("rt_{}p", key), value))
        })
        .collect()
}

fn extract_secondary_count(
    bucket: &Bucket,
    _: &QueryConfig,
) -> Result<Vec<(String, f64)>, QueryError> {
    Ok(vec![(
        "secondary_count".to_string(),
        single_value(bucket, SubAggregation::SecondaryCard)?,
    )])
}

/// Share of the volume whose status is not the configured success value.
/// A group without volume has a rate of zero.
fn extract_errors_rate(bucket: &Bucket, _: &QueryConfig) -> Result<Vec<(String, f64)>, QueryError> {
    let errors = sub_result(bucket, SubAggregation::ErrorsCount)?
        .get("count")
        .ok_or_else(|| QueryError::malformed("'errors_count' has no 'count'"))?;
    let errors = number_at(errors, "value", "errors_count.count")?;
    let volume = single_value(bucket, SubAggregation::Volume)?;

    let rate = if volume == 0.0 { 0.0 } else { errors / volume };
    Ok(vec![("errors_rate".to_string(), rate)])
}

fn extract_volume_hist(bucket: &Bucket, _: &QueryConfig) -> Result<Vec<HistogramValue>, QueryError> {
    let buckets = sub_result(bucket, SubAggregation::VolumeHist)?
        .get("buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| QueryError::malformed("'volume_hist' has no 'buckets' array"))?;

    let mut values = Vec::with_capacity(buckets.len());
    for hist_bucket in buckets {
        let value = hist_bucket
            .get("volume")
            .ok_or_else(|| QueryError::malformed("histogram bucket has no 'volume'"))?;
        let value = number_at(value, "value", "volume_hist.volume")?;
        if value == 0.0 {
            continue;
        }
        values.push(HistogramValue {
            ts: histogram_timestamp(hist_bucket)?,
            value,
        });
    }
    values.sort_by_key(|v| v.ts);
    Ok(values)
}

fn histogram_timestamp(hist_bucket: &Value) -> Result<JsTime, QueryError> {
    if let Some(millis) = hist_bucket.get("key").and_then(Value::as_i64) {
        return JsTime::from_millis(millis)
            .ok_or_else(|| QueryError::malformed("histogram key out of range"));
    }
    hist_bucket
        .get("key_as_string")
        .and_then(Value::as_str)
        .ok_or_else(|| QueryError::malformed("histogram bucket has no key"))?
        .parse()
        .map_err(QueryError::MalformedResponse)
}
