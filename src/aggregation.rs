//! Search body construction.
//!
//! The nested aggregation request is a plain JSON tree. Fragments from
//! different metrics are merged under their sub-aggregation key; a key
//! may be contributed more than once only with an identical fragment.

use serde_json::{json, Map, Value};

use crate::error::QueryError;
use crate::interval::compute_interval;
use crate::registry::{BuildContext, MetricRegistry};
use crate::request::ByDimensionRequest;

/// Name of the terms aggregation grouping on the primary dimension.
pub const PRIMARY_AGG: &str = "primary";

/// Merged sub-aggregations nested under the primary grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationTree {
    aggs: Map<String, Value>,
}

impl AggregationTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `fragment` under `key`. Re-adding an equal fragment is a
    /// no-op; a different one is rejected.
    pub fn merge(&mut self, key: &str, fragment: Value) -> Result<(), QueryError> {
        match self.aggs.get(key) {
            Some(existing) if *existing == fragment => Ok(()),
            Some(_) => Err(QueryError::ConflictingAggregation(key.to_string())),
            None => {
                self.aggs.insert(key.to_string(), fragment);
                Ok(())
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.aggs)
    }
}

/// Knobs that come from service configuration rather than the request.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Date field used for the range filter and the histograms.
    pub timestamp_field: String,
    /// Upper bound on the number of primary-dimension groups.
    pub max_groups: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            timestamp_field: "timestamp".to_string(),
            max_groups: 100,
        }
    }
}

/// Builds the merged sub-aggregation tree for a defaulted request.
/// Unknown metric names fail the whole build.
pub fn build_aggregations(
    request: &ByDimensionRequest,
    registry: &MetricRegistry,
    options: &SearchOptions,
) -> Result<AggregationTree, QueryError> {
    let required =
        registry.required_sub_aggregations(&request.metrics, &request.histogram_metrics)?;

    let interval = if request.histogram_metrics.is_empty() {
        None
    } else {
        Some(compute_interval(
            &request.timerange,
            request.config.histogram_points,
        )?)
    };

    let ctx = BuildContext {
        config: &request.config,
        timestamp_field: &options.timestamp_field,
        interval: interval.as_deref(),
    };

    let mut tree = AggregationTree::new();
    for sub in required {
        tree.merge(sub.key(), sub.build(&ctx)?)?;
    }
    Ok(tree)
}

/// Builds the complete search body: a range filter on the request's time
/// window and a terms aggregation on the primary dimension carrying the
/// merged metric aggregations.
pub fn build_search_body(
    request: &ByDimensionRequest,
    registry: &MetricRegistry,
    options: &SearchOptions,
) -> Result<Value, QueryError> {
    let aggs = build_aggregations(request, registry, options)?;

    let mut range = Map::new();
    if let Some(from) = request.timerange.from {
        range.insert("gte".to_string(), Value::from(from.to_string()));
    }
    if let Some(to) = request.timerange.to {
        range.insert("lte".to_string(), Value::from(to.to_string()));
    }
    range.insert(
        "format".to_string(),
        Value::from("strict_date_optional_time"),
    );
    let mut range_filter = Map::new();
    range_filter.insert(options.timestamp_field.clone(), Value::Object(range));

    Ok(json!({
        "size": 0,
        "query": {
            "bool": {
                "filter": [{"range": range_filter}]
            }
        },
        "aggs": {
            PRIMARY_AGG: {
                "terms": {
                    "field": request.config.primary_dimension,
                    "size": options.max_groups,
                },
                "aggs": aggs.into_value(),
            }
        }
    }))
}
