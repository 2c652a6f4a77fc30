//! Turns the raw grouped search answer into per-group metric maps.

use serde_json::Value;

use crate::aggregation::PRIMARY_AGG;
use crate::error::QueryError;
use crate::registry::{Bucket, MetricRegistry};
use crate::request::ByDimensionRequest;
use crate::response::PrimaryDimension;

/// Pulls `aggregations.primary.buckets` out of a search response.
pub fn primary_buckets(search_response: &Value) -> Result<Vec<Bucket>, QueryError> {
    let buckets = search_response
        .get("aggregations")
        .and_then(|aggs| aggs.get(PRIMARY_AGG))
        .and_then(|primary| primary.get("buckets"))
        .and_then(Value::as_array)
        .ok_or_else(|| QueryError::malformed("response has no 'aggregations.primary.buckets'"))?;

    buckets
        .iter()
        .map(|bucket| {
            bucket
                .as_object()
                .cloned()
                .ok_or_else(|| QueryError::malformed("primary bucket is not an object"))
        })
        .collect()
}

/// Reshapes every bucket, keeping the backend's group order.
pub fn reshape_buckets(
    buckets: &[Bucket],
    request: &ByDimensionRequest,
    registry: &MetricRegistry,
) -> Result<Vec<PrimaryDimension>, QueryError> {
    buckets
        .iter()
        .map(|bucket| bucket_to_primary(bucket, request, registry))
        .collect()
}

pub fn bucket_to_primary(
    bucket: &Bucket,
    request: &ByDimensionRequest,
    registry: &MetricRegistry,
) -> Result<PrimaryDimension, QueryError> {
    let mut primary = PrimaryDimension::new(group_name(bucket)?);

    for name in &request.metrics {
        let entry = registry.metric(name)?;
        primary
            .metrics
            .extend((entry.extract)(bucket, &request.config)?);
    }

    for name in &request.histogram_metrics {
        let entry = registry.histogram(name)?;
        let values = (entry.extract)(bucket, &request.config)?;
        primary.hist_metrics.insert(name.clone(), values);
    }

    Ok(primary)
}

fn group_name(bucket: &Bucket) -> Result<String, QueryError> {
    match bucket.get("key") {
        Some(Value::String(key)) => Ok(key.clone()),
        Some(key @ Value::Number(_)) => Ok(bucket
            .get("key_as_string")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string())),
        Some(Value::Bool(key)) => Ok(key.to_string()),
        _ => Err(QueryError::malformed("primary bucket has no usable 'key'")),
    }
}
