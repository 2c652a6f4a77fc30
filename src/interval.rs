//! Histogram bucket width selection.

use crate::error::QueryError;
use crate::timerange::Timerange;

/// Returns a `date_histogram` interval such that `timerange` splits into
/// roughly `points` buckets, e.g. `"900.000s"` for one hour over four
/// points.
///
/// The per-bucket duration is truncated to whole milliseconds, never
/// rounded, so existing clients keep seeing the same bucket edges.
pub fn compute_interval(timerange: &Timerange, points: i64) -> Result<String, QueryError> {
    if points <= 0 {
        return Err(QueryError::InvalidRequest(format!(
            "histogram_points must be positive, got {}",
            points
        )));
    }

    let total = timerange
        .duration()
        .ok_or_else(|| QueryError::InvalidRequest("time range is not set".to_string()))?;
    let total_nanos = total.num_nanoseconds().ok_or_else(|| {
        QueryError::InvalidRequest("time range is too long for a histogram".to_string())
    })?;
    if total_nanos < 0 {
        return Err(QueryError::InvalidRequest(
            "time range ends before it starts".to_string(),
        ));
    }

    let millis = total_nanos / points / 1_000_000;
    Ok(format!("{}.{:03}s", millis / 1000, millis % 1000))
}
