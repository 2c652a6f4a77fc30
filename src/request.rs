//! Inbound by-dimension request and its defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::timerange::Timerange;

pub const DEFAULT_PRIMARY_DIMENSION: &str = "service";
pub const DEFAULT_SECONDARY_DIMENSION: &str = "host";
pub const DEFAULT_RESPONSETIME_FIELD: &str = "responsetime";
pub const DEFAULT_STATUS_FIELD: &str = "status";
pub const DEFAULT_STATUS_VALUE_OK: &str = "ok";
pub const DEFAULT_COUNT_FIELD: &str = "count";
pub const DEFAULT_PERCENTILES: [f64; 4] = [50.0, 90.0, 99.0, 99.5];
pub const DEFAULT_HISTOGRAM_POINTS: i64 = 10;

/// Field names and thresholds. Empty strings, an empty percentile list
/// and zero points all mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub primary_dimension: String,
    pub secondary_dimension: String,
    pub responsetime_field: String,
    pub status_field: String,
    pub status_value_ok: String,
    pub count_field: String,
    pub percentiles: Vec<f64>,
    pub histogram_points: i64,
}

impl QueryConfig {
    pub fn apply_defaults(&mut self) {
        fill(&mut self.primary_dimension, DEFAULT_PRIMARY_DIMENSION);
        fill(&mut self.secondary_dimension, DEFAULT_SECONDARY_DIMENSION);
        fill(&mut self.responsetime_field, DEFAULT_RESPONSETIME_FIELD);
        fill(&mut self.status_field, DEFAULT_STATUS_FIELD);
        fill(&mut self.status_value_ok, DEFAULT_STATUS_VALUE_OK);
        fill(&mut self.count_field, DEFAULT_COUNT_FIELD);
        if self.percentiles.is_empty() {
            self.percentiles = DEFAULT_PERCENTILES.to_vec();
        }
        if self.histogram_points == 0 {
            self.histogram_points = DEFAULT_HISTOGRAM_POINTS;
        }
    }
}

fn fill(field: &mut String, default: &str) {
    if field.is_empty() {
        *field = default.to_string();
    }
}

/// A by-dimension analytics request as posted by clients.
///
/// The time range bounds sit at the top level of the JSON body next to
/// the metric lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByDimensionRequest {
    #[serde(flatten)]
    pub timerange: Timerange,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub histogram_metrics: Vec<String>,
    #[serde(default)]
    pub config: QueryConfig,
}

impl ByDimensionRequest {
    /// Fills every unset configuration field and time bound. Applying it
    /// a second time changes nothing.
    pub fn apply_defaults(&mut self) -> Result<(), QueryError> {
        self.apply_defaults_at(Utc::now())
    }

    pub fn apply_defaults_at(&mut self, now: DateTime<Utc>) -> Result<(), QueryError> {
        self.config.apply_defaults();
        self.timerange.fill_defaults(now)
    }
}
