//! Outbound by-dimension response, as serialized to clients.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::timerange::JsTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByDimensionResponse {
    pub status: String,
    pub primary: Vec<PrimaryDimension>,
}

impl ByDimensionResponse {
    pub fn ok(primary: Vec<PrimaryDimension>) -> Self {
        Self {
            status: "ok".to_string(),
            primary,
        }
    }
}

/// One group of the primary dimension (e.g. one service).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryDimension {
    pub name: String,
    pub metrics: BTreeMap<String, f64>,
    pub hist_metrics: BTreeMap<String, Vec<HistogramValue>>,
}

impl PrimaryDimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramValue {
    pub ts: JsTime,
    pub value: f64,
}
