//! dimquery: dimensional metrics queries over Elasticsearch
//!
//! Accepts an abstract analytics request (a time range, a primary
//! grouping dimension, named scalar metrics and time-bucketed histogram
//! metrics), compiles it into one nested aggregation search, executes it
//! and reshapes the answer into one entry per primary-dimension value.
//!
//! # Example
//!
//! ```rust,no_run
//! use dimquery::{ByDimensionRequest, ElasticsearchBackend, QueryTranslator};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = ElasticsearchBackend::new("http://localhost:9200", Duration::from_secs(30))?;
//!     let translator = QueryTranslator::new(Arc::new(backend), "packetbeat-*")?;
//!
//!     let request: ByDimensionRequest = serde_json::from_str(
//!         r#"{"from": "now-1h", "to": "now", "metrics": ["volume", "errors_rate"]}"#,
//!     )?;
//!     let response = translator.query(request).await?;
//!     for group in &response.primary {
//!         println!("{}: {:?}", group.name, group.metrics);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod config;
pub mod error;
pub mod es_backend;
pub mod http;
pub mod interval;
pub mod registry;
pub mod request;
pub mod reshape;
pub mod response;
pub mod tests;
pub mod timerange;
pub mod translator;

pub use aggregation::{build_search_body, AggregationTree, SearchOptions};
pub use config::{CliArgs, Settings};
pub use error::{BackendError, ErrorKind, QueryError};
pub use es_backend::ElasticsearchBackend;
pub use interval::compute_interval;
pub use registry::{MetricRegistry, SubAggregation};
pub use request::{ByDimensionRequest, QueryConfig};
pub use response::{ByDimensionResponse, HistogramValue, PrimaryDimension};
pub use timerange::{JsTime, Timerange};
pub use translator::{QueryTranslator, SearchBackend};
