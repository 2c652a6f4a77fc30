use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::aggregation::{build_search_body, SearchOptions};
use crate::error::{BackendError, ErrorKind, QueryError};
use crate::registry::MetricRegistry;
use crate::request::ByDimensionRequest;
use crate::reshape::{primary_buckets, reshape_buckets};
use crate::response::ByDimensionResponse;

/// The document store the translator runs its searches against.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Executes `body` against `index` and returns the raw JSON answer.
    async fn search(&self, index: &str, body: &Value) -> Result<Value, BackendError>;
}

/// Compiles by-dimension requests into aggregation searches and reshapes
/// the answers. Holds no per-query state and can be shared freely.
pub struct QueryTranslator {
    backend: Arc<dyn SearchBackend>,
    registry: MetricRegistry,
    index: String,
    options: SearchOptions,
    timeout: Duration,
}

impl QueryTranslator {
    pub fn new(backend: Arc<dyn SearchBackend>, index: impl Into<String>) -> Result<Self, QueryError> {
        Self::with_registry(backend, index, MetricRegistry::standard())
    }

    pub fn with_registry(
        backend: Arc<dyn SearchBackend>,
        index: impl Into<String>,
        registry: MetricRegistry,
    ) -> Result<Self, QueryError> {
        registry.validate()?;
        Ok(Self {
            backend,
            registry,
            index: index.into(),
            options: SearchOptions::default(),
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Defaults, compiles, executes and reshapes one request.
    ///
    /// Client errors are raised before the backend is contacted.
    pub async fn query(
        &self,
        request: ByDimensionRequest,
    ) -> Result<ByDimensionResponse, QueryError> {
        let result = self.run(request).await;
        if let Err(err) = &result {
            match err.kind() {
                ErrorKind::Client => warn!(index = %self.index, error = %err, "Rejected by-dimension query"),
                ErrorKind::Backend => error!(index = %self.index, error = %err, "By-dimension query failed"),
            }
        }
        result
    }

    /// Like [`query`](Self::query), but also returns the HTTP status the
    /// outcome maps to.
    pub async fn query_with_status(
        &self,
        request: ByDimensionRequest,
    ) -> (Result<ByDimensionResponse, QueryError>, u16) {
        let result = self.query(request).await;
        let status = match &result {
            Ok(_) => 200,
            Err(err) => err.status_code(),
        };
        (result, status)
    }

    async fn run(&self, mut request: ByDimensionRequest) -> Result<ByDimensionResponse, QueryError> {
        request.apply_defaults()?;
        let body = build_search_body(&request, &self.registry, &self.options)?;
        debug!(index = %self.index, body = %body, "Executing by-dimension search");

        // From here on failures are ours, not the client's.
        let started = Instant::now();
        let answer = tokio::time::timeout(self.timeout, self.backend.search(&self.index, &body))
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;

        let buckets = primary_buckets(&answer)?;
        let primary = reshape_buckets(&buckets, &request, &self.registry)?;

        info!(
            index = %self.index,
            groups = primary.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "By-dimension query completed"
        );
        Ok(ByDimensionResponse::ok(primary))
    }
}
