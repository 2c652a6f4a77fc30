//! Error taxonomy for by-dimension queries.
//!
//! Every failure is either a client mistake (unknown metric, malformed
//! input) that never reaches the search backend, or a backend failure
//! (transport, unexpected response shape, broken internal invariant)
//! raised after the request was accepted.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Which side of the contract a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Client,
    Backend,
}

/// Failures reported by a [`crate::SearchBackend`] implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Search request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Search backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid search response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown metric name '{0}'")]
    UnknownMetric(String),

    #[error("Unknown histogram metric name '{0}'")]
    UnknownHistogramMetric(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Malformed search response: {0}")]
    MalformedResponse(String),

    #[error("Conflicting definitions for sub-aggregation '{0}'")]
    ConflictingAggregation(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::UnknownMetric(_)
            | QueryError::UnknownHistogramMetric(_)
            | QueryError::InvalidRequest(_) => ErrorKind::Client,
            QueryError::Backend(_)
            | QueryError::MalformedResponse(_)
            | QueryError::ConflictingAggregation(_)
            | QueryError::Timeout(_)
            | QueryError::Internal(_) => ErrorKind::Backend,
        }
    }

    /// HTTP status code the inbound layer answers with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Client => 400,
            ErrorKind::Backend => 500,
        }
    }

    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        QueryError::MalformedResponse(what.into())
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.kind() {
            ErrorKind::Client => StatusCode::BAD_REQUEST,
            ErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
