//! HTTP surface: `POST /api/bydimension`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::error::QueryError;
use crate::request::ByDimensionRequest;
use crate::response::ByDimensionResponse;
use crate::translator::QueryTranslator;

pub fn router(translator: Arc<QueryTranslator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/bydimension", post(by_dimension))
        .fallback(handler_404)
        .with_state(translator)
}

async fn by_dimension(
    State(translator): State<Arc<QueryTranslator>>,
    payload: Result<Json<ByDimensionRequest>, JsonRejection>,
) -> Result<Json<ByDimensionResponse>, QueryError> {
    let Json(request) = payload.map_err(|rejection| QueryError::InvalidRequest(rejection.body_text()))?;
    let response = translator.query(request).await?;
    Ok(Json(response))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "The requested resource was not found")
}
