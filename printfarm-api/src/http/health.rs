//! Health check and metrics endpoints

use axum::{http::header, response::IntoResponse, routing::get, Router};
use printfarm_core::metrics::gather_metrics;

use crate::http::{AppError, AppResult, AppState};

pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

/// Always `OK` while the server is running
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Prometheus text exposition
pub async fn metrics() -> AppResult<impl IntoResponse> {
    let body = gather_metrics()
        .map_err(|e| AppError::internal(format!("Failed to encode metrics: {e}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}
