//! Health check endpoints.

use axum::{http::StatusCode, Json};
use telemetry::health;

use crate::response::HealthResponse;

/// GET /health - Full health check.
pub async fn health_handler() -> Json<HealthResponse> {
    let report = health().report();

    Json(HealthResponse {
        status: format!("{:?}", report.status).to_lowercase(),
        ephemeral_connected: health().ephemeral.is_healthy(),
        durable_connected: health().durable.is_healthy(),
        components: report.components,
    })
}

/// GET /health/ready - Readiness probe (can accept traffic).
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
