//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use telemetry::ComponentHealthReport;
use tracking_core::{Error, Stats};

/// Live stats of one domain for the current day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodayResponse {
    pub domain: String,
    pub day: String,
    pub sessions: u64,
    pub pageviews: u64,
    pub score: u64,
    pub bounces: u64,
    /// Scaled by 10000.
    pub bounce_rate: u32,
}

impl TodayResponse {
    pub fn new(domain: impl Into<String>, day: impl Into<String>, stats: Stats) -> Self {
        Self {
            domain: domain.into(),
            day: day.into(),
            sessions: stats.sessions,
            pageviews: stats.pageviews,
            score: stats.score,
            bounces: stats.bounces,
            bounce_rate: stats.bounce_rate(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub ephemeral_connected: bool,
    pub durable_connected: bool,
    pub components: Vec<ComponentHealthReport>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error with a stable code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "INPUT_001", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg)
    }

    pub fn validation(errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            response: ErrorResponse::new("Validation failed", "INPUT_001").with_details(errors),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::ClientInput {
                code,
                message,
                http_status,
            }
            | Error::UpstreamStore {
                code,
                message,
                http_status,
                ..
            } => {
                let status =
                    StatusCode::from_u16(*http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                ApiError::with_code(status, *code, message)
            }
            Error::InvalidWindow(msg) => ApiError::bad_request(msg),
            _ => ApiError::internal(err.to_string()),
        }
    }
}
