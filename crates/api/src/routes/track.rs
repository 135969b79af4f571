//! Tracking pixel.
//!
//! Always answers with the image once the request itself is well formed;
//! spam and store failures only change which cookie comes back.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use telemetry::metrics;
use tracing::warn;
use tracking_core::limits::SESSION_TTL_SECS;
use tracking_core::{Event, PixelParams};
use validator::Validate;

use crate::extractors::{PixelSource, SessionCookie, SESSION_COOKIE};
use crate::response::ApiError;
use crate::state::AppState;

/// Transparent 1x1 GIF.
pub const PIXEL_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// GET /t.gif - Records one page view or points event.
///
/// Query: `r` referrer of the visit, `p` points, `s` token for clients that
/// cannot keep cookies. The `_tcs` cookie wins over `s`.
pub async fn track_handler(
    State(state): State<AppState>,
    source: PixelSource,
    SessionCookie(cookie): SessionCookie,
    Query(params): Query<PixelParams>,
) -> Result<Response, ApiError> {
    if let Err(errors) = params.validate() {
        metrics().client_errors.inc();
        let details = errors
            .field_errors()
            .keys()
            .map(|field| format!("{field}: too long"))
            .collect();
        return Err(ApiError::validation(details));
    }

    let event = Event::from_request(source.page, params.p.as_deref()).map_err(|e| {
        metrics().client_errors.inc();
        ApiError::from(e)
    })?;

    let token = cookie.or(params.s);
    let outcome = state
        .recorder
        .record_event(
            &source.domain,
            params.r.as_deref().unwrap_or_default(),
            event,
            token.as_deref(),
        )
        .await;

    Ok(pixel_response(outcome.token.as_deref()))
}

/// The image with caching disabled, plus the session cookie when given.
pub fn pixel_response(token: Option<&str>) -> Response {
    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        PIXEL_GIF.to_vec(),
    )
        .into_response();

    if let Some(token) = token {
        let cookie = format!(
            "{SESSION_COOKIE}={token}; Path=/; Max-Age={SESSION_TTL_SECS}; SameSite=None; Secure"
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Session token is not a valid header value"),
        }
    }

    response
}
