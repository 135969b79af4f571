//! Live stats for the current day, read from the ephemeral store.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use tracing::{debug, warn};
use tracking_core::window::format_day;

use crate::response::{ApiError, TodayResponse};
use crate::state::AppState;

/// GET /today/:domain - Stats of today's uncompiled sessions.
pub async fn today_handler(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<TodayResponse>, ApiError> {
    let domain = domain.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return Err(ApiError::bad_request("domain is required"));
    }

    let day = format_day(Utc::now().date_naive());
    let key = format!("{day}:{domain}");

    if let Some(cached) = state.today_cache.get(&key).await {
        debug!(domain = %domain, "Today cache hit");
        return Ok(Json(cached));
    }

    let raw = state.ephemeral.read_day(&day, &domain).await.map_err(|e| {
        warn!(domain = %domain, error = %e, "Failed to read today's sessions");
        ApiError::from(e)
    })?;
    let (compiled, _) = raw.assemble();

    let view = TodayResponse::new(domain, day, compiled.stats());
    state.today_cache.insert(key, view.clone()).await;
    Ok(Json(view))
}
