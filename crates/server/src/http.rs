//! HTTP endpoints: health and observability

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Liveness probe.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "live_sessions": state.orchestrator.session_count(),
    }))
}

/// Snapshot of the latency monitor (global + per-session stats).
pub async fn latency_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.snapshot())
}

/// Audio cache counters.
pub async fn cache_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.cache.metrics().await {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Flush the audio cache; returns the number of deleted keys.
pub async fn cache_clear(State(state): State<AppState>) -> impl IntoResponse {
    match state.cache.clear().await {
        Ok(deleted) => Json(json!({ "deleted": deleted })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
