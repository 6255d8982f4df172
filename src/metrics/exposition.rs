use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::AppState;

/// Where the exposition is served. Always exempt from instrumentation.
pub const METRICS_PATH: &str = "/metrics";

// ─── GET /metrics ────────────────────────────────────────────────

pub async fn render_metrics(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.refresh_runtime();
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
