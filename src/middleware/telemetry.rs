use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::capture::ResponseCapture;
use super::classify::{classify, is_privileged};
use crate::analytics::{AnalyticsEvent, ClientContext};
use crate::handlers::AppError;
use crate::AppState;

/// Key used for requests that arrive without peer information.
const UNKNOWN_CLIENT: &str = "unknown";

/// The request telemetry and admission chain.
///
/// Runs, in order: rate limit, token check on `/api/` routes, the inner
/// service, status capture, classification, analytics enqueue and finally
/// the metric updates. Metrics are written before the response leaves.
///
/// Exempt paths are still rate limited but never counted or recorded.
/// A rate-limited request is counted in metrics only; it never reaches auth,
/// the handler or analytics.
pub async fn telemetry_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let peer = peer_addr(&req);
    let client_key = peer
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    if state.exempt.contains(&path) {
        if !state.limiter.admit(&client_key) {
            return AppError::TooManyRequests.into_response();
        }
        return next.run(req).await;
    }

    let _in_flight = state.metrics.track_in_flight();
    let start = Instant::now();
    let capture = ResponseCapture::new();

    // ── Admission ───────────────────────────────────────────────
    if !state.limiter.admit(&client_key) {
        state.metrics.record_rate_limited();
        let response = AppError::TooManyRequests.into_response();
        capture.observe(&response);
        let status = capture.status().unwrap_or(200);
        let classification = classify(&path, status);
        state
            .metrics
            .observe_request(&classification, status, elapsed_ms(start));
        return response;
    }

    let client_context = ClientContext {
        ip_address: peer.map(|addr| addr.ip()),
        headers: state
            .logged_headers
            .iter()
            .map(|name| {
                let name = name.to_ascii_lowercase();
                let value = req
                    .headers()
                    .get(name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                (name, value)
            })
            .collect(),
    };

    // ── Auth + handler ──────────────────────────────────────────
    let response = if is_privileged(&path) && !state.auth.authenticate_headers(req.headers()) {
        tracing::warn!(%path, client = %client_key, "rejected admin request: bad or missing token");
        AppError::Unauthorized.into_response()
    } else {
        next.run(req).await
    };

    capture.observe(&response);
    let status = capture.status().unwrap_or(200);
    let elapsed = start.elapsed();
    let classification = classify(&path, status);

    state.recorder.record(AnalyticsEvent::new(
        path,
        status,
        elapsed.as_millis() as u64,
        classification.label.clone(),
        client_context,
    ));
    state
        .metrics
        .observe_request(&classification, status, elapsed.as_secs_f64() * 1000.0);

    response
}

fn peer_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
