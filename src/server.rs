use axum::{
    middleware as axum_mw,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{actions, operations, redirect};
use crate::metrics::exposition;
use crate::middleware::telemetry_middleware;
use crate::AppState;

/// Every route the service serves, without middleware or state.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // ── Public ──────────────────────────────────────────────
        .route("/app/health", get(redirect::health))
        .route("/about", get(redirect::about))
        .route(exposition::METRICS_PATH, get(exposition::render_metrics))
        // ── Admin: single redirects ─────────────────────────────
        .route("/api/action/create", post(actions::create))
        .route("/api/action/generate", post(actions::generate))
        .route("/api/action/info/:id", get(actions::info))
        .route("/api/action/fix", patch(actions::fix))
        .route("/api/action/update/:id", put(actions::update))
        .route("/api/action/disable/:id", delete(actions::disable))
        // ── Admin: listings ─────────────────────────────────────
        .route("/api/operations/list", get(operations::list))
        .route("/api/operations/searchPath", post(operations::search_path))
        .route(
            "/api/operations/destinationExists",
            post(operations::destination_exists),
        )
        .route("/api/operations/stats", post(operations::stats))
        // ── Anything else is a short path ───────────────────────
        .fallback(redirect::resolve)
}

/// Wraps `router` in the telemetry chain and attaches state.
///
/// Panics are turned into 500s inside the chain so they are still
/// classified and counted.
pub fn instrument(router: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    router
        .layer(CatchPanicLayer::new())
        .layer(axum_mw::from_fn_with_state(state.clone(), telemetry_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    instrument(routes(), state)
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
///
/// The SIGTERM handler is installed when this is called, not when the
/// future is first polled, so a signal arriving in between is not lost.
/// Must be called inside a tokio runtime.
pub fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match sigterm {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        tracing::info!("shutdown signal received, finishing in-flight requests");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_triggers_graceful_shutdown() {
        let shutdown = shutdown_signal();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
        tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .expect("SIGTERM did not resolve the shutdown future");
    }
}
