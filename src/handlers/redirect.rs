use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::store::validate_path;
use crate::AppState;

use super::AppError;

#[derive(Debug, Serialize)]
pub struct About {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

// ─── GET /<path> ─────────────────────────────────────────────────

/// Catch-all for every route the router does not know: short-path lookup.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
) -> Result<Response, AppError> {
    if method != Method::GET {
        return Err(AppError::MethodNotAllowed);
    }
    let Some(path) = validate_path(uri.path()) else {
        return Err(AppError::NotFound);
    };

    match state.store.resolve(&path).await? {
        Some(url) => {
            tracing::debug!(%path, "redirect hit");
            Ok((StatusCode::FOUND, [(header::LOCATION, format!("https://{url}"))]).into_response())
        }
        None => Err(AppError::NotFound),
    }
}

// ─── GET /app/health ─────────────────────────────────────────────

pub async fn health() -> &'static str {
    "."
}

// ─── GET /about ──────────────────────────────────────────────────

pub async fn about() -> Json<About> {
    Json(About {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: "Short paths that redirect to long URLs",
    })
}
