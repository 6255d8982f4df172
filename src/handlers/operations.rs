use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::{AnalyticsStats, StatsWindow};
use crate::store::{validate_url, Redirect};
use crate::AppState;

use super::{AppError, DataBody, PageQuery};

#[derive(Debug, Serialize)]
pub struct Exists {
    pub exists: bool,
}

/// Unix seconds, both ends inclusive.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatsBody {
    pub start: i64,
    pub end: i64,
}

// ─── GET /api/operations/list?page=N ─────────────────────────────

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Redirect>>, AppError> {
    Ok(Json(state.store.list(page.page).await?))
}

// ─── POST /api/operations/searchPath?page=N ──────────────────────

pub async fn search_path(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
    Json(body): Json<DataBody>,
) -> Result<Json<Vec<Redirect>>, AppError> {
    let needle = body.data.trim();
    if needle.is_empty() {
        return Err(AppError::BadRequest);
    }
    let offset = usize::try_from(page.page).map_err(|_| AppError::BadRequest)?;
    Ok(Json(state.store.search_path(needle, offset).await?))
}

// ─── POST /api/operations/destinationExists ──────────────────────

/// Accepts the destination with or without its scheme.
pub async fn destination_exists(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DataBody>,
) -> Result<Json<Exists>, AppError> {
    let raw = body.data.trim();
    if raw.is_empty() {
        return Err(AppError::BadRequest);
    }
    let url = validate_url(raw).unwrap_or_else(|| raw.to_string());
    let exists = state.store.destination_exists(&url).await?;
    Ok(Json(Exists { exists }))
}

// ─── POST /api/operations/stats ──────────────────────────────────

pub async fn stats(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StatsBody>,
) -> Result<Json<AnalyticsStats>, AppError> {
    let window = StatsWindow::from_unix(body.start, body.end).ok_or(AppError::BadRequest)?;
    Ok(Json(state.analytics.stats(window).await?))
}
