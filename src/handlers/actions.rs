use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::store::{generate_short_path, validate_path, validate_url, Redirect, StoreError};
use crate::AppState;

use super::{AppError, RedirectBody};

/// Attempts at a random path before giving up on `generate`.
const GENERATE_ATTEMPTS: usize = 5;

#[derive(Debug, serde::Deserialize)]
pub struct GenerateBody {
    pub url: String,
}

// ─── POST /api/action/create ─────────────────────────────────────

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RedirectBody>,
) -> Result<Json<Redirect>, AppError> {
    let path = validate_path(&body.path).ok_or(AppError::BadRequest)?;
    let url = validate_url(&body.url).ok_or(AppError::BadRequest)?;

    let redirect = state.store.create(&path, &url).await?;
    tracing::info!(id = redirect.id, path = %redirect.path, "redirect created");
    Ok(Json(redirect))
}

// ─── POST /api/action/generate ───────────────────────────────────

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Redirect>, AppError> {
    let url = validate_url(&body.url).ok_or(AppError::BadRequest)?;

    for _ in 0..GENERATE_ATTEMPTS {
        let path = generate_short_path(state.path_length);
        match state.store.create(&path, &url).await {
            Ok(redirect) => {
                tracing::info!(id = redirect.id, path = %redirect.path, "redirect generated");
                return Ok(Json(redirect));
            }
            Err(StoreError::Duplicate(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Duplicate)
}

// ─── GET /api/action/info/:id ────────────────────────────────────

pub async fn info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Redirect>, AppError> {
    state
        .store
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

// ─── PATCH /api/action/fix ───────────────────────────────────────

pub async fn fix(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RedirectBody>,
) -> Result<Json<Redirect>, AppError> {
    let path = validate_path(&body.path).ok_or(AppError::BadRequest)?;
    let url = validate_url(&body.url).ok_or(AppError::BadRequest)?;

    let redirect = state.store.fix(&path, &url).await?;
    tracing::info!(id = redirect.id, path = %redirect.path, "redirect fixed");
    Ok(Json(redirect))
}

// ─── PUT /api/action/update/:id ──────────────────────────────────

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(body): Json<RedirectBody>,
) -> Result<Json<Redirect>, AppError> {
    let path = validate_path(&body.path).ok_or(AppError::BadRequest)?;
    let url = validate_url(&body.url).ok_or(AppError::BadRequest)?;

    let redirect = state.store.update(id, &path, &url).await?;
    tracing::info!(id = redirect.id, path = %redirect.path, "redirect updated");
    Ok(Json(redirect))
}

// ─── DELETE /api/action/disable/:id ──────────────────────────────

pub async fn disable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Redirect>, AppError> {
    let redirect = state.store.disable(id).await?;
    tracing::info!(id = redirect.id, path = %redirect.path, "redirect disabled");
    Ok(Json(redirect))
}
