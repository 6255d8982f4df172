pub mod actions;
pub mod operations;
pub mod redirect;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::analytics::SinkError;
use crate::store::StoreError;

// ─── Shared request types ────────────────────────────────────────

/// `{path, url}` body used by create, fix and update.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectBody {
    pub path: String,
    pub url: String,
}

/// `{data}` body used by the search operations.
#[derive(Debug, Clone, Deserialize)]
pub struct DataBody {
    pub data: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u64,
}

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    NotFound,
    BadRequest,
    Duplicate,
    Database(String),
    Unauthorized,
    TooManyRequests,
    MethodNotAllowed,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "Are you Lost??"),
            Self::BadRequest => (StatusCode::BAD_REQUEST, "Bad Request"),
            Self::Duplicate => (StatusCode::BAD_REQUEST, "URL Redirect Exists"),
            Self::Database(msg) => {
                tracing::error!(error = %msg, "store operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "DataBase Error")
            }
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Error"),
            Self::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"),
            Self::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "Error"),
        };
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => Self::Duplicate,
            StoreError::NotFound => Self::NotFound,
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<SinkError> for AppError {
    fn from(err: SinkError) -> Self {
        Self::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_client_visible_statuses() {
        let dup = AppError::from(StoreError::Duplicate("gh".into())).into_response();
        assert_eq!(dup.status(), StatusCode::BAD_REQUEST);

        let missing = AppError::from(StoreError::NotFound).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let corrupt = AppError::from(StoreError::Corrupt("id".into())).into_response();
        assert_eq!(corrupt.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let stream = AppError::from(SinkError::Other("stream gone".into())).into_response();
        assert_eq!(stream.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejections_have_expected_codes() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::TooManyRequests.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
