//! Redirect table access.
//!
//! The telemetry chain only ever sees the [`Resolver`] half of this module;
//! the admin handlers use the full [`RedirectStore`].

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Longest short path accepted by the store.
pub const MAX_PATH_LEN: usize = 29;

/// Page size for `list` and `search_path`.
pub const PAGE_LIMIT: usize = 10;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub id: u64,
    pub path: String,
    /// Destination without its scheme; resolution always answers with https.
    pub url: String,
    pub last_updated: String,
    pub inactive: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redirect for path '{0}' already exists")]
    Duplicate(String),
    #[error("redirect not found")]
    NotFound,
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

// ─── Contracts ───────────────────────────────────────────────────

/// Maps an incoming short path to the destination it redirects to.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// `Ok(None)` when no active redirect exists for `path`.
    async fn resolve(&self, path: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait RedirectStore: Resolver {
    async fn create(&self, path: &str, url: &str) -> Result<Redirect, StoreError>;
    async fn get_by_id(&self, id: u64) -> Result<Option<Redirect>, StoreError>;
    /// Replaces the destination of an active redirect.
    async fn fix(&self, path: &str, url: &str) -> Result<Redirect, StoreError>;
    /// Moves an active redirect to a new path and destination.
    /// The new path must not belong to another redirect.
    async fn update(&self, id: u64, path: &str, url: &str) -> Result<Redirect, StoreError>;
    async fn disable(&self, id: u64) -> Result<Redirect, StoreError>;
    /// Redirects with `after < id <= after + PAGE_LIMIT`.
    async fn list(&self, after: u64) -> Result<Vec<Redirect>, StoreError>;
    /// Active redirects whose path contains `needle`, case-insensitive.
    async fn search_path(&self, needle: &str, offset: usize) -> Result<Vec<Redirect>, StoreError>;
    async fn destination_exists(&self, url: &str) -> Result<bool, StoreError>;
}

// ─── Validation helpers ──────────────────────────────────────────

/// Trims surrounding slashes and checks the path is usable as a key.
pub fn validate_path(raw: &str) -> Option<String> {
    let path = raw.split('?').next().unwrap_or_default().trim_matches('/');
    if path.is_empty() || path.len() > MAX_PATH_LEN {
        return None;
    }
    let valid = path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    valid.then(|| path.to_string())
}

/// Accepts absolute http(s) URLs and returns them without the scheme.
pub fn validate_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || rest.chars().any(char::is_whitespace) {
        return None;
    }
    Some(rest.to_string())
}

/// Random alphanumeric short path of `len` characters.
pub fn generate_short_path(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_trimmed_of_slashes() {
        assert_eq!(validate_path("/abc/"), Some("abc".into()));
        assert_eq!(validate_path("/docs/v1?x=1"), Some("docs/v1".into()));
    }

    #[test]
    fn empty_or_oversized_path_is_rejected() {
        assert_eq!(validate_path("/"), None);
        assert_eq!(validate_path(&"a".repeat(MAX_PATH_LEN + 1)), None);
        assert_eq!(validate_path("/has space"), None);
    }

    #[test]
    fn url_requires_http_scheme_and_host() {
        assert_eq!(
            validate_url("https://example.com/a?b=c"),
            Some("example.com/a?b=c".into())
        );
        assert_eq!(validate_url("http://example.com"), Some("example.com".into()));
        assert_eq!(validate_url("ftp://example.com"), None);
        assert_eq!(validate_url("https:///nohost"), None);
        assert_eq!(validate_url("example.com"), None);
    }

    #[test]
    fn generated_paths_have_requested_length() {
        let path = generate_short_path(9);
        assert_eq!(path.len(), 9);
        assert!(path.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(validate_path(&path).is_some());
    }
}
