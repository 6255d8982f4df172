use axum::http::HeaderMap;

/// Header carrying the shared admin secret.
pub const TOKEN_HEADER: &str = "x-url-redirect-token";

/// Shared-secret check for `/api/` routes.
#[derive(Clone)]
pub struct AuthGuard {
    secret: Vec<u8>,
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard").finish_non_exhaustive()
    }
}

impl AuthGuard {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    pub fn authenticate(&self, provided: &str) -> bool {
        constant_time_eq(provided.as_bytes(), &self.secret)
    }

    /// Reads the token header; a missing or non-UTF-8 header fails.
    pub fn authenticate_headers(&self, headers: &HeaderMap) -> bool {
        let provided = headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        self.authenticate(provided)
    }
}

/// Compares every byte of `expected` whatever the input, so the running
/// time depends only on the secret's length.
fn constant_time_eq(provided: &[u8], expected: &[u8]) -> bool {
    let mut diff = provided.len() ^ expected.len();
    for (i, e) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(0);
        diff |= usize::from(p ^ e);
    }
    std::hint::black_box(diff) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::{Duration, Instant};

    #[test]
    fn matching_secret_is_accepted() {
        let guard = AuthGuard::new("s3cret-token");
        assert!(guard.authenticate("s3cret-token"));
    }

    #[test]
    fn mismatches_are_rejected() {
        let guard = AuthGuard::new("s3cret-token");
        assert!(!guard.authenticate("s3cret-tokeN"));
        assert!(!guard.authenticate("s3cret"));
        assert!(!guard.authenticate("s3cret-token-and-more"));
        assert!(!guard.authenticate(""));
    }

    #[test]
    fn prefix_of_secret_padded_with_zero_bytes_is_rejected() {
        let guard = AuthGuard::new("ab");
        assert!(!guard.authenticate("ab\0"));
        assert!(!guard.authenticate("a"));
    }

    #[test]
    fn header_is_required() {
        let guard = AuthGuard::new("k");
        let mut headers = HeaderMap::new();
        assert!(!guard.authenticate_headers(&headers));
        headers.insert(TOKEN_HEADER, HeaderValue::from_static("k"));
        assert!(guard.authenticate_headers(&headers));
    }

    #[test]
    fn debug_output_hides_secret() {
        let guard = AuthGuard::new("super-secret");
        assert!(!format!("{guard:?}").contains("super-secret"));
    }

    fn fastest_batch(guard: &AuthGuard, attempt: &str) -> Duration {
        (0..25)
            .map(|_| {
                let start = Instant::now();
                for _ in 0..2_000 {
                    std::hint::black_box(guard.authenticate(std::hint::black_box(attempt)));
                }
                start.elapsed()
            })
            .min()
            .unwrap_or_default()
    }

    #[test]
    fn timing_does_not_depend_on_first_mismatch_position() {
        let secret = "a".repeat(64);
        let guard = AuthGuard::new(secret.clone());

        let mut early = secret.clone().into_bytes();
        early[0] = b'b';
        let mut late = secret.into_bytes();
        late[63] = b'b';
        let early = String::from_utf8(early).unwrap();
        let late = String::from_utf8(late).unwrap();

        let t_early = fastest_batch(&guard, &early).as_secs_f64();
        let t_late = fastest_batch(&guard, &late).as_secs_f64();
        let ratio = t_early.max(t_late) / t_early.min(t_late).max(1e-9);
        assert!(ratio < 2.0, "early={t_early} late={t_late}");
    }
}
