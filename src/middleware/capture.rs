use std::sync::atomic::{AtomicU16, Ordering};

use axum::http::StatusCode;
use axum::response::Response;

const UNSET: u16 = 0;

/// Remembers the status a response was sent with.
///
/// The first recorded status wins. Completing without one records the
/// implicit 200, so a finished capture never reports 0.
#[derive(Debug, Default)]
pub struct ResponseCapture {
    status: AtomicU16,
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_status(&self, status: StatusCode) {
        let _ = self.status.compare_exchange(
            UNSET,
            status.as_u16(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Marks the response finished.
    pub fn complete(&self) {
        self.write_status(StatusCode::OK);
    }

    /// Records the status of a finished response without touching it.
    pub fn observe(&self, response: &Response) {
        self.write_status(response.status());
        self.complete();
    }

    /// `None` until a status was written or the response completed.
    pub fn status(&self) -> Option<u16> {
        match self.status.load(Ordering::Acquire) {
            UNSET => None,
            code => Some(code),
        }
    }
}
