pub mod auth;
pub mod capture;
pub mod classify;
pub mod exempt;
pub mod rate_limit;
pub mod telemetry;

pub use auth::AuthGuard;
pub use capture::ResponseCapture;
pub use exempt::ExemptPaths;
pub use rate_limit::RateLimiter;
pub use telemetry::telemetry_middleware;
