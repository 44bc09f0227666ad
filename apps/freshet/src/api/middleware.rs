//! # Middleware Module
//!
//! Cross-cutting request plumbing for the Freshet HTTP API: CORS and
//! rate limiting.
//!
//! ## Configuration
//!
//! - `FRESHET_CORS_ORIGINS`: comma-separated allowed origins, or `*`
//!   for all (default: localhost only)
//! - `FRESHET_RATE_LIMIT`: requests per second (default 100, `0`
//!   disables limiting)

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Origins allowed when `FRESHET_CORS_ORIGINS` is unset.
const LOCALHOST_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

/// Build the CORS layer from the environment.
///
/// `*` opts into allowing every origin and is logged loudly; a list is
/// parsed origin by origin, dropping entries that are not valid header
/// values. No configuration, or a list with nothing valid in it, falls
/// back to localhost only.
pub(super) fn build_cors_layer() -> CorsLayer {
    let configured = std::env::var("FRESHET_CORS_ORIGINS").ok();

    match configured.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: allowing ALL origins (FRESHET_CORS_ORIGINS=*); not safe for production"
            );
            CorsLayer::permissive()
        }
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|raw| {
                    let trimmed = raw.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(origin) => {
                            tracing::info!("CORS: allowing origin {}", trimmed);
                            Some(origin)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: skipping invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS: nothing valid in FRESHET_CORS_ORIGINS, allowing localhost only"
                );
                localhost_cors()
            } else {
                cors_allowing(origins)
            }
        }
        None => localhost_cors(),
    }
}

fn localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = LOCALHOST_ORIGINS
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    cors_allowing(origins)
}

fn cors_allowing(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Default rate limit: 100 requests per second.
const DEFAULT_RPS: NonZeroU32 = NonZeroU32::new(100).unwrap();

/// Global rate limiter shared by all request handlers.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a limiter admitting `requests_per_second` requests per second.
///
/// A zero argument falls back to the default; disabling is the router's
/// decision, not the limiter's.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    let quota = Quota::per_second(rps);
    Arc::new(RateLimiter::direct(quota))
}

/// The configured requests-per-second limit.
///
/// Reads `FRESHET_RATE_LIMIT`; a value that does not parse as a number
/// is reported and replaced by the default rather than silently
/// disabling protection.
pub fn get_rate_limit_from_env() -> u32 {
    match std::env::var("FRESHET_RATE_LIMIT") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid FRESHET_RATE_LIMIT '{}', using default {}",
                raw,
                DEFAULT_RPS
            );
            DEFAULT_RPS.get()
        }),
        Err(_) => DEFAULT_RPS.get(),
    }
}

/// Rate limiting middleware.
///
/// Consults the global limiter before letting a request through and
/// answers 429 when the budget is spent. `/health` is exempt: cell runs
/// and slices do real interpreter and graph work, while health probes
/// arrive on a schedule the deployment controls, not the client.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_limiter_admits_a_request() {
        let limiter = create_rate_limiter(50);
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn zero_limit_falls_back_to_default() {
        let limiter = create_rate_limiter(0);
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn exhausted_quota_denies() {
        let limiter = create_rate_limiter(1);
        assert!(limiter.check().is_ok());
        // The single cell is spent; refill takes a full second
        assert!(limiter.check().is_err());
    }

    #[test]
    fn bundled_localhost_origins_all_parse() {
        for origin in LOCALHOST_ORIGINS {
            assert!(origin.parse::<HeaderValue>().is_ok());
        }
    }
}
