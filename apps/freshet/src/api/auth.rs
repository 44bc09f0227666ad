//! # Authentication Module
//!
//! Bearer-token authentication for the Freshet HTTP API.
//!
//! Authentication is off unless `FRESHET_API_KEY` is set. With a key
//! configured, every endpoint except `/health` requires it, either as
//! `Authorization: Bearer <key>` or as the bare key in the header.
//! `/health` stays open for load balancer probes.

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// The configured API key, or `None` when authentication is disabled.
///
/// An empty `FRESHET_API_KEY` counts as unset; a server must not be
/// lockable behind a zero-length secret.
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var("FRESHET_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

/// Whether `provided` equals `expected`, in constant time.
///
/// Both keys are padded to a common length so `ct_eq` always runs over
/// the same number of bytes; the length check happens after the scan so
/// a mismatched length costs the same as a mismatched byte.
fn key_matches(provided: &[u8], expected: &[u8]) -> bool {
    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided.len() == expected.len()
}

/// API key authentication middleware.
///
/// Re-reads the environment on every request, so a key rotated while
/// the server is running takes effect without a restart.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    // No key configured - authentication is off
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };

    // Load balancer probes must work without credentials
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header_value) = auth_header else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_authorization_header",
            "Missing Authorization header"
        );
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    // Accept both "Bearer <key>" and the bare key
    let provided = header_value.strip_prefix("Bearer ").unwrap_or(header_value);

    if key_matches(provided.as_bytes(), expected.as_bytes()) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            event = "auth_failure",
            reason = "invalid_api_key",
            "Authentication failed: invalid API key"
        );
        Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_match() {
        assert!(key_matches(b"secret-key-123", b"secret-key-123"));
    }

    #[test]
    fn same_length_mismatch_is_rejected() {
        assert!(!key_matches(b"secret-key-123", b"secret-key-456"));
    }

    #[test]
    fn prefix_of_the_key_is_rejected() {
        assert!(!key_matches(b"secret", b"secret-key-123"));
        assert!(!key_matches(b"secret-key-123", b"secret"));
    }

    #[test]
    fn empty_provided_key_is_rejected() {
        assert!(!key_matches(b"", b"secret-key-123"));
    }

    #[test]
    fn unset_env_disables_auth() {
        // SAFETY: This is a unit test running in isolation.
        unsafe { std::env::remove_var("FRESHET_API_KEY") };
        assert!(get_api_key_from_env().is_none());
    }
}
