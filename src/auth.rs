//! Authentication guards for the HTTP surface.
//!
//! Admin routes use `X-API-Key`; session-scoped routes use `X-Session-Token`
//! checked against the token stored with the active session. Both comparisons
//! are constant-time.

use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::warn;

use crate::config::Settings;
use crate::error::ServiceError;
use crate::store::SessionCache;

/// Constant-time string comparison; the accumulated fold keeps the timing
/// independent of where a mismatch occurs.
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Validate the admin API key for protected routes (product management).
/// An empty configured key is a development bypass and is logged loudly.
pub fn verify_admin_key(settings: &Settings, headers: &HeaderMap) -> Result<(), ServiceError> {
    if settings.api_admin_key.is_empty() {
        warn!("API_ADMIN_KEY not configured; admin routes are unprotected (dev mode)");
        return Ok(());
    }
    let presented = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::Forbidden)?;
    if !timing_safe_eq(presented, &settings.api_admin_key) {
        return Err(ServiceError::Forbidden);
    }
    Ok(())
}

#[derive(Deserialize)]
struct TokenView {
    #[serde(default)]
    session_token: String,
}

/// Validate that the caller owns this negotiation session. The token is
/// checked against the active cache copy; a missing session reads as expired.
pub async fn verify_session_token(
    cache: &dyn SessionCache,
    session_id: &str,
    headers: &HeaderMap,
) -> Result<(), ServiceError> {
    let presented = headers
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::Forbidden)?;

    let raw = cache
        .load_session(session_id)
        .await
        .ok()
        .flatten()
        .ok_or_else(|| ServiceError::NotFound(format!("session {session_id}")))?;

    let stored: TokenView = serde_json::from_str(&raw)
        .map_err(|e| ServiceError::Degraded(format!("corrupt session record: {e}")))?;

    if stored.session_token.is_empty() || !timing_safe_eq(presented, &stored.session_token) {
        return Err(ServiceError::Forbidden);
    }
    Ok(())
}
