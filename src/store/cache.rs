//! Active-session cache port.
//!
//! Key shapes follow the deployment contract so an external Redis adapter can
//! be swapped in without touching callers:
//!
//!   nego:session:<id>    JSON session snapshot with TTL
//!   nego:lock:<id>       per-session turn lock, NX + 5 s expiry
//!   nego:cooldown:<id>   presence = session is in cooldown, PX expiry
//!   nego:ratelimit:<ip>  per-IP counter, 60 s window
//!
//! Read failures degrade gracefully (callers treat them as a miss); write
//! failures are surfaced because losing the active state is fatal for a turn.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// How long a per-session turn lock may be held before it self-expires.
pub const SESSION_LOCK_TTL: Duration = Duration::from_secs(5);
/// Window for the per-IP request counter.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Store the session snapshot under `nego:session:<id>` with a TTL.
    async fn store_session(&self, session_id: &str, payload: String, ttl: Duration) -> Result<()>;

    /// Load the session snapshot, `None` on miss or expiry.
    async fn load_session(&self, session_id: &str) -> Result<Option<String>>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Try to take the per-session turn lock (NX semantics). Returns false
    /// when another turn already holds it.
    async fn acquire_lock(&self, session_id: &str) -> Result<bool>;

    async fn release_lock(&self, session_id: &str) -> Result<()>;

    /// True while the session's cooldown key exists.
    async fn in_cooldown(&self, session_id: &str) -> Result<bool>;

    async fn set_cooldown(&self, session_id: &str, ttl: Duration) -> Result<()>;

    /// Increment the per-IP counter, starting the 60 s window on first use.
    /// Returns the new count.
    async fn incr_rate(&self, ip: &str) -> Result<u64>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<()>;
}

pub fn session_key(session_id: &str) -> String {
    format!("nego:session:{session_id}")
}

pub fn lock_key(session_id: &str) -> String {
    format!("nego:lock:{session_id}")
}

pub fn cooldown_key(session_id: &str) -> String {
    format!("nego:cooldown:{session_id}")
}

pub fn ratelimit_key(ip: &str) -> String {
    format!("nego:ratelimit:{ip}")
}
