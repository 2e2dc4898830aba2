//! In-process implementation of the session-cache port.
//!
//! A single expiring key space behind a parking_lot mutex. Expired entries are
//! purged lazily on access, so an idle instance holds at most the keys touched
//! since the last sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::store::cache::{
    cooldown_key, lock_key, ratelimit_key, session_key, SessionCache, RATE_WINDOW,
    SESSION_LOCK_TTL,
};

struct Entry {
    value: String,
    counter: u64,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, key: String, value: String, ttl: Duration) {
        let mut entries = self.entries.lock();
        entries.insert(
            key,
            Entry {
                value,
                counter: 0,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// SETNX with TTL: insert only when absent or expired.
    fn set_nx(&self, key: String, ttl: Duration) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now => false,
            _ => {
                entries.insert(
                    key,
                    Entry {
                        value: "1".to_string(),
                        counter: 0,
                        expires_at: now + ttl,
                    },
                );
                true
            }
        }
    }

    /// INCR with EXPIRE on first increment, per the rate-limit contract.
    fn incr(&self, key: String, window: Duration) -> u64 {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get_mut(&key) {
            Some(entry) if entry.expires_at > now => {
                entry.counter += 1;
                entry.counter
            }
            _ => {
                entries.insert(
                    key,
                    Entry {
                        value: String::new(),
                        counter: 1,
                        expires_at: now + window,
                    },
                );
                1
            }
        }
    }
}

#[async_trait]
impl SessionCache for InMemoryCache {
    async fn store_session(&self, session_id: &str, payload: String, ttl: Duration) -> Result<()> {
        self.set(session_key(session_id), payload, ttl);
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.get(&session_key(session_id)))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.remove(&session_key(session_id));
        Ok(())
    }

    async fn acquire_lock(&self, session_id: &str) -> Result<bool> {
        Ok(self.set_nx(lock_key(session_id), SESSION_LOCK_TTL))
    }

    async fn release_lock(&self, session_id: &str) -> Result<()> {
        self.remove(&lock_key(session_id));
        Ok(())
    }

    async fn in_cooldown(&self, session_id: &str) -> Result<bool> {
        Ok(self.exists(&cooldown_key(session_id)))
    }

    async fn set_cooldown(&self, session_id: &str, ttl: Duration) -> Result<()> {
        self.set(cooldown_key(session_id), "1".to_string(), ttl);
        Ok(())
    }

    async fn incr_rate(&self, ip: &str) -> Result<u64> {
        Ok(self.incr(ratelimit_key(ip), RATE_WINDOW))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
