//! Ephemeral TTL cache
//!
//! Short-circuits repeated work (validations, summaries, chat history) and
//! backs the anomaly detector's sliding counters. The cache is never a
//! source of truth: an unreachable backend is treated exactly like a miss
//! and is never surfaced to callers as an error.

use async_trait::async_trait;
use kyc_common::{Error, Result};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Namespaced cache keys, one constructor per entity kind so keys can
/// never collide across kinds
pub mod keys {
    use chrono::{DateTime, Utc};

    pub fn summary(subject_id: &str) -> String {
        format!("summary:{subject_id}")
    }

    pub fn kyc(document_id: &str) -> String {
        format!("kyc:{document_id}")
    }

    pub fn chat_history(session_id: &str) -> String {
        format!("chat:history:{session_id}")
    }

    pub fn failures(subject_id: &str) -> String {
        format!("audit:failures:{subject_id}")
    }

    pub fn rate(event_type: &str) -> String {
        format!("audit:rate:{event_type}")
    }

    pub fn alert(detected_at: DateTime<Utc>) -> String {
        format!("audit:alert:{}", detected_at.format("%Y%m%d%H%M%S%6f"))
    }
}

/// Cache contract
///
/// All operations are best-effort: `get` answers `None` both for a true
/// miss and for an unreachable backend, `set` silently drops the write on
/// failure, and `incr` answers `None` when the backend cannot count.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: &str, ttl: Duration);

    /// Atomically increment a counter, creating it with the given TTL on
    /// first increment. The window expires relative to the first
    /// increment, not the latest one.
    async fn incr(&self, key: &str, ttl: Duration) -> Option<i64>;
}

// ========================================
// Redis-backed cache
// ========================================

/// Cache over a redis endpoint (`GET` / `SETEX` / `INCR`+`EXPIRE`)
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
    op_timeout: Duration,
}

impl RedisCache {
    /// Connect to a redis endpoint. Connection failures here are hard
    /// errors (the operator asked for a cache backend that does not
    /// exist); failures after startup degrade to misses.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Unavailable(format!("redis connect: {e}")))?;
        Ok(Self { conn, op_timeout })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        let op = conn.get::<_, Option<String>>(key);
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
            Err(_) => {
                warn!(key, "Cache read timed out, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = self.conn.clone();
        let op = conn.set_ex::<_, _, ()>(key, value, ttl.as_secs());
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key, error = %e, "Cache write failed, continuing without cache"),
            Err(_) => warn!(key, "Cache write timed out, continuing without cache"),
        }
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Option<i64> {
        let mut conn = self.conn.clone();
        let op = conn.incr::<_, _, i64>(key, 1);
        let count = match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                warn!(key, error = %e, "Counter increment failed");
                return None;
            }
            Err(_) => {
                warn!(key, "Counter increment timed out");
                return None;
            }
        };

        // INCR hands 1 to exactly one caller, so exactly one caller arms
        // the expiry and the window runs from the first increment
        if count == 1 {
            let expire = conn.expire::<_, i64>(key, ttl.as_secs() as i64);
            match tokio::time::timeout(self.op_timeout, expire).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(key, error = %e, "Counter expiry failed"),
                Err(_) => warn!(key, "Counter expiry timed out"),
            }
        }
        Some(count)
    }
}

// ========================================
// In-memory cache
// ========================================

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process cache with the same contract, used in tests and in
/// deployments without a cache backend
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Option<i64> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let expired = entries
            .get(key)
            .map_or(false, |entry| entry.expires_at <= now);
        if expired {
            entries.remove(key);
        }

        match entries.get_mut(key) {
            Some(entry) => {
                let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                entry.value = count.to_string();
                // Expiry stays anchored to the first increment
                Some(count)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    MemoryEntry {
                        value: "1".to_string(),
                        expires_at: now + ttl,
                    },
                );
                Some(1)
            }
        }
    }
}
