//! Shared rate limiting backed by an injected counter store.
//!
//! The counter lives outside the process: with Redis configured, every API
//! instance increments the same fixed-window counters, so limits hold across
//! restarts and replicas. Without Redis the limiter degrades to an
//! in-process window with a warning.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `REDIS_ENABLED`: Set to "false" to force the in-process fallback (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
//! - `RATE_LIMIT_REQUESTS`: requests per window (default: 100)
//! - `RATE_LIMIT_PERIOD_SECS`: window length in seconds (default: 60)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{info, warn};

use cortex_core::defaults::{DEFAULT_RATE_LIMIT_PERIOD_SECS, DEFAULT_RATE_LIMIT_REQUESTS};
use cortex_core::{Error, Result};

/// A fixed-window request counter keyed by caller identity.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increment the counter for `key` within the current window and return
    /// the new count. The first increment of a window arms its expiry.
    async fn incr(&self, key: &str, window: Duration) -> Result<u64>;
}

/// Redis-backed store: INCR + EXPIRE on first hit of each window.
pub struct RedisRateLimitStore {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisRateLimitStore {
    /// Connect to Redis at the given URL.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Internal(format!("Redis connection failed: {}", e)))?;
        Ok(Self {
            connection,
            prefix: "cx:ratelimit:".to_string(),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<u64> {
        let full_key = format!("{}{}", self.prefix, key);
        let mut conn = self.connection.clone();

        let count: u64 = conn
            .incr(&full_key, 1u64)
            .await
            .map_err(|e| Error::Internal(format!("Redis INCR failed: {}", e)))?;

        if count == 1 {
            let _: () = conn
                .expire(&full_key, window.as_secs() as i64)
                .await
                .map_err(|e| Error::Internal(format!("Redis EXPIRE failed: {}", e)))?;
        }

        Ok(count)
    }
}

/// In-process fallback store. Per-instance and reset on restart; only used
/// when Redis is unavailable.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, (Instant, u64)>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        // Opportunistic cleanup keeps the map bounded by active callers.
        windows.retain(|_, (started, _)| now.duration_since(*started) < window);

        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        Ok(entry.1)
    }
}

/// Rate limiter facade used by the API middleware.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, max_requests: u64, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    /// Build a limiter from environment configuration, preferring Redis and
    /// degrading to the in-process store with a warning.
    pub async fn from_env() -> Self {
        let max_requests: u64 = std::env::var("RATE_LIMIT_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_REQUESTS);
        let period_secs: u64 = std::env::var("RATE_LIMIT_PERIOD_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_PERIOD_SECS);
        let window = Duration::from_secs(period_secs.max(1));

        let redis_enabled = std::env::var("REDIS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let store: Arc<dyn RateLimitStore> = if redis_enabled {
            match RedisRateLimitStore::connect(&redis_url).await {
                Ok(store) => {
                    info!(
                        "Rate limiting via Redis ({} requests per {}s)",
                        max_requests, period_secs
                    );
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(
                        "Redis unavailable ({}), falling back to per-process rate limiting",
                        e
                    );
                    Arc::new(MemoryRateLimitStore::new())
                }
            }
        } else {
            info!(
                "Rate limiting in-process ({} requests per {}s); REDIS_ENABLED=false",
                max_requests, period_secs
            );
            Arc::new(MemoryRateLimitStore::new())
        };

        Self::new(store, max_requests, window)
    }

    /// Record one request for `key`. Returns false when the caller is over
    /// the limit for the current window.
    ///
    /// Store failures fail open: a broken counter store must not take the
    /// API down with it.
    pub async fn check(&self, key: &str) -> bool {
        match self.store.incr(key, self.window).await {
            Ok(count) => count <= self.max_requests,
            Err(e) => {
                warn!(error = %e, "Rate limit store unavailable; allowing request");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_counts_within_window() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_secs(60);

        assert_eq!(store.incr("user-1", window).await.unwrap(), 1);
        assert_eq!(store.incr("user-1", window).await.unwrap(), 2);
        assert_eq!(store.incr("user-2", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_resets_after_window() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_millis(20);

        assert_eq!(store.incr("user-1", window).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.incr("user-1", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_limiter_blocks_over_limit() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            2,
            Duration::from_secs(60),
        );

        assert!(limiter.check("user-1").await);
        assert!(limiter.check("user-1").await);
        assert!(!limiter.check("user-1").await);
        // Other callers are unaffected.
        assert!(limiter.check("user-2").await);
    }
}
