//! Durable Cache Backends
//!
//! Key/value stores with per-key expiry that sit behind the in-process cache
//! tier. `RedisBackend` is the shared production store; `MemoryBackend` stands
//! in for it in tests and single-process runs.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Default Redis endpoint
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Maximum number of connection attempts before giving up
pub const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Initial backoff delay between connection attempts
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum backoff delay between connection attempts
pub const MAX_BACKOFF_MS: u64 = 5000;

/// Per-attempt connection timeout in milliseconds
pub const CONNECTION_TIMEOUT_MS: u64 = 2000;

/// Errors raised by a durable backend
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Max connection attempts ({0}) exceeded")]
    MaxConnectAttemptsExceeded(u32),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable key/value store with expiry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remaining lifetime of `key`, `None` when missing or without expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn flush_all(&self) -> Result<(), CacheError>;
}

/// Configuration for the Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub max_connect_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            max_connect_attempts: MAX_CONNECT_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            timeout_ms: CONNECTION_TIMEOUT_MS,
        }
    }
}

impl RedisConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Backoff delay before the given retry
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_backoff_ms * 2u64.pow(attempt.min(10));
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// Redis-backed durable tier
#[derive(Clone)]
pub struct RedisBackend {
    connection: MultiplexedConnection,
}

impl RedisBackend {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    /// Connect with retries and exponential backoff
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())?;
        let attempts = config.max_connect_attempts.max(1);

        for attempt in 0..attempts {
            let pending = client.get_multiplexed_async_connection();
            match timeout(Duration::from_millis(config.timeout_ms), pending).await {
                Ok(Ok(connection)) => {
                    info!(url = %config.url, "Connected to Redis");
                    return Ok(Self::new(connection));
                }
                Ok(Err(e)) => warn!(attempt = attempt + 1, error = %e, "Redis connection failed"),
                Err(_) => warn!(attempt = attempt + 1, timeout_ms = config.timeout_ms, "Redis connection timed out"),
            }
            if attempt + 1 < attempts {
                sleep(config.backoff_delay(attempt)).await;
            }
        }

        Err(CacheError::MaxConnectAttemptsExceeded(attempts))
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        // SET EX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.connection.clone();
        // -2 missing, -1 no expiry
        let seconds: i64 = conn.ttl(key).await?;
        Ok((seconds >= 0).then(|| Duration::from_secs(seconds as u64)))
    }

    async fn flush_all(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("FLUSHALL").query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-process durable tier with the same expiry semantics as Redis
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        debug!(key = %key, ttl_secs = ttl.as_secs(), "memory backend set");
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(_, expires_at)| *expires_at - now))
    }

    async fn flush_all(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
