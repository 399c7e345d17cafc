//! Two-Tier Cache
//!
//! Keyed values grouped into domains, each with its own TTL and an optional
//! single-flight lock. Reads check the in-process tier first, then the
//! durable backend, backfilling the in-process tier on a durable hit. Writes
//! go to both tiers; durable failures only cost a log line.
//!
//! Atomic domains hold one mutex per domain (not per key) around
//! check-and-populate, so at most one population of that domain runs at a
//! time across the process.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{CacheBackend, CacheError};

/// Prefix of every durable key
pub const DEFAULT_KEY_PREFIX: &str = "txnscope";

/// TTL for domains missing from the policy table
pub const DEFAULT_TTL_SECS: u64 = 600;

pub const TOKEN_DECIMALS_TTL_SECS: u64 = 86_400;
pub const TOKEN_METADATA_TTL_SECS: u64 = 3_600;
pub const PROVIDERS_TTL_SECS: u64 = 600;
pub const PROVIDER_IDENTITY_TTL_SECS: u64 = 86_400;
pub const NODES_TTL_SECS: u64 = 300;
pub const ECONOMICS_TTL_SECS: u64 = 600;

/// Category of cached values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheDomain {
    TokenDecimals,
    TokenMetadata,
    Providers,
    ProviderIdentity,
    Nodes,
    Economics,
}

impl CacheDomain {
    pub const ALL: [CacheDomain; 6] = [
        CacheDomain::TokenDecimals,
        CacheDomain::TokenMetadata,
        CacheDomain::Providers,
        CacheDomain::ProviderIdentity,
        CacheDomain::Nodes,
        CacheDomain::Economics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CacheDomain::TokenDecimals => "tokenDecimals",
            CacheDomain::TokenMetadata => "tokenMetadata",
            CacheDomain::Providers => "providers",
            CacheDomain::ProviderIdentity => "providerIdentity",
            CacheDomain::Nodes => "nodes",
            CacheDomain::Economics => "economics",
        }
    }
}

impl std::fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// TTL and single-flight flag of one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainPolicy {
    pub ttl: Duration,
    pub atomic: bool,
}

impl DomainPolicy {
    pub fn new(ttl_secs: u64, atomic: bool) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            atomic,
        }
    }
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS, false)
    }
}

/// Cache construction parameters
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub key_prefix: String,
    policies: HashMap<CacheDomain, DomainPolicy>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::empty()
            .with_policy(CacheDomain::TokenDecimals, DomainPolicy::new(TOKEN_DECIMALS_TTL_SECS, true))
            .with_policy(CacheDomain::TokenMetadata, DomainPolicy::new(TOKEN_METADATA_TTL_SECS, false))
            .with_policy(CacheDomain::Providers, DomainPolicy::new(PROVIDERS_TTL_SECS, true))
            .with_policy(
                CacheDomain::ProviderIdentity,
                DomainPolicy::new(PROVIDER_IDENTITY_TTL_SECS, false),
            )
            .with_policy(CacheDomain::Nodes, DomainPolicy::new(NODES_TTL_SECS, true))
            .with_policy(CacheDomain::Economics, DomainPolicy::new(ECONOMICS_TTL_SECS, true))
    }
}

impl CacheConfig {
    /// No domain policies; every domain uses `DomainPolicy::default()`
    pub fn empty() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            policies: HashMap::new(),
        }
    }

    /// Replace the key prefix, e.g. to share one Redis between environments
    pub fn with_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Set the policy of one domain
    ///
    /// # Arguments
    /// * `domain` - Domain to configure
    /// * `policy` - TTL and single-flight flag for that domain
    pub fn with_policy(mut self, domain: CacheDomain, policy: DomainPolicy) -> Self {
        self.policies.insert(domain, policy);
        self
    }

    /// Policy of `domain`, `DomainPolicy::default()` when unset
    pub fn policy(&self, domain: CacheDomain) -> DomainPolicy {
        self.policies.get(&domain).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct LocalEntry {
    bytes: Vec<u8>,
    inserted_at: Instant,
}

/// Two-tier keyed cache
///
/// In-process entries are never evicted, since `peek` serves them past their
/// TTL. Memory grows with the number of distinct keys, so high-cardinality
/// instances belong in short-lived `Cache` values or in the durable tier.
pub struct Cache {
    config: CacheConfig,
    local: RwLock<HashMap<String, LocalEntry>>,
    durable: Option<Arc<dyn CacheBackend>>,
    locks: HashMap<CacheDomain, Mutex<()>>,
}

impl Cache {
    /// Create a cache
    ///
    /// # Arguments
    /// * `config` - Key prefix and per-domain policies. Locks are created here for atomic domains.
    /// * `durable` - Shared backend, or `None` to use the in-process tier only
    pub fn new(config: CacheConfig, durable: Option<Arc<dyn CacheBackend>>) -> Self {
        let locks = CacheDomain::ALL
            .into_iter()
            .filter(|d| config.policy(*d).atomic)
            .map(|d| (d, Mutex::new(())))
            .collect();
        Self {
            config,
            local: RwLock::new(HashMap::new()),
            durable,
            locks,
        }
    }

    /// In-process tier only
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, None)
    }

    /// Configuration the cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// `prefix:domain` or `prefix:domain:instance`
    pub fn key(&self, domain: CacheDomain, instance: Option<&str>) -> String {
        match instance {
            Some(instance) => format!("{}:{}:{}", self.config.key_prefix, domain, instance),
            None => format!("{}:{}", self.config.key_prefix, domain),
        }
    }

    /// Value within its TTL from either tier
    pub async fn get<T: DeserializeOwned>(&self, domain: CacheDomain, instance: Option<&str>) -> Option<T> {
        let ttl = self.config.policy(domain).ttl;
        self.lookup(domain, instance, Some(ttl)).await
    }

    /// Like `get`, but accepts an expired in-process entry
    pub async fn peek<T: DeserializeOwned>(&self, domain: CacheDomain, instance: Option<&str>) -> Option<T> {
        self.lookup(domain, instance, None).await
    }

    async fn lookup<T: DeserializeOwned>(
        &self,
        domain: CacheDomain,
        instance: Option<&str>,
        max_age: Option<Duration>,
    ) -> Option<T> {
        let key = self.key(domain, instance);

        let local = self.local.read().await.get(&key).cloned();
        if let Some(entry) = local {
            if max_age.map_or(true, |ttl| entry.inserted_at.elapsed() < ttl) {
                debug!(key = %key, "local cache hit");
                return decode(&key, &entry.bytes);
            }
        }

        let bytes = self.durable_get(&key).await?;
        debug!(key = %key, "durable cache hit");
        let value = decode(&key, &bytes)?;
        self.backfill(&key, bytes, self.config.policy(domain).ttl).await;
        Some(value)
    }

    /// Write to both tiers. Only serialization can fail.
    pub async fn set<T: Serialize>(
        &self,
        domain: CacheDomain,
        instance: Option<&str>,
        value: &T,
    ) -> Result<(), CacheError> {
        let key = self.key(domain, instance);
        let bytes = serde_json::to_vec(value)?;
        let ttl = self.config.policy(domain).ttl;

        self.local.write().await.insert(
            key.clone(),
            LocalEntry {
                bytes: bytes.clone(),
                inserted_at: Instant::now(),
            },
        );

        if let Some(durable) = &self.durable {
            if let Err(e) = durable.set(&key, bytes, ttl).await {
                warn!(key = %key, error = %e, "durable cache write failed");
            }
        }
        Ok(())
    }

    /// Cached value, or the producer's result stored in both tiers
    ///
    /// Producer errors are returned as-is and nothing is cached.
    pub async fn with_cache<T, E, F, Fut>(
        &self,
        domain: CacheDomain,
        instance: Option<&str>,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _guard = match self.locks.get(&domain) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        if let Some(value) = self.get(domain, instance).await {
            return Ok(value);
        }

        debug!(domain = %domain, instance = ?instance, "populating cache");
        let value = producer().await?;
        if let Err(e) = self.set(domain, instance, &value).await {
            warn!(domain = %domain, error = %e, "could not cache produced value");
        }
        Ok(value)
    }

    /// Flush the durable tier. The in-process tier is left to expire.
    pub async fn clear(&self) -> Result<(), CacheError> {
        match &self.durable {
            Some(durable) => durable.flush_all().await,
            None => Ok(()),
        }
    }

    async fn durable_get(&self, key: &str) -> Option<Vec<u8>> {
        let durable = self.durable.as_ref()?;
        match durable.get(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "durable cache read failed");
                None
            }
        }
    }

    /// Store a durable hit locally, aged so both tiers expire together
    async fn backfill(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        let now = Instant::now();
        let remaining = match &self.durable {
            Some(durable) => durable.ttl(key).await.unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "durable cache ttl failed");
                None
            }),
            None => None,
        };
        let inserted_at = remaining
            .and_then(|remaining| now.checked_sub(ttl.saturating_sub(remaining)))
            .unwrap_or(now);

        self.local
            .write()
            .await
            .insert(key.to_string(), LocalEntry { bytes, inserted_at });
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Option<T> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "cached value could not be decoded");
            None
        }
    }
}
