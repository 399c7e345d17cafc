//! Token Metadata
//!
//! Cache-backed decimal places lookup. The async service resolves decimals
//! through the `TokenDecimals` cache domain and hands the classifier a plain
//! `DecimalsTable` snapshot, keeping classification itself free of I/O.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheDomain};
use crate::value::{collection_of, DecimalsLookup, DecimalsTable, NATIVE_DECIMALS, NATIVE_TOKEN};

/// Errors from external data providers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),
}

/// Source of token metadata, typically the chain API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    async fn decimal_places(&self, token: &str) -> Result<u32, ProviderError>;
}

#[async_trait]
impl<T: TokenMetadataSource + ?Sized> TokenMetadataSource for Arc<T> {
    async fn decimal_places(&self, token: &str) -> Result<u32, ProviderError> {
        (**self).decimal_places(token).await
    }
}

/// A fixed table can serve as its own metadata source
#[async_trait]
impl TokenMetadataSource for DecimalsTable {
    async fn decimal_places(&self, token: &str) -> Result<u32, ProviderError> {
        DecimalsLookup::decimal_places(self, token).map_err(|_| ProviderError::NotFound(token.to_string()))
    }
}

/// Decimal places resolved through the cache
pub struct TokenDecimals<S> {
    source: S,
    cache: Arc<Cache>,
}

impl<S: TokenMetadataSource> TokenDecimals<S> {
    pub fn new(source: S, cache: Arc<Cache>) -> Self {
        Self { source, cache }
    }

    /// Decimals of a token, keyed by collection so every nonce shares one entry
    pub async fn decimals(&self, token: &str) -> Result<u32, ProviderError> {
        if token == NATIVE_TOKEN {
            return Ok(NATIVE_DECIMALS);
        }
        let collection = collection_of(token);
        self.cache
            .with_cache(CacheDomain::TokenDecimals, Some(collection), || {
                self.source.decimal_places(collection)
            })
            .await
    }

    /// Snapshot for the given tokens. Unresolvable tokens are left out.
    pub async fn table_for<I, T>(&self, tokens: I) -> DecimalsTable
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut table = DecimalsTable::new();
        for token in tokens {
            let token = token.as_ref();
            match self.decimals(token).await {
                Ok(decimals) => table.insert(collection_of(token), decimals),
                Err(e) => warn!(token = %token, error = %e, "decimals lookup failed"),
            }
        }
        debug!(entries = table.len(), "built decimals table");
        table
    }
}
