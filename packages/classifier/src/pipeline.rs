//! Batch Classification Pipeline
//!
//! Fetches side-effects for a batch of transactions in fixed-size chunks with
//! bounded concurrency, gathers them back in input order and classifies each
//! transaction. A failed chunk fetch degrades to classifying that chunk
//! without side-effects.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::classifier::{classify, referenced_tokens};
use crate::token::{ProviderError, TokenDecimals, TokenMetadataSource};
use crate::transaction::{ClassifiedTransaction, SmartContractResult, Transaction};
use crate::value::DecimalsLookup;

/// Transactions per side-effect request
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Side-effect requests in flight at once
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Source of smart contract results keyed by originating transaction hash
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SideEffectProvider: Send + Sync {
    async fn results_for(
        &self,
        tx_hashes: &[String],
    ) -> Result<HashMap<String, Vec<SmartContractResult>>, ProviderError>;
}

#[async_trait]
impl<T: SideEffectProvider + ?Sized> SideEffectProvider for Arc<T> {
    async fn results_for(
        &self,
        tx_hashes: &[String],
    ) -> Result<HashMap<String, Vec<SmartContractResult>>, ProviderError> {
        (**self).results_for(tx_hashes).await
    }
}

/// Preloaded results, e.g. read from a file
#[async_trait]
impl SideEffectProvider for HashMap<String, Vec<SmartContractResult>> {
    async fn results_for(
        &self,
        tx_hashes: &[String],
    ) -> Result<HashMap<String, Vec<SmartContractResult>>, ProviderError> {
        Ok(tx_hashes
            .iter()
            .filter_map(|hash| self.get(hash).map(|results| (hash.clone(), results.clone())))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Classifies batches of transactions against a side-effect provider
pub struct BatchClassifier<P> {
    provider: P,
    config: BatchConfig,
}

impl<P: SideEffectProvider> BatchClassifier<P> {
    pub fn new(provider: P, config: BatchConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// Results for every transaction, aligned with `txs`
    pub async fn fetch_results(&self, txs: &[Transaction]) -> Vec<Vec<SmartContractResult>> {
        let chunk_size = self.config.chunk_size.max(1);
        let concurrency = self.config.concurrency.max(1);

        let fetches = txs.chunks(chunk_size).enumerate().map(|(index, chunk)| async move {
            let hashes: Vec<String> = chunk.iter().map(|tx| tx.tx_hash.clone()).collect();
            match self.provider.results_for(&hashes).await {
                Ok(by_hash) => {
                    debug!(chunk = index, transactions = chunk.len(), "fetched side-effects");
                    hashes
                        .iter()
                        .map(|hash| by_hash.get(hash).cloned().unwrap_or_default())
                        .collect::<Vec<_>>()
                }
                Err(e) => {
                    error!(chunk = index, transactions = chunk.len(), error = %e, "side-effect fetch failed, classifying without results");
                    vec![Vec::new(); chunk.len()]
                }
            }
        });

        stream::iter(fetches)
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Classify with a caller-supplied decimals snapshot
    pub async fn classify_all(
        &self,
        txs: &[Transaction],
        reference: Option<&str>,
        decimals: &dyn DecimalsLookup,
    ) -> Vec<ClassifiedTransaction> {
        let results = self.fetch_results(txs).await;
        let classified: Vec<ClassifiedTransaction> = txs
            .iter()
            .zip(results.iter())
            .map(|(tx, results)| classify(tx, results, reference, decimals))
            .collect();
        info!(transactions = classified.len(), "classified batch");
        classified
    }

    /// Classify, resolving decimals for every token the batch references
    pub async fn classify_resolving<S: TokenMetadataSource>(
        &self,
        txs: &[Transaction],
        reference: Option<&str>,
        tokens: &TokenDecimals<S>,
    ) -> Vec<ClassifiedTransaction> {
        let results = self.fetch_results(txs).await;

        let referenced: BTreeSet<String> = txs
            .iter()
            .zip(results.iter())
            .flat_map(|(tx, results)| referenced_tokens(tx, results))
            .collect();
        let decimals = tokens.table_for(&referenced).await;

        let classified: Vec<ClassifiedTransaction> = txs
            .iter()
            .zip(results.iter())
            .map(|(tx, results)| classify(tx, results, reference, &decimals))
            .collect();
        info!(transactions = classified.len(), tokens = referenced.len(), "classified batch");
        classified
    }
}
