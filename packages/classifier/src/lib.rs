//! TxnScope Classifier Library
//!
//! This crate decodes ledger transaction payloads, classifies transactions
//! into semantic types with their effective token values, and provides the
//! two-tier cache used for token metadata lookups.

pub mod backend;
pub mod cache;
pub mod classifier;
pub mod decoder;
pub mod function;
pub mod pipeline;
pub mod token;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use backend::{CacheBackend, CacheError, MemoryBackend, RedisBackend, RedisConfig};
pub use cache::{Cache, CacheConfig, CacheDomain, DomainPolicy};
pub use classifier::{classify, extract_all_transfer_values};
pub use decoder::{decode_payload, DecodeError, DecodedCall};
pub use function::{lookup_function, ContractFunction};
pub use pipeline::{BatchClassifier, BatchConfig, SideEffectProvider};
pub use token::{ProviderError, TokenDecimals, TokenMetadataSource};
pub use transaction::{ClassifiedTransaction, SmartContractResult, Transaction, TransactionType};
pub use value::{DecimalsLookup, DecimalsTable, TokenValue, ValueError};
