//! txnscope-classify
//!
//! Classifies a JSON file of transactions and their smart contract results,
//! writing one classified transaction per line to stdout.

use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn, Level};

use txnscope_classifier::pipeline::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY};
use txnscope_classifier::{
    BatchClassifier, BatchConfig, Cache, CacheBackend, CacheConfig, DecimalsTable,
    RedisBackend, RedisConfig, SmartContractResult, TokenDecimals, Transaction,
};

#[derive(Debug, Parser)]
#[command(name = "txnscope-classify", about = "Classify ledger transactions")]
struct Args {
    /// JSON array of `{ "transaction": .., "results": [..] }` records
    #[arg(long, env = "TXNSCOPE_INPUT")]
    input: String,

    /// Viewpoint address, defaults to each transaction's sender
    #[arg(long, env = "TXNSCOPE_REFERENCE")]
    reference: Option<String>,

    /// Decimal places of a token as TOKEN=N, repeatable
    #[arg(long = "decimals", value_parser = parse_decimals)]
    decimals: Vec<(String, u32)>,

    /// Shared cache for token metadata
    #[arg(long, env = "TXNSCOPE_REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long, env = "TXNSCOPE_LOG_LEVEL", default_value = "info")]
    log_level: Level,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("Invalid input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    transaction: Transaction,
    #[serde(default)]
    results: Vec<SmartContractResult>,
}

/// Parse `TOKEN=N`
fn parse_decimals(arg: &str) -> Result<(String, u32), String> {
    let (token, decimals) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected TOKEN=N, got '{arg}'"))?;
    if token.is_empty() {
        return Err(format!("missing token in '{arg}'"));
    }
    let decimals = decimals
        .parse::<u32>()
        .map_err(|e| format!("invalid decimals in '{arg}': {e}"))?;
    Ok((token.to_string(), decimals))
}

/// Expand ~ to home directory in path
fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

fn load_records(path: &str) -> Result<Vec<Record>, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

async fn durable_backend(redis_url: Option<&str>) -> Option<Arc<dyn CacheBackend>> {
    let url = redis_url?;
    match RedisBackend::connect(&RedisConfig::with_url(url)).await {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            warn!(url = %url, error = %e, "Redis unavailable, using in-process cache only");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let path = expand_path(&args.input);
    let records = load_records(&path)?;
    info!(path = %path, records = records.len(), "Loaded input");

    let cache = Arc::new(Cache::new(
        CacheConfig::default(),
        durable_backend(args.redis_url.as_deref()).await,
    ));
    let source = args
        .decimals
        .iter()
        .fold(DecimalsTable::new(), |table, (token, decimals)| {
            table.with(token.clone(), *decimals)
        });
    let tokens = TokenDecimals::new(source, cache.clone());

    let mut transactions = Vec::with_capacity(records.len());
    let mut results = HashMap::new();
    for record in records {
        results.insert(record.transaction.tx_hash.clone(), record.results);
        transactions.push(record.transaction);
    }

    let batch = BatchClassifier::new(
        results,
        BatchConfig {
            chunk_size: args.chunk_size,
            concurrency: args.concurrency,
        },
    );
    info!(
        chunk_size = batch.config().chunk_size,
        concurrency = batch.config().concurrency,
        key_prefix = %cache.config().key_prefix,
        "Classifying batch"
    );
    let classified = batch
        .classify_resolving(&transactions, args.reference.as_deref(), &tokens)
        .await;

    let mut out = std::io::stdout().lock();
    for transaction in &classified {
        writeln!(out, "{}", transaction.to_json()?)?;
    }
    out.flush()?;

    Ok(())
}
