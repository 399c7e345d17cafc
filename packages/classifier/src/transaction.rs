//! Ledger Data Model
//!
//! Transactions and smart contract results as delivered by the upstream
//! index, plus the classified form produced by the classifier. All shapes
//! serialize as camelCase JSON and tolerate missing or unknown fields.

use serde::{Deserialize, Serialize};

use crate::value::TokenValue;

/// Sender id used by the protocol for metachain-issued transfers
pub const METACHAIN_SENDER: &str = "4294967295";

/// Ledger transaction as recorded upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transaction {
    /// Transaction hash, hex without prefix
    pub tx_hash: String,
    /// Sender address (bech32), or the metachain id for protocol rewards
    pub sender: String,
    /// Receiver address (bech32) as recorded on chain
    pub receiver: String,
    /// Declared native value, raw decimal string
    pub value: String,
    /// Base64 call payload
    pub data: Option<String>,
    /// Sender account nonce
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub gas_used: u64,
    /// Fee paid, raw decimal string
    pub fee: String,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    pub sender_shard: u32,
    pub receiver_shard: u32,
    /// Token identifiers moved, as reported by the index
    pub tokens: Vec<String>,
    /// Raw amounts matching `tokens`
    pub esdt_values: Vec<String>,
    /// Execution status (e.g. "success", "fail")
    pub status: String,
    /// Whether the receiver is a contract invoked by this transaction
    pub is_sc_call: bool,
}

impl Transaction {
    /// Payload, treating an empty string as absent
    pub fn payload(&self) -> Option<&str> {
        self.data.as_deref().filter(|d| !d.trim().is_empty())
    }
}

/// Side-effect record emitted while executing a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmartContractResult {
    /// Result hash
    pub hash: String,
    /// Contract that emitted the result
    pub sender: String,
    /// Account credited by the result
    pub receiver: String,
    /// Native value carried, raw decimal string
    pub value: String,
    /// Base64 payload
    pub data: Option<String>,
    /// Hash of the transaction that started the execution
    pub original_tx_hash: String,
    /// Hash of the transaction or result that directly produced this one
    pub prev_tx_hash: String,
    /// Sender of the originating transaction, when the index reports it
    pub original_sender: Option<String>,
    pub nonce: u64,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

impl SmartContractResult {
    /// A result with no payload carries value only
    pub fn has_empty_payload(&self) -> bool {
        self.data.as_deref().map_or(true, |d| d.trim().is_empty())
    }
}

/// Semantic type assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Send,
    Receive,
    Swap,
    Wrap,
    Unwrap,
    #[serde(rename = "EnterLP")]
    EnterLp,
    #[serde(rename = "ExitLP")]
    ExitLp,
    EnterFarm,
    ExitFarm,
    Claim,
    Compound,
    Delegate,
    Undelegate,
    Withdraw,
    ModifyDelegationCap,
    ChangeServiceFee,
    ReceiveValidationReward,
    SmartContract,
    Unknown,
}

impl TransactionType {
    pub fn name(&self) -> &'static str {
        match self {
            TransactionType::Send => "Send",
            TransactionType::Receive => "Receive",
            TransactionType::Swap => "Swap",
            TransactionType::Wrap => "Wrap",
            TransactionType::Unwrap => "Unwrap",
            TransactionType::EnterLp => "EnterLP",
            TransactionType::ExitLp => "ExitLP",
            TransactionType::EnterFarm => "EnterFarm",
            TransactionType::ExitFarm => "ExitFarm",
            TransactionType::Claim => "Claim",
            TransactionType::Compound => "Compound",
            TransactionType::Delegate => "Delegate",
            TransactionType::Undelegate => "Undelegate",
            TransactionType::Withdraw => "Withdraw",
            TransactionType::ModifyDelegationCap => "ModifyDelegationCap",
            TransactionType::ChangeServiceFee => "ChangeServiceFee",
            TransactionType::ReceiveValidationReward => "ReceiveValidationReward",
            TransactionType::SmartContract => "SmartContract",
            TransactionType::Unknown => "Unknown",
        }
    }
}

/// Transaction plus its classification
///
/// `transaction` is a copy of the input; only `sender`/`receiver` may differ,
/// when an embedded destination reveals the real counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(default)]
    pub function: Option<String>,
    /// Effective transferred value
    #[serde(default)]
    pub effective_value: TokenValue,
    /// Secondary value, `TokenValue::none()` when not applicable
    #[serde(default)]
    pub other_value: TokenValue,
}

impl ClassifiedTransaction {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
