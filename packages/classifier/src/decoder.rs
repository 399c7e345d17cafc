//! Call Payload Decoder
//!
//! Decodes base64 transaction payloads into `@`-delimited call terms and
//! recognizes the three standardized token transfer shapes. Anything else is
//! a generic contract call identified only by its first term.
//!
//! The decoder is a pure function of its input string so it can be applied to
//! top-level transaction payloads and side-effect payloads alike.

use alloy::primitives::U256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bech32::{Bech32, Hrp};
use thiserror::Error;

use crate::value::{parse_raw, ValueError};

/// Single fungible token transfer
pub const ESDT_TRANSFER: &str = "ESDTTransfer";
/// Single NFT / SFT / meta token transfer
pub const ESDT_NFT_TRANSFER: &str = "ESDTNFTTransfer";
/// Multi-token transfer
pub const MULTI_ESDT_NFT_TRANSFER: &str = "MultiESDTNFTTransfer";

/// Human-readable part of chain addresses
pub const ADDRESS_HRP: Hrp = Hrp::parse_unchecked("erd");

/// Hex length of a 32-byte public key
pub const ADDRESS_HEX_LEN: usize = 64;

/// Errors that can occur during payload decoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    #[error("Payload is not valid UTF-8")]
    Utf8,

    #[error("Invalid hex term: {0}")]
    Hex(String),

    #[error("{function}: missing field at index {index}")]
    MissingField { function: &'static str, index: usize },

    #[error("Invalid amount: {0}")]
    Amount(#[from] ValueError),

    #[error("Invalid number: {0}")]
    Number(String),

    #[error("Invalid address: {0}")]
    Address(String),
}

/// One token leg of a transfer call
#[derive(Debug, Clone, PartialEq)]
pub struct EsdtPayment {
    /// Full identifier, with `-<nonce>` suffix for NFT/meta tokens
    pub token: String,
    pub collection: String,
    pub nonce: u64,
    pub amount: U256,
}

impl EsdtPayment {
    pub fn new(collection: impl Into<String>, nonce: u64, amount: U256) -> Self {
        let collection = collection.into();
        Self {
            token: token_identifier(&collection, nonce),
            collection,
            nonce,
            amount,
        }
    }
}

/// Recognized call shapes
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedCall {
    EsdtTransfer {
        payment: EsdtPayment,
        function: Option<String>,
        args: Vec<String>,
    },
    EsdtNftTransfer {
        payment: EsdtPayment,
        destination: String,
        function: Option<String>,
        args: Vec<String>,
    },
    MultiEsdtNftTransfer {
        destination: String,
        payments: Vec<EsdtPayment>,
        function: Option<String>,
        args: Vec<String>,
    },
    /// Any other call; the first term is the function name
    Generic { function: String, args: Vec<String> },
}

impl DecodedCall {
    /// Name of the outermost call (the transfer function, or the generic function)
    pub fn top_level_name(&self) -> &str {
        match self {
            DecodedCall::EsdtTransfer { .. } => ESDT_TRANSFER,
            DecodedCall::EsdtNftTransfer { .. } => ESDT_NFT_TRANSFER,
            DecodedCall::MultiEsdtNftTransfer { .. } => MULTI_ESDT_NFT_TRANSFER,
            DecodedCall::Generic { function, .. } => function.as_str(),
        }
    }

    /// Function invoked on the receiver, if any
    pub fn function(&self) -> Option<&str> {
        match self {
            DecodedCall::EsdtTransfer { function, .. }
            | DecodedCall::EsdtNftTransfer { function, .. }
            | DecodedCall::MultiEsdtNftTransfer { function, .. } => function.as_deref(),
            DecodedCall::Generic { function, .. } => Some(function.as_str()),
        }
    }

    /// Hex-encoded arguments following the function name
    pub fn args(&self) -> &[String] {
        match self {
            DecodedCall::EsdtTransfer { args, .. }
            | DecodedCall::EsdtNftTransfer { args, .. }
            | DecodedCall::MultiEsdtNftTransfer { args, .. }
            | DecodedCall::Generic { args, .. } => args.as_slice(),
        }
    }

    pub fn payments(&self) -> Vec<&EsdtPayment> {
        match self {
            DecodedCall::EsdtTransfer { payment, .. } | DecodedCall::EsdtNftTransfer { payment, .. } => {
                vec![payment]
            }
            DecodedCall::MultiEsdtNftTransfer { payments, .. } => payments.iter().collect(),
            DecodedCall::Generic { .. } => Vec::new(),
        }
    }

    /// Destination embedded in NFT and multi transfers
    pub fn destination(&self) -> Option<&str> {
        match self {
            DecodedCall::EsdtNftTransfer { destination, .. }
            | DecodedCall::MultiEsdtNftTransfer { destination, .. } => Some(destination.as_str()),
            _ => None,
        }
    }

    pub fn is_transfer(&self) -> bool {
        !matches!(self, DecodedCall::Generic { .. })
    }
}

/// Decoded generic argument
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Text(String),
    Number(U256),
    Address(String),
}

/// Decode a base64 payload and parse its call terms
pub fn decode_payload(data: &str) -> Result<DecodedCall, DecodeError> {
    let text = decode_base64_text(data)?;
    parse_call(&text)
}

/// Base64 payload to UTF-8 text
pub fn decode_base64_text(data: &str) -> Result<String, DecodeError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)
}

/// Whether decoded payload text starts with one of the standardized transfer names
pub fn is_transfer_text(text: &str) -> bool {
    text.starts_with(ESDT_TRANSFER)
        || text.starts_with(ESDT_NFT_TRANSFER)
        || text.starts_with(MULTI_ESDT_NFT_TRANSFER)
}

/// Split payload text on `@` and decode the recognized transfer shapes
pub fn parse_call(text: &str) -> Result<DecodedCall, DecodeError> {
    let terms: Vec<&str> = text.split('@').collect();

    match terms[0] {
        ESDT_TRANSFER => {
            let payment = EsdtPayment::new(
                hex_to_text(field(&terms, 1, ESDT_TRANSFER)?)?,
                0,
                parse_raw(field(&terms, 2, ESDT_TRANSFER)?, 16)?,
            );
            let (function, args) = trailing_call(&terms, 3)?;
            Ok(DecodedCall::EsdtTransfer { payment, function, args })
        }
        ESDT_NFT_TRANSFER => {
            let payment = EsdtPayment::new(
                hex_to_text(field(&terms, 1, ESDT_NFT_TRANSFER)?)?,
                hex_to_u64(field(&terms, 2, ESDT_NFT_TRANSFER)?)?,
                parse_raw(field(&terms, 3, ESDT_NFT_TRANSFER)?, 16)?,
            );
            let destination = hex_to_address(field(&terms, 4, ESDT_NFT_TRANSFER)?)?;
            let (function, args) = trailing_call(&terms, 5)?;
            Ok(DecodedCall::EsdtNftTransfer {
                payment,
                destination,
                function,
                args,
            })
        }
        MULTI_ESDT_NFT_TRANSFER => {
            let destination = hex_to_address(field(&terms, 1, MULTI_ESDT_NFT_TRANSFER)?)?;
            let count = hex_to_u64(field(&terms, 2, MULTI_ESDT_NFT_TRANSFER)?)? as usize;
            let function_index = count
                .checked_mul(3)
                .and_then(|n| n.checked_add(3))
                .filter(|&i| i <= terms.len())
                .ok_or(DecodeError::MissingField {
                    function: MULTI_ESDT_NFT_TRANSFER,
                    index: terms.len(),
                })?;

            let payments = (0..count)
                .map(|i| -> Result<EsdtPayment, DecodeError> {
                    let base = 3 + 3 * i;
                    Ok(EsdtPayment::new(
                        hex_to_text(field(&terms, base, MULTI_ESDT_NFT_TRANSFER)?)?,
                        hex_to_u64(field(&terms, base + 1, MULTI_ESDT_NFT_TRANSFER)?)?,
                        parse_raw(field(&terms, base + 2, MULTI_ESDT_NFT_TRANSFER)?, 16)?,
                    ))
                })
                .collect::<Result<Vec<_>, DecodeError>>()?;

            let (function, args) = trailing_call(&terms, function_index)?;
            Ok(DecodedCall::MultiEsdtNftTransfer {
                destination,
                payments,
                function,
                args,
            })
        }
        function => Ok(DecodedCall::Generic {
            function: function.to_string(),
            args: terms[1..].iter().map(|t| t.to_string()).collect(),
        }),
    }
}

fn field<'a>(terms: &[&'a str], index: usize, function: &'static str) -> Result<&'a str, DecodeError> {
    terms
        .get(index)
        .copied()
        .ok_or(DecodeError::MissingField { function, index })
}

/// Optional hex-encoded function name at `index`, followed by its arguments
fn trailing_call(terms: &[&str], index: usize) -> Result<(Option<String>, Vec<String>), DecodeError> {
    match terms.get(index) {
        Some(term) if !term.is_empty() => {
            let function = hex_to_text(term)?;
            let args = terms[index + 1..].iter().map(|t| t.to_string()).collect();
            Ok((Some(function), args))
        }
        _ => Ok((None, Vec::new())),
    }
}

/// Token identifier including the hex nonce for NFT/meta tokens
pub fn token_identifier(collection: &str, nonce: u64) -> String {
    if nonce == 0 {
        return collection.to_string();
    }
    let nonce_hex = format!("{:x}", nonce);
    if nonce_hex.len() % 2 == 1 {
        format!("{}-0{}", collection, nonce_hex)
    } else {
        format!("{}-{}", collection, nonce_hex)
    }
}

/// Parse a hex string to bytes (with or without 0x prefix)
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, DecodeError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| DecodeError::Hex(format!("{hex_str}: {e}")))
}

pub fn hex_to_text(hex_str: &str) -> Result<String, DecodeError> {
    String::from_utf8(hex_to_bytes(hex_str)?).map_err(|_| DecodeError::Utf8)
}

/// Empty input decodes to zero
pub fn hex_to_u64(hex_str: &str) -> Result<u64, DecodeError> {
    if hex_str.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(hex_str, 16).map_err(|e| DecodeError::Number(format!("{hex_str}: {e}")))
}

/// Hex-encoded 32-byte public key to a bech32 chain address
pub fn hex_to_address(hex_str: &str) -> Result<String, DecodeError> {
    let bytes = hex_to_bytes(hex_str)?;
    if bytes.len() != ADDRESS_HEX_LEN / 2 {
        return Err(DecodeError::Address(format!("{} bytes", bytes.len())));
    }
    bech32::encode::<Bech32>(ADDRESS_HRP, &bytes).map_err(|e| DecodeError::Address(e.to_string()))
}

fn is_probably_text(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_alphanumeric() || c == ' ' || c == '-')
}

/// Best-effort interpretation of a generic hex argument
pub fn decode_argument(term: &str) -> Argument {
    if term.len() == ADDRESS_HEX_LEN {
        return match hex_to_address(term) {
            Ok(address) => Argument::Address(address),
            Err(_) => Argument::Text(hex_to_text(term).unwrap_or_else(|_| term.to_string())),
        };
    }
    if let Ok(text) = hex_to_text(term) {
        if is_probably_text(&text) {
            return Argument::Text(text);
        }
    }
    match parse_raw(term, 16) {
        Ok(number) => Argument::Number(number),
        Err(_) => Argument::Text(term.to_string()),
    }
}
