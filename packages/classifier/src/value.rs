//! Token Value Model
//!
//! Represents token amounts as an exact raw integer plus its decimal places,
//! with a human-scaled `f64` approximation kept alongside for display.
//! Raw amounts never pass through floating point.

use std::collections::HashMap;
use std::ops::{Add, Sub};

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Identifier of the native token
pub const NATIVE_TOKEN: &str = "EGLD";

/// Decimal places of the native token
pub const NATIVE_DECIMALS: u32 = 18;

/// Raw amount strings longer than this are rejected before parsing
pub const MAX_RAW_LEN: usize = 64;

/// Errors produced by value conversions and arithmetic
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Raw amount is {0} characters long (max {MAX_RAW_LEN})")]
    RawTooLong(usize),

    #[error("Malformed raw amount: {0}")]
    MalformedRaw(String),

    #[error("Scaled amount is not representable: {0}")]
    InvalidScaled(f64),

    #[error("No decimal places known for token {0}")]
    UnknownToken(String),

    #[error("Token mismatch: {left} vs {right}")]
    TokenMismatch { left: String, right: String },

    #[error("Arithmetic overflow on {0}")]
    Overflow(String),
}

/// Source of decimal places per token identifier
pub trait DecimalsLookup {
    fn decimal_places(&self, token: &str) -> Result<u32, ValueError>;
}

/// In-memory decimals snapshot. Always knows the native token.
#[derive(Debug, Clone)]
pub struct DecimalsTable {
    decimals: HashMap<String, u32>,
}

impl Default for DecimalsTable {
    fn default() -> Self {
        let mut decimals = HashMap::new();
        decimals.insert(NATIVE_TOKEN.to_string(), NATIVE_DECIMALS);
        Self { decimals }
    }
}

impl DecimalsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, token: impl Into<String>, decimals: u32) -> Self {
        self.insert(token, decimals);
        self
    }

    /// Set decimals for an identifier or collection, replacing any previous entry
    pub fn insert(&mut self, token: impl Into<String>, decimals: u32) {
        self.decimals.insert(token.into(), decimals);
    }

    /// Number of entries, the native token included
    pub fn len(&self) -> usize {
        self.decimals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decimals.is_empty()
    }
}

impl DecimalsLookup for DecimalsTable {
    /// Exact identifier first, then the collection for NFT/meta identifiers
    fn decimal_places(&self, token: &str) -> Result<u32, ValueError> {
        self.decimals
            .get(token)
            .or_else(|| self.decimals.get(collection_of(token)))
            .copied()
            .ok_or_else(|| ValueError::UnknownToken(token.to_string()))
    }
}

/// Strip a trailing nonce from an NFT/meta identifier (`FARM-abc123-0a` -> `FARM-abc123`)
pub fn collection_of(identifier: &str) -> &str {
    let mut dashes = identifier.match_indices('-').map(|(i, _)| i);
    match (dashes.next(), dashes.next()) {
        (Some(_), Some(second)) => &identifier[..second],
        _ => identifier,
    }
}

/// Token amount with exact raw integer and scaled approximation
///
/// Invariant: `value == raw / 10^decimals`, always finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValue {
    /// Smallest-unit amount
    #[serde(with = "raw_decimal")]
    pub raw: U256,
    #[serde(default)]
    pub decimals: u32,
    /// `raw` scaled by `decimals`, for display only
    #[serde(default)]
    pub value: f64,
    /// Token identifier, empty for the "none" sentinel
    #[serde(default)]
    pub token: String,
}

impl Default for TokenValue {
    fn default() -> Self {
        Self::none()
    }
}

impl TokenValue {
    /// Build from parts, computing the scaled approximation
    pub fn new(raw: U256, decimals: u32, token: impl Into<String>) -> Self {
        Self {
            raw,
            decimals,
            value: scale(raw, decimals),
            token: token.into(),
        }
    }

    /// Zero amount of `token`, with no decimals
    ///
    /// Default fallback of the infallible constructors.
    pub fn zero(token: impl Into<String>) -> Self {
        Self::new(U256::ZERO, 0, token)
    }

    /// "Not applicable" sentinel, distinct from a zero amount of a real token
    pub fn none() -> Self {
        Self::new(U256::ZERO, 0, "")
    }

    pub fn is_none(&self) -> bool {
        self.token.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Part of the identifier before the first `-`
    pub fn ticker(&self) -> &str {
        self.token.split('-').next().unwrap_or_default()
    }

    /// Raw amount as a decimal string
    pub fn raw_string(&self) -> String {
        self.raw.to_string()
    }

    // ==================== Fallible constructors ====================

    /// Build from a raw amount, looking up the token's decimals
    ///
    /// # Arguments
    /// * `raw` - Amount in the token's smallest unit
    /// * `token` - Full token identifier, nonce included for NFT/meta tokens
    /// * `lookup` - Decimals source
    ///
    /// # Returns
    /// `ValueError::UnknownToken` when the lookup has no entry for `token`
    pub fn try_from_raw(
        raw: U256,
        token: &str,
        lookup: &dyn DecimalsLookup,
    ) -> Result<Self, ValueError> {
        let decimals = lookup.decimal_places(token)?;
        Ok(Self::new(raw, decimals, token))
    }

    /// Build from a hex raw amount, with or without `0x`
    pub fn try_from_raw_hex(
        hex_str: &str,
        token: &str,
        lookup: &dyn DecimalsLookup,
    ) -> Result<Self, ValueError> {
        let raw = parse_raw(hex_str.strip_prefix("0x").unwrap_or(hex_str), 16)?;
        Self::try_from_raw(raw, token, lookup)
    }

    /// Build from a decimal raw amount. Inputs over `MAX_RAW_LEN` are rejected.
    pub fn try_from_raw_decimal(
        decimal_str: &str,
        token: &str,
        lookup: &dyn DecimalsLookup,
    ) -> Result<Self, ValueError> {
        let raw = parse_raw(decimal_str, 10)?;
        Self::try_from_raw(raw, token, lookup)
    }

    /// Build from a human-scaled amount
    ///
    /// # Returns
    /// `ValueError::InvalidScaled` for negative or non-finite input
    pub fn try_from_scaled(
        scaled: f64,
        token: &str,
        lookup: &dyn DecimalsLookup,
    ) -> Result<Self, ValueError> {
        if !scaled.is_finite() || scaled < 0.0 {
            return Err(ValueError::InvalidScaled(scaled));
        }
        let decimals = lookup.decimal_places(token)?;
        let raw = parse_raw(&shift_decimal_point(scaled, decimals), 10)?;
        Ok(Self::new(raw, decimals, token))
    }

    // ==================== Infallible constructors ====================

    /// Falls back to `zero(token)` when the decimals lookup fails
    pub fn from_raw(raw: U256, token: &str, lookup: &dyn DecimalsLookup) -> Self {
        Self::try_from_raw(raw, token, lookup).unwrap_or_else(|e| fallback(e, token, Self::zero(token)))
    }

    pub fn from_raw_hex(hex_str: &str, token: &str, lookup: &dyn DecimalsLookup) -> Self {
        Self::from_raw_hex_or(hex_str, token, lookup, Self::zero(token))
    }

    /// Like `try_from_raw_hex`, returning `default` on failure
    pub fn from_raw_hex_or(
        hex_str: &str,
        token: &str,
        lookup: &dyn DecimalsLookup,
        default: TokenValue,
    ) -> Self {
        Self::try_from_raw_hex(hex_str, token, lookup).unwrap_or_else(|e| fallback(e, token, default))
    }

    pub fn from_raw_decimal(decimal_str: &str, token: &str, lookup: &dyn DecimalsLookup) -> Self {
        Self::from_raw_decimal_or(decimal_str, token, lookup, Self::zero(token))
    }

    /// Like `try_from_raw_decimal`, returning `default` on failure
    pub fn from_raw_decimal_or(
        decimal_str: &str,
        token: &str,
        lookup: &dyn DecimalsLookup,
        default: TokenValue,
    ) -> Self {
        Self::try_from_raw_decimal(decimal_str, token, lookup)
            .unwrap_or_else(|e| fallback(e, token, default))
    }

    pub fn from_scaled(scaled: f64, token: &str, lookup: &dyn DecimalsLookup) -> Self {
        Self::from_scaled_or(scaled, token, lookup, Self::zero(token))
    }

    /// Like `try_from_scaled`, returning `default` on failure
    pub fn from_scaled_or(
        scaled: f64,
        token: &str,
        lookup: &dyn DecimalsLookup,
        default: TokenValue,
    ) -> Self {
        Self::try_from_scaled(scaled, token, lookup).unwrap_or_else(|e| fallback(e, token, default))
    }

    // ==================== Arithmetic ====================

    pub fn checked_add(&self, other: &TokenValue) -> Result<TokenValue, ValueError> {
        self.ensure_same_token(other)?;
        let raw = self
            .raw
            .checked_add(other.raw)
            .ok_or_else(|| ValueError::Overflow(self.token.clone()))?;
        Ok(Self::new(raw, self.decimals, self.token.clone()))
    }

    pub fn checked_sub(&self, other: &TokenValue) -> Result<TokenValue, ValueError> {
        self.ensure_same_token(other)?;
        let raw = self
            .raw
            .checked_sub(other.raw)
            .ok_or_else(|| ValueError::Overflow(self.token.clone()))?;
        Ok(Self::new(raw, self.decimals, self.token.clone()))
    }

    fn ensure_same_token(&self, other: &TokenValue) -> Result<(), ValueError> {
        if self.token != other.token {
            return Err(ValueError::TokenMismatch {
                left: self.token.clone(),
                right: other.token.clone(),
            });
        }
        Ok(())
    }

    /// Raw amount as even-length lowercase hex
    pub fn to_hex(&self) -> String {
        let hex_str = format!("{:x}", self.raw);
        if hex_str.len() % 2 == 1 {
            format!("0{}", hex_str)
        } else {
            hex_str
        }
    }
}

/// Same-token addition. A token mismatch or overflow returns the left operand unchanged.
impl Add for &TokenValue {
    type Output = TokenValue;

    fn add(self, other: Self) -> TokenValue {
        self.checked_add(other).unwrap_or_else(|e| {
            warn!(error = %e, "token value addition ignored");
            self.clone()
        })
    }
}

impl Add for TokenValue {
    type Output = TokenValue;

    fn add(self, other: TokenValue) -> TokenValue {
        &self + &other
    }
}

/// Same-token subtraction. A token mismatch or underflow returns the left operand unchanged.
impl Sub for &TokenValue {
    type Output = TokenValue;

    fn sub(self, other: Self) -> TokenValue {
        self.checked_sub(other).unwrap_or_else(|e| {
            warn!(error = %e, "token value subtraction ignored");
            self.clone()
        })
    }
}

impl Sub for TokenValue {
    type Output = TokenValue;

    fn sub(self, other: TokenValue) -> TokenValue {
        &self - &other
    }
}

fn fallback(e: ValueError, token: &str, default: TokenValue) -> TokenValue {
    error!(token = %token, error = %e, "token value conversion failed, using fallback");
    default
}

/// Parse a raw amount in the given radix. Empty input is zero.
pub fn parse_raw(src: &str, radix: u64) -> Result<U256, ValueError> {
    if src.len() > MAX_RAW_LEN {
        return Err(ValueError::RawTooLong(src.len()));
    }
    if src.is_empty() {
        return Ok(U256::ZERO);
    }
    let valid = match radix {
        16 => src.chars().all(|c| c.is_ascii_hexdigit()),
        _ => src.chars().all(|c| c.is_ascii_digit()),
    };
    if !valid {
        return Err(ValueError::MalformedRaw(src.to_string()));
    }
    U256::from_str_radix(src, radix).map_err(|e| ValueError::MalformedRaw(format!("{src}: {e}")))
}

/// `raw / 10^decimals`, collapsing non-finite results to zero
pub fn scale(raw: U256, decimals: u32) -> f64 {
    let raw_f = raw.to_string().parse::<f64>().unwrap_or(0.0);
    let scaled = raw_f / 10f64.powi(decimals.min(i32::MAX as u32) as i32);
    if scaled.is_finite() {
        scaled
    } else {
        0.0
    }
}

/// Render `scaled * 10^decimals` as an integer decimal string, truncating extra fraction digits
fn shift_decimal_point(scaled: f64, decimals: u32) -> String {
    // shortest round-trip representation, never in exponent form
    let repr = format!("{}", scaled);
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((&repr, ""));
    let decimals = decimals as usize;
    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(int_part);
    if frac_part.len() >= decimals {
        digits.push_str(&frac_part[..decimals]);
    } else {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat('0').take(decimals - frac_part.len()));
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

mod raw_decimal {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(raw: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&raw.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_raw(&s, 10).map_err(serde::de::Error::custom)
    }
}
