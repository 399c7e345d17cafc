//! Transaction Classifier
//!
//! Assigns a semantic type and effective value(s) to a transaction, relative
//! to a reference address. Classification is a pure function of the
//! transaction, its smart contract results and the decimals snapshot, so it is
//! safe to run concurrently over many transactions.
//!
//! Decoding failures never escape: the transaction comes back as `Unknown`
//! with its declared value, and the failure is logged.

use tracing::{debug, error};

use crate::decoder::{
    decode_argument, decode_base64_text, decode_payload, is_transfer_text, parse_call, Argument,
    DecodeError, DecodedCall, EsdtPayment,
};
use crate::function::{lookup_function, ContractFunction};
use crate::transaction::{
    ClassifiedTransaction, SmartContractResult, Transaction, TransactionType, METACHAIN_SENDER,
};
use crate::value::{parse_raw, DecimalsLookup, TokenValue, NATIVE_TOKEN};

/// Unit label for service fee values (raw amount in hundredths of a percent)
pub const SERVICE_FEE_UNIT: &str = "%";

/// Decimal places of service fee values
pub const SERVICE_FEE_DECIMALS: u32 = 2;

/// Result of one classification branch, applied onto a copy of the transaction
#[derive(Debug, Clone)]
struct Outcome {
    tx_type: TransactionType,
    function: Option<String>,
    value: TokenValue,
    other_value: TokenValue,
    receiver: Option<String>,
}

impl Outcome {
    fn new(tx_type: TransactionType, value: TokenValue) -> Self {
        Self {
            tx_type,
            function: None,
            value,
            other_value: TokenValue::none(),
            receiver: None,
        }
    }

    fn with_other(mut self, other_value: TokenValue) -> Self {
        self.other_value = other_value;
        self
    }

    fn with_function(mut self, function: &str) -> Self {
        self.function = Some(function.to_string());
        self
    }
}

/// Inputs shared by all branches of one classification
struct Context<'a> {
    tx: &'a Transaction,
    results: &'a [SmartContractResult],
    reference: &'a str,
    decimals: &'a dyn DecimalsLookup,
    declared: TokenValue,
}

impl Context<'_> {
    fn direction(&self) -> TransactionType {
        if self.tx.sender == self.reference {
            TransactionType::Send
        } else {
            TransactionType::Receive
        }
    }

    fn payment_value(&self, payment: &EsdtPayment) -> TokenValue {
        TokenValue::from_raw(payment.amount, &payment.token, self.decimals)
    }

    fn native_value(&self, raw_decimal: &str) -> TokenValue {
        TokenValue::from_raw_decimal(raw_decimal, NATIVE_TOKEN, self.decimals)
    }

    /// ESDTTransfer-shaped result values, preferring results addressed to the reference
    fn esdt_transfer_values(&self) -> Result<Vec<TokenValue>, DecodeError> {
        let to_reference: Vec<SmartContractResult> = self
            .results
            .iter()
            .filter(|r| r.receiver == self.reference)
            .cloned()
            .collect();
        let results = if to_reference.is_empty() {
            self.results
        } else {
            &to_reference[..]
        };
        collect_transfer_values(results, self.decimals, |call| {
            matches!(call, DecodedCall::EsdtTransfer { .. })
        })
    }

    /// Native value of the first payload-less result matching `filter`
    fn plain_result_value(&self, filter: impl Fn(&SmartContractResult) -> bool) -> Option<TokenValue> {
        self.results
            .iter()
            .find(|r| r.has_empty_payload() && filter(r))
            .map(|r| self.native_value(&r.value))
    }
}

/// Classify `tx` from the viewpoint of `reference` (defaults to the sender)
pub fn classify(
    tx: &Transaction,
    results: &[SmartContractResult],
    reference: Option<&str>,
    decimals: &dyn DecimalsLookup,
) -> ClassifiedTransaction {
    let ctx = Context {
        tx,
        results,
        reference: reference.unwrap_or(&tx.sender),
        decimals,
        declared: TokenValue::from_raw_decimal(&tx.value, NATIVE_TOKEN, decimals),
    };

    let mut classified = ClassifiedTransaction {
        transaction: tx.clone(),
        tx_type: ctx.direction(),
        function: None,
        effective_value: ctx.declared.clone(),
        other_value: TokenValue::none(),
    };

    if !has_contract_markers(tx, results) {
        return classified;
    }

    match classify_call(&ctx) {
        Ok(outcome) => {
            debug!(tx_hash = %tx.tx_hash, tx_type = outcome.tx_type.name(), "classified transaction");
            if let Some(receiver) = outcome.receiver {
                classified.transaction.receiver = receiver;
            }
            classified.tx_type = outcome.tx_type;
            classified.function = outcome.function;
            classified.effective_value = outcome.value;
            classified.other_value = outcome.other_value;
        }
        Err(e) => {
            error!(tx_hash = %tx.tx_hash, error = %e, "could not decode transaction payload");
            classified.tx_type = TransactionType::Unknown;
        }
    }

    classified
}

/// Contract call flag, attached results, or a standardized transfer payload
fn has_contract_markers(tx: &Transaction, results: &[SmartContractResult]) -> bool {
    if tx.is_sc_call || !results.is_empty() {
        return true;
    }
    tx.payload()
        .and_then(|data| decode_base64_text(data).ok())
        .is_some_and(|text| is_transfer_text(&text))
}

fn classify_call(ctx: &Context<'_>) -> Result<Outcome, DecodeError> {
    let Some(data) = ctx.tx.payload() else {
        return Ok(classify_plain(ctx));
    };

    let call = decode_payload(data)?;
    let mut outcome = match &call {
        DecodedCall::EsdtTransfer { payment, function, .. } => {
            classify_esdt_transfer(ctx, payment, function.as_deref())?
        }
        DecodedCall::EsdtNftTransfer {
            payment,
            destination,
            function,
            ..
        } => classify_nft_transfer(ctx, payment, destination, function.as_deref())?,
        DecodedCall::MultiEsdtNftTransfer {
            destination,
            payments,
            function,
            ..
        } => classify_multi_transfer(ctx, payments, destination, function.as_deref()),
        DecodedCall::Generic { function, args } => classify_generic(ctx, function, args)?,
    };

    if outcome.function.is_none() {
        outcome.function = Some(call.top_level_name().to_string());
    }
    Ok(outcome)
}

/// Payload-less transaction that still carries contract markers
fn classify_plain(ctx: &Context<'_>) -> Outcome {
    if ctx.tx.sender == METACHAIN_SENDER {
        return Outcome::new(TransactionType::ReceiveValidationReward, ctx.declared.clone());
    }
    Outcome::new(ctx.direction(), ctx.declared.clone())
}

fn classify_esdt_transfer(
    ctx: &Context<'_>,
    payment: &EsdtPayment,
    function: Option<&str>,
) -> Result<Outcome, DecodeError> {
    let value_in = ctx.payment_value(payment);
    let Some(name) = function else {
        return Ok(Outcome::new(ctx.direction(), value_in));
    };

    let outcome = match lookup_function(name) {
        Some(ContractFunction::SwapTokensFixedInput | ContractFunction::SwapTokensFixedOutput) => {
            let (value, bought) = net_swap(&value_in, ctx.esdt_transfer_values()?);
            Outcome::new(TransactionType::Swap, value).with_other(bought)
        }
        Some(ContractFunction::UnwrapEgld) => {
            let unwrapped = TokenValue::from_raw(payment.amount, NATIVE_TOKEN, ctx.decimals);
            Outcome::new(TransactionType::Unwrap, value_in).with_other(unwrapped)
        }
        Some(ContractFunction::RemoveLiquidity) => {
            let mut values = ctx.esdt_transfer_values()?.into_iter();
            let first = values.next().unwrap_or(value_in);
            let second = values.next().unwrap_or_default();
            Outcome::new(TransactionType::ExitLp, first).with_other(second)
        }
        Some(_) | None => Outcome::new(TransactionType::SmartContract, value_in),
    };
    Ok(outcome.with_function(name))
}

/// Sold amount net of same-token refunds, and the first amount bought
fn net_swap(value_in: &TokenValue, outputs: Vec<TokenValue>) -> (TokenValue, TokenValue) {
    let mut sold = value_in.clone();
    let mut bought = TokenValue::none();
    for output in outputs {
        if output.token == value_in.token {
            sold = &sold - &output;
        } else if bought.is_none() {
            bought = output;
        }
    }
    (sold, bought)
}

fn classify_nft_transfer(
    ctx: &Context<'_>,
    payment: &EsdtPayment,
    destination: &str,
    function: Option<&str>,
) -> Result<Outcome, DecodeError> {
    let value_in = ctx.payment_value(payment);
    let receiver = (ctx.reference == ctx.tx.sender).then(|| destination.to_string());

    let mut outcome = match function {
        None => Outcome::new(ctx.direction(), value_in),
        Some(name) => match lookup_function(name) {
            Some(
                ContractFunction::ClaimRewards
                | ContractFunction::ClaimRewardsProxy
                | ContractFunction::UnlockAssets,
            ) => {
                let values = extract_all_transfer_values(ctx.results, ctx.decimals)?;
                let (reward, position) = split_by_collection(&payment.collection, values);
                Outcome::new(TransactionType::Claim, reward.unwrap_or(value_in))
                    .with_other(position.unwrap_or_default())
            }
            Some(ContractFunction::CompoundRewards) => Outcome::new(TransactionType::Compound, value_in),
            Some(ContractFunction::ExitFarm) => {
                let mut values = extract_all_transfer_values(ctx.results, ctx.decimals)?.into_iter();
                let first = values.next().unwrap_or(value_in);
                let second = values.next().unwrap_or_default();
                Outcome::new(TransactionType::ExitFarm, first).with_other(second)
            }
            Some(_) | None => Outcome::new(TransactionType::SmartContract, value_in),
        }
        .with_function(name),
    };
    outcome.receiver = receiver;
    Ok(outcome)
}

/// First value outside `collection` (the reward) and first inside it (the renewed position)
fn split_by_collection(
    collection: &str,
    values: Vec<TokenValue>,
) -> (Option<TokenValue>, Option<TokenValue>) {
    let mut reward = None;
    let mut position = None;
    for value in values {
        let same = crate::value::collection_of(&value.token) == collection;
        if same && position.is_none() {
            position = Some(value);
        } else if !same && reward.is_none() {
            reward = Some(value);
        }
    }
    (reward, position)
}

fn classify_multi_transfer(
    ctx: &Context<'_>,
    payments: &[EsdtPayment],
    destination: &str,
    function: Option<&str>,
) -> Outcome {
    let mut values = payments.iter().map(|p| ctx.payment_value(p));
    let first = values.next().unwrap_or_else(|| ctx.declared.clone());
    let second = values.next().unwrap_or_default();
    let receiver = (ctx.reference == ctx.tx.sender).then(|| destination.to_string());

    let tx_type = match function.map(lookup_function) {
        None => ctx.direction(),
        Some(Some(ContractFunction::EnterFarm)) => TransactionType::EnterFarm,
        Some(Some(ContractFunction::AddLiquidity)) => TransactionType::EnterLp,
        Some(_) => TransactionType::SmartContract,
    };

    let mut outcome = Outcome::new(tx_type, first).with_other(second);
    outcome.function = function.map(str::to_string);
    outcome.receiver = receiver;
    outcome
}

fn classify_generic(
    ctx: &Context<'_>,
    function: &str,
    args: &[String],
) -> Result<Outcome, DecodeError> {
    let reference = ctx.reference;
    let outcome = match lookup_function(function) {
        Some(ContractFunction::Delegate | ContractFunction::Stake) => {
            Outcome::new(TransactionType::Delegate, ctx.declared.clone())
        }
        Some(ContractFunction::UnDelegate | ContractFunction::UnStake) => {
            let raw = parse_raw(argument(args, 0, function)?, 16)?;
            Outcome::new(
                TransactionType::Undelegate,
                TokenValue::from_raw(raw, NATIVE_TOKEN, ctx.decimals),
            )
        }
        Some(ContractFunction::ClaimRewards) => {
            let value = ctx
                .plain_result_value(|r| {
                    r.receiver == reference || r.original_sender.as_deref() == Some(reference)
                })
                .unwrap_or_else(|| ctx.declared.clone());
            Outcome::new(TransactionType::Claim, value)
        }
        Some(ContractFunction::ReDelegateRewards) => {
            let value = ctx
                .plain_result_value(|r| {
                    r.receiver == reference || r.original_sender.as_deref() == Some(reference)
                })
                .unwrap_or_else(|| ctx.declared.clone());
            Outcome::new(TransactionType::Compound, value)
        }
        Some(ContractFunction::Withdraw | ContractFunction::UnBond) => {
            let value = ctx
                .plain_result_value(|r| r.receiver == reference)
                .unwrap_or_else(|| ctx.declared.clone());
            Outcome::new(TransactionType::Withdraw, value)
        }
        Some(ContractFunction::ModifyTotalDelegationCap) => {
            let raw = parse_raw(argument(args, 0, function)?, 16)?;
            Outcome::new(
                TransactionType::ModifyDelegationCap,
                TokenValue::from_raw(raw, NATIVE_TOKEN, ctx.decimals),
            )
        }
        Some(ContractFunction::ChangeServiceFee) => {
            let raw = parse_raw(argument(args, 0, function)?, 16)?;
            Outcome::new(
                TransactionType::ChangeServiceFee,
                TokenValue::new(raw, SERVICE_FEE_DECIMALS, SERVICE_FEE_UNIT),
            )
        }
        Some(ContractFunction::WrapEgld) => {
            let wrapped = ctx.esdt_transfer_values()?.into_iter().next().unwrap_or_default();
            Outcome::new(TransactionType::Wrap, ctx.declared.clone()).with_other(wrapped)
        }
        Some(_) | None if ctx.tx.sender == METACHAIN_SENDER => {
            Outcome::new(TransactionType::ReceiveValidationReward, ctx.declared.clone())
        }
        Some(_) | None => {
            let decoded: Vec<Argument> = args.iter().map(|arg| decode_argument(arg)).collect();
            debug!(tx_hash = %ctx.tx.tx_hash, function = %function, args = ?decoded, "unrecognized contract call");
            Outcome::new(TransactionType::SmartContract, ctx.declared.clone())
        }
    };
    Ok(outcome.with_function(function))
}

fn argument<'a>(args: &'a [String], index: usize, function: &str) -> Result<&'a str, DecodeError> {
    args.get(index).map(String::as_str).ok_or_else(|| DecodeError::MissingField {
        function: static_name(function),
        index: index + 1,
    })
}

fn static_name(function: &str) -> &'static str {
    lookup_function(function).map_or("call", |f| f.name())
}

/// Values moved by every standardized transfer among `results`, in order
pub fn extract_all_transfer_values(
    results: &[SmartContractResult],
    decimals: &dyn DecimalsLookup,
) -> Result<Vec<TokenValue>, DecodeError> {
    collect_transfer_values(results, decimals, |_| true)
}

fn collect_transfer_values(
    results: &[SmartContractResult],
    decimals: &dyn DecimalsLookup,
    keep: impl Fn(&DecodedCall) -> bool,
) -> Result<Vec<TokenValue>, DecodeError> {
    let mut values = Vec::new();
    for result in results {
        let Some(data) = result.data.as_deref().filter(|d| !d.trim().is_empty()) else {
            continue;
        };
        // An undecodable payload cannot be a transfer
        let Ok(text) = decode_base64_text(data) else {
            debug!(scr = %result.hash, "skipping result with undecodable payload");
            continue;
        };
        if !is_transfer_text(&text) {
            continue;
        }
        let call = parse_call(&text)?;
        if !keep(&call) {
            continue;
        }
        values.extend(
            call.payments()
                .into_iter()
                .map(|p| TokenValue::from_raw(p.amount, &p.token, decimals)),
        );
    }
    Ok(values)
}

/// Tokens moved by `tx` and its results, plus the native token
///
/// Payloads that do not decode are skipped; classification logs them.
pub fn referenced_tokens(tx: &Transaction, results: &[SmartContractResult]) -> Vec<String> {
    let mut tokens = vec![NATIVE_TOKEN.to_string()];
    let payloads = tx
        .payload()
        .into_iter()
        .chain(results.iter().filter_map(|r| r.data.as_deref()));
    for data in payloads {
        if let Ok(call) = decode_payload(data) {
            tokens.extend(call.payments().into_iter().map(|p| p.token.clone()));
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::hex_to_address;
    use crate::value::DecimalsTable;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    const ALICE: &str = "erd1alice";
    const BOB: &str = "erd1bob";
    const DEST_HEX: &str = "000000000000000005001e2a1428dd1e3a5146b3960d9e0f4a50369904ee5483";

    fn decimals() -> DecimalsTable {
        DecimalsTable::new()
            .with("USDC-c76f1f", 6)
            .with("WEGLD-bd4d79", 18)
            .with("MEX-455c57", 18)
            .with("LPTOKEN-111111", 18)
            .with("FARM-abc123", 18)
    }

    fn hex_str(text: &str) -> String {
        hex::encode(text)
    }

    fn tx(sender: &str, receiver: &str, value: &str, text: Option<&str>) -> Transaction {
        Transaction {
            tx_hash: "tx-hash".to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            value: value.to_string(),
            data: text.map(|t| STANDARD.encode(t)),
            is_sc_call: text.is_some(),
            ..Default::default()
        }
    }

    fn scr(receiver: &str, value: &str, text: Option<&str>) -> SmartContractResult {
        SmartContractResult {
            hash: "scr-hash".to_string(),
            receiver: receiver.to_string(),
            value: value.to_string(),
            data: text.map(|t| STANDARD.encode(t)),
            original_tx_hash: "tx-hash".to_string(),
            ..Default::default()
        }
    }

    fn esdt(token: &str, amount_hex: &str) -> String {
        format!("ESDTTransfer@{}@{}", hex_str(token), amount_hex)
    }

    // ==================== Plain transfer tests ====================

    #[test]
    fn test_plain_receive_keeps_declared_value() {
        let t = tx(ALICE, BOB, "1000000000000000000", None);
        let c = classify(&t, &[], Some(BOB), &decimals());
        assert_eq!(c.tx_type, TransactionType::Receive);
        assert_eq!(c.effective_value.raw_string(), "1000000000000000000");
        assert_eq!(c.effective_value.token, NATIVE_TOKEN);
        assert_eq!(c.transaction, t);
        assert_eq!(c.function, None);
    }

    #[test]
    fn test_plain_send_defaults_reference_to_sender() {
        let t = tx(ALICE, BOB, "5", None);
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Send);
    }

    #[test]
    fn test_text_note_without_markers_is_plain_transfer() {
        let mut t = tx(ALICE, BOB, "5", Some("thanks for lunch"));
        t.is_sc_call = false;
        let c = classify(&t, &[], Some(ALICE), &decimals());
        assert_eq!(c.tx_type, TransactionType::Send);
        assert_eq!(c.function, None);
    }

    // ==================== ESDTTransfer tests ====================

    #[test]
    fn test_esdt_transfer_send() {
        let t = tx(ALICE, BOB, "0", Some(&esdt("USDC-c76f1f", "03e8")));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Send);
        assert_eq!(c.effective_value.raw_string(), "1000");
        assert_eq!(c.effective_value.ticker(), "USDC");
        assert_eq!(c.function.as_deref(), Some("ESDTTransfer"));
    }

    #[test]
    fn test_esdt_transfer_receive() {
        let t = tx(ALICE, BOB, "0", Some(&esdt("USDC-c76f1f", "03e8")));
        let c = classify(&t, &[], Some(BOB), &decimals());
        assert_eq!(c.tx_type, TransactionType::Receive);
    }

    #[test]
    fn test_swap_fixed_output_takes_bought_value_from_results() {
        let payload = format!(
            "{}@{}@{}@01",
            esdt("WEGLD-bd4d79", "0de0b6b3a7640000"),
            hex_str("swapTokensFixedOutput"),
            hex_str("MEX-455c57"),
        );
        let t = tx(ALICE, "erd1pair", "0", Some(&payload));
        let results = vec![scr("", "0", Some(&esdt("MEX-455c57", "056bc75e2d63100000")))];

        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Swap);
        assert_eq!(c.function.as_deref(), Some("swapTokensFixedOutput"));
        assert_eq!(c.effective_value.raw_string(), "1000000000000000000");
        assert_eq!(c.other_value.token, "MEX-455c57");
        assert_eq!(c.other_value.raw_string(), "100000000000000000000");
    }

    #[test]
    fn test_swap_nets_same_token_refund() {
        let payload = format!(
            "{}@{}",
            esdt("WEGLD-bd4d79", "0de0b6b3a7640000"),
            hex_str("swapTokensFixedOutput"),
        );
        let t = tx(ALICE, "erd1pair", "0", Some(&payload));
        let results = vec![
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "03e8"))),
            scr(ALICE, "0", Some(&esdt("WEGLD-bd4d79", "016345785d8a0000"))),
        ];

        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Swap);
        // 1.0 sent, 0.1 refunded
        assert_eq!(c.effective_value.raw_string(), "900000000000000000");
        assert_eq!(c.other_value.raw_string(), "1000");
    }

    #[test]
    fn test_swap_prefers_results_addressed_to_reference() {
        let payload = format!("{}@{}", esdt("WEGLD-bd4d79", "01"), hex_str("swapTokensFixedInput"));
        let t = tx(ALICE, "erd1pair", "0", Some(&payload));
        let results = vec![
            scr("erd1fees", "0", Some(&esdt("USDC-c76f1f", "05"))),
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "07"))),
        ];

        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.other_value.token, "MEX-455c57");
        assert_eq!(c.other_value.raw_string(), "7");
    }

    #[test]
    fn test_unwrap() {
        let payload = format!("{}@{}", esdt("WEGLD-bd4d79", "0de0b6b3a7640000"), hex_str("unwrapEgld"));
        let t = tx(ALICE, "erd1wrapper", "0", Some(&payload));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Unwrap);
        assert_eq!(c.effective_value.token, "WEGLD-bd4d79");
        assert_eq!(c.other_value.token, NATIVE_TOKEN);
        assert_eq!(c.other_value.raw, c.effective_value.raw);
    }

    #[test]
    fn test_remove_liquidity_takes_two_result_values() {
        let payload = format!("{}@{}@01@01", esdt("LPTOKEN-111111", "64"), hex_str("removeLiquidity"));
        let t = tx(ALICE, "erd1pair", "0", Some(&payload));
        let results = vec![
            scr(ALICE, "0", Some(&esdt("WEGLD-bd4d79", "0a"))),
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "14"))),
        ];

        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::ExitLp);
        assert_eq!(c.effective_value.token, "WEGLD-bd4d79");
        assert_eq!(c.effective_value.raw_string(), "10");
        assert_eq!(c.other_value.token, "MEX-455c57");
        assert_eq!(c.other_value.raw_string(), "20");
    }

    #[test]
    fn test_unknown_embedded_function_is_smart_contract() {
        let payload = format!("{}@{}", esdt("USDC-c76f1f", "01"), hex_str("deposit"));
        let t = tx(ALICE, "erd1vault", "0", Some(&payload));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::SmartContract);
        assert_eq!(c.function.as_deref(), Some("deposit"));
        assert_eq!(c.effective_value.token, "USDC-c76f1f");
    }

    // ==================== ESDTNFTTransfer tests ====================

    fn nft(function: Option<&str>) -> String {
        let base = format!(
            "ESDTNFTTransfer@{}@0a@0de0b6b3a7640000@{}",
            hex_str("FARM-abc123"),
            DEST_HEX
        );
        match function {
            Some(f) => format!("{}@{}", base, hex_str(f)),
            None => base,
        }
    }

    #[test]
    fn test_nft_transfer_rewrites_receiver_for_sender_view() {
        let t = tx(ALICE, ALICE, "0", Some(&nft(None)));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Send);
        assert_eq!(c.transaction.receiver, hex_to_address(DEST_HEX).unwrap());
        assert_eq!(c.effective_value.token, "FARM-abc123-0a");
        assert_eq!(c.effective_value.value, 1.0);
    }

    #[test]
    fn test_nft_transfer_keeps_receiver_for_other_view() {
        let destination = hex_to_address(DEST_HEX).unwrap();
        let t = tx(ALICE, ALICE, "0", Some(&nft(None)));
        let c = classify(&t, &[], Some(&destination), &decimals());
        assert_eq!(c.tx_type, TransactionType::Receive);
        assert_eq!(c.transaction.receiver, ALICE);
    }

    #[test]
    fn test_claim_rewards_splits_reward_and_position() {
        let t = tx(ALICE, ALICE, "0", Some(&nft(Some("claimRewardsProxy"))));
        let results = vec![
            scr(
                ALICE,
                "0",
                Some(&format!("ESDTNFTTransfer@{}@0b@0de0b6b3a7640000@{}", hex_str("FARM-abc123"), DEST_HEX)),
            ),
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "2710"))),
        ];

        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Claim);
        assert_eq!(c.effective_value.token, "MEX-455c57");
        assert_eq!(c.effective_value.raw_string(), "10000");
        assert_eq!(c.other_value.token, "FARM-abc123-0b");
    }

    #[test]
    fn test_compound_uses_own_payload() {
        let t = tx(ALICE, ALICE, "0", Some(&nft(Some("compoundRewardsProxy"))));
        let results = vec![scr(ALICE, "0", Some(&esdt("MEX-455c57", "01")))];
        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Compound);
        assert_eq!(c.effective_value.token, "FARM-abc123-0a");
        assert_eq!(c.function.as_deref(), Some("compoundRewardsProxy"));
    }

    #[test]
    fn test_exit_farm_takes_result_values() {
        let t = tx(ALICE, ALICE, "0", Some(&nft(Some("exitFarm"))));
        let results = vec![
            scr(ALICE, "0", Some(&esdt("LPTOKEN-111111", "05"))),
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "06"))),
        ];
        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::ExitFarm);
        assert_eq!(c.effective_value.token, "LPTOKEN-111111");
        assert_eq!(c.other_value.token, "MEX-455c57");
    }

    #[test]
    fn test_exit_farm_ignores_undecodable_result() {
        let t = tx(ALICE, ALICE, "0", Some(&nft(Some("exitFarm"))));
        let mut noise = scr(ALICE, "0", None);
        noise.data = Some(STANDARD.encode([0x40u8, 0xff, 0xfe]));
        let results = vec![
            noise,
            scr(ALICE, "0", Some(&esdt("LPTOKEN-111111", "05"))),
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "06"))),
        ];
        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::ExitFarm);
        assert_eq!(c.effective_value.raw_string(), "5");
        assert_eq!(c.other_value.token, "MEX-455c57");
    }

    #[test]
    fn test_unlock_assets_is_claim() {
        let t = tx(ALICE, ALICE, "0", Some(&nft(Some("unlockAssets"))));
        let results = vec![scr(ALICE, "0", Some(&esdt("MEX-455c57", "2710")))];
        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Claim);
        assert_eq!(c.function.as_deref(), Some("unlockAssets"));
        assert_eq!(c.effective_value.token, "MEX-455c57");
        assert_eq!(c.effective_value.raw_string(), "10000");
        assert!(c.other_value.is_none());
    }

    #[test]
    fn test_nft_transfer_unknown_function_is_smart_contract() {
        let t = tx(ALICE, ALICE, "0", Some(&nft(Some("deposit"))));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::SmartContract);
        assert_eq!(c.function.as_deref(), Some("deposit"));
        assert_eq!(c.effective_value.token, "FARM-abc123-0a");
        assert_eq!(c.transaction.receiver, hex_to_address(DEST_HEX).unwrap());
    }

    // ==================== MultiESDTNFTTransfer tests ====================

    fn multi(function: &str) -> String {
        format!(
            "MultiESDTNFTTransfer@{}@02@{}@@0a@{}@@14@{}",
            DEST_HEX,
            hex_str("WEGLD-bd4d79"),
            hex_str("MEX-455c57"),
            hex_str(function),
        )
    }

    #[test]
    fn test_add_liquidity_values_from_payload() {
        let t = tx(ALICE, ALICE, "0", Some(&multi("addLiquidity")));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::EnterLp);
        assert_eq!(c.effective_value.raw_string(), "10");
        assert_eq!(c.other_value.raw_string(), "20");
        assert_eq!(c.transaction.receiver, hex_to_address(DEST_HEX).unwrap());
    }

    fn multi_without_function() -> String {
        format!(
            "MultiESDTNFTTransfer@{}@02@{}@@0a@{}@@14",
            DEST_HEX,
            hex_str("WEGLD-bd4d79"),
            hex_str("MEX-455c57"),
        )
    }

    #[test]
    fn test_multi_transfer_without_function_by_viewpoint() {
        let destination = hex_to_address(DEST_HEX).unwrap();
        let t = tx(ALICE, ALICE, "0", Some(&multi_without_function()));

        // (reference, expected type, expected receiver)
        let cases = [
            (None, TransactionType::Send, destination.as_str()),
            (Some(destination.as_str()), TransactionType::Receive, ALICE),
        ];
        for (reference, expected, receiver) in cases {
            let c = classify(&t, &[], reference, &decimals());
            assert_eq!(c.tx_type, expected, "reference {:?}", reference);
            assert_eq!(c.transaction.receiver, receiver);
            assert_eq!(c.function.as_deref(), Some("MultiESDTNFTTransfer"));
            assert_eq!(c.effective_value.token, "WEGLD-bd4d79");
            assert_eq!(c.effective_value.raw_string(), "10");
            assert_eq!(c.other_value.token, "MEX-455c57");
            assert_eq!(c.other_value.raw_string(), "20");
        }
    }

    #[test]
    fn test_enter_farm_family() {
        let t = tx(ALICE, ALICE, "0", Some(&multi("enterFarmProxy")));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::EnterFarm);
        assert_eq!(c.function.as_deref(), Some("enterFarmProxy"));
    }

    // ==================== Generic call tests ====================

    #[test]
    fn test_delegate_uses_declared_value() {
        let t = tx(ALICE, "erd1staking", "1000000000000000000", Some("delegate"));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Delegate);
        assert_eq!(c.effective_value.value, 1.0);
        assert_eq!(c.function.as_deref(), Some("delegate"));
    }

    #[test]
    fn test_undelegate_value_from_argument() {
        let t = tx(ALICE, "erd1staking", "0", Some("unDelegate@0de0b6b3a7640000"));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Undelegate);
        assert_eq!(c.effective_value.raw_string(), "1000000000000000000");
    }

    #[test]
    fn test_undelegate_missing_argument_is_unknown() {
        let t = tx(ALICE, "erd1staking", "7", Some("unDelegate"));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Unknown);
        assert_eq!(c.effective_value.raw_string(), "7");
    }

    #[test]
    fn test_staking_aliases() {
        // (payload, declared value, results, expected type, expected raw)
        let cases = [
            ("stake", "2000", vec![], TransactionType::Delegate, "2000"),
            ("unStake@03e8", "0", vec![], TransactionType::Undelegate, "1000"),
            (
                "unBond",
                "0",
                vec![scr("erd1other", "1", None), scr(ALICE, "500", None)],
                TransactionType::Withdraw,
                "500",
            ),
        ];
        for (payload, value, results, expected, raw) in cases {
            let t = tx(ALICE, "erd1staking", value, Some(payload));
            let c = classify(&t, &results, None, &decimals());
            assert_eq!(c.tx_type, expected, "{}", payload);
            assert_eq!(c.effective_value.token, NATIVE_TOKEN);
            assert_eq!(c.effective_value.raw_string(), raw, "{}", payload);
        }
    }

    #[test]
    fn test_claim_rewards_value_from_plain_result() {
        let t = tx(ALICE, "erd1staking", "0", Some("claimRewards"));
        let results = vec![
            scr(BOB, "99", None),
            scr(ALICE, "0", Some("@6f6b")),
            scr(ALICE, "123456", None),
        ];
        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Claim);
        assert_eq!(c.effective_value.raw_string(), "123456");
    }

    #[test]
    fn test_redelegate_is_compound() {
        let t = tx(ALICE, "erd1staking", "0", Some("reDelegateRewards"));
        let mut result = scr("erd1staking", "42", None);
        result.original_sender = Some(ALICE.to_string());
        let c = classify(&t, &[result], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Compound);
        assert_eq!(c.effective_value.raw_string(), "42");
    }

    #[test]
    fn test_withdraw_only_counts_results_to_reference() {
        let t = tx(ALICE, "erd1staking", "0", Some("withdraw"));
        let mut through = scr("erd1staking", "1", None);
        through.original_sender = Some(ALICE.to_string());
        let results = vec![through, scr(ALICE, "500", None)];
        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Withdraw);
        assert_eq!(c.effective_value.raw_string(), "500");
    }

    #[test]
    fn test_service_fee_and_delegation_cap() {
        let t = tx(ALICE, "erd1staking", "0", Some("changeServiceFee@03e8"));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::ChangeServiceFee);
        assert_eq!(c.effective_value.value, 10.0);

        let t = tx(ALICE, "erd1staking", "0", Some("modifyTotalDelegationCap@0de0b6b3a7640000"));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::ModifyDelegationCap);
        assert_eq!(c.effective_value.value, 1.0);
    }

    #[test]
    fn test_wrap_picks_wrapped_token() {
        let t = tx(ALICE, "erd1wrapper", "1000", Some("wrapEgld"));
        let results = vec![scr(ALICE, "0", Some(&esdt("WEGLD-bd4d79", "03e8")))];
        let c = classify(&t, &results, None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Wrap);
        assert_eq!(c.effective_value.token, NATIVE_TOKEN);
        assert_eq!(c.other_value.token, "WEGLD-bd4d79");
    }

    #[test]
    fn test_metachain_sender_is_validation_reward() {
        let t = tx(METACHAIN_SENDER, ALICE, "777", Some("reward"));
        let c = classify(&t, &[], Some(ALICE), &decimals());
        assert_eq!(c.tx_type, TransactionType::ReceiveValidationReward);
        assert_eq!(c.effective_value.raw_string(), "777");
    }

    #[test]
    fn test_unmatched_generic_is_smart_contract() {
        let t = tx(ALICE, "erd1game", "3", Some("play@01"));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::SmartContract);
        assert_eq!(c.function.as_deref(), Some("play"));
    }

    // ==================== Failure tests ====================

    #[test]
    fn test_invalid_base64_is_unknown_with_declared_value() {
        let mut t = tx(ALICE, BOB, "12", None);
        t.data = Some("%%%".to_string());
        t.is_sc_call = true;
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Unknown);
        assert_eq!(c.effective_value.raw_string(), "12");
        assert_eq!(c.transaction, t);
    }

    #[test]
    fn test_truncated_transfer_is_unknown() {
        let t = tx(ALICE, BOB, "0", Some(&format!("ESDTTransfer@{}", hex_str("USDC-c76f1f"))));
        let c = classify(&t, &[], None, &decimals());
        assert_eq!(c.tx_type, TransactionType::Unknown);
    }

    #[test]
    fn test_empty_payload_with_results_is_plain_direction() {
        let t = tx(ALICE, BOB, "9", None);
        let c = classify(&t, &[scr(BOB, "9", None)], Some(BOB), &decimals());
        assert_eq!(c.tx_type, TransactionType::Receive);
    }

    // ==================== extract_all_transfer_values tests ====================

    #[test]
    fn test_extract_all_transfer_values_flattens_multi() {
        let results = vec![
            scr(ALICE, "5", None),
            scr(ALICE, "0", Some("delegate")),
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "01"))),
            scr(ALICE, "0", Some(&multi("x"))),
        ];
        let values = extract_all_transfer_values(&results, &decimals()).unwrap();
        let tokens: Vec<&str> = values.iter().map(|v| v.token.as_str()).collect();
        assert_eq!(tokens, vec!["MEX-455c57", "WEGLD-bd4d79", "MEX-455c57"]);
    }

    #[test]
    fn test_extract_all_transfer_values_propagates_decode_errors() {
        let results = vec![scr(ALICE, "0", Some("ESDTTransfer@zz@01"))];
        assert!(extract_all_transfer_values(&results, &decimals()).is_err());
    }

    #[test]
    fn test_extract_all_transfer_values_skips_undecodable_payloads() {
        let mut not_utf8 = scr(ALICE, "0", None);
        not_utf8.data = Some(STANDARD.encode([0x40u8, 0xff, 0xfe]));
        let mut not_base64 = scr(ALICE, "0", None);
        not_base64.data = Some("%%%".to_string());
        let results = vec![
            not_utf8,
            not_base64,
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "01"))),
        ];

        let values = extract_all_transfer_values(&results, &decimals()).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].token, "MEX-455c57");
    }

    // ==================== referenced_tokens tests ====================

    #[test]
    fn test_referenced_tokens() {
        let t = tx(ALICE, ALICE, "0", Some(&nft(Some("claimRewards"))));
        let results = vec![
            scr(ALICE, "0", Some(&esdt("MEX-455c57", "01"))),
            scr(ALICE, "1", None),
        ];
        let tokens = referenced_tokens(&t, &results);
        assert_eq!(tokens, vec![NATIVE_TOKEN, "FARM-abc123-0a", "MEX-455c57"]);
    }

    #[test]
    fn test_referenced_tokens_skips_garbage() {
        let mut t = tx(ALICE, BOB, "0", None);
        t.data = Some("%%%".to_string());
        assert_eq!(referenced_tokens(&t, &[]), vec![NATIVE_TOKEN]);
    }
}
