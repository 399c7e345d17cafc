//! Contract Function Table
//!
//! Maps contract function names found in call payloads to the fixed set of
//! functions the classifier knows how to interpret. Anything not in the table
//! is treated as an opaque smart contract call.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Contract functions with dedicated classification rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractFunction {
    /// swapTokensFixedInput
    SwapTokensFixedInput,
    /// swapTokensFixedOutput
    SwapTokensFixedOutput,
    /// wrapEgld
    WrapEgld,
    /// unwrapEgld
    UnwrapEgld,
    /// addLiquidity, addLiquidityProxy, ...
    AddLiquidity,
    /// removeLiquidity
    RemoveLiquidity,
    /// enterFarm, enterFarmProxy, ...
    EnterFarm,
    /// exitFarm, exitFarmProxy, ...
    ExitFarm,
    /// claimRewards
    ClaimRewards,
    /// claimRewardsProxy
    ClaimRewardsProxy,
    /// unlockAssets
    UnlockAssets,
    /// compoundRewards, compoundRewardsProxy, ...
    CompoundRewards,
    /// delegate
    Delegate,
    /// stake
    Stake,
    /// unDelegate
    UnDelegate,
    /// unStake
    UnStake,
    /// reDelegateRewards
    ReDelegateRewards,
    /// withdraw
    Withdraw,
    /// unBond
    UnBond,
    /// modifyTotalDelegationCap
    ModifyTotalDelegationCap,
    /// changeServiceFee
    ChangeServiceFee,
}

impl ContractFunction {
    /// Canonical function name as it appears in payloads
    pub fn name(&self) -> &'static str {
        match self {
            ContractFunction::SwapTokensFixedInput => "swapTokensFixedInput",
            ContractFunction::SwapTokensFixedOutput => "swapTokensFixedOutput",
            ContractFunction::WrapEgld => "wrapEgld",
            ContractFunction::UnwrapEgld => "unwrapEgld",
            ContractFunction::AddLiquidity => "addLiquidity",
            ContractFunction::RemoveLiquidity => "removeLiquidity",
            ContractFunction::EnterFarm => "enterFarm",
            ContractFunction::ExitFarm => "exitFarm",
            ContractFunction::ClaimRewards => "claimRewards",
            ContractFunction::ClaimRewardsProxy => "claimRewardsProxy",
            ContractFunction::UnlockAssets => "unlockAssets",
            ContractFunction::CompoundRewards => "compoundRewards",
            ContractFunction::Delegate => "delegate",
            ContractFunction::Stake => "stake",
            ContractFunction::UnDelegate => "unDelegate",
            ContractFunction::UnStake => "unStake",
            ContractFunction::ReDelegateRewards => "reDelegateRewards",
            ContractFunction::Withdraw => "withdraw",
            ContractFunction::UnBond => "unBond",
            ContractFunction::ModifyTotalDelegationCap => "modifyTotalDelegationCap",
            ContractFunction::ChangeServiceFee => "changeServiceFee",
        }
    }

    /// Whether variants sharing this name as a prefix map to the same function
    pub fn is_family(&self) -> bool {
        matches!(
            self,
            ContractFunction::AddLiquidity
                | ContractFunction::EnterFarm
                | ContractFunction::ExitFarm
                | ContractFunction::CompoundRewards
        )
    }
}

const ALL_FUNCTIONS: [ContractFunction; 21] = [
    ContractFunction::SwapTokensFixedInput,
    ContractFunction::SwapTokensFixedOutput,
    ContractFunction::WrapEgld,
    ContractFunction::UnwrapEgld,
    ContractFunction::AddLiquidity,
    ContractFunction::RemoveLiquidity,
    ContractFunction::EnterFarm,
    ContractFunction::ExitFarm,
    ContractFunction::ClaimRewards,
    ContractFunction::ClaimRewardsProxy,
    ContractFunction::UnlockAssets,
    ContractFunction::CompoundRewards,
    ContractFunction::Delegate,
    ContractFunction::Stake,
    ContractFunction::UnDelegate,
    ContractFunction::UnStake,
    ContractFunction::ReDelegateRewards,
    ContractFunction::Withdraw,
    ContractFunction::UnBond,
    ContractFunction::ModifyTotalDelegationCap,
    ContractFunction::ChangeServiceFee,
];

/// Static lookup table for exact names
static FUNCTIONS: LazyLock<HashMap<&'static str, ContractFunction>> =
    LazyLock::new(|| ALL_FUNCTIONS.iter().map(|f| (f.name(), *f)).collect());

/// Resolve a function name, including prefix families such as `exitFarmProxy`
pub fn lookup_function(name: &str) -> Option<ContractFunction> {
    if let Some(function) = FUNCTIONS.get(name) {
        return Some(*function);
    }
    ALL_FUNCTIONS
        .iter()
        .find(|f| f.is_family() && name.starts_with(f.name()))
        .copied()
}
