//! The normalized transaction record shared by every chain adapter.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::types::{Blockchain, BlockchainError, ChainId, FeeOptions, TokenConfig};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Transfer,
    ContractCall,
}

/// Lifecycle status.
///
/// Moves forward only: `Created → Signed → Pending → {Success | Failed | Dropped}`.
/// Steps may be skipped (a batch tail goes straight from `Created` to `Dropped`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Created,
    Signed,
    Pending,
    Success,
    Failed,
    Dropped,
}

impl TransactionStatus {
    fn rank(self) -> u8 {
        match self {
            TransactionStatus::Created => 0,
            TransactionStatus::Signed => 1,
            TransactionStatus::Pending => 2,
            TransactionStatus::Success | TransactionStatus::Failed | TransactionStatus::Dropped => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Created => "created",
            TransactionStatus::Signed => "signed",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Dropped => "dropped",
        };
        f.write_str(name)
    }
}

/// Validator a staking action targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

impl ValidatorRef {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            icon: None,
            website: None,
        }
    }
}

/// High-level staking operations a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosActionType {
    Delegate,
    Redelegate,
    Unstake,
    ClaimReward,
    Withdraw,
}

impl fmt::Display for PosActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PosActionType::Delegate => "delegate",
            PosActionType::Redelegate => "redelegate",
            PosActionType::Unstake => "unstake",
            PosActionType::ClaimReward => "claim_reward",
            PosActionType::Withdraw => "withdraw",
        };
        f.write_str(name)
    }
}

/// What a single staking transaction does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingAction {
    Deposit,
    Stake,
    Unstake,
    ClaimReward,
    Withdraw,
}

/// Encoded contract call plus the display metadata derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Human readable method label.
    pub method: String,
    /// Display parameters, in call order.
    pub params: Vec<String>,
    /// Chain-native encoded payload (ABI hex, Scilla JSON, NEAR JSON args).
    pub raw: String,
}

/// One action inside a NEAR-style multi-action transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainAction {
    Transfer,
    FunctionCall {
        method: String,
        args: serde_json::Value,
        gas: u64,
        deposit: U256,
    },
}

/// Amount/validator recovered from receipt logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptOutcome {
    /// Name of the log pattern that matched.
    pub pattern: String,
    pub validator: Option<String>,
    /// `None` when the log matched but the amount could not be trusted.
    pub amount: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferInfo {
    pub actions: Vec<ChainAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallInfo {
    pub call: ContractCall,
    #[serde(default)]
    pub actions: Vec<ChainAction>,
    #[serde(default)]
    pub outcome: Option<ReceiptOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingInfo {
    pub action: StakingAction,
    pub validator: Option<ValidatorRef>,
    pub call: ContractCall,
    #[serde(default)]
    pub actions: Vec<ChainAction>,
}

/// Token swap routed through a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInfo {
    pub call: ContractCall,
    pub from_token: String,
    pub to_token: String,
    /// Expected output in the smallest unit of `to_token`.
    pub to_amount: U256,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Type-specific payload of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdditionalInfo {
    Transfer(TransferInfo),
    ContractCall(ContractCallInfo),
    Staking(StakingInfo),
    Swap(SwapInfo),
}

/// Lifecycle timestamps in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionDates {
    pub created: u64,
    pub signed: Option<u64>,
    pub broadcasted: Option<u64>,
    pub confirmed: Option<u64>,
}

/// A transaction from creation to terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Chain hash, known once broadcast.
    pub id: Option<String>,
    pub blockchain: Blockchain,
    pub chain_id: ChainId,
    pub tx_type: TransactionType,
    pub address: String,
    pub public_key: Option<String>,
    pub to_address: String,
    /// Smallest indivisible unit of `token`.
    pub amount: U256,
    pub token: TokenConfig,
    pub fee_options: Option<FeeOptions>,
    pub nonce: u64,
    pub status: TransactionStatus,
    pub broadcasted_on_block: Option<u64>,
    /// Recent block hash the transaction is bound to (NEAR).
    pub block_hash: Option<String>,
    pub dates: TransactionDates,
    pub additional_info: AdditionalInfo,
}

impl Transaction {
    /// Same transaction with a different nonce.
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Same transaction with different fee options.
    pub fn with_fee_options(mut self, fee_options: FeeOptions) -> Self {
        self.fee_options = Some(fee_options);
        self
    }

    /// Move the status forward, stamping the matching lifecycle date.
    pub fn advance_status(&mut self, next: TransactionStatus) -> TransactionResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(TransactionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = now_millis();
        match next {
            TransactionStatus::Signed => self.dates.signed = Some(now),
            TransactionStatus::Pending => self.dates.broadcasted = Some(now),
            TransactionStatus::Success | TransactionStatus::Failed => self.dates.confirmed = Some(now),
            TransactionStatus::Created | TransactionStatus::Dropped => {}
        }
        self.status = next;
        Ok(())
    }

    /// Encoded call, for contract-call and staking transactions.
    pub fn call(&self) -> Option<&ContractCall> {
        match &self.additional_info {
            AdditionalInfo::ContractCall(info) => Some(&info.call),
            AdditionalInfo::Staking(info) => Some(&info.call),
            AdditionalInfo::Swap(info) => Some(&info.call),
            AdditionalInfo::Transfer(_) => None,
        }
    }

    /// NEAR action list.
    pub fn actions(&self) -> &[ChainAction] {
        match &self.additional_info {
            AdditionalInfo::Transfer(info) => &info.actions,
            AdditionalInfo::ContractCall(info) => &info.actions,
            AdditionalInfo::Staking(info) => &info.actions,
            AdditionalInfo::Swap(_) => &[],
        }
    }

    pub fn staking_action(&self) -> Option<StakingAction> {
        match &self.additional_info {
            AdditionalInfo::Staking(info) => Some(info.action),
            _ => None,
        }
    }
}

/// Errors raised while building, encoding or signing transactions.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),

    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Action {action} not supported on {blockchain}")]
    UnsupportedAction {
        action: PosActionType,
        blockchain: Blockchain,
    },

    /// A staking precondition does not hold (or could not be confirmed).
    #[error("Account not eligible for {action} with validator {validator}")]
    NotEligible {
        action: PosActionType,
        validator: String,
    },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

pub type TransactionResult<T> = Result<T, TransactionError>;
