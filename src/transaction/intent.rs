//! Caller intents consumed by transaction builders.
//!
//! Intents are never persisted; they live for the duration of one build call.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::blockchain::types::{Blockchain, ChainId, FeeOptions, TokenConfig};
use crate::transaction::types::{TransactionError, TransactionResult, ValidatorRef};

/// Kind of account, forwarded to the signing capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Hd,
    Hardware,
}

/// Originating account of an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub blockchain: Blockchain,
    pub address: String,
    #[serde(default)]
    pub public_key: Option<String>,
    /// Derivation index, forwarded to the signer.
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub account_type: AccountType,
}

impl AccountRef {
    pub fn new(blockchain: Blockchain, address: &str) -> Self {
        Self {
            blockchain,
            address: address.to_string(),
            public_key: None,
            index: 0,
            account_type: AccountType::Hd,
        }
    }

    pub fn with_public_key(mut self, public_key: &str) -> Self {
        self.public_key = Some(public_key.to_string());
        self
    }

    fn validate(&self) -> TransactionResult<()> {
        if self.address.trim().is_empty() {
            return Err(TransactionError::InvalidIntent("account address is empty".into()));
        }
        Ok(())
    }
}

/// Move `amount` of `token` to `to_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub account: AccountRef,
    pub chain_id: ChainId,
    pub to_address: String,
    /// Smallest unit of `token`.
    pub amount: U256,
    pub token: TokenConfig,
    /// Caller-chosen fees; estimated when absent.
    #[serde(default)]
    pub fee_options: Option<FeeOptions>,
}

impl TransferIntent {
    pub fn validate(&self) -> TransactionResult<()> {
        self.account.validate()?;
        if self.to_address.trim().is_empty() {
            return Err(TransactionError::InvalidIntent("destination address is empty".into()));
        }
        if self.token.blockchain != self.account.blockchain {
            return Err(TransactionError::InvalidIntent(format!(
                "token {} belongs to {}, account to {}",
                self.token.symbol, self.token.blockchain, self.account.blockchain
            )));
        }
        if !self.token.is_native() && self.token.contract_address.is_none() {
            return Err(TransactionError::InvalidIntent(format!(
                "token {} has no contract address",
                self.token.symbol
            )));
        }
        Ok(())
    }
}

/// One named, typed call parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallParam {
    pub name: String,
    /// Chain type name: Solidity (`address`, `uint256`) or Scilla (`ByStr20`, `Uint128`).
    pub type_name: String,
    pub value: String,
}

impl CallParam {
    pub fn new(name: &str, type_name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value: value.into(),
        }
    }
}

/// Call `method` on `contract_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallIntent {
    pub account: AccountRef,
    pub chain_id: ChainId,
    pub contract_address: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<CallParam>,
    /// Native amount attached to the call.
    #[serde(default)]
    pub amount: U256,
    pub token: TokenConfig,
    #[serde(default)]
    pub fee_options: Option<FeeOptions>,
}

impl ContractCallIntent {
    pub fn validate(&self) -> TransactionResult<()> {
        self.account.validate()?;
        if self.contract_address.trim().is_empty() {
            return Err(TransactionError::InvalidIntent("contract address is empty".into()));
        }
        if self.method.trim().is_empty() {
            return Err(TransactionError::InvalidIntent("method is empty".into()));
        }
        Ok(())
    }
}

/// Extra staking inputs only some actions need.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PosExtraFields {
    /// Source validator of a redelegation.
    #[serde(default)]
    pub from_validator: Option<ValidatorRef>,
}

/// Staking request expanded into one or more transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosTransactionIntent {
    pub account: AccountRef,
    pub chain_id: ChainId,
    /// Smallest unit of the native token; per validator.
    pub amount: U256,
    #[serde(default)]
    pub fee_options: Option<FeeOptions>,
    pub validators: Vec<ValidatorRef>,
    pub token: TokenConfig,
    #[serde(default)]
    pub extra: PosExtraFields,
}

impl PosTransactionIntent {
    pub fn validate(&self) -> TransactionResult<()> {
        self.account.validate()?;
        if self.validators.is_empty() {
            return Err(TransactionError::InvalidIntent("no validators given".into()));
        }
        if self.validators.iter().any(|v| v.id.trim().is_empty()) {
            return Err(TransactionError::InvalidIntent("validator id is empty".into()));
        }
        Ok(())
    }
}
