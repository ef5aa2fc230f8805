//! Zilliqa transaction building.
//!
//! Builds unsigned transactions and the `CreateTransaction` body, which
//! `sign` completes with `pubKey` and `signature`.

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::blockchain::client::{BlockchainClient, FeeContext};
use crate::blockchain::types::{Blockchain, SignedPayload, TokenType};
use crate::blockchain::zilliqa::client::ZilliqaClient;
use crate::blockchain::zilliqa::signing;
use crate::blockchain::zilliqa::staking::ZilliqaStaking;
use crate::blockchain::zilliqa::{address, scilla_message, scilla_param};
use crate::transaction::builder::{resolve_fees, Draft, TransactionBuilder};
use crate::transaction::intent::{ContractCallIntent, PosTransactionIntent, TransferIntent};
use crate::transaction::types::{
    AdditionalInfo, ContractCall, ContractCallInfo, PosActionType, Transaction, TransactionError,
    TransactionResult, TransactionType, TransferInfo,
};

/// Message version carried in the low 16 bits of `version`.
const MSG_VERSION: u64 = 1;

pub struct ZilliqaBuilder {
    client: Arc<ZilliqaClient>,
    staking: ZilliqaStaking,
}

impl ZilliqaBuilder {
    pub fn new(client: Arc<ZilliqaClient>) -> Self {
        Self {
            staking: ZilliqaStaking::new(client.clone()),
            client,
        }
    }

    pub fn staking(&self) -> &ZilliqaStaking {
        &self.staking
    }

    /// `CreateTransaction` body without `pubKey` and `signature`.
    pub fn unsigned_body(transaction: &Transaction) -> TransactionResult<Value> {
        let chain_id = transaction.chain_id.as_u64().ok_or_else(|| {
            TransactionError::InvalidIntent(format!("chain id '{}' is not numeric", transaction.chain_id))
        })?;
        let fees = transaction
            .fee_options
            .as_ref()
            .ok_or_else(|| TransactionError::InvalidIntent("fee options missing".into()))?;

        // Token transfers are messages to the token contract.
        let (to, amount) = match (&transaction.additional_info, transaction.token.is_native()) {
            (AdditionalInfo::Transfer(_), _) | (_, true) => (transaction.to_address.as_str(), transaction.amount),
            (_, false) => {
                let contract = transaction.token.contract_address.as_deref().ok_or_else(|| {
                    TransactionError::InvalidIntent(format!("token {} has no contract", transaction.token.symbol))
                })?;
                (contract, U256::ZERO)
            }
        };

        Ok(json!({
            "version": (chain_id << 16) + MSG_VERSION,
            "nonce": transaction.nonce,
            "toAddr": address::to_rpc(to)?,
            "amount": amount.to_string(),
            "gasPrice": fees.gas_price().to_string(),
            "gasLimit": fees.gas_limit().to_string(),
            "code": "",
            "data": transaction.call().map(|c| c.raw.clone()).unwrap_or_default(),
            "priority": false,
        }))
    }

    async fn check_minimum_stake(&self, intent: &PosTransactionIntent) -> TransactionResult<()> {
        match self.staking.min_delegate_stake().await {
            Ok(min) if intent.amount < min => Err(TransactionError::InvalidIntent(format!(
                "delegation of {} is below the minimum stake {}",
                intent.amount, min
            ))),
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Minimum delegate stake unavailable");
                Err(e.into())
            }
        }
    }

    async fn check_eligibility(&self, intent: &PosTransactionIntent, action: PosActionType) -> TransactionResult<()> {
        for validator in &intent.validators {
            let eligible = match action {
                PosActionType::Unstake => {
                    self.staking
                        .can_unstake_from_ssn(&intent.account.address, &validator.id)
                        .await
                }
                PosActionType::ClaimReward => {
                    self.staking
                        .can_withdraw_stake_rewards_from_ssn(&intent.account.address, &validator.id)
                        .await
                }
                _ => true,
            };
            if !eligible {
                return Err(TransactionError::NotEligible {
                    action,
                    validator: validator.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionBuilder for ZilliqaBuilder {
    fn blockchain(&self) -> Blockchain {
        Blockchain::Zilliqa
    }

    async fn build_transfer_transaction(&self, intent: &TransferIntent) -> TransactionResult<Transaction> {
        intent.validate()?;
        let account = &intent.account;
        let nonce = self.client.get_nonce(&account.address, None).await?;

        let (additional_info, fee_context) = if intent.token.is_native() {
            let context = FeeContext {
                from: Some(account.address.clone()),
                to: Some(intent.to_address.clone()),
                amount: Some(intent.amount),
                ..FeeContext::default()
            };
            (AdditionalInfo::Transfer(TransferInfo::default()), context)
        } else {
            let token_client = self.client.token_client(intent.token.token_type)?;
            let call = token_client.encode_transfer(&intent.to_address, intent.amount)?;
            let context = FeeContext {
                from: Some(account.address.clone()),
                to: Some(intent.to_address.clone()),
                amount: Some(intent.amount),
                contract_address: intent.token.contract_address.clone(),
                data: Some(call.raw.clone()),
            };
            let info = AdditionalInfo::ContractCall(ContractCallInfo {
                call,
                actions: Vec::new(),
                outcome: None,
            });
            (info, context)
        };

        let fees = resolve_fees(
            self.client.as_ref(),
            intent.fee_options.as_ref(),
            TransactionType::Transfer,
            &fee_context,
            &intent.token,
        )
        .await;

        Ok(Draft {
            account,
            chain_id: &intent.chain_id,
            tx_type: TransactionType::Transfer,
            to_address: &intent.to_address,
            amount: intent.amount,
            token: &intent.token,
        }
        .into_transaction(additional_info)
        .with_nonce(nonce)
        .with_fee_options(fees))
    }

    async fn build_contract_call_transaction(
        &self,
        intent: &ContractCallIntent,
    ) -> TransactionResult<Transaction> {
        intent.validate()?;
        let account = &intent.account;

        let params = intent
            .params
            .iter()
            .map(|p| scilla_param(&p.name, &p.type_name, p.value.clone()))
            .collect();
        let call = ContractCall {
            method: intent.method.clone(),
            params: intent.params.iter().map(|p| p.value.clone()).collect(),
            raw: scilla_message(&intent.method, params),
        };

        let nonce = self.client.get_nonce(&account.address, None).await?;
        let fee_context = FeeContext {
            from: Some(account.address.clone()),
            amount: Some(intent.amount),
            contract_address: Some(intent.contract_address.clone()),
            data: Some(call.raw.clone()),
            ..FeeContext::default()
        };
        // Contract calls are priced like token transfers.
        let fees = match &intent.fee_options {
            Some(fees) => fees.clone(),
            None => {
                self.client
                    .get_fees(TransactionType::ContractCall, &fee_context, TokenType::Zrc2)
                    .await
            }
        };

        Ok(Draft {
            account,
            chain_id: &intent.chain_id,
            tx_type: TransactionType::ContractCall,
            to_address: &intent.contract_address,
            amount: intent.amount,
            token: &intent.token,
        }
        .into_transaction(AdditionalInfo::ContractCall(ContractCallInfo {
            call,
            actions: Vec::new(),
            outcome: None,
        }))
        .with_nonce(nonce)
        .with_fee_options(fees))
    }

    async fn build_pos_transaction(
        &self,
        intent: &PosTransactionIntent,
        action: PosActionType,
    ) -> TransactionResult<Vec<Transaction>> {
        intent.validate()?;
        match action {
            PosActionType::Delegate => self.check_minimum_stake(intent).await?,
            PosActionType::Unstake | PosActionType::ClaimReward => self.check_eligibility(intent, action).await?,
            PosActionType::Redelegate | PosActionType::Withdraw => {}
        }

        let mut batch = self.staking.begin(intent).await?;
        match action {
            PosActionType::Delegate => {
                for validator in &intent.validators {
                    self.staking.delegate_stake(&mut batch, validator)?;
                }
            }
            PosActionType::Redelegate => {
                let from = intent.extra.from_validator.as_ref().ok_or_else(|| {
                    TransactionError::InvalidIntent("redelegation needs a source validator".into())
                })?;
                for to in &intent.validators {
                    self.staking.redelegate_stake(&mut batch, from, to)?;
                }
            }
            PosActionType::Unstake => {
                for validator in &intent.validators {
                    self.staking.withdraw_stake_amount(&mut batch, validator)?;
                }
            }
            PosActionType::ClaimReward => {
                for validator in &intent.validators {
                    self.staking.withdraw_stake_rewards(&mut batch, validator)?;
                }
            }
            PosActionType::Withdraw => self.staking.complete_withdrawal(&mut batch),
        }

        tracing::debug!(
            account = %intent.account.address,
            action = %action,
            transactions = batch.len(),
            "Staking batch built"
        );
        Ok(batch.finish())
    }

    fn sign(&self, transaction: &Transaction, private_key: &str) -> TransactionResult<SignedPayload> {
        let body = signing::sign_body(&Self::unsigned_body(transaction)?, private_key)?;
        Ok(SignedPayload::Json(body))
    }
}
