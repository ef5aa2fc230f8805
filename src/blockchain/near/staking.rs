//! NEAR staking pool actions.
//!
//! Every staking pool exposes `deposit`, `stake`, `unstake` and `withdraw`.
//! A delegation is a `deposit` carrying the amount followed by a `stake` of
//! the same amount; both are function calls on the pool account.

use std::sync::Arc;

use alloy::primitives::U256;
use serde_json::json;

use crate::blockchain::client::{BlockchainClient, FeeContext};
use crate::blockchain::near::encoding::DEFAULT_FUNC_CALL_GAS;
use crate::blockchain::types::{BlockInfo, FeeOptions};
use crate::transaction::builder::{resolve_fees, Draft, NonceSequence};
use crate::transaction::intent::PosTransactionIntent;
use crate::transaction::types::{
    AdditionalInfo, ChainAction, ContractCall, StakingAction, StakingInfo, Transaction, TransactionResult,
    TransactionType, ValidatorRef,
};

/// Shared state for one staking build: a single nonce query and block fetch.
pub struct StakingBatch<'a> {
    intent: &'a PosTransactionIntent,
    nonces: NonceSequence,
    block: BlockInfo,
    fees: FeeOptions,
    transactions: Vec<Transaction>,
}

impl StakingBatch<'_> {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn finish(self) -> Vec<Transaction> {
        self.transactions
    }
}

pub struct NearStaking {
    client: Arc<dyn BlockchainClient>,
}

impl NearStaking {
    pub fn new(client: Arc<dyn BlockchainClient>) -> Self {
        Self { client }
    }

    /// Query nonce, block and fees once for a whole batch.
    pub async fn begin<'a>(&self, intent: &'a PosTransactionIntent) -> TransactionResult<StakingBatch<'a>> {
        intent.validate()?;
        let account = &intent.account;
        let base = self
            .client
            .get_nonce(&account.address, account.public_key.as_deref())
            .await?;
        let block = self.client.get_current_block().await?;
        let fee_context = FeeContext {
            from: Some(account.address.clone()),
            amount: Some(intent.amount),
            ..FeeContext::default()
        };
        let fees = resolve_fees(
            self.client.as_ref(),
            intent.fee_options.as_ref(),
            TransactionType::ContractCall,
            &fee_context,
            &intent.token,
        )
        .await;

        Ok(StakingBatch {
            intent,
            nonces: NonceSequence::starting_at(base),
            block,
            fees,
            transactions: Vec::new(),
        })
    }

    /// `deposit` attaches the amount and takes no arguments.
    pub fn deposit(&self, batch: &mut StakingBatch<'_>, validator: &ValidatorRef) {
        let amount = batch.intent.amount;
        push(batch, validator, StakingAction::Deposit, "deposit", json!({}), amount);
    }

    pub fn stake(&self, batch: &mut StakingBatch<'_>, validator: &ValidatorRef) {
        let args = json!({ "amount": batch.intent.amount.to_string() });
        push(batch, validator, StakingAction::Stake, "stake", args, U256::ZERO);
    }

    pub fn unstake(&self, batch: &mut StakingBatch<'_>, validator: &ValidatorRef) {
        let args = json!({ "amount": batch.intent.amount.to_string() });
        push(batch, validator, StakingAction::Unstake, "unstake", args, U256::ZERO);
    }

    pub fn withdraw(&self, batch: &mut StakingBatch<'_>, validator: &ValidatorRef) {
        let args = json!({ "amount": batch.intent.amount.to_string() });
        push(batch, validator, StakingAction::Withdraw, "withdraw", args, U256::ZERO);
    }

    /// Deposit + stake per validator, nonces `n, n+1, ...` in emission order.
    pub async fn deposit_and_stake_sequence(
        &self,
        intent: &PosTransactionIntent,
    ) -> TransactionResult<Vec<Transaction>> {
        let mut batch = self.begin(intent).await?;
        for validator in &intent.validators {
            self.deposit(&mut batch, validator);
            self.stake(&mut batch, validator);
        }
        tracing::debug!(
            account = %intent.account.address,
            validators = intent.validators.len(),
            transactions = batch.len(),
            "Delegation batch built"
        );
        Ok(batch.finish())
    }
}

fn push(
    batch: &mut StakingBatch<'_>,
    validator: &ValidatorRef,
    action: StakingAction,
    method: &str,
    args: serde_json::Value,
    deposit: U256,
) {
    let intent = batch.intent;
    let call = ContractCall {
        method: method.to_string(),
        params: args
            .get("amount")
            .and_then(|a| a.as_str())
            .map(|a| vec![a.to_string()])
            .unwrap_or_default(),
        raw: args.to_string(),
    };
    let info = AdditionalInfo::Staking(StakingInfo {
        action,
        validator: Some(validator.clone()),
        call,
        actions: vec![ChainAction::FunctionCall {
            method: method.to_string(),
            args,
            gas: DEFAULT_FUNC_CALL_GAS,
            deposit,
        }],
    });

    let mut tx = Draft {
        account: &intent.account,
        chain_id: &intent.chain_id,
        tx_type: TransactionType::ContractCall,
        to_address: &validator.id,
        amount: intent.amount,
        token: &intent.token,
    }
    .into_transaction(info)
    .with_nonce(batch.nonces.reserve())
    .with_fee_options(batch.fees.clone());
    tx.block_hash = Some(batch.block.hash.clone());

    batch.transactions.push(tx);
}
