//! NEAR transaction building and signing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::blockchain::client::{BlockchainClient, FeeContext};
use crate::blockchain::near::encoding::{sign_transaction, DEFAULT_FUNC_CALL_GAS};
use crate::blockchain::near::staking::NearStaking;
use crate::blockchain::types::{Blockchain, SignedPayload};
use crate::transaction::builder::{resolve_fees, Draft, TransactionBuilder};
use crate::transaction::intent::{ContractCallIntent, PosTransactionIntent, TransferIntent};
use crate::transaction::types::{
    AdditionalInfo, ChainAction, ContractCall, ContractCallInfo, PosActionType, Transaction,
    TransactionError, TransactionResult, TransactionType, TransferInfo,
};

pub struct NearBuilder {
    client: Arc<dyn BlockchainClient>,
    staking: NearStaking,
}

impl NearBuilder {
    pub fn new(client: Arc<dyn BlockchainClient>) -> Self {
        Self {
            staking: NearStaking::new(client.clone()),
            client,
        }
    }

    pub fn staking(&self) -> &NearStaking {
        &self.staking
    }
}

#[async_trait]
impl TransactionBuilder for NearBuilder {
    fn blockchain(&self) -> Blockchain {
        Blockchain::Near
    }

    async fn build_transfer_transaction(&self, intent: &TransferIntent) -> TransactionResult<Transaction> {
        intent.validate()?;
        if !intent.token.is_native() {
            self.client.token_client(intent.token.token_type)?;
        }

        let account = &intent.account;
        let nonce = self
            .client
            .get_nonce(&account.address, account.public_key.as_deref())
            .await?;
        let block = self.client.get_current_block().await?;

        let fee_context = FeeContext {
            from: Some(account.address.clone()),
            to: Some(intent.to_address.clone()),
            amount: Some(intent.amount),
            ..FeeContext::default()
        };
        let fees = resolve_fees(
            self.client.as_ref(),
            intent.fee_options.as_ref(),
            TransactionType::Transfer,
            &fee_context,
            &intent.token,
        )
        .await;

        let mut tx = Draft {
            account,
            chain_id: &intent.chain_id,
            tx_type: TransactionType::Transfer,
            to_address: &intent.to_address,
            amount: intent.amount,
            token: &intent.token,
        }
        .into_transaction(AdditionalInfo::Transfer(TransferInfo {
            actions: vec![ChainAction::Transfer],
        }))
        .with_nonce(nonce)
        .with_fee_options(fees);
        tx.block_hash = Some(block.hash);

        Ok(tx)
    }

    async fn build_contract_call_transaction(
        &self,
        intent: &ContractCallIntent,
    ) -> TransactionResult<Transaction> {
        intent.validate()?;
        let account = &intent.account;

        let args: BTreeMap<&str, Value> = intent
            .params
            .iter()
            .map(|p| (p.name.as_str(), Value::String(p.value.clone())))
            .collect();
        let args = serde_json::to_value(args).map_err(|e| TransactionError::Encoding(e.to_string()))?;
        let call = ContractCall {
            method: intent.method.clone(),
            params: intent.params.iter().map(|p| p.value.clone()).collect(),
            raw: args.to_string(),
        };

        let nonce = self
            .client
            .get_nonce(&account.address, account.public_key.as_deref())
            .await?;
        let block = self.client.get_current_block().await?;
        let fee_context = FeeContext {
            from: Some(account.address.clone()),
            contract_address: Some(intent.contract_address.clone()),
            amount: Some(intent.amount),
            data: Some(call.raw.clone()),
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

        let info = AdditionalInfo::ContractCall(ContractCallInfo {
            actions: vec![ChainAction::FunctionCall {
                method: intent.method.clone(),
                args,
                gas: DEFAULT_FUNC_CALL_GAS,
                deposit: intent.amount,
            }],
            call,
            outcome: None,
        });

        let mut tx = Draft {
            account,
            chain_id: &intent.chain_id,
            tx_type: TransactionType::ContractCall,
            to_address: &intent.contract_address,
            amount: intent.amount,
            token: &intent.token,
        }
        .into_transaction(info)
        .with_nonce(nonce)
        .with_fee_options(fees);
        tx.block_hash = Some(block.hash);

        Ok(tx)
    }

    async fn build_pos_transaction(
        &self,
        intent: &PosTransactionIntent,
        action: PosActionType,
    ) -> TransactionResult<Vec<Transaction>> {
        match action {
            PosActionType::Delegate => self.staking.deposit_and_stake_sequence(intent).await,
            PosActionType::Unstake | PosActionType::Withdraw => {
                let mut batch = self.staking.begin(intent).await?;
                for validator in &intent.validators {
                    if action == PosActionType::Unstake {
                        self.staking.unstake(&mut batch, validator);
                    } else {
                        self.staking.withdraw(&mut batch, validator);
                    }
                }
                Ok(batch.finish())
            }
            PosActionType::Redelegate | PosActionType::ClaimReward => Err(TransactionError::UnsupportedAction {
                action,
                blockchain: Blockchain::Near,
            }),
        }
    }

    fn sign(&self, transaction: &Transaction, private_key: &str) -> TransactionResult<SignedPayload> {
        sign_transaction(transaction, private_key).map(SignedPayload::Base64)
    }
}
