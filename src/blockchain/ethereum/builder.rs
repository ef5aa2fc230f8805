//! Ethereum transaction building and signing.
//!
//! # Responsibilities
//! - Native transfers and ERC20 transfers (via the token client's ABI encoding)
//! - Arbitrary contract calls encoded from typed string parameters
//! - Legacy EIP-155 signing; RFC 6979 makes signatures deterministic

use std::sync::Arc;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Bytes, TxKind};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;

use crate::blockchain::client::{BlockchainClient, FeeContext};
use crate::blockchain::ethereum::client::{encode_input, function_from_types};
use crate::blockchain::ethereum::parse_address;
use crate::blockchain::types::{Blockchain, SignedPayload};
use crate::transaction::builder::{resolve_fees, Draft, TransactionBuilder};
use crate::transaction::intent::{ContractCallIntent, PosTransactionIntent, TransferIntent};
use crate::transaction::types::{
    AdditionalInfo, ContractCall, ContractCallInfo, PosActionType, Transaction, TransactionError,
    TransactionResult, TransactionType, TransferInfo,
};

pub struct EthereumBuilder {
    client: Arc<dyn BlockchainClient>,
}

impl EthereumBuilder {
    pub fn new(client: Arc<dyn BlockchainClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransactionBuilder for EthereumBuilder {
    fn blockchain(&self) -> Blockchain {
        Blockchain::Ethereum
    }

    async fn build_transfer_transaction(&self, intent: &TransferIntent) -> TransactionResult<Transaction> {
        intent.validate()?;
        let account = &intent.account;
        let nonce = self
            .client
            .get_nonce(&account.address, account.public_key.as_deref())
            .await?;

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
                contract_address: intent.token.contract_address.clone(),
                data: Some(call.raw.clone()),
                ..FeeContext::default()
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

        let tx = Draft {
            account,
            chain_id: &intent.chain_id,
            tx_type: TransactionType::Transfer,
            to_address: &intent.to_address,
            amount: intent.amount,
            token: &intent.token,
        }
        .into_transaction(additional_info)
        .with_nonce(nonce)
        .with_fee_options(fees);

        tracing::debug!(blockchain = %Blockchain::Ethereum, nonce, token = %intent.token.symbol, "Transfer built");
        Ok(tx)
    }

    async fn build_contract_call_transaction(
        &self,
        intent: &ContractCallIntent,
    ) -> TransactionResult<Transaction> {
        intent.validate()?;
        let account = &intent.account;

        let types: Vec<&str> = intent.params.iter().map(|p| p.type_name.as_str()).collect();
        let values: Vec<String> = intent.params.iter().map(|p| p.value.clone()).collect();
        let function = function_from_types(&intent.method, &types)?;
        let data = encode_input(&function, &values)?;
        let call = ContractCall {
            method: intent.method.clone(),
            params: values,
            raw: alloy::hex::encode_prefixed(data),
        };

        let nonce = self
            .client
            .get_nonce(&account.address, account.public_key.as_deref())
            .await?;

        let fee_context = FeeContext {
            from: Some(account.address.clone()),
            to: Some(intent.contract_address.clone()),
            amount: Some(intent.amount),
            contract_address: Some(intent.contract_address.clone()),
            data: Some(call.raw.clone()),
        };
        let fees = resolve_fees(
            self.client.as_ref(),
            intent.fee_options.as_ref(),
            TransactionType::ContractCall,
            &fee_context,
            &intent.token,
        )
        .await;

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
        _intent: &PosTransactionIntent,
        action: PosActionType,
    ) -> TransactionResult<Vec<Transaction>> {
        Err(TransactionError::UnsupportedAction {
            action,
            blockchain: Blockchain::Ethereum,
        })
    }

    fn sign(&self, transaction: &Transaction, private_key: &str) -> TransactionResult<SignedPayload> {
        let signer: PrivateKeySigner = private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| TransactionError::Signing(format!("Invalid private key format: {}", e)))?;

        let chain_id = transaction.chain_id.as_u64().ok_or_else(|| {
            TransactionError::InvalidIntent(format!("chain id '{}' is not numeric", transaction.chain_id))
        })?;
        let fees = transaction
            .fee_options
            .as_ref()
            .ok_or_else(|| TransactionError::InvalidIntent("fee options missing".into()))?;
        let gas_price = u128::try_from(fees.gas_price())
            .map_err(|_| TransactionError::Encoding("gas price out of range".into()))?;
        let gas_limit = u64::try_from(fees.gas_limit())
            .map_err(|_| TransactionError::Encoding("gas limit out of range".into()))?;

        // Token transfers go to the token contract and carry no value.
        let (to, value, input) = match (&transaction.additional_info, transaction.token.is_native()) {
            (AdditionalInfo::Transfer(_), _) => (parse_address(&transaction.to_address)?, transaction.amount, Bytes::new()),
            (_, native) => {
                let call = transaction
                    .call()
                    .ok_or_else(|| TransactionError::InvalidIntent("contract call missing".into()))?;
                let data = alloy::hex::decode(&call.raw)
                    .map_err(|e| TransactionError::Encoding(format!("call data: {}", e)))?;
                if native {
                    (parse_address(&transaction.to_address)?, transaction.amount, Bytes::from(data))
                } else {
                    let contract = transaction.token.contract_address.as_deref().ok_or_else(|| {
                        TransactionError::InvalidIntent(format!("token {} has no contract", transaction.token.symbol))
                    })?;
                    (parse_address(contract)?, Default::default(), Bytes::from(data))
                }
            }
        };

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce: transaction.nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value,
            input,
        };

        let signature = signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| TransactionError::Signing(e.to_string()))?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));

        Ok(SignedPayload::Hex(alloy::hex::encode_prefixed(envelope.encoded_2718())))
    }
}
