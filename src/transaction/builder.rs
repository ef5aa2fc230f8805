//! The transaction builder contract and shared build steps.

use alloy::primitives::U256;
use async_trait::async_trait;

use crate::blockchain::client::{BlockchainClient, FeeContext};
use crate::blockchain::types::{Blockchain, ChainId, FeeOptions, SignedPayload, TokenConfig};
use crate::transaction::intent::{AccountRef, ContractCallIntent, PosTransactionIntent, TransferIntent};
use crate::transaction::types::{
    now_millis, AdditionalInfo, PosActionType, Transaction, TransactionDates, TransactionResult,
    TransactionStatus, TransactionType,
};

/// Turns intents into unsigned, fee-populated transactions for one chain.
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    fn blockchain(&self) -> Blockchain;

    async fn build_transfer_transaction(&self, intent: &TransferIntent) -> TransactionResult<Transaction>;

    async fn build_contract_call_transaction(
        &self,
        intent: &ContractCallIntent,
    ) -> TransactionResult<Transaction>;

    /// One or more transactions with nonces reserved sequentially from one live query.
    async fn build_pos_transaction(
        &self,
        intent: &PosTransactionIntent,
        action: PosActionType,
    ) -> TransactionResult<Vec<Transaction>>;

    /// Sign locally with a raw private key.
    ///
    /// The same `(transaction, private_key)` pair always yields the same payload.
    fn sign(&self, transaction: &Transaction, private_key: &str) -> TransactionResult<SignedPayload>;
}

/// Nonces handed out in emission order from a single base.
#[derive(Debug, Clone)]
pub struct NonceSequence {
    next: u64,
}

impl NonceSequence {
    pub fn starting_at(base: u64) -> Self {
        Self { next: base }
    }

    pub fn reserve(&mut self) -> u64 {
        let nonce = self.next;
        self.next += 1;
        nonce
    }

    /// Number of nonces reserved so far from `base`.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Fields every freshly built transaction shares.
pub struct Draft<'a> {
    pub account: &'a AccountRef,
    pub chain_id: &'a ChainId,
    pub tx_type: TransactionType,
    pub to_address: &'a str,
    pub amount: U256,
    pub token: &'a TokenConfig,
}

impl Draft<'_> {
    /// Created transaction without nonce or fees.
    pub fn into_transaction(self, additional_info: AdditionalInfo) -> Transaction {
        Transaction {
            id: None,
            blockchain: self.account.blockchain,
            chain_id: self.chain_id.clone(),
            tx_type: self.tx_type,
            address: self.account.address.clone(),
            public_key: self.account.public_key.clone(),
            to_address: self.to_address.to_string(),
            amount: self.amount,
            token: self.token.clone(),
            fee_options: None,
            nonce: 0,
            status: TransactionStatus::Created,
            broadcasted_on_block: None,
            block_hash: None,
            dates: TransactionDates {
                created: now_millis(),
                ..TransactionDates::default()
            },
            additional_info,
        }
    }
}

/// Caller-provided fees win; otherwise ask the chain (which never fails).
pub async fn resolve_fees(
    client: &dyn BlockchainClient,
    given: Option<&FeeOptions>,
    tx_type: TransactionType,
    context: &FeeContext,
    token: &TokenConfig,
) -> FeeOptions {
    match given {
        Some(fees) => fees.clone(),
        None => client.get_fees(tx_type, context, token.token_type).await,
    }
}
