//! The chain adapter contract.
//!
//! # Responsibilities
//! - Query chain state (balance, nonce, latest block)
//! - Broadcast signed payloads and classify rejections
//! - Estimate fees, falling back to static defaults
//! - Reconstruct and classify transactions by hash
//!
//! # Design Decisions
//! - One trait object per chain; callers never branch on the chain
//! - Fee estimation never fails: degraded estimates beat blocked sends
//! - Status lookups return `None` on error so pollers simply retry later

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;

use crate::blockchain::token::TokenClient;
use crate::blockchain::types::{
    Blockchain, BlockInfo, BlockchainResult, BroadcastResult, ChainId, FeeOptions, SignedPayload,
    TokenType,
};
use crate::transaction::types::{Transaction, TransactionStatus, TransactionType};

/// What is being paid for, so adapters can estimate against the real call.
#[derive(Debug, Clone, Default)]
pub struct FeeContext {
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: Option<U256>,
    /// Token or staking contract the transaction targets.
    pub contract_address: Option<String>,
    /// Encoded call data (`0x` hex on Ethereum).
    pub data: Option<String>,
}

/// What the caller already knows about a transaction it is looking up.
#[derive(Debug, Clone, Default)]
pub struct StatusContext {
    /// Sender account (NEAR lookups are keyed by hash and sender).
    pub address: Option<String>,
    /// Transaction as last stored, used to fill fields the chain does not return.
    pub cached: Option<Transaction>,
    pub broadcasted_on_block: Option<u64>,
    pub current_block_number: Option<u64>,
}

impl StatusContext {
    /// Context built from a stored transaction.
    pub fn for_transaction(transaction: &Transaction, current_block_number: Option<u64>) -> Self {
        Self {
            address: Some(transaction.address.clone()),
            cached: Some(transaction.clone()),
            broadcasted_on_block: transaction.broadcasted_on_block,
            current_block_number,
        }
    }
}

/// Uniform adapter over one chain's node API.
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    fn blockchain(&self) -> Blockchain;

    fn chain_id(&self) -> &ChainId;

    /// Blocks after which an unseen broadcast counts as dropped.
    fn dropped_tx_blocks_threshold(&self) -> u64;

    /// Native balance in the smallest unit. Unfunded accounts report zero.
    async fn get_balance(&self, address: &str) -> BlockchainResult<U256>;

    /// Next nonce to use for `address`.
    async fn get_nonce(&self, address: &str, public_key: Option<&str>) -> BlockchainResult<u64>;

    async fn get_current_block(&self) -> BlockchainResult<BlockInfo>;

    async fn send_transaction(&self, payload: &SignedPayload) -> BlockchainResult<BroadcastResult>;

    /// Fee estimate. Never fails; falls back to configured defaults.
    async fn get_fees(
        &self,
        tx_type: TransactionType,
        context: &FeeContext,
        token_type: TokenType,
    ) -> FeeOptions;

    /// Reconstruct a transaction from the chain.
    async fn get_transaction(
        &self,
        hash: &str,
        context: &StatusContext,
    ) -> BlockchainResult<Transaction>;

    /// Classify a broadcast transaction. `None` when the chain could not be asked.
    async fn get_transaction_status(
        &self,
        hash: &str,
        context: &StatusContext,
    ) -> Option<TransactionStatus>;

    /// Token client for a standard, or `UnhandledTokenType`.
    fn token_client(&self, token_type: TokenType) -> BlockchainResult<Arc<dyn TokenClient>>;
}

/// Status of a transaction the chain does not know about.
///
/// Dropped once more than `threshold` blocks have passed since broadcast,
/// pending otherwise (including when either block number is unknown).
pub fn resolve_unmatched(context: &StatusContext, threshold: u64) -> TransactionStatus {
    match (context.broadcasted_on_block, context.current_block_number) {
        (Some(broadcasted), Some(current)) if current.saturating_sub(broadcasted) > threshold => {
            TransactionStatus::Dropped
        }
        _ => TransactionStatus::Pending,
    }
}

/// Fold a raw chain lookup into the `get_transaction_status` contract.
///
/// `Ok(None)` means the chain has no record of the hash.
pub fn finish_status_lookup(
    blockchain: Blockchain,
    hash: &str,
    lookup: BlockchainResult<Option<TransactionStatus>>,
    context: &StatusContext,
    threshold: u64,
) -> Option<TransactionStatus> {
    match lookup {
        Ok(Some(status)) => Some(status),
        Ok(None) => Some(resolve_unmatched(context, threshold)),
        Err(e) => {
            tracing::debug!(blockchain = %blockchain, tx_hash = %hash, error = %e, "Status lookup failed");
            None
        }
    }
}
