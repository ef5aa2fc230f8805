//! Transaction orchestration.
//!
//! # Data Flow
//! ```text
//! intent
//!     → ChainRegistry builder (unsigned Transaction, nonce + fees)
//!     → nonce.rs (remote nonce vs. locally known transactions)
//!     → TransactionSigner (HD password prompt or hardware confirmation)
//!     → BlockchainClient::send_transaction
//!     → events.rs (TransactionPublished → store)
//!     → poller.rs / refresh_transaction_status (success | failed | dropped)
//! ```
//!
//! # Responsibilities
//! - Own a transaction from build until it leaves `Created`/`Signed`
//! - Sequence batches strictly, dropping the tail on the first failure
//! - Throttle balance refreshes per token
//! - Turn errors into user-facing message keys (messages.rs)

pub mod balance;
pub mod batch;
pub mod events;
pub mod messages;
pub mod nonce;
pub mod poller;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use futures_util::future::join_all;

use crate::blockchain::client::{BlockchainClient, StatusContext};
use crate::blockchain::registry::ChainRegistry;
use crate::blockchain::types::{Blockchain, TokenConfig};
use crate::config::OrchestratorConfig;
use crate::observability::metrics;
use crate::transaction::funds::{available_funds, FundsCheck};
use crate::transaction::intent::{AccountRef, AccountType, PosTransactionIntent, TransferIntent};
use crate::transaction::status::StatusTracker;
use crate::transaction::types::{PosActionType, Transaction, TransactionError, TransactionStatus};
use crate::wallet::signer::TransactionSigner;

pub use balance::BalanceThrottle;
pub use batch::{BatchSession, ConfirmationPolicy, SendContext};
pub use events::{ChannelSink, EventSink, StoreEvent};
pub use messages::{OrchestratorError, UserMessage};
pub use poller::StatusPoller;
pub use store::{MemoryStore, TokenBalance, WalletState};

/// A token balance fetched by `get_balance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub symbol: String,
    pub balance: U256,
}

/// Build → reconcile → sign → broadcast → confirm, for one wallet session.
pub struct TransactionOrchestrator {
    registry: ChainRegistry,
    signer: Arc<dyn TransactionSigner>,
    state: Arc<dyn WalletState>,
    events: Arc<dyn EventSink>,
    tracker: Arc<StatusTracker>,
    throttle: BalanceThrottle,
    config: OrchestratorConfig,
}

impl TransactionOrchestrator {
    pub fn new(
        registry: ChainRegistry,
        signer: Arc<dyn TransactionSigner>,
        state: Arc<dyn WalletState>,
        events: Arc<dyn EventSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            signer,
            state,
            events,
            tracker: Arc::new(StatusTracker::new()),
            throttle: BalanceThrottle::new(Duration::from_millis(config.balance_refresh_ms)),
            config,
        }
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> &dyn WalletState {
        self.state.as_ref()
    }

    fn send_context(&self, client: Arc<dyn BlockchainClient>) -> SendContext {
        SendContext {
            client,
            signer: self.signer.clone(),
            events: self.events.clone(),
            tracker: self.tracker.clone(),
        }
    }

    pub async fn build_transfer_transaction(&self, intent: &TransferIntent) -> Result<Transaction, OrchestratorError> {
        let builder = self.registry.builder(intent.account.blockchain)?;
        let transaction = builder.build_transfer_transaction(intent).await?;
        tracing::debug!(
            blockchain = %transaction.blockchain,
            token = %transaction.token.symbol,
            nonce = transaction.nonce,
            "Transfer built"
        );
        Ok(transaction)
    }

    pub async fn build_pos_transaction(
        &self,
        intent: &PosTransactionIntent,
        action: PosActionType,
    ) -> Result<Vec<Transaction>, OrchestratorError> {
        let builder = self.registry.builder(intent.account.blockchain)?;
        let transactions = builder.build_pos_transaction(intent, action).await?;
        tracing::debug!(
            blockchain = %intent.account.blockchain,
            action = %action,
            count = transactions.len(),
            "Staking transactions built"
        );
        Ok(transactions)
    }

    /// Nonce the transaction should be signed with, given what this wallet already sent.
    pub async fn reconcile_nonce(&self, transaction: &Transaction) -> Result<u64, OrchestratorError> {
        let client = self.registry.client(transaction.blockchain)?;
        let known = self.state.transactions(transaction.blockchain, &transaction.address);
        let nonce = nonce::reconcile_nonce(
            client.as_ref(),
            &self.tracker,
            transaction,
            &known,
            self.config.improved_nonce,
        )
        .await?;
        Ok(nonce)
    }

    /// Reconcile the nonce, sign, broadcast. Returns the pending transaction.
    ///
    /// Nothing is retried; on error the caller shows `error.user_message()`.
    pub async fn send_transaction(
        &self,
        account: &AccountRef,
        transaction: Transaction,
    ) -> Result<Transaction, OrchestratorError> {
        let client = self.registry.client(transaction.blockchain)?;
        let nonce = self.reconcile_nonce(&transaction).await?;
        let mut transaction = transaction.with_nonce(nonce);

        let result = self
            .send_context(client)
            .sign_and_broadcast(account, &mut transaction)
            .await;
        if account.account_type == AccountType::Hardware {
            self.signer.close().await;
        }

        match result {
            Ok(_) => Ok(transaction),
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::warn!(
                        blockchain = %transaction.blockchain,
                        nonce = transaction.nonce,
                        status = %transaction.status,
                        error = %e,
                        "Send failed"
                    );
                }
                Err(e)
            }
        }
    }

    /// Batch over the transactions of one staking intent.
    pub async fn start_batch(
        &self,
        intent: &PosTransactionIntent,
        action: PosActionType,
    ) -> Result<BatchSession, OrchestratorError> {
        let transactions = self.build_pos_transaction(intent, action).await?;
        let client = self.registry.client(intent.account.blockchain)?;
        Ok(BatchSession::new(
            intent.account.clone(),
            transactions,
            self.send_context(client),
            ConfirmationPolicy::from(&self.config),
        ))
    }

    /// HD accounts: send everything left. Hardware accounts: send the next one
    /// (the caller asks the user before each call).
    pub async fn sign_and_send_batch(
        &self,
        session: &mut BatchSession,
    ) -> Result<Vec<TransactionStatus>, OrchestratorError> {
        match session.account_type() {
            AccountType::Hd => session.run_all().await,
            AccountType::Hardware => {
                session.sign_and_send_next().await?;
                Ok(session.statuses())
            }
        }
    }

    /// Refresh balances: one token, or every active token of the account concurrently.
    ///
    /// Only the tokens actually fetched (not throttled, no error) are returned.
    pub async fn get_balance(
        &self,
        blockchain: Blockchain,
        address: &str,
        token: Option<&str>,
        force: bool,
    ) -> Result<Vec<BalanceUpdate>, OrchestratorError> {
        let client = self.registry.client(blockchain)?;
        let tokens = match token {
            Some(symbol) => vec![self.token_config(blockchain, symbol)?],
            None => self.active_tokens(blockchain, address),
        };

        let refreshes = tokens
            .iter()
            .map(|token| self.refresh_balance(client.as_ref(), address, token, force));
        Ok(join_all(refreshes).await.into_iter().flatten().collect())
    }

    fn token_config(&self, blockchain: Blockchain, symbol: &str) -> Result<TokenConfig, OrchestratorError> {
        self.registry
            .token_config(blockchain, symbol)
            .ok_or_else(|| OrchestratorError::UnknownToken {
                blockchain,
                symbol: symbol.to_string(),
            })
    }

    fn active_tokens(&self, blockchain: Blockchain, address: &str) -> Vec<TokenConfig> {
        let active = self.state.active_tokens(blockchain, address);
        if active.is_empty() {
            return self.registry.tokens_for(blockchain);
        }
        active
            .iter()
            .filter_map(|symbol| self.registry.token_config(blockchain, symbol))
            .collect()
    }

    async fn refresh_balance(
        &self,
        client: &dyn BlockchainClient,
        address: &str,
        token: &TokenConfig,
        force: bool,
    ) -> Option<BalanceUpdate> {
        let blockchain = client.blockchain();
        if !self.throttle.try_begin(blockchain, address, &token.symbol, force) {
            return None;
        }
        self.events.emit(StoreEvent::BalanceRefreshStarted {
            blockchain,
            address: address.to_string(),
            symbol: token.symbol.clone(),
        });

        match balance::fetch_balance(client, address, token).await {
            Ok(balance) => {
                self.throttle.finish(blockchain, address, &token.symbol, true);
                metrics::record_balance_refresh(blockchain, "success");
                self.events.emit(StoreEvent::BalanceUpdated {
                    blockchain,
                    address: address.to_string(),
                    symbol: token.symbol.clone(),
                    balance,
                });
                Some(BalanceUpdate {
                    symbol: token.symbol.clone(),
                    balance,
                })
            }
            Err(e) => {
                self.throttle.finish(blockchain, address, &token.symbol, false);
                metrics::record_balance_refresh(blockchain, "error");
                tracing::warn!(blockchain = %blockchain, token = %token.symbol, error = %e, "Balance refresh failed");
                self.events.emit(StoreEvent::BalanceRefreshFailed {
                    blockchain,
                    address: address.to_string(),
                    symbol: token.symbol.clone(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Re-read a broadcast transaction from the chain and publish what changed.
    ///
    /// A lookup failure past the dropped-blocks threshold marks the stored
    /// transaction dropped. `None` when nothing could be learned.
    pub async fn refresh_transaction_status(
        &self,
        blockchain: Blockchain,
        hash: &str,
    ) -> Result<Option<Transaction>, OrchestratorError> {
        let client = self.registry.client(blockchain)?;
        let cached = self.state.transaction(blockchain, hash);
        let context = StatusContext {
            address: cached.as_ref().map(|t| t.address.clone()),
            broadcasted_on_block: cached.as_ref().and_then(|t| t.broadcasted_on_block),
            cached: cached.clone(),
            current_block_number: None,
        };

        match client.get_transaction(hash, &context).await {
            Ok(mut transaction) => {
                if let Some(cached) = &cached {
                    // Replay the observed status on top of the stored one; backwards moves are ignored.
                    let observed = transaction.status;
                    transaction.status = cached.status;
                    transaction.dates = cached.dates.clone();
                    if observed != cached.status && transaction.advance_status(observed).is_err() {
                        tracing::debug!(tx_hash = %hash, stored = %cached.status, observed = %observed, "Ignoring stale status");
                    }
                }
                self.events.emit(StoreEvent::TransactionUpserted {
                    transaction: transaction.clone(),
                });
                Ok(Some(transaction))
            }
            Err(e) => {
                tracing::debug!(blockchain = %blockchain, tx_hash = %hash, error = %e, "Transaction lookup failed");
                let (Some(mut cached), Some(broadcasted)) =
                    (cached, context.broadcasted_on_block)
                else {
                    return Ok(None);
                };

                let current = client.get_current_block().await?.number;
                if current.saturating_sub(broadcasted) <= client.dropped_tx_blocks_threshold()
                    || cached.advance_status(TransactionStatus::Dropped).is_err()
                {
                    return Ok(None);
                }

                tracing::info!(blockchain = %blockchain, tx_hash = %hash, "Transaction dropped");
                self.events.emit(StoreEvent::StatusChanged {
                    blockchain,
                    hash: hash.to_string(),
                    status: TransactionStatus::Dropped,
                });
                Ok(Some(cached))
            }
        }
    }

    /// Stored terminal status first, otherwise ask the chain. `None` on transient errors.
    pub async fn transaction_status(&self, blockchain: Blockchain, hash: &str) -> Option<TransactionStatus> {
        let cached = self.state.transaction(blockchain, hash);
        if let Some(status) = cached.as_ref().map(|t| t.status).filter(|s| s.is_terminal()) {
            return Some(status);
        }

        let client = self.registry.client(blockchain).ok()?;
        let current = client.get_current_block().await.ok().map(|b| b.number);
        let context = match &cached {
            Some(transaction) => StatusContext::for_transaction(transaction, current),
            None => StatusContext {
                current_block_number: current,
                ..StatusContext::default()
            },
        };
        self.tracker.lookup(client.as_ref(), hash, &context).await
    }

    /// Pre-sign funds check against live balances.
    pub async fn check_available_funds(&self, transaction: &Transaction) -> Result<FundsCheck, OrchestratorError> {
        let client = self.registry.client(transaction.blockchain)?;
        let fees = transaction
            .fee_options
            .as_ref()
            .ok_or_else(|| TransactionError::InvalidIntent("fee options missing".into()))?;

        let native_balance = client.get_balance(&transaction.address).await?;
        let token_balance = if transaction.token.is_native() {
            native_balance
        } else {
            balance::fetch_balance(client.as_ref(), &transaction.address, &transaction.token).await?
        };

        Ok(available_funds(
            transaction.amount,
            &transaction.token,
            token_balance,
            native_balance,
            fees,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::batch::testing::NonceSigner;
    use super::*;
    use std::sync::atomic::Ordering;

    use serde_json::{json, Value};

    use crate::blockchain::transport::testing::{node_error, ScriptedTransport};
    use crate::blockchain::types::TokenType;
    use crate::config::ChainConfig;
    use crate::transaction::types::fixtures;

    const ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const USDT: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

    /// Ethereum node at block 100 with remote nonce 5 and balance 10^18.
    fn transport() -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::new(|method, params| match method {
            "eth_getTransactionCount" => Ok(json!("0x5")),
            "eth_getBlockByNumber" => Ok(json!({"number": "0x64", "hash": "0xbb"})),
            "eth_getBalance" => Ok(json!("0xde0b6b3a7640000")),
            // ERC20 balanceOf → 250
            "eth_call" => Ok(json!(format!("0x{:064x}", 250))),
            "eth_sendRawTransaction" => {
                let raw = params[0].as_str().unwrap_or_default();
                if raw == "0x09" {
                    Err(node_error("nonce too low"))
                } else {
                    Ok(json!(format!("0xhash{}", &raw[2..])))
                }
            }
            "eth_getTransactionReceipt" => Ok(Value::Null),
            "eth_getTransactionByHash" => Err(node_error("not found")),
            _ => Ok(Value::Null),
        }))
    }

    fn orchestrator(signer: Arc<NonceSigner>) -> (TransactionOrchestrator, Arc<MemoryStore>, Arc<ScriptedTransport>) {
        let usdt = TokenConfig::contract(Blockchain::Ethereum, "USDT", 6, TokenType::Erc20, USDT);
        let mut registry = ChainRegistry::new(vec![usdt]);
        let transport = transport();
        registry.register_chain(
            &ChainConfig::new(Blockchain::Ethereum, "1", "http://localhost:8545"),
            transport.clone(),
        );
        let store = Arc::new(MemoryStore::new(None));
        let orchestrator =
            TransactionOrchestrator::new(registry, signer, store.clone(), store.clone(), OrchestratorConfig::default());
        (orchestrator, store, transport)
    }

    fn account() -> AccountRef {
        AccountRef::new(Blockchain::Ethereum, ADDRESS)
    }

    #[tokio::test]
    async fn test_sequential_sends_keep_nonces_monotonic() {
        // The node keeps reporting nonce 5; local pending transactions push the nonce up.
        let (orchestrator, store, _) = orchestrator(Arc::default());
        let mut nonces = Vec::new();
        for _ in 0..3 {
            let tx = fixtures::transfer(Blockchain::Ethereum, ADDRESS, 0);
            let sent = orchestrator.send_transaction(&account(), tx).await.unwrap();
            assert_eq!(sent.status, TransactionStatus::Pending);
            nonces.push(sent.nonce);
        }
        assert_eq!(nonces, vec![5, 6, 7]);
        assert_eq!(store.pending_count(Blockchain::Ethereum, ADDRESS), 3);
    }

    #[tokio::test]
    async fn test_rejection_leaves_signed_and_maps_message() {
        let (orchestrator, store, _) = orchestrator(Arc::default());
        for _ in 0..4 {
            let tx = fixtures::transfer(Blockchain::Ethereum, ADDRESS, 0);
            orchestrator.send_transaction(&account(), tx).await.unwrap();
        }
        // Nonce 9 is rejected by the node.
        let tx = fixtures::transfer(Blockchain::Ethereum, ADDRESS, 0);
        let err = orchestrator.send_transaction(&account(), tx).await.unwrap_err();
        assert_eq!(err.user_message().body, "LoadingModal.NONCE_TOO_LOW");
        assert_eq!(store.transactions(Blockchain::Ethereum, ADDRESS).len(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_prompt_has_no_side_effects() {
        let signer = Arc::new(NonceSigner {
            cancel: true,
            ..NonceSigner::default()
        });
        let (orchestrator, store, transport) = orchestrator(signer);
        let tx = fixtures::transfer(Blockchain::Ethereum, ADDRESS, 0);
        let err = orchestrator.send_transaction(&account(), tx).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.count("eth_sendRawTransaction"), 0);
        assert!(store.transactions(Blockchain::Ethereum, ADDRESS).is_empty());
    }

    #[tokio::test]
    async fn test_hardware_send_closes_session() {
        let signer = Arc::new(NonceSigner::default());
        let (orchestrator, _, _) = orchestrator(signer.clone());
        let mut account = account();
        account.account_type = AccountType::Hardware;

        let tx = fixtures::transfer(Blockchain::Ethereum, ADDRESS, 0);
        orchestrator.send_transaction(&account, tx).await.unwrap();
        assert_eq!(signer.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_balance_refresh_is_throttled() {
        let (orchestrator, store, transport) = orchestrator(Arc::default());

        let mut updates = orchestrator.get_balance(Blockchain::Ethereum, ADDRESS, None, false).await.unwrap();
        updates.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assert_eq!(
            updates,
            vec![
                BalanceUpdate {
                    symbol: "ETH".into(),
                    balance: U256::from(10u64.pow(18)),
                },
                BalanceUpdate {
                    symbol: "USDT".into(),
                    balance: U256::from(250),
                },
            ]
        );
        assert_eq!(store.balance(Blockchain::Ethereum, ADDRESS, "USDT").unwrap().value, U256::from(250));

        // Fresh: skipped unless forced.
        assert!(orchestrator.get_balance(Blockchain::Ethereum, ADDRESS, Some("eth"), false).await.unwrap().is_empty());
        assert_eq!(orchestrator.get_balance(Blockchain::Ethereum, ADDRESS, Some("ETH"), true).await.unwrap().len(), 1);
        assert_eq!(transport.count("eth_getBalance"), 2);
    }

    #[tokio::test]
    async fn test_unknown_token_is_an_error() {
        let (orchestrator, _, _) = orchestrator(Arc::default());
        let err = orchestrator
            .get_balance(Blockchain::Ethereum, ADDRESS, Some("DOGE"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownToken { .. }));
    }

    #[tokio::test]
    async fn test_refresh_marks_old_unknown_transaction_dropped() {
        let (orchestrator, store, _) = orchestrator(Arc::default());
        let tx = fixtures::transfer(Blockchain::Ethereum, ADDRESS, 3);
        store.emit(StoreEvent::TransactionPublished {
            hash: "0xold".into(),
            transaction: tx,
        });
        // Published at block 10; the node is at 100, threshold 50.
        let mut stored = store.transaction(Blockchain::Ethereum, "0xold").unwrap();
        stored.broadcasted_on_block = Some(10);
        store.emit(StoreEvent::TransactionUpserted { transaction: stored });

        let refreshed = orchestrator
            .refresh_transaction_status(Blockchain::Ethereum, "0xold")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.status, TransactionStatus::Dropped);
        assert_eq!(
            store.transaction(Blockchain::Ethereum, "0xold").unwrap().status,
            TransactionStatus::Dropped
        );
        assert_eq!(
            orchestrator.transaction_status(Blockchain::Ethereum, "0xold").await,
            Some(TransactionStatus::Dropped)
        );
    }

    #[tokio::test]
    async fn test_funds_check() {
        let (orchestrator, _, _) = orchestrator(Arc::default());
        let mut tx = fixtures::transfer(Blockchain::Ethereum, ADDRESS, 0);
        tx.amount = U256::from(10u64.pow(18));
        let check = orchestrator.check_available_funds(&tx).await.unwrap();
        assert!(!check.insufficient_funds);
        assert!(check.insufficient_funds_fees);
    }
}
