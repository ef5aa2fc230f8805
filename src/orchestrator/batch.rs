//! Ordered signing and broadcasting of multi-transaction batches.
//!
//! A batch comes from one `build_pos_transaction` call, nonces already
//! sequenced. Transactions are sent strictly in array order. The first
//! failure marks that transaction `Failed` and every later one `Dropped`;
//! nothing is retried.

use std::sync::Arc;

use uuid::Uuid;

use crate::blockchain::client::{BlockchainClient, StatusContext};
use crate::config::OrchestratorConfig;
use crate::orchestrator::events::{EventSink, StoreEvent};
use crate::orchestrator::messages::OrchestratorError;
use crate::resilience::PollSchedule;
use crate::transaction::intent::{AccountRef, AccountType};
use crate::transaction::status::StatusTracker;
use crate::transaction::types::{Transaction, TransactionStatus};
use crate::wallet::signer::TransactionSigner;

/// How long to wait for each broadcast to settle before sending the next.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub polls: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl From<&OrchestratorConfig> for ConfirmationPolicy {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            polls: config.batch_confirmation_polls,
            base_ms: config.status_poll_base_ms,
            max_ms: config.status_poll_max_ms,
        }
    }
}

/// Collaborators shared by single sends and batches.
#[derive(Clone)]
pub struct SendContext {
    pub client: Arc<dyn BlockchainClient>,
    pub signer: Arc<dyn TransactionSigner>,
    pub events: Arc<dyn EventSink>,
    pub tracker: Arc<StatusTracker>,
}

impl SendContext {
    /// Sign, broadcast and publish. On error `transaction` keeps its last reached status.
    pub async fn sign_and_broadcast(
        &self,
        account: &AccountRef,
        transaction: &mut Transaction,
    ) -> Result<String, OrchestratorError> {
        let payload = self
            .signer
            .sign(transaction.blockchain, account.index, transaction, account.account_type)
            .await?;
        transaction.advance_status(TransactionStatus::Signed)?;

        // Best effort: only used to judge drops later.
        let block = self.client.get_current_block().await.ok().map(|b| b.number);

        let result = self.client.send_transaction(&payload).await?;
        if result.tx_hash.is_empty() {
            return Err(OrchestratorError::MissingHash);
        }

        transaction.id = Some(result.tx_hash.clone());
        transaction.broadcasted_on_block = block;
        transaction.advance_status(TransactionStatus::Pending)?;
        self.events.emit(StoreEvent::TransactionPublished {
            hash: result.tx_hash.clone(),
            transaction: transaction.clone(),
        });
        tracing::info!(
            blockchain = %transaction.blockchain,
            tx_hash = %result.tx_hash,
            nonce = transaction.nonce,
            "Transaction published"
        );
        Ok(result.tx_hash)
    }

    /// Poll until the transaction settles or the polls run out.
    async fn confirm(&self, transaction: &mut Transaction, policy: ConfirmationPolicy) -> TransactionStatus {
        let Some(hash) = transaction.id.clone() else {
            return transaction.status;
        };

        let mut schedule = PollSchedule::new(policy.polls, policy.base_ms, policy.max_ms);
        while let Some(delay) = schedule.next_delay() {
            tokio::time::sleep(delay).await;
            let context = StatusContext::for_transaction(transaction, None);
            match self.tracker.lookup(self.client.as_ref(), &hash, &context).await {
                Some(status) if status.is_terminal() => {
                    if transaction.advance_status(status).is_ok() {
                        self.events.emit(StoreEvent::StatusChanged {
                            blockchain: transaction.blockchain,
                            hash: hash.clone(),
                            status,
                        });
                    }
                    break;
                }
                _ => continue,
            }
        }
        transaction.status
    }
}

/// One batch in progress.
pub struct BatchSession {
    id: Uuid,
    account: AccountRef,
    transactions: Vec<Transaction>,
    next: usize,
    context: SendContext,
    policy: ConfirmationPolicy,
}

impl BatchSession {
    pub fn new(
        account: AccountRef,
        transactions: Vec<Transaction>,
        context: SendContext,
        policy: ConfirmationPolicy,
    ) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(batch_id = %id, size = transactions.len(), "Batch started");
        Self {
            id,
            account,
            transactions,
            next: 0,
            context,
            policy,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account_type(&self) -> AccountType {
        self.account.account_type
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn statuses(&self) -> Vec<TransactionStatus> {
        self.transactions.iter().map(|t| t.status).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.next >= self.transactions.len()
    }

    /// Sign and send the next transaction.
    ///
    /// For hardware accounts each call is one user confirmation and the
    /// signer session is closed afterwards, whatever the outcome. A
    /// cancelled prompt leaves the batch untouched.
    pub async fn sign_and_send_next(&mut self) -> Result<TransactionStatus, OrchestratorError> {
        if self.is_complete() {
            return Err(OrchestratorError::BatchComplete(self.id));
        }
        let index = self.next;

        let result = self.send_at(index).await;
        if self.account.account_type == AccountType::Hardware {
            self.context.signer.close().await;
        }

        match result {
            Ok(TransactionStatus::Success) | Ok(TransactionStatus::Pending) => {
                self.next += 1;
                Ok(self.transactions[index].status)
            }
            Ok(status) => {
                tracing::warn!(batch_id = %self.id, index, status = %status, "Batch transaction did not succeed");
                self.fail_from(index);
                Ok(self.transactions[index].status)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::warn!(batch_id = %self.id, index, error = %e, "Batch transaction failed");
                self.fail_from(index);
                Err(e)
            }
        }
    }

    /// Send everything that is left, stopping at the first failure.
    pub async fn run_all(&mut self) -> Result<Vec<TransactionStatus>, OrchestratorError> {
        while !self.is_complete() {
            self.sign_and_send_next().await?;
        }
        Ok(self.statuses())
    }

    async fn send_at(&mut self, index: usize) -> Result<TransactionStatus, OrchestratorError> {
        let transaction = &mut self.transactions[index];
        self.context.sign_and_broadcast(&self.account, transaction).await?;
        if self.policy.polls == 0 {
            return Ok(transaction.status);
        }
        Ok(self.context.confirm(transaction, self.policy).await)
    }

    fn fail_from(&mut self, index: usize) {
        let failed = &mut self.transactions[index];
        match failed.advance_status(TransactionStatus::Failed) {
            Ok(()) => self.emit_status(index),
            Err(e) => {
                tracing::debug!(batch_id = %self.id, index, status = %failed.status, error = %e, "Failed transaction already settled");
            }
        }
        for i in index + 1..self.transactions.len() {
            if self.transactions[i].advance_status(TransactionStatus::Dropped).is_ok() {
                self.emit_status(i);
            }
        }
        self.next = self.transactions.len();
    }

    fn emit_status(&self, index: usize) {
        let transaction = &self.transactions[index];
        if let Some(hash) = &transaction.id {
            self.context.events.emit(StoreEvent::StatusChanged {
                blockchain: transaction.blockchain,
                hash: hash.clone(),
                status: transaction.status,
            });
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::NonceSigner;
    use super::*;
    use std::sync::atomic::Ordering;

    use serde_json::{json, Value};

    use crate::blockchain::ethereum::EthereumClient;
    use crate::blockchain::transport::testing::{node_error, ScriptedTransport};
    use crate::blockchain::types::Blockchain;
    use crate::config::ChainConfig;
    use crate::orchestrator::events::ChannelSink;
    use crate::transaction::types::fixtures;

    const ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    /// Broadcast of nonce `fail_nonce` is rejected; everything else lands and succeeds.
    fn client(fail_nonce: u64) -> Arc<dyn BlockchainClient> {
        client_reverting(fail_nonce, None)
    }

    /// Like `client`, but the receipt for `revert_hash` reports a reverted execution.
    fn client_reverting(fail_nonce: u64, revert_hash: Option<&'static str>) -> Arc<dyn BlockchainClient> {
        let transport = ScriptedTransport::new(move |method, params| match method {
            "eth_getBlockByNumber" => Ok(json!({"number": "0x10", "hash": "0xbb"})),
            "eth_sendRawTransaction" => {
                let raw = params[0].as_str().unwrap_or_default().to_string();
                if raw == format!("0x{:02x}", fail_nonce) {
                    Err(node_error("replacement transaction underpriced"))
                } else {
                    Ok(json!(format!("0xhash{}", &raw[2..])))
                }
            }
            "eth_getTransactionReceipt" => {
                let status = if revert_hash.is_some_and(|h| params[0] == h) { "0x0" } else { "0x1" };
                Ok(json!({"status": status, "blockNumber": "0x11"}))
            }
            _ => Ok(Value::Null),
        });
        let chain = ChainConfig::new(Blockchain::Ethereum, "1", "http://localhost:8545");
        Arc::new(EthereumClient::new(&chain, Arc::new(transport)))
    }

    fn session(
        fail_nonce: u64,
        account_type: AccountType,
        signer: Arc<NonceSigner>,
    ) -> (BatchSession, tokio::sync::mpsc::UnboundedReceiver<StoreEvent>) {
        session_on(client(fail_nonce), account_type, signer)
    }

    fn session_on(
        client: Arc<dyn BlockchainClient>,
        account_type: AccountType,
        signer: Arc<NonceSigner>,
    ) -> (BatchSession, tokio::sync::mpsc::UnboundedReceiver<StoreEvent>) {
        let (sink, rx) = ChannelSink::new();
        let context = SendContext {
            client,
            signer,
            events: Arc::new(sink),
            tracker: Arc::new(StatusTracker::new()),
        };
        let mut account = AccountRef::new(Blockchain::Ethereum, ADDRESS);
        account.account_type = account_type;
        let transactions = (5..8).map(|n| fixtures::transfer(Blockchain::Ethereum, ADDRESS, n)).collect();
        let policy = ConfirmationPolicy {
            polls: 3,
            base_ms: 0,
            max_ms: 0,
        };
        (BatchSession::new(account, transactions, context, policy), rx)
    }

    #[tokio::test]
    async fn test_all_succeed_in_order() {
        let (mut batch, mut rx) = session(99, AccountType::Hd, Arc::default());
        let statuses = batch.run_all().await.unwrap();
        assert_eq!(statuses, vec![TransactionStatus::Success; 3]);
        assert!(batch.is_complete());

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StoreEvent::TransactionPublished { ref hash, .. } if hash == "0xhash05"));
    }

    #[tokio::test]
    async fn test_failure_drops_the_tail() {
        let (mut batch, _rx) = session(6, AccountType::Hd, Arc::default());
        let err = batch.run_all().await.unwrap_err();
        assert_eq!(err.message_key(), "TR_UNDERPRICED");
        assert_eq!(
            batch.statuses(),
            vec![TransactionStatus::Success, TransactionStatus::Failed, TransactionStatus::Dropped]
        );
        assert!(batch.is_complete());
        assert!(matches!(
            batch.sign_and_send_next().await,
            Err(OrchestratorError::BatchComplete(_))
        ));
    }

    #[tokio::test]
    async fn test_reverted_transaction_stays_failed_once() {
        let (mut batch, mut rx) = session_on(
            client_reverting(99, Some("0xhash05")),
            AccountType::Hd,
            Arc::default(),
        );
        assert_eq!(batch.sign_and_send_next().await.unwrap(), TransactionStatus::Failed);
        assert_eq!(
            batch.statuses(),
            vec![TransactionStatus::Failed, TransactionStatus::Dropped, TransactionStatus::Dropped]
        );
        assert!(batch.is_complete());

        drop(batch);
        let mut failed_events = 0;
        while let Some(event) = rx.recv().await {
            if let StoreEvent::StatusChanged { hash, status, .. } = event {
                assert_eq!(hash, "0xhash05");
                assert_eq!(status, TransactionStatus::Failed);
                failed_events += 1;
            }
        }
        assert_eq!(failed_events, 1);
    }

    #[tokio::test]
    async fn test_hardware_sends_one_per_call_and_closes() {
        let signer = Arc::new(NonceSigner::default());
        let (mut batch, _rx) = session(6, AccountType::Hardware, signer.clone());

        assert_eq!(batch.sign_and_send_next().await.unwrap(), TransactionStatus::Success);
        assert_eq!(signer.closed.load(Ordering::SeqCst), 1);
        assert!(!batch.is_complete());

        assert!(batch.sign_and_send_next().await.is_err());
        assert_eq!(signer.closed.load(Ordering::SeqCst), 2);
        assert_eq!(batch.statuses()[2], TransactionStatus::Dropped);
    }

    #[tokio::test]
    async fn test_cancel_leaves_batch_created() {
        let signer = Arc::new(NonceSigner {
            cancel: true,
            ..NonceSigner::default()
        });
        let (mut batch, _rx) = session(99, AccountType::Hd, signer);
        let err = batch.sign_and_send_next().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(batch.statuses(), vec![TransactionStatus::Created; 3]);
        assert!(!batch.is_complete());
    }
}
