//! Background refresh of locally pending transactions.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::lifecycle::Shutdown;
use crate::orchestrator::TransactionOrchestrator;
use crate::transaction::types::TransactionStatus;

/// Periodically refreshes every pending transaction until shutdown.
pub struct StatusPoller {
    orchestrator: Arc<TransactionOrchestrator>,
    interval: Duration,
    shutdown: Shutdown,
}

impl StatusPoller {
    pub fn new(orchestrator: Arc<TransactionOrchestrator>, shutdown: Shutdown) -> Self {
        let interval = Duration::from_millis(orchestrator.config().status_poll_interval_ms);
        Self {
            orchestrator,
            interval,
            shutdown,
        }
    }

    /// Run the poll loop.
    pub async fn run(self) {
        let mut shutdown_rx = self.shutdown.subscribe();
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Starting status poller");

        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            self.poll_once().await;

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = sleep(self.interval) => {}
            }
        }

        tracing::info!("Status poller stopped");
    }

    /// One pass over the pending snapshot. Returns how many settled.
    pub async fn poll_once(&self) -> usize {
        let pending = self.orchestrator.state().pending_transactions();
        let mut settled = 0;

        for transaction in pending {
            let Some(hash) = transaction.id.as_deref() else {
                continue;
            };
            match self.orchestrator.refresh_transaction_status(transaction.blockchain, hash).await {
                Ok(Some(refreshed)) if refreshed.status != TransactionStatus::Pending => settled += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(blockchain = %transaction.blockchain, tx_hash = %hash, error = %e, "Status refresh failed");
                }
            }
        }

        if settled > 0 {
            tracing::debug!(settled, "Pending transactions settled");
        }
        settled
    }
}
