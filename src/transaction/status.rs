//! Serialized status lookups.
//!
//! Pollers, batch confirmation and explicit refreshes may all ask about the
//! same hash; lookups for one hash run one at a time.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::blockchain::client::{BlockchainClient, StatusContext};
use crate::transaction::types::TransactionStatus;

#[derive(Default)]
pub struct StatusTracker {
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `get_transaction_status`, with at most one lookup per hash in flight.
    pub async fn lookup(
        &self,
        client: &dyn BlockchainClient,
        hash: &str,
        context: &StatusContext,
    ) -> Option<TransactionStatus> {
        let lock = self.in_flight.entry(hash.to_string()).or_default().clone();

        let status = {
            let _guard = lock.lock().await;
            client.get_transaction_status(hash, context).await
        };

        // Last one out removes the entry (the map holds one reference, we hold one).
        self.in_flight.remove_if(hash, |_, l| Arc::strong_count(l) == 2);
        status
    }

    /// Hashes with a lookup running or queued.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
