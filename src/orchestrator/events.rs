//! Domain events the orchestrator publishes to the wallet store.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::blockchain::types::Blockchain;
use crate::transaction::types::{Transaction, TransactionStatus};

/// Store mutation emitted by the orchestrator. The store is eventually consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A broadcast was accepted by the node.
    TransactionPublished { hash: String, transaction: Transaction },

    /// Insert or replace a transaction record (refreshed from chain).
    TransactionUpserted { transaction: Transaction },

    StatusChanged {
        blockchain: Blockchain,
        hash: String,
        status: TransactionStatus,
    },

    BalanceRefreshStarted {
        blockchain: Blockchain,
        address: String,
        symbol: String,
    },

    BalanceUpdated {
        blockchain: Blockchain,
        address: String,
        symbol: String,
        balance: U256,
    },

    BalanceRefreshFailed {
        blockchain: Blockchain,
        address: String,
        symbol: String,
        error: String,
    },
}

/// Receives store events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StoreEvent);
}

/// Forwards events to an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StoreEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StoreEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}

/// Fan an event out to several sinks, in order.
pub struct FanoutSink(pub Vec<std::sync::Arc<dyn EventSink>>);

impl EventSink for FanoutSink {
    fn emit(&self, event: StoreEvent) {
        for sink in &self.0 {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        for hash in ["0x1", "0x2"] {
            sink.emit(StoreEvent::StatusChanged {
                blockchain: Blockchain::Ethereum,
                hash: hash.into(),
                status: TransactionStatus::Success,
            });
        }

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StoreEvent::StatusChanged { ref hash, .. } if hash == "0x1"));
        assert!(matches!(rx.recv().await.unwrap(), StoreEvent::StatusChanged { ref hash, .. } if hash == "0x2"));
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(StoreEvent::BalanceRefreshStarted {
            blockchain: Blockchain::Near,
            address: "alice.near".into(),
            symbol: "NEAR".into(),
        });
    }
}
