//! Orchestrator errors and the user-facing messages derived from them.
//!
//! Builders and clients only propagate; this is the one place that decides
//! what the user is told.

use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::types::{Blockchain, BlockchainError, RejectionReason};
use crate::transaction::types::TransactionError;
use crate::wallet::signer::SignerError;

/// Fallback message key.
pub const GENERIC_ERROR: &str = "GENERIC_ERROR";

const MESSAGE_NAMESPACE: &str = "LoadingModal";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Blockchain(#[from] BlockchainError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("Broadcast returned no transaction hash")]
    MissingHash,

    #[error("Unknown token {symbol} on {blockchain}")]
    UnknownToken { blockchain: Blockchain, symbol: String },

    #[error("Transaction {0} not found")]
    UnknownTransaction(String),

    #[error("Batch {0} has nothing left to send")]
    BatchComplete(Uuid),
}

/// Translation keys for a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub title: String,
    pub body: String,
}

impl OrchestratorError {
    /// Node rejection reason, however deeply it was wrapped.
    pub fn rejection(&self) -> Option<&RejectionReason> {
        fn from_blockchain(e: &BlockchainError) -> Option<&RejectionReason> {
            match e {
                BlockchainError::Rejected(reason) => Some(reason),
                _ => None,
            }
        }
        fn from_transaction(e: &TransactionError) -> Option<&RejectionReason> {
            match e {
                TransactionError::Blockchain(inner) => from_blockchain(inner),
                _ => None,
            }
        }

        match self {
            OrchestratorError::Blockchain(e) => from_blockchain(e),
            OrchestratorError::Transaction(e) => from_transaction(e),
            OrchestratorError::Signer(SignerError::Blockchain(e)) => from_blockchain(e),
            OrchestratorError::Signer(SignerError::Transaction(e)) => from_transaction(e),
            _ => None,
        }
    }

    /// The user dismissed a prompt; nothing happened.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Signer(SignerError::Cancelled))
    }

    pub fn message_key(&self) -> &'static str {
        if self.is_cancelled() {
            return "CANCELLED";
        }
        if let OrchestratorError::Transaction(TransactionError::NotEligible { .. }) = self {
            return "NOT_ELIGIBLE";
        }
        self.rejection().map_or(GENERIC_ERROR, RejectionReason::message_key)
    }

    pub fn user_message(&self) -> UserMessage {
        UserMessage {
            title: format!("{}.txFailed", MESSAGE_NAMESPACE),
            body: format!("{}.{}", MESSAGE_NAMESPACE, self.message_key()),
        }
    }
}
