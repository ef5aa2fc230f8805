//! Nonce reconciliation before signing.
//!
//! The remote nonce can lag behind transactions this wallet already
//! broadcast. Two strategies:
//!
//! - basic: `remote + locally pending count`
//! - improved: start at `remote`, and while a known outbound transaction
//!   already holds the candidate nonce, ask the chain about it; a dropped
//!   transaction frees its nonce, anything else (including an unanswered
//!   lookup) bumps the candidate.
//!
//! The improved scan can step past nonces that a lagging node has not yet
//! counted, so it may hand out a nonce higher than strictly needed.

use crate::blockchain::client::{BlockchainClient, StatusContext};
use crate::blockchain::types::BlockchainResult;
use crate::observability::metrics;
use crate::transaction::status::StatusTracker;
use crate::transaction::types::{Transaction, TransactionStatus};

/// Nonce to sign `transaction` with.
///
/// `known` is a snapshot of the account's outbound transactions.
pub async fn reconcile_nonce(
    client: &dyn BlockchainClient,
    tracker: &StatusTracker,
    transaction: &Transaction,
    known: &[Transaction],
    improved: bool,
) -> BlockchainResult<u64> {
    let base = client
        .get_nonce(&transaction.address, transaction.public_key.as_deref())
        .await?;
    let pending = known.iter().filter(|t| t.status == TransactionStatus::Pending).count() as u64;

    if !improved {
        tracing::debug!(blockchain = %client.blockchain(), base, pending, "Nonce reconciled");
        return Ok(base + pending);
    }

    let current_block = client.get_current_block().await?.number;
    let mut nonce = base;
    while let Some(conflict) = find_conflict(known, nonce) {
        let status = match conflict.id.as_deref() {
            Some(hash) => {
                let context = StatusContext::for_transaction(conflict, Some(current_block));
                tracker.lookup(client, hash, &context).await
            }
            // Never broadcast: only a local record holds the nonce.
            None => Some(conflict.status),
        };

        if status == Some(TransactionStatus::Dropped) {
            tracing::debug!(blockchain = %client.blockchain(), nonce, "Reusing nonce of dropped transaction");
            break;
        }

        metrics::record_nonce_conflict(client.blockchain());
        tracing::debug!(
            blockchain = %client.blockchain(),
            nonce,
            status = ?status,
            "Nonce held by known transaction, bumping"
        );
        nonce += 1;
    }

    tracing::debug!(blockchain = %client.blockchain(), base, pending, nonce, "Nonce reconciled (improved)");
    Ok(nonce)
}

fn find_conflict(known: &[Transaction], nonce: u64) -> Option<&Transaction> {
    known.iter().find(|t| t.nonce == nonce)
}
