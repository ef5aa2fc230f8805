//! Balance refresh throttling.
//!
//! A token balance is fetched when forced, or when no refresh for it is
//! running and the last one is older than the refresh interval.

use std::time::Duration;

use alloy::primitives::U256;
use dashmap::DashMap;

use crate::blockchain::client::BlockchainClient;
use crate::blockchain::types::{Blockchain, BlockchainResult, TokenConfig};
use crate::transaction::types::now_millis;

#[derive(Debug, Clone, Copy, Default)]
struct RefreshState {
    in_progress: bool,
    last_refresh: Option<u64>,
}

type BalanceKey = (Blockchain, String, String);

pub struct BalanceThrottle {
    interval: Duration,
    entries: DashMap<BalanceKey, RefreshState>,
}

impl BalanceThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            entries: DashMap::new(),
        }
    }

    /// Claim the refresh slot for a token. `false` means skip this refresh.
    pub fn try_begin(&self, blockchain: Blockchain, address: &str, symbol: &str, force: bool) -> bool {
        let key = (blockchain, address.to_lowercase(), symbol.to_uppercase());
        let mut entry = self.entries.entry(key).or_default();

        let stale = entry
            .last_refresh
            .map_or(true, |at| now_millis().saturating_sub(at) > self.interval.as_millis() as u64);
        if !force && (entry.in_progress || !stale) {
            return false;
        }
        entry.in_progress = true;
        true
    }

    /// Release the slot; only a successful refresh resets the interval.
    pub fn finish(&self, blockchain: Blockchain, address: &str, symbol: &str, success: bool) {
        let key = (blockchain, address.to_lowercase(), symbol.to_uppercase());
        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.in_progress = false;
            if success {
                entry.last_refresh = Some(now_millis());
            }
        }
    }
}

/// Native or token balance through the chain's client.
pub async fn fetch_balance(
    client: &dyn BlockchainClient,
    address: &str,
    token: &TokenConfig,
) -> BlockchainResult<U256> {
    match (&token.contract_address, token.is_native()) {
        (Some(contract), false) => {
            client
                .token_client(token.token_type)?
                .get_balance(contract, address)
                .await
        }
        _ => client.get_balance(address).await,
    }
}
