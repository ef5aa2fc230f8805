//! In-memory wallet state and JSON persistence.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy::primitives::U256;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::blockchain::types::Blockchain;
use crate::orchestrator::events::{EventSink, StoreEvent};
use crate::transaction::types::{now_millis, Transaction, TransactionStatus};

/// Read side of the store the orchestrator consults.
///
/// Every method returns an owned snapshot; later store updates do not affect it.
pub trait WalletState: Send + Sync {
    /// Outbound transactions of one account.
    fn transactions(&self, blockchain: Blockchain, address: &str) -> Vec<Transaction>;

    fn transaction(&self, blockchain: Blockchain, hash: &str) -> Option<Transaction>;

    /// Every locally pending transaction, all accounts.
    fn pending_transactions(&self) -> Vec<Transaction>;

    /// Token symbols whose balances are shown for the account.
    fn active_tokens(&self, blockchain: Blockchain, address: &str) -> Vec<String>;

    fn balance(&self, blockchain: Blockchain, address: &str, symbol: &str) -> Option<TokenBalance>;

    fn pending_count(&self, blockchain: Blockchain, address: &str) -> usize {
        self.transactions(blockchain, address)
            .iter()
            .filter(|t| t.status == TransactionStatus::Pending)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenBalance {
    pub value: U256,
    pub in_progress: bool,
    /// Last successful refresh, milliseconds.
    pub timestamp: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountState {
    blockchain: Blockchain,
    address: String,
    #[serde(default)]
    active_tokens: Vec<String>,
    #[serde(default)]
    balances: BTreeMap<String, TokenBalance>,
    #[serde(default)]
    transactions: Vec<Transaction>,
}

impl AccountState {
    fn new(blockchain: Blockchain, address: &str) -> Self {
        Self {
            blockchain,
            address: address.to_string(),
            active_tokens: Vec::new(),
            balances: BTreeMap::new(),
            transactions: Vec::new(),
        }
    }

    fn upsert(&mut self, transaction: Transaction) {
        let existing = transaction
            .id
            .as_ref()
            .and_then(|id| self.transactions.iter_mut().find(|t| t.id.as_ref() == Some(id)));
        match existing {
            Some(slot) => *slot = transaction,
            None => self.transactions.push(transaction),
        }
    }
}

type AccountKey = (Blockchain, String);

fn key(blockchain: Blockchain, address: &str) -> AccountKey {
    (blockchain, address.to_lowercase())
}

/// Thread-safe store applying [`StoreEvent`]s.
#[derive(Clone, Default)]
pub struct MemoryStore {
    accounts: Arc<DashMap<AccountKey, AccountState>>,
    persistence_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from file if it exists.
    pub fn load_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let accounts: Vec<AccountState> = serde_json::from_reader(reader)?;
            for account in accounts {
                store.accounts.insert(key(account.blockchain, &account.address), account);
            }
            tracing::info!(accounts = store.accounts.len(), path = %path.display(), "Loaded wallet store");
        }
        Ok(store)
    }

    pub fn save_to_file(&self) -> std::io::Result<()> {
        if let Some(path) = &self.persistence_path {
            let writer = BufWriter::new(File::create(path)?);
            let accounts: Vec<AccountState> = self.accounts.iter().map(|r| r.value().clone()).collect();
            serde_json::to_writer(writer, &accounts)?;
            tracing::info!(accounts = accounts.len(), path = %path.display(), "Saved wallet store");
        }
        Ok(())
    }

    /// Register an account with the tokens it shows.
    pub fn add_account(&self, blockchain: Blockchain, address: &str, active_tokens: &[&str]) {
        let mut account = self
            .accounts
            .entry(key(blockchain, address))
            .or_insert_with(|| AccountState::new(blockchain, address));
        for symbol in active_tokens {
            if !account.active_tokens.iter().any(|s| s.eq_ignore_ascii_case(symbol)) {
                account.active_tokens.push(symbol.to_string());
            }
        }
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    fn with_account(&self, blockchain: Blockchain, address: &str, f: impl FnOnce(&mut AccountState)) {
        let mut account = self
            .accounts
            .entry(key(blockchain, address))
            .or_insert_with(|| AccountState::new(blockchain, address));
        f(&mut account);
    }

    fn set_status(&self, blockchain: Blockchain, hash: &str, status: TransactionStatus) {
        for mut account in self.accounts.iter_mut() {
            if account.blockchain != blockchain {
                continue;
            }
            let Some(tx) = account.transactions.iter_mut().find(|t| t.id.as_deref() == Some(hash)) else {
                continue;
            };
            if tx.status == status {
                return;
            }
            if let Err(e) = tx.advance_status(status) {
                tracing::debug!(tx_hash = %hash, error = %e, "Ignoring status update");
            }
            return;
        }
    }

    fn update_balance(&self, blockchain: Blockchain, address: &str, symbol: &str, f: impl FnOnce(&mut TokenBalance)) {
        self.with_account(blockchain, address, |account| {
            f(account.balances.entry(symbol.to_uppercase()).or_default());
        });
    }
}

impl EventSink for MemoryStore {
    fn emit(&self, event: StoreEvent) {
        match event {
            StoreEvent::TransactionPublished { hash, mut transaction } => {
                transaction.id = Some(hash);
                if transaction.status.can_transition_to(TransactionStatus::Pending) {
                    let _ = transaction.advance_status(TransactionStatus::Pending);
                }
                let (blockchain, address) = (transaction.blockchain, transaction.address.clone());
                self.with_account(blockchain, &address, |account| account.upsert(transaction));
            }
            StoreEvent::TransactionUpserted { transaction } => {
                let (blockchain, address) = (transaction.blockchain, transaction.address.clone());
                self.with_account(blockchain, &address, |account| account.upsert(transaction));
            }
            StoreEvent::StatusChanged { blockchain, hash, status } => self.set_status(blockchain, &hash, status),
            StoreEvent::BalanceRefreshStarted { blockchain, address, symbol } => {
                self.update_balance(blockchain, &address, &symbol, |b| b.in_progress = true);
            }
            StoreEvent::BalanceUpdated {
                blockchain,
                address,
                symbol,
                balance,
            } => {
                self.update_balance(blockchain, &address, &symbol, |b| {
                    b.value = balance;
                    b.in_progress = false;
                    b.timestamp = Some(now_millis());
                    b.error = None;
                });
            }
            StoreEvent::BalanceRefreshFailed {
                blockchain,
                address,
                symbol,
                error,
            } => {
                self.update_balance(blockchain, &address, &symbol, |b| {
                    b.in_progress = false;
                    b.error = Some(error);
                });
            }
        }
    }
}

impl WalletState for MemoryStore {
    fn transactions(&self, blockchain: Blockchain, address: &str) -> Vec<Transaction> {
        self.accounts
            .get(&key(blockchain, address))
            .map(|a| a.transactions.clone())
            .unwrap_or_default()
    }

    fn transaction(&self, blockchain: Blockchain, hash: &str) -> Option<Transaction> {
        self.accounts
            .iter()
            .filter(|a| a.blockchain == blockchain)
            .find_map(|a| a.transactions.iter().find(|t| t.id.as_deref() == Some(hash)).cloned())
    }

    fn pending_transactions(&self) -> Vec<Transaction> {
        self.accounts
            .iter()
            .flat_map(|a| {
                a.transactions
                    .iter()
                    .filter(|t| t.status == TransactionStatus::Pending)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn active_tokens(&self, blockchain: Blockchain, address: &str) -> Vec<String> {
        self.accounts
            .get(&key(blockchain, address))
            .map(|a| a.active_tokens.clone())
            .unwrap_or_default()
    }

    fn balance(&self, blockchain: Blockchain, address: &str, symbol: &str) -> Option<TokenBalance> {
        self.accounts
            .get(&key(blockchain, address))
            .and_then(|a| a.balances.get(&symbol.to_uppercase()).cloned())
    }
}
