//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the wallet core.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::blockchain::types::{Blockchain, ChainId, TokenConfig, TokenType};

/// Root configuration for the wallet core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WalletConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Transaction orchestration settings.
    pub orchestrator: OrchestratorConfig,

    /// One entry per chain the wallet talks to.
    pub chains: Vec<ChainConfig>,

    /// Static token table (symbol, decimals, standard, contract).
    pub tokens: Vec<TokenConfig>,
}

impl WalletConfig {
    /// Find the chain entry for a blockchain.
    pub fn chain(&self, blockchain: Blockchain) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.blockchain == blockchain)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Transaction orchestration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Scan known outbound transactions for nonce conflicts before signing.
    pub improved_nonce: bool,

    /// Minimum age of a token balance before a non-forced refresh, in milliseconds.
    pub balance_refresh_ms: u64,

    /// Background poller interval in milliseconds.
    pub status_poll_interval_ms: u64,

    /// Base delay between confirmation polls inside a batch, in milliseconds.
    pub status_poll_base_ms: u64,

    /// Maximum delay between confirmation polls inside a batch, in milliseconds.
    pub status_poll_max_ms: u64,

    /// Number of status polls after each batch broadcast (0 = do not wait).
    pub batch_confirmation_polls: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            improved_nonce: true,
            balance_refresh_ms: 36_000,
            status_poll_interval_ms: 10_000,
            status_poll_base_ms: 500,
            status_poll_max_ms: 5_000,
            batch_confirmation_polls: 5,
        }
    }
}

/// Per-chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Which adapter handles this chain.
    pub blockchain: Blockchain,

    /// Network id ("1" for Ethereum mainnet, "mainnet" for NEAR, ...).
    #[serde(default = "default_chain_id")]
    pub chain_id: ChainId,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// RPC request timeout in seconds.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Blocks after which an unseen broadcast transaction counts as dropped.
    #[serde(default = "default_dropped_tx_blocks_threshold")]
    pub dropped_tx_blocks_threshold: u64,

    /// Static fee defaults; the built-in table for the chain is used when absent.
    #[serde(default)]
    pub fees: Option<FeeDefaults>,

    /// Named contract addresses (e.g. `staking`).
    #[serde(default)]
    pub contracts: HashMap<String, String>,

    /// Version of the NEAR staking pool receipt-log format.
    #[serde(default = "default_receipt_log_schema")]
    pub receipt_log_schema: u32,
}

impl ChainConfig {
    /// Minimal configuration for a chain with built-in defaults.
    pub fn new(blockchain: Blockchain, chain_id: impl Into<ChainId>, rpc_url: &str) -> Self {
        Self {
            blockchain,
            chain_id: chain_id.into(),
            rpc_url: rpc_url.to_string(),
            failover_urls: Vec::new(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            dropped_tx_blocks_threshold: default_dropped_tx_blocks_threshold(),
            fees: None,
            contracts: HashMap::new(),
            receipt_log_schema: default_receipt_log_schema(),
        }
    }

    /// Effective fee defaults.
    pub fn fee_defaults(&self) -> FeeDefaults {
        self.fees
            .clone()
            .unwrap_or_else(|| FeeDefaults::builtin(self.blockchain))
    }

    /// Look up a named contract address.
    pub fn contract(&self, name: &str) -> Option<&str> {
        self.contracts.get(name).map(String::as_str)
    }
}

fn default_chain_id() -> ChainId {
    ChainId::from("1")
}

fn default_rpc_timeout_secs() -> u64 {
    10
}

fn default_dropped_tx_blocks_threshold() -> u64 {
    50
}

fn default_receipt_log_schema() -> u32 {
    1
}

/// Static fee values used whenever live estimation fails.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FeeDefaults {
    /// Gas price in the chain's smallest unit.
    pub gas_price: u64,

    /// Gas limit for native transfers.
    pub gas_limit: u64,

    /// Gas limit for token transfers and contract calls.
    pub token_gas_limit: u64,
}

impl FeeDefaults {
    /// Built-in defaults per chain.
    pub fn builtin(blockchain: Blockchain) -> Self {
        match blockchain {
            // 20 gwei
            Blockchain::Ethereum => Self {
                gas_price: 20_000_000_000,
                gas_limit: 21_000,
                token_gas_limit: 200_000,
            },
            // yoctoNEAR per gas unit, 100 Tgas for function calls
            Blockchain::Near => Self {
                gas_price: 100_000_000,
                gas_limit: 2_500_000_000_000,
                token_gas_limit: 100_000_000_000_000,
            },
            // 2000 Li
            Blockchain::Zilliqa => Self {
                gas_price: 2_000_000_000,
                gas_limit: 50,
                token_gas_limit: 10_000,
            },
        }
    }

    /// Gas limit for a token standard.
    pub fn gas_limit_for(&self, token_type: TokenType) -> u64 {
        match token_type {
            TokenType::Native => self.gas_limit,
            TokenType::Erc20 | TokenType::Zrc2 => self.token_gas_limit,
        }
    }
}
