//! Chain adapter registry.
//!
//! # Responsibilities
//! - Build one client + builder pair per configured chain at startup
//! - Resolve adapters by `Blockchain` without branching at call sites
//! - Answer static token lookups (`token_config(chain, symbol)`)

use std::collections::HashMap;
use std::sync::Arc;

use crate::blockchain::client::BlockchainClient;
use crate::blockchain::ethereum::{EthereumBuilder, EthereumClient};
use crate::blockchain::near::{NearBuilder, NearClient};
use crate::blockchain::transport::{HttpTransport, JsonRpcTransport};
use crate::blockchain::types::{Blockchain, BlockchainError, BlockchainResult, TokenConfig};
use crate::blockchain::zilliqa::{ZilliqaBuilder, ZilliqaClient};
use crate::config::{ChainConfig, WalletConfig};
use crate::transaction::builder::TransactionBuilder;

/// Client and builder registered for one chain.
#[derive(Clone)]
struct ChainAdapters {
    client: Arc<dyn BlockchainClient>,
    builder: Arc<dyn TransactionBuilder>,
}

/// Maps each blockchain to its adapters and holds the static token table.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<Blockchain, ChainAdapters>,
    tokens: Vec<TokenConfig>,
}

impl ChainRegistry {
    /// Empty registry carrying only a token table.
    pub fn new(tokens: Vec<TokenConfig>) -> Self {
        Self {
            chains: HashMap::new(),
            tokens,
        }
    }

    /// Create adapters for every configured chain, talking HTTP JSON-RPC.
    pub fn from_config(config: &WalletConfig) -> BlockchainResult<Self> {
        let mut registry = Self::new(config.tokens.clone());
        for chain in &config.chains {
            let transport = Arc::new(HttpTransport::new(chain)?);
            registry.register_chain(chain, transport);
        }

        tracing::info!(chains = registry.chains.len(), tokens = registry.tokens.len(), "Chain registry built");
        Ok(registry)
    }

    /// Build the adapters for one chain over a given transport.
    pub fn register_chain(&mut self, chain: &ChainConfig, transport: Arc<dyn JsonRpcTransport>) {
        let client: Arc<dyn BlockchainClient>;
        let builder: Arc<dyn TransactionBuilder>;
        match chain.blockchain {
            Blockchain::Ethereum => {
                client = Arc::new(EthereumClient::new(chain, transport));
                builder = Arc::new(EthereumBuilder::new(client.clone()));
            }
            Blockchain::Near => {
                client = Arc::new(NearClient::new(chain, transport));
                builder = Arc::new(NearBuilder::new(client.clone()));
            }
            Blockchain::Zilliqa => {
                // The Zilliqa builder needs contract state reads beyond the trait.
                let zilliqa = Arc::new(ZilliqaClient::new(chain, transport));
                builder = Arc::new(ZilliqaBuilder::new(zilliqa.clone()));
                client = zilliqa;
            }
        }
        self.register(client, builder);
    }

    /// Register externally built adapters; replaces any previous pair.
    pub fn register(&mut self, client: Arc<dyn BlockchainClient>, builder: Arc<dyn TransactionBuilder>) {
        let blockchain = client.blockchain();
        if self.chains.insert(blockchain, ChainAdapters { client, builder }).is_some() {
            tracing::warn!(blockchain = %blockchain, "Replacing registered chain adapters");
        }
    }

    pub fn client(&self, blockchain: Blockchain) -> BlockchainResult<Arc<dyn BlockchainClient>> {
        self.chains
            .get(&blockchain)
            .map(|a| a.client.clone())
            .ok_or_else(|| BlockchainError::NotAvailable(blockchain.to_string()))
    }

    pub fn builder(&self, blockchain: Blockchain) -> BlockchainResult<Arc<dyn TransactionBuilder>> {
        self.chains
            .get(&blockchain)
            .map(|a| a.builder.clone())
            .ok_or_else(|| BlockchainError::NotAvailable(blockchain.to_string()))
    }

    pub fn blockchains(&self) -> Vec<Blockchain> {
        let mut chains: Vec<Blockchain> = self.chains.keys().copied().collect();
        chains.sort();
        chains
    }

    /// Token by symbol (case-insensitive); the native coin is always known.
    pub fn token_config(&self, blockchain: Blockchain, symbol: &str) -> Option<TokenConfig> {
        self.tokens
            .iter()
            .find(|t| t.blockchain == blockchain && t.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .or_else(|| {
                let native = native_token(blockchain);
                native.symbol.eq_ignore_ascii_case(symbol).then_some(native)
            })
    }

    /// Native coin first, then every configured token of the chain.
    pub fn tokens_for(&self, blockchain: Blockchain) -> Vec<TokenConfig> {
        let configured: Vec<TokenConfig> = self.tokens.iter().filter(|t| t.blockchain == blockchain).cloned().collect();
        let mut tokens = Vec::with_capacity(configured.len() + 1);
        if !configured.iter().any(TokenConfig::is_native) {
            tokens.push(native_token(blockchain));
        }
        tokens.extend(configured);
        tokens
    }
}

/// Built-in native coin entry.
pub fn native_token(blockchain: Blockchain) -> TokenConfig {
    let decimals = match blockchain {
        Blockchain::Ethereum => 18,
        Blockchain::Near => 24,
        Blockchain::Zilliqa => 12,
    };
    TokenConfig::native(blockchain, blockchain.coin(), decimals)
}
