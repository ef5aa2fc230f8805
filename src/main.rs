//! `wallet-core`: read-only chain queries through the wallet's adapters.
//!
//! ```text
//! wallet-core --config wallet.toml balance ethereum 0xf39f… --token USDT
//! wallet-core --config wallet.toml nonce near alice.near --public-key ed25519:…
//! wallet-core --config wallet.toml fees zilliqa --token-type zrc2
//! wallet-core --config wallet.toml block ethereum
//! wallet-core --config wallet.toml status ethereum 0xabc…
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use chain_wallet_core::blockchain::client::{BlockchainClient, FeeContext, StatusContext};
use chain_wallet_core::blockchain::types::TokenType;
use chain_wallet_core::config::loader::load_config;
use chain_wallet_core::observability::{logging, metrics};
use chain_wallet_core::orchestrator::balance::fetch_balance;
use chain_wallet_core::transaction::{amount_from_std, TransactionType};
use chain_wallet_core::{Blockchain, ChainRegistry};

#[derive(Parser)]
#[command(name = "wallet-core")]
#[command(about = "Query balances, nonces, fees and transaction status across chains", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "wallet.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Chain {
    Ethereum,
    Near,
    Zilliqa,
}

impl From<Chain> for Blockchain {
    fn from(chain: Chain) -> Self {
        match chain {
            Chain::Ethereum => Blockchain::Ethereum,
            Chain::Near => Blockchain::Near,
            Chain::Zilliqa => Blockchain::Zilliqa,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Standard {
    Native,
    Erc20,
    Zrc2,
}

impl From<Standard> for TokenType {
    fn from(standard: Standard) -> Self {
        match standard {
            Standard::Native => TokenType::Native,
            Standard::Erc20 => TokenType::Erc20,
            Standard::Zrc2 => TokenType::Zrc2,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Balance of the native coin or a configured token
    Balance {
        chain: Chain,
        address: String,
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Next usable nonce
    Nonce {
        chain: Chain,
        address: String,
        #[arg(long)]
        public_key: Option<String>,
    },
    /// Fee estimate (defaults when the node cannot estimate)
    Fees {
        chain: Chain,
        #[arg(long, value_enum, default_value = "native")]
        token_type: Standard,
    },
    /// Latest block
    Block { chain: Chain },
    /// Status of a broadcast transaction
    Status { chain: Chain, hash: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability);
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = ChainRegistry::from_config(&config)?;

    let output = match cli.command {
        Commands::Balance { chain, address, token } => {
            let blockchain = Blockchain::from(chain);
            let symbol = token.unwrap_or_else(|| blockchain.coin().to_string());
            let token = registry
                .token_config(blockchain, &symbol)
                .ok_or_else(|| format!("unknown token {} on {}", symbol, blockchain))?;
            let client = registry.client(blockchain)?;
            let balance = fetch_balance(client.as_ref(), &address, &token).await?;
            json!({
                "symbol": token.symbol,
                "balance": balance.to_string(),
                "formatted": amount_from_std(balance, token.decimals),
            })
        }
        Commands::Nonce {
            chain,
            address,
            public_key,
        } => {
            let client = registry.client(chain.into())?;
            json!({ "nonce": client.get_nonce(&address, public_key.as_deref()).await? })
        }
        Commands::Fees { chain, token_type } => {
            let client = registry.client(chain.into())?;
            let fees = client
                .get_fees(TransactionType::Transfer, &FeeContext::default(), token_type.into())
                .await;
            serde_json::to_value(&fees)?
        }
        Commands::Block { chain } => {
            let block = registry.client(chain.into())?.get_current_block().await?;
            json!({ "number": block.number, "hash": block.hash })
        }
        Commands::Status { chain, hash } => {
            let client = registry.client(chain.into())?;
            let current = client.get_current_block().await.ok().map(|b| b.number);
            let context = StatusContext {
                current_block_number: current,
                ..StatusContext::default()
            };
            let status = client.get_transaction_status(&hash, &context).await;
            json!({ "hash": hash, "status": status.map(|s| s.to_string()) })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
