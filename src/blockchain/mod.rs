//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! WalletConfig.chains
//!     → registry.rs (one adapter pair per chain, resolved once)
//!     → transport.rs (JSON-RPC over HTTP, timeout + failover)
//!     → client.rs (BlockchainClient: balance, nonce, fees, broadcast, status)
//!         ├── ethereum/ (eth_* RPC, ERC20, legacy signing)
//!         ├── near/     (NEAR RPC, borsh + ed25519, staking pools)
//!         └── zilliqa/  (Zilliqa RPC, ZRC2, SSN staking)
//! ```
//!
//! # Security Constraints
//! - Private keys are only passed through to `sign`; never stored or logged
//! - All RPC calls have configurable timeouts
//! - Graceful degradation when a chain is unreachable (fee defaults, zero balance)

pub mod client;
pub mod ethereum;
pub mod near;
pub mod registry;
pub mod token;
pub mod transport;
pub mod types;
pub mod zilliqa;

pub use client::{BlockchainClient, FeeContext, StatusContext};
pub use registry::ChainRegistry;
pub use token::TokenClient;
pub use transport::{HttpTransport, JsonRpcTransport};
pub use types::{Blockchain, BlockchainError, BlockchainResult, ChainId, FeeOptions, SignedPayload, TokenConfig, TokenType};
