//! Multi-chain wallet transaction pipeline.
//!
//! Chain adapters (Ethereum, NEAR, Zilliqa) behind one client/builder
//! contract, staking batch builders, and an orchestrator that reconciles
//! nonces, signs, broadcasts and tracks transactions to a terminal status.

pub mod blockchain;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod resilience;
pub mod transaction;
pub mod wallet;

pub use blockchain::{Blockchain, ChainRegistry};
pub use config::WalletConfig;
pub use lifecycle::Shutdown;
pub use orchestrator::TransactionOrchestrator;
pub use transaction::{Transaction, TransactionStatus};
