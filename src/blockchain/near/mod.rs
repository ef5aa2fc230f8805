//! NEAR adapter.
//!
//! # Data Flow
//! ```text
//! NearClient ──call──▶ JsonRpcTransport (query, block, tx, gas_price, broadcast_tx_commit)
//!     ├── logs.rs (receipt-log parser recovering staking amount/validator)
//!     └── NearBuilder
//!           ├── NearStaking (deposit / stake / unstake / withdraw actions)
//!           └── encoding.rs (borsh transaction, sha256, ed25519, base64)
//! ```
//!
//! # Design Decisions
//! - Transactions bind to the latest final block hash fetched at build time
//! - Nonce is the access key nonce + 1
//! - Staking batches reserve consecutive nonces from one access key query

pub mod builder;
pub mod client;
pub mod encoding;
pub mod logs;
pub mod staking;

pub use builder::NearBuilder;
pub use client::NearClient;
pub use staking::NearStaking;
