//! Chain-agnostic transaction model and build steps.
//!
//! # Data Flow
//! ```text
//! intent.rs (TransferIntent, ContractCallIntent, PosTransactionIntent)
//!     → builder.rs (TransactionBuilder per chain, nonce sequencing, fee resolution)
//!     → types.rs (Transaction: created → signed → pending → terminal)
//!     → status.rs (serialized status lookups per hash)
//! ```
//!
//! `units.rs` and `funds.rs` are boundary helpers: human-unit conversion and
//! the available-funds precheck shown before signing.

pub mod builder;
pub mod funds;
pub mod intent;
pub mod status;
pub mod types;
pub mod units;

pub use builder::TransactionBuilder;
pub use funds::{available_amount, available_funds, FundsCheck};
pub use intent::{AccountRef, AccountType, ContractCallIntent, PosTransactionIntent, TransferIntent};
pub use status::StatusTracker;
pub use types::{
    AdditionalInfo, PosActionType, Transaction, TransactionError, TransactionResult, TransactionStatus,
    TransactionType, ValidatorRef,
};
pub use units::{amount_from_std, amount_to_std};
