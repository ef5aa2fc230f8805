//! Signing capabilities.
//!
//! # Data Flow
//! ```text
//! Orchestrator (batch, send)
//!     → TransactionSigner::sign(chain, index, tx, account type)
//!         └── HdWalletProvider
//!               → CredentialPrompt (password, cancel aborts)
//!               → KeySource (Keyring: validated keys, password gate)
//!               → ChainRegistry builder.sign(tx, key)
//! ```
//!
//! Hardware signers implement `TransactionSigner` outside this crate; the
//! orchestrator calls `close()` after every hardware flow.

pub mod keyring;
pub mod signer;

pub use keyring::Keyring;
pub use signer::{CredentialPrompt, HdWalletProvider, KeySource, PromptOptions, SignerError, TransactionSigner};
