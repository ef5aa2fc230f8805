//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     CLI exit / embedding app teardown → trigger()
//!         → StatusPoller finishes its current round, then returns
//! ```
//!
//! # Design Decisions
//! - Broadcast channel so any number of tasks can subscribe
//! - The sticky flag covers a trigger that lands between two polls

pub mod shutdown;

pub use shutdown::Shutdown;
