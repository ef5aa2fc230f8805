//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Waiting on chain state (batch confirmation, background status polling):
//!     → backoff.rs (exponential delay with jitter between polls)
//!     → PollSchedule (bounded attempt count, then give up and leave Pending)
//! ```
//!
//! # Design Decisions
//! - Every wait is bounded; nothing polls forever on the caller's path
//! - Jitter spreads concurrent pollers across the node's rate limit

pub mod backoff;

pub use backoff::{calculate_backoff, PollSchedule};
