//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → WalletConfig (validated, immutable)
//!     → ChainRegistry::from_config builds one client + builder per chain
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a new session is needed to pick up changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ChainConfig;
pub use schema::FeeDefaults;
pub use schema::ObservabilityConfig;
pub use schema::OrchestratorConfig;
pub use schema::WalletConfig;
