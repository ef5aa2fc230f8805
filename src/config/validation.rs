//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (tokens reference configured chains)
//! - Validate value ranges (timeouts > 0, URLs parse)
//! - Detect duplicate chain entries
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WalletConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::blockchain::types::TokenType;
use crate::config::schema::WalletConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &WalletConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, chain) in config.chains.iter().enumerate() {
        let prefix = format!("chains[{}]", i);

        if !seen.insert(chain.blockchain) {
            errors.push(ValidationError::new(
                format!("{}.blockchain", prefix),
                format!("duplicate entry for {}", chain.blockchain),
            ));
        }

        if chain.rpc_url.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.rpc_url", prefix),
                "must not be empty",
            ));
        } else if url::Url::parse(&chain.rpc_url).is_err() {
            errors.push(ValidationError::new(
                format!("{}.rpc_url", prefix),
                format!("invalid URL '{}'", chain.rpc_url),
            ));
        }

        for (j, failover) in chain.failover_urls.iter().enumerate() {
            if url::Url::parse(failover).is_err() {
                errors.push(ValidationError::new(
                    format!("{}.failover_urls[{}]", prefix, j),
                    format!("invalid URL '{}'", failover),
                ));
            }
        }

        if chain.rpc_timeout_secs == 0 {
            errors.push(ValidationError::new(
                format!("{}.rpc_timeout_secs", prefix),
                "must be greater than zero",
            ));
        }

        if chain.chain_id.as_str().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.chain_id", prefix),
                "must not be empty",
            ));
        }
    }

    for (i, token) in config.tokens.iter().enumerate() {
        let prefix = format!("tokens[{}]", i);

        if !seen.contains(&token.blockchain) {
            errors.push(ValidationError::new(
                format!("{}.blockchain", prefix),
                format!("no chain configured for {}", token.blockchain),
            ));
        }

        if token.token_type != TokenType::Native && token.contract_address.is_none() {
            errors.push(ValidationError::new(
                format!("{}.contract_address", prefix),
                format!("required for {} token {}", token.token_type, token.symbol),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
