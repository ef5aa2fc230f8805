//! Ethereum adapter.
//!
//! # Data Flow
//! ```text
//! EthereumClient ──call──▶ JsonRpcTransport (eth_* methods)
//!     ├── Erc20Client (balanceOf via eth_call, transfer ABI encoding)
//!     └── EthereumBuilder (legacy EIP-155 transactions, signed with alloy)
//! ```

pub mod builder;
pub mod client;
pub mod erc20;

pub use builder::EthereumBuilder;
pub use client::EthereumClient;
pub use erc20::Erc20Client;

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use serde_json::Value;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Parse a `0x` hex quantity.
pub(crate) fn parse_quantity(value: &Value) -> BlockchainResult<U256> {
    let raw = value
        .as_str()
        .ok_or_else(|| BlockchainError::InvalidResponse(format!("expected hex quantity, got {}", value)))?;
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| BlockchainError::InvalidResponse(format!("invalid hex quantity '{}': {}", raw, e)))
}

pub(crate) fn parse_quantity_u64(value: &Value) -> BlockchainResult<u64> {
    let quantity = parse_quantity(value)?;
    u64::try_from(quantity)
        .map_err(|_| BlockchainError::InvalidResponse(format!("quantity {} out of range", quantity)))
}

/// Parse a checksummed or lowercase address, adding the `0x` prefix when missing.
pub(crate) fn parse_address(address: &str) -> BlockchainResult<Address> {
    let prefixed = if address.starts_with("0x") {
        address.to_string()
    } else {
        format!("0x{}", address)
    };
    Address::from_str(&prefixed).map_err(|e| BlockchainError::InvalidAddress(format!("{}: {}", address, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x10")).unwrap(), U256::from(16));
        assert_eq!(parse_quantity(&json!("0x")).unwrap(), U256::ZERO);
        assert!(parse_quantity(&json!(16)).is_err());
        assert!(parse_quantity_u64(&json!("0x1ffffffffffffffffffff")).is_err());
    }

    #[test]
    fn test_parse_address_adds_prefix() {
        let address = parse_address("f39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        assert_eq!(
            address.to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert!(parse_address("0x123").is_err());
    }
}
