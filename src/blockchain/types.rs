//! Chain-specific types and error definitions.

use std::fmt;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Blockchains with an adapter in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    Ethereum,
    Near,
    Zilliqa,
}

impl Blockchain {
    /// Symbol of the native coin.
    pub fn coin(&self) -> &'static str {
        match self {
            Blockchain::Ethereum => "ETH",
            Blockchain::Near => "NEAR",
            Blockchain::Zilliqa => "ZIL",
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Blockchain::Ethereum => "ETHEREUM",
            Blockchain::Near => "NEAR",
            Blockchain::Zilliqa => "ZILLIQA",
        };
        f.write_str(name)
    }
}

/// Chain network id for strong typing.
///
/// Ethereum and Zilliqa use numeric ids, NEAR uses network names, so the id is
/// kept as its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form, for chains whose ids are integers.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChainId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Native,
    Erc20,
    Zrc2,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenType::Native => "NATIVE",
            TokenType::Erc20 => "ERC20",
            TokenType::Zrc2 => "ZRC2",
        };
        f.write_str(name)
    }
}

/// Static token configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub blockchain: Blockchain,
    pub symbol: String,
    pub decimals: u8,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default)]
    pub contract_address: Option<String>,
}

impl TokenConfig {
    /// Native coin entry.
    pub fn native(blockchain: Blockchain, symbol: &str, decimals: u8) -> Self {
        Self {
            blockchain,
            symbol: symbol.to_string(),
            decimals,
            token_type: TokenType::Native,
            contract_address: None,
        }
    }

    /// Contract-backed token entry.
    pub fn contract(
        blockchain: Blockchain,
        symbol: &str,
        decimals: u8,
        token_type: TokenType,
        contract_address: &str,
    ) -> Self {
        Self {
            blockchain,
            symbol: symbol.to_string(),
            decimals,
            token_type,
            contract_address: Some(contract_address.to_string()),
        }
    }

    pub fn is_native(&self) -> bool {
        self.token_type == TokenType::Native
    }
}

/// Latest block as reported by a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: String,
    pub number: u64,
}

/// Gas price and limit with their cached product.
///
/// `fee_total` is always `gas_price * gas_limit`; there is no setter for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FeeOptionsRepr")]
pub struct FeeOptions {
    gas_price: U256,
    gas_limit: U256,
    fee_total: U256,
}

#[derive(Deserialize)]
struct FeeOptionsRepr {
    gas_price: U256,
    gas_limit: U256,
}

impl From<FeeOptionsRepr> for FeeOptions {
    fn from(repr: FeeOptionsRepr) -> Self {
        FeeOptions::new(repr.gas_price, repr.gas_limit)
    }
}

impl FeeOptions {
    pub fn new(gas_price: U256, gas_limit: U256) -> Self {
        Self {
            gas_price,
            gas_limit,
            fee_total: gas_price.saturating_mul(gas_limit),
        }
    }

    pub fn from_u64(gas_price: u64, gas_limit: u64) -> Self {
        Self::new(U256::from(gas_price), U256::from(gas_limit))
    }

    pub fn gas_price(&self) -> U256 {
        self.gas_price
    }

    pub fn gas_limit(&self) -> U256 {
        self.gas_limit
    }

    pub fn fee_total(&self) -> U256 {
        self.fee_total
    }
}

/// Signed transaction in the encoding the target chain expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "payload", rename_all = "lowercase")]
pub enum SignedPayload {
    /// `0x`-prefixed raw transaction (Ethereum).
    Hex(String),
    /// Base64 borsh-serialized signed transaction (NEAR).
    Base64(String),
    /// JSON transaction object (Zilliqa `CreateTransaction`).
    Json(serde_json::Value),
}

/// Result of an accepted broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastResult {
    pub tx_hash: String,
    pub raw_response: serde_json::Value,
}

/// Named reasons a node gives for rejecting a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    Underpriced,
    ContractTxNormalNotAllowed,
    NonceTooLow,
    InsufficientFunds,
    AlreadyKnown,
    Other(String),
}

static REJECTION_PATTERNS: &[(&str, RejectionReason)] = &[
    ("underpriced", RejectionReason::Underpriced),
    ("contract account won't accept normal txn", RejectionReason::ContractTxNormalNotAllowed),
    ("nonce too low", RejectionReason::NonceTooLow),
    ("invalidnonce", RejectionReason::NonceTooLow),
    ("insufficient funds", RejectionReason::InsufficientFunds),
    ("notenoughbalance", RejectionReason::InsufficientFunds),
    ("already known", RejectionReason::AlreadyKnown),
];

impl RejectionReason {
    /// Classify a node error message by known substrings.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        REJECTION_PATTERNS
            .iter()
            .find(|(needle, _)| lowered.contains(needle))
            .map(|(_, reason)| reason.clone())
            .unwrap_or_else(|| RejectionReason::Other(message.to_string()))
    }

    /// Stable key used for user-facing message lookup.
    pub fn message_key(&self) -> &'static str {
        match self {
            RejectionReason::Underpriced => "TR_UNDERPRICED",
            RejectionReason::ContractTxNormalNotAllowed => "CONTRACT_TX_NORMAL_NOT_ALLOWED",
            RejectionReason::NonceTooLow => "NONCE_TOO_LOW",
            RejectionReason::InsufficientFunds => "INSUFFICIENT_FUNDS",
            RejectionReason::AlreadyKnown => "ALREADY_KNOWN",
            RejectionReason::Other(_) => "GENERIC_ERROR",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Other(message) => write!(f, "{}", message),
            other => f.write_str(other.message_key()),
        }
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node answered with a JSON-RPC error object.
    #[error("Node error {code}: {message}")]
    Node {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// The node refused a broadcast.
    #[error("Transaction rejected: {0}")]
    Rejected(RejectionReason),

    /// The node answered but the payload was not what the adapter expects.
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    /// No token client registered for the token standard.
    #[error("Token type ({token_type}) not handled for blockchain {blockchain}")]
    UnhandledTokenType {
        token_type: TokenType,
        blockchain: Blockchain,
    },

    /// Named contract missing from the chain configuration.
    #[error("Contract '{name}' not configured for chain {chain_id}")]
    MissingContract { name: String, chain_id: ChainId },

    /// Address could not be parsed for this chain.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Signed payload encoding does not match what the chain accepts.
    #[error("{0} does not accept {1} payloads")]
    UnsupportedPayload(Blockchain, &'static str),

    /// Blockchain client not configured.
    #[error("Blockchain not available: {0}")]
    NotAvailable(String),
}

impl SignedPayload {
    pub fn encoding(&self) -> &'static str {
        match self {
            SignedPayload::Hex(_) => "hex",
            SignedPayload::Base64(_) => "base64",
            SignedPayload::Json(_) => "json",
        }
    }
}

impl BlockchainError {
    /// Turn a node error from a broadcast into a classified rejection.
    pub fn into_rejection(self) -> Self {
        match self {
            BlockchainError::Node { message, data, .. } => {
                let text = match data {
                    Some(data) => format!("{} {}", message, data),
                    None => message,
                };
                BlockchainError::Rejected(RejectionReason::classify(&text))
            }
            other => other,
        }
    }

    /// True when the node error message or data contains `needle` (case-insensitive).
    pub fn node_error_contains(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        match self {
            BlockchainError::Node { message, data, .. } => {
                message.to_lowercase().contains(&needle)
                    || data
                        .as_deref()
                        .map(|d| d.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(1u64);
        assert_eq!(chain_id.as_str(), "1");
        assert_eq!(chain_id.as_u64(), Some(1));
        assert_eq!(ChainId::from("testnet").as_u64(), None);
    }

    #[test]
    fn test_fee_total_is_product() {
        let fees = FeeOptions::from_u64(2_000_000_000, 50);
        assert_eq!(fees.fee_total(), U256::from(100_000_000_000u64));
    }

    #[test]
    fn test_fee_total_recomputed_on_deserialize() {
        let json = r#"{"gas_price":"0x2","gas_limit":"0x3","fee_total":"0x64"}"#;
        let fees: FeeOptions = serde_json::from_str(json).unwrap();
        assert_eq!(fees.fee_total(), U256::from(6));
    }

    #[test]
    fn test_rejection_classification() {
        assert_eq!(
            RejectionReason::classify("transaction underpriced"),
            RejectionReason::Underpriced
        );
        assert_eq!(
            RejectionReason::classify("Contract account won't accept normal txn"),
            RejectionReason::ContractTxNormalNotAllowed
        );
        assert_eq!(
            RejectionReason::classify("{\"InvalidNonce\":{\"tx_nonce\":3,\"ak_nonce\":5}}"),
            RejectionReason::NonceTooLow
        );
        assert!(matches!(
            RejectionReason::classify("something else"),
            RejectionReason::Other(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let err = BlockchainError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");

        let err = BlockchainError::UnhandledTokenType {
            token_type: TokenType::Zrc2,
            blockchain: Blockchain::Ethereum,
        };
        assert_eq!(
            err.to_string(),
            "Token type (ZRC2) not handled for blockchain ETHEREUM"
        );
    }

    #[test]
    fn test_node_error_becomes_rejection() {
        let err = BlockchainError::Node {
            code: -26,
            message: "CreateTransaction failed".into(),
            data: Some("transaction underpriced".into()),
        };
        assert!(matches!(
            err.into_rejection(),
            BlockchainError::Rejected(RejectionReason::Underpriced)
        ));
        assert!(matches!(
            BlockchainError::Timeout(3).into_rejection(),
            BlockchainError::Timeout(3)
        ));
    }

    #[test]
    fn test_node_error_contains() {
        let err = BlockchainError::Node {
            code: -5,
            message: "Account is not created".into(),
            data: None,
        };
        assert!(err.node_error_contains("account is not created"));
        assert!(!BlockchainError::Timeout(1).node_error_contains("account"));
    }
}
