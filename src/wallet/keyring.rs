//! In-memory key source for local signing.
//!
//! # Security
//! - Keys are loaded from explicit strings or environment variables only
//! - Keys are never logged or serialized; `Debug` prints key slots only
//! - An optional password digest gates every key read

use std::collections::HashMap;
use std::fmt;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use ed25519_dalek::Signer;
use sha2::{Digest, Sha256};

use crate::blockchain::near::encoding::parse_secret_key;
use crate::blockchain::types::Blockchain;
use crate::blockchain::zilliqa::address::to_bech32;
use crate::blockchain::zilliqa::signing as zilliqa;
use crate::transaction::types::TransactionError;
use crate::wallet::signer::{KeySource, SignerError};

/// Environment variable prefix; the full name is `WALLET_CORE_<CHAIN>_PRIVATE_KEY`.
pub const PRIVATE_KEY_ENV_PREFIX: &str = "WALLET_CORE_";

pub fn private_key_env_var(blockchain: Blockchain) -> String {
    format!("{}{}_PRIVATE_KEY", PRIVATE_KEY_ENV_PREFIX, blockchain)
}

/// Validated private keys keyed by `(chain, account index)`.
#[derive(Clone, Default)]
pub struct Keyring {
    keys: HashMap<(Blockchain, u32), String>,
    password_digest: Option<[u8; 32]>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyring holding one key at index 0.
    pub fn from_private_key(blockchain: Blockchain, private_key: &str) -> Result<Self, SignerError> {
        Self::new().with_key(blockchain, 0, private_key)
    }

    /// Load index 0 for every chain whose key variable is set.
    pub fn from_env() -> Result<Self, SignerError> {
        let mut keyring = Self::new();
        for blockchain in [Blockchain::Ethereum, Blockchain::Near, Blockchain::Zilliqa] {
            if let Ok(key) = std::env::var(private_key_env_var(blockchain)) {
                keyring = keyring.with_key(blockchain, 0, &key)?;
            }
        }
        Ok(keyring)
    }

    /// Add a key after checking it parses for its chain.
    pub fn with_key(mut self, blockchain: Blockchain, index: u32, private_key: &str) -> Result<Self, SignerError> {
        let account = account_of(blockchain, private_key)?;
        tracing::info!(blockchain = %blockchain, index, account = %account, "Key loaded");
        self.keys.insert((blockchain, index), private_key.trim().to_string());
        Ok(self)
    }

    /// Require this password for every key read.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password_digest = Some(Sha256::digest(password.as_bytes()).into());
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeySource for Keyring {
    fn private_key(&self, blockchain: Blockchain, index: u32, password: &str) -> Result<String, SignerError> {
        if let Some(expected) = self.password_digest {
            let digest: [u8; 32] = Sha256::digest(password.as_bytes()).into();
            if digest != expected {
                return Err(SignerError::WrongPassword);
            }
        }
        self.keys
            .get(&(blockchain, index))
            .cloned()
            .ok_or(SignerError::MissingKey { blockchain, index })
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut slots: Vec<_> = self.keys.keys().collect();
        slots.sort();
        f.debug_struct("Keyring")
            .field("slots", &slots)
            .field("password", &self.password_digest.is_some())
            .finish()
    }
}

fn ethereum_signer(private_key: &str) -> Result<PrivateKeySigner, SignerError> {
    private_key
        .trim()
        .trim_start_matches("0x")
        .parse()
        .map_err(|e| TransactionError::Signing(format!("Invalid private key format: {}", e)).into())
}

/// Public identity of a key: address for Ethereum, public key for NEAR,
/// bech32 address for Zilliqa.
pub fn account_of(blockchain: Blockchain, private_key: &str) -> Result<String, SignerError> {
    match blockchain {
        Blockchain::Ethereum => Ok(ethereum_signer(private_key)?.address().to_string().to_lowercase()),
        Blockchain::Near => Ok(crate::blockchain::near::encoding::public_key_of(private_key.trim())?),
        Blockchain::Zilliqa => {
            let secret = zilliqa::parse_secret_key(private_key)?;
            Ok(to_bech32(&zilliqa::address_of(&secret))?)
        }
    }
}

/// Sign a message with a chain-native scheme.
///
/// Ethereum uses the EIP-191 personal prefix (65-byte signature, hex).
/// NEAR signs the raw bytes with ed25519 (base58 signature).
/// Zilliqa signs the raw bytes with Schnorr (hex `r || s`).
pub fn sign_message_with(blockchain: Blockchain, private_key: &str, message: &[u8]) -> Result<String, SignerError> {
    match blockchain {
        Blockchain::Ethereum => {
            let signature = ethereum_signer(private_key)?
                .sign_message_sync(message)
                .map_err(|e| TransactionError::Signing(format!("Message signing failed: {}", e)))?;
            Ok(alloy::hex::encode_prefixed(signature.as_bytes()))
        }
        Blockchain::Near => {
            let key = parse_secret_key(private_key.trim())?;
            Ok(bs58::encode(key.sign(message).to_bytes()).into_string())
        }
        Blockchain::Zilliqa => Ok(zilliqa::sign_message(private_key, message)?),
    }
}
