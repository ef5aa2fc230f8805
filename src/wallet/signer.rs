//! Signing and credential capabilities consumed by the orchestrator.
//!
//! Neither capability is implemented against real secure storage or
//! hardware here; the orchestrator only sees these traits.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::blockchain::registry::ChainRegistry;
use crate::blockchain::types::{Blockchain, BlockchainError, SignedPayload};
use crate::transaction::intent::AccountType;
use crate::transaction::types::{Transaction, TransactionError};

/// Errors from the signing capability.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The user dismissed the credential prompt or the device confirmation.
    #[error("Signing cancelled by user")]
    Cancelled,

    #[error("No key for {blockchain} account {index}")]
    MissingKey { blockchain: Blockchain, index: u32 },

    #[error("Wrong password")]
    WrongPassword,

    #[error("Hardware device error: {0}")]
    Device(String),

    #[error("Account type {0:?} not supported by this signer")]
    UnsupportedAccountType(AccountType),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
}

/// `sign(chain, accountIndex, tx, accountType) → signed payload`.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(
        &self,
        blockchain: Blockchain,
        account_index: u32,
        transaction: &Transaction,
        account_type: AccountType,
    ) -> Result<SignedPayload, SignerError>;

    /// Chain-native signature over an arbitrary message.
    async fn sign_message(
        &self,
        blockchain: Blockchain,
        account_index: u32,
        message: &[u8],
        account_type: AccountType,
    ) -> Result<String, SignerError>;

    /// Release a hardware session. Called after every hardware flow, success or not.
    async fn close(&self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptOptions {
    /// Hide input and keep it out of any history.
    pub sensitive: bool,
}

/// Asks the user for a password. `Err(SignerError::Cancelled)` aborts the flow.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn get_password(&self, title: &str, subtitle: &str, options: PromptOptions) -> Result<String, SignerError>;
}

/// Where HD private keys come from once the user is authenticated.
pub trait KeySource: Send + Sync {
    fn private_key(&self, blockchain: Blockchain, index: u32, password: &str) -> Result<String, SignerError>;
}

/// HD signer: prompt for the password, fetch the key, sign with the chain's builder.
pub struct HdWalletProvider {
    prompt: Arc<dyn CredentialPrompt>,
    keys: Arc<dyn KeySource>,
    registry: ChainRegistry,
}

impl HdWalletProvider {
    pub fn new(prompt: Arc<dyn CredentialPrompt>, keys: Arc<dyn KeySource>, registry: ChainRegistry) -> Self {
        Self { prompt, keys, registry }
    }

    async fn unlock(&self, blockchain: Blockchain, index: u32, subtitle: &str) -> Result<String, SignerError> {
        let password = self
            .prompt
            .get_password("Enter password", subtitle, PromptOptions { sensitive: true })
            .await?;
        self.keys.private_key(blockchain, index, &password)
    }
}

#[async_trait]
impl TransactionSigner for HdWalletProvider {
    async fn sign(
        &self,
        blockchain: Blockchain,
        account_index: u32,
        transaction: &Transaction,
        account_type: AccountType,
    ) -> Result<SignedPayload, SignerError> {
        if account_type != AccountType::Hd {
            return Err(SignerError::UnsupportedAccountType(account_type));
        }
        let builder = self.registry.builder(blockchain)?;
        let key = self.unlock(blockchain, account_index, "Sign transaction").await?;
        let payload = builder.sign(transaction, &key)?;
        tracing::debug!(blockchain = %blockchain, account_index, nonce = transaction.nonce, "Transaction signed");
        Ok(payload)
    }

    async fn sign_message(
        &self,
        blockchain: Blockchain,
        account_index: u32,
        message: &[u8],
        account_type: AccountType,
    ) -> Result<String, SignerError> {
        if account_type != AccountType::Hd {
            return Err(SignerError::UnsupportedAccountType(account_type));
        }
        let key = self.unlock(blockchain, account_index, "Sign message").await?;
        crate::wallet::keyring::sign_message_with(blockchain, &key, message)
    }
}
