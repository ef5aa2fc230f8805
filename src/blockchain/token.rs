//! Token-standard clients (ERC20, ZRC2) and per-chain lookup.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;

use crate::blockchain::types::{Blockchain, BlockchainError, BlockchainResult, TokenType};
use crate::transaction::types::ContractCall;

/// Balance reads and transfer encoding for one token standard.
#[async_trait]
pub trait TokenClient: Send + Sync {
    fn token_type(&self) -> TokenType;

    /// Token balance of `address` held in `contract_address`.
    async fn get_balance(&self, contract_address: &str, address: &str) -> BlockchainResult<U256>;

    /// Contract call that moves `amount` to `to_address`.
    fn encode_transfer(&self, to_address: &str, amount: U256) -> BlockchainResult<ContractCall>;
}

/// Token clients registered for one chain.
#[derive(Clone)]
pub struct TokenClients {
    blockchain: Blockchain,
    clients: HashMap<TokenType, Arc<dyn TokenClient>>,
}

impl TokenClients {
    pub fn new(blockchain: Blockchain) -> Self {
        Self {
            blockchain,
            clients: HashMap::new(),
        }
    }

    pub fn with(mut self, client: Arc<dyn TokenClient>) -> Self {
        self.clients.insert(client.token_type(), client);
        self
    }

    pub fn get(&self, token_type: TokenType) -> BlockchainResult<Arc<dyn TokenClient>> {
        self.clients
            .get(&token_type)
            .cloned()
            .ok_or(BlockchainError::UnhandledTokenType {
                token_type,
                blockchain: self.blockchain,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_client() {
        let clients = TokenClients::new(Blockchain::Near);
        let err = clients.get(TokenType::Erc20).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Token type (ERC20) not handled for blockchain NEAR"
        );
    }
}
