//! ERC20 token client.

use std::sync::Arc;

use alloy::primitives::U256;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use serde_json::json;

use crate::blockchain::ethereum::{parse_address, parse_quantity};
use crate::blockchain::token::TokenClient;
use crate::blockchain::transport::JsonRpcTransport;
use crate::blockchain::types::{BlockchainResult, TokenType};
use crate::transaction::types::ContractCall;

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }
}

pub struct Erc20Client {
    transport: Arc<dyn JsonRpcTransport>,
}

impl Erc20Client {
    pub fn new(transport: Arc<dyn JsonRpcTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenClient for Erc20Client {
    fn token_type(&self) -> TokenType {
        TokenType::Erc20
    }

    async fn get_balance(&self, contract_address: &str, address: &str) -> BlockchainResult<U256> {
        let contract = parse_address(contract_address)?;
        let owner = parse_address(address)?;
        let data = IERC20::balanceOfCall { owner }.abi_encode();

        let result = self
            .transport
            .call(
                "eth_call",
                json!([{ "to": contract, "data": alloy::hex::encode_prefixed(data) }, "latest"]),
            )
            .await?;

        parse_quantity(&result)
    }

    fn encode_transfer(&self, to_address: &str, amount: U256) -> BlockchainResult<ContractCall> {
        let to = parse_address(to_address)?;
        let data = IERC20::transferCall { to, amount }.abi_encode();

        Ok(ContractCall {
            method: "transfer".to_string(),
            params: vec![to.to_string(), amount.to_string()],
            raw: alloy::hex::encode_prefixed(data),
        })
    }
}
