//! ZRC2 fungible token client.

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;

use crate::blockchain::token::TokenClient;
use crate::blockchain::transport::JsonRpcTransport;
use crate::blockchain::types::{BlockchainResult, TokenType};
use crate::blockchain::zilliqa::{address, parse_decimal, scilla_message, scilla_param, smart_contract_sub_state};
use crate::transaction::types::ContractCall;

pub struct Zrc2Client {
    transport: Arc<dyn JsonRpcTransport>,
}

impl Zrc2Client {
    pub fn new(transport: Arc<dyn JsonRpcTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenClient for Zrc2Client {
    fn token_type(&self) -> TokenType {
        TokenType::Zrc2
    }

    async fn get_balance(&self, contract_address: &str, address: &str) -> BlockchainResult<U256> {
        let holder = address::to_hex(address)?;
        let state = smart_contract_sub_state(
            self.transport.as_ref(),
            contract_address,
            "balances",
            &[holder.clone()],
        )
        .await?;

        // Holders that never received the token have no entry.
        match state.get("balances").and_then(|b| b.get(&holder)) {
            Some(balance) => parse_decimal(balance),
            None => Ok(U256::ZERO),
        }
    }

    fn encode_transfer(&self, to_address: &str, amount: U256) -> BlockchainResult<ContractCall> {
        let to = address::to_hex(to_address)?;
        let raw = scilla_message(
            "Transfer",
            vec![
                scilla_param("to", "ByStr20", to.clone()),
                scilla_param("amount", "Uint128", amount.to_string()),
            ],
        );

        Ok(ContractCall {
            method: "Transfer".to_string(),
            params: vec![to, amount.to_string()],
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transport::testing::ScriptedTransport;
    use serde_json::{json, Value};

    const HOLDER: &str = "0x9bfec715a6bd658fcb62b0f8cc9bfa2ade71434a";
    const TOKEN: &str = "0x5a2b8d4ad3f1d0a6f0f2c3e7b9e6d8a1c4b3f2e1";

    #[tokio::test]
    async fn test_balance_from_substate() {
        let transport = Arc::new(ScriptedTransport::new(|method, params| {
            assert_eq!(method, "GetSmartContractSubState");
            assert_eq!(params[0], TOKEN.trim_start_matches("0x"));
            assert_eq!(params[1], "balances");
            Ok(json!({ "balances": { HOLDER: "2500" } }))
        }));
        let zrc2 = Zrc2Client::new(transport);
        assert_eq!(zrc2.get_balance(TOKEN, HOLDER).await.unwrap(), U256::from(2500));
    }

    #[tokio::test]
    async fn test_missing_holder_is_zero() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| Ok(Value::Null)));
        let zrc2 = Zrc2Client::new(transport);
        assert_eq!(zrc2.get_balance(TOKEN, HOLDER).await.unwrap(), U256::ZERO);
    }

    #[test]
    fn test_transfer_message() {
        let zrc2 = Zrc2Client::new(Arc::new(ScriptedTransport::new(|_, _| Ok(Value::Null))));
        let call = zrc2.encode_transfer(HOLDER, U256::from(15)).unwrap();
        let message: Value = serde_json::from_str(&call.raw).unwrap();

        assert_eq!(message["_tag"], "Transfer");
        assert_eq!(message["params"][0]["value"], HOLDER);
        assert_eq!(message["params"][1]["type"], "Uint128");
        assert_eq!(message["params"][1]["value"], "15");
    }
}
