//! Zilliqa JSON-RPC client.

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::blockchain::client::{finish_status_lookup, BlockchainClient, FeeContext, StatusContext};
use crate::blockchain::token::{TokenClient, TokenClients};
use crate::blockchain::transport::JsonRpcTransport;
use crate::blockchain::types::{
    Blockchain, BlockInfo, BlockchainError, BlockchainResult, BroadcastResult, ChainId, FeeOptions,
    SignedPayload, TokenConfig, TokenType,
};
use crate::blockchain::zilliqa::zrc2::Zrc2Client;
use crate::blockchain::zilliqa::{address, parse_decimal, smart_contract_sub_state};
use crate::config::ChainConfig;
use crate::observability::metrics;
use crate::transaction::types::{
    AdditionalInfo, ContractCall, ContractCallInfo, Transaction, TransactionStatus, TransactionType,
    TransferInfo,
};

const ACCOUNT_NOT_CREATED: &str = "Account is not created";

pub struct ZilliqaClient {
    config: ChainConfig,
    transport: Arc<dyn JsonRpcTransport>,
    tokens: TokenClients,
}

impl ZilliqaClient {
    pub fn new(config: &ChainConfig, transport: Arc<dyn JsonRpcTransport>) -> Self {
        let tokens = TokenClients::new(Blockchain::Zilliqa).with(Arc::new(Zrc2Client::new(transport.clone())));

        Self {
            config: config.clone(),
            transport,
            tokens,
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Named contract from configuration, e.g. `staking`.
    pub fn contract(&self, name: &str) -> BlockchainResult<&str> {
        self.config.contract(name).ok_or_else(|| BlockchainError::MissingContract {
            name: name.to_string(),
            chain_id: self.config.chain_id.clone(),
        })
    }

    /// `result` of `GetSmartContractSubState`; `null` when the field is empty.
    pub async fn get_smart_contract_sub_state(
        &self,
        contract_address: &str,
        field: &str,
        sub_fields: &[String],
    ) -> BlockchainResult<Value> {
        smart_contract_sub_state(self.transport.as_ref(), contract_address, field, sub_fields).await
    }

    /// Immutable init parameters of a contract.
    pub async fn get_smart_contract_init(&self, contract_address: &str) -> BlockchainResult<Value> {
        let contract = address::to_rpc(contract_address)?;
        self.transport.call("GetSmartContractInit", json!([contract])).await
    }

    async fn account(&self, address: &str) -> BlockchainResult<Option<Value>> {
        let account = address::to_rpc(address)?;
        match self.transport.call("GetBalance", json!([account])).await {
            Ok(result) => Ok(Some(result)),
            Err(e) if e.node_error_contains(ACCOUNT_NOT_CREATED) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn minimum_gas_price(&self) -> BlockchainResult<U256> {
        let result = self.transport.call("GetMinimumGasPrice", json!([])).await?;
        parse_decimal(&result)
    }

    async fn fetch_transaction(&self, hash: &str) -> BlockchainResult<Option<Value>> {
        let hash = hash.trim_start_matches("0x");
        match self.transport.call("GetTransaction", json!([hash])).await {
            Ok(result) => Ok(Some(result)),
            Err(e) if e.node_error_contains("not present") || e.node_error_contains("not found") => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn from_chain(&self, hash: &str, raw: &Value, context: &StatusContext) -> BlockchainResult<Transaction> {
        let data = raw["data"].as_str().filter(|d| !d.is_empty());
        let call = data.and_then(|d| {
            let message: Value = serde_json::from_str(d).ok()?;
            Some(ContractCall {
                method: message["_tag"].as_str().unwrap_or_default().to_string(),
                params: message["params"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|p| p["value"].as_str().map(str::to_string))
                    .collect(),
                raw: d.to_string(),
            })
        });

        let (tx_type, additional_info) = match (&context.cached, call) {
            (Some(cached), _) => (cached.tx_type, cached.additional_info.clone()),
            (None, Some(call)) => (
                TransactionType::ContractCall,
                AdditionalInfo::ContractCall(ContractCallInfo {
                    call,
                    actions: Vec::new(),
                    outcome: None,
                }),
            ),
            (None, None) => (TransactionType::Transfer, AdditionalInfo::Transfer(TransferInfo::default())),
        };

        let to_address = match raw["toAddr"].as_str() {
            Some(to) => address::to_bech32(to)?,
            None => return Err(BlockchainError::InvalidResponse("transaction without toAddr".into())),
        };
        let fee_options = FeeOptions::new(parse_decimal(&raw["gasPrice"])?, parse_decimal(&raw["gasLimit"])?);
        let nonce = parse_decimal(&raw["nonce"])
            .ok()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or_default();
        let epoch = raw["receipt"]["epoch_num"].as_str().and_then(|e| e.parse().ok());

        Ok(Transaction {
            id: Some(hash.to_string()),
            blockchain: Blockchain::Zilliqa,
            chain_id: self.config.chain_id.clone(),
            tx_type,
            address: context
                .cached
                .as_ref()
                .map(|c| c.address.clone())
                .or_else(|| context.address.clone())
                .unwrap_or_default(),
            public_key: raw["senderPubKey"].as_str().map(str::to_string),
            to_address: context.cached.as_ref().map(|c| c.to_address.clone()).unwrap_or(to_address),
            amount: match &context.cached {
                Some(cached) => cached.amount,
                None => parse_decimal(&raw["amount"])?,
            },
            token: context
                .cached
                .as_ref()
                .map(|c| c.token.clone())
                .unwrap_or_else(|| TokenConfig::native(Blockchain::Zilliqa, "ZIL", 12)),
            fee_options: Some(fee_options),
            nonce,
            status: receipt_status(raw),
            broadcasted_on_block: context.broadcasted_on_block.or(epoch),
            block_hash: None,
            dates: context.cached.as_ref().map(|c| c.dates.clone()).unwrap_or_default(),
            additional_info,
        })
    }
}

fn receipt_status(raw: &Value) -> TransactionStatus {
    match raw["receipt"]["success"].as_bool() {
        Some(true) => TransactionStatus::Success,
        Some(false) => TransactionStatus::Failed,
        None => TransactionStatus::Pending,
    }
}

#[async_trait]
impl BlockchainClient for ZilliqaClient {
    fn blockchain(&self) -> Blockchain {
        Blockchain::Zilliqa
    }

    fn chain_id(&self) -> &ChainId {
        &self.config.chain_id
    }

    fn dropped_tx_blocks_threshold(&self) -> u64 {
        self.config.dropped_tx_blocks_threshold
    }

    async fn get_balance(&self, address: &str) -> BlockchainResult<U256> {
        match self.account(address).await? {
            Some(account) => parse_decimal(&account["balance"]),
            None => {
                tracing::debug!(account = %address, "Account not created, balance is zero");
                Ok(U256::ZERO)
            }
        }
    }

    async fn get_nonce(&self, address: &str, _public_key: Option<&str>) -> BlockchainResult<u64> {
        match self.account(address).await? {
            Some(account) => {
                let nonce = account["nonce"]
                    .as_u64()
                    .ok_or_else(|| BlockchainError::InvalidResponse("account without nonce".into()))?;
                Ok(nonce + 1)
            }
            // A fresh account's first transaction uses nonce 1.
            None => Ok(1),
        }
    }

    async fn get_current_block(&self) -> BlockchainResult<BlockInfo> {
        let block = self.transport.call("GetLatestTxBlock", json!([])).await?;
        let number = block["header"]["BlockNum"]
            .as_str()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| BlockchainError::InvalidResponse("block without BlockNum".into()))?;
        let hash = block["body"]["BlockHash"]
            .as_str()
            .ok_or_else(|| BlockchainError::InvalidResponse("block without BlockHash".into()))?
            .to_string();
        Ok(BlockInfo { hash, number })
    }

    async fn send_transaction(&self, payload: &SignedPayload) -> BlockchainResult<BroadcastResult> {
        let body = match payload {
            SignedPayload::Json(body) => body,
            other => return Err(BlockchainError::UnsupportedPayload(Blockchain::Zilliqa, other.encoding())),
        };

        match self.transport.call("CreateTransaction", json!([body])).await {
            Ok(result) => {
                let tx_hash = match result["TranID"].as_str() {
                    Some(hash) => hash.to_string(),
                    None => {
                        metrics::record_broadcast(Blockchain::Zilliqa, "rejected");
                        return Err(BlockchainError::InvalidResponse(format!("broadcast without TranID: {}", result)));
                    }
                };
                metrics::record_broadcast(Blockchain::Zilliqa, "accepted");
                tracing::info!(blockchain = %Blockchain::Zilliqa, tx_hash = %tx_hash, "Transaction broadcast");
                Ok(BroadcastResult {
                    tx_hash,
                    raw_response: result,
                })
            }
            Err(e) => {
                metrics::record_broadcast(Blockchain::Zilliqa, "rejected");
                Err(e.into_rejection())
            }
        }
    }

    async fn get_fees(&self, _tx_type: TransactionType, _context: &FeeContext, token_type: TokenType) -> FeeOptions {
        let defaults = self.config.fee_defaults();
        let gas_limit = defaults.gas_limit_for(token_type);

        match self.minimum_gas_price().await {
            Ok(gas_price) => FeeOptions::new(gas_price, U256::from(gas_limit)),
            Err(e) => {
                tracing::warn!(blockchain = %Blockchain::Zilliqa, error = %e, "Fee estimation failed, using defaults");
                metrics::record_fee_fallback(Blockchain::Zilliqa);
                FeeOptions::from_u64(defaults.gas_price, gas_limit)
            }
        }
    }

    async fn get_transaction(&self, hash: &str, context: &StatusContext) -> BlockchainResult<Transaction> {
        let raw = self
            .fetch_transaction(hash)
            .await?
            .ok_or_else(|| BlockchainError::InvalidResponse(format!("transaction {} not found", hash)))?;
        self.from_chain(hash, &raw, context)
    }

    async fn get_transaction_status(&self, hash: &str, context: &StatusContext) -> Option<TransactionStatus> {
        if let Some(cached) = context.cached.as_ref().filter(|c| c.status.is_terminal()) {
            return Some(cached.status);
        }
        let lookup = self
            .fetch_transaction(hash)
            .await
            .map(|raw| raw.map(|raw| receipt_status(&raw)));
        finish_status_lookup(
            Blockchain::Zilliqa,
            hash,
            lookup,
            context,
            self.config.dropped_tx_blocks_threshold,
        )
    }

    fn token_client(&self, token_type: TokenType) -> BlockchainResult<Arc<dyn TokenClient>> {
        self.tokens.get(token_type)
    }
}
