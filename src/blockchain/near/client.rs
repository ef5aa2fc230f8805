//! NEAR JSON-RPC client.

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::blockchain::client::{finish_status_lookup, BlockchainClient, FeeContext, StatusContext};
use crate::blockchain::near::logs::ReceiptLogParser;
use crate::blockchain::token::{TokenClient, TokenClients};
use crate::blockchain::transport::JsonRpcTransport;
use crate::blockchain::types::{
    Blockchain, BlockInfo, BlockchainError, BlockchainResult, BroadcastResult, ChainId, FeeOptions,
    SignedPayload, TokenConfig, TokenType,
};
use crate::config::ChainConfig;
use crate::observability::metrics;
use crate::transaction::types::{
    AdditionalInfo, ChainAction, ContractCall, ContractCallInfo, Transaction, TransactionDates,
    TransactionStatus, TransactionType, TransferInfo,
};

pub struct NearClient {
    config: ChainConfig,
    transport: Arc<dyn JsonRpcTransport>,
    tokens: TokenClients,
    logs: ReceiptLogParser,
}

impl NearClient {
    pub fn new(config: &ChainConfig, transport: Arc<dyn JsonRpcTransport>) -> Self {
        Self {
            config: config.clone(),
            transport,
            tokens: TokenClients::new(Blockchain::Near),
            logs: ReceiptLogParser::for_schema(config.receipt_log_schema),
        }
    }

    async fn query(&self, request: Value) -> BlockchainResult<Value> {
        let result = self.transport.call("query", request).await?;
        // Older nodes report view errors inside `result`.
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(BlockchainError::Node {
                code: 0,
                message: error.to_string(),
                data: None,
            });
        }
        Ok(result)
    }

    async fn estimate_fees(&self, tx_type: TransactionType, token_type: TokenType) -> BlockchainResult<FeeOptions> {
        let result = self.transport.call("gas_price", json!([null])).await?;
        let gas_price = parse_decimal(&result["gas_price"])?;
        let defaults = self.config.fee_defaults();
        let gas_limit = match tx_type {
            TransactionType::ContractCall => defaults.token_gas_limit,
            TransactionType::Transfer => defaults.gas_limit_for(token_type),
        };
        Ok(FeeOptions::new(gas_price, U256::from(gas_limit)))
    }

    async fn fetch_transaction(&self, hash: &str, address: &str) -> BlockchainResult<Option<Value>> {
        match self.transport.call("tx", json!([hash, address])).await {
            Ok(result) => Ok(Some(result)),
            Err(e) if e.node_error_contains("UNKNOWN_TRANSACTION") || e.node_error_contains("doesn't exist") => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn from_chain(&self, raw: &Value, context: &StatusContext) -> BlockchainResult<Transaction> {
        let body = &raw["transaction"];
        let text = |name: &str| -> BlockchainResult<String> {
            body[name]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| BlockchainError::InvalidResponse(format!("transaction without {}", name)))
        };

        let mut tx_type = TransactionType::Transfer;
        let mut address = text("signer_id")?;
        let mut to_address = text("receiver_id")?;
        let mut amount = U256::ZERO;
        let mut actions = Vec::new();
        let mut call: Option<ContractCall> = None;

        for action in body["actions"].as_array().map(Vec::as_slice).unwrap_or_default() {
            if let Some(transfer) = action.get("Transfer") {
                amount = parse_decimal(&transfer["deposit"])?;
                actions.push(ChainAction::Transfer);
            } else if let Some(function_call) = action.get("FunctionCall") {
                tx_type = TransactionType::ContractCall;
                let method = function_call["method_name"].as_str().unwrap_or_default().to_string();
                actions.push(ChainAction::FunctionCall {
                    method: method.clone(),
                    args: function_call["args"].clone(),
                    gas: function_call["gas"].as_u64().unwrap_or_default(),
                    deposit: parse_decimal(&function_call["deposit"]).unwrap_or_default(),
                });
                call = Some(ContractCall {
                    method,
                    params: Vec::new(),
                    raw: function_call["args"].as_str().unwrap_or_default().to_string(),
                });
            }
        }

        let outcome = if tx_type == TransactionType::ContractCall {
            let logs = raw["receipts_outcome"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|r| r["outcome"]["logs"].as_array())
                .flatten()
                .filter_map(Value::as_str);
            self.logs.parse(logs)
        } else {
            None
        };

        if let Some(outcome) = &outcome {
            if let Some(value) = outcome.amount {
                amount = value;
            }
            if let Some(validator) = &outcome.validator {
                address = to_address.clone();
                to_address = validator.clone();
            }
        }

        let additional_info = match (&context.cached, call) {
            (Some(cached), _) if !matches!(cached.additional_info, AdditionalInfo::Transfer(_)) => {
                cached.additional_info.clone()
            }
            (_, Some(call)) => AdditionalInfo::ContractCall(ContractCallInfo { call, actions, outcome }),
            (_, None) => AdditionalInfo::Transfer(TransferInfo { actions }),
        };

        let now = crate::transaction::types::now_millis();
        Ok(Transaction {
            id: Some(text("hash")?),
            blockchain: Blockchain::Near,
            chain_id: self.config.chain_id.clone(),
            tx_type,
            address,
            public_key: body["public_key"].as_str().map(str::to_string),
            to_address,
            amount,
            token: context
                .cached
                .as_ref()
                .map(|c| c.token.clone())
                .unwrap_or_else(|| TokenConfig::native(Blockchain::Near, "NEAR", 24)),
            fee_options: None,
            nonce: body["nonce"].as_u64().unwrap_or_default(),
            status: status_from_outcome(&raw["status"]),
            broadcasted_on_block: context.broadcasted_on_block,
            block_hash: None,
            dates: context.cached.as_ref().map(|c| c.dates.clone()).unwrap_or(TransactionDates {
                created: now,
                signed: Some(now),
                broadcasted: Some(now),
                confirmed: Some(now),
            }),
            additional_info,
        })
    }
}

/// Final execution status → lifecycle status.
pub fn status_from_outcome(status: &Value) -> TransactionStatus {
    if status.get("SuccessValue").is_some() {
        TransactionStatus::Success
    } else if status.get("Failure").is_some() {
        TransactionStatus::Failed
    } else {
        // "NotStarted" / "Started"
        TransactionStatus::Pending
    }
}

/// NEAR encodes u128 amounts as decimal strings.
fn parse_decimal(value: &Value) -> BlockchainResult<U256> {
    match value {
        Value::String(s) => U256::from_str_radix(s, 10)
            .map_err(|e| BlockchainError::InvalidResponse(format!("invalid amount '{}': {}", s, e))),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| BlockchainError::InvalidResponse(format!("invalid amount {}", n))),
        other => Err(BlockchainError::InvalidResponse(format!("expected amount, got {}", other))),
    }
}

fn is_unknown_account(error: &BlockchainError) -> bool {
    error.node_error_contains("UNKNOWN_ACCOUNT") || error.node_error_contains("does not exist")
}

#[async_trait]
impl BlockchainClient for NearClient {
    fn blockchain(&self) -> Blockchain {
        Blockchain::Near
    }

    fn chain_id(&self) -> &ChainId {
        &self.config.chain_id
    }

    fn dropped_tx_blocks_threshold(&self) -> u64 {
        self.config.dropped_tx_blocks_threshold
    }

    async fn get_balance(&self, address: &str) -> BlockchainResult<U256> {
        let request = json!({
            "request_type": "view_account",
            "finality": "final",
            "account_id": address,
        });
        match self.query(request).await {
            Ok(account) => parse_decimal(&account["amount"]),
            Err(e) if is_unknown_account(&e) => {
                tracing::debug!(account = %address, "Account not created, balance is zero");
                Ok(U256::ZERO)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_nonce(&self, address: &str, public_key: Option<&str>) -> BlockchainResult<u64> {
        let public_key = public_key
            .ok_or_else(|| BlockchainError::InvalidAddress(format!("public key required for {}", address)))?;
        let request = json!({
            "request_type": "view_access_key",
            "finality": "final",
            "account_id": address,
            "public_key": public_key,
        });
        let access_key = self.query(request).await?;
        let nonce = access_key["nonce"]
            .as_u64()
            .ok_or_else(|| BlockchainError::InvalidResponse("access key without nonce".into()))?;
        Ok(nonce + 1)
    }

    async fn get_current_block(&self) -> BlockchainResult<BlockInfo> {
        let block = self.transport.call("block", json!({ "finality": "final" })).await?;
        let header = &block["header"];
        Ok(BlockInfo {
            hash: header["hash"]
                .as_str()
                .ok_or_else(|| BlockchainError::InvalidResponse("block without hash".into()))?
                .to_string(),
            number: header["height"]
                .as_u64()
                .ok_or_else(|| BlockchainError::InvalidResponse("block without height".into()))?,
        })
    }

    async fn send_transaction(&self, payload: &SignedPayload) -> BlockchainResult<BroadcastResult> {
        let encoded = match payload {
            SignedPayload::Base64(encoded) => encoded,
            other => return Err(BlockchainError::UnsupportedPayload(Blockchain::Near, other.encoding())),
        };

        match self.transport.call("broadcast_tx_commit", json!([encoded])).await {
            Ok(result) => {
                metrics::record_broadcast(Blockchain::Near, "accepted");
                let tx_hash = result["transaction"]["hash"]
                    .as_str()
                    .ok_or_else(|| BlockchainError::InvalidResponse("broadcast result without hash".into()))?
                    .to_string();
                tracing::info!(blockchain = %Blockchain::Near, tx_hash = %tx_hash, "Transaction broadcast");
                Ok(BroadcastResult {
                    tx_hash,
                    raw_response: result,
                })
            }
            Err(e) => {
                metrics::record_broadcast(Blockchain::Near, "rejected");
                Err(e.into_rejection())
            }
        }
    }

    async fn get_fees(&self, tx_type: TransactionType, _context: &FeeContext, token_type: TokenType) -> FeeOptions {
        match self.estimate_fees(tx_type, token_type).await {
            Ok(fees) => fees,
            Err(e) => {
                tracing::warn!(blockchain = %Blockchain::Near, error = %e, "Fee estimation failed, using defaults");
                metrics::record_fee_fallback(Blockchain::Near);
                let defaults = self.config.fee_defaults();
                let gas_limit = match tx_type {
                    TransactionType::ContractCall => defaults.token_gas_limit,
                    TransactionType::Transfer => defaults.gas_limit_for(token_type),
                };
                FeeOptions::from_u64(defaults.gas_price, gas_limit)
            }
        }
    }

    async fn get_transaction(&self, hash: &str, context: &StatusContext) -> BlockchainResult<Transaction> {
        let address = context
            .address
            .as_deref()
            .ok_or_else(|| BlockchainError::InvalidAddress("sender account required for NEAR lookups".into()))?;
        let raw = self
            .fetch_transaction(hash, address)
            .await?
            .ok_or_else(|| BlockchainError::InvalidResponse(format!("transaction {} not found", hash)))?;
        self.from_chain(&raw, context)
    }

    async fn get_transaction_status(&self, hash: &str, context: &StatusContext) -> Option<TransactionStatus> {
        if let Some(cached) = context.cached.as_ref().filter(|c| c.status.is_terminal()) {
            return Some(cached.status);
        }

        let lookup = match context.address.as_deref() {
            Some(address) => self
                .fetch_transaction(hash, address)
                .await
                .map(|raw| raw.map(|raw| status_from_outcome(&raw["status"]))),
            None => Err(BlockchainError::InvalidAddress("sender account required for NEAR lookups".into())),
        };
        finish_status_lookup(Blockchain::Near, hash, lookup, context, self.config.dropped_tx_blocks_threshold)
    }

    fn token_client(&self, token_type: TokenType) -> BlockchainResult<Arc<dyn TokenClient>> {
        self.tokens.get(token_type)
    }
}
