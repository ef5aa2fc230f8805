//! Ethereum JSON-RPC client.

use std::sync::Arc;

use alloy::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::Function;
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::blockchain::client::{finish_status_lookup, BlockchainClient, FeeContext, StatusContext};
use crate::blockchain::ethereum::erc20::Erc20Client;
use crate::blockchain::ethereum::{parse_address, parse_quantity, parse_quantity_u64};
use crate::blockchain::token::{TokenClient, TokenClients};
use crate::blockchain::transport::JsonRpcTransport;
use crate::blockchain::types::{
    Blockchain, BlockInfo, BlockchainError, BlockchainResult, BroadcastResult, ChainId, FeeOptions,
    SignedPayload, TokenConfig, TokenType,
};
use crate::config::ChainConfig;
use crate::observability::metrics;
use crate::transaction::types::{
    AdditionalInfo, ContractCall, ContractCallInfo, Transaction, TransactionStatus,
    TransactionType, TransferInfo,
};

pub struct EthereumClient {
    config: ChainConfig,
    transport: Arc<dyn JsonRpcTransport>,
    tokens: TokenClients,
}

impl EthereumClient {
    pub fn new(config: &ChainConfig, transport: Arc<dyn JsonRpcTransport>) -> Self {
        let tokens = TokenClients::new(Blockchain::Ethereum)
            .with(Arc::new(Erc20Client::new(transport.clone())));

        Self {
            config: config.clone(),
            transport,
            tokens,
        }
    }

    /// Read-only contract call.
    ///
    /// `signature` is `name(inputTypes)` optionally followed by `:(outputTypes)`,
    /// e.g. `balanceOf(address):(uint256)`. Outputs are rendered as strings.
    pub async fn call_contract(
        &self,
        contract_address: &str,
        signature: &str,
        params: &[String],
    ) -> BlockchainResult<Vec<String>> {
        let function = parse_signature(signature)?;
        let data = encode_input(&function, params)?;
        let contract = parse_address(contract_address)?;

        let result = self
            .transport
            .call(
                "eth_call",
                json!([{ "to": contract, "data": alloy::hex::encode_prefixed(data) }, "latest"]),
            )
            .await?;

        let raw = result
            .as_str()
            .ok_or_else(|| BlockchainError::InvalidResponse("eth_call result is not a string".into()))?;
        let bytes = alloy::hex::decode(raw)
            .map_err(|e| BlockchainError::InvalidResponse(format!("eth_call result: {}", e)))?;
        let values = function
            .abi_decode_output(&bytes)
            .map_err(|e| BlockchainError::InvalidResponse(format!("decode {}: {}", function.name, e)))?;

        Ok(values.iter().map(display_value).collect())
    }

    async fn estimate_fees(&self, context: &FeeContext, token_type: TokenType) -> BlockchainResult<FeeOptions> {
        let gas_price = parse_quantity(&self.transport.call("eth_gasPrice", json!([])).await?)?;

        let target = match token_type {
            TokenType::Native => context.to.as_deref(),
            _ => context.contract_address.as_deref().or(context.to.as_deref()),
        };

        let gas_limit = match (context.from.as_deref(), target) {
            (Some(from), Some(to)) => {
                let mut request = json!({ "from": from, "to": to });
                if let Some(data) = &context.data {
                    request["data"] = json!(data);
                }
                if token_type == TokenType::Native {
                    if let Some(amount) = context.amount {
                        request["value"] = json!(format!("0x{:x}", amount));
                    }
                }
                parse_quantity(&self.transport.call("eth_estimateGas", json!([request])).await?)?
            }
            _ => U256::from(self.config.fee_defaults().gas_limit_for(token_type)),
        };

        Ok(FeeOptions::new(gas_price, gas_limit))
    }

    async fn lookup_status(&self, hash: &str) -> BlockchainResult<Option<TransactionStatus>> {
        let receipt = self.transport.call("eth_getTransactionReceipt", json!([hash])).await?;
        if let Some(status) = receipt_status(&receipt) {
            return Ok(Some(status));
        }

        let raw = self.transport.call("eth_getTransactionByHash", json!([hash])).await?;
        if raw.is_null() {
            Ok(None)
        } else {
            Ok(Some(TransactionStatus::Pending))
        }
    }
}

fn receipt_status(receipt: &Value) -> Option<TransactionStatus> {
    match receipt.get("status").and_then(Value::as_str) {
        Some("0x1") => Some(TransactionStatus::Success),
        Some(_) => Some(TransactionStatus::Failed),
        None => None,
    }
}

/// `name(types):(outputs)` → parsed function.
fn parse_signature(signature: &str) -> BlockchainResult<Function> {
    let (inputs, outputs) = match signature.split_once(':') {
        Some((inputs, outputs)) => (inputs.trim(), Some(outputs.trim())),
        None => (signature.trim(), None),
    };
    let human = match outputs {
        Some(outputs) if !outputs.is_empty() => format!("function {} returns {}", inputs, outputs),
        _ => format!("function {}", inputs),
    };
    Function::parse(&human)
        .map_err(|e| BlockchainError::InvalidResponse(format!("invalid signature '{}': {}", signature, e)))
}

/// ABI-encode string params against the function's declared input types.
pub(crate) fn encode_input(function: &Function, params: &[String]) -> BlockchainResult<Vec<u8>> {
    if function.inputs.len() != params.len() {
        return Err(BlockchainError::InvalidResponse(format!(
            "{} expects {} params, got {}",
            function.name,
            function.inputs.len(),
            params.len()
        )));
    }

    let mut values = Vec::with_capacity(params.len());
    for (input, value) in function.inputs.iter().zip(params) {
        let ty: DynSolType = input
            .ty
            .parse()
            .map_err(|e| BlockchainError::InvalidResponse(format!("type {}: {}", input.ty, e)))?;
        let coerced = ty
            .coerce_str(value)
            .map_err(|e| BlockchainError::InvalidResponse(format!("{} as {}: {}", value, input.ty, e)))?;
        values.push(coerced);
    }

    function
        .abi_encode_input(&values)
        .map_err(|e| BlockchainError::InvalidResponse(format!("encode {}: {}", function.name, e)))
}

/// Build a function from a method name and Solidity input types.
pub(crate) fn function_from_types(method: &str, types: &[&str]) -> BlockchainResult<Function> {
    parse_signature(&format!("{}({})", method, types.join(",")))
}

fn display_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Address(a) => a.to_string(),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Bytes(b) => alloy::hex::encode_prefixed(b),
        DynSolValue::FixedBytes(word, size) => alloy::hex::encode_prefixed(&word[..*size]),
        other => format!("{:?}", other),
    }
}

#[async_trait]
impl BlockchainClient for EthereumClient {
    fn blockchain(&self) -> Blockchain {
        Blockchain::Ethereum
    }

    fn chain_id(&self) -> &ChainId {
        &self.config.chain_id
    }

    fn dropped_tx_blocks_threshold(&self) -> u64 {
        self.config.dropped_tx_blocks_threshold
    }

    async fn get_balance(&self, address: &str) -> BlockchainResult<U256> {
        let address = parse_address(address)?;
        let result = self
            .transport
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_quantity(&result)
    }

    async fn get_nonce(&self, address: &str, _public_key: Option<&str>) -> BlockchainResult<u64> {
        let address = parse_address(address)?;
        let result = self
            .transport
            .call("eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        parse_quantity_u64(&result)
    }

    async fn get_current_block(&self) -> BlockchainResult<BlockInfo> {
        let block = self
            .transport
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;

        let number = parse_quantity_u64(&block["number"])?;
        let hash = block["hash"]
            .as_str()
            .ok_or_else(|| BlockchainError::InvalidResponse("block without hash".into()))?
            .to_string();

        Ok(BlockInfo { hash, number })
    }

    async fn send_transaction(&self, payload: &SignedPayload) -> BlockchainResult<BroadcastResult> {
        let raw = match payload {
            SignedPayload::Hex(raw) => raw,
            other => return Err(BlockchainError::UnsupportedPayload(Blockchain::Ethereum, other.encoding())),
        };

        match self.transport.call("eth_sendRawTransaction", json!([raw])).await {
            Ok(result) => {
                metrics::record_broadcast(Blockchain::Ethereum, "accepted");
                let tx_hash = result
                    .as_str()
                    .ok_or_else(|| BlockchainError::InvalidResponse("broadcast result is not a hash".into()))?
                    .to_string();
                tracing::info!(blockchain = %Blockchain::Ethereum, tx_hash = %tx_hash, "Transaction broadcast");
                Ok(BroadcastResult {
                    tx_hash,
                    raw_response: result,
                })
            }
            Err(e) => {
                metrics::record_broadcast(Blockchain::Ethereum, "rejected");
                Err(e.into_rejection())
            }
        }
    }

    async fn get_fees(&self, _tx_type: TransactionType, context: &FeeContext, token_type: TokenType) -> FeeOptions {
        match self.estimate_fees(context, token_type).await {
            Ok(fees) => fees,
            Err(e) => {
                tracing::warn!(blockchain = %Blockchain::Ethereum, error = %e, "Fee estimation failed, using defaults");
                metrics::record_fee_fallback(Blockchain::Ethereum);
                let defaults = self.config.fee_defaults();
                FeeOptions::from_u64(defaults.gas_price, defaults.gas_limit_for(token_type))
            }
        }
    }

    async fn get_transaction(&self, hash: &str, context: &StatusContext) -> BlockchainResult<Transaction> {
        let raw = self.transport.call("eth_getTransactionByHash", json!([hash])).await?;
        if raw.is_null() {
            return Err(BlockchainError::InvalidResponse(format!("transaction {} not found", hash)));
        }
        let receipt = self.transport.call("eth_getTransactionReceipt", json!([hash])).await?;

        let field = |name: &str| -> BlockchainResult<String> {
            raw[name]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| BlockchainError::InvalidResponse(format!("transaction without {}", name)))
        };

        let input = raw["input"].as_str().unwrap_or("0x").to_string();
        let fee_options = FeeOptions::new(parse_quantity(&raw["gasPrice"])?, parse_quantity(&raw["gas"])?);
        let status = receipt_status(&receipt).unwrap_or(TransactionStatus::Pending);
        let block = raw.get("blockNumber").filter(|b| !b.is_null()).map(parse_quantity_u64).transpose()?;

        let (token, additional_info) = match &context.cached {
            Some(cached) => (cached.token.clone(), cached.additional_info.clone()),
            None if input == "0x" => (
                TokenConfig::native(Blockchain::Ethereum, "ETH", 18),
                AdditionalInfo::Transfer(TransferInfo::default()),
            ),
            None => (
                TokenConfig::native(Blockchain::Ethereum, "ETH", 18),
                AdditionalInfo::ContractCall(ContractCallInfo {
                    call: ContractCall {
                        method: input.get(..10).unwrap_or_default().to_string(),
                        params: Vec::new(),
                        raw: input.clone(),
                    },
                    actions: Vec::new(),
                    outcome: None,
                }),
            ),
        };
        let tx_type = match &additional_info {
            AdditionalInfo::Transfer(_) => TransactionType::Transfer,
            _ if !token.is_native() => TransactionType::Transfer,
            _ => TransactionType::ContractCall,
        };

        let dates = context.cached.as_ref().map(|c| c.dates.clone()).unwrap_or_default();

        Ok(Transaction {
            id: Some(hash.to_string()),
            blockchain: Blockchain::Ethereum,
            chain_id: self.config.chain_id.clone(),
            tx_type,
            address: field("from")?,
            public_key: context.cached.as_ref().and_then(|c| c.public_key.clone()),
            to_address: context
                .cached
                .as_ref()
                .map(|c| c.to_address.clone())
                .map(Ok)
                .unwrap_or_else(|| field("to"))?,
            amount: context
                .cached
                .as_ref()
                .map(|c| Ok(c.amount))
                .unwrap_or_else(|| parse_quantity(&raw["value"]))?,
            token,
            fee_options: Some(fee_options),
            nonce: parse_quantity_u64(&raw["nonce"])?,
            status,
            broadcasted_on_block: context.broadcasted_on_block.or(block),
            block_hash: raw["blockHash"].as_str().map(str::to_string),
            dates,
            additional_info,
        })
    }

    async fn get_transaction_status(&self, hash: &str, context: &StatusContext) -> Option<TransactionStatus> {
        if let Some(cached) = context.cached.as_ref().filter(|c| c.status.is_terminal()) {
            return Some(cached.status);
        }
        let lookup = self.lookup_status(hash).await;
        finish_status_lookup(
            Blockchain::Ethereum,
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
