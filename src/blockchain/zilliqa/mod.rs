//! Zilliqa adapter.
//!
//! # Data Flow
//! ```text
//! ZilliqaClient ──call──▶ JsonRpcTransport (GetBalance, CreateTransaction, ...)
//!     ├── Zrc2Client (balances substate, Scilla `Transfer` messages)
//!     ├── ZilliqaStaking (staking proxy ─▶ implementation substate)
//!     └── ZilliqaBuilder (CreateTransaction bodies, signed via `signing`)
//! ```
//!
//! # Design Decisions
//! - Transactions are signed locally: Schnorr over the protobuf core fields,
//!   with a nonce derived from the key and message
//! - Contract calls are Scilla JSON messages (`_tag` + typed `params`)

pub mod address;
pub mod builder;
pub mod client;
pub mod signing;
pub mod staking;
pub mod zrc2;

pub use builder::ZilliqaBuilder;
pub use client::ZilliqaClient;
pub use staking::ZilliqaStaking;
pub use zrc2::Zrc2Client;

use alloy::primitives::U256;
use serde_json::{json, Value};

use crate::blockchain::transport::JsonRpcTransport;
use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Read one field (optionally narrowed by map keys) of a contract's state.
pub(crate) async fn smart_contract_sub_state(
    transport: &dyn JsonRpcTransport,
    contract_address: &str,
    field: &str,
    sub_fields: &[String],
) -> BlockchainResult<Value> {
    let contract = address::to_rpc(contract_address)?;
    transport
        .call("GetSmartContractSubState", json!([contract, field, sub_fields]))
        .await
}

/// Zilliqa reports Uint128 values as decimal strings.
pub(crate) fn parse_decimal(value: &Value) -> BlockchainResult<U256> {
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

pub(crate) fn scilla_param(vname: &str, type_name: &str, value: impl Into<String>) -> Value {
    json!({ "vname": vname, "type": type_name, "value": value.into() })
}

/// Serialized Scilla message, as carried in a transaction's `data`.
pub(crate) fn scilla_message(tag: &str, params: Vec<Value>) -> String {
    json!({ "_tag": tag, "params": params }).to_string()
}
