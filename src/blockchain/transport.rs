//! JSON-RPC transport with timeout, failover and error decoding.
//!
//! # Responsibilities
//! - POST JSON-RPC 2.0 envelopes to the chain endpoint
//! - Fail over to the next endpoint on network errors and timeouts
//! - Turn JSON-RPC error objects into `BlockchainError::Node`
//!
//! Node errors are answers, not outages: they are returned immediately and
//! never trigger failover.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::blockchain::types::{Blockchain, BlockchainError, BlockchainResult};
use crate::config::ChainConfig;
use crate::observability::metrics;

/// Uniform `call(method, params)` contract every chain adapter talks through.
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
    /// Perform one call and return the `result` member of the response.
    async fn call(&self, method: &str, params: Value) -> BlockchainResult<Value>;
}

/// HTTP(S) JSON-RPC transport with failover support.
pub struct HttpTransport {
    blockchain: Blockchain,
    client: reqwest::Client,
    /// Primary endpoint first, then failovers.
    endpoints: Vec<url::Url>,
    timeout_duration: Duration,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport from chain configuration.
    pub fn new(config: &ChainConfig) -> BlockchainResult<Self> {
        let mut endpoints = Vec::new();

        let primary: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        endpoints.push(primary);

        for url_str in &config.failover_urls {
            match url_str.parse() {
                Ok(url) => endpoints.push(url),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BlockchainError::Rpc(format!("HTTP client setup failed: {}", e)))?;

        tracing::debug!(
            blockchain = %config.blockchain,
            rpc_url = %config.rpc_url,
            failovers = endpoints.len() - 1,
            "JSON-RPC transport initialized"
        );

        Ok(Self {
            blockchain: config.blockchain,
            client,
            endpoints,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
            next_id: AtomicU64::new(1),
        })
    }

    /// Number of configured endpoints (primary + failovers).
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}

#[async_trait]
impl JsonRpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> BlockchainResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let fut = self.client.post(endpoint.clone()).json(&body).send();
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(response)) => match response.json::<Value>().await {
                    Ok(envelope) => {
                        let result = decode_response(envelope);
                        let outcome = if result.is_ok() { "ok" } else { "node_error" };
                        metrics::record_rpc_request(self.blockchain, method, outcome);
                        return result;
                    }
                    Err(e) => {
                        tracing::warn!(provider_idx = i, method, error = %e, "Malformed RPC response, trying next provider");
                    }
                },
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                }
            }
        }

        metrics::record_rpc_request(self.blockchain, method, "unreachable");
        Err(BlockchainError::Rpc(format!(
            "All RPC providers failed for {}",
            method
        )))
    }
}

/// Split a JSON-RPC envelope into its result or a node error.
pub fn decode_response(envelope: Value) -> BlockchainResult<Value> {
    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());

        let mut details = Vec::new();
        if let Some(data) = error.get("data").filter(|d| !d.is_null()) {
            details.push(data.as_str().map(str::to_string).unwrap_or_else(|| data.to_string()));
        }
        if let Some(cause) = error.get("cause").and_then(|c| c.get("name")).and_then(Value::as_str) {
            details.push(cause.to_string());
        }

        return Err(BlockchainError::Node {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message,
            data: if details.is_empty() { None } else { Some(details.join(" ")) },
        });
    }

    envelope
        .get("result")
        .cloned()
        .ok_or_else(|| BlockchainError::InvalidResponse("missing result".to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_result() {
        let value = decode_response(json!({"jsonrpc": "2.0", "id": 1, "result": "0x10"})).unwrap();
        assert_eq!(value, json!("0x10"));
    }

    #[test]
    fn test_decode_null_result() {
        let value = decode_response(json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_decode_node_error_with_cause() {
        let err = decode_response(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32000,
                "message": "Server error",
                "data": "account bob.near does not exist while viewing",
                "cause": {"name": "UNKNOWN_ACCOUNT"}
            }
        }))
        .unwrap_err();

        assert!(err.node_error_contains("does not exist"));
        assert!(err.node_error_contains("UNKNOWN_ACCOUNT"));
    }

    #[test]
    fn test_missing_result() {
        let err = decode_response(json!({"jsonrpc": "2.0", "id": 1})).unwrap_err();
        assert!(matches!(err, BlockchainError::InvalidResponse(_)));
    }

    #[test]
    fn test_invalid_primary_url() {
        let config = ChainConfig::new(Blockchain::Ethereum, "1", "not a url");
        assert!(HttpTransport::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_all_providers_unreachable() {
        let mut config = ChainConfig::new(Blockchain::Ethereum, "1", "http://127.0.0.1:1");
        config.failover_urls.push("http://127.0.0.1:2".to_string());
        config.rpc_timeout_secs = 1;

        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.endpoint_count(), 2);

        let result = transport.call("eth_blockNumber", json!([])).await;
        assert!(result.unwrap_err().to_string().contains("All RPC providers failed"));
    }
}
