//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wallet_rpc_requests_total` (counter): JSON-RPC calls by chain, method, outcome
//! - `wallet_fee_fallback_total` (counter): fee estimations that fell back to defaults
//! - `wallet_transactions_broadcast_total` (counter): broadcasts by chain, outcome
//! - `wallet_nonce_conflicts_total` (counter): nonce bumps caused by known transactions
//! - `wallet_balance_refresh_total` (counter): balance refreshes by chain, outcome
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_metrics`].

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::blockchain::types::Blockchain;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc_request(blockchain: Blockchain, method: &str, outcome: &'static str) {
    metrics::counter!(
        "wallet_rpc_requests_total",
        "blockchain" => blockchain.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_fee_fallback(blockchain: Blockchain) {
    metrics::counter!("wallet_fee_fallback_total", "blockchain" => blockchain.to_string()).increment(1);
}

pub fn record_broadcast(blockchain: Blockchain, outcome: &'static str) {
    metrics::counter!(
        "wallet_transactions_broadcast_total",
        "blockchain" => blockchain.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_nonce_conflict(blockchain: Blockchain) {
    metrics::counter!("wallet_nonce_conflicts_total", "blockchain" => blockchain.to_string()).increment(1);
}

pub fn record_balance_refresh(blockchain: Blockchain, outcome: &'static str) {
    metrics::counter!(
        "wallet_balance_refresh_total",
        "blockchain" => blockchain.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
