//! End-to-end send pipeline against a mock Ethereum node over HTTP.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};

use chain_wallet_core::blockchain::client::BlockchainClient;
use chain_wallet_core::blockchain::types::{Blockchain, ChainId, SignedPayload, TokenConfig};
use chain_wallet_core::blockchain::ChainRegistry;
use chain_wallet_core::config::OrchestratorConfig;
use chain_wallet_core::orchestrator::{MemoryStore, TransactionOrchestrator, WalletState};
use chain_wallet_core::transaction::{AccountRef, TransactionBuilder, TransactionStatus, TransferIntent};
use chain_wallet_core::wallet::{CredentialPrompt, HdWalletProvider, Keyring, PromptOptions, SignerError};

use common::{chain_config, dead_addr, start_rpc_node, CallLog, RpcReply};

// Anvil's first account
const PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
const RECEIVER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

struct StaticPrompt;

#[async_trait]
impl CredentialPrompt for StaticPrompt {
    async fn get_password(&self, _: &str, _: &str, _: PromptOptions) -> Result<String, SignerError> {
        Ok("password".into())
    }
}

/// Node whose reported nonce stays at 5 no matter how much is sent.
fn lagging_node(gas_price_fails: bool) -> impl Fn(&str, &Value) -> RpcReply + Send + Sync + 'static {
    let sent = Arc::new(AtomicUsize::new(0));
    move |method, _params| match method {
        "eth_getTransactionCount" => Ok(json!("0x5")),
        "eth_gasPrice" if gas_price_fails => Err((-32603, "internal error".into())),
        "eth_gasPrice" => Ok(json!("0x3b9aca00")),
        "eth_estimateGas" => Ok(json!("0x5208")),
        "eth_getBlockByNumber" => Ok(json!({"number": "0x64", "hash": "0xbb"})),
        "eth_getBalance" => Ok(json!("0x0")),
        "eth_sendRawTransaction" => {
            let n = sent.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!(format!("0x{:064x}", n)))
        }
        // Broadcast transactions stay in the mempool.
        "eth_getTransactionReceipt" => Ok(Value::Null),
        "eth_getTransactionByHash" => Ok(json!({"hash": "0x01", "blockNumber": null})),
        _ => Ok(Value::Null),
    }
}

async fn setup(gas_price_fails: bool) -> (TransactionOrchestrator, Arc<MemoryStore>, ChainRegistry, CallLog) {
    let (addr, log) = start_rpc_node(lagging_node(gas_price_fails)).await;
    let config = chain_config(Blockchain::Ethereum, "1", addr);

    let mut registry = ChainRegistry::new(Vec::new());
    registry.register_chain(
        &config,
        Arc::new(chain_wallet_core::blockchain::HttpTransport::new(&config).unwrap()),
    );

    let keyring = Keyring::from_private_key(Blockchain::Ethereum, PRIVATE_KEY).unwrap();
    let signer = HdWalletProvider::new(Arc::new(StaticPrompt), Arc::new(keyring), registry.clone());
    let store = Arc::new(MemoryStore::new(None));
    let orchestrator = TransactionOrchestrator::new(
        registry.clone(),
        Arc::new(signer),
        store.clone(),
        store.clone(),
        OrchestratorConfig::default(),
    );
    (orchestrator, store, registry, log)
}

fn transfer(amount: u64) -> TransferIntent {
    TransferIntent {
        account: AccountRef::new(Blockchain::Ethereum, ADDRESS),
        chain_id: ChainId::from("1"),
        to_address: RECEIVER.into(),
        amount: U256::from(amount),
        token: TokenConfig::native(Blockchain::Ethereum, "ETH", 18),
        fee_options: None,
    }
}

#[tokio::test]
async fn test_nonces_stay_monotonic_with_lagging_node() {
    let (orchestrator, store, _, log) = setup(false).await;
    let account = AccountRef::new(Blockchain::Ethereum, ADDRESS);

    let mut nonces = Vec::new();
    for i in 0..4 {
        let tx = orchestrator.build_transfer_transaction(&transfer(1_000 + i)).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Created);
        let sent = orchestrator.send_transaction(&account, tx).await.unwrap();
        assert_eq!(sent.status, TransactionStatus::Pending);
        assert!(sent.dates.signed.is_some());
        nonces.push(sent.nonce);
    }

    assert_eq!(nonces, vec![5, 6, 7, 8]);
    assert_eq!(log.count("eth_sendRawTransaction"), 4);
    assert_eq!(store.pending_count(Blockchain::Ethereum, ADDRESS), 4);
}

#[tokio::test]
async fn test_fee_estimation_failure_falls_back_to_defaults() {
    let (orchestrator, _, _, _) = setup(true).await;
    let tx = orchestrator.build_transfer_transaction(&transfer(1)).await.unwrap();

    let fees = tx.fee_options.unwrap();
    assert_eq!(fees.gas_price(), U256::from(20_000_000_000u64));
    assert_eq!(fees.fee_total(), fees.gas_price() * fees.gas_limit());
}

#[tokio::test]
async fn test_signing_is_idempotent() {
    let (orchestrator, _, registry, _) = setup(false).await;
    let tx = orchestrator.build_transfer_transaction(&transfer(7)).await.unwrap();

    let builder = registry.builder(Blockchain::Ethereum).unwrap();
    let first = builder.sign(&tx, PRIVATE_KEY).unwrap();
    let second = builder.sign(&tx, PRIVATE_KEY).unwrap();
    assert_eq!(first, second);
    assert!(matches!(first, SignedPayload::Hex(ref raw) if raw.starts_with("0x")));
}

#[tokio::test]
async fn test_insufficient_funds_detected_before_signing() {
    let (orchestrator, _, _, log) = setup(false).await;
    let tx = orchestrator.build_transfer_transaction(&transfer(1)).await.unwrap();

    let check = orchestrator.check_available_funds(&tx).await.unwrap();
    assert!(check.insufficient_funds);
    assert!(!check.is_sufficient());
    assert_eq!(log.count("eth_sendRawTransaction"), 0);
}

#[tokio::test]
async fn test_failover_endpoint_is_used() {
    let (live, log) = start_rpc_node(lagging_node(false)).await;
    let mut config = chain_config(Blockchain::Ethereum, "1", dead_addr().await);
    config.failover_urls.push(format!("http://{}", live));

    let mut registry = ChainRegistry::default();
    registry.register_chain(
        &config,
        Arc::new(chain_wallet_core::blockchain::HttpTransport::new(&config).unwrap()),
    );
    let block = registry
        .client(Blockchain::Ethereum)
        .unwrap()
        .get_current_block()
        .await
        .unwrap();
    assert_eq!(block.number, 100);
    assert_eq!(log.count("eth_getBlockByNumber"), 1);
}
