//! Staking flows over mock NEAR and Zilliqa nodes.

mod common;

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};

use chain_wallet_core::blockchain::client::BlockchainClient;
use chain_wallet_core::blockchain::near::encoding::public_key_of;
use chain_wallet_core::blockchain::types::{Blockchain, ChainId, TokenConfig};
use chain_wallet_core::blockchain::zilliqa::{ZilliqaClient, ZilliqaStaking};
use chain_wallet_core::blockchain::{ChainRegistry, HttpTransport};
use chain_wallet_core::config::{ChainConfig, OrchestratorConfig};
use chain_wallet_core::orchestrator::{MemoryStore, TransactionOrchestrator, WalletState};
use chain_wallet_core::transaction::intent::PosExtraFields;
use chain_wallet_core::transaction::types::{PosActionType, StakingAction, TransactionError, ValidatorRef};
use chain_wallet_core::transaction::{AccountRef, PosTransactionIntent, Transaction, TransactionStatus};
use chain_wallet_core::wallet::{
    CredentialPrompt, HdWalletProvider, Keyring, PromptOptions, SignerError, TransactionSigner,
};

use common::{chain_config, start_rpc_node, CallLog, RpcReply};

const NEAR_ACCOUNT: &str = "alice.testnet";

const ZIL_PROXY: &str = "0x1111111111111111111111111111111111111111";
const ZIL_IMPLEMENTATION: &str = "0x2222222222222222222222222222222222222222";
const ZIL_ACCOUNT: &str = "0x9bfec715a6bd658fcb62b0f8cc9bfa2ade71434a";
const ZIL_PRIVATE_KEY: &str = "e19d05c5452598e24caad4a0d85a49146f7be089515c905ae6a19e8a578a6930";
const SSNS: [&str; 3] = [
    "0x3333333333333333333333333333333333333333",
    "0x4444444444444444444444444444444444444444",
    "0x5555555555555555555555555555555555555555",
];

struct StaticPrompt;

#[async_trait]
impl CredentialPrompt for StaticPrompt {
    async fn get_password(&self, _: &str, _: &str, _: PromptOptions) -> Result<String, SignerError> {
        Ok("password".into())
    }
}

fn orchestrator(
    registry: ChainRegistry,
    signer: Arc<dyn TransactionSigner>,
    config: OrchestratorConfig,
) -> (TransactionOrchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(None));
    let orchestrator = TransactionOrchestrator::new(registry, signer, store.clone(), store.clone(), config);
    (orchestrator, store)
}

fn registry_for(config: &ChainConfig) -> ChainRegistry {
    let mut registry = ChainRegistry::new(Vec::new());
    registry.register_chain(config, Arc::new(HttpTransport::new(config).unwrap()));
    registry
}

// --- NEAR ---

fn near_secret() -> String {
    format!("ed25519:{}", bs58::encode([3u8; 32]).into_string())
}

fn near_node(access_key_nonce: u64) -> impl Fn(&str, &Value) -> RpcReply + Send + Sync + 'static {
    let block_hash = bs58::encode([7u8; 32]).into_string();
    move |method, params| match method {
        "query" => match params["request_type"].as_str() {
            Some("view_access_key") => Ok(json!({"nonce": access_key_nonce, "permission": "FullAccess"})),
            _ => Ok(json!({"amount": "5000000000000000000000000", "locked": "0"})),
        },
        "block" => Ok(json!({"header": {"hash": block_hash, "height": 1200}})),
        "gas_price" => Ok(json!({"gas_price": "100000000"})),
        "broadcast_tx_commit" => {
            let hash = bs58::encode(params[0].as_str().unwrap_or_default().as_bytes()).into_string();
            Ok(json!({"transaction": {"hash": hash}, "status": {"SuccessValue": ""}}))
        }
        other => Err((-32601, format!("unexpected method {}", other))),
    }
}

async fn near_setup() -> (TransactionOrchestrator, Arc<MemoryStore>, CallLog) {
    let (addr, log) = start_rpc_node(near_node(4)).await;
    let config = chain_config(Blockchain::Near, "testnet", addr);
    let registry = registry_for(&config);

    let keyring = Keyring::from_private_key(Blockchain::Near, &near_secret()).unwrap();
    let signer = HdWalletProvider::new(Arc::new(StaticPrompt), Arc::new(keyring), registry.clone());
    let policy = OrchestratorConfig {
        batch_confirmation_polls: 0,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, store) = orchestrator(registry, Arc::new(signer), policy);
    (orchestrator, store, log)
}

fn near_intent(validators: &[&str]) -> PosTransactionIntent {
    PosTransactionIntent {
        account: AccountRef::new(Blockchain::Near, NEAR_ACCOUNT).with_public_key(&public_key_of(&near_secret()).unwrap()),
        chain_id: ChainId::from("testnet"),
        amount: U256::from(10u64).pow(U256::from(24)),
        fee_options: None,
        validators: validators.iter().map(|v| ValidatorRef::new(v, v)).collect(),
        token: TokenConfig::native(Blockchain::Near, "NEAR", 24),
        extra: PosExtraFields::default(),
    }
}

#[tokio::test]
async fn test_near_delegation_sends_deposit_and_stake_in_nonce_order() {
    let (orchestrator, store, log) = near_setup().await;
    let intent = near_intent(&["a.pool.testnet", "b.pool.testnet"]);

    let mut session = orchestrator.start_batch(&intent, PosActionType::Delegate).await.unwrap();
    let actions: Vec<_> = session.transactions().iter().filter_map(Transaction::staking_action).collect();
    assert_eq!(
        actions,
        vec![StakingAction::Deposit, StakingAction::Stake, StakingAction::Deposit, StakingAction::Stake]
    );
    assert_eq!(session.transactions()[0].to_address, "a.pool.testnet");
    assert_eq!(session.transactions()[2].to_address, "b.pool.testnet");

    let statuses = orchestrator.sign_and_send_batch(&mut session).await.unwrap();
    assert!(session.is_complete());
    assert_eq!(statuses, vec![TransactionStatus::Pending; 4]);

    let nonces: Vec<u64> = session.transactions().iter().map(|t| t.nonce).collect();
    assert_eq!(nonces, vec![5, 6, 7, 8]);
    for tx in session.transactions() {
        let fees = tx.fee_options.as_ref().unwrap();
        assert_eq!(fees.gas_price(), U256::from(100_000_000u64));
        assert_eq!(fees.fee_total(), fees.gas_price() * fees.gas_limit());
        assert!(tx.id.is_some());
    }

    // Nonce, block and fees are read once for the whole batch.
    assert!(log.count("block") >= 1);
    assert_eq!(log.count("gas_price"), 1);
    assert_eq!(log.count("broadcast_tx_commit"), 4);
    assert_eq!(store.pending_count(Blockchain::Near, NEAR_ACCOUNT), 4);
}

#[tokio::test]
async fn test_near_three_validators_reserve_six_consecutive_nonces() {
    let (orchestrator, _, _) = near_setup().await;
    let intent = near_intent(&["a.pool.testnet", "b.pool.testnet", "c.pool.testnet"]);

    let transactions = orchestrator
        .build_pos_transaction(&intent, PosActionType::Delegate)
        .await
        .unwrap();
    let nonces: Vec<u64> = transactions.iter().map(|t| t.nonce).collect();
    assert_eq!(nonces, (5..11).collect::<Vec<u64>>());
    assert!(transactions.iter().all(|t| t.status == TransactionStatus::Created));
}

#[tokio::test]
async fn test_near_claim_reward_is_unsupported() {
    let (orchestrator, _, log) = near_setup().await;
    let err = orchestrator
        .build_pos_transaction(&near_intent(&["a.pool.testnet"]), PosActionType::ClaimReward)
        .await
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("claim"));
    assert_eq!(log.count("query"), 0);
}

// --- Zilliqa ---

#[derive(Clone, Copy, Default)]
struct ZilScript {
    unfunded: bool,
    state_fails: bool,
    reject_nonce: Option<u64>,
}

fn zilliqa_node(script: ZilScript) -> impl Fn(&str, &Value) -> RpcReply + Send + Sync + 'static {
    move |method, params| match method {
        "GetBalance" if script.unfunded => Err((-5, "Account is not created".into())),
        "GetBalance" => Ok(json!({"balance": "5000000000000000", "nonce": 4})),
        "GetSmartContractSubState" => {
            let field = params[1].as_str().unwrap_or_default();
            match field {
                "implementation" => Ok(json!({ "implementation": ZIL_IMPLEMENTATION })),
                _ if script.state_fails => Err((-5, "Address not contract address".into())),
                "mindelegstake" => Ok(json!({"mindelegstake": "10000000000000"})),
                "lastrewardcycle" => Ok(json!({"lastrewardcycle": "12"})),
                other => Ok(json!({ other: {} })),
            }
        }
        "GetMinimumGasPrice" => Ok(json!("2000000000")),
        "GetLatestTxBlock" => Ok(json!({"header": {"BlockNum": "2500"}, "body": {"BlockHash": "f1e2d3"}})),
        "CreateTransaction" => {
            let nonce = params[0]["nonce"].as_u64().unwrap_or_default();
            if Some(nonce) == script.reject_nonce {
                return Err((-8, "transaction underpriced".into()));
            }
            Ok(json!({"Info": "Contract Txn, Sent To Ds", "TranID": format!("{:064x}", nonce)}))
        }
        "GetTransaction" => Ok(json!({"receipt": {"success": true}, "data": ""})),
        other => Err((-32601, format!("unexpected method {}", other))),
    }
}

async fn zilliqa_setup(script: ZilScript) -> (TransactionOrchestrator, Arc<MemoryStore>, ChainConfig, CallLog) {
    let (addr, log) = start_rpc_node(zilliqa_node(script)).await;
    let mut config = chain_config(Blockchain::Zilliqa, "333", addr);
    config.contracts.insert("staking".into(), ZIL_PROXY.into());
    let registry = registry_for(&config);

    let policy = OrchestratorConfig {
        batch_confirmation_polls: 2,
        status_poll_base_ms: 0,
        status_poll_max_ms: 0,
        ..OrchestratorConfig::default()
    };
    let keyring = Keyring::from_private_key(Blockchain::Zilliqa, ZIL_PRIVATE_KEY).unwrap();
    let signer = HdWalletProvider::new(Arc::new(StaticPrompt), Arc::new(keyring), registry.clone());
    let (orchestrator, store) = orchestrator(registry, Arc::new(signer), policy);
    (orchestrator, store, config, log)
}

fn zilliqa_intent(validators: &[&str]) -> PosTransactionIntent {
    PosTransactionIntent {
        account: AccountRef::new(Blockchain::Zilliqa, ZIL_ACCOUNT),
        chain_id: ChainId::from("333"),
        amount: U256::from(20_000_000_000_000u64),
        fee_options: None,
        validators: validators.iter().map(|v| ValidatorRef::new(v, v)).collect(),
        token: TokenConfig::native(Blockchain::Zilliqa, "ZIL", 12),
        extra: PosExtraFields::default(),
    }
}

#[tokio::test]
async fn test_zilliqa_unfunded_account() {
    let (orchestrator, _, _, _) = zilliqa_setup(ZilScript {
        unfunded: true,
        ..ZilScript::default()
    })
    .await;

    let updates = orchestrator
        .get_balance(Blockchain::Zilliqa, ZIL_ACCOUNT, Some("ZIL"), true)
        .await
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].balance, U256::ZERO);

    let client = orchestrator.registry().client(Blockchain::Zilliqa).unwrap();
    assert_eq!(client.get_nonce(ZIL_ACCOUNT, None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_zilliqa_eligibility_fails_closed() {
    let (orchestrator, _, config, log) = zilliqa_setup(ZilScript {
        state_fails: true,
        ..ZilScript::default()
    })
    .await;

    let transport = Arc::new(HttpTransport::new(&config).unwrap());
    let staking = ZilliqaStaking::new(Arc::new(ZilliqaClient::new(&config, transport)));
    assert!(!staking.can_unstake_from_ssn(ZIL_ACCOUNT, SSNS[0]).await);
    assert!(!staking.can_withdraw_stake_rewards_from_ssn(ZIL_ACCOUNT, SSNS[0]).await);

    let err = orchestrator
        .build_pos_transaction(&zilliqa_intent(&SSNS[..1]), PosActionType::Unstake)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        chain_wallet_core::orchestrator::OrchestratorError::Transaction(TransactionError::NotEligible {
            action: PosActionType::Unstake,
            ..
        })
    ));
    assert_eq!(err.user_message().body, "LoadingModal.NOT_ELIGIBLE");
    // Refused before any nonce was queried.
    assert_eq!(log.count("GetBalance"), 0);
}

#[tokio::test]
async fn test_zilliqa_batch_failure_drops_the_rest() {
    let (orchestrator, store, _, log) = zilliqa_setup(ZilScript {
        reject_nonce: Some(6),
        ..ZilScript::default()
    })
    .await;

    let mut session = orchestrator
        .start_batch(&zilliqa_intent(&SSNS), PosActionType::Delegate)
        .await
        .unwrap();
    let nonces: Vec<u64> = session.transactions().iter().map(|t| t.nonce).collect();
    assert_eq!(nonces, vec![5, 6, 7]);

    let err = orchestrator.sign_and_send_batch(&mut session).await.unwrap_err();
    assert_eq!(err.message_key(), "TR_UNDERPRICED");
    assert!(session.is_complete());
    assert_eq!(
        session.statuses(),
        vec![TransactionStatus::Success, TransactionStatus::Failed, TransactionStatus::Dropped]
    );

    // The third transaction was never broadcast.
    assert_eq!(log.count("CreateTransaction"), 2);
    for body in log.params("CreateTransaction") {
        assert_eq!(body[0]["pubKey"].as_str().unwrap().len(), 66);
        assert_eq!(body[0]["signature"].as_str().unwrap().len(), 128);
    }
    let first = session.transactions()[0].id.clone().unwrap();
    let stored = store.transaction(Blockchain::Zilliqa, &first).unwrap();
    assert_eq!(stored.status, TransactionStatus::Success);
}
