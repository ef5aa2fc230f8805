//! Zilliqa seed-node (SSN) delegation.
//!
//! The configured `staking` contract is a proxy: every message goes to it,
//! while the state (cycles, minimum stake) lives in its implementation
//! contract. The implementation address is looked up once per instance.

use std::sync::Arc;

use alloy::primitives::U256;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::blockchain::client::{BlockchainClient, FeeContext};
use crate::blockchain::types::{BlockchainError, BlockchainResult, FeeOptions, TokenType};
use crate::blockchain::zilliqa::client::ZilliqaClient;
use crate::blockchain::zilliqa::{address, parse_decimal, scilla_message, scilla_param};
use crate::transaction::builder::{Draft, NonceSequence};
use crate::transaction::intent::PosTransactionIntent;
use crate::transaction::types::{
    AdditionalInfo, ContractCall, StakingAction, StakingInfo, Transaction, TransactionResult, TransactionType,
    ValidatorRef,
};

const STAKING_CONTRACT: &str = "staking";

const IMPLEMENTATION: &str = "implementation";
const MIN_DELEGATE_STAKE: &str = "mindelegstake";
const LAST_REWARD_CYCLE: &str = "lastrewardcycle";
const LAST_BUF_DEPOSIT_CYCLE_DELEG: &str = "last_buf_deposit_cycle_deleg";
const LAST_WITHDRAW_CYCLE_DELEG: &str = "last_withdraw_cycle_deleg";

/// Nonces and fees shared by every transaction of one staking request.
pub struct StakingBatch<'a> {
    intent: &'a PosTransactionIntent,
    contract: String,
    nonces: NonceSequence,
    fees: FeeOptions,
    transactions: Vec<Transaction>,
}

impl StakingBatch<'_> {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn finish(self) -> Vec<Transaction> {
        self.transactions
    }
}

pub struct ZilliqaStaking {
    client: Arc<ZilliqaClient>,
    implementation: OnceCell<String>,
}

impl ZilliqaStaking {
    pub fn new(client: Arc<ZilliqaClient>) -> Self {
        Self {
            client,
            implementation: OnceCell::new(),
        }
    }

    /// Address of the staking proxy's implementation contract.
    pub async fn contract_implementation(&self) -> BlockchainResult<&str> {
        let implementation = self
            .implementation
            .get_or_try_init(|| async {
                let proxy = self.client.contract(STAKING_CONTRACT)?;
                let state = self.client.get_smart_contract_sub_state(proxy, IMPLEMENTATION, &[]).await?;
                let implementation = state[IMPLEMENTATION]
                    .as_str()
                    .ok_or_else(|| BlockchainError::InvalidResponse("staking proxy without implementation".into()))?;
                tracing::debug!(proxy = %proxy, implementation = %implementation, "Staking implementation resolved");
                Ok::<_, BlockchainError>(implementation.to_string())
            })
            .await?;
        Ok(implementation.as_str())
    }

    pub async fn min_delegate_stake(&self) -> BlockchainResult<U256> {
        let implementation = self.contract_implementation().await?;
        let state = self
            .client
            .get_smart_contract_sub_state(implementation, MIN_DELEGATE_STAKE, &[])
            .await?;
        parse_decimal(&state[MIN_DELEGATE_STAKE])
    }

    /// Unstaking needs a reward cycle to have passed since the last buffered deposit.
    ///
    /// Any failed lookup answers `false`.
    pub async fn can_unstake_from_ssn(&self, account: &str, ssn: &str) -> bool {
        match self.cycles(account, ssn, false).await {
            Ok(cycles) => cycles.last_reward > cycles.last_buffered_deposit,
            Err(e) => {
                tracing::debug!(account = %account, ssn = %ssn, error = %e, "Unstake eligibility unknown");
                false
            }
        }
    }

    /// Like [`Self::can_unstake_from_ssn`], and rewards not yet withdrawn this cycle.
    pub async fn can_withdraw_stake_rewards_from_ssn(&self, account: &str, ssn: &str) -> bool {
        match self.cycles(account, ssn, true).await {
            Ok(cycles) => {
                cycles.last_reward > cycles.last_buffered_deposit && cycles.last_reward != cycles.last_withdraw
            }
            Err(e) => {
                tracing::debug!(account = %account, ssn = %ssn, error = %e, "Reward eligibility unknown");
                false
            }
        }
    }

    async fn cycles(&self, account: &str, ssn: &str, with_withdraw: bool) -> BlockchainResult<Cycles> {
        let account = address::to_hex(account)?;
        let ssn = address::to_hex(ssn)?;
        let implementation = self.contract_implementation().await?;
        let keyed = [account.clone()];

        let (reward, deposit, withdraw) = tokio::try_join!(
            self.client.get_smart_contract_sub_state(implementation, LAST_REWARD_CYCLE, &[]),
            self.client
                .get_smart_contract_sub_state(implementation, LAST_BUF_DEPOSIT_CYCLE_DELEG, &keyed),
            async {
                if with_withdraw {
                    self.client
                        .get_smart_contract_sub_state(implementation, LAST_WITHDRAW_CYCLE_DELEG, &keyed)
                        .await
                } else {
                    Ok(Value::Null)
                }
            },
        )?;

        let last_reward = parse_cycle(&reward[LAST_REWARD_CYCLE])
            .ok_or_else(|| BlockchainError::InvalidResponse("missing lastrewardcycle".into()))?;

        let last_buffered_deposit = delegator_cycle(&deposit, LAST_BUF_DEPOSIT_CYCLE_DELEG, &account, &ssn)
            .ok_or_else(|| BlockchainError::InvalidResponse(format!("missing {}", LAST_BUF_DEPOSIT_CYCLE_DELEG)))?;
        let last_withdraw = if with_withdraw {
            delegator_cycle(&withdraw, LAST_WITHDRAW_CYCLE_DELEG, &account, &ssn)
                .ok_or_else(|| BlockchainError::InvalidResponse(format!("missing {}", LAST_WITHDRAW_CYCLE_DELEG)))?
        } else {
            0
        };

        Ok(Cycles {
            last_reward,
            last_buffered_deposit,
            last_withdraw,
        })
    }

    /// Query the nonce and fees once for a whole request.
    pub async fn begin<'a>(&self, intent: &'a PosTransactionIntent) -> TransactionResult<StakingBatch<'a>> {
        intent.validate()?;
        let contract = self.client.contract(STAKING_CONTRACT)?.to_string();
        let account = &intent.account;
        let base = self
            .client
            .get_nonce(&account.address, account.public_key.as_deref())
            .await?;

        let fees = match &intent.fee_options {
            Some(fees) => fees.clone(),
            None => {
                let context = FeeContext {
                    from: Some(account.address.clone()),
                    amount: Some(intent.amount),
                    contract_address: Some(contract.clone()),
                    ..FeeContext::default()
                };
                self.client
                    .get_fees(TransactionType::ContractCall, &context, TokenType::Zrc2)
                    .await
            }
        };

        Ok(StakingBatch {
            intent,
            contract,
            nonces: NonceSequence::starting_at(base),
            fees,
            transactions: Vec::new(),
        })
    }

    /// `DelegateStake` attaches the stake as the transaction amount.
    pub fn delegate_stake(&self, batch: &mut StakingBatch<'_>, validator: &ValidatorRef) -> TransactionResult<()> {
        let ssn = address::to_hex(&validator.id)?;
        let amount = batch.intent.amount;
        let raw = scilla_message("DelegateStake", vec![scilla_param("ssnaddr", "ByStr20", ssn)]);
        push(batch, validator, StakingAction::Stake, "DelegateStake", raw, amount);
        Ok(())
    }

    pub fn redelegate_stake(
        &self,
        batch: &mut StakingBatch<'_>,
        from: &ValidatorRef,
        to: &ValidatorRef,
    ) -> TransactionResult<()> {
        let amount = batch.intent.amount.to_string();
        let raw = scilla_message(
            "ReDelegateStake",
            vec![
                scilla_param("ssnaddr", "ByStr20", address::to_hex(&from.id)?),
                scilla_param("to_ssn", "ByStr20", address::to_hex(&to.id)?),
                scilla_param("amount", "Uint128", amount),
            ],
        );
        push(batch, to, StakingAction::Stake, "ReDelegateStake", raw, U256::ZERO);
        Ok(())
    }

    pub fn withdraw_stake_amount(
        &self,
        batch: &mut StakingBatch<'_>,
        validator: &ValidatorRef,
    ) -> TransactionResult<()> {
        let amount = batch.intent.amount.to_string();
        let raw = scilla_message(
            "WithdrawStakeAmt",
            vec![
                scilla_param("ssnaddr", "ByStr20", address::to_hex(&validator.id)?),
                scilla_param("amt", "Uint128", amount),
            ],
        );
        push(batch, validator, StakingAction::Unstake, "WithdrawStakeAmt", raw, U256::ZERO);
        Ok(())
    }

    pub fn withdraw_stake_rewards(
        &self,
        batch: &mut StakingBatch<'_>,
        validator: &ValidatorRef,
    ) -> TransactionResult<()> {
        let raw = scilla_message(
            "WithdrawStakeRewards",
            vec![scilla_param("ssnaddr", "ByStr20", address::to_hex(&validator.id)?)],
        );
        push(batch, validator, StakingAction::ClaimReward, "WithdrawStakeRewards", raw, U256::ZERO);
        Ok(())
    }

    /// Collect every unbonded stake; not tied to a validator.
    pub fn complete_withdrawal(&self, batch: &mut StakingBatch<'_>) {
        let raw = scilla_message("CompleteWithdrawal", Vec::new());
        let contract = ValidatorRef::new(&batch.contract, STAKING_CONTRACT);
        push(batch, &contract, StakingAction::Withdraw, "CompleteWithdrawal", raw, U256::ZERO);
    }
}

struct Cycles {
    last_reward: u64,
    last_buffered_deposit: u64,
    last_withdraw: u64,
}

fn parse_cycle(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// `{field: {delegator: {ssn: cycle}}}`.
///
/// `None` when the field itself is missing or null. A present field
/// without an entry for this delegator and SSN counts as cycle 0.
fn delegator_cycle(state: &Value, field: &str, delegator: &str, ssn: &str) -> Option<u64> {
    let entries = state.get(field).filter(|v| !v.is_null())?;
    Some(parse_cycle(&entries[delegator][ssn]).unwrap_or_default())
}

fn push(
    batch: &mut StakingBatch<'_>,
    validator: &ValidatorRef,
    action: StakingAction,
    tag: &str,
    raw: String,
    amount: U256,
) {
    let intent = batch.intent;
    let call = ContractCall {
        method: tag.to_string(),
        params: vec![validator.id.clone(), intent.amount.to_string()],
        raw,
    };
    let info = AdditionalInfo::Staking(StakingInfo {
        action,
        validator: Some(validator.clone()),
        call,
        actions: Vec::new(),
    });

    let tx = Draft {
        account: &intent.account,
        chain_id: &intent.chain_id,
        tx_type: TransactionType::ContractCall,
        to_address: &batch.contract,
        amount,
        token: &intent.token,
    }
    .into_transaction(info)
    .with_nonce(batch.nonces.reserve())
    .with_fee_options(batch.fees.clone());

    batch.transactions.push(tx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transport::testing::ScriptedTransport;
    use crate::blockchain::types::{Blockchain, ChainId, TokenConfig};
    use crate::config::ChainConfig;
    use crate::transaction::intent::{AccountRef, PosExtraFields};
    use serde_json::json;

    const PROXY: &str = "0x1111111111111111111111111111111111111111";
    const IMPL: &str = "0x2222222222222222222222222222222222222222";
    const ACCOUNT: &str = "0x9bfec715a6bd658fcb62b0f8cc9bfa2ade71434a";
    const SSN: &str = "0x3333333333333333333333333333333333333333";

    fn setup<F>(state: F) -> (ZilliqaStaking, Arc<ScriptedTransport>)
    where
        F: Fn(&str) -> BlockchainResult<Value> + Send + Sync + 'static,
    {
        let transport = Arc::new(ScriptedTransport::new(move |method, params| match method {
            "GetSmartContractSubState" => state(params[1].as_str().unwrap_or_default()),
            "GetBalance" => Ok(json!({"balance": "0", "nonce": 4})),
            "GetMinimumGasPrice" => Ok(json!("2000000000")),
            other => panic!("unexpected call {}", other),
        }));
        let mut config = ChainConfig::new(Blockchain::Zilliqa, 333u64, "https://dev-api.zilliqa.com");
        config.contracts.insert(STAKING_CONTRACT.into(), PROXY.into());
        let client = Arc::new(ZilliqaClient::new(&config, transport.clone()));
        (ZilliqaStaking::new(client), transport)
    }

    fn cycles(
        reward: &str,
        deposit: Option<&str>,
        withdraw: Option<&str>,
    ) -> impl Fn(&str) -> BlockchainResult<Value> + Send + Sync + 'static {
        let reward = reward.to_string();
        let deposit = deposit.map(str::to_string);
        let withdraw = withdraw.map(str::to_string);
        move |field| match field {
            IMPLEMENTATION => Ok(json!({ IMPLEMENTATION: IMPL })),
            LAST_REWARD_CYCLE => Ok(json!({ LAST_REWARD_CYCLE: reward })),
            LAST_BUF_DEPOSIT_CYCLE_DELEG => Ok(match &deposit {
                Some(cycle) => json!({ LAST_BUF_DEPOSIT_CYCLE_DELEG: { ACCOUNT: { SSN: cycle } } }),
                None => json!({ LAST_BUF_DEPOSIT_CYCLE_DELEG: {} }),
            }),
            LAST_WITHDRAW_CYCLE_DELEG => Ok(match &withdraw {
                Some(cycle) => json!({ LAST_WITHDRAW_CYCLE_DELEG: { ACCOUNT: { SSN: cycle } } }),
                None => json!({ LAST_WITHDRAW_CYCLE_DELEG: {} }),
            }),
            MIN_DELEGATE_STAKE => Ok(json!({ MIN_DELEGATE_STAKE: "10000000000000" })),
            other => panic!("unexpected field {}", other),
        }
    }

    fn intent(validators: &[&str]) -> PosTransactionIntent {
        PosTransactionIntent {
            account: AccountRef::new(Blockchain::Zilliqa, ACCOUNT),
            chain_id: ChainId::from(333u64),
            amount: U256::from(1_000u64),
            fee_options: None,
            validators: validators.iter().map(|v| ValidatorRef::new(v, "ssn")).collect(),
            token: TokenConfig::native(Blockchain::Zilliqa, "ZIL", 12),
            extra: PosExtraFields::default(),
        }
    }

    #[tokio::test]
    async fn test_implementation_is_cached() {
        let (staking, transport) = setup(cycles("10", None, None));
        assert_eq!(staking.contract_implementation().await.unwrap(), IMPL);
        assert_eq!(staking.min_delegate_stake().await.unwrap(), U256::from(10_000_000_000_000u64));
        assert_eq!(staking.contract_implementation().await.unwrap(), IMPL);

        let implementation_reads = transport
            .calls()
            .iter()
            .filter(|(_, params)| params[1] == IMPLEMENTATION)
            .count();
        assert_eq!(implementation_reads, 1);
    }

    #[tokio::test]
    async fn test_can_unstake_after_reward_cycle() {
        let (staking, _) = setup(cycles("10", Some("9"), None));
        assert!(staking.can_unstake_from_ssn(ACCOUNT, SSN).await);

        let (staking, _) = setup(cycles("10", Some("10"), None));
        assert!(!staking.can_unstake_from_ssn(ACCOUNT, SSN).await);
    }

    #[tokio::test]
    async fn test_missing_deposit_entry_counts_as_zero() {
        let (staking, _) = setup(cycles("1", None, None));
        assert!(staking.can_unstake_from_ssn(ACCOUNT, SSN).await);
        assert!(staking.can_withdraw_stake_rewards_from_ssn(ACCOUNT, SSN).await);
    }

    #[tokio::test]
    async fn test_null_cycle_substate_is_not_eligible() {
        let known = cycles("10", Some("5"), Some("9"));
        let (staking, _) = setup(move |field| match field {
            LAST_BUF_DEPOSIT_CYCLE_DELEG => Ok(Value::Null),
            other => known(other),
        });
        assert!(!staking.can_unstake_from_ssn(ACCOUNT, SSN).await);
        assert!(!staking.can_withdraw_stake_rewards_from_ssn(ACCOUNT, SSN).await);

        let known = cycles("10", Some("5"), Some("9"));
        let (staking, _) = setup(move |field| match field {
            LAST_WITHDRAW_CYCLE_DELEG => Ok(json!({ "unrelated": {} })),
            other => known(other),
        });
        assert!(staking.can_unstake_from_ssn(ACCOUNT, SSN).await);
        assert!(!staking.can_withdraw_stake_rewards_from_ssn(ACCOUNT, SSN).await);
    }

    #[tokio::test]
    async fn test_rewards_already_withdrawn_this_cycle() {
        let (staking, _) = setup(cycles("10", Some("5"), Some("10")));
        assert!(!staking.can_withdraw_stake_rewards_from_ssn(ACCOUNT, SSN).await);

        let (staking, _) = setup(cycles("10", Some("5"), Some("9")));
        assert!(staking.can_withdraw_stake_rewards_from_ssn(ACCOUNT, SSN).await);
    }

    #[tokio::test]
    async fn test_eligibility_fails_closed() {
        let (staking, _) = setup(|_| Err(BlockchainError::Timeout(10)));
        assert!(!staking.can_unstake_from_ssn(ACCOUNT, SSN).await);
        assert!(!staking.can_withdraw_stake_rewards_from_ssn(ACCOUNT, SSN).await);

        // No staking contract configured at all.
        let transport = Arc::new(ScriptedTransport::new(|_, _| Ok(Value::Null)));
        let config = ChainConfig::new(Blockchain::Zilliqa, 333u64, "https://dev-api.zilliqa.com");
        let bare = ZilliqaStaking::new(Arc::new(ZilliqaClient::new(&config, transport)));
        assert!(!bare.can_unstake_from_ssn(ACCOUNT, SSN).await);
    }

    #[tokio::test]
    async fn test_delegate_messages_and_nonces() {
        let (staking, _) = setup(cycles("10", None, None));
        let validators = [SSN, "0x4444444444444444444444444444444444444444"];
        let intent = intent(&validators);

        let mut batch = staking.begin(&intent).await.unwrap();
        for validator in &intent.validators {
            staking.delegate_stake(&mut batch, validator).unwrap();
        }
        let txs = batch.finish();

        assert_eq!(txs.iter().map(|t| t.nonce).collect::<Vec<_>>(), vec![5, 6]);
        for tx in &txs {
            assert_eq!(tx.to_address, PROXY);
            assert_eq!(tx.amount, U256::from(1_000u64));
            assert_eq!(tx.fee_options.as_ref().unwrap().gas_limit(), U256::from(10_000));
        }
        let message: Value = serde_json::from_str(&txs[0].call().unwrap().raw).unwrap();
        assert_eq!(message["_tag"], "DelegateStake");
        assert_eq!(message["params"][0]["value"], SSN);
    }

    #[tokio::test]
    async fn test_non_delegate_messages_carry_no_amount() {
        let (staking, _) = setup(cycles("10", None, None));
        let intent = intent(&[SSN]);
        let mut batch = staking.begin(&intent).await.unwrap();
        staking.withdraw_stake_amount(&mut batch, &intent.validators[0]).unwrap();
        staking.complete_withdrawal(&mut batch);
        let txs = batch.finish();

        assert!(txs.iter().all(|t| t.amount == U256::ZERO));
        let message: Value = serde_json::from_str(&txs[0].call().unwrap().raw).unwrap();
        assert_eq!(message["_tag"], "WithdrawStakeAmt");
        assert_eq!(message["params"][1]["vname"], "amt");
        assert_eq!(message["params"][1]["value"], "1000");
        assert_eq!(txs[1].staking_action(), Some(StakingAction::Withdraw));
    }
}
