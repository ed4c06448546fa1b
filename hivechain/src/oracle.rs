//! State transition for generated blocks.
//!
//! `EvmOracle` executes every transaction with revm against the parent `State`, runs the
//! system calls of EIP-4788, EIP-2935, EIP-7002 and EIP-7251 around them, and then applies
//! the consensus-level balance changes (block and uncle rewards, withdrawals) directly.
use crate::contracts::{self, SystemContract};
use crate::evm::{self, StateDb};
use crate::forks::{Fork, ForkSchedule};
use crate::state::State;
use crate::Error;
use alloy_eips::eip2930::{AccessList, AccessListItem};
use alloy_eips::eip4788::SYSTEM_ADDRESS;
use alloy_eips::eip7702::{Authorization, SignedAuthorization};
use either::Either;
use revm::context::{BlockEnv, Context, TxEnv};
use revm::context_interface::result::ExecutionResult;
use revm::handler::{ExecuteCommitEvm, ExecuteEvm, MainBuilder, MainnetContext};
use revm::primitives::{hardfork::SpecId, Bytes, TxKind, U256};
use types::{
    logs_bloom, ordered_trie_root, Address, Bloom, Hash256, Header, Log, Receipt, ReceiptOutcome,
    SignedTransaction, Transaction, TxType, Uint256, Withdrawal,
};

pub const TX_GAS: u64 = 21_000;
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
pub const TX_DATA_ZERO_GAS: u64 = 4;
pub const TX_DATA_NON_ZERO_GAS_FRONTIER: u64 = 68;
pub const TX_DATA_NON_ZERO_GAS_EIP2028: u64 = 16;
pub const INIT_CODE_WORD_GAS: u64 = 2;
pub const ACCESS_LIST_ADDRESS_GAS: u64 = 2_400;
pub const ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1_900;
pub const PER_EMPTY_ACCOUNT_GAS: u64 = 25_000;
pub const CREATE_DATA_GAS: u64 = 200;
pub const GAS_PER_BLOB: u64 = 131_072;
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;
pub const ELASTICITY_MULTIPLIER: u64 = 2;
/// Gas available to a system call. It is not charged to the block.
pub const SYSTEM_CALL_GAS: u64 = 30_000_000;
pub const BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN: u64 = 3_338_477;
pub const BLOB_BASE_FEE_UPDATE_FRACTION_PRAGUE: u64 = 5_007_716;

pub const DEPOSIT_REQUEST_TYPE: u8 = 0x00;
pub const WITHDRAWAL_REQUEST_TYPE: u8 = 0x01;
pub const CONSOLIDATION_REQUEST_TYPE: u8 = 0x02;

/// Result of applying a block to its parent state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    pub state_root: Hash256,
    pub receipts: Vec<Receipt>,
    pub logs_bloom: Bloom,
    pub gas_used: u64,
    pub blob_gas_used: u64,
    /// EIP-7685 requests of every type, `type || data`. Present from Prague.
    pub requests: Option<Vec<Vec<u8>>>,
}

impl BlockOutcome {
    pub fn receipts_root(&self) -> Hash256 {
        ordered_trie_root(self.receipts.iter().map(Receipt::encoded_2718))
    }

    /// The requests carried by `engine_newPayloadV4`: types without data are left out.
    pub fn execution_requests(&self) -> Option<Vec<Vec<u8>>> {
        self.requests
            .as_ref()
            .map(|rs| rs.iter().filter(|r| r.len() > 1).cloned().collect())
    }
}

/// Applies a block to a parent state, producing the post state and the values the header
/// commits to. Implementations must be deterministic.
///
/// `block_hashes` holds the hash of every ancestor of `header`, indexed by block number.
pub trait StateTransition {
    fn apply(
        &self,
        parent: &State,
        block_hashes: &[Hash256],
        header: &Header,
        transactions: &[SignedTransaction],
        uncles: &[Header],
        withdrawals: &[Withdrawal],
    ) -> Result<(State, BlockOutcome), Error>;
}

/// Gas charged before execution.
pub fn intrinsic_gas(
    schedule: &ForkSchedule,
    number: u64,
    timestamp: u64,
    tx: &Transaction,
) -> u64 {
    let mut gas = data_gas(
        schedule,
        number,
        timestamp,
        tx.data(),
        tx.to().is_none(),
    );
    for item in tx.access_list() {
        gas += ACCESS_LIST_ADDRESS_GAS + ACCESS_LIST_STORAGE_KEY_GAS * item.storage_keys.len() as u64;
    }
    gas + PER_EMPTY_ACCOUNT_GAS * tx.authorization_list().len() as u64
}

/// Intrinsic gas of a transaction without access or authorization lists.
pub fn data_gas(
    schedule: &ForkSchedule,
    number: u64,
    timestamp: u64,
    data: &[u8],
    is_create: bool,
) -> u64 {
    let active = |fork| schedule.is_active(fork, number, timestamp);
    let mut gas = if is_create && active(Fork::Homestead) {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    let non_zero_gas = if active(Fork::Istanbul) {
        TX_DATA_NON_ZERO_GAS_EIP2028
    } else {
        TX_DATA_NON_ZERO_GAS_FRONTIER
    };
    let non_zero = data.iter().filter(|b| **b != 0).count() as u64;
    let zero = data.len() as u64 - non_zero;
    gas += non_zero * non_zero_gas + zero * TX_DATA_ZERO_GAS;
    if is_create && active(Fork::Shanghai) {
        gas += INIT_CODE_WORD_GAS * ((data.len() as u64 + 31) / 32);
    }
    gas
}

/// EIP-1559 base fee of the child of `parent`. The first London block uses `initial`.
pub fn calc_base_fee(parent: &Header, initial: Uint256) -> Uint256 {
    let parent_base_fee = match parent.base_fee_per_gas {
        Some(fee) => fee,
        None => return initial,
    };
    let target = parent.gas_limit / ELASTICITY_MULTIPLIER;
    if target == 0 || parent.gas_used == target {
        return parent_base_fee;
    }
    if parent.gas_used > target {
        let delta = parent_base_fee * Uint256::from(parent.gas_used - target)
            / Uint256::from(target)
            / Uint256::from(BASE_FEE_CHANGE_DENOMINATOR);
        parent_base_fee + std::cmp::max(delta, Uint256::one())
    } else {
        let delta = parent_base_fee * Uint256::from(target - parent.gas_used)
            / Uint256::from(target)
            / Uint256::from(BASE_FEE_CHANGE_DENOMINATOR);
        parent_base_fee.saturating_sub(delta)
    }
}

/// Proof-of-work block reward at the given height.
pub fn block_reward(schedule: &ForkSchedule, number: u64, timestamp: u64) -> Uint256 {
    let ether = Uint256::exp10(18);
    if schedule.is_active(Fork::Constantinople, number, timestamp) {
        ether * 2
    } else if schedule.is_active(Fork::Byzantium, number, timestamp) {
        ether * 3
    } else {
        ether * 5
    }
}

fn blob_gas(tx: &Transaction) -> u64 {
    GAS_PER_BLOB * tx.blob_versioned_hashes().len() as u64
}

/// Executes blocks with revm.
#[derive(Debug, Clone)]
pub struct EvmOracle {
    pub chain_id: u64,
    pub schedule: ForkSchedule,
    pub clique: bool,
}

/// Per-block execution settings shared by every transaction and system call of the block.
struct BlockExecution<'a> {
    header: &'a Header,
    block_hashes: &'a [Hash256],
    spec: SpecId,
    env: BlockEnv,
    clear_empty: bool,
}

impl EvmOracle {
    pub fn new(chain_id: u64, schedule: ForkSchedule, clique: bool) -> Self {
        Self {
            chain_id,
            schedule,
            clique,
        }
    }

    fn active(&self, fork: Fork, header: &Header) -> bool {
        self.schedule.is_active(fork, header.number, header.timestamp)
    }

    fn block_env(&self, header: &Header, spec: SpecId) -> BlockEnv {
        let mut env = BlockEnv {
            number: U256::from(header.number),
            beneficiary: evm::to_address(header.beneficiary),
            timestamp: U256::from(header.timestamp),
            gas_limit: header.gas_limit,
            basefee: header.base_fee_per_gas.map_or(0, |fee| fee.low_u64()),
            difficulty: evm::to_u256(header.difficulty),
            prevrandao: spec
                .is_enabled_in(SpecId::MERGE)
                .then(|| evm::to_b256(header.mix_hash)),
            blob_excess_gas_and_price: None,
        };
        if spec.is_enabled_in(SpecId::CANCUN) {
            let fraction = if spec.is_enabled_in(SpecId::PRAGUE) {
                BLOB_BASE_FEE_UPDATE_FRACTION_PRAGUE
            } else {
                BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN
            };
            env.set_blob_excess_gas_and_price(header.excess_blob_gas.unwrap_or_default(), fraction);
        }
        env
    }

    fn context<'a>(
        &self,
        state: &'a mut State,
        block: &'a BlockExecution<'_>,
    ) -> MainnetContext<StateDb<'a>> {
        let db = StateDb::new(state, block.block_hashes, block.clear_empty);
        let mut ctx: MainnetContext<StateDb> = Context::new(db, block.spec);
        ctx.block = block.env.clone();
        ctx.cfg.chain_id = self.chain_id;
        ctx
    }

    /// Checks the rules revm leaves to the client: transaction types are gated on their fork,
    /// replay protection only exists from Spurious Dragon, and the block gas pool.
    fn validate(
        &self,
        header: &Header,
        tx: &SignedTransaction,
        gas_left: u64,
    ) -> Result<Address, String> {
        let required = match tx.tx_type() {
            TxType::Legacy => None,
            TxType::AccessList => Some(Fork::Berlin),
            TxType::DynamicFee => Some(Fork::London),
            TxType::Blob => Some(Fork::Cancun),
            TxType::SetCode => Some(Fork::Prague),
        };
        if let Some(fork) = required {
            if !self.active(fork, header) {
                return Err(format!("{:?} transaction before {}", tx.tx_type(), fork));
            }
        }

        match self.tx_chain_id(tx) {
            Some(id) if id != self.chain_id => {
                return Err(format!("chain id {} instead of {}", id, self.chain_id))
            }
            Some(_) if !self.active(Fork::SpuriousDragon, header) => {
                return Err("replay-protected transaction before spurious dragon".into())
            }
            _ => {}
        }
        if tx.transaction.gas() > gas_left {
            return Err(format!(
                "gas {} exceeds block gas left {}",
                tx.transaction.gas(),
                gas_left
            ));
        }
        tx.sender()
            .map_err(|e| format!("invalid signature: {:?}", e))
    }

    fn tx_chain_id(&self, tx: &SignedTransaction) -> Option<u64> {
        match tx.tx_type() {
            TxType::Legacy => tx.legacy_chain_id(),
            _ => tx.transaction.chain_id(),
        }
    }

    fn tx_env(&self, signed: &SignedTransaction, sender: Address) -> TxEnv {
        let tx = &signed.transaction;
        let priced_by_fee_cap = !matches!(tx, Transaction::Legacy(_) | Transaction::AccessList(_));
        let access_list = tx
            .access_list()
            .iter()
            .map(|item| AccessListItem {
                address: evm::to_address(item.address),
                storage_keys: item.storage_keys.iter().copied().map(evm::to_b256).collect(),
            })
            .collect();
        let authorization_list = tx
            .authorization_list()
            .iter()
            .map(|auth| {
                let inner = Authorization {
                    chain_id: U256::from(auth.authorization.chain_id),
                    address: evm::to_address(auth.authorization.address),
                    nonce: auth.authorization.nonce,
                };
                Either::Left(SignedAuthorization::new_unchecked(
                    inner,
                    auth.y_parity,
                    evm::to_u256(auth.r),
                    evm::to_u256(auth.s),
                ))
            })
            .collect();

        TxEnv {
            tx_type: signed.tx_type().as_u8(),
            caller: evm::to_address(sender),
            gas_limit: tx.gas(),
            gas_price: tx.max_fee_per_gas().low_u128(),
            kind: match tx.to() {
                Some(to) => TxKind::Call(evm::to_address(to)),
                None => TxKind::Create,
            },
            value: evm::to_u256(tx.value()),
            data: Bytes::from(tx.data().to_vec()),
            nonce: tx.nonce(),
            chain_id: self.tx_chain_id(signed),
            access_list: AccessList(access_list),
            gas_priority_fee: priced_by_fee_cap.then(|| tx.max_priority_fee_per_gas().low_u128()),
            blob_hashes: tx
                .blob_versioned_hashes()
                .iter()
                .copied()
                .map(evm::to_b256)
                .collect(),
            max_fee_per_blob_gas: tx.max_fee_per_blob_gas().unwrap_or_default().low_u128(),
            authorization_list,
        }
    }

    /// Calls a system contract from the system address outside of the block's gas accounting.
    /// Only the contract's own state changes are kept.
    fn system_call(
        &self,
        state: &mut State,
        block: &BlockExecution<'_>,
        contract: SystemContract,
        input: Vec<u8>,
    ) -> Result<ExecutionResult, Error> {
        let address = evm::to_address(contract.address());
        let mut ctx = self.context(state, block);
        ctx.block.gas_limit = SYSTEM_CALL_GAS;
        ctx.block.basefee = 0;
        ctx.cfg.disable_nonce_check = true;
        let mut vm = ctx.build_mainnet();

        let tx = TxEnv {
            caller: SYSTEM_ADDRESS,
            kind: TxKind::Call(address),
            nonce: 0,
            gas_limit: SYSTEM_CALL_GAS,
            value: U256::ZERO,
            data: Bytes::from(input),
            gas_price: 0,
            chain_id: None,
            gas_priority_fee: None,
            tx_type: 0,
            ..TxEnv::default()
        };
        let mut outcome = vm.transact(tx).map_err(|e| Error::InvalidBlock {
            block: block.header.number,
            reason: format!("system call to {:?} failed: {:?}", contract.address(), e),
        })?;
        outcome.state.retain(|changed, _| *changed == address);
        vm.commit(outcome.state);
        Ok(outcome.result)
    }

    /// EIP-7002 and EIP-7251: dequeues the requests of the block, `type || data`.
    fn dequeue_requests(
        &self,
        state: &mut State,
        block: &BlockExecution<'_>,
        contract: SystemContract,
        request_type: u8,
    ) -> Result<Vec<u8>, Error> {
        if state.code(&contract.address()).is_empty() {
            return Err(Error::InvalidBlock {
                block: block.header.number,
                reason: format!("request contract {:?} has no code", contract.address()),
            });
        }
        let result = self.system_call(state, block, contract, vec![])?;
        match result {
            ExecutionResult::Success { output, .. } => {
                let mut request = vec![request_type];
                request.extend_from_slice(output.data());
                Ok(request)
            }
            other => Err(Error::InvalidBlock {
                block: block.header.number,
                reason: format!(
                    "request contract {:?} failed: {:?}",
                    contract.address(),
                    other
                ),
            }),
        }
    }

    fn apply_rewards(&self, state: &mut State, header: &Header, uncles: &[Header]) {
        if self.clique || self.schedule.is_post_merge(header.number) {
            return;
        }
        let reward = block_reward(&self.schedule, header.number, header.timestamp);
        let mut miner_reward = reward;
        for uncle in uncles {
            let depth = header.number.saturating_sub(uncle.number);
            let uncle_reward = reward * Uint256::from(8u64.saturating_sub(depth)) / 8;
            state.add_balance(uncle.beneficiary, uncle_reward);
            miner_reward += reward / 32;
        }
        state.add_balance(header.beneficiary, miner_reward);
    }
}

impl StateTransition for EvmOracle {
    fn apply(
        &self,
        parent: &State,
        block_hashes: &[Hash256],
        header: &Header,
        transactions: &[SignedTransaction],
        uncles: &[Header],
        withdrawals: &[Withdrawal],
    ) -> Result<(State, BlockOutcome), Error> {
        let mut state = parent.clone();
        let spec = evm::spec_id(&self.schedule, header.number, header.timestamp);
        let block = BlockExecution {
            header,
            block_hashes,
            spec,
            env: self.block_env(header, spec),
            clear_empty: spec.is_enabled_in(SpecId::SPURIOUS_DRAGON),
        };
        let invalid = |index: usize, reason: String| Error::InvalidTransaction {
            block: header.number,
            index,
            reason,
        };

        if self.active(Fork::Cancun, header) {
            let root = header
                .parent_beacon_block_root
                .ok_or_else(|| Error::InvalidBlock {
                    block: header.number,
                    reason: "missing parent beacon block root".into(),
                })?;
            self.system_call(
                &mut state,
                &block,
                contracts::beacon_roots(),
                root.as_bytes().to_vec(),
            )?;
        }
        if self.active(Fork::Prague, header) {
            self.system_call(
                &mut state,
                &block,
                contracts::history_storage(),
                header.parent_hash.as_bytes().to_vec(),
            )?;
        }

        let mut receipts = Vec::with_capacity(transactions.len());
        let mut gas_used = 0u64;
        let mut blob_gas_used = 0u64;

        for (index, signed) in transactions.iter().enumerate() {
            let sender = self
                .validate(header, signed, header.gas_limit - gas_used)
                .map_err(|reason| invalid(index, reason))?;
            let tx_env = self.tx_env(signed, sender);

            let result = {
                let mut vm = self.context(&mut state, &block).build_mainnet();
                let outcome = vm
                    .transact(tx_env)
                    .map_err(|e| invalid(index, format!("{:?}", e)))?;
                vm.commit(outcome.state);
                outcome.result
            };

            gas_used += result.gas_used();
            blob_gas_used += blob_gas(&signed.transaction);
            let logs = result
                .logs()
                .iter()
                .map(|log| Log {
                    address: evm::from_address(log.address),
                    topics: log.data.topics().iter().copied().map(evm::from_b256).collect(),
                    data: log.data.data.to_vec(),
                })
                .collect();
            let outcome = if self.active(Fork::Byzantium, header) {
                ReceiptOutcome::Status(result.is_success())
            } else {
                ReceiptOutcome::StateRoot(state.root())
            };
            receipts.push(Receipt::new(signed.tx_type(), outcome, gas_used, logs));
        }

        let requests = if self.active(Fork::Prague, header) {
            Some(vec![
                vec![DEPOSIT_REQUEST_TYPE],
                self.dequeue_requests(
                    &mut state,
                    &block,
                    contracts::withdrawal_queue(),
                    WITHDRAWAL_REQUEST_TYPE,
                )?,
                self.dequeue_requests(
                    &mut state,
                    &block,
                    contracts::consolidation_queue(),
                    CONSOLIDATION_REQUEST_TYPE,
                )?,
            ])
        } else {
            None
        };

        self.apply_rewards(&mut state, header, uncles);
        for withdrawal in withdrawals {
            let wei = Uint256::from(withdrawal.amount) * Uint256::exp10(9);
            state.add_balance(withdrawal.address, wei);
        }

        let logs: Vec<Log> = receipts
            .iter()
            .flat_map(|r| r.logs.iter().cloned())
            .collect();
        let outcome = BlockOutcome {
            state_root: state.root(),
            logs_bloom: logs_bloom(&logs),
            receipts,
            gas_used,
            blob_gas_used,
            requests,
        };
        Ok((state, outcome))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::contracts::{
        deploy_constructor, emit_address, emit_topic, withdrawal_queue_address, CALLME_CODE,
        EMIT_CODE,
    };
    use crate::forks::Activation;
    use crate::state::StateAccount;
    use types::{create_address, keccak256, DynamicFeeTx, LegacyTx, PrivateKey, Signer};

    fn key() -> PrivateKey {
        PrivateKey::from_hex("4552dbe6ca4699322b5d923d0c9bcdd24644f5db8bf89a085b67c6c49b8a1b91")
            .unwrap()
    }

    fn oracle(forks: &[(Fork, u64)]) -> EvmOracle {
        let schedule = ForkSchedule::from_activations(forks.iter().map(|(f, n)| {
            let activation = if f.is_time_based() {
                Activation::Time(*n)
            } else {
                Activation::Block(*n)
            };
            (*f, activation)
        }))
        .unwrap();
        EvmOracle::new(1, schedule, false)
    }

    fn berlin() -> EvmOracle {
        oracle(&[
            (Fork::Homestead, 0),
            (Fork::TangerineWhistle, 0),
            (Fork::SpuriousDragon, 0),
            (Fork::Byzantium, 0),
            (Fork::Constantinople, 0),
            (Fork::Petersburg, 0),
            (Fork::Istanbul, 0),
            (Fork::Berlin, 0),
        ])
    }

    fn funded() -> State {
        let mut state = State::default();
        state.add_balance(key().address(), Uint256::exp10(20));
        state
    }

    fn with_system_contracts(mut state: State) -> State {
        for contract in contracts::system_contracts() {
            state.insert(
                contract.address(),
                StateAccount {
                    nonce: 1,
                    code: contract.code.to_vec(),
                    ..StateAccount::default()
                },
            );
        }
        state
    }

    fn header(number: u64) -> Header {
        Header {
            number,
            timestamp: number * 10,
            gas_limit: 30_000_000,
            beneficiary: Address::repeat_byte(0xcc),
            ..Header::default()
        }
    }

    fn legacy(nonce: u64, to: Option<Address>, gas: u64, data: Vec<u8>, eip155: bool) -> SignedTransaction {
        let tx = Transaction::Legacy(LegacyTx {
            nonce,
            gas_price: Uint256::one(),
            gas,
            to,
            value: Uint256::one(),
            data,
        });
        Signer::new(1, eip155).sign(tx, &key()).unwrap()
    }

    fn transfer(nonce: u64, eip155: bool) -> SignedTransaction {
        legacy(nonce, Some(Address::repeat_byte(7)), TX_GAS, vec![], eip155)
    }

    #[test]
    fn transfer_updates_balances_and_reward() {
        let oracle = oracle(&[(Fork::Homestead, 0), (Fork::Byzantium, 0)]);
        let (state, outcome) = oracle
            .apply(&funded(), &[], &header(1), &[transfer(0, false)], &[], &[])
            .unwrap();
        assert_eq!(outcome.gas_used, TX_GAS);
        assert_eq!(state.balance(&Address::repeat_byte(7)), Uint256::one());
        assert_eq!(state.nonce(&key().address()), 1);
        assert_eq!(
            state.balance(&Address::repeat_byte(0xcc)),
            Uint256::exp10(18) * 3 + Uint256::from(TX_GAS)
        );
        assert_eq!(outcome.receipts[0].outcome, ReceiptOutcome::Status(true));
        assert_eq!(outcome.state_root, state.root());
    }

    #[test]
    fn rejects_bad_nonce_and_replay_protection() {
        let oracle = oracle(&[(Fork::Homestead, 0)]);
        assert!(matches!(
            oracle.apply(&funded(), &[], &header(1), &[transfer(1, false)], &[], &[]),
            Err(Error::InvalidTransaction { index: 0, .. })
        ));
        assert!(oracle
            .apply(&funded(), &[], &header(1), &[transfer(0, true)], &[], &[])
            .is_err());
    }

    #[test]
    fn pre_byzantium_receipts_carry_state_root() {
        let oracle = oracle(&[(Fork::Homestead, 0)]);
        let (_, outcome) = oracle
            .apply(&funded(), &[], &header(1), &[transfer(0, false)], &[], &[])
            .unwrap();
        assert!(matches!(
            outcome.receipts[0].outcome,
            ReceiptOutcome::StateRoot(_)
        ));
    }

    #[test]
    fn emit_call_charges_executed_gas() {
        let mut state = funded();
        state.insert(
            emit_address(),
            StateAccount {
                nonce: 1,
                code: EMIT_CODE.to_vec(),
                ..StateAccount::default()
            },
        );
        let mut data = vec![0, 0, 0, 0, 0, 0, 0, 1];
        data.extend_from_slice(b"emit");
        let tx = legacy(0, Some(emit_address()), 100_000, data.clone(), true);

        let (_, outcome) = berlin()
            .apply(&state, &[], &header(1), &[tx], &[], &[])
            .unwrap();
        // 21000 + 7 zero and 5 non-zero calldata bytes, then 1287 for the code.
        assert_eq!(outcome.gas_used, 21_000 + 7 * 4 + 5 * 16 + 1_287);
        let receipt = &outcome.receipts[0];
        assert_eq!(receipt.outcome, ReceiptOutcome::Status(true));
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].address, emit_address());
        assert_eq!(receipt.logs[0].topics, vec![emit_topic(), keccak256(&data)]);
        assert_eq!(receipt.logs[0].data, data);
    }

    #[test]
    fn deployed_code_runs() {
        let sender = key().address();
        let contract = create_address(sender, 0);
        let deploy = legacy(0, None, 200_000, deploy_constructor(CALLME_CODE), true);
        let call = legacy(1, Some(contract), 100_000, vec![0xaa; 32], true);

        let (state, outcome) = berlin()
            .apply(&funded(), &[], &header(1), &[deploy, call], &[], &[])
            .unwrap();
        assert_eq!(state.code(&contract), CALLME_CODE);
        assert_eq!(state.nonce(&contract), 1);
        assert_eq!(state.storage(&contract, Hash256::zero()), Hash256::repeat_byte(0xaa));
        // Cold SSTORE of a fresh slot: 2100 + 20000, plus three 3-gas pushes and loads.
        let call_gas = outcome.receipts[1].cumulative_gas_used - outcome.receipts[0].cumulative_gas_used;
        assert_eq!(call_gas, 21_000 + 32 * 16 + 22_100 + 9);
    }

    #[test]
    fn intrinsic_gas_by_fork() {
        let frontier = oracle(&[]).schedule;
        let istanbul = oracle(&[(Fork::Homestead, 0), (Fork::Istanbul, 0)]).schedule;
        assert_eq!(data_gas(&frontier, 1, 10, &[1, 0], false), 21_000 + 68 + 4);
        assert_eq!(data_gas(&istanbul, 1, 10, &[1, 0], false), 21_000 + 16 + 4);
        assert_eq!(data_gas(&istanbul, 1, 10, &[], true), 53_000);
    }

    #[test]
    fn base_fee_update() {
        let mut parent = header(1);
        let initial = Uint256::from(1_000_000_000u64);
        assert_eq!(calc_base_fee(&parent, initial), initial);

        parent.base_fee_per_gas = Some(initial);
        parent.gas_used = parent.gas_limit / 2;
        assert_eq!(calc_base_fee(&parent, initial), initial);
        parent.gas_used = 0;
        assert_eq!(
            calc_base_fee(&parent, initial),
            Uint256::from(875_000_000u64)
        );
        parent.gas_used = parent.gas_limit;
        assert_eq!(
            calc_base_fee(&parent, initial),
            Uint256::from(1_125_000_000u64)
        );
    }

    fn prague() -> EvmOracle {
        oracle(&[
            (Fork::Homestead, 0),
            (Fork::SpuriousDragon, 0),
            (Fork::Byzantium, 0),
            (Fork::Berlin, 0),
            (Fork::London, 0),
            (Fork::Merge, 0),
            (Fork::Shanghai, 0),
            (Fork::Cancun, 0),
            (Fork::Prague, 0),
        ])
    }

    fn prague_header(number: u64) -> Header {
        Header {
            base_fee_per_gas: Some(Uint256::from(7)),
            parent_beacon_block_root: Some(Hash256::repeat_byte(0xbe)),
            excess_blob_gas: Some(0),
            blob_gas_used: Some(0),
            ..header(number)
        }
    }

    #[test]
    fn withdrawals_and_prague_requests() {
        let withdrawal = Withdrawal {
            index: 0,
            validator_index: 5,
            address: Address::repeat_byte(9),
            amount: 100,
        };
        let state = with_system_contracts(State::default());
        let (state, outcome) = prague()
            .apply(&state, &[], &prague_header(1), &[], &[], &[withdrawal])
            .unwrap();
        assert_eq!(
            state.balance(&Address::repeat_byte(9)),
            Uint256::from(100u64) * Uint256::exp10(9)
        );
        assert_eq!(outcome.requests.as_ref().unwrap().len(), 3);
        assert_eq!(outcome.execution_requests(), Some(vec![]));
        // no block reward after the merge
        assert!(state.account(&Address::repeat_byte(0xcc)).is_none());
    }

    #[test]
    fn beacon_root_and_parent_hash_are_stored() {
        let mut header = prague_header(1);
        header.parent_hash = Hash256::repeat_byte(0x11);
        let state = with_system_contracts(State::default());
        let (state, _) = prague()
            .apply(&state, &[], &header, &[], &[], &[])
            .unwrap();

        let beacon = contracts::beacon_roots_address();
        let index = header.timestamp % 8191;
        assert_eq!(
            state.storage(&beacon, Hash256::from_low_u64_be(index)),
            Hash256::from_low_u64_be(header.timestamp)
        );
        assert_eq!(
            state.storage(&beacon, Hash256::from_low_u64_be(index + 8191)),
            Hash256::repeat_byte(0xbe)
        );
        let history = contracts::history_storage().address();
        assert_eq!(
            state.storage(&history, Hash256::zero()),
            Hash256::repeat_byte(0x11)
        );
    }

    #[test]
    fn missing_request_contract_is_an_error() {
        assert!(matches!(
            prague().apply(&State::default(), &[], &prague_header(1), &[], &[], &[]),
            Err(Error::InvalidBlock { block: 1, .. })
        ));
    }

    #[test]
    fn withdrawal_request_is_dequeued() {
        let mut input = vec![0x5a; 48];
        input.extend_from_slice(&1000u64.to_be_bytes());
        let tx = Transaction::DynamicFee(DynamicFeeTx {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: Uint256::from(2u64),
            max_fee_per_gas: Uint256::from(100u64),
            gas: 150_000,
            to: Some(withdrawal_queue_address()),
            value: Uint256::exp10(9),
            data: input.clone(),
            access_list: vec![],
        });
        let tx = Signer::new(1, true).sign(tx, &key()).unwrap();
        let state = with_system_contracts(funded());
        let (_, outcome) = prague()
            .apply(&state, &[], &prague_header(1), &[tx], &[], &[])
            .unwrap();

        assert_eq!(outcome.receipts[0].outcome, ReceiptOutcome::Status(true));
        assert!(outcome.gas_used < 150_000);
        let requests = outcome.execution_requests().unwrap();
        assert_eq!(requests.len(), 1);
        let mut expected = vec![WITHDRAWAL_REQUEST_TYPE];
        expected.extend_from_slice(key().address().as_bytes());
        expected.extend_from_slice(&input);
        assert_eq!(requests[0], expected);
    }
}
