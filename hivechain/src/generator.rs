//! Block-by-block chain production.
use crate::accounts::{known_accounts, CLIQUE_SIGNER_INDEX};
use crate::config::GeneratorConfig;
use crate::context::BlockContext;
use crate::forks::{Fork, ForkSchedule};
use crate::genesis::{
    GenesisSpec, CLIQUE_EPOCH, EXTRA_SEAL, EXTRA_VANITY, GENESIS_BASE_FEE,
};
use crate::modifiers::{new_modifier, BlockModifier};
use crate::oracle::{calc_base_fee, BlockOutcome, EvmOracle, StateTransition};
use crate::output;
use crate::reimport;
use crate::state::State;
use crate::Error;
use engine_api::block_hash::requests_hash;
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;
use std::mem;
use types::rlp;
use types::{
    empty_ommers_hash, keccak256, ordered_trie_root, Account, Address, Block, Hash256, Header,
    SignedTransaction, Uint256, Withdrawal,
};

/// Vanity prefix of generated extra data.
const EXTRA_DATA: &[u8] = b"hivechain";

/// The generated chain and everything the outputs are derived from.
#[derive(Debug, Clone)]
pub struct Chain {
    pub genesis: GenesisSpec,
    pub schedule: ForkSchedule,
    pub accounts: Vec<Account>,
    /// Clique signer, if the chain is sealed by clique.
    pub signer: Option<Address>,
    /// Every block, starting with genesis.
    pub blocks: Vec<Block>,
    /// Execution outcome of every block after genesis, by block number.
    pub outcomes: BTreeMap<u64, BlockOutcome>,
    /// State after the head block.
    pub state: State,
    /// `tx_info` of every configured modifier.
    pub tx_info: BTreeMap<String, Value>,
}

impl Chain {
    pub fn head(&self) -> &Block {
        // `blocks` always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn block(&self, number: u64) -> Option<&Block> {
        self.blocks.get(number as usize)
    }

    pub fn merge_block(&self) -> Option<u64> {
        self.schedule.merge_block()
    }

    /// The EIP-7685 requests handed to `engine_newPayloadV4` for `number`.
    pub fn execution_requests(&self, number: u64) -> Option<Vec<Vec<u8>>> {
        self.outcomes
            .get(&number)
            .and_then(BlockOutcome::execution_requests)
    }
}

struct NamedModifier {
    name: String,
    modifier: Box<dyn BlockModifier>,
}

/// The configured modifiers and the scheduling state shared across blocks.
struct ModifierSet {
    list: Vec<NamedModifier>,
    /// Modifiers that never fired, in registration order.
    virgins: Vec<usize>,
    offset: usize,
}

impl ModifierSet {
    fn new(names: &[String]) -> Result<Self, Error> {
        let list = names
            .iter()
            .map(|name| {
                Ok(NamedModifier {
                    name: name.clone(),
                    modifier: new_modifier(name)?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self {
            virgins: (0..list.len()).collect(),
            list,
            offset: 0,
        })
    }

    /// Gives every modifier that has not fired yet a chance, then cycles through all of them
    /// until `max` of them fired or every one declined in a row.
    fn apply(&mut self, ctx: &mut BlockContext, max: usize) -> Result<(), Error> {
        let mut i = 0;
        while i < self.virgins.len() {
            let entry = &mut self.list[self.virgins[i]];
            if entry.modifier.apply(ctx)? {
                debug!("modifier {} fired first in block {}", entry.name, ctx.number());
                self.virgins.remove(i);
            } else {
                i += 1;
            }
        }

        let len = self.list.len();
        let (mut count, mut refused) = (0, 0);
        while count < max && refused < len {
            let index = self.offset % len;
            self.offset = self.offset.wrapping_add(1);
            if self.list[index].modifier.apply(ctx)? {
                count += 1;
                refused = 0;
            } else {
                refused += 1;
            }
        }
        Ok(())
    }

    fn tx_info(&self) -> BTreeMap<String, Value> {
        self.list
            .iter()
            .map(|m| (m.name.clone(), m.modifier.tx_info()))
            .collect()
    }
}

pub struct Generator {
    config: GeneratorConfig,
    genesis: GenesisSpec,
    schedule: ForkSchedule,
    accounts: Vec<Account>,
    signer: Option<Account>,
    oracle: EvmOracle,
    modifiers: ModifierSet,
}

/// Generates a chain without writing any outputs.
pub fn generate(config: GeneratorConfig) -> Result<Chain, Error> {
    Generator::new(config)?.generate()
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Result<Self, Error> {
        let config = config.with_defaults()?;
        let accounts = known_accounts()?;

        let (genesis, schedule, signer) = match &config.genesis {
            Some(path) => {
                let genesis = GenesisSpec::load(path)?;
                let schedule = genesis.schedule()?;
                let signer = genesis
                    .config
                    .is_clique()
                    .then(|| accounts[CLIQUE_SIGNER_INDEX].clone());
                (genesis, schedule, signer)
            }
            None => {
                let schedule = ForkSchedule::schedule(
                    config.fork_interval,
                    config.chain_length,
                    &config.last_fork,
                    config.block_time,
                )?;
                let signer = config
                    .clique
                    .then(|| accounts[CLIQUE_SIGNER_INDEX].clone());
                let genesis = GenesisSpec::new(
                    config.chain_id,
                    &schedule,
                    config.gas_limit,
                    config.block_time,
                    &accounts,
                    signer.as_ref(),
                );
                (genesis, schedule, signer)
            }
        };

        let oracle = EvmOracle::new(
            genesis.config.chain_id,
            schedule.clone(),
            signer.is_some(),
        );
        let modifiers = ModifierSet::new(&config.modifiers)?;
        Ok(Self {
            config,
            genesis,
            schedule,
            accounts,
            signer,
            oracle,
            modifiers,
        })
    }

    /// Generates the chain, checks it by re-importing and writes the configured outputs.
    pub fn run(self) -> Result<Chain, Error> {
        let out_dir = self.config.out_dir.clone();
        let outputs = self.config.outputs.clone();
        let chain = self.generate()?;
        output::write(&chain, &out_dir, &outputs)?;
        Ok(chain)
    }

    /// Generates the chain and checks it by re-importing.
    pub fn generate(mut self) -> Result<Chain, Error> {
        let mut blocks = vec![self.genesis.block()?];
        let mut state = self.genesis.state();
        if state.root() != blocks[0].header.state_root {
            return Err(Error::InvalidBlock {
                block: 0,
                reason: "genesis state root does not match its allocation".into(),
            });
        }

        let mut outcomes = BTreeMap::new();
        let mut block_hashes = vec![blocks[0].hash()];
        for number in 1..=self.config.chain_length {
            info!("generating block {}", number);
            let (block, post_state, outcome) =
                self.generate_block(number, &blocks, &block_hashes, &state)?;
            debug!(
                "block {} hash {:?} txs {} gas {}",
                number,
                block.hash(),
                block.transactions.len(),
                outcome.gas_used
            );
            block_hashes.push(block.hash());
            blocks.push(block);
            state = post_state;
            outcomes.insert(number, outcome);
        }

        let chain = Chain {
            genesis: self.genesis,
            schedule: self.schedule,
            accounts: self.accounts,
            signer: self.signer.map(|s| s.address),
            blocks,
            outcomes,
            state,
            tx_info: self.modifiers.tx_info(),
        };
        reimport::verify(&chain)?;
        Ok(chain)
    }

    fn generate_block(
        &mut self,
        number: u64,
        chain: &[Block],
        block_hashes: &[Hash256],
        state: &State,
    ) -> Result<(Block, State, BlockOutcome), Error> {
        let parent = &chain[chain.len() - 1].header;
        let mut header = self.initial_header(parent, number);

        let (transactions, uncles, withdrawals) = {
            let mut ctx = BlockContext::new(
                &header,
                chain,
                state,
                &self.schedule,
                self.genesis.config.chain_id,
                &self.accounts,
                self.signer.is_some(),
            );
            if self.modifiers_due(number) {
                self.modifiers.apply(&mut ctx, self.config.tx_count)?;
            }
            (
                mem::take(&mut ctx.transactions),
                mem::take(&mut ctx.uncles),
                mem::take(&mut ctx.withdrawals),
            )
        };

        let (post_state, outcome) = self.oracle.apply(
            state,
            block_hashes,
            &header,
            &transactions,
            &uncles,
            &withdrawals,
        )?;
        self.finalize_header(&mut header, &transactions, &uncles, &withdrawals, &outcome);
        if let Some(signer) = &self.signer {
            if !self.schedule.is_post_merge(number) {
                seal_clique(&mut header, signer)?;
            }
        }

        let withdrawals = header.withdrawals_root.map(|_| withdrawals);
        let block = Block {
            header,
            transactions,
            uncles,
            withdrawals,
        };
        Ok((block, post_state, outcome))
    }

    /// Modifiers run on every `tx_interval`-th block counting from block 1.
    fn modifiers_due(&self, number: u64) -> bool {
        self.config.tx_interval > 0 && (number - 1) % self.config.tx_interval == 0
    }

    /// Header fields known before the block's transactions are chosen.
    fn initial_header(&self, parent: &Header, number: u64) -> Header {
        let timestamp = parent.timestamp + self.config.block_time;
        let active = |fork| self.schedule.is_active(fork, number, timestamp);
        let parent_hash = parent.hash();
        let post_merge = self.schedule.is_post_merge(number);

        let difficulty = if post_merge {
            Uint256::zero()
        } else {
            Uint256::from(self.genesis.block_difficulty())
        };
        let mix_hash = if post_merge {
            prev_randao(parent_hash, number)
        } else {
            Hash256::zero()
        };
        let extra_data = match &self.signer {
            Some(signer) if !post_merge => clique_extra(number, signer.address),
            _ => EXTRA_DATA.to_vec(),
        };

        Header {
            parent_hash,
            beneficiary: Address::zero(),
            difficulty,
            number,
            gas_limit: parent.gas_limit,
            timestamp,
            extra_data,
            mix_hash,
            base_fee_per_gas: active(Fork::London)
                .then(|| calc_base_fee(parent, Uint256::from(GENESIS_BASE_FEE))),
            withdrawals_root: active(Fork::Shanghai).then(Hash256::zero),
            blob_gas_used: active(Fork::Cancun).then_some(0),
            excess_blob_gas: active(Fork::Cancun).then_some(0),
            parent_beacon_block_root: active(Fork::Cancun)
                .then(|| Hash256::from_low_u64_be(number)),
            requests_hash: active(Fork::Prague).then(Hash256::zero),
            ..Header::default()
        }
    }

    fn finalize_header(
        &self,
        header: &mut Header,
        transactions: &[SignedTransaction],
        uncles: &[Header],
        withdrawals: &[Withdrawal],
        outcome: &BlockOutcome,
    ) {
        header.state_root = outcome.state_root;
        header.transactions_root = transactions_root(transactions);
        header.receipts_root = outcome.receipts_root();
        header.logs_bloom = outcome.logs_bloom;
        header.gas_used = outcome.gas_used;
        header.ommers_hash = ommers_hash(uncles);
        if header.withdrawals_root.is_some() {
            header.withdrawals_root = Some(Withdrawal::root(withdrawals));
        }
        if header.blob_gas_used.is_some() {
            header.blob_gas_used = Some(outcome.blob_gas_used);
        }
        if let Some(requests) = &outcome.requests {
            header.requests_hash = Some(requests_hash(requests));
        }
    }
}

/// The randomness of a proof-of-stake block: `keccak256(parent_hash || number)`.
pub fn prev_randao(parent_hash: Hash256, number: u64) -> Hash256 {
    let mut input = parent_hash.as_bytes().to_vec();
    input.extend_from_slice(&number.to_be_bytes());
    keccak256(&input)
}

pub fn transactions_root(transactions: &[SignedTransaction]) -> Hash256 {
    ordered_trie_root(transactions.iter().map(SignedTransaction::encoded_2718))
}

pub fn ommers_hash(uncles: &[Header]) -> Hash256 {
    if uncles.is_empty() {
        return empty_ommers_hash();
    }
    keccak256(&rlp::encode_list::<Header, Header>(uncles))
}

/// Unsealed clique extra data. Checkpoint blocks list the signer.
fn clique_extra(number: u64, signer: Address) -> Vec<u8> {
    let mut extra = EXTRA_DATA.to_vec();
    extra.resize(EXTRA_VANITY, 0);
    if number % CLIQUE_EPOCH == 0 {
        extra.extend_from_slice(signer.as_bytes());
    }
    extra.resize(extra.len() + EXTRA_SEAL, 0);
    extra
}

/// Signs the header and stores `r || s || v` in the trailing seal bytes of `extra_data`.
fn seal_clique(header: &mut Header, signer: &Account) -> Result<(), Error> {
    let signature = signer.key.sign_hash(header.seal_hash(EXTRA_SEAL))?;
    let mut seal = [0u8; EXTRA_SEAL];
    signature.r.to_big_endian(&mut seal[..32]);
    signature.s.to_big_endian(&mut seal[32..64]);
    seal[64] = signature.recovery_id;
    let start = header.extra_data.len() - EXTRA_SEAL;
    header.extra_data[start..].copy_from_slice(&seal);
    Ok(())
}
