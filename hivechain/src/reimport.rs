//! Validating import of an RLP chain, used to check every generated chain before it is
//! written out.
use crate::difficulty::calc_difficulty;
use crate::forks::{Fork, ForkSchedule};
use crate::generator::{ommers_hash, transactions_root, Chain};
use crate::genesis::{GenesisSpec, EXTRA_SEAL, EXTRA_VANITY, GENESIS_BASE_FEE};
use crate::oracle::{calc_base_fee, EvmOracle, StateTransition};
use crate::state::State;
use crate::Error;
use engine_api::block_hash::requests_hash;
use log::info;
use types::{
    decode_chain, encode_chain, recover_address, Address, Block, Hash256, Hash64, Header,
    RawSignature, Uint256, Withdrawal,
};

const MAX_UNCLES: usize = 2;
/// Uncles may be at most this many generations older than the including block.
const MAX_UNCLE_DEPTH: u64 = 7;

/// Encodes the generated chain, decodes it again and imports it from genesis. The imported
/// head must match the generated one.
pub fn verify(chain: &Chain) -> Result<(), Error> {
    let encoded = encode_chain(chain.blocks.iter().skip(1));
    let decoded = decode_chain(&encoded)?;
    if decoded.len() + 1 != chain.blocks.len() {
        return Err(Error::ReimportMismatch(format!(
            "decoded {} blocks, generated {}",
            decoded.len(),
            chain.blocks.len() - 1
        )));
    }

    let state = import(&chain.genesis, &decoded)?;
    let head = chain.head();
    if state.root() != chain.state.root() {
        return Err(Error::StateRootMismatch {
            block: head.number(),
            expected: chain.state.root(),
            computed: state.root(),
        });
    }
    info!("re-imported {} blocks, head {:?}", decoded.len(), head.hash());
    Ok(())
}

/// Imports `blocks` on top of the genesis described by `genesis`, validating every header
/// against the execution of its transactions. Returns the head state.
pub fn import(genesis: &GenesisSpec, blocks: &[Block]) -> Result<State, Error> {
    let schedule = genesis.schedule()?;
    let signer = clique_signer(genesis)?;
    let oracle = EvmOracle::new(genesis.config.chain_id, schedule.clone(), signer.is_some());
    let importer = Importer {
        schedule: &schedule,
        oracle: &oracle,
        block_difficulty: Uint256::from(genesis.block_difficulty()),
        signer,
    };

    let mut chain = vec![genesis.block()?];
    let mut block_hashes = vec![chain[0].hash()];
    let mut state = genesis.state();
    for block in blocks {
        state = importer.import_block(&chain, &block_hashes, &state, block)?;
        block_hashes.push(block.hash());
        chain.push(block.clone());
    }
    Ok(state)
}

struct Importer<'a> {
    schedule: &'a ForkSchedule,
    oracle: &'a EvmOracle,
    block_difficulty: Uint256,
    signer: Option<Address>,
}

fn mismatch(block: u64, what: &str) -> Error {
    Error::ReimportMismatch(format!("block {}: {}", block, what))
}

impl<'a> Importer<'a> {
    fn import_block(
        &self,
        chain: &[Block],
        block_hashes: &[Hash256],
        state: &State,
        block: &Block,
    ) -> Result<State, Error> {
        let parent = &chain[chain.len() - 1].header;
        let header = &block.header;
        let number = header.number;
        self.validate_header(parent, header)?;
        self.validate_body(chain, block)?;

        let withdrawals: &[Withdrawal] = block.withdrawals.as_deref().unwrap_or_default();
        let (post_state, outcome) = self.oracle.apply(
            state,
            block_hashes,
            header,
            &block.transactions,
            &block.uncles,
            withdrawals,
        )?;

        if outcome.state_root != header.state_root {
            return Err(Error::StateRootMismatch {
                block: number,
                expected: header.state_root,
                computed: outcome.state_root,
            });
        }
        if outcome.receipts_root() != header.receipts_root {
            return Err(mismatch(number, "receipts root"));
        }
        if outcome.logs_bloom != header.logs_bloom {
            return Err(mismatch(number, "logs bloom"));
        }
        if outcome.gas_used != header.gas_used {
            return Err(mismatch(number, "gas used"));
        }
        if header.blob_gas_used.is_some() && header.blob_gas_used != Some(outcome.blob_gas_used) {
            return Err(mismatch(number, "blob gas used"));
        }
        if outcome.requests.as_deref().map(requests_hash) != header.requests_hash {
            return Err(mismatch(number, "requests hash"));
        }
        Ok(post_state)
    }

    fn validate_header(&self, parent: &Header, header: &Header) -> Result<(), Error> {
        let number = header.number;
        let active = |fork| self.schedule.is_active(fork, number, header.timestamp);
        let post_merge = self.schedule.is_post_merge(number);

        if number != parent.number + 1 {
            return Err(mismatch(number, "non-consecutive number"));
        }
        if header.parent_hash != parent.hash() {
            return Err(mismatch(number, "parent hash"));
        }
        if header.timestamp <= parent.timestamp {
            return Err(mismatch(number, "timestamp not after parent"));
        }
        if header.gas_limit != parent.gas_limit {
            return Err(mismatch(number, "gas limit changed"));
        }
        if header.gas_used > header.gas_limit {
            return Err(mismatch(number, "gas used above limit"));
        }

        let expected_difficulty = if post_merge {
            Uint256::zero()
        } else {
            self.block_difficulty
        };
        if header.difficulty != expected_difficulty {
            return Err(mismatch(number, "difficulty"));
        }
        if post_merge && header.nonce != Hash64::zero() {
            return Err(mismatch(number, "non-zero nonce after the merge"));
        }

        let expected_base_fee = active(Fork::London)
            .then(|| calc_base_fee(parent, Uint256::from(GENESIS_BASE_FEE)));
        if header.base_fee_per_gas != expected_base_fee {
            return Err(mismatch(number, "base fee"));
        }
        let gated = [
            (header.withdrawals_root.is_some(), Fork::Shanghai),
            (header.blob_gas_used.is_some(), Fork::Cancun),
            (header.excess_blob_gas.is_some(), Fork::Cancun),
            (header.parent_beacon_block_root.is_some(), Fork::Cancun),
            (header.requests_hash.is_some(), Fork::Prague),
        ];
        if let Some((_, fork)) = gated.iter().find(|(present, fork)| *present != active(*fork)) {
            return Err(mismatch(number, &format!("{} header fields", fork)));
        }

        if let (Some(signer), false) = (self.signer, post_merge) {
            let sealer = clique_sealer(header)?;
            if sealer != signer {
                return Err(mismatch(
                    number,
                    &format!("sealed by {:?}, expected {:?}", sealer, signer),
                ));
            }
        }
        Ok(())
    }

    fn validate_body(&self, chain: &[Block], block: &Block) -> Result<(), Error> {
        let header = &block.header;
        let number = header.number;

        if transactions_root(&block.transactions) != header.transactions_root {
            return Err(mismatch(number, "transactions root"));
        }
        if ommers_hash(&block.uncles) != header.ommers_hash {
            return Err(mismatch(number, "ommers hash"));
        }
        match (&block.withdrawals, header.withdrawals_root) {
            (Some(ws), Some(root)) if Withdrawal::root(ws) == root => {}
            (None, None) => {}
            _ => return Err(mismatch(number, "withdrawals")),
        }

        if block.uncles.is_empty() {
            return Ok(());
        }
        if self.schedule.is_post_merge(number) || self.signer.is_some() {
            return Err(mismatch(number, "uncles in a block without proof of work"));
        }
        if block.uncles.len() > MAX_UNCLES {
            return Err(mismatch(number, "too many uncles"));
        }
        for uncle in &block.uncles {
            if uncle.number >= number || number - uncle.number > MAX_UNCLE_DEPTH {
                return Err(mismatch(number, "uncle height"));
            }
            let uncle_hash = uncle.hash();
            let uncle_parent = chain
                .get(uncle.number.saturating_sub(1) as usize)
                .map(|b| &b.header)
                .filter(|h| h.hash() == uncle.parent_hash);
            let is_ancestor = chain.iter().any(|b| b.hash() == uncle_hash);
            let uncle_parent = match uncle_parent {
                Some(h) if !is_ancestor => h,
                _ => return Err(mismatch(number, "uncle is not a sibling of an ancestor")),
            };
            if uncle.timestamp <= uncle_parent.timestamp {
                return Err(mismatch(number, "uncle timestamp"));
            }
            if uncle.difficulty != calc_difficulty(self.schedule, uncle.timestamp, uncle_parent) {
                return Err(mismatch(number, "uncle difficulty"));
            }
        }
        Ok(())
    }
}

/// The clique signer listed in the genesis extra data, if the chain uses clique.
fn clique_signer(genesis: &GenesisSpec) -> Result<Option<Address>, Error> {
    if !genesis.config.is_clique() {
        return Ok(None);
    }
    let extra = &genesis.extra_data;
    if extra.len() != EXTRA_VANITY + 20 + EXTRA_SEAL {
        return Err(Error::InvalidConfig(
            "clique genesis must list exactly one signer".into(),
        ));
    }
    Ok(Some(Address::from_slice(&extra[EXTRA_VANITY..EXTRA_VANITY + 20])))
}

/// Recovers the address that sealed a clique header.
fn clique_sealer(header: &Header) -> Result<Address, Error> {
    let extra = &header.extra_data;
    if extra.len() < EXTRA_VANITY + EXTRA_SEAL {
        return Err(mismatch(header.number, "extra data too short for a clique seal"));
    }
    let seal = &extra[extra.len() - EXTRA_SEAL..];
    let signature = RawSignature {
        recovery_id: seal[64],
        r: Uint256::from_big_endian(&seal[..32]),
        s: Uint256::from_big_endian(&seal[32..64]),
    };
    Ok(recover_address(header.seal_hash(EXTRA_SEAL), &signature)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::generator::generate;

    fn chain() -> Chain {
        generate(GeneratorConfig {
            chain_length: 4,
            last_fork: "cancun".into(),
            ..GeneratorConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn generated_chain_imports() {
        let chain = chain();
        let state = import(&chain.genesis, &chain.blocks[1..]).unwrap();
        assert_eq!(state.root(), chain.head().header.state_root);
    }

    #[test]
    fn tampered_state_root_is_rejected() {
        let chain = chain();
        let mut blocks = chain.blocks[1..].to_vec();
        blocks[1].header.state_root = Default::default();
        assert!(import(&chain.genesis, &blocks).is_err());
    }

    #[test]
    fn uncle_difficulty_is_checked() {
        let chain = generate(GeneratorConfig {
            chain_length: 4,
            last_fork: "byzantium".into(),
            modifiers: vec!["uncles".into()],
            ..GeneratorConfig::default()
        })
        .unwrap();
        let mut blocks = chain.blocks[1..4].to_vec();
        let block = &mut blocks[2];
        assert!(!block.uncles.is_empty());
        block.uncles[0].difficulty = Uint256::from(0x10);
        block.header.ommers_hash = ommers_hash(&block.uncles);
        match import(&chain.genesis, &blocks) {
            Err(Error::ReimportMismatch(reason)) => assert!(reason.contains("uncle difficulty")),
            other => panic!("unexpected import result {:?}", other.map(|s| s.root())),
        }
    }

    #[test]
    fn tampered_transaction_is_rejected() {
        let chain = chain();
        let mut blocks = chain.blocks[1..].to_vec();
        let with_txs = blocks
            .iter()
            .position(|b| !b.transactions.is_empty())
            .unwrap();
        blocks[with_txs].transactions.pop();
        assert!(matches!(
            import(&chain.genesis, &blocks),
            Err(Error::ReimportMismatch(_))
        ));
    }
}
