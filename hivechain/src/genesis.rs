use crate::contracts;
use crate::forks::{Activation, Fork, ForkSchedule};
use crate::state::{State, StateAccount};
use crate::Error;
use engine_api::block_hash::requests_hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use types::{empty_trie_root, Account, Address, Block, Hash256, Hash64, Header, Uint256};

pub const CHAIN_ID: u64 = 3503995874084926;
pub const GENESIS_BASE_FEE: u64 = 1_000_000_000;
/// The gas limit of the genesis block is a multiple of this.
pub const GAS_LIMIT_UNIT: u64 = 4_712_388;
pub const DEFAULT_GAS_LIMIT: u64 = GAS_LIMIT_UNIT * 8;
pub const ETHASH_GENESIS_DIFFICULTY: u64 = 131_072;
pub const CLIQUE_GENESIS_DIFFICULTY: u64 = 1;
pub const ETHASH_BLOCK_DIFFICULTY: u64 = 0x10;
/// Difficulty of an in-turn clique block.
pub const CLIQUE_BLOCK_DIFFICULTY: u64 = 2;
pub const CLIQUE_EPOCH: u64 = 30_000;
pub const EXTRA_VANITY: usize = 32;
pub const EXTRA_SEAL: usize = 65;
const GENESIS_EXTRA: &[u8] = b"hivechain";

/// Balance of every roster account, 10^36 wei.
pub fn initial_balance() -> Uint256 {
    Uint256::exp10(36)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliqueConfig {
    pub period: u64,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EthashConfig {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobConfig {
    pub target: u64,
    pub max: u64,
    pub base_fee_update_fraction: u64,
}

/// Chain configuration in the layout of a geth genesis file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homestead_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip150_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip155_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip158_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byzantium_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constantinople_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub petersburg_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istanbul_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muir_glacier_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub berlin_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub london_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrow_glacier_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gray_glacier_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_netsplit_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shanghai_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancun_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prague_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_total_difficulty: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal_total_difficulty_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethash: Option<EthashConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clique: Option<CliqueConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blob_schedule: BTreeMap<String, BlobConfig>,
}

impl ChainConfig {
    fn fork_field(&mut self, fork: Fork) -> &mut Option<u64> {
        match fork {
            Fork::Homestead => &mut self.homestead_block,
            Fork::TangerineWhistle => &mut self.eip150_block,
            Fork::SpuriousDragon => &mut self.eip158_block,
            Fork::Byzantium => &mut self.byzantium_block,
            Fork::Constantinople => &mut self.constantinople_block,
            Fork::Petersburg => &mut self.petersburg_block,
            Fork::Istanbul => &mut self.istanbul_block,
            Fork::MuirGlacier => &mut self.muir_glacier_block,
            Fork::Berlin => &mut self.berlin_block,
            Fork::London => &mut self.london_block,
            Fork::ArrowGlacier => &mut self.arrow_glacier_block,
            Fork::GrayGlacier => &mut self.gray_glacier_block,
            Fork::Merge => &mut self.merge_netsplit_block,
            Fork::Shanghai => &mut self.shanghai_time,
            Fork::Cancun => &mut self.cancun_time,
            Fork::Prague => &mut self.prague_time,
        }
    }

    pub fn new(chain_id: u64, schedule: &ForkSchedule, clique_period: Option<u64>) -> Self {
        let mut config = ChainConfig {
            chain_id,
            ..ChainConfig::default()
        };
        for (fork, activation) in schedule.iter() {
            *config.fork_field(fork) = Some(activation.value());
        }
        config.eip155_block = config.eip158_block;

        match clique_period {
            Some(period) => {
                config.clique = Some(CliqueConfig {
                    period,
                    epoch: CLIQUE_EPOCH,
                })
            }
            None => config.ethash = Some(EthashConfig {}),
        }

        let (genesis_difficulty, block_difficulty) = difficulties(clique_period.is_some());
        config.terminal_total_difficulty =
            schedule.terminal_total_difficulty(genesis_difficulty, block_difficulty);
        config.terminal_total_difficulty_passed = schedule.merge_block() == Some(0);

        if config.cancun_time.is_some() {
            config.blob_schedule.insert(
                "cancun".to_string(),
                BlobConfig {
                    target: 3,
                    max: 6,
                    base_fee_update_fraction: 3_338_477,
                },
            );
        }
        if config.prague_time.is_some() {
            config.blob_schedule.insert(
                "prague".to_string(),
                BlobConfig {
                    target: 6,
                    max: 9,
                    base_fee_update_fraction: 5_007_716,
                },
            );
        }
        config
    }

    /// Recovers the fork schedule from the activation fields.
    pub fn schedule(&self) -> Result<ForkSchedule, Error> {
        let mut copy = self.clone();
        let mut activations = vec![];
        for fork in <Fork as strum::IntoEnumIterator>::iter() {
            if let Some(value) = *copy.fork_field(fork) {
                let activation = if fork.is_time_based() {
                    Activation::Time(value)
                } else {
                    Activation::Block(value)
                };
                activations.push((fork, activation));
            }
        }
        ForkSchedule::from_activations(activations)
    }

    pub fn is_clique(&self) -> bool {
        self.clique.is_some()
    }
}

/// Difficulty of the genesis block and of every proof-of-work block after it.
pub fn difficulties(clique: bool) -> (u64, u64) {
    if clique {
        (CLIQUE_GENESIS_DIFFICULTY, CLIQUE_BLOCK_DIFFICULTY)
    } else {
        (ETHASH_GENESIS_DIFFICULTY, ETHASH_BLOCK_DIFFICULTY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub balance: Uint256,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "serde_utils::hex_vec"
    )]
    pub code: Vec<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<Hash256, Hash256>,
    #[serde(
        default,
        skip_serializing_if = "is_zero",
        with = "serde_utils::u64_hex_be"
    )]
    pub nonce: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// The genesis file: chain configuration, genesis header fields and the initial allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisSpec {
    pub config: ChainConfig,
    #[serde(default, with = "serde_utils::u64_hex_be")]
    pub nonce: u64,
    #[serde(default, with = "serde_utils::u64_hex_be")]
    pub timestamp: u64,
    #[serde(default, with = "serde_utils::hex_vec")]
    pub extra_data: Vec<u8>,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub gas_limit: u64,
    pub difficulty: Uint256,
    #[serde(default)]
    pub mix_hash: Hash256,
    #[serde(default)]
    pub coinbase: Address,
    pub alloc: BTreeMap<Address, GenesisAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<Uint256>,
}

impl GenesisSpec {
    /// The standard genesis: every roster account funded, plus the system and test contracts.
    /// `signer` selects clique sealing with the given account.
    pub fn new(
        chain_id: u64,
        schedule: &ForkSchedule,
        gas_limit: u64,
        block_time: u64,
        accounts: &[Account],
        signer: Option<&Account>,
    ) -> Self {
        let config = ChainConfig::new(chain_id, schedule, signer.map(|_| block_time));
        let (difficulty, _) = difficulties(signer.is_some());

        let extra_data = match signer {
            Some(signer) => {
                let mut extra = GENESIS_EXTRA.to_vec();
                extra.resize(EXTRA_VANITY, 0);
                extra.extend_from_slice(signer.address.as_bytes());
                extra.resize(extra.len() + EXTRA_SEAL, 0);
                extra
            }
            None => GENESIS_EXTRA.to_vec(),
        };

        let mut alloc: BTreeMap<Address, GenesisAccount> = accounts
            .iter()
            .map(|account| {
                let funded = GenesisAccount {
                    balance: initial_balance(),
                    ..GenesisAccount::default()
                };
                (account.address, funded)
            })
            .collect();
        for contract in contracts::system_contracts() {
            alloc.insert(
                contract.address(),
                GenesisAccount {
                    code: contract.code.to_vec(),
                    nonce: 1,
                    ..GenesisAccount::default()
                },
            );
        }
        alloc.insert(
            contracts::emit_address(),
            GenesisAccount {
                code: contracts::EMIT_CODE.to_vec(),
                nonce: 1,
                ..GenesisAccount::default()
            },
        );
        alloc.insert(
            contracts::large_logs_address(),
            GenesisAccount {
                code: contracts::LARGE_LOGS_CODE.to_vec(),
                nonce: 1,
                ..GenesisAccount::default()
            },
        );

        let base_fee_per_gas = schedule
            .is_active(Fork::London, 0, 0)
            .then(|| Uint256::from(GENESIS_BASE_FEE));

        GenesisSpec {
            config,
            nonce: 0,
            timestamp: 0,
            extra_data,
            gas_limit,
            difficulty: Uint256::from(difficulty),
            mix_hash: Hash256::zero(),
            coinbase: Address::zero(),
            alloc,
            base_fee_per_gas,
        }
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn schedule(&self) -> Result<ForkSchedule, Error> {
        self.config.schedule()
    }

    /// Difficulty assigned to every proof-of-work block after genesis.
    pub fn block_difficulty(&self) -> u64 {
        difficulties(self.config.is_clique()).1
    }

    pub fn state(&self) -> State {
        let mut state = State::default();
        for (address, account) in &self.alloc {
            state.insert(
                *address,
                StateAccount {
                    nonce: account.nonce,
                    balance: account.balance,
                    code: account.code.clone(),
                    storage: account.storage.clone(),
                },
            );
        }
        state
    }

    pub fn header(&self) -> Result<Header, Error> {
        let schedule = self.schedule()?;
        let active = |fork| schedule.is_active(fork, 0, self.timestamp);
        let base_fee_per_gas = active(Fork::London).then(|| {
            self.base_fee_per_gas
                .unwrap_or_else(|| Uint256::from(GENESIS_BASE_FEE))
        });

        Ok(Header {
            beneficiary: self.coinbase,
            state_root: self.state().root(),
            difficulty: self.difficulty,
            number: 0,
            gas_limit: self.gas_limit,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            mix_hash: self.mix_hash,
            nonce: Hash64::from_low_u64_be(self.nonce),
            base_fee_per_gas,
            withdrawals_root: active(Fork::Shanghai).then(empty_trie_root),
            blob_gas_used: active(Fork::Cancun).then_some(0),
            excess_blob_gas: active(Fork::Cancun).then_some(0),
            parent_beacon_block_root: active(Fork::Cancun).then(Hash256::zero),
            requests_hash: active(Fork::Prague).then(|| requests_hash(&[])),
            ..Header::default()
        })
    }

    pub fn block(&self) -> Result<Block, Error> {
        let header = self.header()?;
        let withdrawals = header.withdrawals_root.map(|_| vec![]);
        Ok(Block {
            header,
            transactions: vec![],
            uncles: vec![],
            withdrawals,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::accounts::{known_accounts, CLIQUE_SIGNER_INDEX};

    fn spec(last_fork: &str, clique: bool) -> GenesisSpec {
        let schedule = ForkSchedule::schedule(0, 10, last_fork, 10).unwrap();
        let accounts = known_accounts().unwrap();
        let signer = clique.then(|| &accounts[CLIQUE_SIGNER_INDEX]);
        GenesisSpec::new(CHAIN_ID, &schedule, DEFAULT_GAS_LIMIT, 10, &accounts, signer)
    }

    #[test]
    fn fork_gated_header_fields() {
        let header = spec("prague", false).header().unwrap();
        assert_eq!(header.base_fee_per_gas, Some(Uint256::from(GENESIS_BASE_FEE)));
        assert_eq!(header.withdrawals_root, Some(empty_trie_root()));
        assert_eq!(header.blob_gas_used, Some(0));
        assert!(header.requests_hash.is_some());

        let header = spec("byzantium", false).header().unwrap();
        assert_eq!(header.base_fee_per_gas, None);
        assert_eq!(header.difficulty, Uint256::from(ETHASH_GENESIS_DIFFICULTY));
        assert_eq!(header.extra_data, b"hivechain".to_vec());
    }

    #[test]
    fn merged_at_genesis() {
        let spec = spec("", false);
        assert_eq!(
            spec.config.terminal_total_difficulty,
            Some(ETHASH_GENESIS_DIFFICULTY)
        );
        assert!(spec.config.terminal_total_difficulty_passed);
        assert_eq!(spec.config.eip155_block, Some(0));
    }

    #[test]
    fn clique_extra_data() {
        let spec = spec("london", true);
        assert_eq!(spec.extra_data.len(), EXTRA_VANITY + 20 + EXTRA_SEAL);
        assert_eq!(spec.difficulty, Uint256::from(CLIQUE_GENESIS_DIFFICULTY));
        assert_eq!(spec.config.clique.unwrap().period, 10);
        assert_eq!(spec.block_difficulty(), CLIQUE_BLOCK_DIFFICULTY);
    }

    #[test]
    fn json_round_trip_keeps_schedule() {
        let spec = spec("cancun", false);
        let json = serde_json::to_string_pretty(&spec).unwrap();
        assert!(json.contains("\"cancunTime\": 0"));
        assert!(json.contains("\"eip150Block\": 0"));
        let decoded: GenesisSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, spec);
        assert_eq!(decoded.schedule().unwrap(), spec.schedule().unwrap());
        assert_eq!(decoded.state().root(), spec.state().root());
        // 20 roster accounts, 4 system contracts, the emit and large-log contracts
        assert_eq!(decoded.alloc.len(), 26);
    }

    #[test]
    fn system_contracts_in_alloc() {
        let spec = spec("prague", false);
        for contract in contracts::system_contracts() {
            let account = &spec.alloc[&contract.address()];
            assert_eq!(account.code, contract.code);
            assert_eq!(account.nonce, 1);
        }
    }
}
