use crate::forks::last_fork_index;
use crate::genesis::{CHAIN_ID, DEFAULT_GAS_LIMIT};
use crate::modifiers::MODIFIER_NAMES;
use crate::Error;
use std::path::PathBuf;

/// Every output file the generator can write, sorted.
pub const OUTPUT_NAMES: &[&str] = &[
    "accounts",
    "chain",
    "fcu",
    "forkenv",
    "genesis",
    "headblock",
    "headfcu",
    "headnewpayload",
    "headstate",
    "newpayload",
    "powchain",
    "txinfo",
];

/// Parameters of one generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Number of blocks after genesis.
    pub chain_length: u64,
    /// Seconds between blocks.
    pub block_time: u64,
    /// Modifiers run in every `tx_interval`-th block. Zero disables them.
    pub tx_interval: u64,
    /// Upper bound of modifier applications per block.
    pub tx_count: usize,
    /// Blocks between fork activations. Zero activates every fork at genesis.
    pub fork_interval: u64,
    /// Last fork to enable. Empty enables all of them.
    pub last_fork: String,
    /// Seal blocks with clique instead of ethash.
    pub clique: bool,
    pub gas_limit: u64,
    pub chain_id: u64,
    /// Modifier names. Empty selects every registered modifier.
    pub modifiers: Vec<String>,
    /// An existing genesis.json. Its config replaces the generated fork schedule.
    pub genesis: Option<PathBuf>,
    pub out_dir: PathBuf,
    /// Output names. Empty selects every output.
    pub outputs: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            chain_length: 2,
            block_time: 10,
            tx_interval: 1,
            tx_count: 10,
            fork_interval: 0,
            last_fork: String::new(),
            clique: false,
            gas_limit: DEFAULT_GAS_LIMIT,
            chain_id: CHAIN_ID,
            modifiers: vec![],
            genesis: None,
            out_dir: PathBuf::from("."),
            outputs: vec![],
        }
    }
}

impl GeneratorConfig {
    /// Validates the configuration and fills in the "everything" defaults of empty lists.
    pub fn with_defaults(mut self) -> Result<Self, Error> {
        if self.block_time == 0 {
            return Err(Error::InvalidConfig("block time must be positive".into()));
        }
        if self.gas_limit == 0 {
            return Err(Error::InvalidConfig("gas limit must be positive".into()));
        }
        last_fork_index(&self.last_fork)?;

        if self.modifiers.is_empty() {
            self.modifiers = MODIFIER_NAMES.iter().map(|s| s.to_string()).collect();
        }
        if let Some(name) = self
            .modifiers
            .iter()
            .find(|name| !MODIFIER_NAMES.contains(&name.as_str()))
        {
            return Err(Error::UnknownModifier(name.clone()));
        }

        if self.outputs.is_empty() {
            self.outputs = OUTPUT_NAMES.iter().map(|s| s.to_string()).collect();
        }
        if let Some(name) = self
            .outputs
            .iter()
            .find(|name| !OUTPUT_NAMES.contains(&name.as_str()))
        {
            return Err(Error::UnknownOutput(name.clone()));
        }
        Ok(self)
    }
}

/// Splits a comma separated list, dropping empty entries.
pub fn split_and_trim(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
