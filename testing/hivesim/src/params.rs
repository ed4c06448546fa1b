use crate::Error;
use std::collections::BTreeMap;
use std::path::Path;
use types::Uint256;

pub const HIVE_NETWORK_ID: &str = "HIVE_NETWORK_ID";
pub const HIVE_CHAIN_ID: &str = "HIVE_CHAIN_ID";
pub const HIVE_FORK_HOMESTEAD: &str = "HIVE_FORK_HOMESTEAD";
pub const HIVE_FORK_TANGERINE: &str = "HIVE_FORK_TANGERINE";
pub const HIVE_FORK_SPURIOUS: &str = "HIVE_FORK_SPURIOUS";
pub const HIVE_FORK_BYZANTIUM: &str = "HIVE_FORK_BYZANTIUM";
pub const HIVE_FORK_CONSTANTINOPLE: &str = "HIVE_FORK_CONSTANTINOPLE";
pub const HIVE_FORK_PETERSBURG: &str = "HIVE_FORK_PETERSBURG";
pub const HIVE_FORK_ISTANBUL: &str = "HIVE_FORK_ISTANBUL";
pub const HIVE_FORK_MUIR_GLACIER: &str = "HIVE_FORK_MUIR_GLACIER";
pub const HIVE_FORK_BERLIN: &str = "HIVE_FORK_BERLIN";
pub const HIVE_FORK_LONDON: &str = "HIVE_FORK_LONDON";
pub const HIVE_FORK_ARROW_GLACIER: &str = "HIVE_FORK_ARROW_GLACIER";
pub const HIVE_FORK_GRAY_GLACIER: &str = "HIVE_FORK_GRAY_GLACIER";
pub const HIVE_MERGE_BLOCK_ID: &str = "HIVE_MERGE_BLOCK_ID";
pub const HIVE_TERMINAL_TOTAL_DIFFICULTY: &str = "HIVE_TERMINAL_TOTAL_DIFFICULTY";
pub const HIVE_SHANGHAI_TIMESTAMP: &str = "HIVE_SHANGHAI_TIMESTAMP";
pub const HIVE_CANCUN_TIMESTAMP: &str = "HIVE_CANCUN_TIMESTAMP";
pub const HIVE_PRAGUE_TIMESTAMP: &str = "HIVE_PRAGUE_TIMESTAMP";
pub const HIVE_CLIQUE_PERIOD: &str = "HIVE_CLIQUE_PERIOD";
pub const HIVE_JWTSECRET: &str = "HIVE_JWTSECRET";
pub const HIVE_BOOTNODE: &str = "HIVE_BOOTNODE";
pub const HIVE_LOGLEVEL: &str = "HIVE_LOGLEVEL";

/// Block-number activated forks, in activation order.
pub const FORK_BLOCK_VARS: [&str; 12] = [
    HIVE_FORK_HOMESTEAD,
    HIVE_FORK_TANGERINE,
    HIVE_FORK_SPURIOUS,
    HIVE_FORK_BYZANTIUM,
    HIVE_FORK_CONSTANTINOPLE,
    HIVE_FORK_PETERSBURG,
    HIVE_FORK_ISTANBUL,
    HIVE_FORK_MUIR_GLACIER,
    HIVE_FORK_BERLIN,
    HIVE_FORK_LONDON,
    HIVE_FORK_ARROW_GLACIER,
    HIVE_FORK_GRAY_GLACIER,
];

/// Environment of a client container.
///
/// The builder methods consume and return the parameters, so a shared base configuration can be
/// cloned and specialised per client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientParams(BTreeMap<String, String>);

impl ClientParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters from a hivechain `forkenv.json`.
    pub fn from_fork_env_json(json: &str) -> Result<Self, Error> {
        Ok(Self(serde_json::from_str(json)?))
    }

    pub fn from_fork_env_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::from_fork_env_json(&std::fs::read_to_string(path)?)
    }

    pub fn set(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.0.remove(key);
        self
    }

    /// Adds every entry of `other`, overriding existing keys.
    pub fn merge(mut self, other: &ClientParams) -> Self {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn network_id(self, id: u64) -> Self {
        self.set(HIVE_NETWORK_ID, id)
    }

    pub fn chain_id(self, id: u64) -> Self {
        self.set(HIVE_CHAIN_ID, id)
    }

    /// Activates every block-number fork from homestead to gray glacier at genesis.
    pub fn all_block_forks_at_genesis(self) -> Self {
        FORK_BLOCK_VARS
            .iter()
            .fold(self, |params, var| params.set(*var, 0))
    }

    pub fn fork_block(self, var: &str, number: u64) -> Self {
        self.set(var, number)
    }

    pub fn merge_block(self, number: u64) -> Self {
        self.set(HIVE_MERGE_BLOCK_ID, number)
    }

    pub fn terminal_total_difficulty(self, ttd: Uint256) -> Self {
        self.set(HIVE_TERMINAL_TOTAL_DIFFICULTY, ttd)
    }

    pub fn shanghai_timestamp(self, timestamp: u64) -> Self {
        self.set(HIVE_SHANGHAI_TIMESTAMP, timestamp)
    }

    pub fn cancun_timestamp(self, timestamp: u64) -> Self {
        self.set(HIVE_CANCUN_TIMESTAMP, timestamp)
    }

    pub fn prague_timestamp(self, timestamp: u64) -> Self {
        self.set(HIVE_PRAGUE_TIMESTAMP, timestamp)
    }

    pub fn clique_period(self, seconds: u64) -> Self {
        self.set(HIVE_CLIQUE_PERIOD, seconds)
    }

    /// The hex-encoded engine API JWT secret.
    pub fn jwt_secret(self, secret: &[u8]) -> Self {
        self.set(HIVE_JWTSECRET, format!("0x{}", hex::encode(secret)))
    }

    pub fn bootnode(self, enode: impl ToString) -> Self {
        self.set(HIVE_BOOTNODE, enode)
    }

    pub fn log_level(self, level: u8) -> Self {
        self.set(HIVE_LOGLEVEL, level)
    }

    pub(crate) fn into_environment(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Files copied into a client container, keyed by destination path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientFiles(BTreeMap<String, Vec<u8>>);

impl ClientFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, destination: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.0.insert(destination.into(), contents.into());
        self
    }

    /// Reads `source` from the local filesystem.
    pub fn add_from_path<P: AsRef<Path>>(
        self,
        destination: impl Into<String>,
        source: P,
    ) -> Result<Self, Error> {
        let contents = std::fs::read(source)?;
        Ok(self.add(destination, contents))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.0.iter()
    }
}
