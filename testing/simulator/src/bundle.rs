//! A prepared consensus testnet: the execution genesis, the beacon genesis state, the consensus
//! configuration and the validator keystores.
//!
//! Directory layout:
//!
//! ```text
//! genesis.json              execution genesis
//! genesis.ssz               beacon genesis state
//! *.yaml                    consensus configuration files
//! keys/<index>/keystore.json
//! keys/<index>/secret
//! ```
use crate::params::load_genesis;
use hivechain::GenesisSpec;
use hivesim::{ClientFiles, ClientParams};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use verification::types::Epoch;
use verification::TestnetConfig;

/// Where clients expect the files of the bundle.
pub const INPUT_DIR: &str = "/hive/input";
const DEFAULT_SLOTS_PER_EPOCH: u64 = 32;
const DEFAULT_SECONDS_PER_SLOT: u64 = 12;
/// `FAR_FUTURE_EPOCH` of the consensus configuration, i.e. a fork that is never scheduled.
const FAR_FUTURE_EPOCH: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub struct ValidatorKey {
    pub index: usize,
    /// Hex encoded BLS public key, without prefix.
    pub pubkey: String,
    pub keystore: Vec<u8>,
    pub secret: Vec<u8>,
}

/// A configuration file and its top-level scalar entries.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub name: String,
    pub contents: String,
    pub values: BTreeMap<String, String>,
}

impl ConfigFile {
    pub fn parse(name: String, contents: String) -> Result<Self, String> {
        let document: Value = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Invalid configuration {}: {:?}", name, e))?;
        let values = match document {
            Value::Mapping(mapping) => mapping
                .into_iter()
                .filter_map(|(key, value)| Some((key.as_str()?.to_string(), scalar(value)?)))
                .collect(),
            // Lists of keys or mnemonics are shipped as-is.
            _ => BTreeMap::new(),
        };
        Ok(Self {
            name,
            contents,
            values,
        })
    }
}

fn scalar(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub struct ConsensusBundle {
    pub dir: PathBuf,
    pub genesis: GenesisSpec,
    pub execution_params: ClientParams,
    pub genesis_state: Vec<u8>,
    /// Sorted by file name.
    pub configs: Vec<ConfigFile>,
    /// Sorted by index.
    pub keys: Vec<ValidatorKey>,
}

impl ConsensusBundle {
    pub fn load(dir: &Path) -> Result<Self, String> {
        let (genesis, execution_params) = load_genesis(&dir.join("genesis.json"))?;
        let state_path = dir.join("genesis.ssz");
        let genesis_state = fs::read(&state_path)
            .map_err(|e| format!("Failed to read {}: {:?}", state_path.display(), e))?;

        let mut configs = vec![];
        for path in read_dir(dir)? {
            if path.extension().map_or(false, |ext| ext == "yaml") {
                let name = file_name(&path)?;
                let contents = fs::read_to_string(&path)
                    .map_err(|e| format!("Failed to read {}: {:?}", path.display(), e))?;
                configs.push(ConfigFile::parse(name, contents)?);
            }
        }
        configs.sort_by(|a, b| a.name.cmp(&b.name));

        let keys = load_keys(&dir.join("keys"))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            genesis,
            execution_params,
            genesis_state,
            configs,
            keys,
        })
    }

    /// Genesis time of the beacon state, its first serialized field.
    pub fn genesis_time(&self) -> Result<u64, String> {
        let bytes: [u8; 8] = self
            .genesis_state
            .get(..8)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| "Beacon genesis state is too short".to_string())?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// The value of a top-level scalar entry of the configuration files.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.configs
            .iter()
            .find_map(|config| config.values.get(key))
            .map(String::as_str)
    }

    fn config_u64(&self, key: &str) -> Result<Option<u64>, String> {
        self.config_value(key)
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|e| format!("Invalid {} {:?}: {:?}", key, value, e))
            })
            .transpose()
    }

    pub fn slots_per_epoch(&self) -> Result<u64, String> {
        Ok(self
            .config_u64("SLOTS_PER_EPOCH")?
            .unwrap_or(DEFAULT_SLOTS_PER_EPOCH))
    }

    pub fn seconds_per_slot(&self) -> Result<u64, String> {
        Ok(self
            .config_u64("SECONDS_PER_SLOT")?
            .unwrap_or(DEFAULT_SECONDS_PER_SLOT))
    }

    pub fn bellatrix_fork_epoch(&self) -> Result<Option<Epoch>, String> {
        Ok(self
            .config_u64("BELLATRIX_FORK_EPOCH")?
            .filter(|epoch| *epoch != FAR_FUTURE_EPOCH))
    }

    pub fn deposit_contract_address(&self) -> Option<&str> {
        self.config_value("DEPOSIT_CONTRACT_ADDRESS")
    }

    /// Checks configuration for a testnet where every validator client gets at least one key.
    pub fn testnet_config(&self, clients: usize) -> Result<TestnetConfig, String> {
        if self.keys.len() < clients {
            return Err(format!(
                "{} validator keys cannot be split over {} clients",
                self.keys.len(),
                clients
            ));
        }
        Ok(TestnetConfig {
            slots_per_epoch: self.slots_per_epoch()?,
            seconds_per_slot: self.seconds_per_slot()?,
            genesis_time: Some(self.genesis_time()?),
            bellatrix_fork_epoch: self.bellatrix_fork_epoch()?,
            ..TestnetConfig::default()
        }
        .with_validators_split_evenly(self.keys.len(), clients))
    }

    /// Contiguous key ranges, one per client. Any remainder goes to the last client.
    pub fn key_tranches(&self, clients: usize) -> Vec<Range<usize>> {
        let total = self.keys.len();
        if clients == 0 {
            return vec![];
        }
        let per_client = total / clients;
        (0..clients)
            .map(|i| {
                let start = i * per_client;
                let end = if i + 1 == clients {
                    total
                } else {
                    start + per_client
                };
                start..end
            })
            .collect()
    }

    /// The beacon genesis state and the configuration files.
    pub fn consensus_files(&self) -> ClientFiles {
        self.configs.iter().fold(
            ClientFiles::new().add(
                format!("{}/genesis.ssz", INPUT_DIR),
                self.genesis_state.clone(),
            ),
            |files, config| {
                files.add(
                    format!("{}/{}", INPUT_DIR, config.name),
                    config.contents.as_bytes(),
                )
            },
        )
    }

    /// The configuration files plus the keystores and secrets of `range`.
    pub fn validator_files(&self, range: Range<usize>) -> Result<ClientFiles, String> {
        let keys = self.keys.get(range.clone()).ok_or_else(|| {
            format!(
                "Key range {:?} exceeds the {} keys of the bundle",
                range,
                self.keys.len()
            )
        })?;
        Ok(keys.iter().fold(self.consensus_files(), |files, key| {
            files
                .add(
                    format!("{}/keystores/0x{}/keystore.json", INPUT_DIR, key.pubkey),
                    key.keystore.clone(),
                )
                .add(
                    format!("{}/secrets/0x{}", INPUT_DIR, key.pubkey),
                    key.secret.clone(),
                )
        }))
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries =
        fs::read_dir(dir).map_err(|e| format!("Failed to read {}: {:?}", dir.display(), e))?;
    entries
        .map(|entry| {
            entry
                .map(|entry| entry.path())
                .map_err(|e| format!("Failed to read {}: {:?}", dir.display(), e))
        })
        .collect()
}

fn file_name(path: &Path) -> Result<String, String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("Invalid file name {}", path.display()))
}

fn load_keys(dir: &Path) -> Result<Vec<ValidatorKey>, String> {
    let mut keys = vec![];
    for path in read_dir(dir)? {
        if !path.is_dir() {
            continue;
        }
        let name = file_name(&path)?;
        let index = name
            .parse::<usize>()
            .map_err(|e| format!("Invalid key directory {}: {:?}", path.display(), e))?;

        let keystore_path = path.join("keystore.json");
        let keystore = fs::read(&keystore_path)
            .map_err(|e| format!("Failed to read {}: {:?}", keystore_path.display(), e))?;
        let pubkey = keystore_pubkey(&keystore)
            .map_err(|e| format!("Invalid keystore {}: {}", keystore_path.display(), e))?;
        let secret_path = path.join("secret");
        let secret = fs::read(&secret_path)
            .map_err(|e| format!("Failed to read {}: {:?}", secret_path.display(), e))?;

        keys.push(ValidatorKey {
            index,
            pubkey,
            keystore,
            secret,
        });
    }
    keys.sort_by_key(|key| key.index);
    Ok(keys)
}

fn keystore_pubkey(keystore: &[u8]) -> Result<String, String> {
    let json: serde_json::Value =
        serde_json::from_slice(keystore).map_err(|e| format!("{:?}", e))?;
    let pubkey = json
        .get("pubkey")
        .and_then(|pubkey| pubkey.as_str())
        .ok_or_else(|| "missing pubkey".to_string())?;
    Ok(pubkey.trim_start_matches("0x").to_lowercase())
}
