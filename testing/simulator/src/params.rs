//! Client environments derived from a genesis file.
use hivechain::GenesisSpec;
use hivesim::ClientParams;
use std::path::Path;
use types::{Hash256, Uint256};

/// Loads `genesis.json` and the hive variables describing its chain configuration.
pub fn load_genesis(path: &Path) -> Result<(GenesisSpec, ClientParams), String> {
    let genesis = GenesisSpec::load(path)
        .map_err(|e| format!("Failed to load genesis {}: {:?}", path.display(), e))?;
    let params = execution_params(&genesis)?;
    Ok((genesis, params))
}

/// Chain id, fork activations, TTD and clique period of `genesis` as hive client variables.
pub fn execution_params(genesis: &GenesisSpec) -> Result<ClientParams, String> {
    let config = &genesis.config;
    let schedule = genesis
        .schedule()
        .map_err(|e| format!("Invalid genesis fork schedule: {:?}", e))?;

    let mut params = ClientParams::new()
        .chain_id(config.chain_id)
        .network_id(config.chain_id);
    for (fork, activation) in schedule.iter() {
        params = params.set(fork.env_var(), activation.value());
    }
    if let Some(ttd) = config.terminal_total_difficulty {
        params = params.terminal_total_difficulty(Uint256::from(ttd));
    }
    if let Some(clique) = &config.clique {
        params = params.clique_period(clique.period);
    }
    Ok(params)
}

pub fn genesis_hash(genesis: &GenesisSpec) -> Result<Hash256, String> {
    genesis
        .header()
        .map(|header| header.hash())
        .map_err(|e| format!("Failed to compute the genesis header: {:?}", e))
}

#[cfg(test)]
mod test {
    use super::*;

    const GENESIS: &str = r#"{
        "config": {
            "chainId": 7,
            "homesteadBlock": 0,
            "eip150Block": 0,
            "eip155Block": 0,
            "eip158Block": 0,
            "byzantiumBlock": 0,
            "constantinopleBlock": 0,
            "petersburgBlock": 0,
            "istanbulBlock": 0,
            "berlinBlock": 0,
            "londonBlock": 0,
            "terminalTotalDifficulty": 196608,
            "ethash": {}
        },
        "gasLimit": "0x1c9c380",
        "difficulty": "0x20000",
        "alloc": {}
    }"#;

    #[test]
    fn params_from_genesis() {
        let genesis: GenesisSpec = serde_json::from_str(GENESIS).unwrap();
        let params = execution_params(&genesis).unwrap();
        assert_eq!(params.get("HIVE_CHAIN_ID"), Some("7"));
        assert_eq!(params.get("HIVE_NETWORK_ID"), Some("7"));
        assert_eq!(params.get("HIVE_FORK_LONDON"), Some("0"));
        assert_eq!(params.get("HIVE_TERMINAL_TOTAL_DIFFICULTY"), Some("196608"));
        assert_eq!(params.get("HIVE_CLIQUE_PERIOD"), None);
        assert_eq!(params.get("HIVE_SHANGHAI_TIMESTAMP"), None);

        assert_eq!(genesis_hash(&genesis).unwrap(), genesis_hash(&genesis).unwrap());
        assert!(!genesis_hash(&genesis).unwrap().is_zero());
    }
}
