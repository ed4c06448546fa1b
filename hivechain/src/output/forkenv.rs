use super::write_json;
use crate::generator::Chain;
use crate::Error;
use std::collections::BTreeMap;
use std::path::Path;

/// The hive client environment describing the chain's fork configuration.
pub fn fork_env(chain: &Chain) -> BTreeMap<String, String> {
    let config = &chain.genesis.config;
    let mut env = BTreeMap::new();
    env.insert("HIVE_CHAIN_ID".to_string(), config.chain_id.to_string());
    env.insert("HIVE_NETWORK_ID".to_string(), config.chain_id.to_string());
    if let Some(clique) = &config.clique {
        env.insert("HIVE_CLIQUE_PERIOD".to_string(), clique.period.to_string());
    }

    for (fork, activation) in chain.schedule.iter() {
        env.insert(fork.env_var().to_string(), activation.value().to_string());
    }
    if let Some(ttd) = config.terminal_total_difficulty {
        env.insert("HIVE_TERMINAL_TOTAL_DIFFICULTY".to_string(), ttd.to_string());
    }

    for (fork, blobs) in &config.blob_schedule {
        let prefix = format!("HIVE_{}_BLOB", fork.to_uppercase());
        env.insert(format!("{}_TARGET", prefix), blobs.target.to_string());
        env.insert(format!("{}_MAX", prefix), blobs.max.to_string());
        env.insert(
            format!("{}_BASE_FEE_UPDATE_FRACTION", prefix),
            blobs.base_fee_update_fraction.to_string(),
        );
    }
    env
}

pub(super) fn write_fork_env(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(dir, "forkenv.json", &fork_env(chain))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::generator::generate;

    #[test]
    fn staggered_forks() {
        let chain = generate(GeneratorConfig {
            chain_length: 6,
            fork_interval: 2,
            last_fork: "byzantium".into(),
            tx_interval: 0,
            clique: true,
            ..GeneratorConfig::default()
        })
        .unwrap();
        let env = fork_env(&chain);
        assert_eq!(env["HIVE_FORK_HOMESTEAD"], "0");
        assert_eq!(env["HIVE_FORK_TANGERINE"], "2");
        assert_eq!(env["HIVE_FORK_SPURIOUS"], "4");
        assert_eq!(env["HIVE_FORK_BYZANTIUM"], "6");
        assert_eq!(env["HIVE_CLIQUE_PERIOD"], "10");
        assert!(!env.contains_key("HIVE_FORK_LONDON"));
        assert!(!env.contains_key("HIVE_TERMINAL_TOTAL_DIFFICULTY"));
        assert_eq!(env["HIVE_CHAIN_ID"], "3503995874084926");
    }
}
