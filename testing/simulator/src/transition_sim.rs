//! A testnet of execution, beacon and validator clients starting with the merge at genesis.
use crate::bundle::ConsensusBundle;
use crate::clients::{consensus_pairs, execution_clients, ConsensusPair};
use crate::params::genesis_hash;
use hivesim::{Client, ClientFiles, ClientParams, Simulation, Test, TestResult};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use types::Uint256;
use url::Url;
use verification::types::BlockId;
use verification::{BeaconClient, BeaconNodeHttpClient, Node, Testnet, VerificationSlot};

pub const SUITE_NAME: &str = "merge-transition";
pub const TRANSITION_TEST: &str = "transition-at-genesis";

const BEACON_API_PORT: u16 = 4000;
const BEACON_GRPC_PORT: u16 = 4001;
const METRICS_PORT: u16 = 8080;
const EXECUTION_RPC_PORT: u16 = 8545;
const ENGINE_RPC_PORT: u16 = 8551;

#[derive(Debug, Clone)]
pub struct TransitionSimConfig {
    pub testnet_dir: PathBuf,
    pub nodes: usize,
    pub finality_epochs: u64,
    pub min_participation: f64,
}

/// Runs the transition test once for every combination of execution client and consensus client
/// pair.
pub async fn run_transition_sim(
    sim: &Simulation,
    config: &TransitionSimConfig,
) -> Result<Vec<TestResult>, String> {
    if config.nodes == 0 {
        return Err("At least one node is required".to_string());
    }
    let bundle = ConsensusBundle::load(&config.testnet_dir)?;
    // Fail on a bundle without enough keys before any client starts.
    bundle.testnet_config(config.nodes)?;

    let definitions = sim
        .client_types()
        .await
        .map_err(|e| format!("Failed to list client types: {:?}", e))?;
    let execution = execution_clients(&definitions);
    let consensus = consensus_pairs(&definitions);
    if execution.is_empty() || consensus.is_empty() {
        return Err(format!(
            "Need execution and consensus clients, got {:?} and {:?}",
            execution, consensus
        ));
    }

    let suite = sim
        .start_suite(
            SUITE_NAME,
            "Testnets with the merge fork at genesis reach finality.",
        )
        .await
        .map_err(|e| format!("Failed to start suite: {:?}", e))?;

    let mut results = vec![];
    for el in &execution {
        for pair in &consensus {
            let name = format!("{} ({}, {})", TRANSITION_TEST, el, pair.beacon);
            let description = format!(
                "{} triples of {}, {} and {} finalize with every validator client proposing.",
                config.nodes, el, pair.beacon, pair.validator
            );
            let result = sim
                .run_test(suite, SUITE_NAME, &name, &description, |test| {
                    transition_at_genesis(test, el, pair, &bundle, config)
                })
                .await
                .map_err(|e| format!("Failed to run test {}: {:?}", name, e))?;
            results.extend(result);
        }
    }

    sim.end_suite(suite)
        .await
        .map_err(|e| format!("Failed to end suite: {:?}", e))?;
    Ok(results)
}

async fn transition_at_genesis(
    test: Test,
    el: &str,
    pair: &ConsensusPair,
    bundle: &ConsensusBundle,
    config: &TransitionSimConfig,
) -> Result<(), String> {
    let testnet_config = bundle.testnet_config(config.nodes)?;
    let deadline = finality_deadline(
        testnet_config.genesis_time.unwrap_or_default(),
        config.finality_epochs * testnet_config.slots_per_epoch * testnet_config.seconds_per_slot,
    );

    let mut nodes = vec![];
    let mut enodes = vec![];
    let mut enrs = vec![];
    for (index, tranche) in bundle.key_tranches(config.nodes).into_iter().enumerate() {
        let execution = start_execution(&test, el, bundle, enodes.first().cloned()).await?;
        enodes.push(
            execution
                .enode_url()
                .await
                .map_err(|e| format!("Failed to get the enode of {}: {:?}", execution.container, e))?
                .to_string(),
        );

        let beacon_params = beacon_params(bundle, index, &execution, &enrs)?;
        let beacon = test
            .start_client(&pair.beacon, beacon_params, &bundle.consensus_files())
            .await
            .map_err(|e| format!("Failed to start {}: {:?}", pair.beacon, e))?;
        let beacon_api = BeaconNodeHttpClient::new(
            beacon.container.clone(),
            endpoint(&beacon, BEACON_API_PORT)?,
        )
        .map_err(|e| format!("Failed to connect to {}: {:?}", beacon.container, e))?;
        enrs.push(
            beacon_api
                .enr()
                .await
                .map_err(|e| format!("Failed to get the ENR of {}: {:?}", beacon.container, e))?,
        );

        info!(
            "Starting {} with validators {:?} on {}",
            pair.validator, tranche, beacon.container
        );
        let validator_params = common_consensus_params(bundle)
            .set("HIVE_CHECK_LIVE_PORT", 0)
            .set("HIVE_ETH2_BN_API_IP", beacon.ip);
        test.start_client(
            &pair.validator,
            validator_params,
            &bundle.validator_files(tranche)?,
        )
        .await
        .map_err(|e| format!("Failed to start {}: {:?}", pair.validator, e))?;

        let rpc = execution
            .rpc()
            .map_err(|e| format!("Invalid RPC URL of {}: {:?}", execution.container, e))?;
        nodes.push(Node {
            beacon: Arc::new(beacon_api),
            execution: Arc::new(rpc),
        });
    }

    let testnet = Testnet::new(testnet_config, nodes, test.sim.log().clone());
    info!("Waiting up to {:?} for finality", deadline);
    let finalized = testnet
        .wait_for_finality(deadline)
        .await
        .map_err(|e| format!("Testnet did not finalize: {}", e))?;
    verify_testnet(&testnet, finalized, config.min_participation)
        .await
        .map_err(|e| format!("Finalized testnet failed verification: {}", e))
}

async fn verify_testnet(
    testnet: &Testnet,
    finalized: verification::types::Checkpoint,
    min_participation: f64,
) -> Result<(), String> {
    testnet
        .verify_participation(
            VerificationSlot::FirstSlotAfterCheckpoint(finalized),
            min_participation,
        )
        .await
        .map_err(|e| e.to_string())?;
    testnet
        .verify_execution_payload_is_canonical(VerificationSlot::LastSlotAtCheckpoint(finalized))
        .await
        .map_err(|e| e.to_string())?;
    testnet
        .verify_proposers(VerificationSlot::LastSlotAtCheckpoint(finalized), false)
        .await
        .map_err(|e| e.to_string())?;

    // The first post-genesis payload builds on the execution genesis and is shared by everyone.
    let first_payload = testnet
        .nodes()
        .first()
        .ok_or_else(|| "No nodes".to_string())?
        .beacon
        .block(BlockId::Slot(1))
        .await
        .map_err(|e| e.to_string())?
        .and_then(|block| block.execution_payload)
        .ok_or_else(|| "No execution payload at slot 1".to_string())?;
    if first_payload.block_hash.is_zero() {
        return Err("Execution payload at slot 1 has a zero hash".to_string());
    }
    testnet
        .verify_execution_payload_is_canonical(VerificationSlot::Slot(1))
        .await
        .map_err(|e| e.to_string())?;
    testnet
        .verify_execution_payload_hash_inclusion(
            VerificationSlot::LastSlotAtCheckpoint(finalized),
            first_payload.block_hash,
        )
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| {
            format!(
                "Execution payload {:?} is not on the finalized chain",
                first_payload.block_hash
            )
        })?;

    testnet.verify_el_heads(true).await.map_err(|e| e.to_string())
}

async fn start_execution(
    test: &Test,
    el: &str,
    bundle: &ConsensusBundle,
    bootnode: Option<String>,
) -> Result<Client, String> {
    let mut params = bundle.execution_params.clone();
    if let Some(enode) = bootnode {
        params = params.bootnode(enode);
    }
    let files = ClientFiles::new()
        .add_from_path("/genesis.json", bundle.dir.join("genesis.json"))
        .map_err(|e| format!("Failed to read the execution genesis: {:?}", e))?;
    test.start_client(el, params, &files)
        .await
        .map_err(|e| format!("Failed to start {}: {:?}", el, e))
}

fn common_consensus_params(bundle: &ConsensusBundle) -> ClientParams {
    let params = ClientParams::new()
        .set("HIVE_ETH2_BN_API_PORT", BEACON_API_PORT)
        .set("HIVE_ETH2_BN_GRPC_PORT", BEACON_GRPC_PORT)
        .set("HIVE_ETH2_METRICS_PORT", METRICS_PORT);
    match bundle.deposit_contract_address() {
        Some(address) => params.set("HIVE_ETH2_CONFIG_DEPOSIT_CONTRACT_ADDRESS", address),
        None => params,
    }
}

fn beacon_params(
    bundle: &ConsensusBundle,
    index: usize,
    execution: &Client,
    bootnode_enrs: &[String],
) -> Result<ClientParams, String> {
    let mut params = common_consensus_params(bundle)
        .set("HIVE_CHECK_LIVE_PORT", BEACON_API_PORT)
        .set("HIVE_ETH2_MERGE_ENABLED", 1)
        .set("HIVE_ETH2_GENESIS_FORK", "bellatrix")
        .set("HIVE_ETH2_ETH1_GENESIS_TIME", bundle.genesis.timestamp)
        .set(
            "HIVE_ETH2_ETH1_GENESIS_HASH",
            format!("{:?}", genesis_hash(&bundle.genesis)?),
        )
        .set(
            "HIVE_ETH2_ETH1_RPC_ADDRS",
            endpoint(execution, EXECUTION_RPC_PORT)?,
        )
        .set(
            "HIVE_ETH2_ETH1_ENGINE_RPC_ADDRS",
            endpoint(execution, ENGINE_RPC_PORT)?,
        )
        .set("HIVE_ETH2_BEACON_NODE_INDEX", index);
    if !bootnode_enrs.is_empty() {
        params = params.set("HIVE_ETH2_BOOTNODE_ENRS", bootnode_enrs.join(","));
    }
    if let Some(ttd) = bundle.genesis.config.terminal_total_difficulty {
        params = params.terminal_total_difficulty(Uint256::from(ttd));
    }
    Ok(params)
}

fn endpoint(client: &Client, port: u16) -> Result<Url, String> {
    let url = format!("http://{}:{}", client.ip, port);
    Url::parse(&url).map_err(|e| format!("Invalid URL {}: {:?}", url, e))
}

/// Time left until `window` seconds past `genesis_time`, never less than one second.
fn finality_deadline(genesis_time: u64, window: u64) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|now| now.as_secs())
        .unwrap_or_default();
    Duration::from_secs(
        genesis_time
            .saturating_add(window)
            .saturating_sub(now)
            .max(1),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deadline() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(finality_deadline(now - 100, 50), Duration::from_secs(1));
        let future = finality_deadline(now + 60, 240);
        assert!(future <= Duration::from_secs(300));
        assert!(future >= Duration::from_secs(298));
    }
}
