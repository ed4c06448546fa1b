//! Proof-of-work to proof-of-stake transitions driven by the CL mock.
use crate::clients::execution_clients;
use crate::params::load_genesis;
use clmock::{ClMock, ClMockConfig, EngineClient};
use engine_api::auth::HIVE_JWT_SECRET;
use engine_api::PayloadStatusV1Status;
use hivesim::{Client, ClientFiles, ClientParams, Simulation, Test, TestResult};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use types::{Hash256, Uint256};

pub const SUITE_NAME: &str = "engine-merge";
pub const POW_REORG_TEST: &str = "pow-reorg-higher-td-equal-height";
pub const INVALID_TERMINAL_BLOCK_TEST: &str = "invalid-terminal-block";

/// Single block chain with a total difficulty of exactly the terminal total difficulty.
const MAIN_CHAIN: &str = "blocks_1_td_196608.rlp";
/// Single block chain of equal height and more total difficulty.
const HEAVIER_CHAIN: &str = "blocks_1_td_196704.rlp";
const TERMINAL_TOTAL_DIFFICULTY: u64 = 196_608;
/// Difficulty missing from the shared terminal block for the main client's configured TTD.
const TERMINAL_DIFFICULTY_SHORTFALL: u64 = 500_000;
/// Rounds built on the rejected transition payload while checking the main client stays put.
const POST_TRANSITION_ROUNDS: usize = 3;
const HEAD_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MergeSimConfig {
    pub chains_dir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeScenario {
    PowReorg,
    InvalidTerminalBlock,
}

impl MergeScenario {
    fn name(self) -> &'static str {
        match self {
            MergeScenario::PowReorg => POW_REORG_TEST,
            MergeScenario::InvalidTerminalBlock => INVALID_TERMINAL_BLOCK_TEST,
        }
    }

    fn description(self) -> &'static str {
        match self {
            MergeScenario::PowReorg => {
                "Main client re-orgs to a secondary client's heavier PoW chain of equal height \
                 once proof-of-stake blocks are built on top of it."
            }
            MergeScenario::InvalidTerminalBlock => {
                "Main client rejects a transition payload whose parent does not reach its \
                 configured terminal total difficulty."
            }
        }
    }
}

/// Runs `scenarios` against every execution client type of the simulation.
pub async fn run_merge_sim(
    sim: &Simulation,
    scenarios: &[MergeScenario],
    config: &MergeSimConfig,
) -> Result<Vec<TestResult>, String> {
    let definitions = sim
        .client_types()
        .await
        .map_err(|e| format!("Failed to list client types: {:?}", e))?;
    let clients = execution_clients(&definitions);
    if clients.is_empty() {
        return Err("No execution clients available".to_string());
    }

    let suite = sim
        .start_suite(SUITE_NAME, "Proof-of-work to proof-of-stake transition tests.")
        .await
        .map_err(|e| format!("Failed to start suite: {:?}", e))?;

    let mut results = vec![];
    for client in &clients {
        for scenario in scenarios {
            let name = format!("{} ({})", scenario.name(), client);
            let result = sim
                .run_test(suite, SUITE_NAME, &name, scenario.description(), |test| {
                    run_scenario(*scenario, test, client, config)
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

async fn run_scenario(
    scenario: MergeScenario,
    test: Test,
    client_type: &str,
    config: &MergeSimConfig,
) -> Result<(), String> {
    match scenario {
        MergeScenario::PowReorg => pow_reorg(test, client_type, config).await,
        MergeScenario::InvalidTerminalBlock => {
            invalid_terminal_block(test, client_type, config).await
        }
    }
}

/// A client loaded with `chain` on top of the shared genesis, configured with `ttd`.
async fn start_pow_client(
    test: &Test,
    client_type: &str,
    chains_dir: &Path,
    chain: &str,
    ttd: u64,
    bootnode: Option<String>,
) -> Result<Client, String> {
    let genesis_path = chains_dir.join("genesis.json");
    let (_, params) = load_genesis(&genesis_path)?;
    let mut params: ClientParams = params.terminal_total_difficulty(Uint256::from(ttd));
    if let Some(enode) = bootnode {
        params = params.bootnode(enode);
    }
    let files = ClientFiles::new()
        .add_from_path("/genesis.json", &genesis_path)
        .and_then(|files| files.add_from_path("/chain.rlp", chains_dir.join(chain)))
        .map_err(|e| format!("Failed to read chain files: {:?}", e))?;

    test.start_client(client_type, params, &files)
        .await
        .map_err(|e| format!("Failed to start {} with {}: {:?}", client_type, chain, e))
}

fn engine_client(client: &Client, ttd: u64) -> Result<EngineClient, String> {
    let url = client
        .engine_url()
        .map_err(|e| format!("Invalid engine URL: {:?}", e))?;
    EngineClient::new(
        client.container.clone(),
        url,
        Some(&HIVE_JWT_SECRET[..]),
        Uint256::from(ttd),
    )
    .map_err(|e| format!("Failed to connect to {}: {:?}", client.container, e))
}

async fn latest_hash(cl: &ClMock, id: &str) -> Result<Hash256, String> {
    let client = cl.client(id).map_err(|e| format!("{:?}", e))?;
    client
        .latest_header()
        .await
        .map(|header| header.hash())
        .map_err(|e| format!("Failed to get the head of {}: {:?}", id, e))
}

fn cl_mock(test: &Test, config: &MergeSimConfig) -> ClMock {
    ClMock::new(
        ClMockConfig {
            round_deadline: config.timeout,
            ..ClMockConfig::default()
        },
        test.sim.log().clone(),
    )
}

async fn pow_reorg(test: Test, client_type: &str, config: &MergeSimConfig) -> Result<(), String> {
    let deadline = Instant::now() + config.timeout;
    let mut cl = cl_mock(&test, config);

    let main = start_pow_client(
        &test,
        client_type,
        &config.chains_dir,
        MAIN_CHAIN,
        TERMINAL_TOTAL_DIFFICULTY,
        None,
    )
    .await?;
    let main_id = main.container.clone();
    cl.add_client(engine_client(&main, TERMINAL_TOTAL_DIFFICULTY)?);
    cl.wait_for_ttd(&main_id)
        .await
        .map_err(|e| format!("Main client did not reach TTD: {:?}", e))?;
    cl.init_chain(&main_id)
        .await
        .map_err(|e| format!("Failed to initialize the CL mock: {:?}", e))?;

    let enode = main
        .enode_url()
        .await
        .map_err(|e| format!("Failed to get the main client enode: {:?}", e))?;
    let secondary = start_pow_client(
        &test,
        client_type,
        &config.chains_dir,
        HEAVIER_CHAIN,
        TERMINAL_TOTAL_DIFFICULTY,
        Some(enode.to_string()),
    )
    .await?;
    let secondary_id = secondary.container.clone();
    cl.add_client(engine_client(&secondary, TERMINAL_TOTAL_DIFFICULTY)?);
    cl.wait_for_ttd(&secondary_id)
        .await
        .map_err(|e| format!("Secondary client did not reach TTD: {:?}", e))?;
    cl.init_chain(&secondary_id)
        .await
        .map_err(|e| format!("Failed to build on the secondary chain: {:?}", e))?;

    let mut must_head = latest_hash(&cl, &secondary_id).await?;
    info!("Main client must follow the secondary chain to {:?}", must_head);

    loop {
        cl.produce_single_block(&mut ())
            .await
            .map_err(|e| format!("Block production failed: {:?}", e))?;
        let latest = cl.latest_header().map_err(|e| format!("{:?}", e))?;
        if latest.parent_hash == must_head {
            must_head = latest.hash();
        }

        let head = latest_hash(&cl, &main_id).await?;
        if head == must_head {
            info!("Main client synced to {:?}", head);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(format!(
                "Main client head {:?} did not reach {:?} within {:?}",
                head, must_head, config.timeout
            ));
        }
        sleep(HEAD_POLL_INTERVAL).await;
    }
}

async fn invalid_terminal_block(
    test: Test,
    client_type: &str,
    config: &MergeSimConfig,
) -> Result<(), String> {
    let main_ttd = TERMINAL_TOTAL_DIFFICULTY + TERMINAL_DIFFICULTY_SHORTFALL;
    let mut cl = cl_mock(&test, config);

    let main = start_pow_client(
        &test,
        client_type,
        &config.chains_dir,
        MAIN_CHAIN,
        main_ttd,
        None,
    )
    .await?;
    let main_id = main.container.clone();
    cl.add_client(engine_client(&main, main_ttd)?);

    let enode = main
        .enode_url()
        .await
        .map_err(|e| format!("Failed to get the main client enode: {:?}", e))?;
    let secondary = start_pow_client(
        &test,
        client_type,
        &config.chains_dir,
        MAIN_CHAIN,
        TERMINAL_TOTAL_DIFFICULTY,
        Some(enode.to_string()),
    )
    .await?;
    let secondary_id = secondary.container.clone();
    cl.add_client(engine_client(&secondary, TERMINAL_TOTAL_DIFFICULTY)?);

    let main_reached_ttd = cl
        .client(&main_id)
        .map_err(|e| format!("{:?}", e))?
        .ttd_reached()
        .await
        .map_err(|e| format!("Failed to get the main client total difficulty: {:?}", e))?;
    if main_reached_ttd {
        return Err("Main client reached its TTD on the proof-of-work chain".to_string());
    }

    cl.wait_for_ttd(&secondary_id)
        .await
        .map_err(|e| format!("Secondary client did not reach TTD: {:?}", e))?;
    cl.init_chain(&secondary_id)
        .await
        .map_err(|e| format!("Failed to initialize the CL mock: {:?}", e))?;
    let pow_head = latest_hash(&cl, &main_id).await?;

    cl.expect_invalid_payload(main_id.clone());
    cl.produce_single_block(&mut ())
        .await
        .map_err(|e| format!("Transition block production failed: {:?}", e))?;

    let outcome = cl
        .latest_new_payload_outcomes()
        .iter()
        .find(|outcome| outcome.client == main_id)
        .ok_or_else(|| "Main client did not answer the transition payload".to_string())?;
    match &outcome.result {
        Ok(status)
            if status.status == PayloadStatusV1Status::Invalid
                && status.latest_valid_hash == Some(Hash256::zero()) =>
        {
            info!("Main client rejected the transition payload: {:?}", status);
        }
        other => {
            return Err(format!(
                "Expected INVALID with a zero latest valid hash, got {:?}",
                other
            ))
        }
    }

    for _ in 0..POST_TRANSITION_ROUNDS {
        cl.expect_invalid_payload(main_id.clone());
        cl.produce_single_block(&mut ())
            .await
            .map_err(|e| format!("Block production failed: {:?}", e))?;
        let head = latest_hash(&cl, &main_id).await?;
        if head != pow_head {
            return Err(format!(
                "Main client moved from {:?} to the invalid chain at {:?}",
                pow_head, head
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_names_are_distinct() {
        assert_ne!(
            MergeScenario::PowReorg.name(),
            MergeScenario::InvalidTerminalBlock.name()
        );
        assert_eq!(
            TERMINAL_TOTAL_DIFFICULTY + TERMINAL_DIFFICULTY_SHORTFALL,
            696_608
        );
    }
}
