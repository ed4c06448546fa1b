//! Runs merge scenarios on a hive simulator.
//!
//! `pow-reorg` and `invalid-terminal-block` drive pairs of execution clients through the
//! proof-of-work to proof-of-stake transition with the CL mock standing in for a consensus client.
//! `transition` starts full testnets of execution, beacon and validator clients with the merge at
//! genesis and checks them with the verification library once they finalize.
//!
//! Test failures are reported to hive; the process only fails when the simulation itself cannot
//! run.

mod bundle;
mod cli;
mod clients;
mod merge_sim;
mod params;
mod transition_sim;

use clap::ArgMatches;
use cli::cli_app;
use env_logger::{Builder, Env};
use hivesim::{Simulation, TestResult};
use log::info;
use merge_sim::{run_merge_sim, MergeScenario, MergeSimConfig};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::runtime::Builder as RuntimeBuilder;
use transition_sim::{run_transition_sim, TransitionSimConfig};

fn main() {
    // Messages of the simulator itself. Harness and checks log through slog.
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = cli_app().get_matches();
    match run(&matches) {
        Ok(results) => {
            let passed = results.iter().filter(|result| result.pass).count();
            println!(
                "Simulation exited successfully: {}/{} tests passed",
                passed,
                results.len()
            );
        }
        Err(e) => {
            eprintln!("Simulation exited with error: {}", e);
            process::exit(1)
        }
    }
}

fn run(matches: &ArgMatches) -> Result<Vec<TestResult>, String> {
    let debug_level = matches
        .get_one::<String>("debug-level")
        .map(String::as_str)
        .unwrap_or("info");
    let log = logging::async_logger(debug_level)?;

    let mut sim = Simulation::from_env(log)
        .map_err(|e| format!("Failed to connect to the simulator: {:?}", e))?;
    if let Some(pattern) = matches.get_one::<String>("test-pattern") {
        sim.set_test_pattern(pattern)
            .map_err(|e| format!("Invalid test pattern {}: {:?}", pattern, e))?;
    }

    let runtime = RuntimeBuilder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start the runtime: {:?}", e))?;

    runtime.block_on(dispatch(&sim, matches))
}

async fn dispatch(sim: &Simulation, matches: &ArgMatches) -> Result<Vec<TestResult>, String> {
    match matches.subcommand() {
        Some(("pow-reorg", m)) => {
            run_merge_sim(sim, &[MergeScenario::PowReorg], &merge_config(m)?).await
        }
        Some(("invalid-terminal-block", m)) => {
            run_merge_sim(sim, &[MergeScenario::InvalidTerminalBlock], &merge_config(m)?).await
        }
        Some(("transition", m)) => run_transition_sim(sim, &transition_config(m)?).await,
        Some(("all", m)) => run_all(sim, m).await,
        Some((other, _)) => Err(format!("Unknown subcommand {}", other)),
        None => run_all(sim, &cli_app().get_matches_from(["simulator", "all"])).await,
    }
}

async fn run_all(sim: &Simulation, matches: &ArgMatches) -> Result<Vec<TestResult>, String> {
    let scenarios = [MergeScenario::PowReorg, MergeScenario::InvalidTerminalBlock];
    let mut results = run_merge_sim(sim, &scenarios, &merge_config(matches)?).await?;
    info!("Merge scenarios done, starting transition testnets");
    results.extend(run_transition_sim(sim, &transition_config(matches)?).await?);
    Ok(results)
}

fn merge_config(matches: &ArgMatches) -> Result<MergeSimConfig, String> {
    Ok(MergeSimConfig {
        chains_dir: required::<PathBuf>(matches, "chains-dir")?,
        timeout: Duration::from_secs(required::<u64>(matches, "merge-timeout")?),
    })
}

fn transition_config(matches: &ArgMatches) -> Result<TransitionSimConfig, String> {
    let min_participation = required::<f64>(matches, "min-participation")?;
    if !(0.0..=1.0).contains(&min_participation) {
        return Err(format!(
            "--min-participation must be within 0 and 1, got {}",
            min_participation
        ));
    }
    Ok(TransitionSimConfig {
        testnet_dir: required::<PathBuf>(matches, "testnet-dir")?,
        nodes: required::<usize>(matches, "nodes")?,
        finality_epochs: required::<u64>(matches, "finality-epochs")?,
        min_participation,
    })
}

fn required<T: Clone + Send + Sync + 'static>(
    matches: &ArgMatches,
    name: &str,
) -> Result<T, String> {
    matches
        .get_one::<T>(name)
        .cloned()
        .ok_or_else(|| format!("Missing --{}", name))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn all_takes_every_argument() {
        let matches = cli_app()
            .try_get_matches_from([
                "simulator",
                "--debug-level",
                "debug",
                "all",
                "--chains-dir",
                "/chains",
                "--nodes",
                "4",
            ])
            .unwrap();
        let (name, m) = matches.subcommand().unwrap();
        assert_eq!(name, "all");

        let merge = merge_config(m).unwrap();
        assert_eq!(merge.chains_dir, PathBuf::from("/chains"));
        assert_eq!(merge.timeout, Duration::from_secs(60));

        let transition = transition_config(m).unwrap();
        assert_eq!(transition.nodes, 4);
        assert_eq!(transition.finality_epochs, 5);
        assert_eq!(transition.testnet_dir, PathBuf::from("./testnet"));
        assert_eq!(
            m.get_one::<String>("debug-level").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn merge_subcommands_have_no_transition_arguments() {
        let matches = cli_app()
            .try_get_matches_from(["simulator", "pow-reorg", "--merge-timeout", "5"])
            .unwrap();
        let (_, m) = matches.subcommand().unwrap();
        assert_eq!(merge_config(m).unwrap().timeout, Duration::from_secs(5));
        assert!(cli_app()
            .try_get_matches_from(["simulator", "pow-reorg", "--nodes", "3"])
            .is_err());
    }

    #[test]
    fn participation_out_of_range() {
        let matches = cli_app()
            .try_get_matches_from(["simulator", "transition", "--min-participation", "1.5"])
            .unwrap();
        let (_, m) = matches.subcommand().unwrap();
        assert!(transition_config(m).is_err());
    }
}
