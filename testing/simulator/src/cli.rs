use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

pub fn cli_app() -> Command {
    Command::new("simulator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs merge and transition scenarios against clients started by a hive simulator.")
        .arg(
            Arg::new("debug-level")
                .long("debug-level")
                .value_name("LEVEL")
                .action(ArgAction::Set)
                .value_parser(["info", "debug", "trace", "warn", "error", "crit"])
                .default_value("info")
                .global(true)
                .help("Verbosity of the structured logs of the harness, CL mock and checks."),
        )
        .arg(
            Arg::new("test-pattern")
                .long("test-pattern")
                .value_name("REGEX")
                .action(ArgAction::Set)
                .global(true)
                .help("Only run tests matching suite/test. Overrides HIVE_TEST_PATTERN."),
        )
        .subcommand(merge_args(
            Command::new("pow-reorg").about(
                "The main client follows a secondary client's heavier proof-of-work chain of equal \
                 height once the CL mock builds on top of it.",
            ),
        ))
        .subcommand(merge_args(
            Command::new("invalid-terminal-block").about(
                "A transition payload built on a terminal block the main client does not accept \
                 must be rejected as INVALID with a zero latest valid hash.",
            ),
        ))
        .subcommand(transition_args(
            Command::new("transition").about(
                "Beacon nodes, validator clients and execution clients start with the merge at \
                 genesis and must finalize with every validator client proposing.",
            ),
        ))
        .subcommand(transition_args(merge_args(
            Command::new("all").about("Runs every scenario. The default without a subcommand."),
        )))
}

fn merge_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("chains-dir")
                .long("chains-dir")
                .value_name("DIR")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .default_value("./chains")
                .help("Directory holding genesis.json and the blocks_*.rlp proof-of-work chains."),
        )
        .arg(
            Arg::new("merge-timeout")
                .long("merge-timeout")
                .value_name("SECONDS")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64))
                .default_value("60")
                .help("Deadline of each merge scenario."),
        )
}

fn transition_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("testnet-dir")
                .long("testnet-dir")
                .value_name("DIR")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .default_value("./testnet")
                .help(
                    "Consensus bundle: genesis.json, genesis.ssz, the *.yaml configs and \
                     keys/<index>/{keystore.json,secret}.",
                ),
        )
        .arg(
            Arg::new("nodes")
                .long("nodes")
                .short('n')
                .value_name("N")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .default_value("2")
                .help("Number of execution, beacon and validator client triples."),
        )
        .arg(
            Arg::new("finality-epochs")
                .long("finality-epochs")
                .value_name("EPOCHS")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64))
                .default_value("5")
                .help("Epochs after genesis within which the testnet must finalize."),
        )
        .arg(
            Arg::new("min-participation")
                .long("min-participation")
                .value_name("FRACTION")
                .action(ArgAction::Set)
                .value_parser(value_parser!(f64))
                .default_value("0.95")
                .help("Lowest participation accepted in the finalized epoch."),
        )
}
