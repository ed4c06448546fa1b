use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use hivechain::config::{split_and_trim, OUTPUT_NAMES};
use hivechain::modifiers::MODIFIER_NAMES;
use hivechain::{GeneratorConfig, Generator, GenesisSpec};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::process;
use types::{decode_chain, encode_chain};

fn main() {
    env_logger::init();

    let matches = Command::new("hivechain")
        .about("Generates and inspects blockchains for hive tests.")
        .subcommand_required(true)
        .subcommand(
            Command::new("generate")
                .about("Generates a new chain and writes the selected outputs.")
                .arg(
                    Arg::new("length")
                        .long("length")
                        .value_name("N")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(u64))
                        .default_value("2")
                        .help("Number of blocks after genesis."),
                )
                .arg(
                    Arg::new("blocktime")
                        .long("blocktime")
                        .value_name("SECONDS")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(u64))
                        .default_value("10")
                        .help("Seconds between blocks."),
                )
                .arg(
                    Arg::new("tx-interval")
                        .long("tx-interval")
                        .value_name("N")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(u64))
                        .default_value("1")
                        .help("Add transactions to every n-th block. 0 disables them."),
                )
                .arg(
                    Arg::new("tx-count")
                        .long("tx-count")
                        .value_name("N")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(usize))
                        .default_value("10")
                        .help("Maximum number of modifier applications per block."),
                )
                .arg(
                    Arg::new("fork-interval")
                        .long("fork-interval")
                        .value_name("N")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(u64))
                        .default_value("0")
                        .help("Number of blocks between fork activations."),
                )
                .arg(
                    Arg::new("lastfork")
                        .long("lastfork")
                        .value_name("FORK")
                        .action(ArgAction::Set)
                        .default_value("")
                        .help("Name of the last fork to activate."),
                )
                .arg(
                    Arg::new("clique")
                        .long("clique")
                        .action(ArgAction::SetTrue)
                        .help("Seal proof-of-work blocks with clique."),
                )
                .arg(
                    Arg::new("gaslimit")
                        .long("gaslimit")
                        .value_name("GAS")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(u64))
                        .help("Block gas limit."),
                )
                .arg(
                    Arg::new("genesis")
                        .long("genesis")
                        .value_name("PATH")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(PathBuf))
                        .help("Use this genesis.json instead of generating one."),
                )
                .arg(
                    Arg::new("outdir")
                        .long("outdir")
                        .alias("output")
                        .value_name("DIR")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(PathBuf))
                        .default_value(".")
                        .help("Destination directory."),
                )
                .arg(
                    Arg::new("outputs")
                        .long("outputs")
                        .value_name("LIST")
                        .action(ArgAction::Set)
                        .default_value("")
                        .help(format!("Enabled outputs: {}", OUTPUT_NAMES.join(","))),
                )
                .arg(
                    Arg::new("modifiers")
                        .long("tx")
                        .alias("modifiers")
                        .value_name("LIST")
                        .action(ArgAction::Set)
                        .default_value("")
                        .help(format!("Enabled modifiers: {}", MODIFIER_NAMES.join(","))),
                ),
        )
        .subcommand(
            Command::new("print")
                .about("Displays the blocks in a chain.rlp file.")
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .action(ArgAction::SetTrue)
                        .help("Display all header fields."),
                )
                .arg(
                    Arg::new("file")
                        .value_name("CHAIN_RLP")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("print-genesis")
                .about("Displays the header of the genesis block described by a genesis.json.")
                .arg(
                    Arg::new("file")
                        .value_name("GENESIS_JSON")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("trim")
                .about("Extracts the blocks numbered [from, to) from a chain.rlp file.")
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("N")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(u64))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_name("N")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("input")
                        .value_name("IN")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output")
                        .value_name("OUT")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("generate", matches)) => run_generate(matches),
        Some(("print", matches)) => run_print(matches),
        Some(("print-genesis", matches)) => run_print_genesis(matches),
        Some(("trim", matches)) => run_trim(matches),
        Some((other, _)) => Err(format!("Unknown subcommand {}", other)),
        None => Err("No subcommand given".to_string()),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1)
    }
}

fn required<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, name: &str) -> Result<T, String> {
    matches
        .get_one::<T>(name)
        .cloned()
        .ok_or_else(|| format!("--{} is required", name))
}

fn run_generate(matches: &ArgMatches) -> Result<(), String> {
    let defaults = GeneratorConfig::default();
    let config = GeneratorConfig {
        chain_length: required(matches, "length")?,
        block_time: required(matches, "blocktime")?,
        tx_interval: required(matches, "tx-interval")?,
        tx_count: required(matches, "tx-count")?,
        fork_interval: required(matches, "fork-interval")?,
        last_fork: required(matches, "lastfork")?,
        clique: matches.get_flag("clique"),
        gas_limit: matches
            .get_one::<u64>("gaslimit")
            .copied()
            .unwrap_or(defaults.gas_limit),
        genesis: matches.get_one::<PathBuf>("genesis").cloned(),
        out_dir: required(matches, "outdir")?,
        outputs: split_and_trim(&required::<String>(matches, "outputs")?),
        modifiers: split_and_trim(&required::<String>(matches, "modifiers")?),
        ..defaults
    };

    let chain = Generator::new(config)
        .and_then(Generator::run)
        .map_err(|e| e.to_string())?;
    info!(
        "generated {} blocks, head {:?}",
        chain.blocks.len() - 1,
        chain.head().hash()
    );
    Ok(())
}

fn run_print(matches: &ArgMatches) -> Result<(), String> {
    let path: PathBuf = required(matches, "file")?;
    let bytes = fs::read(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let blocks = decode_chain(&bytes).map_err(|e| format!("{}: {}", path.display(), e))?;
    for (i, block) in blocks.iter().enumerate() {
        if matches.get_flag("verbose") {
            let json = serde_json::to_string_pretty(&block.header).map_err(|e| e.to_string())?;
            println!("{}: {}", i, json);
        } else {
            println!("{}: number {}, {:x}", i, block.number(), block.hash());
        }
    }
    Ok(())
}

fn run_print_genesis(matches: &ArgMatches) -> Result<(), String> {
    let path: PathBuf = required(matches, "file")?;
    let header = GenesisSpec::load(&path)
        .and_then(|genesis| genesis.header())
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    let json = serde_json::to_string_pretty(&header).map_err(|e| e.to_string())?;
    println!("{}", json);
    println!("hash: {:?}", header.hash());
    Ok(())
}

fn run_trim(matches: &ArgMatches) -> Result<(), String> {
    let from: u64 = required(matches, "from")?;
    let to = matches.get_one::<u64>("to").copied().unwrap_or(u64::MAX);
    let input: PathBuf = required(matches, "input")?;
    let output: PathBuf = required(matches, "output")?;
    if to <= from {
        return Err(format!("empty range [{}, {})", from, to));
    }

    let bytes = fs::read(&input).map_err(|e| format!("{}: {}", input.display(), e))?;
    let blocks = decode_chain(&bytes).map_err(|e| format!("{}: {}", input.display(), e))?;
    let kept: Vec<_> = blocks
        .iter()
        .filter(|block| (from..to).contains(&block.number()))
        .collect();
    fs::write(&output, encode_chain(kept.iter().copied()))
        .map_err(|e| format!("{}: {}", output.display(), e))?;
    info!("wrote {} blocks to {}", kept.len(), output.display());
    Ok(())
}
