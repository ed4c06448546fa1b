//! Deterministic generator for test chains.
//!
//! A chain is produced from a fork schedule, a genesis allocation and a list of named block
//! modifiers. Every block is executed with revm as it is built, the finished chain is
//! re-imported from its RLP encoding, and the result is written out as a bundle of artifacts
//! (`chain.rlp`, `genesis.json`, engine API request transcripts, ...).
pub mod accounts;
pub mod config;
pub mod context;
pub mod contracts;
pub mod difficulty;
pub mod evm;
pub mod forks;
pub mod generator;
pub mod genesis;
pub mod modifiers;
pub mod oracle;
pub mod output;
pub mod reimport;
pub mod state;

pub use config::GeneratorConfig;
pub use forks::{Activation, Fork, ForkSchedule};
pub use generator::{generate, Chain, Generator};
pub use genesis::{ChainConfig, GenesisSpec};
pub use oracle::{BlockOutcome, EvmOracle, StateTransition};
pub use state::State;

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// A fork name that is not part of the canonical fork list.
    UnknownFork(String),
    UnknownModifier(String),
    UnknownOutput(String),
    /// Fork activations out of canonical order.
    NonMonotonicSchedule { fork: Fork, previous: Fork },
    InvalidConfig(String),
    /// The oracle rejected a transaction produced by a modifier.
    InvalidTransaction {
        block: u64,
        index: usize,
        reason: String,
    },
    InvalidBlock {
        block: u64,
        reason: String,
    },
    StateRootMismatch {
        block: u64,
        expected: types::Hash256,
        computed: types::Hash256,
    },
    /// The re-imported chain diverged from the generated one.
    ReimportMismatch(String),
    Io(io::Error),
    Json(serde_json::Error),
    Types(types::Error),
    EngineApi(engine_api::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<types::Error> for Error {
    fn from(e: types::Error) -> Self {
        Error::Types(e)
    }
}

impl From<engine_api::Error> for Error {
    fn from(e: engine_api::Error) -> Self {
        Error::EngineApi(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownFork(name) => write!(f, "unknown fork {:?}", name),
            Error::UnknownModifier(name) => write!(f, "unknown modifier {:?}", name),
            Error::UnknownOutput(name) => write!(f, "unknown output {:?}", name),
            Error::NonMonotonicSchedule { fork, previous } => write!(
                f,
                "fork {} activates before the preceding fork {}",
                fork, previous
            ),
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Error::InvalidTransaction {
                block,
                index,
                reason,
            } => write!(f, "block {}: invalid transaction {}: {}", block, index, reason),
            Error::InvalidBlock { block, reason } => write!(f, "block {}: {}", block, reason),
            Error::StateRootMismatch {
                block,
                expected,
                computed,
            } => write!(
                f,
                "block {}: state root mismatch (header {:?}, computed {:?})",
                block, expected, computed
            ),
            Error::ReimportMismatch(msg) => write!(f, "re-import failed: {}", msg),
            Error::Io(e) => write!(f, "{}", e),
            Error::Json(e) => write!(f, "json: {}", e),
            Error::Types(e) => write!(f, "{:?}", e),
            Error::EngineApi(e) => write!(f, "{:?}", e),
        }
    }
}
