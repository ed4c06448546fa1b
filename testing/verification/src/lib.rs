//! Read-only checks over a running testnet of beacon nodes paired with execution clients.
//!
//! Every check fans out to all nodes concurrently with a per-call timeout and reports results in
//! node order.
pub mod beacon;
mod config;
mod health;
mod testnet;
pub mod types;

pub use self::beacon::{BeaconClient, BeaconNodeHttpClient};
pub use self::config::{TestnetConfig, DEFAULT_CALL_TIMEOUT};
pub use self::health::{get_health, legacy_health, participation_health};
pub use self::testnet::{Node, NodeStatus, Testnet, VerificationSlot};
pub use reqwest::StatusCode;

use ::types::Hash256;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum Error {
    /// The `reqwest` client raised an error.
    HttpClient(reqwest::Error),
    /// The beacon node answered with an error status.
    ServerMessage { status: StatusCode, message: String },
    InvalidUrl(String),
    EngineApi {
        node: usize,
        error: engine_api::Error,
    },
    /// A query did not complete within the per-call timeout.
    Timeout { node: usize, name: String },
    NoNodes,
    MissingBlock { node: usize, block: String },
    MissingValidator { node: String, index: u64 },
    MissingExecutionBlock { node: usize, number: String },
    NoExecutionPayload { slot: u64 },
    /// The state carries neither participation flags nor phase0 balances.
    ParticipationUnavailable { node: String, version: String },
    UnhealthyParticipation {
        node: usize,
        name: String,
        epoch: u64,
        got: f64,
        want: f64,
    },
    ExecutionBlockMismatch {
        node: usize,
        name: String,
        number: u64,
        got: Hash256,
        expected: Hash256,
    },
    UnknownProposer { slot: u64, validator_index: u64 },
    DidNotPropose { node: usize, name: String },
    HeadMismatch {
        node: usize,
        name: String,
        reference: Hash256,
        got: Hash256,
    },
    NotFinalized {
        node: usize,
        name: String,
        epoch: u64,
        want: u64,
    },
    /// A node's head fell an entire epoch behind the wall clock.
    StalledNode {
        node: usize,
        name: String,
        clock_slot: u64,
        head_slot: u64,
    },
    FinalityTimeout { deadline: Duration },
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::HttpClient(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
