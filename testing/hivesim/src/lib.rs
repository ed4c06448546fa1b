//! Bindings to the hive simulator API.
//!
//! A simulation talks to the hive controller over HTTP (`HIVE_SIMULATOR`) to register suites and
//! tests, launch client containers with a given environment and files, and manage their networks.
mod client;
mod enode;
mod params;
mod simulation;
mod testmatch;
#[cfg(test)]
mod test_utils;
pub mod types;

pub use client::{Client, Test};
pub use enode::Enode;
pub use params::{ClientFiles, ClientParams};
pub use simulation::{Simulation, HIVE_SIMULATOR_ENV, HIVE_TEST_PATTERN_ENV};
pub use testmatch::TestMatcher;
pub use types::{ClientDefinition, ExecInfo, SuiteId, TestId, TestResult};

pub use reqwest::StatusCode;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// The `reqwest` client raised an error.
    HttpClient(reqwest::Error),
    /// The simulator answered with an error status.
    ServerMessage { status: StatusCode, message: String },
    /// `HIVE_SIMULATOR` is unset or empty.
    MissingSimulatorUrl,
    InvalidUrl(String),
    InvalidPattern(regex::Error),
    /// The simulator did not return a usable container IP.
    InvalidIp(String),
    InvalidEnode(String),
    /// A command run in a client container exited with a non-zero code.
    ExecFailed {
        command: Vec<String>,
        exit_code: i32,
        stderr: String,
    },
    Io(io::Error),
    Json(serde_json::Error),
    EngineApi(engine_api::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::HttpClient(e)
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::InvalidPattern(e)
    }
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

impl From<engine_api::Error> for Error {
    fn from(e: engine_api::Error) -> Self {
        Error::EngineApi(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
