//! A consensus-layer mock that drives execution clients through post-merge block production
//! over the engine API, plus helpers to tamper with payloads and transactions for fault
//! injection.
use engine_api::{PayloadId, PayloadStatusV1};
use std::fmt;
use std::time::Duration;
use types::Hash256;

mod client;
mod clmock;
mod config;
pub mod customizer;

pub use crate::clmock::{
    timestamp_to_beacon_root, BlockProcessCallbacks, BuiltPayload, ClMock, NewPayloadOutcome,
};
pub use client::EngineClient;
pub use config::ClMockConfig;
pub use customizer::{
    customize_transaction, generate_invalid_payload, CustomPayloadData, CustomTransactionData,
    InvalidPayloadField, SignatureValues,
};

/// Longest excerpt of a client response kept in an error.
const RESPONSE_EXCERPT_LEN: usize = 256;

#[derive(Debug)]
pub enum Error {
    EngineApi {
        client: String,
        method: &'static str,
        error: engine_api::Error,
    },
    UnexpectedStatus {
        client: String,
        method: &'static str,
        block: u64,
        response: String,
    },
    IncorrectPayload {
        client: String,
        field: &'static str,
        expected: String,
        got: String,
    },
    InvalidHeader {
        client: String,
        block: u64,
        field: &'static str,
        value: String,
    },
    HeadMismatch {
        block: u64,
        expected: Hash256,
        client: String,
        got: Hash256,
    },
    MissingPayloadId {
        client: String,
        block: u64,
    },
    ReusedPayloadId {
        client: String,
        payload_id: PayloadId,
    },
    MissingBlobsBundle {
        client: String,
        block: u64,
    },
    UnknownHeader {
        client: String,
        block: String,
    },
    MissingTotalDifficulty {
        client: String,
    },
    UnknownClient(String),
    NoClients,
    NotInitialized,
    NoProducer {
        block: u64,
    },
    NoValidations {
        block: u64,
    },
    NoAcceptingClient {
        block: u64,
    },
    FinalityRegression {
        previous: u64,
        new: u64,
    },
    RoundTimeout {
        block: u64,
        deadline: Duration,
    },
    TtdTimeout {
        client: String,
        deadline: Duration,
    },
    Customization(String),
    Transaction(types::Error),
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<types::Error> for Error {
    fn from(e: types::Error) -> Self {
        Error::Transaction(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl Error {
    pub(crate) fn engine_api(client: &str, method: &'static str, error: engine_api::Error) -> Self {
        Error::EngineApi {
            client: client.to_string(),
            method,
            error,
        }
    }

    pub(crate) fn unexpected_status(
        client: &str,
        method: &'static str,
        block: u64,
        status: &PayloadStatusV1,
    ) -> Self {
        let response = format!("{:?}", status)
            .chars()
            .take(RESPONSE_EXCERPT_LEN)
            .collect();
        Error::UnexpectedStatus {
            client: client.to_string(),
            method,
            block,
            response,
        }
    }
}
