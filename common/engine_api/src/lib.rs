//! Engine API plumbing shared by the chain generator, the consensus-layer mock and the proxy.
//!
//! Covers the JSON shapes of the V1-V4 engine methods, JWT authentication, a JSON-RPC client
//! over HTTP and an in-process mock execution engine for tests.
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use superstruct::superstruct;

pub mod auth;
pub mod block_hash;
pub mod http;
pub mod json_structures;
mod new_payload_request;
pub mod test_utils;
pub mod versioned_hashes;

pub use json_structures::{
    BlobsBundle, ExecutionPayload, GetPayloadResponse, JsonForkchoiceUpdatedV1Response,
    JsonPayloadStatusV1, JsonPayloadStatusV1Status,
};
pub use new_payload_request::NewPayloadRequest;
pub use types::{Address, Hash256, Header, Uint256, Withdrawal};

pub const LATEST_TAG: &str = "latest";

pub type PayloadId = [u8; 8];

#[derive(Debug)]
pub enum Error {
    HttpClient(reqwest::Error),
    Auth(auth::Error),
    BadResponse(String),
    RequestFailed(String),
    Json(serde_json::Error),
    ServerMessage { code: i64, message: String },
    Timeout,
    PayloadIdUnavailable,
    IncorrectStateVariant,
    UnsupportedForkVariant(String),
    BlockHashMismatch { computed: Hash256, payload: Hash256 },
    Transaction(types::Error),
    VersionedHashes(versioned_hashes::Error),
    ConsensusFailure,
    NoResponses(Vec<Error>),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if matches!(
            e.status(),
            Some(reqwest::StatusCode::UNAUTHORIZED) | Some(reqwest::StatusCode::FORBIDDEN)
        ) {
            Error::Auth(auth::Error::InvalidToken)
        } else if e.is_timeout() {
            Error::Timeout
        } else {
            Error::HttpClient(e)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<auth::Error> for Error {
    fn from(e: auth::Error) -> Self {
        Error::Auth(e)
    }
}

impl From<types::Error> for Error {
    fn from(e: types::Error) -> Self {
        Error::Transaction(e)
    }
}

impl From<versioned_hashes::Error> for Error {
    fn from(e: versioned_hashes::Error) -> Self {
        Error::VersionedHashes(e)
    }
}

/// Post-merge execution forks, in activation order. Each one selects a set of engine method
/// versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ForkName {
    Paris,
    Shanghai,
    Cancun,
    Prague,
}

impl ForkName {
    pub fn new_payload_method(self) -> &'static str {
        match self {
            ForkName::Paris => http::ENGINE_NEW_PAYLOAD_V1,
            ForkName::Shanghai => http::ENGINE_NEW_PAYLOAD_V2,
            ForkName::Cancun => http::ENGINE_NEW_PAYLOAD_V3,
            ForkName::Prague => http::ENGINE_NEW_PAYLOAD_V4,
        }
    }

    pub fn forkchoice_updated_method(self) -> &'static str {
        match self {
            ForkName::Paris => http::ENGINE_FORKCHOICE_UPDATED_V1,
            ForkName::Shanghai => http::ENGINE_FORKCHOICE_UPDATED_V2,
            ForkName::Cancun | ForkName::Prague => http::ENGINE_FORKCHOICE_UPDATED_V3,
        }
    }

    pub fn get_payload_method(self) -> &'static str {
        match self {
            ForkName::Paris => http::ENGINE_GET_PAYLOAD_V1,
            ForkName::Shanghai => http::ENGINE_GET_PAYLOAD_V2,
            ForkName::Cancun => http::ENGINE_GET_PAYLOAD_V3,
            ForkName::Prague => http::ENGINE_GET_PAYLOAD_V4,
        }
    }

    pub fn has_withdrawals(self) -> bool {
        self >= ForkName::Shanghai
    }

    pub fn has_blobs(self) -> bool {
        self >= ForkName::Cancun
    }

    pub fn has_requests(self) -> bool {
        self >= ForkName::Prague
    }
}

/// Activation timestamps of the time-gated forks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForkConfig {
    pub shanghai_time: Option<u64>,
    pub cancun_time: Option<u64>,
    pub prague_time: Option<u64>,
}

impl ForkConfig {
    pub fn fork_at_timestamp(&self, timestamp: u64) -> ForkName {
        let active = |time: Option<u64>| time.map_or(false, |t| timestamp >= t);
        if active(self.prague_time) {
            ForkName::Prague
        } else if active(self.cancun_time) {
            ForkName::Cancun
        } else if active(self.shanghai_time) {
            ForkName::Shanghai
        } else {
            ForkName::Paris
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub struct ForkchoiceState {
    pub head_block_hash: Hash256,
    pub safe_block_hash: Hash256,
    pub finalized_block_hash: Hash256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PayloadStatusV1Status {
    Valid,
    Invalid,
    Syncing,
    Accepted,
    InvalidBlockHash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadStatusV1 {
    pub status: PayloadStatusV1Status,
    pub latest_valid_hash: Option<Hash256>,
    pub validation_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkchoiceUpdatedResponse {
    pub payload_status: PayloadStatusV1,
    pub payload_id: Option<PayloadId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BlockByNumberQuery<'a> {
    Tag(&'a str),
    Number(#[serde(with = "serde_utils::u64_hex_be")] u64),
}

/// Summary of an execution block, enough to follow the chain and detect the terminal PoW block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionBlock {
    #[serde(rename = "hash")]
    pub block_hash: Hash256,
    #[serde(rename = "number", with = "serde_utils::u64_hex_be")]
    pub block_number: u64,
    pub parent_hash: Hash256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_difficulty: Option<Uint256>,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub timestamp: u64,
}

#[superstruct(
    variants(V1, V2, V3),
    variant_attributes(derive(Clone, Debug, Eq, PartialEq),),
    cast_error(ty = "Error", expr = "Error::IncorrectStateVariant"),
    partial_getter_error(ty = "Error", expr = "Error::IncorrectStateVariant")
)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PayloadAttributes {
    #[superstruct(getter(copy))]
    pub timestamp: u64,
    #[superstruct(getter(copy))]
    pub prev_randao: Hash256,
    #[superstruct(getter(copy))]
    pub suggested_fee_recipient: Address,
    #[superstruct(only(V2, V3))]
    pub withdrawals: Vec<Withdrawal>,
    #[superstruct(only(V3), partial_getter(copy))]
    pub parent_beacon_block_root: Hash256,
}

impl PayloadAttributes {
    pub fn new(
        timestamp: u64,
        prev_randao: Hash256,
        suggested_fee_recipient: Address,
        withdrawals: Option<Vec<Withdrawal>>,
        parent_beacon_block_root: Option<Hash256>,
    ) -> Self {
        match withdrawals {
            Some(withdrawals) => match parent_beacon_block_root {
                Some(parent_beacon_block_root) => PayloadAttributes::V3(PayloadAttributesV3 {
                    timestamp,
                    prev_randao,
                    suggested_fee_recipient,
                    withdrawals,
                    parent_beacon_block_root,
                }),
                None => PayloadAttributes::V2(PayloadAttributesV2 {
                    timestamp,
                    prev_randao,
                    suggested_fee_recipient,
                    withdrawals,
                }),
            },
            None => PayloadAttributes::V1(PayloadAttributesV1 {
                timestamp,
                prev_randao,
                suggested_fee_recipient,
            }),
        }
    }

    pub fn withdrawals_opt(&self) -> Option<&Vec<Withdrawal>> {
        self.withdrawals().ok()
    }

    pub fn parent_beacon_block_root_opt(&self) -> Option<Hash256> {
        self.parent_beacon_block_root().ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fork_method_versions() {
        let forks = ForkConfig {
            shanghai_time: Some(10),
            cancun_time: Some(20),
            prague_time: Some(30),
        };
        let expected = [
            (0, "engine_newPayloadV1", "engine_forkchoiceUpdatedV1"),
            (10, "engine_newPayloadV2", "engine_forkchoiceUpdatedV2"),
            (25, "engine_newPayloadV3", "engine_forkchoiceUpdatedV3"),
            (30, "engine_newPayloadV4", "engine_forkchoiceUpdatedV3"),
        ];
        for (timestamp, new_payload, forkchoice_updated) in expected {
            let fork = forks.fork_at_timestamp(timestamp);
            assert_eq!(fork.new_payload_method(), new_payload);
            assert_eq!(fork.forkchoice_updated_method(), forkchoice_updated);
        }
        assert_eq!(ForkConfig::default().fork_at_timestamp(u64::MAX), ForkName::Paris);
    }

    #[test]
    fn payload_attributes_variant() {
        let v1 = PayloadAttributes::new(1, Hash256::zero(), Address::zero(), None, None);
        assert!(v1.withdrawals_opt().is_none());
        let v3 = PayloadAttributes::new(
            1,
            Hash256::zero(),
            Address::zero(),
            Some(vec![]),
            Some(Hash256::repeat_byte(1)),
        );
        assert_eq!(v3.parent_beacon_block_root_opt(), Some(Hash256::repeat_byte(1)));
    }

    #[test]
    fn block_query_serialization() {
        assert_eq!(
            serde_json::to_value(BlockByNumberQuery::Number(26)).unwrap(),
            serde_json::json!("0x1a")
        );
        assert_eq!(
            serde_json::to_value(BlockByNumberQuery::Tag(LATEST_TAG)).unwrap(),
            serde_json::json!("latest")
        );
    }
}
