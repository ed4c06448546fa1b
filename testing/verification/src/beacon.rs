//! Read access to a beacon node, and an implementation over its standard HTTP API.
use crate::types::*;
use crate::Error;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use url::Url;

#[async_trait]
pub trait BeaconClient: Send + Sync {
    /// Human readable name used in logs and errors.
    fn name(&self) -> &str;

    /// `None` if the node knows no block for `id` (e.g. an empty slot).
    async fn block_header(&self, id: BlockId) -> Result<Option<BlockHeaderInfo>, Error>;

    async fn block(&self, id: BlockId) -> Result<Option<BeaconBlockInfo>, Error>;

    async fn finality_checkpoints(&self, id: BlockId) -> Result<FinalityCheckpoints, Error>;

    async fn state(&self, slot: Slot) -> Result<BeaconStateSummary, Error>;

    /// Balances in gwei of the given validators, in the order of `indices`.
    async fn validator_balances(&self, slot: Slot, indices: &[u64]) -> Result<Vec<u64>, Error>;
}

#[derive(Deserialize)]
struct GenericResponse<T> {
    data: T,
}

#[derive(Deserialize)]
struct VersionedResponse<T> {
    #[serde(default)]
    version: String,
    data: T,
}

#[derive(Deserialize)]
struct HeaderData {
    root: types::Hash256,
    header: SignedMessage<HeaderMessage>,
}

#[derive(Deserialize)]
struct SignedMessage<T> {
    message: T,
}

#[derive(Deserialize)]
struct HeaderMessage {
    #[serde(with = "serde_utils::quoted_u64")]
    slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    proposer_index: u64,
}

#[derive(Deserialize)]
struct BlockMessage {
    #[serde(with = "serde_utils::quoted_u64")]
    slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    proposer_index: u64,
    body: BlockBody,
}

#[derive(Deserialize)]
struct BlockBody {
    #[serde(default)]
    execution_payload: Option<ExecutionPayloadSummary>,
}

#[derive(Deserialize)]
struct StateData {
    #[serde(default)]
    current_epoch_participation: Option<Vec<ParticipationFlags>>,
    validators: Vec<ValidatorSummary>,
}

#[derive(Deserialize)]
struct BalanceData {
    #[serde(with = "serde_utils::quoted_u64")]
    index: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    balance: u64,
}

#[derive(Deserialize)]
struct IdentityData {
    enr: String,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// A beacon node reached over the standard `/eth/v*` HTTP API.
#[derive(Clone)]
pub struct BeaconNodeHttpClient {
    client: reqwest::Client,
    server: Url,
    name: String,
}

impl fmt::Display for BeaconNodeHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.server)
    }
}

impl BeaconNodeHttpClient {
    pub fn new(name: impl Into<String>, server: Url) -> Result<Self, Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            server,
            name: name.into(),
        })
    }

    fn path(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.server.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(self.server.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// The node's ENR, used to bootstrap peers.
    pub async fn enr(&self) -> Result<String, Error> {
        let url = self.path(&["eth", "v1", "node", "identity"])?;
        Ok(self.get::<GenericResponse<IdentityData>>(url).await?.data.enr)
    }

    /// Perform a HTTP GET request.
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let response = ok_or_error(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Perform a HTTP GET request, returning `None` on a 404 error.
    async fn get_opt<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, Error> {
        match ok_or_error(self.client.get(url).send().await?).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(Error::ServerMessage { status, .. }) if status == StatusCode::NOT_FOUND => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BeaconClient for BeaconNodeHttpClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn block_header(&self, id: BlockId) -> Result<Option<BlockHeaderInfo>, Error> {
        let url = self.path(&["eth", "v1", "beacon", "headers", &id.to_string()])?;
        Ok(self
            .get_opt::<GenericResponse<HeaderData>>(url)
            .await?
            .map(|response| BlockHeaderInfo {
                root: response.data.root,
                slot: response.data.header.message.slot,
                proposer_index: response.data.header.message.proposer_index,
            }))
    }

    async fn block(&self, id: BlockId) -> Result<Option<BeaconBlockInfo>, Error> {
        let url = self.path(&["eth", "v2", "beacon", "blocks", &id.to_string()])?;
        Ok(self
            .get_opt::<VersionedResponse<SignedMessage<BlockMessage>>>(url)
            .await?
            .map(|response| {
                let block = response.data.message;
                BeaconBlockInfo {
                    version: response.version,
                    slot: block.slot,
                    proposer_index: block.proposer_index,
                    execution_payload: block.body.execution_payload,
                }
            }))
    }

    async fn finality_checkpoints(&self, id: BlockId) -> Result<FinalityCheckpoints, Error> {
        let url = self.path(&[
            "eth",
            "v1",
            "beacon",
            "states",
            &id.to_string(),
            "finality_checkpoints",
        ])?;
        Ok(self
            .get::<GenericResponse<FinalityCheckpoints>>(url)
            .await?
            .data)
    }

    async fn state(&self, slot: Slot) -> Result<BeaconStateSummary, Error> {
        let url = self.path(&["eth", "v2", "debug", "beacon", "states", &slot.to_string()])?;
        let response = self.get::<VersionedResponse<StateData>>(url).await?;
        Ok(BeaconStateSummary {
            version: response.version,
            current_epoch_participation: response
                .data
                .current_epoch_participation
                .map(|flags| flags.into_iter().map(|f| f.0).collect()),
            validators: response.data.validators,
        })
    }

    async fn validator_balances(&self, slot: Slot, indices: &[u64]) -> Result<Vec<u64>, Error> {
        let mut url = self.path(&[
            "eth",
            "v1",
            "beacon",
            "states",
            &slot.to_string(),
            "validator_balances",
        ])?;
        if !indices.is_empty() {
            let ids = indices
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            url.query_pairs_mut().append_pair("id", &ids);
        }

        let balances = self
            .get::<GenericResponse<Vec<BalanceData>>>(url)
            .await?
            .data;
        indices
            .iter()
            .map(|index| {
                balances
                    .iter()
                    .find(|b| b.index == *index)
                    .map(|b| b.balance)
                    .ok_or_else(|| Error::MissingValidator {
                        node: self.name.clone(),
                        index: *index,
                    })
            })
            .collect()
    }
}

async fn ok_or_error(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status == StatusCode::OK {
        Ok(response)
    } else if let Ok(message) = response.json::<ErrorMessage>().await {
        Err(Error::ServerMessage {
            status,
            message: message.message,
        })
    } else {
        Err(Error::ServerMessage {
            status,
            message: String::new(),
        })
    }
}
