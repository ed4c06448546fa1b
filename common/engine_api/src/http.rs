//! Contains an implementation of the engine API and the `eth` methods the test drivers need,
//! using JSON-RPC over HTTP.

use super::*;
use crate::auth::Auth;
use crate::json_structures::*;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use url::Url;

pub use reqwest::Client;

const STATIC_ID: u32 = 1;
pub const JSONRPC_VERSION: &str = "2.0";

pub const RETURN_FULL_TRANSACTION_OBJECTS: bool = false;

pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const ETH_GET_BLOCK_BY_NUMBER_TIMEOUT: Duration = Duration::from_secs(1);

pub const ETH_GET_BLOCK_BY_HASH: &str = "eth_getBlockByHash";
pub const ETH_GET_BLOCK_BY_HASH_TIMEOUT: Duration = Duration::from_secs(1);

pub const ETH_CHAIN_ID: &str = "eth_chainId";
pub const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";
pub const ETH_SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";
pub const ETH_GET_TRANSACTION_COUNT: &str = "eth_getTransactionCount";
pub const ETH_DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

pub const ENGINE_NEW_PAYLOAD_V1: &str = "engine_newPayloadV1";
pub const ENGINE_NEW_PAYLOAD_V2: &str = "engine_newPayloadV2";
pub const ENGINE_NEW_PAYLOAD_V3: &str = "engine_newPayloadV3";
pub const ENGINE_NEW_PAYLOAD_V4: &str = "engine_newPayloadV4";
pub const ENGINE_NEW_PAYLOAD_TIMEOUT: Duration = Duration::from_secs(8);

pub const ENGINE_GET_PAYLOAD_V1: &str = "engine_getPayloadV1";
pub const ENGINE_GET_PAYLOAD_V2: &str = "engine_getPayloadV2";
pub const ENGINE_GET_PAYLOAD_V3: &str = "engine_getPayloadV3";
pub const ENGINE_GET_PAYLOAD_V4: &str = "engine_getPayloadV4";
pub const ENGINE_GET_PAYLOAD_TIMEOUT: Duration = Duration::from_secs(2);

pub const ENGINE_FORKCHOICE_UPDATED_V1: &str = "engine_forkchoiceUpdatedV1";
pub const ENGINE_FORKCHOICE_UPDATED_V2: &str = "engine_forkchoiceUpdatedV2";
pub const ENGINE_FORKCHOICE_UPDATED_V3: &str = "engine_forkchoiceUpdatedV3";
pub const ENGINE_FORKCHOICE_UPDATED_TIMEOUT: Duration = Duration::from_secs(8);

/// A JSON-RPC client for one execution client endpoint. The engine port requires `auth`, the
/// plain RPC port does not.
#[derive(Debug, Clone)]
pub struct HttpJsonRpc {
    pub client: Client,
    pub url: Url,
    auth: Option<Auth>,
}

impl HttpJsonRpc {
    pub fn new(url: Url) -> Result<Self, Error> {
        Ok(Self {
            client: Client::builder().build()?,
            url,
            auth: None,
        })
    }

    pub fn new_with_auth(url: Url, auth: Auth) -> Result<Self, Error> {
        Ok(Self {
            client: Client::builder().build()?,
            url,
            auth: Some(auth),
        })
    }

    pub async fn rpc_request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, Error> {
        let body = JsonRequestBody {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: json!(STATIC_ID),
        };

        let mut request = self
            .client
            .post(self.url.clone())
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);

        // Generate and add a jwt token to the header if auth is defined.
        if let Some(auth) = &self.auth {
            request = request.bearer_auth(auth.generate_token()?);
        };

        let body: JsonResponseBody = request.send().await?.error_for_status()?.json().await?;

        match (body.result, body.error) {
            (result, None) => serde_json::from_value(result).map_err(Into::into),
            (_, Some(error)) => Err(Error::ServerMessage {
                code: error.code,
                message: error.message,
            }),
        }
    }

    pub async fn get_block_by_number(
        &self,
        query: BlockByNumberQuery<'_>,
    ) -> Result<Option<ExecutionBlock>, Error> {
        let params = json!([query, RETURN_FULL_TRANSACTION_OBJECTS]);

        self.rpc_request(
            ETH_GET_BLOCK_BY_NUMBER,
            params,
            ETH_GET_BLOCK_BY_NUMBER_TIMEOUT,
        )
        .await
    }

    /// Same request as `get_block_by_number`, decoded as a full header.
    pub async fn get_header_by_number(
        &self,
        query: BlockByNumberQuery<'_>,
    ) -> Result<Option<Header>, Error> {
        let params = json!([query, RETURN_FULL_TRANSACTION_OBJECTS]);

        self.rpc_request(
            ETH_GET_BLOCK_BY_NUMBER,
            params,
            ETH_GET_BLOCK_BY_NUMBER_TIMEOUT,
        )
        .await
    }

    pub async fn get_block_by_hash(
        &self,
        block_hash: Hash256,
    ) -> Result<Option<ExecutionBlock>, Error> {
        let params = json!([block_hash, RETURN_FULL_TRANSACTION_OBJECTS]);

        self.rpc_request(ETH_GET_BLOCK_BY_HASH, params, ETH_GET_BLOCK_BY_HASH_TIMEOUT)
            .await
    }

    pub async fn get_header_by_hash(&self, block_hash: Hash256) -> Result<Option<Header>, Error> {
        let params = json!([block_hash, RETURN_FULL_TRANSACTION_OBJECTS]);

        self.rpc_request(ETH_GET_BLOCK_BY_HASH, params, ETH_GET_BLOCK_BY_HASH_TIMEOUT)
            .await
    }

    pub async fn chain_id(&self) -> Result<u64, Error> {
        let id: types::U64 = self
            .rpc_request(ETH_CHAIN_ID, json!([]), ETH_DEFAULT_TIMEOUT)
            .await?;
        Ok(id.as_u64())
    }

    pub async fn block_number(&self) -> Result<u64, Error> {
        let number: types::U64 = self
            .rpc_request(ETH_BLOCK_NUMBER, json!([]), ETH_DEFAULT_TIMEOUT)
            .await?;
        Ok(number.as_u64())
    }

    pub async fn transaction_count(
        &self,
        address: Address,
        query: BlockByNumberQuery<'_>,
    ) -> Result<u64, Error> {
        let count: types::U64 = self
            .rpc_request(
                ETH_GET_TRANSACTION_COUNT,
                json!([address, query]),
                ETH_DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(count.as_u64())
    }

    pub async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<Hash256, Error> {
        let params = json!([format!("0x{}", hex::encode(encoded))]);
        self.rpc_request(ETH_SEND_RAW_TRANSACTION, params, ETH_DEFAULT_TIMEOUT)
            .await
    }

    async fn forkchoice_updated_with_method(
        &self,
        method: &str,
        forkchoice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdatedResponse, Error> {
        let params = json!([
            JsonForkchoiceStateV1::from(forkchoice_state),
            payload_attributes.map(JsonPayloadAttributes::from)
        ]);

        let response: JsonForkchoiceUpdatedV1Response = self
            .rpc_request(method, params, ENGINE_FORKCHOICE_UPDATED_TIMEOUT)
            .await?;

        Ok(response.into())
    }

    pub async fn forkchoice_updated_v1(
        &self,
        forkchoice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdatedResponse, Error> {
        self.forkchoice_updated_with_method(
            ENGINE_FORKCHOICE_UPDATED_V1,
            forkchoice_state,
            payload_attributes,
        )
        .await
    }

    pub async fn forkchoice_updated_v2(
        &self,
        forkchoice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdatedResponse, Error> {
        self.forkchoice_updated_with_method(
            ENGINE_FORKCHOICE_UPDATED_V2,
            forkchoice_state,
            payload_attributes,
        )
        .await
    }

    pub async fn forkchoice_updated_v3(
        &self,
        forkchoice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdatedResponse, Error> {
        self.forkchoice_updated_with_method(
            ENGINE_FORKCHOICE_UPDATED_V3,
            forkchoice_state,
            payload_attributes,
        )
        .await
    }

    /// Calls the `forkchoiceUpdated` version matching `fork`.
    pub async fn forkchoice_updated(
        &self,
        fork: ForkName,
        forkchoice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdatedResponse, Error> {
        self.forkchoice_updated_with_method(
            fork.forkchoice_updated_method(),
            forkchoice_state,
            payload_attributes,
        )
        .await
    }

    async fn new_payload_with_method(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<PayloadStatusV1, Error> {
        let response: JsonPayloadStatusV1 = self
            .rpc_request(method, params, ENGINE_NEW_PAYLOAD_TIMEOUT)
            .await?;

        Ok(response.into())
    }

    pub async fn new_payload_v1(
        &self,
        execution_payload: ExecutionPayload,
    ) -> Result<PayloadStatusV1, Error> {
        self.new_payload_with_method(ENGINE_NEW_PAYLOAD_V1, json!([execution_payload]))
            .await
    }

    pub async fn new_payload_v2(
        &self,
        execution_payload: ExecutionPayload,
    ) -> Result<PayloadStatusV1, Error> {
        self.new_payload_with_method(ENGINE_NEW_PAYLOAD_V2, json!([execution_payload]))
            .await
    }

    pub async fn new_payload_v3(
        &self,
        request: &NewPayloadRequest,
    ) -> Result<PayloadStatusV1, Error> {
        self.new_payload_with_method(ENGINE_NEW_PAYLOAD_V3, request.params(ForkName::Cancun)?)
            .await
    }

    pub async fn new_payload_v4(
        &self,
        request: &NewPayloadRequest,
    ) -> Result<PayloadStatusV1, Error> {
        self.new_payload_with_method(ENGINE_NEW_PAYLOAD_V4, request.params(ForkName::Prague)?)
            .await
    }

    /// Calls the `newPayload` version matching `fork`, with the parameters that version takes.
    pub async fn new_payload(
        &self,
        fork: ForkName,
        request: &NewPayloadRequest,
    ) -> Result<PayloadStatusV1, Error> {
        self.new_payload_with_method(fork.new_payload_method(), request.params(fork)?)
            .await
    }

    pub async fn get_payload_v1(&self, payload_id: PayloadId) -> Result<GetPayloadResponse, Error> {
        let params = json!([JsonPayloadIdRequest::from(payload_id)]);

        let payload: ExecutionPayload = self
            .rpc_request(ENGINE_GET_PAYLOAD_V1, params, ENGINE_GET_PAYLOAD_TIMEOUT)
            .await?;

        Ok(payload.into())
    }

    async fn get_payload_with_method(
        &self,
        method: &str,
        payload_id: PayloadId,
    ) -> Result<GetPayloadResponse, Error> {
        let params = json!([JsonPayloadIdRequest::from(payload_id)]);

        self.rpc_request(method, params, ENGINE_GET_PAYLOAD_TIMEOUT)
            .await
    }

    /// Calls the `getPayload` version matching `fork`.
    pub async fn get_payload(
        &self,
        fork: ForkName,
        payload_id: PayloadId,
    ) -> Result<GetPayloadResponse, Error> {
        match fork {
            ForkName::Paris => self.get_payload_v1(payload_id).await,
            fork => {
                self.get_payload_with_method(fork.get_payload_method(), payload_id)
                    .await
            }
        }
    }
}
