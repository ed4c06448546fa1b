use super::Context;
use crate::http::*;
use crate::json_structures::*;
use crate::versioned_hashes::verify_versioned_hashes;
use crate::{
    ForkName, Hash256, NewPayloadRequest, PayloadAttributes, PayloadStatusV1,
    PayloadStatusV1Status,
};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use slog::debug;
use std::sync::Arc;
use types::{Address, U64};

pub const GENERIC_ERROR_CODE: i64 = -1234;
pub const METHOD_NOT_FOUND_ERROR_CODE: i64 = -32601;
pub const BAD_PARAMS_ERROR_CODE: i64 = -32602;
pub const UNKNOWN_PAYLOAD_ERROR_CODE: i64 = -38001;
pub const UNSUPPORTED_FORK_ERROR_CODE: i64 = -38005;

pub async fn handle_rpc(
    body: JsonValue,
    ctx: Arc<Context>,
) -> Result<JsonValue, (String, i64)> {
    ctx.received_requests.write().push(body.clone());

    let method = body
        .get("method")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ("missing/invalid method field".to_string(), GENERIC_ERROR_CODE))?;

    let params = body
        .get("params")
        .ok_or_else(|| ("missing/invalid params field".to_string(), GENERIC_ERROR_CODE))?;

    debug!(ctx.log, "Mock execution engine request"; "method" => method);

    match method {
        "eth_syncing" => Ok(JsonValue::Bool(false)),
        ETH_CHAIN_ID => to_json(U64::from(ctx.config.chain_id)),
        ETH_BLOCK_NUMBER => {
            let number = ctx
                .execution_block_generator
                .read()
                .latest_block()
                .map_or(0, |block| block.block_number());
            to_json(U64::from(number))
        }
        ETH_GET_BLOCK_BY_NUMBER => {
            let tag: String = get_param(params, 0)?;
            let generator = ctx.execution_block_generator.read();
            match generator
                .block_by_tag(&tag)
                .map_err(|e| (e, BAD_PARAMS_ERROR_CODE))?
            {
                Some(block) => block
                    .as_json(generator.terminal_total_difficulty)
                    .map_err(|e| (e, GENERIC_ERROR_CODE)),
                None => Ok(JsonValue::Null),
            }
        }
        ETH_GET_BLOCK_BY_HASH => {
            let hash: Hash256 = get_param(params, 0)?;
            let generator = ctx.execution_block_generator.read();
            match generator.block_by_hash(hash) {
                Some(block) => block
                    .as_json(generator.terminal_total_difficulty)
                    .map_err(|e| (e, GENERIC_ERROR_CODE)),
                None => Ok(JsonValue::Null),
            }
        }
        ETH_GET_TRANSACTION_COUNT => {
            let address: Address = get_param(params, 0)?;
            let count = ctx
                .execution_block_generator
                .read()
                .transaction_count(address);
            to_json(U64::from(count))
        }
        ETH_SEND_RAW_TRANSACTION => {
            let raw: String = get_param(params, 0)?;
            let bytes = hex::decode(raw.trim_start_matches("0x"))
                .map_err(|e| (format!("invalid hex: {:?}", e), BAD_PARAMS_ERROR_CODE))?;
            let hash = ctx
                .execution_block_generator
                .write()
                .add_transaction(bytes)
                .map_err(|e| (e, GENERIC_ERROR_CODE))?;
            to_json(hash)
        }
        ENGINE_NEW_PAYLOAD_V1 | ENGINE_NEW_PAYLOAD_V2 | ENGINE_NEW_PAYLOAD_V3
        | ENGINE_NEW_PAYLOAD_V4 => {
            let payload: ExecutionPayload = get_param(params, 0)?;
            let fork = ctx
                .execution_block_generator
                .read()
                .fork_config
                .fork_at_timestamp(payload.timestamp);
            check_fork(method, fork)?;

            let (versioned_hashes, parent_beacon_block_root) = if fork.has_blobs() {
                let hashes: Vec<Hash256> = get_param(params, 1)?;
                let root: Hash256 = get_param(params, 2)?;
                (hashes, Some(root))
            } else {
                (vec![], None)
            };
            let execution_requests = if fork.has_requests() {
                let requests: Vec<String> = get_param(params, 3)?;
                let decoded = requests
                    .iter()
                    .map(|r| hex::decode(r.trim_start_matches("0x")))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| (format!("invalid request hex: {:?}", e), BAD_PARAMS_ERROR_CODE))?;
                Some(decoded)
            } else {
                None
            };

            if let Some(status) = ctx.static_new_payload_response.read().clone() {
                return to_json(JsonPayloadStatusV1::from(status));
            }

            let status = if fork.has_blobs()
                && verify_versioned_hashes(&payload.transactions, &versioned_hashes).is_err()
            {
                PayloadStatusV1 {
                    status: PayloadStatusV1Status::Invalid,
                    latest_valid_hash: None,
                    validation_error: Some("versioned hashes mismatch".to_string()),
                }
            } else {
                ctx.execution_block_generator
                    .write()
                    .new_payload(NewPayloadRequest {
                        execution_payload: payload,
                        versioned_hashes,
                        parent_beacon_block_root,
                        execution_requests,
                    })
            };

            to_json(JsonPayloadStatusV1::from(status))
        }
        ENGINE_GET_PAYLOAD_V1 | ENGINE_GET_PAYLOAD_V2 | ENGINE_GET_PAYLOAD_V3
        | ENGINE_GET_PAYLOAD_V4 => {
            let request: JsonPayloadIdRequest = get_param(params, 0)?;
            let id = request.0;

            let (fork, response) = ctx
                .execution_block_generator
                .read()
                .get_payload(&id)
                .ok_or_else(|| {
                    (
                        format!("no payload for id {:?}", id),
                        UNKNOWN_PAYLOAD_ERROR_CODE,
                    )
                })?;
            check_fork(method, fork)?;

            if method == ENGINE_GET_PAYLOAD_V1 {
                to_json(response.execution_payload)
            } else {
                to_json(response)
            }
        }
        ENGINE_FORKCHOICE_UPDATED_V1 | ENGINE_FORKCHOICE_UPDATED_V2
        | ENGINE_FORKCHOICE_UPDATED_V3 => {
            let forkchoice_state: JsonForkchoiceStateV1 = get_param(params, 0)?;
            let payload_attributes: Option<JsonPayloadAttributes> = get_param(params, 1)?;

            if let Some(attributes) = &payload_attributes {
                let fork = ctx
                    .execution_block_generator
                    .read()
                    .fork_config
                    .fork_at_timestamp(attributes.timestamp);
                check_fork(method, fork)?;
                check_attributes(fork, attributes)?;
            }

            if let Some(response) = ctx.static_forkchoice_updated_response.read().clone() {
                return to_json(JsonForkchoiceUpdatedV1Response::from(response));
            }

            let response = ctx
                .execution_block_generator
                .write()
                .forkchoice_updated(
                    forkchoice_state.into(),
                    payload_attributes.map(PayloadAttributes::from),
                )
                .map_err(|e| (e, GENERIC_ERROR_CODE))?;

            to_json(response)
        }
        other => Err((
            format!("The method {} does not exist/is not available", other),
            METHOD_NOT_FOUND_ERROR_CODE,
        )),
    }
}

/// The forks whose payloads a versioned engine method accepts.
fn method_accepts_fork(method: &str, fork: ForkName) -> bool {
    match method {
        ENGINE_NEW_PAYLOAD_V1 | ENGINE_GET_PAYLOAD_V1 | ENGINE_FORKCHOICE_UPDATED_V1 => {
            fork == ForkName::Paris
        }
        ENGINE_NEW_PAYLOAD_V2 | ENGINE_GET_PAYLOAD_V2 | ENGINE_FORKCHOICE_UPDATED_V2 => {
            fork <= ForkName::Shanghai
        }
        ENGINE_NEW_PAYLOAD_V3 | ENGINE_GET_PAYLOAD_V3 => fork == ForkName::Cancun,
        ENGINE_FORKCHOICE_UPDATED_V3 => fork >= ForkName::Cancun,
        ENGINE_NEW_PAYLOAD_V4 | ENGINE_GET_PAYLOAD_V4 => fork == ForkName::Prague,
        _ => false,
    }
}

fn check_fork(method: &str, fork: ForkName) -> Result<(), (String, i64)> {
    if method_accepts_fork(method, fork) {
        Ok(())
    } else {
        Err((
            format!("{} does not support fork {:?}", method, fork),
            UNSUPPORTED_FORK_ERROR_CODE,
        ))
    }
}

fn check_attributes(
    fork: ForkName,
    attributes: &JsonPayloadAttributes,
) -> Result<(), (String, i64)> {
    if fork.has_withdrawals() != attributes.withdrawals.is_some() {
        return Err((
            format!("withdrawals presence does not match fork {:?}", fork),
            BAD_PARAMS_ERROR_CODE,
        ));
    }
    if fork.has_blobs() != attributes.parent_beacon_block_root.is_some() {
        return Err((
            format!("parent beacon block root presence does not match fork {:?}", fork),
            BAD_PARAMS_ERROR_CODE,
        ));
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: T) -> Result<JsonValue, (String, i64)> {
    serde_json::to_value(value)
        .map_err(|e| (format!("failed to serialize response: {:?}", e), GENERIC_ERROR_CODE))
}

/// Deserializes `params[index]`. A missing parameter is read as `null`, so optional trailing
/// parameters may be omitted.
pub fn get_param<T: DeserializeOwned>(params: &JsonValue, index: usize) -> Result<T, (String, i64)> {
    let param = params.get(index).cloned().unwrap_or(JsonValue::Null);
    serde_json::from_value(param).map_err(|e| {
        (
            format!("failed to deserialize param[{}]: {:?}", index, e),
            BAD_PARAMS_ERROR_CODE,
        )
    })
}
