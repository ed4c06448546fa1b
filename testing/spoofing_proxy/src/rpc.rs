//! Decoding of the raw JSON-RPC bodies handed to spoofing callbacks.
use crate::Error;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct JsonRpcMessage {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    error: Option<engine_api::json_structures::JsonError>,
    #[serde(default)]
    result: Value,
}

fn message(body: &[u8]) -> Result<JsonRpcMessage, Error> {
    let message: JsonRpcMessage = serde_json::from_slice(body)?;
    if let Some(error) = message.error {
        return Err(Error::ServerMessage {
            code: error.code,
            message: error.message,
        });
    }
    Ok(message)
}

/// The `method` of a request body, if it parses as a single JSON-RPC message.
pub fn request_method(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<JsonRpcMessage>(body)
        .ok()
        .and_then(|m| m.method)
}

/// Decodes the `result` of a response body. A response carrying an `error` is an error.
pub fn decode_response<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    Ok(serde_json::from_value(message(body)?.result)?)
}

/// Decodes the whole `params` array of a request body, e.g. into a tuple.
pub fn decode_request_params<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    Ok(serde_json::from_value(message(body)?.params)?)
}

/// Decodes the parameter at `index` of a request body.
pub fn decode_request_param<T: DeserializeOwned>(body: &[u8], index: usize) -> Result<T, Error> {
    let params = message(body)?.params;
    let param = params
        .get(index)
        .cloned()
        .ok_or(Error::MissingParam(index))?;
    Ok(serde_json::from_value(param)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use engine_api::json_structures::{JsonForkchoiceStateV1, JsonPayloadStatusV1};
    use engine_api::JsonPayloadStatusV1Status;
    use serde_json::json;
    use types::Hash256;

    #[test]
    fn decodes_request_params() {
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "method": "engine_forkchoiceUpdatedV1",
            "params": [{
                "headBlockHash": Hash256::repeat_byte(1),
                "safeBlockHash": Hash256::repeat_byte(2),
                "finalizedBlockHash": Hash256::zero(),
            }, null],
            "id": 1,
        }))
        .unwrap();

        assert_eq!(request_method(&body).as_deref(), Some("engine_forkchoiceUpdatedV1"));
        let state: JsonForkchoiceStateV1 = decode_request_param(&body, 0).unwrap();
        assert_eq!(state.head_block_hash, Hash256::repeat_byte(1));
        let (_, attributes): (JsonForkchoiceStateV1, Option<Value>) =
            decode_request_params(&body).unwrap();
        assert!(attributes.is_none());
        assert!(matches!(
            decode_request_param::<Value>(&body, 2),
            Err(Error::MissingParam(2))
        ));
    }

    #[test]
    fn decodes_response_result() {
        let ok = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"status": "SYNCING", "latestValidHash": null, "validationError": null},
        }))
        .unwrap();
        let status: JsonPayloadStatusV1 = decode_response(&ok).unwrap();
        assert_eq!(status.status, JsonPayloadStatusV1Status::Syncing);

        let failed = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -38001, "message": "unknown payload"},
        }))
        .unwrap();
        assert!(matches!(
            decode_response::<Value>(&failed),
            Err(Error::ServerMessage { code: -38001, .. })
        ));
        assert!(request_method(b"not json").is_none());
    }
}
