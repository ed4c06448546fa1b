use crate::Error;
use serde_json::{Map, Value};

/// Field overrides for one JSON-RPC method.
///
/// Field names are dotted paths. On a request they are resolved against the first element of
/// `params`, on a response against `result`, so `payloadStatus.status` reaches into the status
/// object of a `forkchoiceUpdated` response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spoof {
    pub method: String,
    pub fields: Map<String, Value>,
}

impl Spoof {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, path: impl Into<String>, value: Value) -> Self {
        self.fields.insert(path.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Writes every field of the spoof into `target`.
    pub fn apply(&self, target: &mut Value) -> Result<(), Error> {
        for (path, value) in &self.fields {
            set_field(target, path, value.clone())?;
        }
        Ok(())
    }
}

/// Merges two optional spoofs. A missing side yields the other one; otherwise the fields of `b`
/// override those of `a`. Spoofs for different methods cannot be merged.
pub fn combine(a: Option<Spoof>, b: Option<Spoof>) -> Result<Option<Spoof>, Error> {
    match (a, b) {
        (None, b) => Ok(b),
        (a, None) => Ok(a),
        (Some(mut a), Some(b)) => {
            if a.method != b.method {
                return Err(Error::MethodMismatch {
                    first: a.method,
                    second: b.method,
                });
            }
            a.fields.extend(b.fields);
            Ok(Some(a))
        }
    }
}

/// Sets the value at a dotted `path` below `target`, creating intermediate objects as needed.
pub fn set_field(target: &mut Value, path: &str, value: Value) -> Result<(), Error> {
    let mut current = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let object = current
            .as_object_mut()
            .ok_or_else(|| Error::NotAnObject(path.to_string()))?;
        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return Ok(());
        }
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Err(Error::NotAnObject(path.to_string()))
}

/// Applies `spoof` to the first parameter of a JSON-RPC request body.
pub fn spoof_request(body: &[u8], spoof: &Spoof) -> Result<Vec<u8>, Error> {
    let mut message: Value = serde_json::from_slice(body)?;
    let first_param = message
        .get_mut("params")
        .and_then(|params| params.get_mut(0))
        .ok_or_else(|| Error::NotAnObject("params[0]".to_string()))?;
    spoof.apply(first_param)?;
    Ok(serde_json::to_vec(&message)?)
}

/// Applies `spoof` to the `result` of a JSON-RPC response body. Error responses are left alone.
pub fn spoof_response(body: &[u8], spoof: &Spoof) -> Result<Vec<u8>, Error> {
    let mut message: Value = serde_json::from_slice(body)?;
    if message.get("error").map_or(false, |e| !e.is_null()) {
        return Ok(body.to_vec());
    }
    let result = message
        .get_mut("result")
        .ok_or_else(|| Error::NotAnObject("result".to_string()))?;
    spoof.apply(result)?;
    Ok(serde_json::to_vec(&message)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn combine_prefers_later_fields() {
        let a = Spoof::new("engine_newPayloadV1")
            .with_field("blockHash", json!("0x01"))
            .with_field("gasUsed", json!("0x0"));
        let b = Spoof::new("engine_newPayloadV1").with_field("blockHash", json!("0x02"));

        let combined = combine(Some(a.clone()), Some(b)).unwrap().unwrap();
        assert_eq!(combined.fields["blockHash"], json!("0x02"));
        assert_eq!(combined.fields["gasUsed"], json!("0x0"));

        assert_eq!(combine(None, Some(a.clone())).unwrap(), Some(a.clone()));
        assert_eq!(combine(Some(a.clone()), None).unwrap(), Some(a));
        assert_eq!(combine(None, None).unwrap(), None);
    }

    #[test]
    fn combine_rejects_different_methods() {
        let result = combine(
            Some(Spoof::new("engine_newPayloadV1")),
            Some(Spoof::new("engine_getPayloadV1")),
        );
        assert!(matches!(result, Err(Error::MethodMismatch { .. })));
    }

    #[test]
    fn dotted_paths() {
        let mut value = json!({"payloadStatus": {"status": "VALID", "latestValidHash": "0x11"}});
        set_field(&mut value, "payloadStatus.status", json!("INVALID")).unwrap();
        set_field(&mut value, "payloadId", json!(null)).unwrap();
        set_field(&mut value, "extra.nested.leaf", json!(1)).unwrap();
        assert_eq!(
            value,
            json!({
                "payloadStatus": {"status": "INVALID", "latestValidHash": "0x11"},
                "payloadId": null,
                "extra": {"nested": {"leaf": 1}},
            })
        );

        let mut scalar = json!({"status": "VALID"});
        assert!(matches!(
            set_field(&mut scalar, "status.inner", json!(1)),
            Err(Error::NotAnObject(_))
        ));
    }

    #[test]
    fn request_and_response_targets() {
        let spoof = Spoof::new("engine_forkchoiceUpdatedV1").with_field("headBlockHash", json!("0xff"));
        let request = json!({
            "jsonrpc": "2.0",
            "method": "engine_forkchoiceUpdatedV1",
            "params": [{"headBlockHash": "0x01"}, null],
            "id": 1,
        });
        let spoofed = spoof_request(&serde_json::to_vec(&request).unwrap(), &spoof).unwrap();
        let spoofed: Value = serde_json::from_slice(&spoofed).unwrap();
        assert_eq!(spoofed["params"][0]["headBlockHash"], "0xff");
        assert_eq!(spoofed["params"][1], Value::Null);

        let error_response = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -1, "message": "x"}});
        let bytes = serde_json::to_vec(&error_response).unwrap();
        assert_eq!(spoof_response(&bytes, &spoof).unwrap(), bytes);
    }
}
