use crate::versioned_hashes::get_versioned_hashes;
use crate::{Error, ExecutionPayload, ForkName, Hash256};
use serde_json::json;

/// Everything a `newPayload` call may carry beyond the payload itself. Which of the extra
/// parameters are sent depends on the method version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayloadRequest {
    pub execution_payload: ExecutionPayload,
    pub versioned_hashes: Vec<Hash256>,
    pub parent_beacon_block_root: Option<Hash256>,
    pub execution_requests: Option<Vec<Vec<u8>>>,
}

impl NewPayloadRequest {
    /// Builds a request whose versioned hashes are taken from the payload's blob transactions.
    pub fn from_payload(
        execution_payload: ExecutionPayload,
        parent_beacon_block_root: Option<Hash256>,
        execution_requests: Option<Vec<Vec<u8>>>,
    ) -> Result<Self, Error> {
        let versioned_hashes = get_versioned_hashes(&execution_payload.transactions)?;
        Ok(Self {
            execution_payload,
            versioned_hashes,
            parent_beacon_block_root,
            execution_requests,
        })
    }

    pub fn block_hash(&self) -> Hash256 {
        self.execution_payload.block_hash
    }

    pub fn block_number(&self) -> u64 {
        self.execution_payload.block_number
    }

    /// The `params` array for the `newPayload` version used at `fork`.
    pub fn params(&self, fork: ForkName) -> Result<serde_json::Value, Error> {
        let payload = serde_json::to_value(&self.execution_payload)?;
        if !fork.has_blobs() {
            return Ok(json!([payload]));
        }

        let root = self.parent_beacon_block_root.ok_or_else(|| {
            Error::UnsupportedForkVariant(format!(
                "{:?} newPayload needs a parent beacon block root",
                fork
            ))
        })?;
        if !fork.has_requests() {
            return Ok(json!([payload, self.versioned_hashes, root]));
        }

        let requests: Vec<String> = self
            .execution_requests
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|r| format!("0x{}", hex::encode(r)))
            .collect();
        Ok(json!([payload, self.versioned_hashes, root, requests]))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use types::Block;

    fn request() -> NewPayloadRequest {
        NewPayloadRequest {
            execution_payload: ExecutionPayload::from_block(&Block::default()),
            versioned_hashes: vec![Hash256::repeat_byte(1)],
            parent_beacon_block_root: Some(Hash256::repeat_byte(2)),
            execution_requests: Some(vec![vec![0x01, 0xab]]),
        }
    }

    #[test]
    fn params_per_fork() {
        let request = request();
        assert_eq!(request.params(ForkName::Paris).unwrap().as_array().unwrap().len(), 1);
        assert_eq!(request.params(ForkName::Shanghai).unwrap().as_array().unwrap().len(), 1);
        assert_eq!(request.params(ForkName::Cancun).unwrap().as_array().unwrap().len(), 3);

        let prague = request.params(ForkName::Prague).unwrap();
        assert_eq!(prague[3], json!(["0x01ab"]));
    }

    #[test]
    fn cancun_requires_beacon_root() {
        let mut request = request();
        request.parent_beacon_block_root = None;
        assert!(request.params(ForkName::Shanghai).is_ok());
        assert!(request.params(ForkName::Cancun).is_err());
    }
}
