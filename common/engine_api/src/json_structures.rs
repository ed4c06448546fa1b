use super::*;
use serde::{Deserialize, Serialize};
use types::serde_helpers::opt_u64_hex;
use types::{Block, Bloom};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonRequestBody<'a> {
    pub jsonrpc: &'a str,
    pub method: &'a str,
    pub params: serde_json::Value,
    pub id: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonResponseBody {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonError>,
    #[serde(default)]
    pub result: serde_json::Value,
    pub id: serde_json::Value,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransparentJsonPayloadId(#[serde(with = "serde_utils::bytes_8_hex")] pub PayloadId);

impl From<PayloadId> for TransparentJsonPayloadId {
    fn from(id: PayloadId) -> Self {
        Self(id)
    }
}

impl From<TransparentJsonPayloadId> for PayloadId {
    fn from(wrapper: TransparentJsonPayloadId) -> Self {
        wrapper.0
    }
}

/// On the request, use a transparent wrapper.
pub type JsonPayloadIdRequest = TransparentJsonPayloadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonWithdrawal {
    #[serde(with = "serde_utils::u64_hex_be")]
    pub index: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub validator_index: u64,
    pub address: Address,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub amount: u64,
}

impl From<Withdrawal> for JsonWithdrawal {
    fn from(w: Withdrawal) -> Self {
        Self {
            index: w.index,
            validator_index: w.validator_index,
            address: w.address,
            amount: w.amount,
        }
    }
}

impl From<JsonWithdrawal> for Withdrawal {
    fn from(w: JsonWithdrawal) -> Self {
        Self {
            index: w.index,
            validator_index: w.validator_index,
            address: w.address,
            amount: w.amount,
        }
    }
}

/// Execution payload in its JSON form. Fields added by later forks are optional and omitted
/// when absent, so one type covers `ExecutionPayloadV1` through `V3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayload {
    pub parent_hash: Hash256,
    pub fee_recipient: Address,
    pub state_root: Hash256,
    pub receipts_root: Hash256,
    pub logs_bloom: Bloom,
    pub prev_randao: Hash256,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub block_number: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub gas_limit: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub gas_used: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub timestamp: u64,
    #[serde(with = "serde_utils::hex_vec")]
    pub extra_data: Vec<u8>,
    pub base_fee_per_gas: Uint256,
    pub block_hash: Hash256,
    #[serde(with = "serde_bytes_list")]
    pub transactions: Vec<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<JsonWithdrawal>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_u64_hex")]
    pub blob_gas_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_u64_hex")]
    pub excess_blob_gas: Option<u64>,
}

impl ExecutionPayload {
    /// The payload carrying `block`. Pre-London blocks have no base fee and map to zero.
    pub fn from_block(block: &Block) -> Self {
        let header = &block.header;
        Self {
            parent_hash: header.parent_hash,
            fee_recipient: header.beneficiary,
            state_root: header.state_root,
            receipts_root: header.receipts_root,
            logs_bloom: header.logs_bloom,
            prev_randao: header.mix_hash,
            block_number: header.number,
            gas_limit: header.gas_limit,
            gas_used: header.gas_used,
            timestamp: header.timestamp,
            extra_data: header.extra_data.clone(),
            base_fee_per_gas: header.base_fee_per_gas.unwrap_or_default(),
            block_hash: block.hash(),
            transactions: block
                .transactions
                .iter()
                .map(|tx| tx.encoded_2718())
                .collect(),
            withdrawals: block
                .withdrawals
                .as_ref()
                .map(|ws| ws.iter().copied().map(Into::into).collect()),
            blob_gas_used: header.blob_gas_used,
            excess_blob_gas: header.excess_blob_gas,
        }
    }

    pub fn withdrawals_list(&self) -> Option<Vec<Withdrawal>> {
        self.withdrawals
            .as_ref()
            .map(|ws| ws.iter().copied().map(Into::into).collect())
    }
}

/// Superset of `PayloadAttributesV1`-`V3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPayloadAttributes {
    #[serde(with = "serde_utils::u64_hex_be")]
    pub timestamp: u64,
    pub prev_randao: Hash256,
    pub suggested_fee_recipient: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<JsonWithdrawal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<Hash256>,
}

impl From<PayloadAttributes> for JsonPayloadAttributes {
    fn from(p: PayloadAttributes) -> Self {
        Self {
            timestamp: p.timestamp(),
            prev_randao: p.prev_randao(),
            suggested_fee_recipient: p.suggested_fee_recipient(),
            withdrawals: p
                .withdrawals_opt()
                .map(|ws| ws.iter().copied().map(Into::into).collect()),
            parent_beacon_block_root: p.parent_beacon_block_root_opt(),
        }
    }
}

impl From<JsonPayloadAttributes> for PayloadAttributes {
    fn from(j: JsonPayloadAttributes) -> Self {
        // Use this verbose deconstruction pattern to ensure no field is left unused.
        let JsonPayloadAttributes {
            timestamp,
            prev_randao,
            suggested_fee_recipient,
            withdrawals,
            parent_beacon_block_root,
        } = j;

        PayloadAttributes::new(
            timestamp,
            prev_randao,
            suggested_fee_recipient,
            withdrawals.map(|ws| ws.into_iter().map(Into::into).collect()),
            parent_beacon_block_root,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonForkchoiceStateV1 {
    pub head_block_hash: Hash256,
    pub safe_block_hash: Hash256,
    pub finalized_block_hash: Hash256,
}

impl From<ForkchoiceState> for JsonForkchoiceStateV1 {
    fn from(f: ForkchoiceState) -> Self {
        // Use this verbose deconstruction pattern to ensure no field is left unused.
        let ForkchoiceState {
            head_block_hash,
            safe_block_hash,
            finalized_block_hash,
        } = f;

        Self {
            head_block_hash,
            safe_block_hash,
            finalized_block_hash,
        }
    }
}

impl From<JsonForkchoiceStateV1> for ForkchoiceState {
    fn from(j: JsonForkchoiceStateV1) -> Self {
        // Use this verbose deconstruction pattern to ensure no field is left unused.
        let JsonForkchoiceStateV1 {
            head_block_hash,
            safe_block_hash,
            finalized_block_hash,
        } = j;

        Self {
            head_block_hash,
            safe_block_hash,
            finalized_block_hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JsonPayloadStatusV1Status {
    Valid,
    Invalid,
    Syncing,
    Accepted,
    InvalidBlockHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPayloadStatusV1 {
    pub status: JsonPayloadStatusV1Status,
    pub latest_valid_hash: Option<Hash256>,
    pub validation_error: Option<String>,
}

impl From<PayloadStatusV1Status> for JsonPayloadStatusV1Status {
    fn from(e: PayloadStatusV1Status) -> Self {
        match e {
            PayloadStatusV1Status::Valid => JsonPayloadStatusV1Status::Valid,
            PayloadStatusV1Status::Invalid => JsonPayloadStatusV1Status::Invalid,
            PayloadStatusV1Status::Syncing => JsonPayloadStatusV1Status::Syncing,
            PayloadStatusV1Status::Accepted => JsonPayloadStatusV1Status::Accepted,
            PayloadStatusV1Status::InvalidBlockHash => JsonPayloadStatusV1Status::InvalidBlockHash,
        }
    }
}

impl From<JsonPayloadStatusV1Status> for PayloadStatusV1Status {
    fn from(j: JsonPayloadStatusV1Status) -> Self {
        match j {
            JsonPayloadStatusV1Status::Valid => PayloadStatusV1Status::Valid,
            JsonPayloadStatusV1Status::Invalid => PayloadStatusV1Status::Invalid,
            JsonPayloadStatusV1Status::Syncing => PayloadStatusV1Status::Syncing,
            JsonPayloadStatusV1Status::Accepted => PayloadStatusV1Status::Accepted,
            JsonPayloadStatusV1Status::InvalidBlockHash => PayloadStatusV1Status::InvalidBlockHash,
        }
    }
}

impl From<PayloadStatusV1> for JsonPayloadStatusV1 {
    fn from(p: PayloadStatusV1) -> Self {
        // Use this verbose deconstruction pattern to ensure no field is left unused.
        let PayloadStatusV1 {
            status,
            latest_valid_hash,
            validation_error,
        } = p;

        Self {
            status: status.into(),
            latest_valid_hash,
            validation_error,
        }
    }
}

impl From<JsonPayloadStatusV1> for PayloadStatusV1 {
    fn from(j: JsonPayloadStatusV1) -> Self {
        // Use this verbose deconstruction pattern to ensure no field is left unused.
        let JsonPayloadStatusV1 {
            status,
            latest_valid_hash,
            validation_error,
        } = j;

        Self {
            status: status.into(),
            latest_valid_hash,
            validation_error,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonForkchoiceUpdatedV1Response {
    pub payload_status: JsonPayloadStatusV1,
    pub payload_id: Option<TransparentJsonPayloadId>,
}

impl From<JsonForkchoiceUpdatedV1Response> for ForkchoiceUpdatedResponse {
    fn from(j: JsonForkchoiceUpdatedV1Response) -> Self {
        // Use this verbose deconstruction pattern to ensure no field is left unused.
        let JsonForkchoiceUpdatedV1Response {
            payload_status: status,
            payload_id,
        } = j;

        Self {
            payload_status: status.into(),
            payload_id: payload_id.map(Into::into),
        }
    }
}

impl From<ForkchoiceUpdatedResponse> for JsonForkchoiceUpdatedV1Response {
    fn from(f: ForkchoiceUpdatedResponse) -> Self {
        // Use this verbose deconstruction pattern to ensure no field is left unused.
        let ForkchoiceUpdatedResponse {
            payload_status: status,
            payload_id,
        } = f;

        Self {
            payload_status: status.into(),
            payload_id: payload_id.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobsBundle {
    #[serde(with = "serde_bytes_list")]
    pub commitments: Vec<Vec<u8>>,
    #[serde(with = "serde_bytes_list")]
    pub proofs: Vec<Vec<u8>>,
    #[serde(with = "serde_bytes_list")]
    pub blobs: Vec<Vec<u8>>,
}

/// Response of `engine_getPayloadV2` and later. `V1` returns the bare payload and is wrapped
/// into this shape by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPayloadResponse {
    pub execution_payload: ExecutionPayload,
    #[serde(default)]
    pub block_value: Uint256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blobs_bundle: Option<BlobsBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_override_builder: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_opt_bytes_list"
    )]
    pub execution_requests: Option<Vec<Vec<u8>>>,
}

impl From<ExecutionPayload> for GetPayloadResponse {
    fn from(execution_payload: ExecutionPayload) -> Self {
        Self {
            execution_payload,
            block_value: Uint256::zero(),
            blobs_bundle: None,
            should_override_builder: None,
            execution_requests: None,
        }
    }
}

/// Serializes a list of byte strings as `0x`-prefixed hex strings.
pub mod serde_bytes_list {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(list: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(list.iter().map(|bytes| format!("0x{}", hex::encode(bytes))))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| {
                let stripped = s
                    .strip_prefix("0x")
                    .ok_or_else(|| D::Error::custom("missing 0x prefix"))?;
                hex::decode(stripped).map_err(|e| D::Error::custom(format!("invalid hex: {:?}", e)))
            })
            .collect()
    }
}

/// Like `serde_bytes_list` for an optional list.
pub mod serde_opt_bytes_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(transparent)]
    struct Wrapper(#[serde(with = "super::serde_bytes_list")] Vec<Vec<u8>>);

    pub fn serialize<S>(list: &Option<Vec<Vec<u8>>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        list.as_ref()
            .map(|l| Wrapper(l.clone()))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<Vec<u8>>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_status_json() {
        let status: JsonPayloadStatusV1 = serde_json::from_value(json!({
            "status": "INVALID_BLOCK_HASH",
            "latestValidHash": null,
            "validationError": "bad hash",
        }))
        .unwrap();
        let status = PayloadStatusV1::from(status);
        assert_eq!(status.status, PayloadStatusV1Status::InvalidBlockHash);
        assert_eq!(status.validation_error.as_deref(), Some("bad hash"));
    }

    #[test]
    fn payload_omits_absent_fork_fields() {
        let block = Block {
            header: Header {
                number: 3,
                base_fee_per_gas: Some(7.into()),
                ..Header::default()
            },
            ..Block::default()
        };
        let json = serde_json::to_value(ExecutionPayload::from_block(&block)).unwrap();
        assert_eq!(json["blockNumber"], "0x3");
        assert_eq!(json["baseFeePerGas"], "0x7");
        assert_eq!(json["transactions"], json!([]));
        assert!(json.get("withdrawals").is_none());
        assert!(json.get("blobGasUsed").is_none());

        let decoded: ExecutionPayload = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, ExecutionPayload::from_block(&block));
    }

    #[test]
    fn attributes_round_trip() {
        let attributes = PayloadAttributes::new(
            12,
            Hash256::repeat_byte(2),
            Address::repeat_byte(3),
            Some(vec![Withdrawal {
                index: 1,
                validator_index: 5,
                address: Address::repeat_byte(4),
                amount: 100,
            }]),
            None,
        );
        let json = JsonPayloadAttributes::from(attributes.clone());
        let value = serde_json::to_value(&json).unwrap();
        assert_eq!(value["withdrawals"][0]["validatorIndex"], "0x5");
        assert!(value.get("parentBeaconBlockRoot").is_none());
        assert_eq!(PayloadAttributes::from(json), attributes);
    }

    #[test]
    fn get_payload_response_requests() {
        let value = json!({
            "executionPayload": serde_json::to_value(ExecutionPayload::from_block(&Block::default())).unwrap(),
            "blockValue": "0x10",
            "executionRequests": ["0x01aabb"],
        });
        let response: GetPayloadResponse = serde_json::from_value(value).unwrap();
        assert_eq!(response.block_value, 16.into());
        assert_eq!(response.execution_requests, Some(vec![vec![1, 0xaa, 0xbb]]));
    }
}
