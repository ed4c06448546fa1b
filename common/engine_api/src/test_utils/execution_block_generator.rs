use crate::block_hash::{calculate_execution_block_hash, requests_hash};
use crate::json_structures::{
    BlobsBundle, GetPayloadResponse, JsonForkchoiceUpdatedV1Response, JsonPayloadStatusV1,
    JsonPayloadStatusV1Status,
};
use crate::{
    ExecutionBlock, ExecutionPayload, ForkConfig, ForkName, ForkchoiceState, Hash256,
    NewPayloadRequest, PayloadAttributes, PayloadId, PayloadStatusV1, PayloadStatusV1Status,
    Uint256,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use types::{empty_trie_root, Address, Bloom, Header, SignedTransaction};

pub const GAS_LIMIT: u64 = 30_000_000;
const BASE_FEE_PER_GAS: u64 = 7;

/// A PoS block together with the sidecar values its hash commits to.
#[derive(Clone, Debug, PartialEq)]
pub struct PoSBlock {
    pub payload: ExecutionPayload,
    pub parent_beacon_block_root: Option<Hash256>,
    pub execution_requests: Option<Vec<Vec<u8>>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PoWBlock {
    pub header: Header,
    pub total_difficulty: Uint256,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    PoW(PoWBlock),
    PoS(PoSBlock),
}

impl Block {
    pub fn block_number(&self) -> u64 {
        match self {
            Block::PoW(block) => block.header.number,
            Block::PoS(block) => block.payload.block_number,
        }
    }

    pub fn parent_hash(&self) -> Hash256 {
        match self {
            Block::PoW(block) => block.header.parent_hash,
            Block::PoS(block) => block.payload.parent_hash,
        }
    }

    pub fn block_hash(&self) -> Hash256 {
        match self {
            Block::PoW(block) => block.header.hash(),
            Block::PoS(block) => block.payload.block_hash,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Block::PoW(block) => block.header.timestamp,
            Block::PoS(block) => block.payload.timestamp,
        }
    }

    pub fn total_difficulty(&self) -> Option<Uint256> {
        match self {
            Block::PoW(block) => Some(block.total_difficulty),
            Block::PoS(_) => None,
        }
    }

    pub fn header(&self) -> Header {
        match self {
            Block::PoW(block) => block.header.clone(),
            Block::PoS(block) => block.payload.to_header(
                block.parent_beacon_block_root,
                block
                    .execution_requests
                    .as_deref()
                    .map(requests_hash),
            ),
        }
    }

    pub fn as_execution_block(&self, terminal_total_difficulty: Uint256) -> ExecutionBlock {
        ExecutionBlock {
            block_hash: self.block_hash(),
            block_number: self.block_number(),
            parent_hash: self.parent_hash(),
            total_difficulty: Some(
                self.total_difficulty()
                    .unwrap_or(terminal_total_difficulty),
            ),
            timestamp: self.timestamp(),
        }
    }

    /// The `eth_getBlockBy*` JSON of this block: the header fields plus `hash`,
    /// `totalDifficulty` and the transaction hashes.
    pub fn as_json(&self, terminal_total_difficulty: Uint256) -> Result<JsonValue, String> {
        let mut json = serde_json::to_value(self.header())
            .map_err(|e| format!("unable to serialize header: {:?}", e))?;
        let transactions = match self {
            Block::PoW(_) => vec![],
            Block::PoS(block) => block
                .payload
                .transactions
                .iter()
                .map(|tx| SignedTransaction::decode_2718(tx).map(|tx| tx.hash()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("stored transaction is invalid: {:?}", e))?,
        };
        if let Some(object) = json.as_object_mut() {
            object.insert("hash".into(), serde_json::json!(self.block_hash()));
            object.insert(
                "totalDifficulty".into(),
                serde_json::json!(self
                    .total_difficulty()
                    .unwrap_or(terminal_total_difficulty)),
            );
            object.insert("transactions".into(), serde_json::json!(transactions));
            object.insert("uncles".into(), serde_json::json!([]));
        }
        Ok(json)
    }
}

/// A payload built in response to `forkchoiceUpdated` with attributes, waiting for `getPayload`.
#[derive(Clone, Debug, PartialEq)]
struct BuiltPayload {
    block: PoSBlock,
    fork: ForkName,
}

/// An in-memory execution chain: a PoW prefix up to the terminal block followed by whatever
/// payloads the consensus side builds on top of it.
#[derive(Debug, Clone)]
pub struct ExecutionBlockGenerator {
    /*
     * Common database
     */
    head_block: Option<Block>,
    finalized_block_hash: Option<Hash256>,
    safe_block_hash: Option<Hash256>,
    blocks: HashMap<Hash256, Block>,
    /*
     * PoW block parameters
     */
    pub terminal_total_difficulty: Uint256,
    pub terminal_block_number: u64,
    /*
     * PoS block parameters
     */
    pending_payloads: HashMap<Hash256, PoSBlock>,
    next_payload_id: u64,
    payload_ids: HashMap<PayloadId, BuiltPayload>,
    /*
     * Transaction pool
     */
    pending_transactions: Vec<Vec<u8>>,
    nonces: HashMap<Address, u64>,
    /*
     * Post-merge fork triggers
     */
    pub fork_config: ForkConfig,
}

impl ExecutionBlockGenerator {
    pub fn new(
        terminal_total_difficulty: Uint256,
        terminal_block_number: u64,
        fork_config: ForkConfig,
    ) -> Result<Self, String> {
        let mut gen = Self {
            head_block: <_>::default(),
            finalized_block_hash: <_>::default(),
            safe_block_hash: <_>::default(),
            blocks: <_>::default(),
            terminal_total_difficulty,
            terminal_block_number,
            pending_payloads: <_>::default(),
            next_payload_id: 0,
            payload_ids: <_>::default(),
            pending_transactions: <_>::default(),
            nonces: <_>::default(),
            fork_config,
        };

        gen.insert_pow_block(0)?;

        Ok(gen)
    }

    pub fn latest_block(&self) -> Option<Block> {
        self.head_block.clone()
    }

    pub fn latest_execution_block(&self) -> Option<ExecutionBlock> {
        self.latest_block()
            .map(|block| block.as_execution_block(self.terminal_total_difficulty))
    }

    pub fn block_by_number(&self, number: u64) -> Option<Block> {
        // Walk back from the canonical head.
        let mut latest_block = self.latest_block()?;
        loop {
            let block_number = latest_block.block_number();
            if block_number < number {
                return None;
            }
            if block_number == number {
                return Some(latest_block);
            }
            latest_block = self.block_by_hash(latest_block.parent_hash())?;
        }
    }

    /// Resolves a block tag or hex number as accepted by `eth_getBlockByNumber`.
    pub fn block_by_tag(&self, tag: &str) -> Result<Option<Block>, String> {
        match tag {
            "latest" | "pending" => Ok(self.latest_block()),
            "earliest" => Ok(self.block_by_number(0)),
            "safe" => Ok(self.safe_block_hash.and_then(|h| self.block_by_hash(h))),
            "finalized" => Ok(self.finalized_block_hash.and_then(|h| self.block_by_hash(h))),
            number => {
                let number = u64::from_str_radix(number.trim_start_matches("0x"), 16)
                    .map_err(|e| format!("The tag {} is not supported: {:?}", number, e))?;
                Ok(self.block_by_number(number))
            }
        }
    }

    pub fn block_by_hash(&self, hash: Hash256) -> Option<Block> {
        self.blocks.get(&hash).cloned()
    }

    pub fn execution_block_by_hash(&self, hash: Hash256) -> Option<ExecutionBlock> {
        self.block_by_hash(hash)
            .map(|block| block.as_execution_block(self.terminal_total_difficulty))
    }

    pub fn move_to_block_prior_to_terminal_block(&mut self) -> Result<(), String> {
        let target_block = self
            .terminal_block_number
            .checked_sub(1)
            .ok_or("terminal pow block is 0")?;
        self.move_to_pow_block(target_block)
    }

    pub fn move_to_terminal_block(&mut self) -> Result<(), String> {
        self.move_to_pow_block(self.terminal_block_number)
    }

    pub fn move_to_pow_block(&mut self, target_block: u64) -> Result<(), String> {
        let next_block = self
            .latest_block()
            .map_or(0, |block| block.block_number() + 1);
        if target_block < next_block {
            return Err(format!(
                "cannot move back to pow block {} from {}",
                target_block, next_block
            ));
        }

        self.insert_pow_blocks(next_block..=target_block)
    }

    pub fn insert_pow_blocks(
        &mut self,
        block_numbers: impl Iterator<Item = u64>,
    ) -> Result<(), String> {
        for i in block_numbers {
            self.insert_pow_block(i)?;
        }

        Ok(())
    }

    pub fn insert_pow_block(&mut self, block_number: u64) -> Result<(), String> {
        if let Some(finalized_block_hash) = self.finalized_block_hash {
            return Err(format!(
                "terminal block {:?} has been finalized. PoW chain has stopped building",
                finalized_block_hash
            ));
        }
        let parent_hash = if block_number == 0 {
            Hash256::zero()
        } else if let Some(block) = self.block_by_number(block_number - 1) {
            block.block_hash()
        } else {
            return Err(format!(
                "parent with block number {} not found",
                block_number - 1
            ));
        };

        let block = generate_pow_block(
            self.terminal_total_difficulty,
            self.terminal_block_number,
            block_number,
            parent_hash,
        )?;

        let total_difficulty = block.total_difficulty;
        self.insert_block(Block::PoW(block.clone()))?;

        // Follow the heaviest chain while still in PoW.
        if self
            .head_block
            .as_ref()
            .and_then(|b| b.total_difficulty())
            .map_or(true, |head_td| total_difficulty >= head_td)
        {
            self.head_block = Some(Block::PoW(block));
        }
        Ok(())
    }

    pub fn insert_block(&mut self, block: Block) -> Result<Hash256, String> {
        if self.blocks.contains_key(&block.block_hash()) {
            return Err(format!("{:?} is already known", block.block_hash()));
        } else if block.parent_hash() != Hash256::zero()
            && !self.blocks.contains_key(&block.parent_hash())
        {
            return Err(format!("parent block {:?} is unknown", block.parent_hash()));
        }

        let block_hash = block.block_hash();
        self.blocks.insert(block_hash, block);

        Ok(block_hash)
    }

    /// Accepts a raw transaction into the pool and returns its hash. The transaction is included
    /// in the next built payload.
    pub fn add_transaction(&mut self, encoded: Vec<u8>) -> Result<Hash256, String> {
        let tx = SignedTransaction::decode_2718(&encoded)
            .map_err(|e| format!("invalid transaction: {:?}", e))?;
        let sender = tx
            .sender()
            .map_err(|e| format!("invalid transaction signature: {:?}", e))?;
        let expected_nonce = self.transaction_count(sender);
        if tx.transaction.nonce() != expected_nonce {
            return Err(format!(
                "nonce mismatch: expected {}, got {}",
                expected_nonce,
                tx.transaction.nonce()
            ));
        }
        self.nonces.insert(sender, expected_nonce + 1);
        self.pending_transactions.push(encoded);
        Ok(tx.hash())
    }

    pub fn transaction_count(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    /// The payload built under `id` and the fork it was built for.
    pub fn get_payload(&self, id: &PayloadId) -> Option<(ForkName, GetPayloadResponse)> {
        let built = self.payload_ids.get(id)?;
        let fork = built.fork;

        Some((
            fork,
            GetPayloadResponse {
                execution_payload: built.block.payload.clone(),
                block_value: Uint256::zero(),
                blobs_bundle: fork.has_blobs().then(BlobsBundle::default),
                should_override_builder: fork.has_blobs().then_some(false),
                execution_requests: built.block.execution_requests.clone(),
            },
        ))
    }

    pub fn new_payload(&mut self, request: NewPayloadRequest) -> PayloadStatusV1 {
        let payload = &request.execution_payload;
        let computed = calculate_execution_block_hash(
            payload,
            request.parent_beacon_block_root,
            request.execution_requests.as_deref(),
        );
        if computed != payload.block_hash {
            return PayloadStatusV1 {
                status: PayloadStatusV1Status::InvalidBlockHash,
                latest_valid_hash: None,
                validation_error: Some(format!(
                    "block hash mismatch: computed {:?}",
                    computed
                )),
            };
        }

        let parent = if let Some(parent) = self.blocks.get(&payload.parent_hash) {
            parent
        } else {
            return PayloadStatusV1 {
                status: PayloadStatusV1Status::Syncing,
                latest_valid_hash: None,
                validation_error: None,
            };
        };

        if parent
            .total_difficulty()
            .map_or(false, |td| td < self.terminal_total_difficulty)
        {
            return PayloadStatusV1 {
                status: PayloadStatusV1Status::Invalid,
                latest_valid_hash: Some(Hash256::zero()),
                validation_error: Some("invalid terminal block".to_string()),
            };
        }

        if payload.block_number != parent.block_number() + 1 {
            return PayloadStatusV1 {
                status: PayloadStatusV1Status::Invalid,
                latest_valid_hash: Some(parent.block_hash()),
                validation_error: Some("invalid block number".to_string()),
            };
        }

        if payload.timestamp <= parent.timestamp() {
            return PayloadStatusV1 {
                status: PayloadStatusV1Status::Invalid,
                latest_valid_hash: Some(parent.block_hash()),
                validation_error: Some("invalid timestamp".to_string()),
            };
        }

        let valid_hash = payload.block_hash;
        self.pending_payloads.insert(
            valid_hash,
            PoSBlock {
                payload: request.execution_payload,
                parent_beacon_block_root: request.parent_beacon_block_root,
                execution_requests: request.execution_requests,
            },
        );

        PayloadStatusV1 {
            status: PayloadStatusV1Status::Valid,
            latest_valid_hash: Some(valid_hash),
            validation_error: None,
        }
    }

    // Expects `payload_attributes` to already be validated against the fork active at its
    // timestamp.
    pub fn forkchoice_updated(
        &mut self,
        forkchoice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<JsonForkchoiceUpdatedV1Response, String> {
        if let Some(block) = self
            .pending_payloads
            .remove(&forkchoice_state.head_block_hash)
        {
            self.insert_block(Block::PoS(block))?;
        }

        let unknown_head_block_hash = !self.blocks.contains_key(&forkchoice_state.head_block_hash);
        let unknown_safe_block_hash = forkchoice_state.safe_block_hash != Hash256::zero()
            && !self.blocks.contains_key(&forkchoice_state.safe_block_hash);
        let unknown_finalized_block_hash = forkchoice_state.finalized_block_hash
            != Hash256::zero()
            && !self
                .blocks
                .contains_key(&forkchoice_state.finalized_block_hash);

        if unknown_head_block_hash || unknown_safe_block_hash || unknown_finalized_block_hash {
            return Ok(JsonForkchoiceUpdatedV1Response {
                payload_status: JsonPayloadStatusV1 {
                    status: JsonPayloadStatusV1Status::Syncing,
                    latest_valid_hash: None,
                    validation_error: None,
                },
                payload_id: None,
            });
        }

        let id = match payload_attributes {
            None => None,
            Some(attributes) => {
                if !self.blocks.values().any(|block| {
                    block
                        .total_difficulty()
                        .map_or(false, |td| td >= self.terminal_total_difficulty)
                }) {
                    return Err("refusing to create payload id before terminal block".to_string());
                }

                let parent = self
                    .blocks
                    .get(&forkchoice_state.head_block_hash)
                    .ok_or_else(|| {
                        format!(
                            "unknown parent block {:?}",
                            forkchoice_state.head_block_hash
                        )
                    })?;
                let parent_state_root = parent.header().state_root;
                let parent_number = parent.block_number();

                let fork = self.fork_config.fork_at_timestamp(attributes.timestamp());
                let id = payload_id_from_u64(self.next_payload_id);
                self.next_payload_id += 1;

                let mut execution_payload = ExecutionPayload {
                    parent_hash: forkchoice_state.head_block_hash,
                    fee_recipient: attributes.suggested_fee_recipient(),
                    state_root: parent_state_root,
                    receipts_root: empty_trie_root(),
                    logs_bloom: Bloom::zero(),
                    prev_randao: attributes.prev_randao(),
                    block_number: parent_number + 1,
                    gas_limit: GAS_LIMIT,
                    gas_used: 0,
                    timestamp: attributes.timestamp(),
                    extra_data: "block gen was here".as_bytes().to_vec(),
                    base_fee_per_gas: Uint256::from(BASE_FEE_PER_GAS),
                    block_hash: Hash256::zero(),
                    transactions: std::mem::take(&mut self.pending_transactions),
                    withdrawals: fork.has_withdrawals().then(|| {
                        attributes
                            .withdrawals_opt()
                            .cloned()
                            .unwrap_or_default()
                            .into_iter()
                            .map(Into::into)
                            .collect()
                    }),
                    blob_gas_used: fork.has_blobs().then_some(0),
                    excess_blob_gas: fork.has_blobs().then_some(0),
                };
                let parent_beacon_block_root = attributes.parent_beacon_block_root_opt();
                let execution_requests = fork.has_requests().then(Vec::new);

                execution_payload.block_hash = calculate_execution_block_hash(
                    &execution_payload,
                    parent_beacon_block_root,
                    execution_requests.as_deref(),
                );

                self.payload_ids.insert(
                    id,
                    BuiltPayload {
                        block: PoSBlock {
                            payload: execution_payload,
                            parent_beacon_block_root,
                            execution_requests,
                        },
                        fork,
                    },
                );

                Some(id)
            }
        };

        self.head_block = self
            .blocks
            .get(&forkchoice_state.head_block_hash)
            .cloned();

        if forkchoice_state.safe_block_hash != Hash256::zero() {
            self.safe_block_hash = Some(forkchoice_state.safe_block_hash);
        }
        if forkchoice_state.finalized_block_hash != Hash256::zero() {
            self.finalized_block_hash = Some(forkchoice_state.finalized_block_hash);
        }

        Ok(JsonForkchoiceUpdatedV1Response {
            payload_status: JsonPayloadStatusV1 {
                status: JsonPayloadStatusV1Status::Valid,
                latest_valid_hash: Some(forkchoice_state.head_block_hash),
                validation_error: None,
            },
            payload_id: id.map(Into::into),
        })
    }
}

fn payload_id_from_u64(n: u64) -> PayloadId {
    n.to_le_bytes()
}

pub fn generate_pow_block(
    terminal_total_difficulty: Uint256,
    terminal_block_number: u64,
    block_number: u64,
    parent_hash: Hash256,
) -> Result<PoWBlock, String> {
    if block_number > terminal_block_number {
        return Err(format!(
            "{} is beyond terminal pow block {}",
            block_number, terminal_block_number
        ));
    }

    let total_difficulty_at = |number: u64| -> Result<Uint256, String> {
        if number == terminal_block_number {
            return Ok(terminal_total_difficulty);
        }
        let increment = terminal_total_difficulty
            .checked_div(Uint256::from(terminal_block_number))
            .ok_or("terminal block number must be non-zero")?;
        increment
            .checked_mul(Uint256::from(number))
            .ok_or_else(|| "overflow computing total difficulty".to_string())
    };

    let total_difficulty = total_difficulty_at(block_number)?;
    let difficulty = match block_number.checked_sub(1) {
        Some(parent_number) => total_difficulty - total_difficulty_at(parent_number)?,
        None => total_difficulty,
    };

    let header = Header {
        parent_hash,
        difficulty,
        number: block_number,
        gas_limit: GAS_LIMIT,
        timestamp: block_number,
        extra_data: "pow block gen was here".as_bytes().to_vec(),
        ..Header::default()
    };

    Ok(PoWBlock {
        header,
        total_difficulty,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Address;

    const TERMINAL_DIFFICULTY: u64 = 10;
    const TERMINAL_BLOCK: u64 = 10;
    const DIFFICULTY_INCREMENT: u64 = 1;

    fn generator(fork_config: ForkConfig) -> ExecutionBlockGenerator {
        ExecutionBlockGenerator::new(TERMINAL_DIFFICULTY.into(), TERMINAL_BLOCK, fork_config)
            .unwrap()
    }

    #[test]
    fn pow_chain_only() {
        let mut generator = generator(ForkConfig::default());

        for i in 0..=TERMINAL_BLOCK {
            if i > 0 {
                generator.insert_pow_block(i).unwrap();
            }

            let block = generator.latest_block().unwrap();
            assert_eq!(block.block_number(), i);

            let expected_parent = i
                .checked_sub(1)
                .map(|i| generator.block_by_number(i).unwrap().block_hash())
                .unwrap_or_else(Hash256::zero);
            assert_eq!(block.parent_hash(), expected_parent);

            assert_eq!(
                block.total_difficulty().unwrap(),
                (i * DIFFICULTY_INCREMENT).into()
            );

            assert_eq!(generator.block_by_hash(block.block_hash()).unwrap(), block);
            assert_eq!(generator.block_by_number(i).unwrap(), block);

            if let Some(prev_i) = i.checked_sub(1) {
                assert_eq!(
                    generator.block_by_number(prev_i).unwrap(),
                    generator.block_by_hash(block.parent_hash()).unwrap()
                );
            }

            assert!(generator.block_by_number(i + 1).is_none());
        }

        assert!(generator.insert_pow_block(TERMINAL_BLOCK + 1).is_err());
    }

    fn produce_block(
        generator: &mut ExecutionBlockGenerator,
        fork: ForkName,
        timestamp: u64,
    ) -> GetPayloadResponse {
        let head = generator.latest_block().unwrap().block_hash();
        let state = ForkchoiceState {
            head_block_hash: head,
            safe_block_hash: head,
            finalized_block_hash: Hash256::zero(),
        };
        let attributes = PayloadAttributes::new(
            timestamp,
            Hash256::repeat_byte(9),
            Address::repeat_byte(1),
            fork.has_withdrawals().then(Vec::new),
            fork.has_blobs().then(|| Hash256::repeat_byte(2)),
        );
        let response = generator
            .forkchoice_updated(state, Some(attributes))
            .unwrap();
        let id: PayloadId = response.payload_id.unwrap().into();
        let (built_for, response) = generator.get_payload(&id).unwrap();
        assert_eq!(built_for, fork);
        response
    }

    #[test]
    fn payload_lifecycle() {
        let mut generator = generator(ForkConfig {
            shanghai_time: Some(0),
            cancun_time: Some(0),
            prague_time: Some(0),
        });
        generator.move_to_terminal_block().unwrap();

        let response = produce_block(&mut generator, ForkName::Prague, 100);
        assert_eq!(response.execution_requests, Some(vec![]));
        let payload = response.execution_payload;
        assert_eq!(payload.block_number, TERMINAL_BLOCK + 1);

        let request = NewPayloadRequest::from_payload(
            payload.clone(),
            Some(Hash256::repeat_byte(2)),
            Some(vec![]),
        )
        .unwrap();
        let status = generator.new_payload(request);
        assert_eq!(status.status, PayloadStatusV1Status::Valid);

        let state = ForkchoiceState {
            head_block_hash: payload.block_hash,
            safe_block_hash: payload.block_hash,
            finalized_block_hash: Hash256::zero(),
        };
        generator.forkchoice_updated(state, None).unwrap();
        assert_eq!(
            generator.latest_block().unwrap().block_hash(),
            payload.block_hash
        );
        assert_eq!(
            generator.latest_block().unwrap().header().hash(),
            payload.block_hash
        );
    }

    #[test]
    fn tampered_payload_has_invalid_hash() {
        let mut generator = generator(ForkConfig::default());
        generator.move_to_terminal_block().unwrap();
        let mut payload = produce_block(&mut generator, ForkName::Paris, 100).execution_payload;
        payload.gas_used += 1;
        let status = generator.new_payload(NewPayloadRequest::from_payload(payload, None, None).unwrap());
        assert_eq!(status.status, PayloadStatusV1Status::InvalidBlockHash);
    }

    #[test]
    fn payload_on_pre_terminal_block_is_invalid() {
        let mut generator = generator(ForkConfig::default());
        generator.move_to_block_prior_to_terminal_block().unwrap();
        let parent = generator.latest_block().unwrap();

        let mut payload = ExecutionPayload::from_block(&types::Block::default());
        payload.parent_hash = parent.block_hash();
        payload.block_number = parent.block_number() + 1;
        payload.timestamp = parent.timestamp() + 1;
        payload.block_hash = calculate_execution_block_hash(&payload, None, None);

        let status = generator.new_payload(NewPayloadRequest::from_payload(payload, None, None).unwrap());
        assert_eq!(status.status, PayloadStatusV1Status::Invalid);
        assert_eq!(status.latest_valid_hash, Some(Hash256::zero()));
    }

    #[test]
    fn unknown_head_is_syncing() {
        let mut generator = generator(ForkConfig::default());
        let response = generator
            .forkchoice_updated(
                ForkchoiceState {
                    head_block_hash: Hash256::repeat_byte(0xee),
                    ..ForkchoiceState::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(
            response.payload_status.status,
            JsonPayloadStatusV1Status::Syncing
        );
    }
}
