use crate::client::EngineClient;
use crate::config::ClMockConfig;
use crate::Error;
use async_trait::async_trait;
use engine_api::{
    BlobsBundle, ForkName, ForkchoiceState, GetPayloadResponse, NewPayloadRequest,
    PayloadAttributes, PayloadId, PayloadStatusV1, PayloadStatusV1Status,
};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use slog::{debug, info, warn, Logger};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;
use types::{empty_ommers_hash, Address, Hash256, Hash64, Header, Uint256, Withdrawal};

const WITHDRAWALS_PER_PAYLOAD: u64 = 10;
/// Gwei credited by each generated withdrawal.
const WITHDRAWAL_AMOUNT: u64 = 100;
const MAX_EXTRA_DATA_BYTES: usize = 32;

/// Hooks into the steps of a block production round. Every hook runs after the step it is named
/// after and may inspect or modify the CL mock before the round continues. An error aborts the
/// round.
#[async_trait]
pub trait BlockProcessCallbacks: Send {
    async fn on_payload_producer_selected(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
        Ok(())
    }

    async fn on_payload_attributes_generated(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
        Ok(())
    }

    async fn on_request_next_payload(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
        Ok(())
    }

    async fn on_get_payload(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
        Ok(())
    }

    async fn on_new_payload_broadcast(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
        Ok(())
    }

    async fn on_forkchoice_broadcast(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
        Ok(())
    }

    async fn on_safe_block_change(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
        Ok(())
    }

    async fn on_finalized_block_change(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
        Ok(())
    }
}

impl BlockProcessCallbacks for () {}

/// A payload returned by `getPayload`, ready to be sent with `newPayload`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPayload {
    pub request: NewPayloadRequest,
    pub block_value: Uint256,
    pub blobs_bundle: Option<BlobsBundle>,
    pub should_override_builder: Option<bool>,
}

/// What one client answered to the latest `newPayload` broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayloadOutcome {
    pub client: String,
    pub result: Result<PayloadStatusV1, String>,
}

pub struct ClMock {
    config: ClMockConfig,
    clients: Vec<EngineClient>,
    log: Logger,
    rng: StdRng,

    ttd_block_client: Option<String>,
    next_block_producer: Option<usize>,
    next_payload_id: Option<PayloadId>,
    next_withdrawals: Option<Vec<Withdrawal>>,
    next_fee_recipient: Address,
    expected_invalid: HashSet<String>,

    latest_header: Option<Header>,
    latest_head_number: u64,
    latest_forkchoice: ForkchoiceState,
    latest_payload_attributes: Option<PayloadAttributes>,
    latest_payload_built: Option<BuiltPayload>,
    latest_executed_payload: Option<NewPayloadRequest>,
    latest_new_payload_outcomes: Vec<NewPayloadOutcome>,
    latest_finalized_number: Option<u64>,
    first_pos_block_number: Option<u64>,
    verifying_clients: BTreeSet<String>,

    header_history: BTreeMap<u64, Header>,
    payload_id_history: HashMap<String, HashSet<PayloadId>>,
    prev_randao_history: HashMap<u64, Hash256>,
    executed_payload_history: BTreeMap<u64, NewPayloadRequest>,
    head_hash_history: Vec<Hash256>,
}

/// The parent beacon block root attached to payloads from Cancun on.
pub fn timestamp_to_beacon_root(timestamp: u64) -> Hash256 {
    Hash256::from_slice(&Sha256::digest(&timestamp.to_be_bytes()))
}

impl ClMock {
    pub fn new(config: ClMockConfig, log: Logger) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let next_fee_recipient = config.fee_recipient;
        Self {
            config,
            clients: vec![],
            log,
            rng,
            ttd_block_client: None,
            next_block_producer: None,
            next_payload_id: None,
            next_withdrawals: None,
            next_fee_recipient,
            expected_invalid: HashSet::new(),
            latest_header: None,
            latest_head_number: 0,
            latest_forkchoice: ForkchoiceState::default(),
            latest_payload_attributes: None,
            latest_payload_built: None,
            latest_executed_payload: None,
            latest_new_payload_outcomes: vec![],
            latest_finalized_number: None,
            first_pos_block_number: None,
            verifying_clients: BTreeSet::new(),
            header_history: BTreeMap::new(),
            payload_id_history: HashMap::new(),
            prev_randao_history: HashMap::new(),
            executed_payload_history: BTreeMap::new(),
            head_hash_history: vec![],
        }
    }

    pub fn config(&self) -> &ClMockConfig {
        &self.config
    }

    pub fn add_client(&mut self, client: EngineClient) {
        info!(self.log, "Adding engine client"; "client" => &client.id);
        self.clients.push(client);
    }

    pub fn remove_client(&mut self, id: &str) -> Result<EngineClient, Error> {
        let index = self
            .clients
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::UnknownClient(id.to_string()))?;
        self.payload_id_history.remove(id);
        self.next_block_producer = None;
        Ok(self.clients.remove(index))
    }

    pub fn clients(&self) -> &[EngineClient] {
        &self.clients
    }

    pub fn client(&self, id: &str) -> Result<&EngineClient, Error> {
        self.clients
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::UnknownClient(id.to_string()))
    }

    /// Waits until `id` reaches its terminal total difficulty, bounded by the round deadline.
    pub async fn wait_for_ttd(&self, id: &str) -> Result<(), Error> {
        self.client(id)?
            .wait_for_ttd(
                self.config.ttd_check_period,
                self.config.round_deadline,
                &self.log,
            )
            .await
    }

    /// Takes the latest block of `id` as the head to build on and forgets the PoS history.
    pub async fn init_chain(&mut self, id: &str) -> Result<(), Error> {
        let header = self.client(id)?.latest_header().await?;
        let hash = header.hash();
        info!(
            self.log,
            "Initializing chain";
            "client" => id,
            "number" => header.number,
            "hash" => ?hash,
        );

        self.ttd_block_client = Some(id.to_string());
        self.latest_head_number = header.number;
        self.latest_forkchoice = ForkchoiceState {
            head_block_hash: hash,
            ..ForkchoiceState::default()
        };
        self.head_hash_history.clear();
        self.first_pos_block_number = None;
        self.latest_finalized_number = None;
        self.header_history.insert(header.number, header.clone());
        self.latest_header = Some(header);
        Ok(())
    }

    /// Treats an `INVALID` answer from `id` to the next `newPayload` broadcast as the expected
    /// outcome. Such a client is also never picked as the producer of that block.
    pub fn expect_invalid_payload(&mut self, id: impl Into<String>) {
        self.expected_invalid.insert(id.into());
    }

    pub fn set_next_fee_recipient(&mut self, fee_recipient: Address) {
        self.next_fee_recipient = fee_recipient;
    }

    /// Withdrawals for the next payload, instead of the generated ones.
    pub fn set_next_withdrawals(&mut self, withdrawals: Vec<Withdrawal>) {
        self.next_withdrawals = Some(withdrawals);
    }

    pub fn ttd_block_client(&self) -> Option<&str> {
        self.ttd_block_client.as_deref()
    }

    pub fn next_block_producer(&self) -> Option<&EngineClient> {
        self.next_block_producer.and_then(|i| self.clients.get(i))
    }

    pub fn next_payload_id(&self) -> Option<PayloadId> {
        self.next_payload_id
    }

    pub fn latest_header(&self) -> Result<&Header, Error> {
        self.latest_header.as_ref().ok_or(Error::NotInitialized)
    }

    pub fn latest_head_number(&self) -> u64 {
        self.latest_head_number
    }

    pub fn latest_forkchoice(&self) -> ForkchoiceState {
        self.latest_forkchoice
    }

    pub fn latest_payload_attributes(&self) -> Option<&PayloadAttributes> {
        self.latest_payload_attributes.as_ref()
    }

    pub fn latest_payload_built(&self) -> Option<&BuiltPayload> {
        self.latest_payload_built.as_ref()
    }

    /// Lets a callback replace the payload before it is broadcast.
    pub fn latest_payload_built_mut(&mut self) -> Option<&mut BuiltPayload> {
        self.latest_payload_built.as_mut()
    }

    pub fn latest_executed_payload(&self) -> Option<&NewPayloadRequest> {
        self.latest_executed_payload.as_ref()
    }

    pub fn latest_new_payload_outcomes(&self) -> &[NewPayloadOutcome] {
        &self.latest_new_payload_outcomes
    }

    pub fn first_pos_block_number(&self) -> Option<u64> {
        self.first_pos_block_number
    }

    /// Clients that accepted the latest payload.
    pub fn verifying_clients(&self) -> impl Iterator<Item = &str> {
        self.verifying_clients.iter().map(String::as_str)
    }

    pub fn header(&self, number: u64) -> Option<&Header> {
        self.header_history.get(&number)
    }

    pub fn prev_randao(&self, number: u64) -> Option<Hash256> {
        self.prev_randao_history.get(&number).copied()
    }

    pub fn executed_payload(&self, number: u64) -> Option<&NewPayloadRequest> {
        self.executed_payload_history.get(&number)
    }

    pub fn head_hash_history(&self) -> &[Hash256] {
        &self.head_hash_history
    }

    fn fork_at(&self, timestamp: u64) -> ForkName {
        self.config.fork_config.fork_at_timestamp(timestamp)
    }

    fn next_timestamp(&self) -> Result<u64, Error> {
        match (
            self.first_pos_block_number,
            self.config.transition_payload_timestamp,
        ) {
            (None, Some(timestamp)) => Ok(timestamp),
            _ => Ok(self.latest_header()?.timestamp + self.config.block_timestamp_increment),
        }
    }

    fn make_next_withdrawals(&self) -> Vec<Withdrawal> {
        let last_index = self
            .latest_payload_built
            .as_ref()
            .and_then(|built| built.request.execution_payload.withdrawals.as_ref())
            .and_then(|ws| ws.iter().map(|w| w.index).max())
            .unwrap_or(0);

        (0..WITHDRAWALS_PER_PAYLOAD)
            .map(|i| {
                let mut address = Address::zero();
                address.0[0] = i as u8;
                Withdrawal {
                    index: last_index + i + 1,
                    validator_index: i,
                    address,
                    amount: WITHDRAWAL_AMOUNT,
                }
            })
            .collect()
    }

    /// Picks the first client, round-robin from the latest head number, whose head is the CL
    /// mock's latest header.
    async fn pick_next_payload_producer(&mut self) -> Result<(), Error> {
        let latest = self.latest_header()?;
        let (latest_hash, latest_number) = (latest.hash(), latest.number);
        let n = self.clients.len() as u64;
        if n == 0 {
            return Err(Error::NoClients);
        }

        for i in 0..n {
            let index = ((self.latest_head_number + i) % n) as usize;
            let client = &self.clients[index];
            if self.expected_invalid.contains(&client.id) {
                continue;
            }
            let head = client.latest_header().await?;
            if head.hash() == latest_hash && head.number == latest_number {
                debug!(
                    self.log,
                    "Selected payload producer";
                    "client" => &client.id,
                    "number" => latest_number + 1,
                );
                self.next_block_producer = Some(index);
                return Ok(());
            }
            debug!(
                self.log,
                "Client is not on the latest block";
                "client" => &client.id,
                "head" => ?head.hash(),
            );
        }
        Err(Error::NoProducer {
            block: latest_number + 1,
        })
    }

    fn generate_payload_attributes(&mut self) -> Result<(), Error> {
        let number = self.latest_header()?.number + 1;
        let timestamp = self.next_timestamp()?;
        let fork = self.fork_at(timestamp);
        let prev_randao = Hash256::from(self.rng.gen::<[u8; 32]>());

        let withdrawals = fork
            .has_withdrawals()
            .then(|| self.next_withdrawals.clone().unwrap_or_default());
        let parent_beacon_block_root = fork
            .has_blobs()
            .then(|| timestamp_to_beacon_root(timestamp));

        self.prev_randao_history.insert(number, prev_randao);
        self.latest_payload_attributes = Some(PayloadAttributes::new(
            timestamp,
            prev_randao,
            self.next_fee_recipient,
            withdrawals,
            parent_beacon_block_root,
        ));
        Ok(())
    }

    fn producer(&self) -> Result<&EngineClient, Error> {
        self.next_block_producer
            .and_then(|i| self.clients.get(i))
            .ok_or(Error::NotInitialized)
    }

    async fn request_next_payload(&mut self) -> Result<(), Error> {
        let attributes = self
            .latest_payload_attributes
            .clone()
            .ok_or(Error::NotInitialized)?;
        let block = self.latest_header()?.number + 1;
        let fork = self.fork_at(attributes.timestamp());
        let method = fork.forkchoice_updated_method();
        let forkchoice = self.latest_forkchoice;

        let producer = self.producer()?;
        let client_id = producer.id.clone();
        let response = producer
            .api
            .forkchoice_updated(fork, forkchoice, Some(attributes))
            .await
            .map_err(|e| Error::engine_api(&client_id, method, e))?;

        let status = &response.payload_status;
        if status.status != PayloadStatusV1Status::Valid
            || status.latest_valid_hash != Some(forkchoice.head_block_hash)
        {
            return Err(Error::unexpected_status(&client_id, method, block, status));
        }
        let payload_id = response.payload_id.ok_or_else(|| Error::MissingPayloadId {
            client: client_id.clone(),
            block,
        })?;
        if !self
            .payload_id_history
            .entry(client_id.clone())
            .or_default()
            .insert(payload_id)
        {
            return Err(Error::ReusedPayloadId {
                client: client_id,
                payload_id,
            });
        }

        debug!(
            self.log,
            "Requested payload";
            "client" => client_id,
            "payload_id" => ?payload_id,
            "method" => method,
        );
        self.next_payload_id = Some(payload_id);
        Ok(())
    }

    async fn get_next_payload(&mut self) -> Result<(), Error> {
        let attributes = self
            .latest_payload_attributes
            .clone()
            .ok_or(Error::NotInitialized)?;
        let payload_id = self.next_payload_id.ok_or(Error::NotInitialized)?;
        let fork = self.fork_at(attributes.timestamp());
        let method = fork.get_payload_method();

        let producer = self.producer()?;
        let client_id = producer.id.clone();
        let GetPayloadResponse {
            execution_payload,
            block_value,
            blobs_bundle,
            should_override_builder,
            execution_requests,
        } = producer
            .api
            .get_payload(fork, payload_id)
            .await
            .map_err(|e| Error::engine_api(&client_id, method, e))?;

        let latest = self.latest_header()?;
        let checks = [
            (
                "timestamp",
                attributes.timestamp().to_string(),
                execution_payload.timestamp.to_string(),
            ),
            (
                "fee_recipient",
                format!("{:?}", attributes.suggested_fee_recipient()),
                format!("{:?}", execution_payload.fee_recipient),
            ),
            (
                "prev_randao",
                format!("{:?}", attributes.prev_randao()),
                format!("{:?}", execution_payload.prev_randao),
            ),
            (
                "parent_hash",
                format!("{:?}", latest.hash()),
                format!("{:?}", execution_payload.parent_hash),
            ),
            (
                "block_number",
                (latest.number + 1).to_string(),
                execution_payload.block_number.to_string(),
            ),
        ];
        if let Some((field, expected, got)) = checks.into_iter().find(|(_, e, g)| e != g) {
            return Err(Error::IncorrectPayload {
                client: client_id,
                field,
                expected,
                got,
            });
        }
        if fork.has_blobs() && blobs_bundle.is_none() {
            return Err(Error::MissingBlobsBundle {
                client: client_id,
                block: execution_payload.block_number,
            });
        }

        let execution_requests = if fork.has_requests() {
            Some(execution_requests.unwrap_or_default())
        } else {
            None
        };
        let request = NewPayloadRequest::from_payload(
            execution_payload,
            attributes.parent_beacon_block_root_opt(),
            execution_requests,
        )
        .map_err(|e| Error::engine_api(&client_id, method, e))?;

        debug!(
            self.log,
            "Got payload";
            "client" => client_id,
            "number" => request.block_number(),
            "hash" => ?request.block_hash(),
        );
        self.latest_payload_built = Some(BuiltPayload {
            request,
            block_value,
            blobs_bundle,
            should_override_builder,
        });
        Ok(())
    }

    async fn broadcast_next_new_payload(&mut self) -> Result<(), Error> {
        let request = self
            .latest_payload_built
            .as_ref()
            .ok_or(Error::NotInitialized)?
            .request
            .clone();
        let fork = self.fork_at(request.execution_payload.timestamp);
        let method = fork.new_payload_method();
        let (block, hash) = (request.block_number(), request.block_hash());

        let retries = self.config.syncing_retries;
        let delay = self.config.syncing_retry_delay;
        let results = join_all(
            self.clients
                .iter()
                .map(|client| new_payload_with_retries(client, fork, &request, retries, delay)),
        )
        .await;

        self.latest_new_payload_outcomes.clear();
        for (client, result) in self.clients.iter_mut().zip(results) {
            let result = match result {
                Ok(status) => {
                    client.latest_payload_status = Some(status.clone());
                    Ok(status)
                }
                Err(e) if self.expected_invalid.contains(&client.id) => {
                    warn!(
                        self.log,
                        "newPayload failed";
                        "client" => &client.id,
                        "method" => method,
                        "error" => ?e,
                    );
                    Err(format!("{:?}", e))
                }
                Err(e) => return Err(Error::engine_api(&client.id, method, e)),
            };
            self.latest_new_payload_outcomes.push(NewPayloadOutcome {
                client: client.id.clone(),
                result,
            });
        }

        let mut validations = 0;
        self.verifying_clients.clear();
        for outcome in &self.latest_new_payload_outcomes {
            let status = match &outcome.result {
                Ok(status) => status,
                Err(_) => continue,
            };
            match status.status {
                PayloadStatusV1Status::Valid => {
                    if status.latest_valid_hash != Some(hash) {
                        return Err(Error::unexpected_status(
                            &outcome.client,
                            method,
                            block,
                            status,
                        ));
                    }
                    validations += 1;
                    self.verifying_clients.insert(outcome.client.clone());
                }
                PayloadStatusV1Status::Accepted => {
                    if status.latest_valid_hash.map_or(false, |h| !h.is_zero()) {
                        return Err(Error::unexpected_status(
                            &outcome.client,
                            method,
                            block,
                            status,
                        ));
                    }
                    self.verifying_clients.insert(outcome.client.clone());
                }
                PayloadStatusV1Status::Invalid | PayloadStatusV1Status::InvalidBlockHash => {
                    if !self.expected_invalid.contains(&outcome.client) {
                        return Err(Error::unexpected_status(
                            &outcome.client,
                            method,
                            block,
                            status,
                        ));
                    }
                    info!(
                        self.log,
                        "Client rejected payload as expected";
                        "client" => &outcome.client,
                        "latest_valid_hash" => ?status.latest_valid_hash,
                        "validation_error" => ?status.validation_error,
                    );
                }
                PayloadStatusV1Status::Syncing => {
                    info!(
                        self.log,
                        "Client is syncing";
                        "client" => &outcome.client,
                        "number" => block,
                    );
                }
            }
        }

        if validations == 0 {
            return Err(Error::NoValidations { block });
        }
        self.executed_payload_history.insert(block, request.clone());
        self.latest_executed_payload = Some(request);
        Ok(())
    }

    /// Makes the latest built payload the head and derives safe and finalized from the head
    /// history.
    fn advance_forkchoice(&mut self) -> Result<(), Error> {
        let request = &self
            .latest_payload_built
            .as_ref()
            .ok_or(Error::NotInitialized)?
            .request;
        let (number, head) = (request.block_number(), request.block_hash());

        self.head_hash_history.push(head);
        let history = &self.head_hash_history;
        let lagging = |slots: usize| {
            (history.len() > slots)
                .then(|| history[history.len() - slots - 1])
                .unwrap_or_else(Hash256::zero)
        };
        self.latest_forkchoice = ForkchoiceState {
            head_block_hash: head,
            safe_block_hash: lagging(self.config.slots_to_safe),
            finalized_block_hash: lagging(self.config.slots_to_finalized),
        };

        if !self.latest_forkchoice.finalized_block_hash.is_zero() {
            let finalized = number.saturating_sub(self.config.slots_to_finalized as u64);
            if let Some(previous) = self.latest_finalized_number {
                if finalized < previous {
                    return Err(Error::FinalityRegression {
                        previous,
                        new: finalized,
                    });
                }
            }
            self.latest_finalized_number = Some(finalized);
        }
        Ok(())
    }

    async fn broadcast_latest_forkchoice(&mut self) -> Result<(), Error> {
        let timestamp = self
            .latest_executed_payload
            .as_ref()
            .ok_or(Error::NotInitialized)?
            .execution_payload
            .timestamp;
        let fork = self.fork_at(timestamp);
        let method = fork.forkchoice_updated_method();
        let forkchoice = self.latest_forkchoice;
        let head = forkchoice.head_block_hash;
        let block = self.latest_header()?.number + 1;

        let optimistic = self.config.optimistic_forkchoice;
        let targets: Vec<&EngineClient> = self
            .clients
            .iter()
            .filter(|c| {
                optimistic
                    || c.latest_payload_status
                        .as_ref()
                        .map_or(false, |s| s.status == PayloadStatusV1Status::Valid)
            })
            .collect();
        let results = join_all(
            targets
                .iter()
                .map(|client| client.api.forkchoice_updated(fork, forkchoice, None)),
        )
        .await;

        for (client, result) in targets.iter().zip(results) {
            let response = match result {
                Ok(response) => response,
                Err(e) if self.expected_invalid.contains(&client.id) => {
                    warn!(
                        self.log,
                        "forkchoiceUpdated failed";
                        "client" => &client.id,
                        "method" => method,
                        "error" => ?e,
                    );
                    continue;
                }
                Err(e) => return Err(Error::engine_api(&client.id, method, e)),
            };
            let status = &response.payload_status;
            if status.status != PayloadStatusV1Status::Valid {
                info!(
                    self.log,
                    "Client did not accept forkchoice";
                    "client" => &client.id,
                    "status" => ?status.status,
                );
                continue;
            }
            if status.latest_valid_hash != Some(head)
                || status.validation_error.is_some()
                || response.payload_id.is_some()
            {
                return Err(Error::unexpected_status(&client.id, method, block, status));
            }
        }
        Ok(())
    }

    /// Records the new head once every client has seen the forkchoice update, checking the
    /// header each client serves for it.
    async fn finish_round(&mut self) -> Result<(), Error> {
        let request = &self
            .latest_payload_built
            .as_ref()
            .ok_or(Error::NotInitialized)?
            .request;
        let (number, hash) = (request.block_number(), request.block_hash());

        if self.first_pos_block_number.is_none() {
            self.first_pos_block_number = Some(number);
        }
        self.latest_head_number += 1;

        let prev_randao = self.prev_randao(number);
        let headers = join_all(self.clients.iter().map(|c| c.header_by_number(number))).await;
        let mut accepted = None;
        for (client, header) in self.clients.iter().zip(headers) {
            let exempt = self.expected_invalid.contains(&client.id);
            let header = match header {
                Ok(Some(header)) => header,
                Ok(None) if self.verifying_clients.contains(&client.id) => {
                    return Err(Error::UnknownHeader {
                        client: client.id.clone(),
                        block: number.to_string(),
                    })
                }
                Ok(None) => {
                    debug!(self.log, "Client has no block"; "client" => &client.id, "number" => number);
                    continue;
                }
                Err(e) if exempt => {
                    warn!(self.log, "Header request failed"; "client" => &client.id, "error" => ?e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let got = header.hash();
            if got != hash {
                if self.verifying_clients.contains(&client.id) {
                    return Err(Error::HeadMismatch {
                        block: number,
                        expected: hash,
                        client: client.id.clone(),
                        got,
                    });
                }
                debug!(self.log, "Client is on another block"; "client" => &client.id, "hash" => ?got);
                continue;
            }
            check_pos_header(&client.id, &header, prev_randao)?;
            accepted = Some(header);
        }

        let header = accepted.ok_or(Error::NoAcceptingClient { block: number })?;
        info!(
            self.log,
            "Produced block";
            "number" => number,
            "hash" => ?hash,
            "safe" => ?self.latest_forkchoice.safe_block_hash,
            "finalized" => ?self.latest_forkchoice.finalized_block_hash,
        );
        self.header_history.insert(number, header.clone());
        self.latest_header = Some(header);
        self.next_withdrawals = None;
        self.expected_invalid.clear();
        Ok(())
    }

    async fn run_round<C>(&mut self, callbacks: &mut C) -> Result<(), Error>
    where
        C: BlockProcessCallbacks + ?Sized,
    {
        if self.next_withdrawals.is_none() {
            self.next_withdrawals = Some(self.make_next_withdrawals());
        }

        self.pick_next_payload_producer().await?;
        callbacks.on_payload_producer_selected(self).await?;

        self.generate_payload_attributes()?;
        callbacks.on_payload_attributes_generated(self).await?;

        self.request_next_payload().await?;
        callbacks.on_request_next_payload(self).await?;

        tokio::time::sleep(self.config.payload_production_client_delay).await;

        self.get_next_payload().await?;
        callbacks.on_get_payload(self).await?;

        self.broadcast_next_new_payload().await?;
        callbacks.on_new_payload_broadcast(self).await?;

        let previous = self.latest_forkchoice;
        self.advance_forkchoice()?;
        self.broadcast_latest_forkchoice().await?;
        callbacks.on_forkchoice_broadcast(self).await?;

        if previous.safe_block_hash != self.latest_forkchoice.safe_block_hash {
            callbacks.on_safe_block_change(self).await?;
        }
        if previous.finalized_block_hash != self.latest_forkchoice.finalized_block_hash {
            callbacks.on_finalized_block_change(self).await?;
        }

        self.finish_round().await
    }

    /// Runs one round of block production within the configured deadline.
    pub async fn produce_single_block<C>(&mut self, callbacks: &mut C) -> Result<(), Error>
    where
        C: BlockProcessCallbacks + ?Sized,
    {
        let block = self.latest_header()?.number + 1;
        let deadline = self.config.round_deadline;
        match tokio::time::timeout(deadline, self.run_round(callbacks)).await {
            Ok(result) => result,
            Err(_) => Err(Error::RoundTimeout { block, deadline }),
        }
    }

    pub async fn produce_blocks<C>(&mut self, count: u64, callbacks: &mut C) -> Result<(), Error>
    where
        C: BlockProcessCallbacks + ?Sized,
    {
        for _ in 0..count {
            self.produce_single_block(callbacks).await?;
        }
        Ok(())
    }
}

async fn new_payload_with_retries(
    client: &EngineClient,
    fork: ForkName,
    request: &NewPayloadRequest,
    retries: usize,
    delay: Duration,
) -> Result<PayloadStatusV1, engine_api::Error> {
    let mut attempt = 0;
    loop {
        let status = client.api.new_payload(fork, request).await?;
        if status.status != PayloadStatusV1Status::Syncing || attempt >= retries {
            return Ok(status);
        }
        attempt += 1;
        tokio::time::sleep(delay).await;
    }
}

fn check_pos_header(client: &str, header: &Header, prev_randao: Option<Hash256>) -> Result<(), Error> {
    let invalid = |field, value: String| Error::InvalidHeader {
        client: client.to_string(),
        block: header.number,
        field,
        value,
    };
    if header.ommers_hash != empty_ommers_hash() {
        return Err(invalid("ommers_hash", format!("{:?}", header.ommers_hash)));
    }
    if !header.difficulty.is_zero() {
        return Err(invalid("difficulty", header.difficulty.to_string()));
    }
    if let Some(prev_randao) = prev_randao {
        if header.mix_hash != prev_randao {
            return Err(invalid("mix_hash", format!("{:?}", header.mix_hash)));
        }
    }
    if header.nonce != Hash64::zero() {
        return Err(invalid("nonce", format!("{:?}", header.nonce)));
    }
    if header.extra_data.len() > MAX_EXTRA_DATA_BYTES {
        return Err(invalid(
            "extra_data",
            format!("{} bytes", header.extra_data.len()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use engine_api::test_utils::{MockExecutionConfig, MockServer};
    use engine_api::ForkConfig;
    use logging::test_logger;
    use tokio::runtime::Handle;
    use url::Url;

    fn mock_at_terminal_block(fork_config: ForkConfig) -> MockServer {
        let server = MockServer::new(
            &Handle::current(),
            MockExecutionConfig {
                fork_config,
                ..MockExecutionConfig::default()
            },
            test_logger(),
        );
        server
            .execution_block_generator()
            .move_to_terminal_block()
            .unwrap();
        server
    }

    fn raise_ttd(server: &MockServer) {
        let mut generator = server.execution_block_generator();
        generator.terminal_total_difficulty =
            generator.terminal_total_difficulty + generator.terminal_total_difficulty;
    }

    fn engine_client(id: &str, server: &MockServer) -> EngineClient {
        let ttd = server.execution_block_generator().terminal_total_difficulty;
        EngineClient::new(id, Url::parse(&server.url()).unwrap(), None, ttd).unwrap()
    }

    fn config(fork_config: ForkConfig) -> ClMockConfig {
        ClMockConfig {
            payload_production_client_delay: Duration::from_millis(10),
            syncing_retries: 1,
            syncing_retry_delay: Duration::from_millis(10),
            fork_config,
            seed: Some(42),
            ..ClMockConfig::default()
        }
    }

    async fn cl_mock(servers: &[(&str, &MockServer)], fork_config: ForkConfig) -> ClMock {
        let mut cl = ClMock::new(config(fork_config), test_logger());
        for (id, server) in servers {
            cl.add_client(engine_client(id, server));
        }
        let first = servers[0].0;
        cl.wait_for_ttd(first).await.unwrap();
        cl.init_chain(first).await.unwrap();
        cl
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<&'static str>,
    }

    #[async_trait]
    impl BlockProcessCallbacks for Recorder {
        async fn on_payload_producer_selected(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
            self.events.push("producer");
            Ok(())
        }

        async fn on_get_payload(&mut self, cl: &mut ClMock) -> Result<(), Error> {
            assert!(cl.latest_payload_built().is_some());
            self.events.push("get_payload");
            Ok(())
        }

        async fn on_forkchoice_broadcast(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
            self.events.push("forkchoice");
            Ok(())
        }

        async fn on_safe_block_change(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
            self.events.push("safe");
            Ok(())
        }

        async fn on_finalized_block_change(&mut self, _cl: &mut ClMock) -> Result<(), Error> {
            self.events.push("finalized");
            Ok(())
        }
    }

    #[test]
    fn beacon_root_is_sha256_of_timestamp() {
        let root = timestamp_to_beacon_root(1);
        let expected = Sha256::digest(&[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(root.as_bytes(), expected.as_slice());
    }

    #[tokio::test]
    async fn produces_blocks_on_every_client() {
        let a = mock_at_terminal_block(ForkConfig::default());
        let b = mock_at_terminal_block(ForkConfig::default());
        let mut cl = cl_mock(&[("a", &a), ("b", &b)], ForkConfig::default()).await;
        let terminal = cl.latest_header().unwrap().clone();

        let mut recorder = Recorder::default();
        cl.produce_blocks(3, &mut recorder).await.unwrap();

        assert_eq!(cl.first_pos_block_number(), Some(terminal.number + 1));
        assert_eq!(cl.latest_head_number(), terminal.number + 3);
        let head = cl.latest_header().unwrap().clone();
        assert_eq!(head.mix_hash, cl.prev_randao(head.number).unwrap());
        assert_eq!(cl.head_hash_history().len(), 3);

        let forkchoice = cl.latest_forkchoice();
        assert_eq!(forkchoice.head_block_hash, head.hash());
        assert_eq!(forkchoice.safe_block_hash, cl.head_hash_history()[1]);
        assert_eq!(forkchoice.finalized_block_hash, cl.head_hash_history()[0]);

        for server in [&a, &b] {
            let latest = server.execution_block_generator().latest_block().unwrap();
            assert_eq!(latest.block_hash(), head.hash());
        }
        assert_eq!(cl.verifying_clients().collect::<Vec<_>>(), vec!["a", "b"]);

        assert_eq!(
            recorder.events,
            vec![
                "producer",
                "get_payload",
                "forkchoice",
                "producer",
                "get_payload",
                "forkchoice",
                "safe",
                "producer",
                "get_payload",
                "forkchoice",
                "safe",
                "finalized",
            ]
        );
    }

    #[tokio::test]
    async fn producers_rotate() {
        let a = mock_at_terminal_block(ForkConfig::default());
        let b = mock_at_terminal_block(ForkConfig::default());
        let mut cl = cl_mock(&[("a", &a), ("b", &b)], ForkConfig::default()).await;

        let mut producers = vec![];
        for _ in 0..2 {
            cl.produce_single_block(&mut ()).await.unwrap();
            producers.push(cl.next_block_producer().unwrap().id.clone());
        }
        producers.sort();
        assert_eq!(producers, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn shanghai_payloads_carry_withdrawals() {
        let forks = ForkConfig {
            shanghai_time: Some(0),
            ..ForkConfig::default()
        };
        let server = mock_at_terminal_block(forks);
        let mut cl = cl_mock(&[("a", &server)], forks).await;
        cl.produce_blocks(2, &mut ()).await.unwrap();

        let withdrawals = cl
            .latest_executed_payload()
            .unwrap()
            .execution_payload
            .withdrawals_list()
            .unwrap();
        assert_eq!(withdrawals.len(), WITHDRAWALS_PER_PAYLOAD as usize);
        assert_eq!(withdrawals[0].index, WITHDRAWALS_PER_PAYLOAD + 1);
        assert_eq!(withdrawals[3].address.0[0], 3);
        assert!(server
            .received_methods()
            .contains(&"engine_newPayloadV2".to_string()));
    }

    #[tokio::test]
    async fn cancun_payloads_carry_beacon_root() {
        let forks = ForkConfig {
            shanghai_time: Some(0),
            cancun_time: Some(0),
            ..ForkConfig::default()
        };
        let server = mock_at_terminal_block(forks);
        let mut cl = cl_mock(&[("a", &server)], forks).await;
        cl.produce_single_block(&mut ()).await.unwrap();

        let executed = cl.latest_executed_payload().unwrap();
        let timestamp = executed.execution_payload.timestamp;
        assert_eq!(
            executed.parent_beacon_block_root,
            Some(timestamp_to_beacon_root(timestamp))
        );
        assert!(cl.latest_payload_built().unwrap().blobs_bundle.is_some());
        assert!(server
            .received_methods()
            .contains(&"engine_newPayloadV3".to_string()));
    }

    #[tokio::test]
    async fn invalid_terminal_block_is_expected() {
        let secondary = mock_at_terminal_block(ForkConfig::default());
        let main = mock_at_terminal_block(ForkConfig::default());
        // Same PoW chain, but main needs more difficulty before the merge.
        raise_ttd(&main);

        let mut cl = cl_mock(&[("secondary", &secondary), ("main", &main)], ForkConfig::default()).await;
        cl.expect_invalid_payload("main");
        cl.produce_single_block(&mut ()).await.unwrap();

        let outcome = cl
            .latest_new_payload_outcomes()
            .iter()
            .find(|o| o.client == "main")
            .unwrap()
            .clone();
        let status = outcome.result.unwrap();
        assert_eq!(status.status, PayloadStatusV1Status::Invalid);
        assert_eq!(status.latest_valid_hash, Some(Hash256::zero()));
        assert_eq!(cl.verifying_clients().collect::<Vec<_>>(), vec!["secondary"]);
    }

    #[tokio::test]
    async fn unexpected_invalid_fails_the_round() {
        let secondary = mock_at_terminal_block(ForkConfig::default());
        let main = mock_at_terminal_block(ForkConfig::default());
        raise_ttd(&main);

        let mut cl = cl_mock(&[("secondary", &secondary), ("main", &main)], ForkConfig::default()).await;
        let result = cl.produce_single_block(&mut ()).await;
        assert!(
            matches!(result, Err(Error::UnexpectedStatus { ref client, .. }) if client == "main"),
            "{:?}",
            result
        );
    }

    #[tokio::test]
    async fn unreachable_client_fails_the_round() {
        let live = mock_at_terminal_block(ForkConfig::default());
        let mut cl = cl_mock(&[("live", &live)], ForkConfig::default()).await;
        let ttd = live.execution_block_generator().terminal_total_difficulty;
        let dead = Url::parse("http://127.0.0.1:1").unwrap();
        cl.add_client(EngineClient::new("dead", dead, None, ttd).unwrap());

        let result = cl.produce_single_block(&mut ()).await;
        assert!(
            matches!(result, Err(Error::EngineApi { ref client, .. }) if client == "dead"),
            "{:?}",
            result
        );
    }

    #[tokio::test]
    async fn syncing_only_answers_fail_the_round() {
        let server = mock_at_terminal_block(ForkConfig::default());
        server.set_new_payload_response(Some(PayloadStatusV1 {
            status: PayloadStatusV1Status::Syncing,
            latest_valid_hash: None,
            validation_error: None,
        }));
        let mut cl = cl_mock(&[("a", &server)], ForkConfig::default()).await;

        let result = cl.produce_single_block(&mut ()).await;
        assert!(matches!(result, Err(Error::NoValidations { .. })));
        let retried = server
            .received_methods()
            .iter()
            .filter(|m| m.as_str() == "engine_newPayloadV1")
            .count();
        assert_eq!(retried, 2);
    }

    #[tokio::test]
    async fn producer_must_be_on_latest_block() {
        let a = mock_at_terminal_block(ForkConfig::default());
        let behind = MockServer::unit_testing();
        let mut cl = ClMock::new(config(ForkConfig::default()), test_logger());
        cl.add_client(engine_client("behind", &behind));
        cl.add_client(engine_client("a", &a));
        cl.init_chain("a").await.unwrap();
        cl.remove_client("a").unwrap();

        let result = cl.produce_single_block(&mut ()).await;
        assert!(matches!(result, Err(Error::NoProducer { .. })));
    }

    #[tokio::test]
    async fn round_deadline() {
        let server = mock_at_terminal_block(ForkConfig::default());
        let mut cl = cl_mock(&[("a", &server)], ForkConfig::default()).await;
        cl.config.payload_production_client_delay = Duration::from_secs(5);
        cl.config.round_deadline = Duration::from_millis(100);

        let result = cl.produce_single_block(&mut ()).await;
        assert!(matches!(result, Err(Error::RoundTimeout { .. })));
    }
}
