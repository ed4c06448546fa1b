use crate::beacon::BeaconClient;
use crate::config::TestnetConfig;
use crate::health::get_health;
use crate::types::*;
use crate::Error;
use engine_api::http::HttpJsonRpc;
use engine_api::{BlockByNumberQuery, LATEST_TAG};
use futures::future::join_all;
use slog::{debug, info, warn, Logger};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use ::types::{Hash256, Header};

/// A beacon node and the execution client it drives.
#[derive(Clone)]
pub struct Node {
    pub beacon: Arc<dyn BeaconClient>,
    pub execution: Arc<HttpJsonRpc>,
}

impl Node {
    pub fn name(&self) -> &str {
        self.beacon.name()
    }
}

/// The slot a check is performed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationSlot {
    Slot(Slot),
    /// First slot of the epoch following the checkpoint.
    FirstSlotAfterCheckpoint(Checkpoint),
    /// Start slot of the checkpoint's epoch.
    LastSlotAtCheckpoint(Checkpoint),
    /// Slot of the head of the first node.
    LatestByHead,
}

/// What a node reports about its chain in one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub head: BlockHeaderInfo,
    pub version: String,
    pub checkpoints: FinalityCheckpoints,
    pub execution_block_hash: Option<Hash256>,
}

pub struct Testnet {
    config: TestnetConfig,
    nodes: Vec<Node>,
    log: Logger,
}

impl Testnet {
    pub fn new(config: TestnetConfig, nodes: Vec<Node>, log: Logger) -> Self {
        Self { config, nodes, log }
    }

    pub fn config(&self) -> &TestnetConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn first_node(&self) -> Result<&Node, Error> {
        self.nodes.first().ok_or(Error::NoNodes)
    }

    /// Runs `query` against every node concurrently, each bounded by the per-call timeout.
    /// Results are in node order.
    async fn query_all<'a, T, F, Fut>(&'a self, query: F) -> Vec<Result<T, Error>>
    where
        F: Fn(usize, &'a Node) -> Fut,
        Fut: Future<Output = Result<T, Error>> + 'a,
    {
        let call_timeout = self.config.call_timeout;
        join_all(self.nodes.iter().enumerate().map(|(i, node)| {
            let call = query(i, node);
            async move {
                tokio::time::timeout(call_timeout, call)
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::Timeout {
                            node: i,
                            name: node.name().to_string(),
                        })
                    })
            }
        }))
        .await
    }

    async fn resolve_slot(&self, slot: VerificationSlot, node: &Node) -> Result<Slot, Error> {
        match slot {
            VerificationSlot::Slot(slot) => Ok(slot),
            VerificationSlot::FirstSlotAfterCheckpoint(checkpoint) => {
                Ok(self.config.epoch_start_slot(checkpoint.epoch + 1))
            }
            VerificationSlot::LastSlotAtCheckpoint(checkpoint) => {
                Ok(self.config.epoch_start_slot(checkpoint.epoch))
            }
            VerificationSlot::LatestByHead => node
                .beacon
                .block_header(BlockId::Head)
                .await?
                .map(|header| header.slot)
                .ok_or_else(|| Error::MissingBlock {
                    node: 0,
                    block: BlockId::Head.to_string(),
                }),
        }
    }

    /// Checks that every node sees at least `min_health` of the maximum participation.
    ///
    /// From the merge fork on, the slot before `slot` is inspected so that the last slot of the
    /// finalized epoch is targeted.
    pub async fn verify_participation(
        &self,
        slot: VerificationSlot,
        min_health: f64,
    ) -> Result<(), Error> {
        let mut slot = self.resolve_slot(slot, self.first_node()?).await?;
        if let Some(bellatrix) = self.config.bellatrix_fork_epoch {
            if bellatrix <= self.config.epoch_of(slot) {
                slot = slot.saturating_sub(1);
            }
        }
        let epoch = self.config.epoch_of(slot);

        let healths = self
            .query_all(|_, node| get_health(node.beacon.as_ref(), slot, &self.config))
            .await;
        for (i, (node, health)) in self.nodes.iter().zip(healths).enumerate() {
            let health = health?;
            if health < min_health {
                return Err(Error::UnhealthyParticipation {
                    node: i,
                    name: node.name().to_string(),
                    epoch,
                    got: health,
                    want: min_health,
                });
            }
            info!(
                self.log,
                "Participation";
                "node" => i,
                "name" => node.name(),
                "epoch" => epoch,
                "health" => format!("{:.2}", health),
            );
        }
        Ok(())
    }

    /// Checks that the execution payload of the first node's block at `slot` is canonical on
    /// every execution client.
    pub async fn verify_execution_payload_is_canonical(
        &self,
        slot: VerificationSlot,
    ) -> Result<(), Error> {
        let first = self.first_node()?;
        let slot = self.resolve_slot(slot, first).await?;
        let block = first
            .beacon
            .block(BlockId::Slot(slot))
            .await?
            .ok_or_else(|| Error::MissingBlock {
                node: 0,
                block: slot.to_string(),
            })?;
        let payload = block
            .execution_payload
            .ok_or(Error::NoExecutionPayload { slot })?;

        let headers = self
            .query_all(|i, node| execution_header(i, node, payload.block_number))
            .await;
        for (i, (node, header)) in self.nodes.iter().zip(headers).enumerate() {
            let hash = header?.hash();
            if hash != payload.block_hash {
                return Err(Error::ExecutionBlockMismatch {
                    node: i,
                    name: node.name().to_string(),
                    number: payload.block_number,
                    got: hash,
                    expected: payload.block_hash,
                });
            }
        }
        debug!(
            self.log,
            "Execution payload is canonical";
            "slot" => slot,
            "number" => payload.block_number,
            "hash" => ?payload.block_hash,
        );
        Ok(())
    }

    /// Walks back from `slot` on each node in turn and returns the first beacon block whose
    /// execution payload has hash `hash`. The walk on a node stops at the first pre-merge block.
    pub async fn verify_execution_payload_hash_inclusion(
        &self,
        slot: VerificationSlot,
        hash: Hash256,
    ) -> Result<Option<BeaconBlockInfo>, Error> {
        for node in &self.nodes {
            let last = self.resolve_slot(slot, node).await?;
            for slot in (1..=last).rev() {
                let block = match node.beacon.block(BlockId::Slot(slot)).await {
                    Ok(Some(block)) => block,
                    Ok(None) | Err(_) => continue,
                };
                match &block.execution_payload {
                    None => break,
                    Some(payload) if payload.block_hash == hash => return Ok(Some(block)),
                    Some(_) => {}
                }
            }
        }
        Ok(None)
    }

    /// Checks that every validator client proposed at least one block up to `slot`, as seen by
    /// the first node.
    pub async fn verify_proposers(
        &self,
        slot: VerificationSlot,
        allow_empty_slots: bool,
    ) -> Result<(), Error> {
        let first = self.first_node()?;
        let last = self.resolve_slot(slot, first).await?;
        let mut proposed = vec![false; self.nodes.len()];

        for slot in 1..=last {
            let block = match first.beacon.block(BlockId::Slot(slot)).await? {
                Some(block) => block,
                None if allow_empty_slots => continue,
                None => {
                    return Err(Error::MissingBlock {
                        node: 0,
                        block: slot.to_string(),
                    })
                }
            };
            let client = self
                .config
                .validator_client(block.proposer_index)
                .filter(|client| *client < proposed.len())
                .ok_or(Error::UnknownProposer {
                    slot,
                    validator_index: block.proposer_index,
                })?;
            proposed[client] = true;
        }

        match proposed.iter().position(|p| !p) {
            Some(i) => Err(Error::DidNotPropose {
                node: i,
                name: self.nodes[i].name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Checks that every execution client reports the same head.
    ///
    /// With `allow_propagation`, a head that is the parent or child of the first client's head is
    /// accepted too, for checks racing a block that is still being propagated.
    pub async fn verify_el_heads(&self, allow_propagation: bool) -> Result<(), Error> {
        let heads = self
            .query_all(|i, node| async move {
                node.execution
                    .get_header_by_number(BlockByNumberQuery::Tag(LATEST_TAG))
                    .await
                    .map_err(|error| Error::EngineApi { node: i, error })?
                    .ok_or_else(|| Error::MissingExecutionBlock {
                        node: i,
                        number: LATEST_TAG.to_string(),
                    })
            })
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let reference = match heads.first() {
            Some(head) => head,
            None => return Err(Error::NoNodes),
        };
        let reference_hash = reference.hash();
        info!(self.log, "Verifying execution heads"; "head" => ?reference_hash);

        for (i, head) in heads.iter().enumerate() {
            let hash = head.hash();
            let agrees = hash == reference_hash
                || (allow_propagation
                    && (reference.parent_hash == hash || head.parent_hash == reference_hash));
            if !agrees {
                return Err(Error::HeadMismatch {
                    node: i,
                    name: self.nodes[i].name().to_string(),
                    reference: reference_hash,
                    got: hash,
                });
            }
        }
        Ok(())
    }

    /// Checks that every node has finalized at least `min_epoch`.
    pub async fn verify_finality(&self, min_epoch: Epoch) -> Result<(), Error> {
        let checkpoints = self
            .query_all(|_, node| node.beacon.finality_checkpoints(BlockId::Head))
            .await;
        for (i, (node, checkpoints)) in self.nodes.iter().zip(checkpoints).enumerate() {
            let finalized = checkpoints?.finalized;
            if finalized.epoch < min_epoch || finalized.is_zero() {
                return Err(Error::NotFinalized {
                    node: i,
                    name: node.name().to_string(),
                    epoch: finalized.epoch,
                    want: min_epoch,
                });
            }
        }
        Ok(())
    }

    /// Polls every node once per slot until all of them report a finalized checkpoint, returning
    /// the first node's.
    ///
    /// A node failing `max_consecutive_errors` polls in a row, or whose head falls an entire epoch
    /// behind the wall clock, fails the wait.
    pub async fn wait_for_finality(&self, deadline: Duration) -> Result<Checkpoint, Error> {
        tokio::time::timeout(deadline, self.poll_until_finalized())
            .await
            .map_err(|_| Error::FinalityTimeout { deadline })?
    }

    async fn poll_until_finalized(&self) -> Result<Checkpoint, Error> {
        let mut interval = tokio::time::interval(self.config.slot_duration());
        let mut errors = vec![0; self.nodes.len()];
        loop {
            interval.tick().await;
            let statuses = self.node_statuses().await;

            let mut finalized = Vec::with_capacity(statuses.len());
            for (i, status) in statuses.into_iter().enumerate() {
                match status {
                    Ok(status) => {
                        errors[i] = 0;
                        self.check_not_stalled(i, &status)?;
                        self.log_status(i, &status);
                        finalized.push(status.checkpoints.finalized);
                    }
                    Err(e) => {
                        errors[i] += 1;
                        warn!(
                            self.log,
                            "Node poll failed";
                            "node" => i,
                            "error" => %e,
                            "consecutive" => errors[i],
                        );
                        if errors[i] >= self.config.max_consecutive_errors {
                            return Err(e);
                        }
                    }
                }
            }

            if finalized.len() == self.nodes.len() && finalized.iter().all(|cp| !cp.is_zero()) {
                return finalized.first().copied().ok_or(Error::NoNodes);
            }
        }
    }

    /// Waits `slots` slot durations, logging the status of every node once per slot.
    pub async fn wait_slots(&self, slots: u64) {
        for _ in 0..slots {
            for (i, status) in self.node_statuses().await.into_iter().enumerate() {
                match status {
                    Ok(status) => self.log_status(i, &status),
                    Err(e) => warn!(self.log, "Node poll failed"; "node" => i, "error" => %e),
                }
            }
            tokio::time::sleep(self.config.slot_duration()).await;
        }
    }

    pub async fn node_statuses(&self) -> Vec<Result<NodeStatus, Error>> {
        self.query_all(|i, node| node_status(i, node)).await
    }

    fn check_not_stalled(&self, node: usize, status: &NodeStatus) -> Result<(), Error> {
        if let Some(clock_slot) = self.config.clock_slot() {
            if clock_slot.saturating_sub(status.head.slot) >= self.config.slots_per_epoch {
                return Err(Error::StalledNode {
                    node,
                    name: self.nodes[node].name().to_string(),
                    clock_slot,
                    head_slot: status.head.slot,
                });
            }
        }
        Ok(())
    }

    fn log_status(&self, node: usize, status: &NodeStatus) {
        info!(
            self.log,
            "Node status";
            "node" => node,
            "name" => self.nodes[node].name(),
            "fork" => status.version.as_str(),
            "slot" => status.head.slot,
            "head" => ?status.head.root,
            "exec_payload" => ?status.execution_block_hash,
            "justified" => status.checkpoints.current_justified.epoch,
            "finalized" => status.checkpoints.finalized.epoch,
        );
    }
}

async fn execution_header(i: usize, node: &Node, number: u64) -> Result<Header, Error> {
    node.execution
        .get_header_by_number(BlockByNumberQuery::Number(number))
        .await
        .map_err(|error| Error::EngineApi { node: i, error })?
        .ok_or_else(|| Error::MissingExecutionBlock {
            node: i,
            number: number.to_string(),
        })
}

async fn node_status(i: usize, node: &Node) -> Result<NodeStatus, Error> {
    let head = node
        .beacon
        .block_header(BlockId::Head)
        .await?
        .ok_or_else(|| Error::MissingBlock {
            node: i,
            block: BlockId::Head.to_string(),
        })?;
    let checkpoints = node.beacon.finality_checkpoints(BlockId::Head).await?;
    let block = node
        .beacon
        .block(BlockId::Root(head.root))
        .await?
        .ok_or_else(|| Error::MissingBlock {
            node: i,
            block: BlockId::Root(head.root).to_string(),
        })?;
    Ok(NodeStatus {
        head,
        version: block.version,
        checkpoints,
        execution_block_hash: block.execution_payload.map(|p| p.block_hash),
    })
}
