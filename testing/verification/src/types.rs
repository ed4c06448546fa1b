//! The subset of the beacon node API the verification library reads.
use serde_utils::{quoted_u64, quoted_u8};
use serde::{Deserialize, Serialize};
use std::fmt;
use types::Hash256;

pub type Slot = u64;
pub type Epoch = u64;

/// Highest participation flag value a validator can reach in one epoch (source, target and head).
pub const MAX_PARTICIPATION_SCORE: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Head,
    Finalized,
    Slot(Slot),
    Root(Hash256),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Head => write!(f, "head"),
            BlockId::Finalized => write!(f, "finalized"),
            BlockId::Slot(slot) => write!(f, "{}", slot),
            BlockId::Root(root) => write!(f, "{:?}", root),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(with = "quoted_u64")]
    pub epoch: Epoch,
    pub root: Hash256,
}

impl Checkpoint {
    pub fn is_zero(&self) -> bool {
        *self == Checkpoint::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityCheckpoints {
    pub previous_justified: Checkpoint,
    pub current_justified: Checkpoint,
    pub finalized: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaderInfo {
    pub root: Hash256,
    pub slot: Slot,
    pub proposer_index: u64,
}

/// The execution payload fields of a beacon block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayloadSummary {
    pub block_hash: Hash256,
    #[serde(with = "quoted_u64")]
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconBlockInfo {
    /// Consensus fork the block belongs to (`phase0`, `bellatrix`, ...).
    pub version: String,
    pub slot: Slot,
    pub proposer_index: u64,
    /// `None` before the merge fork.
    pub execution_payload: Option<ExecutionPayloadSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSummary {
    pub pubkey: String,
    #[serde(with = "quoted_u64")]
    pub activation_eligibility_epoch: Epoch,
    #[serde(with = "quoted_u64")]
    pub exit_epoch: Epoch,
    pub slashed: bool,
}

impl ValidatorSummary {
    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        epoch >= self.activation_eligibility_epoch && epoch < self.exit_epoch && !self.slashed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipationFlags(#[serde(with = "quoted_u8")] pub u8);

/// The fields of a beacon state needed to judge participation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconStateSummary {
    pub version: String,
    /// Altair and later.
    pub current_epoch_participation: Option<Vec<u8>>,
    pub validators: Vec<ValidatorSummary>,
}
