use crate::types::{Epoch, Slot};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: usize = 3;

/// Static facts about a testnet the checks need to interpret what nodes report.
#[derive(Debug, Clone)]
pub struct TestnetConfig {
    pub slots_per_epoch: u64,
    pub seconds_per_slot: u64,
    /// Unix time of genesis. Without it, wall-clock based checks are skipped.
    pub genesis_time: Option<u64>,
    pub bellatrix_fork_epoch: Option<Epoch>,
    /// Validator client index of each validator, indexed by validator index.
    pub validator_clients: Vec<usize>,
    /// Deadline of every individual node query.
    pub call_timeout: Duration,
    /// Failed polls in a row tolerated per node while waiting.
    pub max_consecutive_errors: usize,
    pub base_reward_factor: u64,
    pub hysteresis_quotient: u64,
}

impl Default for TestnetConfig {
    fn default() -> Self {
        Self {
            slots_per_epoch: 32,
            seconds_per_slot: 12,
            genesis_time: None,
            bellatrix_fork_epoch: None,
            validator_clients: vec![],
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            base_reward_factor: 64,
            hysteresis_quotient: 4,
        }
    }
}

impl TestnetConfig {
    /// Splits `validators` into contiguous, equally sized ranges, one per client. Any remainder
    /// goes to the last client.
    pub fn with_validators_split_evenly(mut self, validators: usize, clients: usize) -> Self {
        let per_client = if clients == 0 { 0 } else { validators / clients };
        self.validator_clients = (0..validators)
            .map(|i| {
                if per_client == 0 {
                    0
                } else {
                    (i / per_client).min(clients - 1)
                }
            })
            .collect();
        self
    }

    pub fn validator_client(&self, validator_index: u64) -> Option<usize> {
        self.validator_clients
            .get(usize::try_from(validator_index).ok()?)
            .copied()
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot)
    }

    pub fn epoch_of(&self, slot: Slot) -> Epoch {
        slot / self.slots_per_epoch.max(1)
    }

    pub fn epoch_start_slot(&self, epoch: Epoch) -> Slot {
        epoch * self.slots_per_epoch
    }

    /// The slot the wall clock is in, if genesis is known and has passed.
    pub fn clock_slot(&self) -> Option<Slot> {
        let genesis = self.genesis_time?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        now.checked_sub(genesis)
            .map(|elapsed| elapsed / self.seconds_per_slot.max(1))
    }
}
