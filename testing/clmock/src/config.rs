use engine_api::ForkConfig;
use std::time::Duration;
use types::Address;

pub const DEFAULT_SLOTS_TO_SAFE: usize = 1;
pub const DEFAULT_SLOTS_TO_FINALIZED: usize = 2;
pub const DEFAULT_ROUND_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClMockConfig {
    /// Number of blocks the safe block lags behind the head.
    pub slots_to_safe: usize,
    /// Number of blocks the finalized block lags behind the head.
    pub slots_to_finalized: usize,
    /// Seconds added to the parent timestamp for each new payload.
    pub block_timestamp_increment: u64,
    /// Time the producer gets between `forkchoiceUpdated` and `getPayload`.
    pub payload_production_client_delay: Duration,
    /// Wall-clock bound on one round of block production.
    pub round_deadline: Duration,
    /// How often a `SYNCING` answer to `newPayload` is retried before it is accepted as final.
    pub syncing_retries: usize,
    pub syncing_retry_delay: Duration,
    /// Poll interval of `wait_for_ttd`.
    pub ttd_check_period: Duration,
    pub fork_config: ForkConfig,
    pub fee_recipient: Address,
    /// Timestamp of the first PoS payload, instead of parent timestamp plus increment.
    pub transition_payload_timestamp: Option<u64>,
    /// Send `forkchoiceUpdated` to clients whose last `newPayload` answer was not `VALID`.
    pub optimistic_forkchoice: bool,
    /// Seed for the prev_randao generator. Fresh entropy when unset.
    pub seed: Option<u64>,
}

impl Default for ClMockConfig {
    fn default() -> Self {
        Self {
            slots_to_safe: DEFAULT_SLOTS_TO_SAFE,
            slots_to_finalized: DEFAULT_SLOTS_TO_FINALIZED,
            block_timestamp_increment: 1,
            payload_production_client_delay: Duration::from_secs(1),
            round_deadline: DEFAULT_ROUND_DEADLINE,
            syncing_retries: 5,
            syncing_retry_delay: Duration::from_millis(500),
            ttd_check_period: Duration::from_secs(1),
            fork_config: ForkConfig::default(),
            fee_recipient: Address::zero(),
            transition_payload_timestamp: None,
            optimistic_forkchoice: true,
            seed: None,
        }
    }
}
