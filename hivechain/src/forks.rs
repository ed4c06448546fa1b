use crate::Error;
use std::collections::BTreeMap;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Protocol upgrades in canonical activation order.
///
/// Everything up to and including `Merge` is activated by block number, later forks by
/// timestamp.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Fork {
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    MuirGlacier,
    Berlin,
    London,
    ArrowGlacier,
    GrayGlacier,
    Merge,
    Shanghai,
    Cancun,
    Prague,
}

impl Fork {
    pub fn is_time_based(self) -> bool {
        self > Fork::Merge
    }

    /// Name of the client environment variable carrying this fork's activation.
    pub fn env_var(self) -> &'static str {
        match self {
            Fork::Homestead => "HIVE_FORK_HOMESTEAD",
            Fork::TangerineWhistle => "HIVE_FORK_TANGERINE",
            Fork::SpuriousDragon => "HIVE_FORK_SPURIOUS",
            Fork::Byzantium => "HIVE_FORK_BYZANTIUM",
            Fork::Constantinople => "HIVE_FORK_CONSTANTINOPLE",
            Fork::Petersburg => "HIVE_FORK_PETERSBURG",
            Fork::Istanbul => "HIVE_FORK_ISTANBUL",
            Fork::MuirGlacier => "HIVE_FORK_MUIR_GLACIER",
            Fork::Berlin => "HIVE_FORK_BERLIN",
            Fork::London => "HIVE_FORK_LONDON",
            Fork::ArrowGlacier => "HIVE_FORK_ARROW_GLACIER",
            Fork::GrayGlacier => "HIVE_FORK_GRAY_GLACIER",
            Fork::Merge => "HIVE_MERGE_BLOCK_ID",
            Fork::Shanghai => "HIVE_SHANGHAI_TIMESTAMP",
            Fork::Cancun => "HIVE_CANCUN_TIMESTAMP",
            Fork::Prague => "HIVE_PRAGUE_TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Block(u64),
    Time(u64),
}

impl Activation {
    pub fn value(self) -> u64 {
        match self {
            Activation::Block(n) | Activation::Time(n) => n,
        }
    }
}

/// Activation points of the selected forks. Forks absent from the schedule never activate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForkSchedule {
    activations: BTreeMap<Fork, Activation>,
}

/// Index of the last selected fork in canonical order. An empty name or "frontier" selects
/// every fork.
pub fn last_fork_index(name: &str) -> Result<usize, Error> {
    if name.is_empty() || name.eq_ignore_ascii_case("frontier") {
        return Ok(Fork::iter().count() - 1);
    }
    let fork = Fork::from_str(name).map_err(|_| Error::UnknownFork(name.to_string()))?;
    Ok(Fork::iter().position(|f| f == fork).unwrap_or(0))
}

impl ForkSchedule {
    /// Assigns each fork up to `last_fork` the heights `0, fork_interval, 2 * fork_interval,
    /// ...`. Forks that do not fit within `chain_length` are pinned to `chain_length`.
    pub fn schedule(
        fork_interval: u64,
        chain_length: u64,
        last_fork: &str,
        block_time: u64,
    ) -> Result<Self, Error> {
        let selected = last_fork_index(last_fork)? + 1;
        let mut activations = BTreeMap::new();
        let mut height = 0;
        for fork in Fork::iter().take(selected) {
            let at = height.min(chain_length);
            let activation = if fork.is_time_based() {
                Activation::Time(at * block_time)
            } else {
                Activation::Block(at)
            };
            activations.insert(fork, activation);
            height += fork_interval;
        }
        Ok(Self { activations })
    }

    /// Builds a schedule from explicit activations, rejecting any that go backwards.
    pub fn from_activations(
        activations: impl IntoIterator<Item = (Fork, Activation)>,
    ) -> Result<Self, Error> {
        let activations: BTreeMap<_, _> = activations.into_iter().collect();
        let mut previous: Option<(Fork, Activation)> = None;
        for (&fork, &activation) in &activations {
            if let Some((prev_fork, prev_activation)) = previous {
                let comparable = matches!(
                    (prev_activation, activation),
                    (Activation::Block(_), Activation::Block(_))
                        | (Activation::Time(_), Activation::Time(_))
                );
                if comparable && activation.value() < prev_activation.value() {
                    return Err(Error::NonMonotonicSchedule {
                        fork,
                        previous: prev_fork,
                    });
                }
            }
            if fork.is_time_based() != matches!(activation, Activation::Time(_)) {
                return Err(Error::InvalidConfig(format!(
                    "fork {} has the wrong activation kind",
                    fork
                )));
            }
            previous = Some((fork, activation));
        }
        Ok(Self { activations })
    }

    pub fn fork_activation(&self, fork: Fork) -> Option<Activation> {
        self.activations.get(&fork).copied()
    }

    pub fn is_active(&self, fork: Fork, number: u64, timestamp: u64) -> bool {
        match self.fork_activation(fork) {
            Some(Activation::Block(n)) => number >= n,
            Some(Activation::Time(t)) => timestamp >= t,
            None => false,
        }
    }

    /// The latest fork active at the given block.
    pub fn active_fork(&self, number: u64, timestamp: u64) -> Option<Fork> {
        self.activations
            .keys()
            .rev()
            .copied()
            .find(|fork| self.is_active(*fork, number, timestamp))
    }

    pub fn merge_block(&self) -> Option<u64> {
        self.fork_activation(Fork::Merge).map(Activation::value)
    }

    /// Whether the block at `number` is produced by proof of stake. The genesis block never is.
    pub fn is_post_merge(&self, number: u64) -> bool {
        number > 0 && self.merge_block().map_or(false, |m| number >= m)
    }

    /// Total difficulty at which the chain switches to proof of stake: the difficulty of the
    /// last proof-of-work block's chain.
    pub fn terminal_total_difficulty(
        &self,
        genesis_difficulty: u64,
        block_difficulty: u64,
    ) -> Option<u64> {
        self.merge_block()
            .map(|m| genesis_difficulty + block_difficulty * m.saturating_sub(1))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Fork, Activation)> + '_ {
        self.activations.iter().map(|(f, a)| (*f, *a))
    }

    /// Activation timestamps in the form used to choose engine API method versions.
    pub fn engine_fork_config(&self) -> engine_api::ForkConfig {
        let time = |fork| self.fork_activation(fork).map(Activation::value);
        engine_api::ForkConfig {
            shanghai_time: time(Fork::Shanghai),
            cancun_time: time(Fork::Cancun),
            prague_time: time(Fork::Prague),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn all_forks_at_genesis() {
        let schedule = ForkSchedule::schedule(0, 10, "", 10).unwrap();
        for fork in Fork::iter() {
            assert_eq!(schedule.fork_activation(fork).unwrap().value(), 0);
        }
        assert_eq!(schedule.active_fork(0, 0), Some(Fork::Prague));
        assert!(schedule.is_post_merge(1));
        assert!(!schedule.is_post_merge(0));
        assert_eq!(schedule.terminal_total_difficulty(131072, 16), Some(131072));
    }

    #[test]
    fn interval_with_pinning() {
        let schedule = ForkSchedule::schedule(2, 10, "Cancun", 10).unwrap();
        assert_eq!(
            schedule.fork_activation(Fork::Homestead),
            Some(Activation::Block(0))
        );
        assert_eq!(
            schedule.fork_activation(Fork::TangerineWhistle),
            Some(Activation::Block(2))
        );
        assert_eq!(
            schedule.fork_activation(Fork::Istanbul),
            Some(Activation::Block(10))
        );
        assert_eq!(
            schedule.fork_activation(Fork::Cancun),
            Some(Activation::Time(100))
        );
        assert_eq!(schedule.fork_activation(Fork::Prague), None);
        assert!(schedule.is_active(Fork::Byzantium, 6, 60));
        assert!(!schedule.is_active(Fork::Byzantium, 5, 50));
        assert_eq!(schedule.active_fork(4, 40), Some(Fork::SpuriousDragon));
    }

    #[test]
    fn last_fork_names() {
        assert_eq!(last_fork_index("frontier").unwrap(), 15);
        assert_eq!(last_fork_index("BYZANTIUM").unwrap(), 3);
        assert!(matches!(
            last_fork_index("glacier"),
            Err(Error::UnknownFork(_))
        ));
    }

    #[test]
    fn non_monotonic_override() {
        let result = ForkSchedule::from_activations([
            (Fork::Homestead, Activation::Block(5)),
            (Fork::Byzantium, Activation::Block(3)),
        ]);
        assert!(matches!(
            result,
            Err(Error::NonMonotonicSchedule {
                fork: Fork::Byzantium,
                previous: Fork::Homestead
            })
        ));
    }

    #[test]
    fn terminal_difficulty_after_pow_blocks() {
        let schedule = ForkSchedule::from_activations([
            (Fork::London, Activation::Block(0)),
            (Fork::Merge, Activation::Block(5)),
        ])
        .unwrap();
        assert_eq!(schedule.terminal_total_difficulty(131072, 16), Some(131072 + 64));
        assert!(!schedule.is_post_merge(4));
        assert!(schedule.is_post_merge(5));
    }
}
