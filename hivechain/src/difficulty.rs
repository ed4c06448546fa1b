//! Ethash difficulty adjustment.
use crate::forks::{Fork, ForkSchedule};
use types::{empty_ommers_hash, Header, Uint256};

pub const MINIMUM_DIFFICULTY: u64 = 131_072;
const DIFFICULTY_BOUND_DIVISOR: u64 = 2048;
const DURATION_LIMIT: u64 = 13;
const EXP_DIFF_PERIOD: u64 = 100_000;

/// Block at which the difficulty bomb is treated as starting over, by fork.
fn bomb_delay(schedule: &ForkSchedule, number: u64) -> Option<u64> {
    let active = |fork| schedule.is_active(fork, number, 0);
    if active(Fork::GrayGlacier) {
        Some(11_400_000)
    } else if active(Fork::ArrowGlacier) {
        Some(10_700_000)
    } else if active(Fork::London) {
        Some(9_700_000)
    } else if active(Fork::MuirGlacier) {
        Some(9_000_000)
    } else if active(Fork::Constantinople) {
        Some(5_000_000)
    } else if active(Fork::Byzantium) {
        Some(3_000_000)
    } else {
        None
    }
}

/// Difficulty of a block with `timestamp` on top of `parent`.
pub fn calc_difficulty(schedule: &ForkSchedule, timestamp: u64, parent: &Header) -> Uint256 {
    let number = parent.number + 1;
    let parent_difficulty = parent.difficulty;
    let adjust = parent_difficulty / DIFFICULTY_BOUND_DIVISOR;
    let elapsed = timestamp.saturating_sub(parent.timestamp);

    let difficulty = match bomb_delay(schedule, number) {
        Some(delay) => {
            let base: i64 = if parent.ommers_hash == empty_ommers_hash() {
                1
            } else {
                2
            };
            let factor = std::cmp::max(base - (elapsed / 9) as i64, -99);
            let difficulty = scale(parent_difficulty, adjust, factor);
            let fake_number = (number - 1).saturating_sub(delay - 1);
            difficulty + bomb(fake_number)
        }
        None if schedule.is_active(Fork::Homestead, number, 0) => {
            let factor = std::cmp::max(1 - (elapsed / 10) as i64, -99);
            scale(parent_difficulty, adjust, factor) + bomb(number)
        }
        None => {
            let difficulty = if elapsed < DURATION_LIMIT {
                parent_difficulty + adjust
            } else {
                parent_difficulty.saturating_sub(adjust)
            };
            difficulty + bomb(number)
        }
    };
    std::cmp::max(difficulty, Uint256::from(MINIMUM_DIFFICULTY))
}

fn scale(parent_difficulty: Uint256, adjust: Uint256, factor: i64) -> Uint256 {
    let change = adjust * Uint256::from(factor.unsigned_abs());
    if factor >= 0 {
        parent_difficulty + change
    } else {
        parent_difficulty.saturating_sub(change)
    }
}

/// The exponential component, `2^(period - 2)` once `period = number / 100000` exceeds one.
fn bomb(number: u64) -> Uint256 {
    let period = number / EXP_DIFF_PERIOD;
    if period > 1 {
        Uint256::one() << (period - 2)
    } else {
        Uint256::zero()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::forks::Activation;
    use types::Hash256;

    fn schedule(forks: &[Fork]) -> ForkSchedule {
        ForkSchedule::from_activations(forks.iter().map(|f| (*f, Activation::Block(0)))).unwrap()
    }

    fn parent(difficulty: u64, timestamp: u64) -> Header {
        Header {
            number: 1,
            difficulty: Uint256::from(difficulty),
            timestamp,
            ..Header::default()
        }
    }

    #[test]
    fn frontier_adjusts_on_duration_limit() {
        let frontier = schedule(&[]);
        let parent = parent(2048 * 1000, 100);
        assert_eq!(calc_difficulty(&frontier, 112, &parent), Uint256::from(2049 * 1000));
        assert_eq!(calc_difficulty(&frontier, 113, &parent), Uint256::from(2047 * 1000));
    }

    #[test]
    fn homestead_steps_per_ten_seconds() {
        let homestead = schedule(&[Fork::Homestead]);
        let parent = parent(2048 * 1000, 100);
        assert_eq!(calc_difficulty(&homestead, 105, &parent), Uint256::from(2049 * 1000));
        assert_eq!(calc_difficulty(&homestead, 115, &parent), Uint256::from(2048 * 1000));
        assert_eq!(calc_difficulty(&homestead, 130, &parent), Uint256::from(2046 * 1000));
    }

    #[test]
    fn byzantium_counts_uncles() {
        let byzantium = schedule(&[Fork::Homestead, Fork::Byzantium]);
        let mut parent = parent(2048 * 1000, 100);
        assert_eq!(calc_difficulty(&byzantium, 110, &parent), Uint256::from(2048 * 1000));
        parent.ommers_hash = Hash256::repeat_byte(1);
        assert_eq!(calc_difficulty(&byzantium, 110, &parent), Uint256::from(2049 * 1000));
    }

    #[test]
    fn never_below_minimum() {
        let byzantium = schedule(&[Fork::Homestead, Fork::Byzantium]);
        let parent = parent(MINIMUM_DIFFICULTY, 100);
        assert_eq!(
            calc_difficulty(&byzantium, 10_000, &parent),
            Uint256::from(MINIMUM_DIFFICULTY)
        );
        let tiny = Header {
            difficulty: Uint256::from(0x10),
            ..parent
        };
        assert_eq!(
            calc_difficulty(&byzantium, 110, &tiny),
            Uint256::from(MINIMUM_DIFFICULTY)
        );
    }

    #[test]
    fn bomb_grows_past_second_period() {
        assert_eq!(bomb(199_999), Uint256::zero());
        assert_eq!(bomb(200_000), Uint256::one());
        assert_eq!(bomb(500_000), Uint256::from(8));
    }
}
