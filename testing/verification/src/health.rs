use crate::beacon::BeaconClient;
use crate::config::TestnetConfig;
use crate::types::{Slot, MAX_PARTICIPATION_SCORE};
use crate::Error;

const PHASE0: &str = "phase0";
const BASE_REWARDS_PER_EPOCH: u64 = 4;

/// Fraction of the maximum attestation participation seen in the state at `slot`.
///
/// Altair states carry per-validator participation flags. For phase0 states the balance gain of
/// the active validators over the preceding epoch is compared to the expected reward instead.
pub async fn get_health(
    beacon: &dyn BeaconClient,
    slot: Slot,
    config: &TestnetConfig,
) -> Result<f64, Error> {
    let state = beacon.state(slot).await?;
    if let Some(participation) = &state.current_epoch_participation {
        return Ok(participation_health(participation));
    }
    if state.version != PHASE0 {
        return Err(Error::ParticipationUnavailable {
            node: beacon.name().to_string(),
            version: state.version,
        });
    }

    let epoch = config.epoch_of(slot);
    let active = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_active_at(epoch))
        .map(|(i, _)| i as u64)
        .collect::<Vec<_>>();
    let before_epoch = epoch.saturating_sub(1);

    let before = beacon
        .validator_balances(config.epoch_start_slot(before_epoch), &active)
        .await?;
    let after = beacon
        .validator_balances(config.epoch_start_slot(epoch), &active)
        .await?;
    Ok(legacy_health(config, &before, &after))
}

pub fn participation_health(flags: &[u8]) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    let sum: u64 = flags.iter().map(|f| u64::from(*f)).sum();
    let average = sum as f64 / flags.len() as f64;
    average / f64::from(MAX_PARTICIPATION_SCORE)
}

/// Average balance gain over one epoch relative to the base reward a fully participating
/// validator earns.
pub fn legacy_health(config: &TestnetConfig, before: &[u64], after: &[u64]) -> f64 {
    if before.is_empty() || before.len() != after.len() {
        return 0.0;
    }
    let count = before.len() as u128;
    let sum_before: u128 = before.iter().map(|b| u128::from(*b)).sum();
    let sum_after: u128 = after.iter().map(|b| u128::from(*b)).sum();
    let average_before = sum_before / count;
    let average_after = sum_after / count;

    let sqrt = integer_sqrt(sum_before);
    if sqrt == 0 || config.hysteresis_quotient == 0 {
        return 0.0;
    }
    let reward = average_before * u128::from(config.base_reward_factor)
        / sqrt
        / u128::from(config.hysteresis_quotient);
    if reward == 0 {
        return 0.0;
    }

    average_after.saturating_sub(average_before) as f64
        / (reward * u128::from(BASE_REWARDS_PER_EPOCH)) as f64
}

fn integer_sqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sqrt() {
        assert_eq!(integer_sqrt(0), 0);
        assert_eq!(integer_sqrt(1), 1);
        assert_eq!(integer_sqrt(15), 3);
        assert_eq!(integer_sqrt(16), 4);
        assert_eq!(integer_sqrt(64 * 32_000_000_000), 1_431_083);
    }

    #[test]
    fn full_participation_is_healthy() {
        assert_eq!(participation_health(&[7, 7, 7, 7]), 1.0);
        assert_eq!(participation_health(&[7, 0]), 0.5);
        assert_eq!(participation_health(&[]), 0.0);
    }

    #[test]
    fn balance_based_health() {
        let config = TestnetConfig::default();
        let before = vec![32_000_000_000u64; 64];
        let reward = 32_000_000_000u128 * 64 / integer_sqrt(64 * 32_000_000_000) / 4;
        let after = before
            .iter()
            .map(|b| b + (reward * 4) as u64)
            .collect::<Vec<_>>();
        assert_eq!(legacy_health(&config, &before, &after), 1.0);

        let half = before
            .iter()
            .map(|b| b + (reward * 2) as u64)
            .collect::<Vec<_>>();
        assert_eq!(legacy_health(&config, &before, &half), 0.5);

        let losing = before.iter().map(|b| b - 1).collect::<Vec<_>>();
        assert_eq!(legacy_health(&config, &before, &losing), 0.0);
        assert_eq!(legacy_health(&config, &[], &[]), 0.0);
    }
}
