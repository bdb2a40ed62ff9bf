//! Block reward and emission.

use crate::params::Currency;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RewardError {
    /// Cumulative block size exceeds twice the effective median.
    BlockTooLarge,
}

impl std::fmt::Display for RewardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewardError::BlockTooLarge => write!(f, "cumulative block size exceeds 2x median"),
        }
    }
}

impl std::error::Error for RewardError {}

/// Quadratic oversize penalty: full amount up to the median, zero at twice
/// the median, `amount·size·(2·median − size)/median²` in between.
fn penalized_amount(amount: u64, median_size: usize, current_size: usize) -> u64 {
    if current_size <= median_size {
        return amount;
    }
    let median = median_size as u128;
    let size = current_size as u128;
    let multiplicand = size * (2 * median - size);
    let penalized = (amount as u128) * multiplicand / (median * median);
    penalized as u64
}

/// Reward and emission delta for a block of `current_size` bytes.
///
/// Fees are penalty-exempt at major version 1; from version 2 on the
/// penalty also burns part of the fees, shrinking emission by the burned
/// amount.
pub fn get_block_reward(
    currency: &Currency,
    block_major_version: u8,
    median_size: usize,
    current_size: usize,
    already_generated_coins: u64,
    fee: u64,
) -> Result<(u64, i64), RewardError> {
    let base_reward =
        (currency.money_supply - already_generated_coins) >> currency.emission_speed_factor;

    let median = median_size.max(currency.granted_full_reward_zone(block_major_version));
    if current_size > 2 * median {
        return Err(RewardError::BlockTooLarge);
    }

    let penalized_base_reward = penalized_amount(base_reward, median, current_size);
    let penalized_fee = if block_major_version >= 2 {
        penalized_amount(fee, median, current_size)
    } else {
        fee
    };

    let reward = penalized_base_reward + penalized_fee;
    let emission_change = penalized_base_reward as i64 - (fee - penalized_fee) as i64;
    Ok((reward, emission_change))
}
