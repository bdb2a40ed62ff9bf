//! Next-block difficulty.
//!
//! Inputs are the timestamps and cumulative difficulties of the most
//! recent `Currency::difficulty_blocks_count` main-chain blocks in
//! chronological order (fewer near the chain start; the genesis sample is
//! skipped by the caller). A return of 0 signals arithmetic overflow and
//! must be rejected by the caller; fewer than two samples yield 1.

use basalt_consensus::Currency;

pub type Difficulty = u64;

pub fn next_difficulty(
    currency: &Currency,
    block_major_version: u8,
    timestamps: &[u64],
    cumulative_difficulties: &[Difficulty],
) -> Difficulty {
    debug_assert_eq!(timestamps.len(), cumulative_difficulties.len());
    if block_major_version >= 4 {
        next_difficulty_lwma(currency, timestamps, cumulative_difficulties)
    } else {
        next_difficulty_classic(currency, timestamps, cumulative_difficulties)
    }
}

/// The launch-era bounded-outlier calculator: sort timestamps, cut the
/// `difficulty_cut` extremes from both ends, divide accumulated work by
/// the trimmed time span. The caller feeds `window + lag` samples; the
/// `lag` newest are dropped here.
fn next_difficulty_classic(
    currency: &Currency,
    timestamps: &[u64],
    cumulative_difficulties: &[Difficulty],
) -> Difficulty {
    let window = currency.difficulty_window;
    let cut = currency.difficulty_cut;

    let mut timestamps = timestamps.to_vec();
    let mut cumulative_difficulties = cumulative_difficulties.to_vec();
    if timestamps.len() > window {
        timestamps.truncate(window);
        cumulative_difficulties.truncate(window);
    }

    let length = timestamps.len();
    if length <= 1 {
        return 1;
    }

    timestamps.sort_unstable();

    let (cut_begin, cut_end) = if length <= window - 2 * cut {
        (0, length)
    } else {
        let cut_begin = (length - (window - 2 * cut) + 1) / 2;
        (cut_begin, cut_begin + (window - 2 * cut))
    };

    let time_span = (timestamps[cut_end - 1] - timestamps[cut_begin]).max(1);
    let total_work =
        cumulative_difficulties[cut_end - 1] - cumulative_difficulties[cut_begin];

    let numerator = (total_work as u128) * (currency.difficulty_target as u128)
        + (time_span as u128)
        - 1;
    let next = numerator / time_span as u128;
    u64::try_from(next).unwrap_or(0)
}

/// Linearly weighted moving average over per-block solve times, weighting
/// recent blocks highest. Solve times are clamped to `[1, 6·target]` so a
/// single out-of-band timestamp cannot collapse the result.
fn next_difficulty_lwma(
    currency: &Currency,
    timestamps: &[u64],
    cumulative_difficulties: &[Difficulty],
) -> Difficulty {
    let length = timestamps.len();
    if length <= 1 {
        return 1;
    }
    let n = (length - 1).min(currency.difficulty_window_lwma);
    let timestamps = &timestamps[length - (n + 1)..];
    let cumulative_difficulties = &cumulative_difficulties[length - (n + 1)..];

    let target = currency.difficulty_target as i64;
    let mut weighted_solve_times: i128 = 0;
    let mut total_work: u128 = 0;
    for i in 1..=n {
        let solve_time = (timestamps[i] as i64 - timestamps[i - 1] as i64).clamp(1, 6 * target);
        weighted_solve_times += (solve_time as i128) * i as i128;
        total_work += (cumulative_difficulties[i] - cumulative_difficulties[i - 1]) as u128;
    }
    let weighted_solve_times = weighted_solve_times.max(1) as u128;

    let numerator = total_work * (currency.difficulty_target as u128) * (n as u128 + 1);
    let next = (numerator / (2 * weighted_solve_times)).max(1);
    u64::try_from(next).unwrap_or(0)
}
