//! Context-free validation checks.
//!
//! Everything here is a pure predicate over a block (plus explicit chain
//! context passed by value); the store-backed input checks live with the
//! chain manager.

use basalt_consensus::constants::MAX_PARENT_BLOCK_SIZE;
use basalt_consensus::Currency;
use basalt_primitives::block::carries_parent_block;
use basalt_primitives::extra::extra_merge_mining_tag;
use basalt_primitives::transaction::TransactionInput;
use basalt_primitives::Block;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationError {
    WrongVersion { expected: u8, got: u8 },
    MergeMiningTagForbidden,
    ParentBlockMissing,
    ParentBlockTooLarge { size: usize },
    TimestampTooFarInFuture,
    TimestampBelowMedian,
    CoinbaseWrongInputCount,
    CoinbaseHasSignatures,
    CoinbaseWrongInputType,
    CoinbaseWrongHeight { expected: u32, got: u32 },
    CoinbaseWrongUnlockTime { expected: u64, got: u64 },
    CoinbaseOutputOverflow,
    BlockTooLarge { size: u64, max: u64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::WrongVersion { expected, got } => {
                write!(f, "wrong major version {got}, expected {expected}")
            }
            ValidationError::MergeMiningTagForbidden => {
                write!(f, "merge mining tag in coinbase extra")
            }
            ValidationError::ParentBlockMissing => write!(f, "merge-mined parent block missing"),
            ValidationError::ParentBlockTooLarge { size } => {
                write!(f, "parent block is {size} bytes, limit {MAX_PARENT_BLOCK_SIZE}")
            }
            ValidationError::TimestampTooFarInFuture => {
                write!(f, "timestamp exceeds adjusted time plus future limit")
            }
            ValidationError::TimestampBelowMedian => {
                write!(f, "timestamp below median of recent blocks")
            }
            ValidationError::CoinbaseWrongInputCount => {
                write!(f, "coinbase must have exactly one input")
            }
            ValidationError::CoinbaseHasSignatures => {
                write!(f, "coinbase must not carry signatures")
            }
            ValidationError::CoinbaseWrongInputType => {
                write!(f, "coinbase input is not a base input")
            }
            ValidationError::CoinbaseWrongHeight { expected, got } => {
                write!(f, "coinbase height {got}, expected {expected}")
            }
            ValidationError::CoinbaseWrongUnlockTime { expected, got } => {
                write!(f, "coinbase unlock time {got}, expected {expected}")
            }
            ValidationError::CoinbaseOutputOverflow => {
                write!(f, "coinbase outputs overflow")
            }
            ValidationError::BlockTooLarge { size, max } => {
                write!(f, "cumulative size {size} exceeds {max}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Median with the even-length average convention.
pub fn median(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2
    }
}

pub fn check_block_version(
    currency: &Currency,
    block: &Block,
    height: u32,
) -> Result<(), ValidationError> {
    let expected = currency.major_version_for_height(height);
    if block.header.major_version != expected {
        return Err(ValidationError::WrongVersion {
            expected,
            got: block.header.major_version,
        });
    }
    Ok(())
}

/// Merged mining is retired at major version 5: a tag in the coinbase
/// extra is a consensus failure.
pub fn check_merge_mining_tag(block: &Block) -> Result<(), ValidationError> {
    if block.header.major_version >= 5
        && extra_merge_mining_tag(&block.base_transaction.extra).is_some()
    {
        return Err(ValidationError::MergeMiningTagForbidden);
    }
    Ok(())
}

pub fn check_parent_block(block: &Block) -> Result<(), ValidationError> {
    if !carries_parent_block(block.header.major_version) {
        return Ok(());
    }
    match &block.parent_block {
        None => Err(ValidationError::ParentBlockMissing),
        Some(parent) => {
            let size = parent.binary_size();
            if size > MAX_PARENT_BLOCK_SIZE {
                return Err(ValidationError::ParentBlockTooLarge { size });
            }
            Ok(())
        }
    }
}

/// Median rule over the most recent `timestamp_check_window` timestamps.
/// An unfilled window always passes.
pub fn check_block_timestamp(
    currency: &Currency,
    timestamps: &[u64],
    block: &Block,
) -> Result<(), ValidationError> {
    if timestamps.len() < currency.timestamp_check_window(block.header.major_version) {
        return Ok(());
    }
    if block.header.timestamp < median(timestamps) {
        return Err(ValidationError::TimestampBelowMedian);
    }
    Ok(())
}

pub fn check_timestamp_upper_bound(
    currency: &Currency,
    block: &Block,
    adjusted_time: u64,
) -> Result<(), ValidationError> {
    let limit = adjusted_time + currency.block_future_time_limit(block.header.major_version);
    if block.header.timestamp > limit {
        return Err(ValidationError::TimestampTooFarInFuture);
    }
    Ok(())
}

/// Structural coinbase checks that need no chain state beyond the height.
pub fn prevalidate_coinbase(
    currency: &Currency,
    block: &Block,
    height: u32,
) -> Result<(), ValidationError> {
    let coinbase = &block.base_transaction;
    if coinbase.inputs.len() != 1 {
        return Err(ValidationError::CoinbaseWrongInputCount);
    }
    if coinbase.signatures.iter().any(|sigs| !sigs.is_empty()) {
        return Err(ValidationError::CoinbaseHasSignatures);
    }
    let TransactionInput::Base(input) = &coinbase.inputs[0] else {
        return Err(ValidationError::CoinbaseWrongInputType);
    };
    if input.block_index != height {
        return Err(ValidationError::CoinbaseWrongHeight {
            expected: height,
            got: input.block_index,
        });
    }
    let expected_unlock =
        height as u64 + currency.mined_money_unlock_window(block.header.major_version) as u64;
    if coinbase.unlock_time != expected_unlock {
        return Err(ValidationError::CoinbaseWrongUnlockTime {
            expected: expected_unlock,
            got: coinbase.unlock_time,
        });
    }
    if coinbase.output_amount().is_none() {
        return Err(ValidationError::CoinbaseOutputOverflow);
    }
    Ok(())
}

pub fn check_cumulative_size(
    currency: &Currency,
    cumulative_size: u64,
    height: u32,
) -> Result<(), ValidationError> {
    let max = currency.max_block_cumulative_size(height as u64);
    if cumulative_size > max {
        return Err(ValidationError::BlockTooLarge {
            size: cumulative_size,
            max,
        });
    }
    Ok(())
}

/// Unlock time semantics: values below the max-height sentinel are
/// heights, anything else is a Unix timestamp.
pub fn is_unlocked(
    currency: &Currency,
    unlock_time: u64,
    chain_height: u32,
    last_block_timestamp: u64,
) -> bool {
    if unlock_time < currency.max_block_height {
        chain_height as u64 - 1 + currency.locked_tx_allowed_delta_blocks >= unlock_time
    } else {
        last_block_timestamp + currency.locked_tx_allowed_delta_seconds() >= unlock_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_consensus::Network;
    use basalt_primitives::transaction::{BaseInput, Transaction};
    use basalt_primitives::BlockHeader;

    fn currency() -> Currency {
        Currency::for_network(Network::Regtest)
    }

    fn coinbase_block(height: u32, unlock_offset: u64) -> Block {
        let currency = currency();
        Block {
            header: BlockHeader {
                major_version: 1,
                minor_version: 0,
                timestamp: 1_600_000_000,
                previous_block_hash: [0; 32],
                nonce: 0,
            },
            parent_block: None,
            base_transaction: Transaction {
                version: 1,
                unlock_time: height as u64
                    + currency.mined_money_unlock_window(1) as u64
                    + unlock_offset,
                inputs: vec![TransactionInput::Base(BaseInput {
                    block_index: height,
                })],
                outputs: vec![],
                extra: vec![],
                signatures: vec![vec![]],
            },
            transaction_hashes: vec![],
        }
    }

    #[test]
    fn median_conventions() {
        assert_eq!(median(&[]), 0);
        assert_eq!(median(&[7]), 7);
        assert_eq!(median(&[1, 9]), 5);
        assert_eq!(median(&[9, 1, 5]), 5);
        assert_eq!(median(&[4, 1, 9, 5]), 4);
    }

    #[test]
    fn coinbase_prevalidation_accepts_well_formed() {
        let block = coinbase_block(12, 0);
        assert_eq!(prevalidate_coinbase(&currency(), &block, 12), Ok(()));
    }

    #[test]
    fn coinbase_height_mismatch() {
        let block = coinbase_block(12, 0);
        assert_eq!(
            prevalidate_coinbase(&currency(), &block, 13),
            Err(ValidationError::CoinbaseWrongHeight {
                expected: 13,
                got: 12
            })
        );
    }

    #[test]
    fn coinbase_unlock_time_mismatch() {
        let block = coinbase_block(12, 1);
        assert!(matches!(
            prevalidate_coinbase(&currency(), &block, 12),
            Err(ValidationError::CoinbaseWrongUnlockTime { .. })
        ));
    }

    #[test]
    fn timestamp_median_rule() {
        let currency = currency();
        let mut block = coinbase_block(1, 0);
        let window = currency.timestamp_check_window(1);

        // Unfilled window always passes.
        block.header.timestamp = 1;
        assert_eq!(
            check_block_timestamp(&currency, &vec![100; window - 1], &block),
            Ok(())
        );

        let timestamps = vec![100; window];
        block.header.timestamp = 99;
        assert_eq!(
            check_block_timestamp(&currency, &timestamps, &block),
            Err(ValidationError::TimestampBelowMedian)
        );
        block.header.timestamp = 100;
        assert_eq!(check_block_timestamp(&currency, &timestamps, &block), Ok(()));
    }

    #[test]
    fn future_limit_rule() {
        let currency = currency();
        let mut block = coinbase_block(1, 0);
        let now = 1_600_000_000;
        block.header.timestamp = now + currency.block_future_time_limit(1);
        assert_eq!(check_timestamp_upper_bound(&currency, &block, now), Ok(()));
        block.header.timestamp += 1;
        assert_eq!(
            check_timestamp_upper_bound(&currency, &block, now),
            Err(ValidationError::TimestampTooFarInFuture)
        );
    }

    #[test]
    fn unlock_semantics_height_and_time() {
        let currency = currency();
        // Height-based: unlocked when height-1+delta reaches the target.
        assert!(is_unlocked(&currency, 10, 10, 0));
        assert!(!is_unlocked(&currency, 12, 10, 0));
        // Time-based: compared against the last block timestamp plus delta.
        let time_lock = currency.max_block_height + 1_000;
        let delta = currency.locked_tx_allowed_delta_seconds();
        assert!(is_unlocked(&currency, time_lock, 10, time_lock - delta));
        assert!(!is_unlocked(&currency, time_lock, 10, time_lock - delta - 1));
    }

    #[test]
    fn merge_mining_tag_rejected_from_v5() {
        let mut block = coinbase_block(1, 0);
        basalt_primitives::extra::append_merge_mining_tag(
            &mut block.base_transaction.extra,
            &basalt_primitives::extra::MergeMiningTag {
                depth: 0,
                merkle_root: [1; 32],
            },
        );
        assert_eq!(check_merge_mining_tag(&block), Ok(()));
        block.header.major_version = 5;
        assert_eq!(
            check_merge_mining_tag(&block),
            Err(ValidationError::MergeMiningTagForbidden)
        );
    }
}
