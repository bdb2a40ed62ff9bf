//! Proof-of-work checks against a 256-bit target.

use basalt_crypto::{fast_hash, Hash256};
use basalt_primitives::Block;
use primitive_types::U256;

use crate::difficulty::Difficulty;

/// Proof hash of a block's hashing blob.
///
/// The chain only ever compares this value against the difficulty target;
/// a deployment swaps in its memory-hard hash here.
pub fn proof_of_work_hash(block: &Block) -> Hash256 {
    fast_hash(&block.hashing_blob())
}

/// `hash · difficulty ≤ 2²⁵⁶ − 1`, i.e. the hash is below the target for
/// this difficulty. Zero difficulty never passes.
pub fn check_hash(hash: &Hash256, difficulty: Difficulty) -> bool {
    if difficulty == 0 {
        return false;
    }
    U256::from_little_endian(hash)
        .checked_mul(U256::from(difficulty))
        .is_some()
}

pub fn check_proof_of_work(block: &Block, difficulty: Difficulty) -> bool {
    check_hash(&proof_of_work_hash(block), difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_one_accepts_any_hash() {
        assert!(check_hash(&[0xff; 32], 1));
        assert!(check_hash(&[0x00; 32], 1));
    }

    #[test]
    fn zero_difficulty_rejects() {
        assert!(!check_hash(&[0x00; 32], 0));
    }

    #[test]
    fn high_hash_fails_high_difficulty() {
        assert!(!check_hash(&[0xff; 32], 2));
    }

    #[test]
    fn threshold_is_exact() {
        // hash = 2^255 − 1: passes difficulty 2, fails 3.
        let mut hash = [0xff; 32];
        hash[31] = 0x7f;
        assert!(check_hash(&hash, 2));
        assert!(!check_hash(&hash, 3));

        // One more fails difficulty 2.
        let mut above = [0u8; 32];
        above[31] = 0x80;
        assert!(!check_hash(&above, 2));
    }

    #[test]
    fn low_hash_passes_large_difficulty() {
        let mut hash = [0u8; 32];
        hash[0] = 1;
        assert!(check_hash(&hash, u64::MAX));
    }
}
