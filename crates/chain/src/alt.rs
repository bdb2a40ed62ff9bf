//! Alternative chain tracker.
//!
//! Alt blocks live purely in memory, keyed by hash with parent links
//! reconstructed through hash lookups; they are bounded by the reorg
//! window and cheap to re-fetch from peers after a restart.

use std::collections::BTreeMap;

use basalt_crypto::Hash256;
use basalt_primitives::Block;

#[derive(Clone, Debug)]
pub struct AltBlock {
    pub block: Block,
    pub height: u32,
    pub cumulative_difficulty: u64,
}

/// Hash keys compare by lexicographic bytes, giving the map a stable
/// total order independent of insertion.
#[derive(Default)]
pub struct AltChains {
    blocks: BTreeMap<Hash256, AltBlock>,
}

impl AltChains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: Hash256, block: AltBlock) -> bool {
        if self.blocks.contains_key(&hash) {
            return false;
        }
        self.blocks.insert(hash, block);
        true
    }

    pub fn get(&self, hash: &Hash256) -> Option<&AltBlock> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn remove(&mut self, hash: &Hash256) -> Option<AltBlock> {
        self.blocks.remove(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&Hash256, &AltBlock)> {
        self.blocks.iter()
    }

    /// Alt subchain ending at `tip_hash` (inclusive when tracked),
    /// oldest first. The first element's parent is on the main chain.
    pub fn subchain_ending_at(&self, tip_hash: &Hash256) -> Vec<Hash256> {
        let mut chain = Vec::new();
        let mut cursor = *tip_hash;
        while let Some(entry) = self.blocks.get(&cursor) {
            chain.push(cursor);
            cursor = entry.block.header.previous_block_hash;
        }
        chain.reverse();
        chain
    }
}

/// `ln P(X = k)` for `X ~ Poisson(λ)`: `−λ + k·ln λ − ln k!`.
pub fn poisson_ln(lam: f64, k: u64) -> f64 {
    if lam <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let mut logx = -lam + k as f64 * lam.ln();
    let mut i = k;
    while i > 0 {
        logx -= (i as f64).ln();
        i -= 1;
    }
    logx
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_primitives::transaction::{BaseInput, Transaction, TransactionInput};
    use basalt_primitives::BlockHeader;

    fn alt_block(height: u32, prev: Hash256) -> AltBlock {
        AltBlock {
            block: Block {
                header: BlockHeader {
                    major_version: 1,
                    minor_version: 0,
                    timestamp: height as u64,
                    previous_block_hash: prev,
                    nonce: height,
                },
                parent_block: None,
                base_transaction: Transaction {
                    version: 1,
                    unlock_time: 0,
                    inputs: vec![TransactionInput::Base(BaseInput {
                        block_index: height,
                    })],
                    outputs: vec![],
                    extra: vec![],
                    signatures: vec![vec![]],
                },
                transaction_hashes: vec![],
            },
            height,
            cumulative_difficulty: height as u64,
        }
    }

    #[test]
    fn subchain_walks_parent_links() {
        let mut chains = AltChains::new();
        let a = alt_block(5, [0xaa; 32]);
        let a_hash = a.block.hash();
        let b = alt_block(6, a_hash);
        let b_hash = b.block.hash();
        let c = alt_block(7, b_hash);
        let c_hash = c.block.hash();
        chains.insert(a_hash, a);
        chains.insert(b_hash, b);
        chains.insert(c_hash, c);

        assert_eq!(chains.subchain_ending_at(&c_hash), vec![a_hash, b_hash, c_hash]);
        assert_eq!(chains.subchain_ending_at(&a_hash), vec![a_hash]);
        assert!(chains.subchain_ending_at(&[9; 32]).is_empty());
    }

    #[test]
    fn duplicate_insert_refused() {
        let mut chains = AltChains::new();
        let block = alt_block(1, [0; 32]);
        let hash = block.block.hash();
        assert!(chains.insert(hash, block.clone()));
        assert!(!chains.insert(hash, block));
        assert_eq!(chains.len(), 1);
    }

    #[test]
    fn poisson_ln_shape() {
        // P(X=2) for λ=2 is 2·e⁻² ≈ 0.27, ln ≈ −1.3.
        let value = poisson_ln(2.0, 2);
        assert!((value - (-1.306_852)).abs() < 1e-3, "{value}");
        // Far-tail probabilities are tiny.
        assert!(poisson_ln(1.0, 50) < -100.0);
        assert_eq!(poisson_ln(0.0, 3), f64::NEG_INFINITY);
    }
}
