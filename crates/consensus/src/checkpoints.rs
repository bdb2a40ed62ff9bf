//! Pinned block hashes.

use std::collections::BTreeMap;

use basalt_crypto::Hash256;

#[derive(Clone, Debug, Default)]
pub struct Checkpoints {
    points: BTreeMap<u32, Hash256>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckpointError {
    Conflicting(u32),
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Conflicting(height) => {
                write!(f, "conflicting checkpoint at height {height}")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl Checkpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checkpoint(&mut self, height: u32, hash: Hash256) -> Result<(), CheckpointError> {
        match self.points.insert(height, hash) {
            Some(previous) if previous != hash => Err(CheckpointError::Conflicting(height)),
            _ => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Heights at or below the last checkpoint skip PoW and signature work.
    pub fn is_in_checkpoint_zone(&self, height: u32) -> bool {
        match self.points.keys().next_back() {
            Some(last) => height <= *last,
            None => false,
        }
    }

    /// `(passes, is_checkpoint)` for a block hash at a height.
    pub fn check_block(&self, height: u32, hash: &Hash256) -> (bool, bool) {
        match self.points.get(&height) {
            Some(pinned) => (pinned == hash, true),
            None => (true, false),
        }
    }

    /// An alternative block may only fork above the last checkpoint that
    /// the current chain has already reached.
    pub fn is_alternative_block_allowed(&self, tip_height: u32, block_height: u32) -> bool {
        if block_height == 0 {
            return false;
        }
        match self.points.range(..=tip_height).next_back() {
            Some((checkpoint_height, _)) => *checkpoint_height < block_height,
            None => true,
        }
    }

    pub fn checkpoint_heights(&self) -> Vec<u32> {
        self.points.keys().copied().collect()
    }
}
