//! The transaction pool contract consumed by the chain manager.

use std::collections::HashMap;

use basalt_crypto::Hash256;
use basalt_primitives::Transaction;

/// Collaborator interface. `take_transaction` removes and returns a tx
/// (called at most once per hash per append); `return_transaction`
/// restores a tx when a block fails mid-append or is popped.
pub trait TransactionPool: Send {
    fn take_transaction(&mut self, hash: &Hash256) -> Option<(Transaction, usize, u64)>;
    fn return_transaction(&mut self, tx: Transaction) -> bool;
    fn has_transaction(&self, hash: &Hash256) -> bool;
}

/// Plain in-memory pool backing tests and standalone operation.
#[derive(Default)]
pub struct MemoryPool {
    transactions: HashMap<Hash256, (Transaction, usize, u64)>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Hash256 {
        let hash = tx.hash();
        let size = tx.binary_size();
        let fee = tx
            .input_amount()
            .zip(tx.output_amount())
            .map(|(inputs, outputs)| inputs.saturating_sub(outputs))
            .unwrap_or(0);
        self.transactions.insert(hash, (tx, size, fee));
        hash
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl TransactionPool for MemoryPool {
    fn take_transaction(&mut self, hash: &Hash256) -> Option<(Transaction, usize, u64)> {
        self.transactions.remove(hash)
    }

    fn return_transaction(&mut self, tx: Transaction) -> bool {
        self.add_transaction(tx);
        true
    }

    fn has_transaction(&self, hash: &Hash256) -> bool {
        self.transactions.contains_key(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_primitives::transaction::{BaseInput, TransactionInput};

    fn sample_tx(tag: u8) -> Transaction {
        Transaction {
            version: 1,
            unlock_time: tag as u64,
            inputs: vec![TransactionInput::Base(BaseInput {
                block_index: tag as u32,
            })],
            outputs: vec![],
            extra: vec![],
            signatures: vec![vec![]],
        }
    }

    #[test]
    fn take_removes_and_return_restores() {
        let mut pool = MemoryPool::new();
        let hash = pool.add_transaction(sample_tx(1));
        assert!(pool.has_transaction(&hash));

        let (tx, _, _) = pool.take_transaction(&hash).expect("present");
        assert!(!pool.has_transaction(&hash));
        assert!(pool.take_transaction(&hash).is_none());

        pool.return_transaction(tx);
        assert!(pool.has_transaction(&hash));
    }
}
