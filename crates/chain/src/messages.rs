//! Chain event messages.
//!
//! Subscribers register a channel sender. Events are queued in
//! registration order only after the triggering operation has committed;
//! receivers drain their queues outside the chain lock.

use basalt_crypto::Hash256;
use crossbeam_channel::Sender;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BlockchainMessage {
    NewBlock {
        hash: Hash256,
    },
    NewAlternativeBlock {
        hash: Hash256,
    },
    /// The first hash of `new_tip_chain` is the lowest switched-in block;
    /// `common_ancestor` is the last block both chains share.
    ChainSwitch {
        common_ancestor: Hash256,
        new_tip_chain: Vec<Hash256>,
    },
}

#[derive(Default)]
pub struct MessageQueueList {
    queues: Vec<Sender<BlockchainMessage>>,
}

impl MessageQueueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_queue(&mut self, sender: Sender<BlockchainMessage>) {
        self.queues.push(sender);
    }

    pub fn send(&mut self, message: &BlockchainMessage) {
        // Disconnected receivers are dropped from the list.
        self.queues
            .retain(|queue| queue.send(message.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn delivers_in_registration_order() {
        let mut list = MessageQueueList::new();
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        list.add_queue(tx_a);
        list.add_queue(tx_b);

        let message = BlockchainMessage::NewBlock { hash: [1; 32] };
        list.send(&message);
        assert_eq!(rx_a.try_recv().unwrap(), message);
        assert_eq!(rx_b.try_recv().unwrap(), message);
    }

    #[test]
    fn dropped_receiver_is_pruned() {
        let mut list = MessageQueueList::new();
        let (tx, rx) = unbounded();
        list.add_queue(tx);
        drop(rx);
        list.send(&BlockchainMessage::NewBlock { hash: [2; 32] });
        // A second send sees an empty queue list and does not panic.
        list.send(&BlockchainMessage::NewBlock { hash: [3; 32] });
    }
}
