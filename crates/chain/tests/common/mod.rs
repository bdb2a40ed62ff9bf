#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use basalt_chain::{AddBlockResult, Blockchain, MemoryPool};
use basalt_consensus::{Checkpoints, Currency, Network};
use basalt_crypto::{generate_key_image, generate_ring_signature, generate_keys, KeyPair};
use basalt_crypto::{Hash256, PublicKey};
use basalt_primitives::transaction::{
    BaseInput, KeyInput, KeyOutput, Transaction, TransactionInput, TransactionOutput,
    TransactionOutputTarget,
};
use basalt_primitives::{Block, BlockHeader};
use basalt_storage::memory::MemoryStore;

pub type TestBlockchain = Blockchain<MemoryStore, MemoryPool>;

/// Regtest currency with a short coinbase maturity so spend scenarios
/// stay small.
pub fn test_currency() -> Currency {
    let mut currency = Currency::for_network(Network::Regtest);
    currency.mined_money_unlock_window = 2;
    currency.mined_money_unlock_window_v5 = 2;
    currency
}

pub struct Node {
    pub chain: TestBlockchain,
    pub store: Arc<MemoryStore>,
    pub pool: Arc<Mutex<MemoryPool>>,
    pub currency: Currency,
}

pub fn open_node() -> Node {
    open_node_with(test_currency(), Checkpoints::new())
}

pub fn open_node_with(currency: Currency, checkpoints: Checkpoints) -> Node {
    let store = Arc::new(MemoryStore::new());
    let pool = Arc::new(Mutex::new(MemoryPool::new()));
    let chain = Blockchain::open(
        Arc::clone(&store),
        Arc::clone(&pool),
        currency.clone(),
        checkpoints,
    )
    .expect("open chain");
    Node {
        chain,
        store,
        pool,
        currency,
    }
}

/// Parent facts needed to extend any chain, main or alternative.
#[derive(Clone, Copy, Debug)]
pub struct ParentInfo {
    pub hash: Hash256,
    pub height: u32,
    pub timestamp: u64,
    pub generated: u64,
}

pub fn genesis_info(currency: &Currency) -> ParentInfo {
    let genesis = currency.genesis_block();
    ParentInfo {
        hash: genesis.hash(),
        height: 0,
        timestamp: genesis.header.timestamp,
        generated: currency.genesis_reward(),
    }
}

pub fn coinbase_for(
    currency: &Currency,
    height: u32,
    reward: u64,
    pay_to: &PublicKey,
) -> Transaction {
    let version = currency.major_version_for_height(height);
    Transaction {
        version: 1,
        unlock_time: height as u64 + currency.mined_money_unlock_window(version) as u64,
        inputs: vec![TransactionInput::Base(BaseInput {
            block_index: height,
        })],
        outputs: vec![TransactionOutput {
            amount: reward,
            target: TransactionOutputTarget::Key(KeyOutput { key: *pay_to }),
        }],
        extra: vec![],
        signatures: vec![vec![]],
    }
}

/// A valid child block of `parent` carrying the given mined tx hashes.
/// Returns the block and the parent facts for the next child.
pub fn child_block(
    currency: &Currency,
    parent: &ParentInfo,
    fee: u64,
    tx_hashes: Vec<Hash256>,
    pay_to: &PublicKey,
) -> (Block, ParentInfo) {
    child_block_at(
        currency,
        parent,
        parent.timestamp + currency.difficulty_target,
        fee,
        tx_hashes,
        pay_to,
    )
}

pub fn child_block_at(
    currency: &Currency,
    parent: &ParentInfo,
    timestamp: u64,
    fee: u64,
    tx_hashes: Vec<Hash256>,
    pay_to: &PublicKey,
) -> (Block, ParentInfo) {
    let height = parent.height + 1;
    let base_reward = (currency.money_supply - parent.generated) >> currency.emission_speed_factor;
    let block = Block {
        header: BlockHeader {
            major_version: currency.major_version_for_height(height),
            minor_version: 0,
            timestamp,
            previous_block_hash: parent.hash,
            nonce: height,
        },
        parent_block: None,
        base_transaction: coinbase_for(currency, height, base_reward + fee, pay_to),
        transaction_hashes: tx_hashes,
    };
    let info = ParentInfo {
        hash: block.hash(),
        height,
        timestamp,
        generated: parent.generated + base_reward,
    };
    (block, info)
}

impl Node {
    pub fn tip_info(&self) -> ParentInfo {
        let height = self.chain.current_height() - 1;
        let entry = self
            .chain
            .block_entry_by_height(height)
            .expect("read tip")
            .expect("tip entry");
        ParentInfo {
            hash: entry.block.hash(),
            height,
            timestamp: entry.block.header.timestamp,
            generated: entry.already_generated_coins,
        }
    }

    pub fn mine_block(&self) -> (Block, AddBlockResult) {
        self.mine_block_to(&[0x77; 32])
    }

    pub fn mine_block_to(&self, pay_to: &PublicKey) -> (Block, AddBlockResult) {
        let parent = self.tip_info();
        let (block, _) = child_block(&self.currency, &parent, 0, vec![], pay_to);
        let result = self.chain.add_block(&block).expect("add block");
        (block, result)
    }

    /// Adds the transactions to the pool and mines them into one block.
    pub fn mine_block_with_txs(&self, txs: &[Transaction]) -> (Block, AddBlockResult) {
        let parent = self.tip_info();
        let mut fee = 0u64;
        let mut hashes = Vec::with_capacity(txs.len());
        {
            let mut pool = self.pool.lock().expect("pool lock");
            for tx in txs {
                let inputs = tx.input_amount().expect("input amount");
                let outputs = tx.output_amount().expect("output amount");
                fee += inputs - outputs;
                hashes.push(pool.add_transaction(tx.clone()));
            }
        }
        let (block, _) = child_block(&self.currency, &parent, fee, hashes, &[0x77; 32]);
        let result = self.chain.add_block(&block).expect("add block");
        (block, result)
    }

    pub fn mine_blocks(&self, count: usize) -> Vec<Block> {
        (0..count)
            .map(|_| {
                let (block, result) = self.mine_block();
                assert!(result.added_to_main_chain, "mining must extend the chain");
                block
            })
            .collect()
    }
}

/// A key output the tests hold the spend key for.
pub struct OwnedOutput {
    pub keys: KeyPair,
    pub amount: u64,
    pub global_index: u32,
    pub block: Block,
}

/// Mines one block paying the full reward to a fresh key pair.
pub fn mine_owned_output(node: &Node) -> OwnedOutput {
    let keys = generate_keys(&mut rand::thread_rng());
    let (block, result) = node.mine_block_to(&keys.public);
    assert!(result.added_to_main_chain);
    let coinbase_hash = block.base_transaction.hash();
    let amount = block.base_transaction.outputs[0].amount;
    let global_index = node
        .chain
        .transaction_output_global_indexes(&coinbase_hash)
        .expect("read indexes")
        .expect("coinbase indexed")[0];
    OwnedOutput {
        keys,
        amount,
        global_index,
        block,
    }
}

/// Ring-signed spend of an owned output (ring size 1), paying
/// `amount − fee` to `pay_to`.
pub fn spend_tx(owner: &OwnedOutput, pay_to: &PublicKey, fee: u64, extra: Vec<u8>) -> Transaction {
    let key_image =
        generate_key_image(&owner.keys.public, &owner.keys.secret).expect("key image");
    let mut tx = Transaction {
        version: 1,
        unlock_time: 0,
        inputs: vec![TransactionInput::Key(KeyInput {
            amount: owner.amount,
            output_indexes: vec![owner.global_index],
            key_image,
        })],
        outputs: vec![TransactionOutput {
            amount: owner.amount - fee,
            target: TransactionOutputTarget::Key(KeyOutput { key: *pay_to }),
        }],
        extra,
        signatures: vec![vec![]],
    };
    let prefix_hash = tx.prefix_hash();
    let signatures = generate_ring_signature(
        &prefix_hash,
        &key_image,
        &[owner.keys.public],
        &owner.keys.secret,
        0,
        &mut rand::thread_rng(),
    )
    .expect("ring signature");
    tx.signatures = vec![signatures];
    tx
}
