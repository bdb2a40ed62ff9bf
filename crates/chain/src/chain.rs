//! The canonical chain manager.
//!
//! Single writer, many readers: every mutating operation takes the pool
//! lock (when it touches the pool) and then the chain lock, in that
//! order. Each append or pop accumulates its index mutations in an
//! overlay and commits them in one write batch; the in-memory tip only
//! advances after the batch is durable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use basalt_consensus::{format_amount, get_block_reward, Checkpoints, Currency};
use basalt_crypto::{check_ring_signature, key_image_in_domain, Hash256, KeyImage, PublicKey, NULL_HASH};
use basalt_log::{log_debug, log_error, log_info, log_warn};
use basalt_pow::{check_proof_of_work, next_difficulty};
use basalt_primitives::encoding::{decode, DecodeError};
use basalt_primitives::extra::extra_payment_id;
use basalt_primitives::transaction::{
    relative_output_offsets_to_absolute, Transaction, TransactionInput, TransactionOutputTarget,
};
use basalt_primitives::Block;
use basalt_storage::{Column, KeyValueStore, StoreError, WriteBatch};
use crossbeam_channel::Sender;
use rand::Rng;

use crate::alt::{poisson_ln, AltBlock, AltChains};
use crate::blockindex;
use crate::entry::{BlockEntry, TransactionEntry, TransactionIndex};
use crate::messages::{BlockchainMessage, MessageQueueList};
use crate::outputs::{self, MultisignatureOutputEntry, MultisignatureOutputUsage, OutputsEntry};
use crate::paymentids;
use crate::pool::TransactionPool;
use crate::spentindex;
use crate::timestamps;
use crate::txindex;
use crate::validation;

const DB_VERSION: &str = "1";

#[derive(Debug)]
pub enum ChainError {
    Store(StoreError),
    Decode(DecodeError),
    ConsistencyBroken(&'static str),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::Store(err) => write!(f, "{err}"),
            ChainError::Decode(err) => write!(f, "{err}"),
            ChainError::ConsistencyBroken(message) => {
                write!(f, "blockchain consistency broken: {message}")
            }
        }
    }
}

impl std::error::Error for ChainError {}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        ChainError::Store(err)
    }
}

impl From<DecodeError> for ChainError {
    fn from(err: DecodeError) -> Self {
        ChainError::Decode(err)
    }
}

/// Outcome flags of [`Blockchain::add_block`]. Validation failures are
/// reported here, never as errors.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AddBlockResult {
    pub added_to_main_chain: bool,
    pub added_as_alternative: bool,
    pub already_exists: bool,
    pub marked_as_orphaned: bool,
    pub switched_to_alt_chain: bool,
    pub verification_failed: bool,
}

/// Cache record for the pool's repeated input checks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockInfo {
    pub height: u32,
    pub id: Hash256,
}

impl BlockInfo {
    pub fn is_empty(&self) -> bool {
        self.id == NULL_HASH
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RandomAmountOutputs {
    pub amount: u64,
    /// `(global index, output key)` pairs.
    pub outputs: Vec<(u32, PublicKey)>,
}

struct ChainInner {
    alternative_chains: AltChains,
    current_block_size_limit: u64,
    last_generated_tx_count: u64,
    message_queues: MessageQueueList,
}

/// Read-your-writes overlay for the per-amount indexes while a block is
/// being appended or popped. Final entry states land in the write batch
/// in one pass.
#[derive(Default)]
struct IndexOverlay {
    outputs: HashMap<u64, OutputsEntry>,
    multisig: HashMap<u64, MultisignatureOutputEntry>,
}

impl IndexOverlay {
    fn write_into(&self, batch: &mut WriteBatch) {
        for (amount, entry) in &self.outputs {
            let key = outputs::amount_key(*amount).to_vec();
            if entry.outputs.is_empty() {
                batch.delete(Column::Outputs, key);
            } else {
                batch.put(Column::Outputs, key, entry.encode_bytes());
            }
        }
        for (amount, entry) in &self.multisig {
            let key = outputs::amount_key(*amount).to_vec();
            if entry.outputs.is_empty() {
                batch.delete(Column::MultisignatureOutputs, key);
            } else {
                batch.put(Column::MultisignatureOutputs, key, entry.encode_bytes());
            }
        }
    }
}

/// State of one in-progress append. Dropping it undoes every
/// partially-pushed transaction, since nothing has touched the store yet.
struct AppendState {
    height: u32,
    overlay: IndexOverlay,
    spent_images: HashMap<KeyImage, u32>,
    tx_indexes: HashMap<Hash256, TransactionIndex>,
    payment_ids: HashMap<Hash256, paymentids::PaymentIdEntry>,
    entries: Vec<TransactionEntry>,
}

impl AppendState {
    fn new(height: u32) -> Self {
        Self {
            height,
            overlay: IndexOverlay::default(),
            spent_images: HashMap::new(),
            tx_indexes: HashMap::new(),
            payment_ids: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

pub struct Blockchain<S: KeyValueStore, P: TransactionPool> {
    store: Arc<S>,
    pool: Arc<Mutex<P>>,
    currency: Currency,
    checkpoints: Checkpoints,
    /// Blockchain height including the genesis block; tail height + 1.
    height: AtomicU32,
    inner: Mutex<ChainInner>,
}

impl<S: KeyValueStore, P: TransactionPool> Blockchain<S, P> {
    pub fn open(
        store: Arc<S>,
        pool: Arc<Mutex<P>>,
        currency: Currency,
        checkpoints: Checkpoints,
    ) -> Result<Self, ChainError> {
        match store.get(Column::Meta, b"version")? {
            None => {
                if blockindex::tail(&*store)?.is_some() {
                    return Err(ChainError::ConsistencyBroken(
                        "store holds chain data but no schema version",
                    ));
                }
                store.put(Column::Meta, b"version", DB_VERSION.as_bytes())?;
            }
            Some(version) => {
                if version != DB_VERSION.as_bytes() {
                    return Err(ChainError::ConsistencyBroken("unsupported schema version"));
                }
            }
        }

        let height = match blockindex::tail(&*store)? {
            Some((tail_height, _)) => tail_height + 1,
            None => 0,
        };
        let last_generated_tx_count = timestamps::last_generated_transactions(&*store)?;

        let chain = Self {
            store,
            pool,
            currency,
            checkpoints,
            height: AtomicU32::new(height),
            inner: Mutex::new(ChainInner {
                alternative_chains: AltChains::new(),
                current_block_size_limit: 0,
                last_generated_tx_count,
                message_queues: MessageQueueList::new(),
            }),
        };

        if height == 0 {
            log_info!("empty chain store, pushing genesis block");
            let genesis = chain.currency.genesis_block();
            let genesis_hash = genesis.hash();
            let pool = Arc::clone(&chain.pool);
            let mut pool_guard = pool.lock().expect("pool lock");
            let mut inner = chain.inner.lock().expect("chain lock");
            let mut result = AddBlockResult::default();
            let pushed = chain.push_block(
                &mut inner,
                &mut *pool_guard,
                &genesis,
                &genesis_hash,
                &mut result,
            )?;
            if !pushed {
                return Err(ChainError::ConsistencyBroken("failed to add genesis block"));
            }
        } else {
            let stored_genesis = blockindex::block_hash_at(&*chain.store, 0)?;
            if stored_genesis != Some(chain.currency.genesis_block_hash()) {
                return Err(ChainError::ConsistencyBroken(
                    "stored genesis does not match the configured currency",
                ));
            }
            chain.revalidate_checkpoints()?;
        }

        {
            let mut inner = chain.inner.lock().expect("chain lock");
            chain.update_size_limit(&mut inner)?;
        }
        log_info!(
            "blockchain initialized, height {}, tail {}",
            chain.height.load(Ordering::Relaxed),
            hex_prefix(&chain.tail_id()?)
        );
        Ok(chain)
    }

    /// Roll back to the last checkpoint the stored chain still satisfies.
    fn revalidate_checkpoints(&self) -> Result<(), ChainError> {
        let mut last_valid = 0u32;
        let mut broken = false;
        for checkpoint_height in self.checkpoints.checkpoint_heights() {
            if self.height.load(Ordering::Relaxed) <= checkpoint_height {
                break;
            }
            let hash = blockindex::block_hash_at(&*self.store, checkpoint_height)?
                .ok_or(ChainError::ConsistencyBroken("missing checkpointed block"))?;
            let (ok, _) = self.checkpoints.check_block(checkpoint_height, &hash);
            if ok {
                last_valid = checkpoint_height;
            } else {
                broken = true;
                break;
            }
        }
        if broken {
            log_warn!("invalid checkpoint found, rolling chain back to height {last_valid}");
            self.rollback_to(last_valid)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public mutators
    // ------------------------------------------------------------------

    /// Single entry point for candidate blocks.
    pub fn add_block(&self, block: &Block) -> Result<AddBlockResult, ChainError> {
        let block_hash = block.hash();
        let mut result = AddBlockResult::default();

        // Pool first, chain second; this order holds everywhere.
        let pool = Arc::clone(&self.pool);
        let mut pool_guard = pool.lock().expect("pool lock");
        let mut inner = self.inner.lock().expect("chain lock");

        if self.is_known_block(&inner, &block_hash)? {
            result.already_exists = true;
            return Ok(result);
        }

        if block.header.previous_block_hash != self.tail_id()? {
            self.handle_alternative(
                &mut inner,
                &mut *pool_guard,
                block,
                &block_hash,
                true,
                &mut result,
            )?;
        } else {
            let pushed =
                self.push_block(&mut inner, &mut *pool_guard, block, &block_hash, &mut result)?;
            if pushed {
                inner
                    .message_queues
                    .send(&BlockchainMessage::NewBlock { hash: block_hash });
            }
        }
        Ok(result)
    }

    /// Decodes and adds a block; malformed bytes are a verification
    /// failure, not an error.
    pub fn add_raw_block(&self, bytes: &[u8]) -> Result<AddBlockResult, ChainError> {
        match decode::<Block>(bytes) {
            Ok(block) => self.add_block(&block),
            Err(err) => {
                log_info!("rejecting undecodable block: {err}");
                Ok(AddBlockResult {
                    verification_failed: true,
                    ..AddBlockResult::default()
                })
            }
        }
    }

    /// Pops every block strictly above `height`, newest first.
    pub fn rollback_to(&self, height: u32) -> Result<(), ChainError> {
        let pool = Arc::clone(&self.pool);
        let mut pool_guard = pool.lock().expect("pool lock");
        let mut inner = self.inner.lock().expect("chain lock");
        while self.height.load(Ordering::Relaxed) > height + 1 {
            self.pop_block(&mut inner, &mut *pool_guard)?;
        }
        Ok(())
    }

    /// Wipes the store and restarts the chain from the given genesis.
    pub fn reset_and_set_genesis(&self, genesis: &Block) -> Result<bool, ChainError> {
        let genesis_hash = genesis.hash();
        let pool = Arc::clone(&self.pool);
        let mut pool_guard = pool.lock().expect("pool lock");
        let mut inner = self.inner.lock().expect("chain lock");

        let mut batch = WriteBatch::new();
        for column in Column::ALL {
            if column == Column::Meta {
                continue;
            }
            self.store.for_each_forward(column, None, &mut |key, _| {
                batch.delete(column, key.to_vec());
                Ok(true)
            })?;
        }
        self.store.write_batch(&batch)?;

        self.height.store(0, Ordering::Relaxed);
        inner.alternative_chains.clear();
        inner.last_generated_tx_count = 0;
        inner.current_block_size_limit = 0;

        let mut result = AddBlockResult::default();
        let pushed = self.push_block(
            &mut inner,
            &mut *pool_guard,
            genesis,
            &genesis_hash,
            &mut result,
        )?;
        if pushed {
            inner
                .message_queues
                .send(&BlockchainMessage::NewBlock { hash: genesis_hash });
        }
        Ok(pushed && !result.verification_failed)
    }

    pub fn add_message_queue(&self, sender: Sender<BlockchainMessage>) {
        let mut inner = self.inner.lock().expect("chain lock");
        inner.message_queues.add_queue(sender);
    }

    // ------------------------------------------------------------------
    // Append
    // ------------------------------------------------------------------

    fn push_block(
        &self,
        inner: &mut ChainInner,
        pool: &mut P,
        block: &Block,
        block_hash: &Hash256,
        result: &mut AddBlockResult,
    ) -> Result<bool, ChainError> {
        let transactions = match self.load_transactions(pool, block) {
            Some(transactions) => transactions,
            None => {
                log_info!(
                    "block {} refers to transactions missing from the pool",
                    hex_prefix(block_hash)
                );
                result.verification_failed = true;
                return Ok(false);
            }
        };

        let pushed =
            self.push_block_with_transactions(inner, block, &transactions, block_hash, result);
        match pushed {
            Ok(true) => Ok(true),
            other => {
                self.return_transactions(pool, transactions);
                other
            }
        }
    }

    fn push_block_with_transactions(
        &self,
        inner: &mut ChainInner,
        block: &Block,
        transactions: &[Transaction],
        block_hash: &Hash256,
        result: &mut AddBlockResult,
    ) -> Result<bool, ChainError> {
        let height = self.height.load(Ordering::Relaxed);

        if let Err(err) = validation::check_block_version(&self.currency, block, height) {
            log_info!("block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }
        if let Err(err) = validation::check_parent_block(block) {
            log_info!("block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }
        if let Err(err) = validation::check_merge_mining_tag(block) {
            log_error!("block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }

        let tail = blockindex::tail(&*self.store)?;
        let tail_entry = match &tail {
            Some((_, tail_hash)) => {
                if block.header.previous_block_hash != *tail_hash {
                    log_info!(
                        "block {} does not extend the tail {}",
                        hex_prefix(block_hash),
                        hex_prefix(tail_hash)
                    );
                    result.verification_failed = true;
                    return Ok(false);
                }
                Some(
                    blockindex::block_entry(&*self.store, tail_hash)?
                        .ok_or(ChainError::ConsistencyBroken("tail entry missing"))?,
                )
            }
            None => {
                if block.header.previous_block_hash != NULL_HASH {
                    result.verification_failed = true;
                    return Ok(false);
                }
                None
            }
        };

        let in_checkpoint_zone = self.checkpoints.is_in_checkpoint_zone(height);

        if !in_checkpoint_zone {
            if let Err(err) =
                validation::check_timestamp_upper_bound(&self.currency, block, adjusted_time())
            {
                log_info!("block {}: {err}", hex_prefix(block_hash));
                result.verification_failed = true;
                return Ok(false);
            }
            let window = self
                .currency
                .timestamp_check_window(block.header.major_version);
            let recent = self.last_block_timestamps(height, window)?;
            if let Err(err) = validation::check_block_timestamp(&self.currency, &recent, block) {
                log_info!("block {}: {err}", hex_prefix(block_hash));
                result.verification_failed = true;
                return Ok(false);
            }
        }

        let difficulty = self.next_block_difficulty()?;
        if difficulty == 0 {
            log_error!("difficulty overflow computing target for height {height}");
            result.verification_failed = true;
            return Ok(false);
        }

        if in_checkpoint_zone {
            let (ok, _) = self.checkpoints.check_block(height, block_hash);
            if !ok {
                log_error!("checkpoint validation failed at height {height}");
                result.verification_failed = true;
                return Ok(false);
            }
        } else if !check_proof_of_work(block, difficulty) {
            log_info!(
                "block {} has too weak proof of work for difficulty {difficulty}",
                hex_prefix(block_hash)
            );
            result.verification_failed = true;
            return Ok(false);
        }

        if !in_checkpoint_zone {
            if let Err(err) = validation::prevalidate_coinbase(&self.currency, block, height) {
                log_info!("block {}: {err}", hex_prefix(block_hash));
                result.verification_failed = true;
                return Ok(false);
            }
        }

        if block.transaction_hashes.len() != transactions.len() {
            result.verification_failed = true;
            return Ok(false);
        }

        let mut state = AppendState::new(height);
        let coinbase_hash = block.base_transaction.hash();
        if let Err(reason) = self.push_transaction(&mut state, &block.base_transaction, &coinbase_hash)
        {
            log_error!("block {}: {reason}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }

        let mut cumulative_size = block.base_transaction.binary_size() as u64;
        let mut fee_summary = 0u64;
        for (tx, tx_hash) in transactions.iter().zip(&block.transaction_hashes) {
            let (Some(inputs), Some(outputs)) = (tx.input_amount(), tx.output_amount()) else {
                log_info!("transaction {} overflows amounts", hex_prefix(tx_hash));
                result.verification_failed = true;
                return Ok(false);
            };
            if inputs < outputs {
                log_info!(
                    "transaction {} outputs exceed inputs",
                    hex_prefix(tx_hash)
                );
                result.verification_failed = true;
                return Ok(false);
            }
            let fee = inputs - outputs;

            if !in_checkpoint_zone {
                let prefix_hash = tx.prefix_hash();
                let mut max_used = 0u32;
                if !self.check_inputs_impl(Some(&state), tx, &prefix_hash, &mut max_used)? {
                    log_info!(
                        "block {} has a transaction with invalid inputs: {}",
                        hex_prefix(block_hash),
                        hex_prefix(tx_hash)
                    );
                    result.verification_failed = true;
                    return Ok(false);
                }
            }
            if let Err(reason) = self.push_transaction(&mut state, tx, tx_hash) {
                log_info!("transaction {}: {reason}", hex_prefix(tx_hash));
                result.verification_failed = true;
                return Ok(false);
            }

            cumulative_size += tx.binary_size() as u64;
            fee_summary += fee;
        }

        if let Err(err) = validation::check_cumulative_size(&self.currency, cumulative_size, height)
        {
            log_info!("block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }

        let already_generated = tail_entry
            .as_ref()
            .map(|entry| entry.already_generated_coins)
            .unwrap_or(0);
        let emission_change = if in_checkpoint_zone {
            0i64
        } else {
            let sizes = self.last_block_sizes(self.currency.reward_blocks_window)?;
            let median_size = validation::median(&sizes) as usize;
            let (reward, emission_change) = match get_block_reward(
                &self.currency,
                block.header.major_version,
                median_size,
                cumulative_size as usize,
                already_generated,
                fee_summary,
            ) {
                Ok(values) => values,
                Err(err) => {
                    log_info!("block {}: {err}", hex_prefix(block_hash));
                    result.verification_failed = true;
                    return Ok(false);
                }
            };
            let miner_reward = block.base_transaction.output_amount().unwrap_or(u64::MAX);
            if miner_reward != reward {
                log_error!(
                    "coinbase of block {} pays {}, block reward is {}",
                    hex_prefix(block_hash),
                    format_amount(miner_reward),
                    format_amount(reward)
                );
                result.verification_failed = true;
                return Ok(false);
            }
            emission_change
        };

        let cumulative_difficulty = tail_entry
            .as_ref()
            .map(|entry| entry.cumulative_difficulty)
            .unwrap_or(0)
            .checked_add(difficulty)
            .ok_or(ChainError::ConsistencyBroken("cumulative difficulty overflow"))?;
        let already_generated_coins = already_generated
            .checked_add_signed(emission_change)
            .ok_or(ChainError::ConsistencyBroken("generated coins overflow"))?;

        let entry = BlockEntry {
            block: block.clone(),
            height,
            block_cumulative_size: cumulative_size,
            cumulative_difficulty,
            already_generated_coins,
            transactions: std::mem::take(&mut state.entries),
        };

        let mut batch = WriteBatch::new();
        batch.put(
            Column::Blocks,
            blockindex::block_key(block_hash),
            entry.encode_bytes(),
        );
        blockindex::put(&mut batch, height, block_hash);
        timestamps::push_block(
            &*self.store,
            &mut batch,
            block.header.timestamp,
            height,
            block_hash,
        )?;
        let new_generated =
            inner.last_generated_tx_count + 1 + block.transaction_hashes.len() as u64;
        if height > 0 {
            timestamps::put_generated(&mut batch, height, new_generated);
        }
        for (tx_hash, index) in &state.tx_indexes {
            txindex::put(&mut batch, tx_hash, *index);
        }
        for (key_image, spent_height) in &state.spent_images {
            spentindex::put(&mut batch, key_image, *spent_height);
        }
        for (payment_id, entry) in &state.payment_ids {
            batch.put(Column::PaymentIds, payment_id, entry.encode_bytes());
        }
        state.overlay.write_into(&mut batch);

        self.store.write_batch(&batch)?;

        self.height.store(height + 1, Ordering::Relaxed);
        if height > 0 {
            inner.last_generated_tx_count = new_generated;
        }
        self.update_size_limit(inner)?;

        log_debug!(
            "block {} added at height {height}, difficulty {difficulty}, fees {}",
            hex_prefix(block_hash),
            format_amount(fee_summary)
        );
        result.added_to_main_chain = true;
        Ok(true)
    }

    /// Applies one transaction's index mutations to the append overlay.
    fn push_transaction(
        &self,
        state: &mut AppendState,
        tx: &Transaction,
        tx_hash: &Hash256,
    ) -> Result<(), &'static str> {
        if state.tx_indexes.contains_key(tx_hash)
            || txindex::contains(&*self.store, tx_hash).map_err(|_| "store failure")?
        {
            return Err("duplicate transaction pushed to the blockchain");
        }

        // No two inputs of one tx may consume the same multisig output.
        let mut consumed = HashSet::new();
        for input in &tx.inputs {
            if let TransactionInput::Multisignature(input) = input {
                if !consumed.insert((input.amount, input.output_index)) {
                    return Err("transaction double-spends a multisignature output");
                }
            }
        }

        for input in &tx.inputs {
            match input {
                TransactionInput::Key(input) => {
                    let spent_in_store = spentindex::is_spent(&*self.store, &input.key_image)
                        .map_err(|_| "store failure")?;
                    if spent_in_store || state.spent_images.contains_key(&input.key_image) {
                        return Err("key image already spent");
                    }
                    state.spent_images.insert(input.key_image, state.height);
                }
                TransactionInput::Multisignature(input) => {
                    let entry = self
                        .overlay_multisig_entry(&mut state.overlay, input.amount)
                        .map_err(|_| "store failure")?;
                    let usage = entry
                        .outputs
                        .get_mut(input.output_index as usize)
                        .ok_or("multisignature input references unknown output")?;
                    if usage.is_used {
                        return Err("multisignature output is already used");
                    }
                    usage.is_used = true;
                }
                TransactionInput::Base(_) => {}
            }
        }

        let transaction_index = TransactionIndex {
            block: state.height,
            transaction: state.entries.len() as u16,
        };

        let mut global_output_indexes = Vec::with_capacity(tx.outputs.len());
        for (position, output) in tx.outputs.iter().enumerate() {
            match &output.target {
                TransactionOutputTarget::Key(_) => {
                    let entry = self
                        .overlay_outputs_entry(&mut state.overlay, output.amount)
                        .map_err(|_| "store failure")?;
                    global_output_indexes.push(entry.outputs.len() as u32);
                    entry.outputs.push((transaction_index, position as u16));
                }
                TransactionOutputTarget::Multisignature(_) => {
                    let entry = self
                        .overlay_multisig_entry(&mut state.overlay, output.amount)
                        .map_err(|_| "store failure")?;
                    global_output_indexes.push(entry.outputs.len() as u32);
                    entry.outputs.push(MultisignatureOutputUsage {
                        transaction_index,
                        output_index: position as u16,
                        is_used: false,
                    });
                }
            }
        }

        if let Some(payment_id) = extra_payment_id(&tx.extra) {
            if !state.payment_ids.contains_key(&payment_id) {
                let loaded = paymentids::get(&*self.store, &payment_id)
                    .map_err(|_| "store failure")?
                    .unwrap_or_default();
                state.payment_ids.insert(payment_id, loaded);
            }
            state
                .payment_ids
                .get_mut(&payment_id)
                .expect("just inserted")
                .transaction_hashes
                .push(*tx_hash);
        }

        state.tx_indexes.insert(*tx_hash, transaction_index);
        state.entries.push(TransactionEntry {
            tx: tx.clone(),
            global_output_indexes,
        });
        Ok(())
    }

    fn overlay_outputs_entry<'a>(
        &self,
        overlay: &'a mut IndexOverlay,
        amount: u64,
    ) -> Result<&'a mut OutputsEntry, ChainError> {
        if !overlay.outputs.contains_key(&amount) {
            let loaded = outputs::key_outputs(&*self.store, amount)?.unwrap_or_default();
            overlay.outputs.insert(amount, loaded);
        }
        Ok(overlay.outputs.get_mut(&amount).expect("just inserted"))
    }

    fn overlay_multisig_entry<'a>(
        &self,
        overlay: &'a mut IndexOverlay,
        amount: u64,
    ) -> Result<&'a mut MultisignatureOutputEntry, ChainError> {
        if !overlay.multisig.contains_key(&amount) {
            let loaded = outputs::multisignature_outputs(&*self.store, amount)?.unwrap_or_default();
            overlay.multisig.insert(amount, loaded);
        }
        Ok(overlay.multisig.get_mut(&amount).expect("just inserted"))
    }

    fn load_transactions(&self, pool: &mut P, block: &Block) -> Option<Vec<Transaction>> {
        let mut transactions = Vec::with_capacity(block.transaction_hashes.len());
        for tx_hash in &block.transaction_hashes {
            match pool.take_transaction(tx_hash) {
                Some((tx, _, _)) => transactions.push(tx),
                None => {
                    self.return_transactions(pool, transactions);
                    return None;
                }
            }
        }
        Some(transactions)
    }

    fn return_transactions(&self, pool: &mut P, transactions: Vec<Transaction>) {
        for tx in transactions.into_iter().rev() {
            if !pool.return_transaction(tx) {
                log_warn!("failed to restore a transaction to the pool");
            }
        }
    }

    // ------------------------------------------------------------------
    // Pop
    // ------------------------------------------------------------------

    /// Removes the tail block, restoring every index field the matching
    /// append set; its mined transactions go back to the pool.
    fn pop_block(&self, inner: &mut ChainInner, pool: &mut P) -> Result<Block, ChainError> {
        let (tail_height, tail_hash) = blockindex::tail(&*self.store)?
            .ok_or(ChainError::ConsistencyBroken("attempt to pop from an empty chain"))?;
        let entry = blockindex::block_entry(&*self.store, &tail_hash)?
            .ok_or(ChainError::ConsistencyBroken("tail entry missing"))?;

        let mut batch = WriteBatch::new();
        let mut overlay = IndexOverlay::default();

        // Non-coinbase transactions in reverse order, the coinbase last.
        for position in (1..entry.transactions.len()).rev() {
            let tx_hash = entry.block.transaction_hashes[position - 1];
            self.pop_transaction(
                &mut overlay,
                &mut batch,
                &entry.transactions[position].tx,
                &tx_hash,
            )?;
        }
        let coinbase_hash = entry.block.base_transaction.hash();
        self.pop_transaction(
            &mut overlay,
            &mut batch,
            &entry.block.base_transaction,
            &coinbase_hash,
        )?;

        overlay.write_into(&mut batch);
        timestamps::pop_block(
            &*self.store,
            &mut batch,
            entry.block.header.timestamp,
            &tail_hash,
        )?;
        if tail_height > 0 {
            timestamps::delete_generated(&mut batch, tail_height);
        }
        batch.delete(Column::Blocks, blockindex::block_key(&tail_hash));
        blockindex::delete(&mut batch, tail_height);

        self.store.write_batch(&batch)?;

        self.height.store(tail_height, Ordering::Relaxed);
        inner.last_generated_tx_count = timestamps::last_generated_transactions(&*self.store)?;
        self.update_size_limit(inner)?;

        // Mined transactions return to the pool in reverse block order.
        for tx_entry in entry.transactions[1..].iter().rev() {
            if !pool.return_transaction(tx_entry.tx.clone()) {
                log_warn!("failed to return a popped transaction to the pool");
            }
        }
        log_debug!(
            "popped block {} at height {tail_height}",
            hex_prefix(&tail_hash)
        );
        Ok(entry.block)
    }

    fn pop_transaction(
        &self,
        overlay: &mut IndexOverlay,
        batch: &mut WriteBatch,
        tx: &Transaction,
        tx_hash: &Hash256,
    ) -> Result<(), ChainError> {
        let Some(transaction_index) = txindex::get(&*self.store, tx_hash)? else {
            log_error!("consistency broken: no index entry for popped transaction");
            return Ok(());
        };

        for position in (0..tx.outputs.len()).rev() {
            let output = &tx.outputs[position];
            match &output.target {
                TransactionOutputTarget::Key(_) => {
                    let entry = self.overlay_outputs_entry(overlay, output.amount)?;
                    match entry.outputs.last().copied() {
                        Some((index, out_position))
                            if index == transaction_index
                                && out_position as usize == position =>
                        {
                            entry.outputs.pop();
                        }
                        _ => {
                            log_error!(
                                "consistency broken: output index tail mismatch for amount {}",
                                output.amount
                            );
                        }
                    }
                }
                TransactionOutputTarget::Multisignature(_) => {
                    let entry = self.overlay_multisig_entry(overlay, output.amount)?;
                    match entry.outputs.last().copied() {
                        Some(usage)
                            if usage.transaction_index == transaction_index
                                && usage.output_index as usize == position
                                && !usage.is_used =>
                        {
                            entry.outputs.pop();
                        }
                        _ => {
                            log_error!(
                                "consistency broken: multisig output tail mismatch for amount {}",
                                output.amount
                            );
                        }
                    }
                }
            }
        }

        for input in &tx.inputs {
            match input {
                TransactionInput::Key(input) => {
                    if !spentindex::is_spent(&*self.store, &input.key_image)? {
                        log_error!("consistency broken: popped key image was not spent");
                    }
                    spentindex::delete(batch, &input.key_image);
                }
                TransactionInput::Multisignature(input) => {
                    let entry = self.overlay_multisig_entry(overlay, input.amount)?;
                    match entry.outputs.get_mut(input.output_index as usize) {
                        Some(usage) if usage.is_used => usage.is_used = false,
                        Some(_) => {
                            log_error!(
                                "consistency broken: multisig output was not marked used"
                            );
                        }
                        None => {
                            log_error!("consistency broken: multisig output index out of range");
                        }
                    }
                }
                TransactionInput::Base(_) => {}
            }
        }

        if let Some(payment_id) = extra_payment_id(&tx.extra) {
            paymentids::pop_transaction(&*self.store, batch, &payment_id, tx_hash)?;
        }
        txindex::delete(batch, tx_hash);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Alternative chains & reorg
    // ------------------------------------------------------------------

    fn handle_alternative(
        &self,
        inner: &mut ChainInner,
        pool: &mut P,
        block: &Block,
        block_hash: &Hash256,
        send_message: bool,
        result: &mut AddBlockResult,
    ) -> Result<bool, ChainError> {
        let current_height = self.height.load(Ordering::Relaxed);
        let Some(claimed_height) = block.coinbase_height().filter(|height| *height > 0) else {
            log_info!(
                "alternative block {} has a malformed coinbase height",
                hex_prefix(block_hash)
            );
            result.verification_failed = true;
            return Ok(false);
        };

        if !self
            .checkpoints
            .is_alternative_block_allowed(current_height, claimed_height)
        {
            log_info!(
                "alternative block {} at height {claimed_height} not allowed below checkpoints",
                hex_prefix(block_hash)
            );
            result.verification_failed = true;
            return Ok(false);
        }

        if let Err(err) = validation::check_block_version(&self.currency, block, claimed_height) {
            log_info!("alternative block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }
        if let Err(err) = validation::check_parent_block(block) {
            log_info!("alternative block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }
        if let Err(err) = validation::check_merge_mining_tag(block) {
            log_error!("alternative block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }

        let prev_hash = block.header.previous_block_hash;
        let main_prev = blockindex::block_entry(&*self.store, &prev_hash)?;
        let alt_prev_height = inner.alternative_chains.get(&prev_hash).map(|alt| alt.height);

        if main_prev.is_none() && alt_prev_height.is_none() {
            log_info!(
                "block {} recognized as orphaned and rejected",
                hex_prefix(block_hash)
            );
            result.marked_as_orphaned = true;
            return Ok(false);
        }

        // Reconstruct the alt subchain back to the main chain.
        let alt_chain = inner.alternative_chains.subchain_ending_at(&prev_hash);
        let mut timestamps_window: Vec<u64> = alt_chain
            .iter()
            .filter_map(|hash| inner.alternative_chains.get(hash))
            .map(|alt| alt.block.header.timestamp)
            .collect();

        let connect_height = if let Some(front_hash) = alt_chain.first() {
            let front = inner
                .alternative_chains
                .get(front_hash)
                .expect("subchain members are tracked");
            if current_height <= front.height {
                log_error!("alternative subchain starts past the main chain");
                result.verification_failed = true;
                return Ok(false);
            }
            let expected_parent = blockindex::block_hash_at(&*self.store, front.height - 1)?;
            if expected_parent != Some(front.block.header.previous_block_hash) {
                log_error!("alternative chain has wrong connection to the main chain");
                result.verification_failed = true;
                return Ok(false);
            }
            front.height - 1
        } else {
            main_prev.as_ref().expect("parent is on main chain").height
        };
        self.complete_timestamps(
            block.header.major_version,
            connect_height,
            &mut timestamps_window,
        )?;

        if let Err(err) = validation::check_block_timestamp(&self.currency, &timestamps_window, block)
        {
            log_info!("alternative block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }

        let height = match alt_prev_height {
            Some(parent_height) => parent_height + 1,
            None => main_prev.as_ref().expect("parent is on main chain").height + 1,
        };

        let (checkpoint_ok, is_checkpoint) = self.checkpoints.check_block(height, block_hash);
        if !checkpoint_ok {
            log_error!("checkpoint validation failed for alternative block at height {height}");
            result.verification_failed = true;
            return Ok(false);
        }

        let difficulty = self.next_difficulty_for_alternative(inner, &alt_chain, height)?;
        if difficulty == 0 {
            log_error!("difficulty overflow for alternative chain at height {height}");
            result.verification_failed = true;
            return Ok(false);
        }
        // PoW is never skipped for alternative blocks.
        if !check_proof_of_work(block, difficulty) {
            log_info!(
                "alternative block {} has not enough proof of work for difficulty {difficulty}",
                hex_prefix(block_hash)
            );
            result.verification_failed = true;
            return Ok(false);
        }

        if let Err(err) = validation::prevalidate_coinbase(&self.currency, block, height) {
            log_info!("alternative block {}: {err}", hex_prefix(block_hash));
            result.verification_failed = true;
            return Ok(false);
        }

        let parent_cumulative_difficulty = match alt_chain.last() {
            Some(parent_hash) => {
                inner
                    .alternative_chains
                    .get(parent_hash)
                    .expect("subchain members are tracked")
                    .cumulative_difficulty
            }
            None => {
                main_prev
                    .as_ref()
                    .expect("parent is on main chain")
                    .cumulative_difficulty
            }
        };
        let cumulative_difficulty = parent_cumulative_difficulty
            .checked_add(difficulty)
            .ok_or(ChainError::ConsistencyBroken("cumulative difficulty overflow"))?;

        if !inner.alternative_chains.insert(
            *block_hash,
            AltBlock {
                block: block.clone(),
                height,
                cumulative_difficulty,
            },
        ) {
            log_error!("alternative block already tracked");
            result.verification_failed = true;
            return Ok(false);
        }

        let mut full_chain = alt_chain;
        full_chain.push(*block_hash);

        let tail_cumulative_difficulty = self
            .tail_entry()?
            .map(|entry| entry.cumulative_difficulty)
            .unwrap_or(0);

        if is_checkpoint {
            log_info!(
                "reorganize triggered by checkpoint in alternative chain at height {height}"
            );
            let switched = self.switch_to_alternative(inner, pool, full_chain, true)?;
            result.added_to_main_chain = switched;
            result.switched_to_alt_chain = switched;
            result.verification_failed = !switched;
            Ok(switched)
        } else if cumulative_difficulty > tail_cumulative_difficulty {
            log_info!(
                "reorganize at height {height}: alternative difficulty {cumulative_difficulty} beats {tail_cumulative_difficulty}"
            );
            let switched = self.switch_to_alternative(inner, pool, full_chain, false)?;
            result.added_to_main_chain = switched;
            result.switched_to_alt_chain = switched;
            result.verification_failed = !switched;
            Ok(switched)
        } else {
            log_info!(
                "block {} added as alternative at height {height}, difficulty {difficulty}",
                hex_prefix(block_hash)
            );
            result.added_as_alternative = true;
            if send_message {
                inner
                    .message_queues
                    .send(&BlockchainMessage::NewAlternativeBlock { hash: *block_hash });
            }
            Ok(true)
        }
    }

    /// Replaces the main chain above the common ancestor with a validated
    /// alternative chain. On replay failure the original chain is
    /// restored and the failing alt blocks are dropped.
    fn switch_to_alternative(
        &self,
        inner: &mut ChainInner,
        pool: &mut P,
        alt_chain: Vec<Hash256>,
        discard_disconnected: bool,
    ) -> Result<bool, ChainError> {
        let Some(front_hash) = alt_chain.first() else {
            log_error!("empty alternative chain passed to reorganize");
            return Ok(false);
        };
        let (split_height, common_ancestor) = {
            let front = inner
                .alternative_chains
                .get(front_hash)
                .ok_or(ChainError::ConsistencyBroken("untracked alternative block"))?;
            (front.height, front.block.header.previous_block_hash)
        };
        if self.height.load(Ordering::Relaxed) <= split_height {
            log_error!("blockchain height is below the reorganization split height");
            return Ok(false);
        }

        if alt_chain.len() >= self.currency.poisson_check_trigger
            && !self.passes_poisson_gate(inner, &alt_chain, &common_ancestor)?
        {
            return Ok(false);
        }

        // Disconnect the current chain down to the split, oldest first.
        let mut disconnected = Vec::new();
        while self.height.load(Ordering::Relaxed) > split_height {
            disconnected.push(self.pop_block(inner, pool)?);
        }
        disconnected.reverse();

        for (position, alt_hash) in alt_chain.iter().enumerate() {
            let alt_block = inner
                .alternative_chains
                .get(alt_hash)
                .ok_or(ChainError::ConsistencyBroken("untracked alternative block"))?
                .block
                .clone();
            let mut replay_result = AddBlockResult::default();
            let pushed =
                self.push_block(inner, pool, &alt_block, alt_hash, &mut replay_result)?;
            if !pushed {
                log_info!("failed to switch to alternative blockchain");
                self.rollback_chain_switching(inner, pool, &disconnected, split_height)?;
                for dropped in &alt_chain[position..] {
                    inner.alternative_chains.remove(dropped);
                }
                return Ok(false);
            }
        }

        if !discard_disconnected {
            for block in &disconnected {
                let hash = block.hash();
                let mut requeue_result = AddBlockResult::default();
                match self.handle_alternative(inner, pool, block, &hash, false, &mut requeue_result)
                {
                    Ok(true) => {}
                    Ok(false) => {
                        log_warn!("failed to push ex-main chain blocks to the alternative chain");
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        for consumed in &alt_chain {
            inner.alternative_chains.remove(consumed);
        }

        inner.message_queues.send(&BlockchainMessage::ChainSwitch {
            common_ancestor,
            new_tip_chain: alt_chain,
        });
        log_info!(
            "reorganize success at height {split_height}, new blockchain height {}",
            self.height.load(Ordering::Relaxed)
        );
        Ok(true)
    }

    fn rollback_chain_switching(
        &self,
        inner: &mut ChainInner,
        pool: &mut P,
        original_chain: &[Block],
        rollback_height: u32,
    ) -> Result<(), ChainError> {
        while self.height.load(Ordering::Relaxed) > rollback_height {
            self.pop_block(inner, pool)?;
        }
        for block in original_chain {
            let hash = block.hash();
            let mut result = AddBlockResult::default();
            let pushed = self.push_block(inner, pool, block, &hash, &mut result)?;
            if !pushed {
                log_error!("failed to re-apply the original chain while rolling back a switch");
                return Err(ChainError::ConsistencyBroken(
                    "original chain rejected during reorganization rollback",
                ));
            }
        }
        log_info!("reorganization rollback success");
        Ok(())
    }

    /// Timestamp plausibility gate for long reorgs: if main-chain
    /// timestamps below the ancestor are wildly improbable against the
    /// alt tip timestamp, the difficulty algorithm has been gamed and
    /// the switch is refused.
    fn passes_poisson_gate(
        &self,
        inner: &ChainInner,
        alt_chain: &[Hash256],
        common_ancestor: &Hash256,
    ) -> Result<bool, ChainError> {
        let alt_size = alt_chain.len() as u64;
        let mut high_timestamp = 0u64;
        for hash in alt_chain {
            if let Some(alt) = inner.alternative_chains.get(hash) {
                high_timestamp = high_timestamp.max(alt.block.header.timestamp);
            }
        }

        let future_limit = adjusted_time() + self.currency.block_future_time_limit(1);
        if high_timestamp > future_limit {
            log_error!(
                "alternative chain failed the future-time check: timestamp {high_timestamp}, limit {future_limit}"
            );
            return Ok(false);
        }

        log_warn!("poisson check triggered by reorganization size {alt_size}");
        let mut low_block = *common_ancestor;
        let mut failed_checks = 0u64;
        let mut performed = 0u64;
        for depth in 1..=self.currency.poisson_check_depth as u64 {
            if low_block == NULL_HASH {
                break;
            }
            let Some(entry) = blockindex::block_entry(&*self.store, &low_block)? else {
                break;
            };
            performed = depth;
            let low_timestamp = entry.block.header.timestamp;
            low_block = entry.block.header.previous_block_hash;

            if low_timestamp >= high_timestamp {
                log_info!("poisson check at depth {depth} skipped: non-increasing timestamps");
                failed_checks += 1;
                continue;
            }
            let lam = (high_timestamp - low_timestamp) as f64
                / self.currency.difficulty_target as f64;
            if poisson_ln(lam, alt_size + depth) < self.currency.poisson_log_p_reject {
                log_info!("poisson check at depth {depth} failed, lambda {lam:.2}");
                failed_checks += 1;
            }
        }

        log_info!("poisson check result: {failed_checks} fails out of {performed}");
        if failed_checks > performed / 2 {
            log_error!("alternative chain rejected by the poisson timestamp check");
            return Ok(false);
        }
        Ok(true)
    }

    /// Difficulty for the next block of an alternative chain, sampling
    /// main-chain history below the common ancestor when the subchain is
    /// shorter than the difficulty window.
    fn next_difficulty_for_alternative(
        &self,
        inner: &ChainInner,
        alt_chain: &[Hash256],
        block_height: u32,
    ) -> Result<u64, ChainError> {
        let version = self
            .currency
            .major_version_for_height(self.height.load(Ordering::Relaxed));
        let count = self.currency.difficulty_blocks_count(version);

        let mut timestamps = Vec::new();
        let mut cumulative_difficulties = Vec::new();

        if alt_chain.len() < count {
            let stop_offset = match alt_chain.first() {
                Some(front_hash) => {
                    inner
                        .alternative_chains
                        .get(front_hash)
                        .ok_or(ChainError::ConsistencyBroken("untracked alternative block"))?
                        .height
                }
                None => block_height,
            };
            let main_count = (count - alt_chain.len()).min(stop_offset as usize);
            let mut start = stop_offset as usize - main_count;
            if start == 0 {
                start = 1;
            }
            for height in start..stop_offset as usize {
                let entry = blockindex::block_entry_at(&*self.store, height as u32)?
                    .ok_or(ChainError::ConsistencyBroken("gap in the block index"))?;
                timestamps.push(entry.block.header.timestamp);
                cumulative_difficulties.push(entry.cumulative_difficulty);
            }
            for hash in alt_chain {
                let alt = inner
                    .alternative_chains
                    .get(hash)
                    .ok_or(ChainError::ConsistencyBroken("untracked alternative block"))?;
                timestamps.push(alt.block.header.timestamp);
                cumulative_difficulties.push(alt.cumulative_difficulty);
            }
        } else {
            for hash in &alt_chain[alt_chain.len() - count..] {
                let alt = inner
                    .alternative_chains
                    .get(hash)
                    .ok_or(ChainError::ConsistencyBroken("untracked alternative block"))?;
                timestamps.push(alt.block.header.timestamp);
                cumulative_difficulties.push(alt.cumulative_difficulty);
            }
        }

        Ok(next_difficulty(
            &self.currency,
            version,
            &timestamps,
            &cumulative_difficulties,
        ))
    }

    /// Extends a timestamp vector with main-chain timestamps walking down
    /// from `top_height` until the check window is filled.
    fn complete_timestamps(
        &self,
        block_major_version: u8,
        top_height: u32,
        timestamps: &mut Vec<u64>,
    ) -> Result<(), ChainError> {
        let window = self.currency.timestamp_check_window(block_major_version);
        let mut height = top_height;
        while timestamps.len() < window {
            let Some(entry) = blockindex::block_entry_at(&*self.store, height)? else {
                break;
            };
            timestamps.push(entry.block.header.timestamp);
            if height == 0 {
                break;
            }
            height -= 1;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Difficulty & size bookkeeping
    // ------------------------------------------------------------------

    pub fn difficulty_for_next_block(&self) -> Result<u64, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        self.next_block_difficulty()
    }

    fn next_block_difficulty(&self) -> Result<u64, ChainError> {
        let height = self.height.load(Ordering::Relaxed);
        let version = self.currency.major_version_for_height(height);
        let count = self.currency.difficulty_blocks_count(version) as u32;

        let mut offset = height.saturating_sub(count);
        if offset == 0 {
            // Skip the genesis timestamp.
            offset = 1;
        }

        let mut timestamps = Vec::new();
        let mut cumulative_difficulties = Vec::new();
        for h in offset..height {
            let entry = blockindex::block_entry_at(&*self.store, h)?
                .ok_or(ChainError::ConsistencyBroken("gap in the block index"))?;
            timestamps.push(entry.block.header.timestamp);
            cumulative_difficulties.push(entry.cumulative_difficulty);
        }

        Ok(next_difficulty(
            &self.currency,
            version,
            &timestamps,
            &cumulative_difficulties,
        ))
    }

    fn last_block_timestamps(&self, height: u32, count: usize) -> Result<Vec<u64>, ChainError> {
        let offset = (height as usize).saturating_sub(count) as u32;
        let mut timestamps = Vec::new();
        for h in offset..height {
            let entry = blockindex::block_entry_at(&*self.store, h)?
                .ok_or(ChainError::ConsistencyBroken("gap in the block index"))?;
            timestamps.push(entry.block.header.timestamp);
        }
        Ok(timestamps)
    }

    fn last_block_sizes(&self, count: usize) -> Result<Vec<u64>, ChainError> {
        let height = self.height.load(Ordering::Relaxed);
        let offset = (height as usize).saturating_sub(count) as u32;
        let mut sizes = Vec::new();
        for h in offset..height {
            let entry = blockindex::block_entry_at(&*self.store, h)?
                .ok_or(ChainError::ConsistencyBroken("gap in the block index"))?;
            sizes.push(entry.block_cumulative_size);
        }
        Ok(sizes)
    }

    fn update_size_limit(&self, inner: &mut ChainInner) -> Result<(), ChainError> {
        let height = self.height.load(Ordering::Relaxed);
        let version = self.currency.major_version_for_height(height);
        let zone = self.currency.granted_full_reward_zone(version) as u64;
        let sizes = self.last_block_sizes(self.currency.reward_blocks_window)?;
        let median = validation::median(&sizes).max(zone);
        inner.current_block_size_limit = median * 2;
        Ok(())
    }

    pub fn current_cumulative_size_limit(&self) -> u64 {
        self.inner.lock().expect("chain lock").current_block_size_limit
    }

    // ------------------------------------------------------------------
    // Input validation
    // ------------------------------------------------------------------

    /// Validates every input of a pool transaction against the current
    /// chain state.
    pub fn check_transaction_inputs(&self, tx: &Transaction) -> Result<bool, ChainError> {
        let mut max_used = 0u32;
        self.check_transaction_inputs_tracked(tx, &mut max_used)
    }

    /// As [`check_transaction_inputs`](Self::check_transaction_inputs),
    /// additionally reporting the height of the newest referenced output.
    pub fn check_transaction_inputs_tracked(
        &self,
        tx: &Transaction,
        max_used_block_height: &mut u32,
    ) -> Result<bool, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        let prefix_hash = tx.prefix_hash();
        self.check_inputs_impl(None, tx, &prefix_hash, max_used_block_height)
    }

    /// Pool-facing variant caching the newest referenced block so the
    /// expensive signature checks rerun only after a reorg.
    pub fn check_transaction_inputs_cached(
        &self,
        tx: &Transaction,
        max_used_block: &mut BlockInfo,
        last_failed_block: &mut BlockInfo,
    ) -> Result<bool, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        let current_height = self.height.load(Ordering::Relaxed);
        let prefix_hash = tx.prefix_hash();

        let check = |max_used: &mut BlockInfo,
                     last_failed: &mut BlockInfo|
         -> Result<bool, ChainError> {
            let mut height = 0u32;
            if !self.check_inputs_impl(None, tx, &prefix_hash, &mut height)? {
                if let Some((tail_height, tail_hash)) = blockindex::tail(&*self.store)? {
                    *last_failed = BlockInfo {
                        height: tail_height,
                        id: tail_hash,
                    };
                }
                return Ok(false);
            }
            if height >= current_height {
                return Err(ChainError::ConsistencyBroken(
                    "referenced output above the chain tail",
                ));
            }
            max_used.height = height;
            max_used.id = blockindex::block_hash_at(&*self.store, height)?
                .ok_or(ChainError::ConsistencyBroken("gap in the block index"))?;
            Ok(true)
        };

        if max_used_block.is_empty() {
            if !last_failed_block.is_empty()
                && current_height > last_failed_block.height
                && blockindex::block_hash_at(&*self.store, last_failed_block.height)?
                    == Some(last_failed_block.id)
            {
                // Still on the chain that refused this tx.
                return Ok(false);
            }
            return check(max_used_block, last_failed_block);
        }

        if max_used_block.height >= current_height {
            return Ok(false);
        }
        if blockindex::block_hash_at(&*self.store, max_used_block.height)?
            != Some(max_used_block.id)
        {
            if !last_failed_block.is_empty()
                && blockindex::block_hash_at(&*self.store, last_failed_block.height)?
                    == Some(last_failed_block.id)
            {
                return Ok(false);
            }
        }
        check(max_used_block, last_failed_block)
    }

    pub fn have_spent_key_images(&self, tx: &Transaction) -> Result<bool, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        for input in &tx.inputs {
            if let TransactionInput::Key(input) = input {
                if spentindex::is_spent(&*self.store, &input.key_image)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn check_inputs_impl(
        &self,
        overlay: Option<&AppendState>,
        tx: &Transaction,
        prefix_hash: &Hash256,
        max_used_block_height: &mut u32,
    ) -> Result<bool, ChainError> {
        let chain_height = self.height.load(Ordering::Relaxed);
        let in_checkpoint_zone = self.checkpoints.is_in_checkpoint_zone(chain_height);

        for (input_index, input) in tx.inputs.iter().enumerate() {
            let signatures = tx.signatures.get(input_index).map(Vec::as_slice).unwrap_or(&[]);
            match input {
                TransactionInput::Key(key_input) => {
                    if key_input.output_indexes.is_empty() {
                        log_info!("key input with empty output index list");
                        return Ok(false);
                    }
                    let spent = spentindex::is_spent(&*self.store, &key_input.key_image)?
                        || overlay
                            .is_some_and(|state| state.spent_images.contains_key(&key_input.key_image));
                    if spent {
                        log_debug!("key image already spent in the blockchain");
                        return Ok(false);
                    }

                    let Some(absolute) =
                        relative_output_offsets_to_absolute(&key_input.output_indexes)
                    else {
                        log_info!("relative output offsets overflow");
                        return Ok(false);
                    };

                    let entry = self.visible_outputs_entry(overlay, key_input.amount)?;
                    let Some(entry) = entry else {
                        log_info!("no outputs for amount {}", format_amount(key_input.amount));
                        return Ok(false);
                    };

                    let mut output_keys: Vec<PublicKey> = Vec::with_capacity(absolute.len());
                    for global_index in &absolute {
                        let Some((owner_index, out_position)) =
                            entry.outputs.get(*global_index as usize).copied()
                        else {
                            log_info!(
                                "output index {global_index} out of range for amount {}",
                                format_amount(key_input.amount)
                            );
                            return Ok(false);
                        };
                        *max_used_block_height = (*max_used_block_height).max(owner_index.block);

                        // Inside the checkpoint zone the expensive output
                        // dereference and signature work is skipped.
                        if in_checkpoint_zone {
                            continue;
                        }

                        let Some(owner_tx) = self.resolve_transaction(overlay, owner_index)?
                        else {
                            return Err(ChainError::ConsistencyBroken(
                                "output index references a missing transaction",
                            ));
                        };
                        if !self.is_transaction_unlocked(&owner_tx)? {
                            log_info!("referenced output is still locked");
                            return Ok(false);
                        }
                        let Some(output) = owner_tx.outputs.get(out_position as usize) else {
                            return Err(ChainError::ConsistencyBroken(
                                "output position out of range",
                            ));
                        };
                        let TransactionOutputTarget::Key(key_output) = &output.target else {
                            log_info!("referenced output is not a key output");
                            return Ok(false);
                        };
                        output_keys.push(key_output.key);
                    }

                    if in_checkpoint_zone {
                        continue;
                    }

                    if !key_image_in_domain(&key_input.key_image) {
                        log_error!("transaction uses a key image outside the valid domain");
                        return Ok(false);
                    }
                    if signatures.len() != output_keys.len() {
                        log_error!(
                            "signature count {} does not match ring size {}",
                            signatures.len(),
                            output_keys.len()
                        );
                        return Ok(false);
                    }
                    if !check_ring_signature(
                        prefix_hash,
                        &key_input.key_image,
                        &output_keys,
                        signatures,
                    ) {
                        log_error!("invalid ring signature");
                        return Ok(false);
                    }
                }
                TransactionInput::Multisignature(multisig_input) => {
                    if in_checkpoint_zone {
                        continue;
                    }
                    if !self.check_multisignature_input(
                        overlay,
                        multisig_input,
                        prefix_hash,
                        signatures,
                    )? {
                        return Ok(false);
                    }
                }
                TransactionInput::Base(_) => {
                    log_info!("transaction contains an input of unsupported type");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn check_multisignature_input(
        &self,
        overlay: Option<&AppendState>,
        input: &basalt_primitives::transaction::MultisignatureInput,
        prefix_hash: &Hash256,
        signatures: &[basalt_crypto::Signature],
    ) -> Result<bool, ChainError> {
        let entry = self.visible_multisig_entry(overlay, input.amount)?;
        let Some(entry) = entry else {
            log_debug!(
                "multisignature input with unknown amount {}",
                format_amount(input.amount)
            );
            return Ok(false);
        };
        let Some(usage) = entry.outputs.get(input.output_index as usize).copied() else {
            log_debug!("multisignature input with invalid output index");
            return Ok(false);
        };
        if usage.is_used {
            log_debug!("multisignature input double-spends its output");
            return Ok(false);
        }

        let Some(owner_tx) = self.resolve_transaction(overlay, usage.transaction_index)?
        else {
            return Err(ChainError::ConsistencyBroken(
                "multisignature output references a missing transaction",
            ));
        };
        if !self.is_transaction_unlocked(&owner_tx)? {
            log_debug!("multisignature input points to a locked transaction");
            return Ok(false);
        }
        let Some(output) = owner_tx.outputs.get(usage.output_index as usize) else {
            return Err(ChainError::ConsistencyBroken("output position out of range"));
        };
        if output.amount != input.amount {
            log_debug!("multisignature input amount mismatch");
            return Ok(false);
        }
        let TransactionOutputTarget::Multisignature(target) = &output.target else {
            log_debug!("referenced output is not a multisignature output");
            return Ok(false);
        };
        if input.signature_count != target.required_signature_count {
            log_debug!("multisignature input with invalid signature count");
            return Ok(false);
        }
        if signatures.len() != input.signature_count as usize {
            log_debug!("multisignature signature vector length mismatch");
            return Ok(false);
        }

        // Signatures must match output keys in order; each key verifies at
        // most one signature.
        let mut signature_index = 0;
        let mut key_index = 0;
        while signature_index < signatures.len() {
            if key_index == target.keys.len() {
                log_debug!("multisignature input with invalid signatures");
                return Ok(false);
            }
            if basalt_crypto::check_signature(
                prefix_hash,
                &target.keys[key_index],
                &signatures[signature_index],
            ) {
                signature_index += 1;
            }
            key_index += 1;
        }
        Ok(true)
    }

    fn visible_outputs_entry(
        &self,
        overlay: Option<&AppendState>,
        amount: u64,
    ) -> Result<Option<OutputsEntry>, ChainError> {
        if let Some(state) = overlay {
            if let Some(entry) = state.overlay.outputs.get(&amount) {
                return Ok(Some(entry.clone()));
            }
        }
        outputs::key_outputs(&*self.store, amount)
    }

    fn visible_multisig_entry(
        &self,
        overlay: Option<&AppendState>,
        amount: u64,
    ) -> Result<Option<MultisignatureOutputEntry>, ChainError> {
        if let Some(state) = overlay {
            if let Some(entry) = state.overlay.multisig.get(&amount) {
                return Ok(Some(entry.clone()));
            }
        }
        outputs::multisignature_outputs(&*self.store, amount)
    }

    /// Dereferences a transaction position, looking through the append
    /// overlay for same-block references.
    fn resolve_transaction(
        &self,
        overlay: Option<&AppendState>,
        index: TransactionIndex,
    ) -> Result<Option<Transaction>, ChainError> {
        if let Some(state) = overlay {
            if index.block == state.height {
                return Ok(state
                    .entries
                    .get(index.transaction as usize)
                    .map(|entry| entry.tx.clone()));
            }
        }
        let Some(entry) = blockindex::block_entry_at(&*self.store, index.block)? else {
            return Ok(None);
        };
        Ok(entry
            .transactions
            .get(index.transaction as usize)
            .map(|entry| entry.tx.clone()))
    }

    fn is_transaction_unlocked(&self, tx: &Transaction) -> Result<bool, ChainError> {
        let chain_height = self.height.load(Ordering::Relaxed);
        let last_timestamp = match blockindex::tail(&*self.store)? {
            Some((_, tail_hash)) => {
                blockindex::block_entry(&*self.store, &tail_hash)?
                    .ok_or(ChainError::ConsistencyBroken("tail entry missing"))?
                    .block
                    .header
                    .timestamp
            }
            None => 0,
        };
        Ok(validation::is_unlocked(
            &self.currency,
            tx.unlock_time,
            chain_height,
            last_timestamp,
        ))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn current_height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }

    pub fn tail_id(&self) -> Result<Hash256, ChainError> {
        Ok(blockindex::tail(&*self.store)?
            .map(|(_, hash)| hash)
            .unwrap_or(NULL_HASH))
    }

    fn tail_entry(&self) -> Result<Option<BlockEntry>, ChainError> {
        match blockindex::tail(&*self.store)? {
            Some((_, hash)) => blockindex::block_entry(&*self.store, &hash),
            None => Ok(None),
        }
    }

    /// A block is known when it is on the canonical chain or tracked as
    /// an alternative; used to classify incoming blocks.
    fn is_known_block(&self, inner: &ChainInner, hash: &Hash256) -> Result<bool, ChainError> {
        if self
            .store
            .get(Column::Blocks, &blockindex::block_key(hash))?
            .is_some()
        {
            return Ok(true);
        }
        Ok(inner.alternative_chains.contains(hash))
    }

    /// Whether the hash is an accepted block of the canonical chain.
    pub fn have_block(&self, hash: &Hash256) -> Result<bool, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(self
            .store
            .get(Column::Blocks, &blockindex::block_key(hash))?
            .is_some())
    }

    pub fn is_block_in_main_chain(&self, hash: &Hash256) -> Result<bool, ChainError> {
        self.have_block(hash)
    }

    pub fn have_transaction(&self, hash: &Hash256) -> Result<bool, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(txindex::contains(&*self.store, hash)?)
    }

    pub fn is_key_image_spent(&self, key_image: &KeyImage) -> Result<bool, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(spentindex::is_spent(&*self.store, key_image)?)
    }

    pub fn block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        let inner = self.inner.lock().expect("chain lock");
        if let Some(entry) = blockindex::block_entry(&*self.store, hash)? {
            return Ok(Some(entry.block));
        }
        Ok(inner
            .alternative_chains
            .get(hash)
            .map(|alt| alt.block.clone()))
    }

    pub fn block_by_height(&self, height: u32) -> Result<Option<Block>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(blockindex::block_entry_at(&*self.store, height)?.map(|entry| entry.block))
    }

    pub fn block_entry_by_height(&self, height: u32) -> Result<Option<BlockEntry>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        blockindex::block_entry_at(&*self.store, height)
    }

    pub fn block_entry_by_hash(&self, hash: &Hash256) -> Result<Option<BlockEntry>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        blockindex::block_entry(&*self.store, hash)
    }

    pub fn block_height(&self, hash: &Hash256) -> Result<Option<u32>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(blockindex::block_entry(&*self.store, hash)?.map(|entry| entry.height))
    }

    pub fn block_id_by_height(&self, height: u32) -> Result<Option<Hash256>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(blockindex::block_hash_at(&*self.store, height)?)
    }

    pub fn block_ids(&self, start_height: u32, max_count: usize) -> Result<Vec<Hash256>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(blockindex::block_ids(&*self.store, start_height, max_count)?)
    }

    pub fn transaction(&self, hash: &Hash256) -> Result<Option<Transaction>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        let Some(index) = txindex::get(&*self.store, hash)? else {
            return Ok(None);
        };
        self.resolve_transaction(None, index)
    }

    pub fn transaction_output_global_indexes(
        &self,
        tx_hash: &Hash256,
    ) -> Result<Option<Vec<u32>>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        let Some(index) = txindex::get(&*self.store, tx_hash)? else {
            return Ok(None);
        };
        let Some(entry) = blockindex::block_entry_at(&*self.store, index.block)? else {
            return Err(ChainError::ConsistencyBroken("gap in the block index"));
        };
        Ok(entry
            .transactions
            .get(index.transaction as usize)
            .map(|tx_entry| tx_entry.global_output_indexes.clone()))
    }

    /// `(owning tx hash, output position)` for a multisignature output
    /// addressed by amount and global index.
    pub fn multisignature_output_reference(
        &self,
        amount: u64,
        global_index: u32,
    ) -> Result<Option<(Hash256, u16)>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        let Some(entry) = outputs::multisignature_outputs(&*self.store, amount)? else {
            return Ok(None);
        };
        let Some(usage) = entry.outputs.get(global_index as usize) else {
            return Ok(None);
        };
        let Some(tx) = self.resolve_transaction(None, usage.transaction_index)? else {
            return Err(ChainError::ConsistencyBroken(
                "multisignature output references a missing transaction",
            ));
        };
        Ok(Some((tx.hash(), usage.output_index)))
    }

    pub fn coins_in_circulation(&self) -> Result<u64, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(self
            .tail_entry()?
            .map(|entry| entry.already_generated_coins)
            .unwrap_or(0))
    }

    pub fn block_difficulty(&self, height: u32) -> Result<Option<u64>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        let Some(entry) = blockindex::block_entry_at(&*self.store, height)? else {
            return Ok(None);
        };
        if height == 0 {
            return Ok(Some(entry.cumulative_difficulty));
        }
        let previous = blockindex::block_entry_at(&*self.store, height - 1)?
            .ok_or(ChainError::ConsistencyBroken("gap in the block index"))?;
        Ok(Some(
            entry.cumulative_difficulty - previous.cumulative_difficulty,
        ))
    }

    pub fn cumulative_difficulty_at(&self, height: u32) -> Result<Option<u64>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(blockindex::block_entry_at(&*self.store, height)?
            .map(|entry| entry.cumulative_difficulty))
    }

    pub fn generated_transactions_count(&self, height: u32) -> Result<Option<u64>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(timestamps::generated_transactions(&*self.store, height)?)
    }

    pub fn total_transactions(&self) -> u64 {
        self.inner.lock().expect("chain lock").last_generated_tx_count
    }

    pub fn block_ids_by_timestamp(
        &self,
        begin: u64,
        end: u64,
        limit: usize,
    ) -> Result<(Vec<Hash256>, usize), ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        if begin > end {
            return Ok((Vec::new(), 0));
        }
        timestamps::block_ids_by_timestamp(&*self.store, begin, end, limit)
    }

    pub fn transaction_ids_by_payment_id(
        &self,
        payment_id: &Hash256,
    ) -> Result<Vec<Hash256>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        Ok(paymentids::get(&*self.store, payment_id)?
            .map(|entry| entry.transaction_hashes)
            .unwrap_or_default())
    }

    pub fn alternative_block_count(&self) -> usize {
        self.inner.lock().expect("chain lock").alternative_chains.len()
    }

    pub fn alternative_blocks(&self) -> Vec<Block> {
        let inner = self.inner.lock().expect("chain lock");
        inner
            .alternative_chains
            .blocks()
            .map(|(_, alt)| alt.block.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Sync surface
    // ------------------------------------------------------------------

    /// Geometrically thinned chain fingerprint from the tail: offsets 0,
    /// 1, 2, 4, 8, … back from the tail, always terminated by genesis.
    pub fn build_sparse_chain(&self) -> Result<Vec<Hash256>, ChainError> {
        let tail = self.tail_id()?;
        self.build_sparse_chain_from(&tail)?
            .ok_or(ChainError::ConsistencyBroken("tail is not a known block"))
    }

    pub fn build_sparse_chain_from(
        &self,
        start_hash: &Hash256,
    ) -> Result<Option<Vec<Hash256>>, ChainError> {
        let inner = self.inner.lock().expect("chain lock");

        if let Some(entry) = blockindex::block_entry(&*self.store, start_hash)? {
            return Ok(Some(self.sparse_main_chain(entry.height)?));
        }

        if inner.alternative_chains.contains(start_hash) {
            // Sparse sampling over the alt subchain, then the main chain
            // from the common ancestor down.
            let subchain = inner.alternative_chains.subchain_ending_at(start_hash);
            let mut result = Vec::new();
            let mut offset = 1usize;
            result.push(*start_hash);
            while offset < subchain.len() {
                result.push(subchain[subchain.len() - 1 - offset]);
                offset *= 2;
            }
            let ancestor = inner
                .alternative_chains
                .get(&subchain[0])
                .expect("subchain members are tracked")
                .block
                .header
                .previous_block_hash;
            let Some(ancestor_entry) = blockindex::block_entry(&*self.store, &ancestor)? else {
                return Err(ChainError::ConsistencyBroken(
                    "alternative chain lost its main-chain ancestor",
                ));
            };
            result.extend(self.sparse_main_chain(ancestor_entry.height)?);
            return Ok(Some(result));
        }

        Ok(None)
    }

    fn sparse_main_chain(&self, start_height: u32) -> Result<Vec<Hash256>, ChainError> {
        let mut result = Vec::new();
        let push = |result: &mut Vec<Hash256>, height: u32| -> Result<(), ChainError> {
            let hash = blockindex::block_hash_at(&*self.store, height)?
                .ok_or(ChainError::ConsistencyBroken("gap in the block index"))?;
            result.push(hash);
            Ok(())
        };

        push(&mut result, start_height)?;
        let mut offset = 1u32;
        while offset <= start_height {
            push(&mut result, start_height - offset)?;
            offset = offset.saturating_mul(2);
        }
        if start_height != 0 {
            let genesis = blockindex::block_hash_at(&*self.store, 0)?
                .ok_or(ChainError::ConsistencyBroken("missing genesis"))?;
            if result.last() != Some(&genesis) {
                result.push(genesis);
            }
        }
        Ok(result)
    }

    /// First id of a peer's sparse chain known locally. The peer's list
    /// must terminate with our genesis.
    pub fn find_blockchain_supplement(
        &self,
        remote_ids: &[Hash256],
    ) -> Result<Option<u32>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        let Some(last) = remote_ids.last() else {
            return Ok(None);
        };
        if blockindex::block_hash_at(&*self.store, 0)? != Some(*last) {
            return Ok(None);
        }
        for id in remote_ids {
            if let Some(entry) = blockindex::block_entry(&*self.store, id)? {
                return Ok(Some(entry.height));
            }
        }
        Ok(None)
    }

    /// Supplement ids for a syncing peer: total chain height, the first
    /// shared height, and up to `max_count` ids from there.
    pub fn blockchain_supplement(
        &self,
        remote_ids: &[Hash256],
        max_count: usize,
    ) -> Result<Option<(u32, u32, Vec<Hash256>)>, ChainError> {
        let Some(start_height) = self.find_blockchain_supplement(remote_ids)? else {
            return Ok(None);
        };
        let total = self.current_height();
        let ids = self.block_ids(start_height, max_count)?;
        Ok(Some((total, start_height, ids)))
    }

    // ------------------------------------------------------------------
    // Decoy sampling
    // ------------------------------------------------------------------

    /// Up to `outs_count` mature key outputs per requested amount,
    /// sampled with a triangular distribution weighted toward older
    /// outputs.
    pub fn random_outputs_by_amount(
        &self,
        amounts: &[u64],
        outs_count: usize,
    ) -> Result<Vec<RandomAmountOutputs>, ChainError> {
        let _inner = self.inner.lock().expect("chain lock");
        let mut rng = rand::thread_rng();
        let mut result = Vec::with_capacity(amounts.len());

        for &amount in amounts {
            let mut sampled = RandomAmountOutputs {
                amount,
                outputs: Vec::new(),
            };
            let Some(entry) = outputs::key_outputs(&*self.store, amount)? else {
                log_error!(
                    "no outputs recorded for requested amount {}",
                    format_amount(amount)
                );
                result.push(sampled);
                continue;
            };

            let up_index_limit = self.find_end_of_allowed_index(&entry)?;
            if entry.outputs.len() > outs_count {
                let mut used = HashSet::new();
                let mut tries = 0usize;
                while sampled.outputs.len() < outs_count && tries < up_index_limit {
                    // Triangular distribution over [0, limit) with the
                    // mode at the oldest output.
                    let r = rng.gen_range(0u64..(1 << 53)) as f64 / (1u64 << 53) as f64;
                    let index = (((1.0 - r.sqrt()) * up_index_limit as f64) as usize)
                        .min(up_index_limit - 1);
                    if !used.insert(index) {
                        continue;
                    }
                    tries += 1;
                    if let Some(output) = self.sample_output(&entry, index)? {
                        sampled.outputs.push((index as u32, output));
                    }
                }
            } else {
                for index in 0..up_index_limit {
                    if let Some(output) = self.sample_output(&entry, index)? {
                        sampled.outputs.push((index as u32, output));
                    }
                }
            }
            result.push(sampled);
        }
        Ok(result)
    }

    /// One past the newest output whose containing block is old enough to
    /// have matured a coinbase.
    fn find_end_of_allowed_index(&self, entry: &OutputsEntry) -> Result<usize, ChainError> {
        let chain_height = self.height.load(Ordering::Relaxed);
        let mut i = entry.outputs.len();
        while i > 0 {
            i -= 1;
            let block_height = entry.outputs[i].0.block;
            let version = self.currency.major_version_for_height(block_height);
            let window = self.currency.mined_money_unlock_window(version);
            if block_height + window <= chain_height {
                return Ok(i + 1);
            }
        }
        Ok(0)
    }

    fn sample_output(
        &self,
        entry: &OutputsEntry,
        index: usize,
    ) -> Result<Option<PublicKey>, ChainError> {
        let (owner_index, out_position) = entry.outputs[index];
        let Some(tx) = self.resolve_transaction(None, owner_index)? else {
            return Err(ChainError::ConsistencyBroken(
                "output index references a missing transaction",
            ));
        };
        let Some(output) = tx.outputs.get(out_position as usize) else {
            return Err(ChainError::ConsistencyBroken("output position out of range"));
        };
        let TransactionOutputTarget::Key(key_output) = &output.target else {
            return Err(ChainError::ConsistencyBroken("non-key output in key index"));
        };
        if !self.is_transaction_unlocked(&tx)? {
            return Ok(None);
        }
        Ok(Some(key_output.key))
    }

    // ------------------------------------------------------------------

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }
}

fn adjusted_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn hex_prefix(hash: &Hash256) -> String {
    let mut out = String::with_capacity(16);
    for byte in &hash[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
