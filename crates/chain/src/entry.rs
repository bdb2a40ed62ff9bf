//! Persistent chain records.

use basalt_primitives::encoding::{
    decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder,
};
use basalt_primitives::{Block, Transaction};

/// Position of an accepted transaction: owning block height and index
/// within that block (0 is the coinbase).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransactionIndex {
    pub block: u32,
    pub transaction: u16,
}

impl Encodable for TransactionIndex {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.block as u64);
        encoder.write_varint(self.transaction as u64);
    }
}

impl Decodable for TransactionIndex {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let block = decoder.read_varint()?;
        let transaction = decoder.read_varint()?;
        Ok(Self {
            block: u32::try_from(block).map_err(|_| DecodeError::InvalidData("block height"))?,
            transaction: u16::try_from(transaction)
                .map_err(|_| DecodeError::InvalidData("tx position"))?,
        })
    }
}

impl TransactionIndex {
    pub fn encode_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}

/// An accepted transaction with the global per-amount index of each of
/// its outputs, fixed at append time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionEntry {
    pub tx: Transaction,
    pub global_output_indexes: Vec<u32>,
}

impl Encodable for TransactionEntry {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.tx.consensus_encode(encoder);
        encoder.write_varint(self.global_output_indexes.len() as u64);
        for index in &self.global_output_indexes {
            encoder.write_varint(*index as u64);
        }
    }
}

impl Decodable for TransactionEntry {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let tx = Transaction::consensus_decode(decoder)?;
        let count = decoder.read_varint_usize()?;
        let mut global_output_indexes = Vec::with_capacity(count);
        for _ in 0..count {
            let index = decoder.read_varint()?;
            global_output_indexes
                .push(u32::try_from(index).map_err(|_| DecodeError::InvalidData("output index"))?);
        }
        Ok(Self {
            tx,
            global_output_indexes,
        })
    }
}

/// A main-chain block with every field derived at append time. Never
/// mutated; deleted on rollback.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockEntry {
    pub block: Block,
    pub height: u32,
    pub block_cumulative_size: u64,
    pub cumulative_difficulty: u64,
    pub already_generated_coins: u64,
    /// Coinbase first, then mined transactions in block order.
    pub transactions: Vec<TransactionEntry>,
}

impl Encodable for BlockEntry {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.block.consensus_encode(encoder);
        encoder.write_varint(self.height as u64);
        encoder.write_varint(self.block_cumulative_size);
        encoder.write_varint(self.cumulative_difficulty);
        encoder.write_varint(self.already_generated_coins);
        encoder.write_varint(self.transactions.len() as u64);
        for entry in &self.transactions {
            entry.consensus_encode(encoder);
        }
    }
}

impl Decodable for BlockEntry {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let block = Block::consensus_decode(decoder)?;
        let height = decoder.read_varint()?;
        let block_cumulative_size = decoder.read_varint()?;
        let cumulative_difficulty = decoder.read_varint()?;
        let already_generated_coins = decoder.read_varint()?;
        let count = decoder.read_varint_usize()?;
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(TransactionEntry::consensus_decode(decoder)?);
        }
        Ok(Self {
            block,
            height: u32::try_from(height).map_err(|_| DecodeError::InvalidData("height"))?,
            block_cumulative_size,
            cumulative_difficulty,
            already_generated_coins,
            transactions,
        })
    }
}

impl BlockEntry {
    pub fn encode_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}
