//! Block header and block types.

use basalt_crypto::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::{blob_hash, tree_hash};
use crate::transaction::{Transaction, TransactionInput};

pub const BLOCK_MAJOR_VERSION_1: u8 = 1;
pub const BLOCK_MAJOR_VERSION_2: u8 = 2;
pub const BLOCK_MAJOR_VERSION_3: u8 = 3;
pub const BLOCK_MAJOR_VERSION_4: u8 = 4;
pub const BLOCK_MAJOR_VERSION_5: u8 = 5;
pub const BLOCK_MAJOR_VERSION_6: u8 = 6;

pub const BLOCK_MINOR_VERSION_0: u8 = 0;

/// Merge-mined parent carried by major versions 2 and 3.
pub const fn carries_parent_block(major_version: u8) -> bool {
    major_version == BLOCK_MAJOR_VERSION_2 || major_version == BLOCK_MAJOR_VERSION_3
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub previous_block_hash: Hash256,
    pub nonce: u32,
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.major_version as u64);
        encoder.write_varint(self.minor_version as u64);
        encoder.write_varint(self.timestamp);
        encoder.write_hash(&self.previous_block_hash);
        encoder.write_u32_le(self.nonce);
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let major_version = read_version(decoder)?;
        let minor_version = read_version(decoder)?;
        let timestamp = decoder.read_varint()?;
        let previous_block_hash = decoder.read_hash()?;
        let nonce = decoder.read_u32_le()?;
        Ok(Self {
            major_version,
            minor_version,
            timestamp,
            previous_block_hash,
            nonce,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParentBlock {
    pub major_version: u8,
    pub minor_version: u8,
    pub previous_block_hash: Hash256,
    pub transaction_count: u16,
    pub base_transaction_branch: Vec<Hash256>,
    pub base_transaction: Transaction,
    pub blockchain_branch: Vec<Hash256>,
}

impl ParentBlock {
    pub fn binary_size(&self) -> usize {
        crate::encoding::encode(self).len()
    }
}

impl Encodable for ParentBlock {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.major_version as u64);
        encoder.write_varint(self.minor_version as u64);
        encoder.write_hash(&self.previous_block_hash);
        encoder.write_varint(self.transaction_count as u64);
        encoder.write_varint(self.base_transaction_branch.len() as u64);
        for hash in &self.base_transaction_branch {
            encoder.write_hash(hash);
        }
        self.base_transaction.consensus_encode(encoder);
        encoder.write_varint(self.blockchain_branch.len() as u64);
        for hash in &self.blockchain_branch {
            encoder.write_hash(hash);
        }
    }
}

impl Decodable for ParentBlock {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let major_version = read_version(decoder)?;
        let minor_version = read_version(decoder)?;
        let previous_block_hash = decoder.read_hash()?;
        let transaction_count = {
            let value = decoder.read_varint()?;
            u16::try_from(value).map_err(|_| DecodeError::InvalidData("parent tx count"))?
        };
        let branch_len = decoder.read_varint_usize()?;
        let mut base_transaction_branch = Vec::with_capacity(branch_len);
        for _ in 0..branch_len {
            base_transaction_branch.push(decoder.read_hash()?);
        }
        let base_transaction = Transaction::consensus_decode(decoder)?;
        let chain_branch_len = decoder.read_varint_usize()?;
        let mut blockchain_branch = Vec::with_capacity(chain_branch_len);
        for _ in 0..chain_branch_len {
            blockchain_branch.push(decoder.read_hash()?);
        }
        Ok(Self {
            major_version,
            minor_version,
            previous_block_hash,
            transaction_count,
            base_transaction_branch,
            base_transaction,
            blockchain_branch,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    /// Present exactly when [`carries_parent_block`] holds for the header.
    pub parent_block: Option<ParentBlock>,
    pub base_transaction: Transaction,
    pub transaction_hashes: Vec<Hash256>,
}

impl Block {
    /// Height claimed by the coinbase input, if well-formed.
    pub fn coinbase_height(&self) -> Option<u32> {
        match self.base_transaction.inputs.first() {
            Some(TransactionInput::Base(input)) => Some(input.block_index),
            _ => None,
        }
    }

    /// Merkle root over the coinbase hash and the mined tx hashes.
    pub fn merkle_root(&self) -> Hash256 {
        let mut hashes = Vec::with_capacity(1 + self.transaction_hashes.len());
        hashes.push(self.base_transaction.hash());
        hashes.extend_from_slice(&self.transaction_hashes);
        tree_hash(&hashes)
    }

    /// The byte string committed to by mining and by the block identity.
    pub fn hashing_blob(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.header.consensus_encode(&mut encoder);
        encoder.write_hash(&self.merkle_root());
        encoder.write_varint(1 + self.transaction_hashes.len() as u64);
        encoder.into_inner()
    }

    pub fn hash(&self) -> Hash256 {
        blob_hash(&self.hashing_blob())
    }

    pub fn binary_size(&self) -> usize {
        crate::encoding::encode(self).len()
    }
}

impl Encodable for Block {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.header.consensus_encode(encoder);
        if carries_parent_block(self.header.major_version) {
            if let Some(parent) = &self.parent_block {
                parent.consensus_encode(encoder);
            }
        }
        self.base_transaction.consensus_encode(encoder);
        encoder.write_varint(self.transaction_hashes.len() as u64);
        for hash in &self.transaction_hashes {
            encoder.write_hash(hash);
        }
    }
}

impl Decodable for Block {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let header = BlockHeader::consensus_decode(decoder)?;
        let parent_block = if carries_parent_block(header.major_version) {
            Some(ParentBlock::consensus_decode(decoder)?)
        } else {
            None
        };
        let base_transaction = Transaction::consensus_decode(decoder)?;
        let count = decoder.read_varint_usize()?;
        let mut transaction_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            transaction_hashes.push(decoder.read_hash()?);
        }
        Ok(Self {
            header,
            parent_block,
            base_transaction,
            transaction_hashes,
        })
    }
}

fn read_version(decoder: &mut Decoder) -> Result<u8, DecodeError> {
    let value = decoder.read_varint()?;
    u8::try_from(value).map_err(|_| DecodeError::InvalidData("version exceeds 8 bits"))
}
