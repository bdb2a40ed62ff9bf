//! Timestamp index (`t/`) and cumulative generated-transaction counter
//! (`g/`).

use basalt_crypto::Hash256;
use basalt_primitives::encoding::{
    decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder,
};
use basalt_storage::keys::{read_varint_suffix, write_varint_sqlite4};
use basalt_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::ChainError;

pub fn timestamp_key(timestamp: u64) -> basalt_storage::keys::VarintBuf {
    write_varint_sqlite4(timestamp)
}

/// Blocks sharing one timestamp.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TimestampEntry {
    pub blocks: Vec<(u32, Hash256)>,
}

impl Encodable for TimestampEntry {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.blocks.len() as u64);
        for (height, hash) in &self.blocks {
            encoder.write_varint(*height as u64);
            encoder.write_hash(hash);
        }
    }
}

impl Decodable for TimestampEntry {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let count = decoder.read_varint_usize()?;
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            let height = decoder.read_varint()?;
            let hash = decoder.read_hash()?;
            blocks.push((
                u32::try_from(height).map_err(|_| DecodeError::InvalidData("height"))?,
                hash,
            ));
        }
        Ok(Self { blocks })
    }
}

impl TimestampEntry {
    pub fn encode_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}

pub fn timestamp_entry<S: KeyValueStore>(
    store: &S,
    timestamp: u64,
) -> Result<Option<TimestampEntry>, ChainError> {
    let Some(bytes) = store.get(Column::Timestamps, &timestamp_key(timestamp))? else {
        return Ok(None);
    };
    Ok(Some(TimestampEntry::decode_bytes(&bytes)?))
}

/// Records a block under its timestamp.
pub fn push_block<S: KeyValueStore>(
    store: &S,
    batch: &mut WriteBatch,
    timestamp: u64,
    height: u32,
    hash: &Hash256,
) -> Result<(), ChainError> {
    let mut entry = timestamp_entry(store, timestamp)?.unwrap_or_default();
    entry.blocks.push((height, *hash));
    batch.put(
        Column::Timestamps,
        timestamp_key(timestamp).to_vec(),
        entry.encode_bytes(),
    );
    Ok(())
}

/// Removes one block from its timestamp entry, deleting the entry when it
/// was the only member.
pub fn pop_block<S: KeyValueStore>(
    store: &S,
    batch: &mut WriteBatch,
    timestamp: u64,
    hash: &Hash256,
) -> Result<(), ChainError> {
    let mut entry = timestamp_entry(store, timestamp)?.unwrap_or_default();
    entry.blocks.retain(|(_, member)| member != hash);
    if entry.blocks.is_empty() {
        batch.delete(Column::Timestamps, timestamp_key(timestamp).to_vec());
    } else {
        batch.put(
            Column::Timestamps,
            timestamp_key(timestamp).to_vec(),
            entry.encode_bytes(),
        );
    }
    Ok(())
}

/// Block hashes whose timestamps fall within `[begin, end]`, along with
/// the total number of such blocks (which may exceed `limit`).
pub fn block_ids_by_timestamp<S: KeyValueStore>(
    store: &S,
    begin: u64,
    end: u64,
    limit: usize,
) -> Result<(Vec<Hash256>, usize), ChainError> {
    let mut hashes = Vec::new();
    let mut total = 0usize;
    let mut decode_failure = None;
    store.for_each_forward(
        Column::Timestamps,
        Some(&timestamp_key(begin)),
        &mut |key, value| {
            let Some(timestamp) = read_varint_suffix(key) else {
                return Err(StoreError::Backend("malformed timestamp key".into()));
            };
            if timestamp > end {
                return Ok(false);
            }
            match TimestampEntry::decode_bytes(value) {
                Ok(entry) => {
                    for (_, hash) in &entry.blocks {
                        if hashes.len() < limit {
                            hashes.push(*hash);
                        }
                        total += 1;
                    }
                    Ok(true)
                }
                Err(err) => {
                    decode_failure = Some(err);
                    Ok(false)
                }
            }
        },
    )?;
    if let Some(err) = decode_failure {
        return Err(ChainError::Decode(err));
    }
    Ok((hashes, total))
}

pub fn generated_count_key(height: u32) -> basalt_storage::keys::VarintBuf {
    write_varint_sqlite4(height as u64)
}

/// Cumulative transaction count at a height, when indexed.
pub fn generated_transactions<S: KeyValueStore>(
    store: &S,
    height: u32,
) -> Result<Option<u64>, StoreError> {
    let Some(bytes) = store.get(Column::GeneratedTransactions, &generated_count_key(height))?
    else {
        return Ok(None);
    };
    read_varint_suffix(&bytes)
        .map(Some)
        .ok_or_else(|| StoreError::Backend("invalid generated tx counter".to_string()))
}

/// Counter at the tail of the `g/` namespace, 0 on an empty index.
pub fn last_generated_transactions<S: KeyValueStore>(store: &S) -> Result<u64, StoreError> {
    let Some((_, value)) = store.last(Column::GeneratedTransactions)? else {
        return Ok(0);
    };
    read_varint_suffix(&value)
        .ok_or_else(|| StoreError::Backend("invalid generated tx counter".to_string()))
}

pub fn put_generated(batch: &mut WriteBatch, height: u32, count: u64) {
    batch.put(
        Column::GeneratedTransactions,
        generated_count_key(height).to_vec(),
        write_varint_sqlite4(count).to_vec(),
    );
}

pub fn delete_generated(batch: &mut WriteBatch, height: u32) {
    batch.delete(
        Column::GeneratedTransactions,
        generated_count_key(height).to_vec(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_entry_round_trip() {
        let entry = TimestampEntry {
            blocks: vec![(3, [1; 32]), (900, [2; 32])],
        };
        assert_eq!(
            TimestampEntry::decode_bytes(&entry.encode_bytes()).unwrap(),
            entry
        );
    }
}
