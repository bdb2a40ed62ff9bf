//! Height → block hash index helpers (`c/` and its `i/` mirror).

use basalt_crypto::Hash256;
use basalt_storage::keys::{read_varint_suffix, write_varint_sqlite4};
use basalt_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::entry::BlockEntry;
use crate::ChainError;

pub fn height_key(height: u32) -> basalt_storage::keys::VarintBuf {
    write_varint_sqlite4(height as u64)
}

/// Block storage key: hash plus the `/B` record marker.
pub fn block_key(hash: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.extend_from_slice(hash);
    key.extend_from_slice(b"/B");
    key
}

pub fn block_hash_at<S: KeyValueStore>(
    store: &S,
    height: u32,
) -> Result<Option<Hash256>, StoreError> {
    let value = store.get(Column::BlockIndex, &height_key(height))?;
    Ok(value.and_then(|bytes| bytes.try_into().ok()))
}

pub fn block_entry<S: KeyValueStore>(
    store: &S,
    hash: &Hash256,
) -> Result<Option<BlockEntry>, ChainError> {
    let Some(bytes) = store.get(Column::Blocks, &block_key(hash))? else {
        return Ok(None);
    };
    Ok(Some(BlockEntry::decode_bytes(&bytes)?))
}

pub fn block_entry_at<S: KeyValueStore>(
    store: &S,
    height: u32,
) -> Result<Option<BlockEntry>, ChainError> {
    match block_hash_at(store, height)? {
        Some(hash) => block_entry(store, &hash),
        None => Ok(None),
    }
}

/// `(height, hash)` of the reverse-cursor head, i.e. the chain tail.
pub fn tail<S: KeyValueStore>(store: &S) -> Result<Option<(u32, Hash256)>, StoreError> {
    let Some((key, value)) = store.last(Column::BlockIndex)? else {
        return Ok(None);
    };
    let height = read_varint_suffix(&key)
        .ok_or_else(|| StoreError::Backend("malformed block index key".into()))?;
    let hash: Hash256 = value
        .try_into()
        .map_err(|_| StoreError::Backend("malformed block index value".into()))?;
    Ok(Some((height as u32, hash)))
}

pub fn block_ids<S: KeyValueStore>(
    store: &S,
    start_height: u32,
    max_count: usize,
) -> Result<Vec<Hash256>, StoreError> {
    let mut ids = Vec::new();
    store.for_each_forward(
        Column::BlockIndex,
        Some(&height_key(start_height)),
        &mut |_key, value| {
            if ids.len() >= max_count {
                return Ok(false);
            }
            let hash: Hash256 = value
                .try_into()
                .map_err(|_| StoreError::Backend("malformed block index value".into()))?;
            ids.push(hash);
            Ok(true)
        },
    )?;
    Ok(ids)
}

pub fn put(batch: &mut WriteBatch, height: u32, hash: &Hash256) {
    batch.put(Column::BlockIndex, height_key(height).to_vec(), hash);
    batch.put(Column::TipIndex, height_key(height).to_vec(), hash);
}

pub fn delete(batch: &mut WriteBatch, height: u32) {
    batch.delete(Column::BlockIndex, height_key(height).to_vec());
    batch.delete(Column::TipIndex, height_key(height).to_vec());
}
