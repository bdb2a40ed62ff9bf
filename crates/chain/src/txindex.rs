//! Transaction hash → position index (`x/`).

use basalt_crypto::Hash256;
use basalt_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::entry::TransactionIndex;

pub fn get<S: KeyValueStore>(
    store: &S,
    tx_hash: &Hash256,
) -> Result<Option<TransactionIndex>, StoreError> {
    let Some(bytes) = store.get(Column::Transactions, tx_hash)? else {
        return Ok(None);
    };
    TransactionIndex::decode_bytes(&bytes)
        .map(Some)
        .map_err(|_| StoreError::Backend("invalid transaction index entry".to_string()))
}

pub fn contains<S: KeyValueStore>(store: &S, tx_hash: &Hash256) -> Result<bool, StoreError> {
    Ok(store.get(Column::Transactions, tx_hash)?.is_some())
}

pub fn put(batch: &mut WriteBatch, tx_hash: &Hash256, index: TransactionIndex) {
    batch.put(Column::Transactions, tx_hash, index.encode_bytes());
}

pub fn delete(batch: &mut WriteBatch, tx_hash: &Hash256) {
    batch.delete(Column::Transactions, tx_hash);
}
