use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::{Column, KeyValueStore, ScanVisitor, StoreError, WriteBatch, WriteOp};

type MemoryStoreMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// BTreeMap-backed store. No durability; used by tests and tools.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("memory store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full ordered dump of the keyspace. Lets tests compare store states
    /// byte-for-byte.
    pub fn dump(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let guard = self.inner.read().expect("memory store lock");
        guard
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        Ok(guard.get(&column.key(key)).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        guard.insert(column.key(key), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        guard.remove(&column.key(key));
        Ok(())
    }

    fn for_each_forward<'a>(
        &self,
        column: Column,
        start: Option<&[u8]>,
        visitor: &mut ScanVisitor<'a>,
    ) -> Result<(), StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        let low = match start {
            Some(suffix) => column.key(suffix),
            None => column.prefix().to_vec(),
        };
        let high = column.upper_bound();
        let prefix_len = column.prefix().len();
        for (key, value) in guard.range::<[u8], _>((Bound::Included(&low[..]), Bound::Excluded(&high[..]))) {
            if !visitor(&key[prefix_len..], value)? {
                break;
            }
        }
        Ok(())
    }

    fn for_each_reverse<'a>(
        &self,
        column: Column,
        start: Option<&[u8]>,
        visitor: &mut ScanVisitor<'a>,
    ) -> Result<(), StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        let low = column.prefix().to_vec();
        let high = match start {
            Some(suffix) => Bound::Included(column.key(suffix)),
            None => Bound::Excluded(column.upper_bound()),
        };
        let prefix_len = column.prefix().len();
        let range = (Bound::Included(low), high);
        for (key, value) in guard.range::<Vec<u8>, _>(range).rev() {
            if !visitor(&key[prefix_len..], value)? {
                break;
            }
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    guard.insert(column.key(key.as_slice()), value.as_slice().to_vec());
                }
                WriteOp::Delete { column, key } => {
                    guard.remove(&column.key(key.as_slice()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::write_varint_sqlite4;

    #[test]
    fn point_ops() {
        let store = MemoryStore::new();
        store.put(Column::Meta, b"version", b"1").unwrap();
        assert_eq!(store.get(Column::Meta, b"version").unwrap(), Some(b"1".to_vec()));
        store.delete(Column::Meta, b"version").unwrap();
        assert_eq!(store.get(Column::Meta, b"version").unwrap(), None);
    }

    #[test]
    fn insert_new_rejects_duplicates() {
        let store = MemoryStore::new();
        store.insert_new(Column::Transactions, &[1; 32], b"a").unwrap();
        let err = store.insert_new(Column::Transactions, &[1; 32], b"b").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[test]
    fn delete_existing_requires_key() {
        let store = MemoryStore::new();
        let err = store
            .delete_existing(Column::SpentKeyImages, &[9; 32])
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn forward_scan_is_column_scoped() {
        let store = MemoryStore::new();
        store.put(Column::BlockIndex, &write_varint_sqlite4(0), &[0xaa; 32]).unwrap();
        store.put(Column::BlockIndex, &write_varint_sqlite4(1), &[0xbb; 32]).unwrap();
        store.put(Column::TipIndex, &write_varint_sqlite4(0), &[0xcc; 32]).unwrap();

        let entries = store.scan_forward(Column::BlockIndex, None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, vec![0xaa; 32]);
        assert_eq!(entries[1].1, vec![0xbb; 32]);
    }

    #[test]
    fn forward_scan_honors_start() {
        let store = MemoryStore::new();
        for height in 0u64..5 {
            store
                .put(Column::BlockIndex, &write_varint_sqlite4(height), &[height as u8])
                .unwrap();
        }
        let start = write_varint_sqlite4(2);
        let entries = store.scan_forward(Column::BlockIndex, Some(&start)).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].1, vec![2]);
    }

    #[test]
    fn reverse_scan_finds_tail() {
        let store = MemoryStore::new();
        for height in [0u64, 3, 7, 250, 70_000] {
            store
                .put(Column::BlockIndex, &write_varint_sqlite4(height), &height.to_le_bytes())
                .unwrap();
        }
        let (key, value) = store.last(Column::BlockIndex).unwrap().unwrap();
        assert_eq!(crate::keys::read_varint_suffix(&key), Some(70_000));
        assert_eq!(value, 70_000u64.to_le_bytes().to_vec());
    }

    #[test]
    fn reverse_scan_from_start_suffix() {
        let store = MemoryStore::new();
        for height in 0u64..10 {
            store
                .put(Column::BlockIndex, &write_varint_sqlite4(height), &[height as u8])
                .unwrap();
        }
        let mut seen = Vec::new();
        let start = write_varint_sqlite4(6);
        store
            .for_each_reverse(Column::BlockIndex, Some(&start), &mut |_key, value| {
                seen.push(value[0]);
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, vec![6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn batch_applies_all_ops() {
        let store = MemoryStore::new();
        store.put(Column::Transactions, &[1; 32], b"old").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(Column::Transactions, [2u8; 32], b"new".as_slice());
        batch.delete(Column::Transactions, [1u8; 32]);
        store.write_batch(&batch).unwrap();

        assert_eq!(store.get(Column::Transactions, &[1; 32]).unwrap(), None);
        assert_eq!(
            store.get(Column::Transactions, &[2; 32]).unwrap(),
            Some(b"new".to_vec())
        );
    }
}
