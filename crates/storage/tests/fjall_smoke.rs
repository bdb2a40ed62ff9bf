#![cfg(feature = "fjall")]

use basalt_storage::fjall::FjallStore;
use basalt_storage::keys::{read_varint_suffix, write_varint_sqlite4};
use basalt_storage::{Column, KeyValueStore, WriteBatch};

#[test]
fn point_ops_and_scans() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FjallStore::open(dir.path()).expect("open store");

    store.put(Column::Meta, b"version", b"4").unwrap();
    assert_eq!(store.get(Column::Meta, b"version").unwrap(), Some(b"4".to_vec()));

    for height in 0u64..300 {
        store
            .put(Column::BlockIndex, &write_varint_sqlite4(height), &[(height % 251) as u8])
            .unwrap();
    }

    // Reverse cursor lands on the numerically largest height even though
    // encodings have mixed widths.
    let (key, _) = store.last(Column::BlockIndex).unwrap().unwrap();
    assert_eq!(read_varint_suffix(&key), Some(299));

    let start = write_varint_sqlite4(295);
    let tail = store.scan_forward(Column::BlockIndex, Some(&start)).unwrap();
    assert_eq!(tail.len(), 5);

    // Columns do not bleed into each other.
    assert!(store.scan_forward(Column::TipIndex, None).unwrap().is_empty());
}

#[test]
fn batch_commit_is_applied_after_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let store = FjallStore::open(dir.path()).expect("open store");
        let mut batch = WriteBatch::new();
        batch.put(Column::Transactions, [7u8; 32], b"entry".as_slice());
        batch.put(Column::SpentKeyImages, [8u8; 32], write_varint_sqlite4(12).to_vec());
        store.write_batch(&batch).unwrap();
    }

    let store = FjallStore::open(dir.path()).expect("reopen store");
    assert_eq!(
        store.get(Column::Transactions, &[7; 32]).unwrap(),
        Some(b"entry".to_vec())
    );
    assert_eq!(
        store
            .get(Column::SpentKeyImages, &[8; 32])
            .unwrap()
            .as_deref()
            .and_then(read_varint_suffix),
        Some(12)
    );
}
