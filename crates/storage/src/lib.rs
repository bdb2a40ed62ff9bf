//! Ordered key/value facade for the chain store.
//!
//! Every persistent namespace is a [`Column`] with a printable ASCII key
//! prefix; full keys are the prefix followed by a binary suffix (a 32-byte
//! hash or an order-preserving [`keys`] varint). Writes grouped into a
//! [`WriteBatch`] commit atomically: after a crash either every operation
//! of the batch is visible or none is.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

pub mod keys;
pub mod memory;

#[cfg(feature = "fjall")]
pub mod fjall;

#[derive(Debug)]
pub enum StoreError {
    Backend(String),
    AlreadyExists,
    NotFound,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(message) => write!(f, "{message}"),
            StoreError::AlreadyExists => write!(f, "key already exists"),
            StoreError::NotFound => write!(f, "key not found"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Column {
    /// `b/<hash>/B` → serialized block entry.
    Blocks,
    /// `c/<varint height>` → block hash, the canonical chain index.
    BlockIndex,
    /// `i/<varint height>` → block hash, tip-chain navigation namespace.
    TipIndex,
    /// `t/<varint timestamp>` → timestamp entry.
    Timestamps,
    /// `g/<varint height>` → varint cumulative generated-transaction count.
    GeneratedTransactions,
    /// `x/<hash>` → transaction index entry.
    Transactions,
    /// `k/<key image>` → varint height at which the image was spent.
    SpentKeyImages,
    /// `o/<varint amount>` → key-output list entry.
    Outputs,
    /// `m/<varint amount>` → multisignature-output list entry.
    MultisignatureOutputs,
    /// `p/<payment id>` → payment id entry.
    PaymentIds,
    /// `$…` → schema metadata (`$version`).
    Meta,
}

impl Column {
    pub const ALL: [Column; 11] = [
        Column::Blocks,
        Column::BlockIndex,
        Column::TipIndex,
        Column::Timestamps,
        Column::GeneratedTransactions,
        Column::Transactions,
        Column::SpentKeyImages,
        Column::Outputs,
        Column::MultisignatureOutputs,
        Column::PaymentIds,
        Column::Meta,
    ];

    pub const fn prefix(self) -> &'static [u8] {
        match self {
            Column::Blocks => b"b/",
            Column::BlockIndex => b"c/",
            Column::TipIndex => b"i/",
            Column::Timestamps => b"t/",
            Column::GeneratedTransactions => b"g/",
            Column::Transactions => b"x/",
            Column::SpentKeyImages => b"k/",
            Column::Outputs => b"o/",
            Column::MultisignatureOutputs => b"m/",
            Column::PaymentIds => b"p/",
            Column::Meta => b"$",
        }
    }

    /// Full on-disk key for a suffix within this column.
    pub fn key(self, suffix: &[u8]) -> Vec<u8> {
        let prefix = self.prefix();
        let mut key = Vec::with_capacity(prefix.len() + suffix.len());
        key.extend_from_slice(prefix);
        key.extend_from_slice(suffix);
        key
    }

    /// Smallest key strictly greater than every key of this column.
    ///
    /// Prefixes are printable ASCII below 0x7f, so bumping the final byte
    /// never overflows.
    pub fn upper_bound(self) -> Vec<u8> {
        let mut bound = self.prefix().to_vec();
        let last = bound.last_mut().expect("prefix is never empty");
        *last += 1;
        bound
    }
}

#[derive(Clone, Debug)]
pub struct WriteKey(SmallVec<[u8; 64]>);

impl WriteKey {
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl AsRef<[u8]> for WriteKey {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for WriteKey {
    fn from(value: Vec<u8>) -> Self {
        Self(SmallVec::from_vec(value))
    }
}

impl From<&[u8]> for WriteKey {
    fn from(value: &[u8]) -> Self {
        Self(SmallVec::from_slice(value))
    }
}

impl<const N: usize> From<[u8; N]> for WriteKey {
    fn from(value: [u8; N]) -> Self {
        Self(SmallVec::from_slice(&value))
    }
}

impl<const N: usize> From<&[u8; N]> for WriteKey {
    fn from(value: &[u8; N]) -> Self {
        Self(SmallVec::from_slice(value))
    }
}

#[derive(Clone, Debug)]
pub struct WriteValue(SmallVec<[u8; 32]>);

impl WriteValue {
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0.into_vec()
    }
}

impl AsRef<[u8]> for WriteValue {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for WriteValue {
    fn from(value: Vec<u8>) -> Self {
        Self(SmallVec::from_vec(value))
    }
}

impl From<&[u8]> for WriteValue {
    fn from(value: &[u8]) -> Self {
        Self(SmallVec::from_slice(value))
    }
}

impl<const N: usize> From<[u8; N]> for WriteValue {
    fn from(value: [u8; N]) -> Self {
        Self(SmallVec::from_slice(&value))
    }
}

impl<const N: usize> From<&[u8; N]> for WriteValue {
    fn from(value: &[u8; N]) -> Self {
        Self(SmallVec::from_slice(value))
    }
}

#[derive(Clone, Debug)]
pub enum WriteOp {
    Put {
        column: Column,
        key: WriteKey,
        value: WriteValue,
    },
    Delete {
        column: Column,
        key: WriteKey,
    },
}

#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.ops.reserve(additional);
    }

    pub fn put(&mut self, column: Column, key: impl Into<WriteKey>, value: impl Into<WriteValue>) {
        self.ops.push(WriteOp::Put {
            column,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, column: Column, key: impl Into<WriteKey>) {
        self.ops.push(WriteOp::Delete {
            column,
            key: key.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Key suffixes paired with values, in key order (prefix stripped).
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Cursor callback. Return `Ok(false)` to stop the scan early.
pub type ScanVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<bool, StoreError> + 'a;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError>;

    /// Forward cursor over a column, optionally starting at `start` (a key
    /// suffix, inclusive).
    fn for_each_forward<'a>(
        &self,
        column: Column,
        start: Option<&[u8]>,
        visitor: &mut ScanVisitor<'a>,
    ) -> Result<(), StoreError>;

    /// Reverse cursor over a column, optionally starting at `start` (a key
    /// suffix, inclusive) and walking toward smaller keys.
    fn for_each_reverse<'a>(
        &self,
        column: Column,
        start: Option<&[u8]>,
        visitor: &mut ScanVisitor<'a>,
    ) -> Result<(), StoreError>;

    /// Commit boundary: apply every operation atomically and durably.
    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    /// `put` that fails with [`StoreError::AlreadyExists`] on a live key.
    fn insert_new(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if self.get(column, key)?.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        self.put(column, key, value)
    }

    /// `delete` that fails with [`StoreError::NotFound`] on a dead key.
    fn delete_existing(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        if self.get(column, key)?.is_none() {
            return Err(StoreError::NotFound);
        }
        self.delete(column, key)
    }

    fn scan_forward(
        &self,
        column: Column,
        start: Option<&[u8]>,
    ) -> Result<ScanResult, StoreError> {
        let mut results = Vec::new();
        self.for_each_forward(column, start, &mut |key, value| {
            results.push((key.to_vec(), value.to_vec()));
            Ok(true)
        })?;
        Ok(results)
    }

    /// First entry of the column in key order.
    fn first(&self, column: Column) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut found = None;
        self.for_each_forward(column, None, &mut |key, value| {
            found = Some((key.to_vec(), value.to_vec()));
            Ok(false)
        })?;
        Ok(found)
    }

    /// Last entry of the column in key order (the reverse-cursor head).
    fn last(&self, column: Column) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut found = None;
        self.for_each_reverse(column, None, &mut |key, value| {
            found = Some((key.to_vec(), value.to_vec()));
            Ok(false)
        })?;
        Ok(found)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.as_ref().get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.as_ref().put(column, key, value)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.as_ref().delete(column, key)
    }

    fn for_each_forward<'a>(
        &self,
        column: Column,
        start: Option<&[u8]>,
        visitor: &mut ScanVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.as_ref().for_each_forward(column, start, visitor)
    }

    fn for_each_reverse<'a>(
        &self,
        column: Column,
        start: Option<&[u8]>,
        visitor: &mut ScanVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.as_ref().for_each_reverse(column, start, visitor)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.as_ref().write_batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_prefixes_are_distinct() {
        for (i, a) in Column::ALL.iter().enumerate() {
            for b in Column::ALL.iter().skip(i + 1) {
                assert_ne!(a.prefix(), b.prefix(), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn column_key_concatenates() {
        assert_eq!(Column::BlockIndex.key(&[0x01, 0x02]), b"c/\x01\x02".to_vec());
        assert_eq!(Column::Meta.key(b"version"), b"$version".to_vec());
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let bound = Column::BlockIndex.upper_bound();
        assert_eq!(bound, b"c0".to_vec());
        assert!(Column::BlockIndex.key(&[0xff; 40]) < bound);
    }
}
