//! Payment id index (`p/`): extra-carried payment id → member tx hashes.

use basalt_crypto::Hash256;
use basalt_primitives::encoding::{
    decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder,
};
use basalt_storage::{Column, KeyValueStore, WriteBatch};

use crate::ChainError;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PaymentIdEntry {
    pub transaction_hashes: Vec<Hash256>,
}

impl Encodable for PaymentIdEntry {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.transaction_hashes.len() as u64);
        for hash in &self.transaction_hashes {
            encoder.write_hash(hash);
        }
    }
}

impl Decodable for PaymentIdEntry {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let count = decoder.read_varint_usize()?;
        let mut transaction_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            transaction_hashes.push(decoder.read_hash()?);
        }
        Ok(Self { transaction_hashes })
    }
}

impl PaymentIdEntry {
    pub fn encode_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}

pub fn get<S: KeyValueStore>(
    store: &S,
    payment_id: &Hash256,
) -> Result<Option<PaymentIdEntry>, ChainError> {
    let Some(bytes) = store.get(Column::PaymentIds, payment_id)? else {
        return Ok(None);
    };
    Ok(Some(PaymentIdEntry::decode_bytes(&bytes)?))
}

pub fn push_transaction<S: KeyValueStore>(
    store: &S,
    batch: &mut WriteBatch,
    payment_id: &Hash256,
    tx_hash: &Hash256,
) -> Result<(), ChainError> {
    let mut entry = get(store, payment_id)?.unwrap_or_default();
    entry.transaction_hashes.push(*tx_hash);
    batch.put(Column::PaymentIds, payment_id, entry.encode_bytes());
    Ok(())
}

/// Removes a tx from its payment id entry, dropping the entry when empty.
pub fn pop_transaction<S: KeyValueStore>(
    store: &S,
    batch: &mut WriteBatch,
    payment_id: &Hash256,
    tx_hash: &Hash256,
) -> Result<(), ChainError> {
    let mut entry = get(store, payment_id)?.unwrap_or_default();
    entry.transaction_hashes.retain(|member| member != tx_hash);
    if entry.transaction_hashes.is_empty() {
        batch.delete(Column::PaymentIds, payment_id);
    } else {
        batch.put(Column::PaymentIds, payment_id, entry.encode_bytes());
    }
    Ok(())
}
