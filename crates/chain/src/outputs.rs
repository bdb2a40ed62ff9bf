//! Per-amount output indexes (`o/` for key outputs, `m/` for
//! multisignature outputs).
//!
//! Both lists are append-only while the chain moves forward and popped
//! from the tail on rollback, so an output's position is its stable
//! global index for that amount.

use basalt_primitives::encoding::{
    decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder,
};
use basalt_storage::keys::write_varint_sqlite4;
use basalt_storage::{Column, KeyValueStore};

use crate::entry::TransactionIndex;
use crate::ChainError;

pub fn amount_key(amount: u64) -> basalt_storage::keys::VarintBuf {
    write_varint_sqlite4(amount)
}

/// Key outputs of one amount, ordered by acceptance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputsEntry {
    pub outputs: Vec<(TransactionIndex, u16)>,
}

impl Encodable for OutputsEntry {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.outputs.len() as u64);
        for (index, output) in &self.outputs {
            index.consensus_encode(encoder);
            encoder.write_varint(*output as u64);
        }
    }
}

impl Decodable for OutputsEntry {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let count = decoder.read_varint_usize()?;
        let mut outputs = Vec::with_capacity(count);
        for _ in 0..count {
            let index = TransactionIndex::consensus_decode(decoder)?;
            let output = decoder.read_varint()?;
            outputs.push((
                index,
                u16::try_from(output).map_err(|_| DecodeError::InvalidData("output position"))?,
            ));
        }
        Ok(Self { outputs })
    }
}

impl OutputsEntry {
    pub fn encode_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MultisignatureOutputUsage {
    pub transaction_index: TransactionIndex,
    pub output_index: u16,
    pub is_used: bool,
}

/// Multisignature outputs of one amount; `is_used` flips true exactly
/// once when the output is consumed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MultisignatureOutputEntry {
    pub outputs: Vec<MultisignatureOutputUsage>,
}

impl Encodable for MultisignatureOutputEntry {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.outputs.len() as u64);
        for usage in &self.outputs {
            usage.transaction_index.consensus_encode(encoder);
            encoder.write_varint(usage.output_index as u64);
            encoder.write_u8(usage.is_used as u8);
        }
    }
}

impl Decodable for MultisignatureOutputEntry {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let count = decoder.read_varint_usize()?;
        let mut outputs = Vec::with_capacity(count);
        for _ in 0..count {
            let transaction_index = TransactionIndex::consensus_decode(decoder)?;
            let output_index = decoder.read_varint()?;
            let is_used = match decoder.read_u8()? {
                0 => false,
                1 => true,
                _ => return Err(DecodeError::InvalidData("multisig usage flag")),
            };
            outputs.push(MultisignatureOutputUsage {
                transaction_index,
                output_index: u16::try_from(output_index)
                    .map_err(|_| DecodeError::InvalidData("output position"))?,
                is_used,
            });
        }
        Ok(Self { outputs })
    }
}

impl MultisignatureOutputEntry {
    pub fn encode_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}

pub fn key_outputs<S: KeyValueStore>(
    store: &S,
    amount: u64,
) -> Result<Option<OutputsEntry>, ChainError> {
    let Some(bytes) = store.get(Column::Outputs, &amount_key(amount))? else {
        return Ok(None);
    };
    Ok(Some(OutputsEntry::decode_bytes(&bytes)?))
}

pub fn multisignature_outputs<S: KeyValueStore>(
    store: &S,
    amount: u64,
) -> Result<Option<MultisignatureOutputEntry>, ChainError> {
    let Some(bytes) = store.get(Column::MultisignatureOutputs, &amount_key(amount))? else {
        return Ok(None);
    };
    Ok(Some(MultisignatureOutputEntry::decode_bytes(&bytes)?))
}
