//! Transaction types and serialization.

use basalt_crypto::{Hash256, KeyImage, PublicKey, Signature};

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::object_hash;

pub const BASE_INPUT_TAG: u8 = 0xff;
pub const KEY_INPUT_TAG: u8 = 0x02;
pub const MULTISIGNATURE_INPUT_TAG: u8 = 0x03;
pub const KEY_OUTPUT_TAG: u8 = 0x02;
pub const MULTISIGNATURE_OUTPUT_TAG: u8 = 0x03;

pub const TRANSACTION_VERSION_1: u8 = 1;

/// Coinbase input: mints at a fixed height.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BaseInput {
    pub block_index: u32,
}

/// Ring-signed spend referencing decoy outputs of one amount by relative
/// global index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyInput {
    pub amount: u64,
    pub output_indexes: Vec<u32>,
    pub key_image: KeyImage,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MultisignatureInput {
    pub amount: u64,
    pub signature_count: u8,
    pub output_index: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransactionInput {
    Base(BaseInput),
    Key(KeyInput),
    Multisignature(MultisignatureInput),
}

impl TransactionInput {
    /// Signatures the wire format carries for this input.
    pub fn signature_count(&self) -> usize {
        match self {
            TransactionInput::Base(_) => 0,
            TransactionInput::Key(input) => input.output_indexes.len(),
            TransactionInput::Multisignature(input) => input.signature_count as usize,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            TransactionInput::Base(_) => 0,
            TransactionInput::Key(input) => input.amount,
            TransactionInput::Multisignature(input) => input.amount,
        }
    }
}

impl Encodable for TransactionInput {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        match self {
            TransactionInput::Base(input) => {
                encoder.write_u8(BASE_INPUT_TAG);
                encoder.write_varint(input.block_index as u64);
            }
            TransactionInput::Key(input) => {
                encoder.write_u8(KEY_INPUT_TAG);
                encoder.write_varint(input.amount);
                encoder.write_varint(input.output_indexes.len() as u64);
                for index in &input.output_indexes {
                    encoder.write_varint(*index as u64);
                }
                encoder.write_hash(&input.key_image);
            }
            TransactionInput::Multisignature(input) => {
                encoder.write_u8(MULTISIGNATURE_INPUT_TAG);
                encoder.write_varint(input.amount);
                encoder.write_varint(input.signature_count as u64);
                encoder.write_varint(input.output_index as u64);
            }
        }
    }
}

impl Decodable for TransactionInput {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let tag = decoder.read_u8()?;
        match tag {
            BASE_INPUT_TAG => {
                let block_index = read_varint_u32(decoder)?;
                Ok(TransactionInput::Base(BaseInput { block_index }))
            }
            KEY_INPUT_TAG => {
                let amount = decoder.read_varint()?;
                let count = decoder.read_varint_usize()?;
                let mut output_indexes = Vec::with_capacity(count);
                for _ in 0..count {
                    output_indexes.push(read_varint_u32(decoder)?);
                }
                let key_image = decoder.read_hash()?;
                Ok(TransactionInput::Key(KeyInput {
                    amount,
                    output_indexes,
                    key_image,
                }))
            }
            MULTISIGNATURE_INPUT_TAG => {
                let amount = decoder.read_varint()?;
                let signature_count = read_varint_u8(decoder)?;
                let output_index = read_varint_u32(decoder)?;
                Ok(TransactionInput::Multisignature(MultisignatureInput {
                    amount,
                    signature_count,
                    output_index,
                }))
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyOutput {
    pub key: PublicKey,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MultisignatureOutput {
    pub keys: Vec<PublicKey>,
    pub required_signature_count: u8,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransactionOutputTarget {
    Key(KeyOutput),
    Multisignature(MultisignatureOutput),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionOutput {
    pub amount: u64,
    pub target: TransactionOutputTarget,
}

impl Encodable for TransactionOutput {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.amount);
        match &self.target {
            TransactionOutputTarget::Key(output) => {
                encoder.write_u8(KEY_OUTPUT_TAG);
                encoder.write_hash(&output.key);
            }
            TransactionOutputTarget::Multisignature(output) => {
                encoder.write_u8(MULTISIGNATURE_OUTPUT_TAG);
                encoder.write_varint(output.keys.len() as u64);
                for key in &output.keys {
                    encoder.write_hash(key);
                }
                encoder.write_varint(output.required_signature_count as u64);
            }
        }
    }
}

impl Decodable for TransactionOutput {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let amount = decoder.read_varint()?;
        let tag = decoder.read_u8()?;
        let target = match tag {
            KEY_OUTPUT_TAG => TransactionOutputTarget::Key(KeyOutput {
                key: decoder.read_hash()?,
            }),
            MULTISIGNATURE_OUTPUT_TAG => {
                let count = decoder.read_varint_usize()?;
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    keys.push(decoder.read_hash()?);
                }
                let required_signature_count = read_varint_u8(decoder)?;
                TransactionOutputTarget::Multisignature(MultisignatureOutput {
                    keys,
                    required_signature_count,
                })
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };
        Ok(TransactionOutput { amount, target })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub version: u8,
    pub unlock_time: u64,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub extra: Vec<u8>,
    /// One signature vector per input, lengths implied by the input kind.
    pub signatures: Vec<Vec<Signature>>,
}

impl Transaction {
    pub fn prefix_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.encode_prefix(&mut encoder);
        encoder.into_inner()
    }

    fn encode_prefix(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.version as u64);
        encoder.write_varint(self.unlock_time);
        encoder.write_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            input.consensus_encode(encoder);
        }
        encoder.write_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            output.consensus_encode(encoder);
        }
        encoder.write_var_bytes(&self.extra);
    }

    /// Hash over the prefix only; the message bound by input signatures.
    pub fn prefix_hash(&self) -> Hash256 {
        object_hash(&self.prefix_encode())
    }

    pub fn hash(&self) -> Hash256 {
        object_hash(&crate::encoding::encode(self))
    }

    pub fn binary_size(&self) -> usize {
        crate::encoding::encode(self).len()
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && matches!(self.inputs[0], TransactionInput::Base(_))
    }

    /// Checked sum of input amounts.
    pub fn input_amount(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |acc, input| acc.checked_add(input.amount()))
    }

    /// Checked sum of output amounts; `None` signals money overflow.
    pub fn output_amount(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.encode_prefix(encoder);
        for per_input in &self.signatures {
            for signature in per_input {
                encoder.write_bytes(signature);
            }
        }
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = read_varint_u8(decoder)?;
        let unlock_time = decoder.read_varint()?;
        let input_count = decoder.read_varint_usize()?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TransactionInput::consensus_decode(decoder)?);
        }
        let output_count = decoder.read_varint_usize()?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TransactionOutput::consensus_decode(decoder)?);
        }
        let extra = decoder.read_var_bytes()?;

        let mut signatures = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let count = input.signature_count();
            let mut per_input = Vec::with_capacity(count);
            for _ in 0..count {
                per_input.push(decoder.read_fixed::<64>()?);
            }
            signatures.push(per_input);
        }

        Ok(Transaction {
            version,
            unlock_time,
            inputs,
            outputs,
            extra,
            signatures,
        })
    }
}

/// Relative output offsets as carried on the wire → absolute global
/// indexes (prefix sum). `None` on overflow.
pub fn relative_output_offsets_to_absolute(offsets: &[u32]) -> Option<Vec<u32>> {
    let mut absolute = Vec::with_capacity(offsets.len());
    let mut acc: u32 = 0;
    for (i, offset) in offsets.iter().enumerate() {
        acc = if i == 0 { *offset } else { acc.checked_add(*offset)? };
        absolute.push(acc);
    }
    Some(absolute)
}

fn read_varint_u32(decoder: &mut Decoder) -> Result<u32, DecodeError> {
    let value = decoder.read_varint()?;
    u32::try_from(value).map_err(|_| DecodeError::InvalidData("varint exceeds 32 bits"))
}

fn read_varint_u8(decoder: &mut Decoder) -> Result<u8, DecodeError> {
    let value = decoder.read_varint()?;
    u8::try_from(value).map_err(|_| DecodeError::InvalidData("varint exceeds 8 bits"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode, encode};

    fn key_output(tag: u8, amount: u64) -> TransactionOutput {
        TransactionOutput {
            amount,
            target: TransactionOutputTarget::Key(KeyOutput { key: [tag; 32] }),
        }
    }

    fn sample_key_tx() -> Transaction {
        Transaction {
            version: TRANSACTION_VERSION_1,
            unlock_time: 0,
            inputs: vec![TransactionInput::Key(KeyInput {
                amount: 700,
                output_indexes: vec![3, 0, 5],
                key_image: [9; 32],
            })],
            outputs: vec![key_output(0xaa, 400), key_output(0xbb, 290)],
            extra: vec![],
            signatures: vec![vec![[1; 64], [2; 64], [3; 64]]],
        }
    }

    #[test]
    fn coinbase_round_trip() {
        let tx = Transaction {
            version: TRANSACTION_VERSION_1,
            unlock_time: 25,
            inputs: vec![TransactionInput::Base(BaseInput { block_index: 15 })],
            outputs: vec![key_output(0xcc, 5000)],
            extra: vec![0x01; 33],
            signatures: vec![vec![]],
        };
        let decoded: Transaction = decode(&encode(&tx)).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.is_coinbase());
    }

    #[test]
    fn key_input_round_trip() {
        let tx = sample_key_tx();
        let decoded: Transaction = decode(&encode(&tx)).unwrap();
        assert_eq!(decoded, tx);
        assert!(!decoded.is_coinbase());
    }

    #[test]
    fn multisignature_round_trip() {
        let tx = Transaction {
            version: TRANSACTION_VERSION_1,
            unlock_time: 0,
            inputs: vec![TransactionInput::Multisignature(MultisignatureInput {
                amount: 1000,
                signature_count: 2,
                output_index: 4,
            })],
            outputs: vec![TransactionOutput {
                amount: 1000,
                target: TransactionOutputTarget::Multisignature(MultisignatureOutput {
                    keys: vec![[1; 32], [2; 32], [3; 32]],
                    required_signature_count: 2,
                }),
            }],
            extra: vec![],
            signatures: vec![vec![[4; 64], [5; 64]]],
        };
        let decoded: Transaction = decode(&encode(&tx)).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn prefix_hash_ignores_signatures() {
        let tx = sample_key_tx();
        let mut unsigned = tx.clone();
        unsigned.signatures = vec![vec![[0; 64], [0; 64], [0; 64]]];
        assert_eq!(tx.prefix_hash(), unsigned.prefix_hash());
        assert_ne!(tx.hash(), unsigned.hash());
    }

    #[test]
    fn unknown_input_tag_rejected() {
        let mut bytes = encode(&sample_key_tx());
        // version, unlock_time, input count, then the first input tag.
        bytes[3] = 0x7e;
        assert!(matches!(
            decode::<Transaction>(&bytes),
            Err(DecodeError::UnknownTag(0x7e))
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = encode(&sample_key_tx());
        bytes.push(0);
        assert_eq!(
            decode::<Transaction>(&bytes).unwrap_err(),
            DecodeError::TrailingBytes
        );
    }

    #[test]
    fn truncated_signatures_rejected() {
        let bytes = encode(&sample_key_tx());
        assert_eq!(
            decode::<Transaction>(&bytes[..bytes.len() - 10]).unwrap_err(),
            DecodeError::UnexpectedEof
        );
    }

    #[test]
    fn output_amount_overflow_detected() {
        let tx = Transaction {
            version: TRANSACTION_VERSION_1,
            unlock_time: 0,
            inputs: vec![TransactionInput::Base(BaseInput { block_index: 0 })],
            outputs: vec![key_output(1, u64::MAX), key_output(2, 1)],
            extra: vec![],
            signatures: vec![vec![]],
        };
        assert_eq!(tx.output_amount(), None);
    }

    #[test]
    fn relative_offsets() {
        assert_eq!(
            relative_output_offsets_to_absolute(&[3, 0, 5]),
            Some(vec![3, 3, 8])
        );
        assert_eq!(relative_output_offsets_to_absolute(&[]), Some(vec![]));
        assert_eq!(relative_output_offsets_to_absolute(&[u32::MAX, 1]), None);
    }
}
