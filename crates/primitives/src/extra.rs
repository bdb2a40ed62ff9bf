//! The `extra` field TLV stream.
//!
//! Tags: `0x00` padding, `0x01` transaction public key, `0x02` nonce
//! (whose payload may carry a payment id behind sub-tag `0x00`), `0x03`
//! merge-mining tag. Parsing is lenient: an unparseable remainder yields
//! the fields collected so far, matching how nodes treat foreign extras.

use basalt_crypto::{Hash256, PublicKey};

use crate::encoding::{Decoder, Encoder};

pub const EXTRA_PADDING_TAG: u8 = 0x00;
pub const EXTRA_PUBKEY_TAG: u8 = 0x01;
pub const EXTRA_NONCE_TAG: u8 = 0x02;
pub const EXTRA_MERGE_MINING_TAG: u8 = 0x03;

pub const EXTRA_NONCE_PAYMENT_ID: u8 = 0x00;

pub const EXTRA_NONCE_MAX_SIZE: usize = 255;
pub const EXTRA_PADDING_MAX_SIZE: usize = 255;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MergeMiningTag {
    pub depth: u64,
    pub merkle_root: Hash256,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExtraField {
    Padding(usize),
    PublicKey(PublicKey),
    Nonce(Vec<u8>),
    MergeMiningTag(MergeMiningTag),
}

pub fn parse_extra(extra: &[u8]) -> Vec<ExtraField> {
    let mut fields = Vec::new();
    let mut decoder = Decoder::new(extra);

    while !decoder.is_empty() {
        let Ok(tag) = decoder.read_u8() else { break };
        match tag {
            EXTRA_PADDING_TAG => {
                // Padding runs to the end of extra and must be all zeros.
                let size = decoder.remaining();
                if size > EXTRA_PADDING_MAX_SIZE {
                    break;
                }
                let Ok(padding) = decoder.read_bytes(size) else { break };
                if padding.iter().any(|byte| *byte != 0) {
                    break;
                }
                fields.push(ExtraField::Padding(size + 1));
            }
            EXTRA_PUBKEY_TAG => {
                let Ok(key) = decoder.read_hash() else { break };
                fields.push(ExtraField::PublicKey(key));
            }
            EXTRA_NONCE_TAG => {
                let Ok(nonce) = decoder.read_var_bytes() else { break };
                if nonce.len() > EXTRA_NONCE_MAX_SIZE {
                    break;
                }
                fields.push(ExtraField::Nonce(nonce));
            }
            EXTRA_MERGE_MINING_TAG => {
                let Ok(payload) = decoder.read_var_bytes() else { break };
                let mut inner = Decoder::new(&payload);
                let Ok(depth) = inner.read_varint() else { break };
                let Ok(merkle_root) = inner.read_hash() else { break };
                if !inner.is_empty() {
                    break;
                }
                fields.push(ExtraField::MergeMiningTag(MergeMiningTag {
                    depth,
                    merkle_root,
                }));
            }
            _ => break,
        }
    }

    fields
}

pub fn extra_public_key(extra: &[u8]) -> Option<PublicKey> {
    parse_extra(extra).into_iter().find_map(|field| match field {
        ExtraField::PublicKey(key) => Some(key),
        _ => None,
    })
}

/// Payment id carried in the nonce field, if any.
pub fn extra_payment_id(extra: &[u8]) -> Option<Hash256> {
    parse_extra(extra).into_iter().find_map(|field| match field {
        ExtraField::Nonce(nonce) if nonce.len() == 33 && nonce[0] == EXTRA_NONCE_PAYMENT_ID => {
            let mut id = [0u8; 32];
            id.copy_from_slice(&nonce[1..]);
            Some(id)
        }
        _ => None,
    })
}

pub fn extra_merge_mining_tag(extra: &[u8]) -> Option<MergeMiningTag> {
    parse_extra(extra).into_iter().find_map(|field| match field {
        ExtraField::MergeMiningTag(tag) => Some(tag),
        _ => None,
    })
}

pub fn append_public_key(extra: &mut Vec<u8>, key: &PublicKey) {
    extra.push(EXTRA_PUBKEY_TAG);
    extra.extend_from_slice(key);
}

pub fn append_payment_id(extra: &mut Vec<u8>, payment_id: &Hash256) {
    extra.push(EXTRA_NONCE_TAG);
    extra.push(33);
    extra.push(EXTRA_NONCE_PAYMENT_ID);
    extra.extend_from_slice(payment_id);
}

pub fn append_merge_mining_tag(extra: &mut Vec<u8>, tag: &MergeMiningTag) {
    let mut payload = Encoder::new();
    payload.write_varint(tag.depth);
    payload.write_hash(&tag.merkle_root);
    let payload = payload.into_inner();
    extra.push(EXTRA_MERGE_MINING_TAG);
    let mut size = Encoder::new();
    size.write_varint(payload.len() as u64);
    extra.extend_from_slice(&size.into_inner());
    extra.extend_from_slice(&payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_round_trip() {
        let mut extra = Vec::new();
        append_public_key(&mut extra, &[7; 32]);
        assert_eq!(extra_public_key(&extra), Some([7; 32]));
        assert_eq!(extra_payment_id(&extra), None);
    }

    #[test]
    fn payment_id_round_trip() {
        let mut extra = Vec::new();
        append_public_key(&mut extra, &[7; 32]);
        append_payment_id(&mut extra, &[0xab; 32]);
        assert_eq!(extra_payment_id(&extra), Some([0xab; 32]));
    }

    #[test]
    fn merge_mining_tag_round_trip() {
        let mut extra = Vec::new();
        let tag = MergeMiningTag {
            depth: 3,
            merkle_root: [0x44; 32],
        };
        append_merge_mining_tag(&mut extra, &tag);
        assert_eq!(extra_merge_mining_tag(&extra), Some(tag));
    }

    #[test]
    fn nonce_without_payment_marker_is_not_a_payment_id() {
        let extra = vec![EXTRA_NONCE_TAG, 4, 0x01, 0xde, 0xad, 0xbe];
        assert_eq!(extra_payment_id(&extra), None);
        assert_eq!(
            parse_extra(&extra),
            vec![ExtraField::Nonce(vec![0x01, 0xde, 0xad, 0xbe])]
        );
    }

    #[test]
    fn padding_must_be_zero() {
        let extra = vec![EXTRA_PADDING_TAG, 0, 0, 0];
        assert_eq!(parse_extra(&extra), vec![ExtraField::Padding(4)]);

        let dirty = vec![EXTRA_PADDING_TAG, 0, 1, 0];
        assert_eq!(parse_extra(&dirty), vec![]);
    }

    #[test]
    fn garbage_stops_parsing_after_valid_fields() {
        let mut extra = Vec::new();
        append_public_key(&mut extra, &[9; 32]);
        extra.push(0x77);
        let fields = parse_extra(&extra);
        assert_eq!(fields, vec![ExtraField::PublicKey([9; 32])]);
    }

    #[test]
    fn truncated_pubkey_yields_nothing() {
        let extra = vec![EXTRA_PUBKEY_TAG, 1, 2, 3];
        assert_eq!(parse_extra(&extra), vec![]);
    }
}
