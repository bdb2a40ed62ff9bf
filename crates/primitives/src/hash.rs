//! Object hashing helpers.

use basalt_crypto::{fast_hash, Hash256};

use crate::encoding::Encoder;

/// Hash of a serialized object.
pub fn object_hash(bytes: &[u8]) -> Hash256 {
    fast_hash(bytes)
}

/// Hash of a length-prefixed blob, used for block identities.
pub fn blob_hash(blob: &[u8]) -> Hash256 {
    let mut encoder = Encoder::new();
    encoder.write_varint(blob.len() as u64);
    encoder.write_bytes(blob);
    fast_hash(&encoder.into_inner())
}

/// Merkle tree hash over transaction hashes.
///
/// The reduction keeps the leftmost `2·cnt − count` leaves unpaired in the
/// first round (cnt = largest power of two ≤ count), so the tree has no
/// duplicated last element.
pub fn tree_hash(hashes: &[Hash256]) -> Hash256 {
    match hashes.len() {
        0 => fast_hash(&[]),
        1 => hashes[0],
        2 => hash_pair(&hashes[0], &hashes[1]),
        count => {
            let mut cnt = 1usize;
            while cnt * 2 <= count {
                cnt *= 2;
            }

            let unpaired = 2 * cnt - count;
            let mut level: Vec<Hash256> = hashes[..unpaired].to_vec();
            level.reserve(cnt);
            let mut i = unpaired;
            while i < count {
                level.push(hash_pair(&hashes[i], &hashes[i + 1]));
                i += 2;
            }
            debug_assert_eq!(level.len(), cnt);

            while level.len() > 1 {
                let mut next = Vec::with_capacity(level.len() / 2);
                for pair in level.chunks_exact(2) {
                    next.push(hash_pair(&pair[0], &pair[1]));
                }
                level = next;
            }
            level[0]
        }
    }
}

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    fast_hash(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: u8) -> Hash256 {
        [tag; 32]
    }

    #[test]
    fn single_leaf_is_identity() {
        assert_eq!(tree_hash(&[leaf(1)]), leaf(1));
    }

    #[test]
    fn two_leaves_hash_once() {
        assert_eq!(tree_hash(&[leaf(1), leaf(2)]), hash_pair(&leaf(1), &leaf(2)));
    }

    #[test]
    fn three_leaves_keep_first_unpaired() {
        let expected = hash_pair(&leaf(1), &hash_pair(&leaf(2), &leaf(3)));
        assert_eq!(tree_hash(&[leaf(1), leaf(2), leaf(3)]), expected);
    }

    #[test]
    fn four_leaves_balanced() {
        let expected = hash_pair(
            &hash_pair(&leaf(1), &leaf(2)),
            &hash_pair(&leaf(3), &leaf(4)),
        );
        assert_eq!(tree_hash(&[leaf(1), leaf(2), leaf(3), leaf(4)]), expected);
    }

    #[test]
    fn order_matters() {
        assert_ne!(
            tree_hash(&[leaf(1), leaf(2), leaf(3)]),
            tree_hash(&[leaf(3), leaf(2), leaf(1)])
        );
    }

    #[test]
    fn larger_trees_are_stable() {
        let leaves: Vec<Hash256> = (0u8..13).map(leaf).collect();
        assert_eq!(tree_hash(&leaves), tree_hash(&leaves));
        let more: Vec<Hash256> = (0u8..14).map(leaf).collect();
        assert_ne!(tree_hash(&leaves), tree_hash(&more));
    }
}
