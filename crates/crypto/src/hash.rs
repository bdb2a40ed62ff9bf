//! Keccak-256 fast hash and derived hash-to-group maps.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use sha3::{Digest, Keccak256};

use crate::Hash256;

pub fn fast_hash(data: &[u8]) -> Hash256 {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order(fast_hash(data))
}

/// Deterministic map onto the prime-order subgroup.
///
/// Try-and-increment over compressed candidates: rehash until a candidate
/// decompresses, then clear the cofactor. Variable time, which is fine for
/// verification-side use.
pub fn hash_to_point(data: &[u8]) -> EdwardsPoint {
    let mut candidate = fast_hash(data);
    loop {
        if let Some(point) = CompressedEdwardsY(candidate).decompress() {
            let point = point.mul_by_cofactor();
            if !point.is_identity() {
                return point;
            }
        }
        candidate = fast_hash(&candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_vector() {
        // Keccak-256(""), distinct from NIST SHA3-256.
        let expected = "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";
        assert_eq!(hex::encode(fast_hash(b"")), expected);
    }

    #[test]
    fn keccak_abc() {
        let expected = "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45";
        assert_eq!(hex::encode(fast_hash(b"abc")), expected);
    }

    #[test]
    fn hash_to_point_is_deterministic_and_torsion_free() {
        let a = hash_to_point(b"seed");
        let b = hash_to_point(b"seed");
        assert_eq!(a.compress(), b.compress());
        assert!(a.is_torsion_free());
        assert_ne!(
            hash_to_point(b"seed").compress(),
            hash_to_point(b"other").compress()
        );
    }

    #[test]
    fn hash_to_scalar_reduces() {
        let s = hash_to_scalar(b"anything");
        // Reduced scalars round-trip through canonical bytes.
        assert_eq!(Scalar::from_canonical_bytes(s.to_bytes()).unwrap(), s);
    }
}
