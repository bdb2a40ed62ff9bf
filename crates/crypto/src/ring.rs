//! Ring signatures and key images.
//!
//! A signer holding one secret key among N ring members proves
//! membership without revealing which, bound to a key image that is
//! unique per spent output.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

use crate::hash::{hash_to_point, hash_to_scalar};
use crate::{Hash256, KeyImage, PublicKey, SecretKey, Signature};

/// `KI = x·Hp(P)` for the key pair `(P, x)`.
pub fn generate_key_image(public_key: &PublicKey, secret_key: &SecretKey) -> Option<KeyImage> {
    let secret: Option<Scalar> = Scalar::from_canonical_bytes(*secret_key).into();
    let secret = secret?;
    let base = hash_to_point(public_key);
    Some((secret * base).compress().to_bytes())
}

/// Subgroup membership: `ℓ·KI == identity`, i.e. the image carries no
/// small-order component an attacker could use to split one spend into
/// several distinct images.
pub fn key_image_in_domain(key_image: &KeyImage) -> bool {
    match CompressedEdwardsY(*key_image).decompress() {
        Some(point) => point.is_torsion_free(),
        None => false,
    }
}

fn split_signature(signature: &Signature) -> Option<(Scalar, Scalar)> {
    let c: Option<Scalar> = Scalar::from_canonical_bytes(
        signature[..32].try_into().expect("signature half"),
    )
    .into();
    let r: Option<Scalar> = Scalar::from_canonical_bytes(
        signature[32..].try_into().expect("signature half"),
    )
    .into();
    Some((c?, r?))
}

pub fn check_ring_signature(
    prefix_hash: &Hash256,
    key_image: &KeyImage,
    public_keys: &[PublicKey],
    signatures: &[Signature],
) -> bool {
    if public_keys.is_empty() || public_keys.len() != signatures.len() {
        return false;
    }
    let Some(image) = CompressedEdwardsY(*key_image).decompress() else {
        return false;
    };

    let mut challenge_buf = Vec::with_capacity(32 + public_keys.len() * 64);
    challenge_buf.extend_from_slice(prefix_hash);
    let mut sum = Scalar::ZERO;

    for (public_key, signature) in public_keys.iter().zip(signatures) {
        let Some((c, r)) = split_signature(signature) else {
            return false;
        };
        let Some(point) = CompressedEdwardsY(*public_key).decompress() else {
            return false;
        };

        let l = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &point, &r);
        let base = hash_to_point(public_key);
        let r_point = r * base + c * image;

        challenge_buf.extend_from_slice(l.compress().as_bytes());
        challenge_buf.extend_from_slice(r_point.compress().as_bytes());
        sum += c;
    }

    hash_to_scalar(&challenge_buf) == sum
}

pub fn generate_ring_signature<R: RngCore + CryptoRng>(
    prefix_hash: &Hash256,
    key_image: &KeyImage,
    public_keys: &[PublicKey],
    secret_key: &SecretKey,
    secret_index: usize,
    rng: &mut R,
) -> Option<Vec<Signature>> {
    if secret_index >= public_keys.len() {
        return None;
    }
    let secret: Option<Scalar> = Scalar::from_canonical_bytes(*secret_key).into();
    let secret = secret?;
    let image = CompressedEdwardsY(*key_image).decompress()?;

    let mut challenge_buf = Vec::with_capacity(32 + public_keys.len() * 64);
    challenge_buf.extend_from_slice(prefix_hash);

    let mut parts = vec![(Scalar::ZERO, Scalar::ZERO); public_keys.len()];
    let mut sum = Scalar::ZERO;
    let mut nonce = Scalar::ZERO;

    for (i, public_key) in public_keys.iter().enumerate() {
        if i == secret_index {
            nonce = Scalar::random(rng);
            let l = EdwardsPoint::mul_base(&nonce);
            let r_point = nonce * hash_to_point(public_key);
            challenge_buf.extend_from_slice(l.compress().as_bytes());
            challenge_buf.extend_from_slice(r_point.compress().as_bytes());
        } else {
            let c = Scalar::random(rng);
            let r = Scalar::random(rng);
            let point = CompressedEdwardsY(*public_key).decompress()?;
            let l = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &point, &r);
            let r_point = r * hash_to_point(public_key) + c * image;
            challenge_buf.extend_from_slice(l.compress().as_bytes());
            challenge_buf.extend_from_slice(r_point.compress().as_bytes());
            sum += c;
            parts[i] = (c, r);
        }
    }

    let challenge = hash_to_scalar(&challenge_buf);
    let c_secret = challenge - sum;
    let r_secret = nonce - c_secret * secret;
    parts[secret_index] = (c_secret, r_secret);

    let signatures = parts
        .into_iter()
        .map(|(c, r)| {
            let mut signature = [0u8; 64];
            signature[..32].copy_from_slice(&c.to_bytes());
            signature[32..].copy_from_slice(&r.to_bytes());
            signature
        })
        .collect();
    Some(signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fast_hash;
    use crate::keys::generate_keys;

    fn ring_with_signer(
        size: usize,
        secret_index: usize,
    ) -> (Vec<PublicKey>, SecretKey, KeyImage) {
        let mut rng = rand::thread_rng();
        let mut ring = Vec::with_capacity(size);
        let mut secret = [0u8; 32];
        for i in 0..size {
            let pair = generate_keys(&mut rng);
            if i == secret_index {
                secret = pair.secret;
            }
            ring.push(pair.public);
        }
        let image = generate_key_image(&ring[secret_index], &secret).unwrap();
        (ring, secret, image)
    }

    #[test]
    fn ring_round_trip_every_position() {
        let mut rng = rand::thread_rng();
        let prefix = fast_hash(b"ring prefix");
        for secret_index in 0..4 {
            let (ring, secret, image) = ring_with_signer(4, secret_index);
            let sigs = generate_ring_signature(
                &prefix, &image, &ring, &secret, secret_index, &mut rng,
            )
            .unwrap();
            assert!(check_ring_signature(&prefix, &image, &ring, &sigs));
        }
    }

    #[test]
    fn single_member_ring() {
        let mut rng = rand::thread_rng();
        let prefix = fast_hash(b"solo");
        let (ring, secret, image) = ring_with_signer(1, 0);
        let sigs = generate_ring_signature(&prefix, &image, &ring, &secret, 0, &mut rng).unwrap();
        assert!(check_ring_signature(&prefix, &image, &ring, &sigs));
    }

    #[test]
    fn rejects_wrong_key_image() {
        let mut rng = rand::thread_rng();
        let prefix = fast_hash(b"prefix");
        let (ring, secret, image) = ring_with_signer(3, 1);
        let sigs = generate_ring_signature(&prefix, &image, &ring, &secret, 1, &mut rng).unwrap();

        let (_, _, other_image) = ring_with_signer(3, 0);
        assert!(!check_ring_signature(&prefix, &other_image, &ring, &sigs));
    }

    #[test]
    fn rejects_tampered_prefix() {
        let mut rng = rand::thread_rng();
        let (ring, secret, image) = ring_with_signer(3, 2);
        let sigs = generate_ring_signature(
            &fast_hash(b"original"),
            &image,
            &ring,
            &secret,
            2,
            &mut rng,
        )
        .unwrap();
        assert!(!check_ring_signature(&fast_hash(b"tampered"), &image, &ring, &sigs));
    }

    #[test]
    fn rejects_truncated_ring() {
        let mut rng = rand::thread_rng();
        let prefix = fast_hash(b"prefix");
        let (ring, secret, image) = ring_with_signer(3, 0);
        let sigs = generate_ring_signature(&prefix, &image, &ring, &secret, 0, &mut rng).unwrap();
        assert!(!check_ring_signature(&prefix, &image, &ring[..2], &sigs[..2]));
        assert!(!check_ring_signature(&prefix, &image, &ring, &sigs[..2]));
    }

    #[test]
    fn key_image_domain() {
        let (_, _, image) = ring_with_signer(2, 0);
        assert!(key_image_in_domain(&image));
        // A small-order point decompresses but fails the subgroup check.
        let small_order = [
            0x26, 0xe8, 0x95, 0x8f, 0xc2, 0xb2, 0x27, 0xb0, 0x45, 0xc3, 0xf4, 0x89, 0xf2, 0xef,
            0x98, 0xf0, 0xd5, 0xdf, 0xac, 0x05, 0xd3, 0xc6, 0x33, 0x39, 0xb1, 0x38, 0x02, 0x88,
            0x6d, 0x53, 0xfc, 0x05,
        ];
        assert!(!key_image_in_domain(&small_order));
    }

    #[test]
    fn key_image_is_deterministic_per_key() {
        let mut rng = rand::thread_rng();
        let pair = generate_keys(&mut rng);
        let a = generate_key_image(&pair.public, &pair.secret).unwrap();
        let b = generate_key_image(&pair.public, &pair.secret).unwrap();
        assert_eq!(a, b);
    }
}
