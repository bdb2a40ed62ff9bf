//! Schnorr signatures over the tx prefix hash, used by multisignature
//! output verification.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

use crate::hash::hash_to_scalar;
use crate::{Hash256, PublicKey, SecretKey, Signature};

fn challenge(prefix_hash: &Hash256, public_key: &PublicKey, commitment: &[u8; 32]) -> Scalar {
    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(prefix_hash);
    buf.extend_from_slice(public_key);
    buf.extend_from_slice(commitment);
    hash_to_scalar(&buf)
}

pub fn generate_signature<R: RngCore + CryptoRng>(
    prefix_hash: &Hash256,
    public_key: &PublicKey,
    secret_key: &SecretKey,
    rng: &mut R,
) -> Option<Signature> {
    let secret: Option<Scalar> = Scalar::from_canonical_bytes(*secret_key).into();
    let secret = secret?;

    let nonce = Scalar::random(rng);
    let commitment = EdwardsPoint::mul_base(&nonce).compress().to_bytes();
    let c = challenge(prefix_hash, public_key, &commitment);
    let r = nonce - c * secret;

    let mut signature = [0u8; 64];
    signature[..32].copy_from_slice(&c.to_bytes());
    signature[32..].copy_from_slice(&r.to_bytes());
    Some(signature)
}

pub fn check_signature(
    prefix_hash: &Hash256,
    public_key: &PublicKey,
    signature: &Signature,
) -> bool {
    let c: Option<Scalar> = Scalar::from_canonical_bytes(
        signature[..32].try_into().expect("signature half"),
    )
    .into();
    let r: Option<Scalar> = Scalar::from_canonical_bytes(
        signature[32..].try_into().expect("signature half"),
    )
    .into();
    let (Some(c), Some(r)) = (c, r) else {
        return false;
    };
    let Some(point) = CompressedEdwardsY(*public_key).decompress() else {
        return false;
    };

    // commitment = r·G + c·P reconstructed from the response.
    let commitment = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &point, &r)
        .compress()
        .to_bytes();
    challenge(prefix_hash, public_key, &commitment) == c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fast_hash;
    use crate::keys::generate_keys;

    #[test]
    fn sign_verify_round_trip() {
        let mut rng = rand::thread_rng();
        let pair = generate_keys(&mut rng);
        let prefix = fast_hash(b"tx prefix");
        let sig = generate_signature(&prefix, &pair.public, &pair.secret, &mut rng).unwrap();
        assert!(check_signature(&prefix, &pair.public, &sig));
    }

    #[test]
    fn rejects_wrong_message() {
        let mut rng = rand::thread_rng();
        let pair = generate_keys(&mut rng);
        let sig =
            generate_signature(&fast_hash(b"one"), &pair.public, &pair.secret, &mut rng).unwrap();
        assert!(!check_signature(&fast_hash(b"two"), &pair.public, &sig));
    }

    #[test]
    fn rejects_wrong_key() {
        let mut rng = rand::thread_rng();
        let signer = generate_keys(&mut rng);
        let other = generate_keys(&mut rng);
        let prefix = fast_hash(b"payload");
        let sig = generate_signature(&prefix, &signer.public, &signer.secret, &mut rng).unwrap();
        assert!(!check_signature(&prefix, &other.public, &sig));
    }

    #[test]
    fn rejects_mangled_signature() {
        let mut rng = rand::thread_rng();
        let pair = generate_keys(&mut rng);
        let prefix = fast_hash(b"payload");
        let mut sig = generate_signature(&prefix, &pair.public, &pair.secret, &mut rng).unwrap();
        sig[40] ^= 1;
        assert!(!check_signature(&prefix, &pair.public, &sig));
    }
}
