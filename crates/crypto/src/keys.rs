//! One-time key pairs.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

use crate::{PublicKey, SecretKey};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

pub fn generate_keys<R: RngCore + CryptoRng>(rng: &mut R) -> KeyPair {
    let secret = Scalar::random(rng);
    let public = EdwardsPoint::mul_base(&secret).compress().to_bytes();
    KeyPair {
        public,
        secret: secret.to_bytes(),
    }
}

pub fn public_key_from_secret(secret: &SecretKey) -> Option<PublicKey> {
    let scalar: Option<Scalar> = Scalar::from_canonical_bytes(*secret).into();
    let scalar = scalar?;
    Some(EdwardsPoint::mul_base(&scalar).compress().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_maps_back_to_public() {
        let mut rng = rand::thread_rng();
        let pair = generate_keys(&mut rng);
        assert_eq!(public_key_from_secret(&pair.secret), Some(pair.public));
    }

    #[test]
    fn non_canonical_secret_rejected() {
        let secret = [0xff; 32];
        assert_eq!(public_key_from_secret(&secret), None);
    }
}
