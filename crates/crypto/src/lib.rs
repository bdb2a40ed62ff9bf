//! Cryptographic primitives consumed by the chain core: the keccak fast
//! hash, one-time keys, Schnorr signatures, ring signatures and key
//! images over the Ed25519 group.

pub mod hash;
pub mod keys;
pub mod ring;
pub mod signature;

pub use hash::{fast_hash, hash_to_point, hash_to_scalar};
pub use keys::{generate_keys, public_key_from_secret, KeyPair};
pub use ring::{
    check_ring_signature, generate_key_image, generate_ring_signature, key_image_in_domain,
};
pub use signature::{check_signature, generate_signature};

pub type Hash256 = [u8; 32];
pub type PublicKey = [u8; 32];
pub type SecretKey = [u8; 32];
pub type KeyImage = [u8; 32];
pub type Signature = [u8; 64];

pub const NULL_HASH: Hash256 = [0u8; 32];
