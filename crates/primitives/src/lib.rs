//! Core block/transaction types and canonical serialization.

pub mod block;
pub mod encoding;
pub mod extra;
pub mod hash;
pub mod transaction;

pub use basalt_crypto::{Hash256, KeyImage, PublicKey, SecretKey, Signature, NULL_HASH};
pub use block::{Block, BlockHeader, ParentBlock};
pub use hash::{blob_hash, object_hash, tree_hash};
pub use transaction::{
    relative_output_offsets_to_absolute, BaseInput, KeyInput, KeyOutput, MultisignatureInput,
    MultisignatureOutput, Transaction, TransactionInput, TransactionOutput,
    TransactionOutputTarget,
};
