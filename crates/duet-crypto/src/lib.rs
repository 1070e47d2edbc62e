//! # duet-crypto
//!
//! Cryptographic primitives for Duet.
//!
//! - Keccak-256 hashing
//! - ECDSA signing (secp256k1, low-s normalized)
//! - Sender recovery and address derivation

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod signature;

pub use error::{CryptoError, CryptoResult};
pub use hash::{keccak256, keccak256_concat};
pub use signature::{
    public_key_to_address, recover_address, recover_public_key, sign, PrivateKey, PublicKey,
    RecoverableSignature,
};
