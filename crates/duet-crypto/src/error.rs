//! Signature errors

use thiserror::Error;

/// Why a signature could not be produced or checked
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The signing key rejected the digest
    #[error("cannot sign: {0}")]
    Sign(String),

    /// r or s is zero or not below the curve order
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// Recovery id other than 0 or 1
    #[error("recovery id {0} out of range")]
    RecoveryId(u8),

    /// s lies in the upper half of the curve order
    #[error("non-canonical signature (high s)")]
    NonCanonical,

    /// No public key matches the signature
    #[error("unrecoverable signer: {0}")]
    Unrecoverable(String),
}

/// Crypto result
pub type CryptoResult<T> = Result<T, CryptoError>;
