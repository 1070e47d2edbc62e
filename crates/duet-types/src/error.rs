//! Decoding and signature errors for wire types

use duet_crypto::CryptoError;
use thiserror::Error;

/// Errors raised while decoding or authenticating wire types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Malformed RLP
    #[error("rlp decode error: {0}")]
    Rlp(#[from] rlp::DecoderError),

    /// Bytes left over after the top-level item
    #[error("{0} trailing bytes after encoded item")]
    TrailingBytes(usize),

    /// Field held a value outside its domain
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What was wrong
        reason: String,
    },

    /// Signature v does not belong to the scheme used for recovery
    #[error("signature v={v} is not a {scheme} signature")]
    SchemeMismatch {
        /// Scheme name
        scheme: &'static str,
        /// Offending v
        v: u64,
    },

    /// Signature recovery failed
    #[error("bad signature: {0}")]
    Crypto(#[from] CryptoError),
}

/// Result type for wire type operations
pub type TypeResult<T> = Result<T, TypeError>;

/// Decode a single top-level RLP item and reject trailing garbage
pub(crate) fn decode_exact<T: rlp::Decodable>(bytes: &[u8]) -> TypeResult<T> {
    let rlp = rlp::Rlp::new(bytes);
    let info = rlp.payload_info()?;
    let total = info.header_len + info.value_len;
    if total < bytes.len() {
        return Err(TypeError::TrailingBytes(bytes.len() - total));
    }
    Ok(rlp.as_val()?)
}
