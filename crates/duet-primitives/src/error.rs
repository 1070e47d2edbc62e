//! Parsing errors for fixed-size byte types

use thiserror::Error;

/// Error raised when building a primitive from untrusted input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Hex string could not be decoded
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// Input had the wrong number of bytes
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Required byte count
        expected: usize,
        /// Supplied byte count
        got: usize,
    },
}
