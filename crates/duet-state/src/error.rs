//! World state errors

use duet_primitives::H256;
use duet_storage::StorageError;
use thiserror::Error;

/// World state errors
#[derive(Debug, Error)]
pub enum StateError {
    /// Backing store could not be read
    #[error("state unavailable: {0}")]
    Unavailable(#[from] StorageError),

    /// A node referenced by a root is not in the store
    #[error("missing state node {0}")]
    MissingNode(H256),

    /// A stored node does not decode
    #[error("corrupted state node {hash}: {reason}")]
    CorruptedNode {
        /// Node hash
        hash: H256,
        /// Decoder message
        reason: String,
    },

    /// Snapshot marker is unknown or already reverted
    #[error("invalid snapshot marker {0}")]
    InvalidSnapshot(u64),

    /// Balance would go below zero
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount requested
        required: u128,
        /// Amount held
        available: u128,
    },

    /// Arithmetic overflow on nonce or balance
    #[error("overflow in {0}")]
    Overflow(&'static str),
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;
