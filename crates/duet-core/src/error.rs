//! Error types of the execution core

use crate::channel::ChannelError;
use duet_primitives::H256;
use duet_state::StateError;
use duet_storage::StorageError;
use duet_types::TypeError;
use thiserror::Error;

/// Per-transaction execution failure
///
/// Always recovered locally: the transaction is reverted on both ledgers and
/// reported invalid.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Transaction bytes do not decode
    #[error("decode error: {0}")]
    Decode(TypeError),

    /// Sender could not be recovered
    #[error("bad signature: {0}")]
    BadSignature(TypeError),

    /// The channel's reference is not the one the sender signed over
    #[error("payload reference mismatch: signed {signed}, channel returned {returned}")]
    ReferenceMismatch {
        /// Digest of the submitted payload
        signed: H256,
        /// Reference returned by the secure channel
        returned: H256,
    },

    /// Nonce mismatch
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch {
        /// Expected nonce
        expected: u64,
        /// Actual nonce
        got: u64,
    },

    /// Gas limit below the intrinsic cost
    #[error("intrinsic gas too low: required {required}, limit {limit}")]
    IntrinsicGas {
        /// Intrinsic gas
        required: u64,
        /// Transaction gas limit
        limit: u64,
    },

    /// Insufficient balance
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required balance
        required: u128,
        /// Available balance
        available: u128,
    },

    /// Execution exceeded the gas limit or the safety ceiling
    #[error("out of gas: used {used}, limit {limit}")]
    OutOfGas {
        /// Gas consumed
        used: u64,
        /// Effective limit
        limit: u64,
    },

    /// Block gas pool exhausted
    #[error("gas pool exhausted: requested {requested}, available {available}")]
    GasPoolExhausted {
        /// Gas requested
        requested: u64,
        /// Gas left in the pool
        available: u64,
    },

    /// Executor rejected the message
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// State access error
    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Reasons a raw transaction is refused before inclusion
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Transaction bytes do not decode
    #[error("decode error: {0}")]
    Decode(TypeError),

    /// Protected transaction on a node without a secure channel
    #[error("private transactions are not supported on this node")]
    UnsupportedPrivateTx,

    /// Secure channel refused the payload
    #[error("secure channel: {0}")]
    SecureChannel(#[from] ChannelError),

    /// Sender could not be recovered
    #[error("bad signature: {0}")]
    BadSignature(TypeError),

    /// The channel's reference is not the one the sender signed over
    #[error("payload reference mismatch: signed {signed}, channel returned {returned}")]
    ReferenceMismatch {
        /// Digest of the submitted payload
        signed: H256,
        /// Reference returned by the secure channel
        returned: H256,
    },

    /// Confirmed nonce is ahead of the transaction
    #[error("nonce too low: confirmed {confirmed}, got {got}")]
    NonceTooLow {
        /// Confirmed nonce
        confirmed: u64,
        /// Transaction nonce
        got: u64,
    },

    /// Sender cannot cover value plus maximum fee
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// value + gas_limit * gas_price
        required: u128,
        /// Confirmed balance
        available: u128,
    },

    /// value + gas_limit * gas_price does not fit
    #[error("transaction cost overflows")]
    CostOverflow,

    /// Confirmed state could not be read
    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// Result type for admission
pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// Fatal block commit failure; confirmed state is left untouched
#[derive(Debug, Error)]
pub enum CommitError {
    /// Commit requested without an executed block
    #[error("no executed block awaiting commit")]
    NoPendingBlock,

    /// Commit height differs from the executed block
    #[error("height mismatch: executed {executed}, commit {commit}")]
    HeightMismatch {
        /// Height of the executed block
        executed: u64,
        /// Height passed to commit
        commit: u64,
    },

    /// State commit failed
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Batch write failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for commit
pub type CommitResult<T> = Result<T, CommitError>;

/// Typed query failures
#[derive(Debug, Error)]
pub enum QueryError {
    /// Query without an action tag
    #[error("empty query")]
    Empty,

    /// Action tag not recognised
    #[error("unknown query tag {0:#04x}")]
    UnknownTag(u8),

    /// Payload has the wrong shape
    #[error("malformed query: {0}")]
    Malformed(String),

    /// Embedded transaction does not decode
    #[error("decode error: {0}")]
    Decode(#[from] TypeError),

    /// No root recorded for the height
    #[error("unknown height {0}")]
    UnknownHeight(u64),

    /// No receipt for the hash
    #[error("receipt not found for {0}")]
    ReceiptNotFound(H256),

    /// Transaction store has no entry
    #[error("transaction index: {0}")]
    Index(String),

    /// State read failed
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Store read failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for queries
pub type QueryResult<T> = Result<T, QueryError>;

/// Application start-up failures
#[derive(Debug, Error)]
pub enum AppError {
    /// Store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted roots could not be reopened
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Persisted last-block record is corrupt
    #[error("corrupted last block info: {0}")]
    Corrupted(#[from] TypeError),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(String),

    /// Verifier thread pool could not start
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for application lifecycle calls
pub type AppResult<T> = Result<T, AppError>;
