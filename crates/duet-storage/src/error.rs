//! Storage errors

use thiserror::Error;

/// Failure reading or writing the ledger store
#[derive(Debug, Error)]
pub enum StorageError {
    /// The RocksDB backend reported an error
    #[error("backend: {0}")]
    Backend(#[from] rocksdb::Error),

    /// A read or batch named a column family the store does not have
    #[error("unknown column family `{0}`")]
    UnknownColumnFamily(String),

    /// The database directory could not be prepared
    #[error("database directory: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record failed to decode
    #[error("corrupted record: {0}")]
    Corrupted(String),
}

/// Storage result
pub type StorageResult<T> = Result<T, StorageError>;
