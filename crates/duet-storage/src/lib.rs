//! # duet-storage
//!
//! Storage layer for the Duet ledger.
//!
//! This crate provides:
//! - The [`KeyValueStore`] abstraction used by state and commit code
//! - RocksDB backend with one column family per ledger
//! - In-memory backend for tests and ephemeral nodes
//! - Atomic write batches spanning column families

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod db;
pub mod error;
pub mod memory;
pub mod store;

pub use db::{Database, DbOptions};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDb;
pub use store::{cf, KeyValueStore, WriteBatchWrapper, ALL_CFS};
