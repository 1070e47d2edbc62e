//! Column families, the store trait and write batches

use crate::error::StorageResult;

/// Column family names
pub mod cf {
    /// Public ledger state nodes, keyed by node hash
    pub const PUBLIC_STATE: &str = "public_state";
    /// Private ledger state nodes, keyed by node hash
    pub const PRIVATE_STATE: &str = "private_state";
    /// Encoded receipts, keyed by `receipts-` ++ tx hash
    pub const RECEIPTS: &str = "receipts";
    /// Last committed block pointer
    pub const META: &str = "meta";
    /// Per-height ledger roots
    pub const ROOTS: &str = "roots";
}

/// Every column family a ledger store carries
pub const ALL_CFS: &[&str] = &[
    cf::PUBLIC_STATE,
    cf::PRIVATE_STATE,
    cf::RECEIPTS,
    cf::META,
    cf::ROOTS,
];

/// Minimal key-value interface the ledger is written against
///
/// `write_batch` must apply every operation or none of them.
pub trait KeyValueStore: Send + Sync {
    /// Read `key` from a column family
    fn get(&self, cf_name: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Apply `batch` atomically
    fn write_batch(&self, batch: WriteBatchWrapper) -> StorageResult<()>;

    /// Whether `key` is present
    fn contains(&self, cf_name: &str, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(cf_name, key)?.is_some())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered writes across column families, applied in one step
#[derive(Clone, Debug, Default)]
pub struct WriteBatchWrapper {
    pub(crate) ops: Vec<(&'static str, BatchOp)>,
}

impl WriteBatchWrapper {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write
    pub fn put(&mut self, cf_name: &'static str, key: &[u8], value: &[u8]) {
        self.ops.push((cf_name, BatchOp::Put(key.to_vec(), value.to_vec())));
    }

    /// Queue a removal
    pub fn delete(&mut self, cf_name: &'static str, key: &[u8]) {
        self.ops.push((cf_name, BatchOp::Delete(key.to_vec())));
    }

    /// Queued operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Column families this batch touches, in first-use order
    pub(crate) fn column_families(&self) -> impl Iterator<Item = &'static str> + '_ {
        let mut seen: Vec<&'static str> = Vec::new();
        self.ops.iter().filter_map(move |(name, _)| {
            if seen.contains(name) {
                None
            } else {
                seen.push(*name);
                Some(*name)
            }
        })
    }
}
