//! Consensus transaction store collaborator

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Indexed transaction store owned by the consensus engine
///
/// `tag` selects the index (raw transactions, payloads, ...), `key` the entry.
pub trait TransactionIndex: Send + Sync {
    /// Look up an entry; `None` when absent
    fn query(&self, tag: u8, key: &[u8]) -> Option<Bytes>;
}

/// In-memory index
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<(u8, Vec<u8>), Bytes>>,
}

impl MemoryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry
    pub fn insert(&self, tag: u8, key: impl Into<Vec<u8>>, value: impl Into<Bytes>) {
        self.entries.write().insert((tag, key.into()), value.into());
    }
}

impl TransactionIndex for MemoryIndex {
    fn query(&self, tag: u8, key: &[u8]) -> Option<Bytes> {
        self.entries.read().get(&(tag, key.to_vec())).cloned()
    }
}
