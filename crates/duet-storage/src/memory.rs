//! In-memory backend

use crate::store::{BatchOp, KeyValueStore, WriteBatchWrapper, ALL_CFS};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile store with the same column families as [`crate::Database`]
#[derive(Clone)]
pub struct MemoryDb {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryDb {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_column_families(ALL_CFS)
    }

    /// Create an empty store holding only `cfs`
    pub fn with_column_families(cfs: &[&str]) -> Self {
        let tables = cfs.iter().map(|name| (name.to_string(), Table::new())).collect();
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Number of keys in a column family
    pub fn len(&self, cf_name: &str) -> usize {
        self.tables.read().get(cf_name).map_or(0, |t| t.len())
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryDb {
    fn get(&self, cf_name: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let tables = self.tables.read();
        let table = tables
            .get(cf_name)
            .ok_or_else(|| StorageError::UnknownColumnFamily(cf_name.to_string()))?;
        Ok(table.get(key).cloned())
    }

    fn write_batch(&self, batch: WriteBatchWrapper) -> StorageResult<()> {
        let mut tables = self.tables.write();

        // Validate first so a bad batch leaves nothing behind
        if let Some(name) = batch.column_families().find(|name| !tables.contains_key(*name)) {
            return Err(StorageError::UnknownColumnFamily(name.to_string()));
        }

        for (name, op) in batch.ops {
            let Some(table) = tables.get_mut(name) else { continue };
            match op {
                BatchOp::Put(key, value) => {
                    table.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    table.remove(&key);
                }
            }
        }
        Ok(())
    }
}
