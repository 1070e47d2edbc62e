//! RocksDB backend

use crate::error::{StorageError, StorageResult};
use crate::store::{BatchOp, KeyValueStore, WriteBatchWrapper, ALL_CFS};
use rocksdb::{ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, WriteBatch, WriteOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

type Rocks = DBWithThreadMode<MultiThreaded>;

/// RocksDB tuning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbOptions {
    /// File handle limit, -1 for unlimited
    pub max_open_files: i32,
    /// Memtable size in MiB
    pub write_buffer_mb: usize,
    /// fsync every committed batch
    pub sync_writes: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_open_files: 512,
            write_buffer_mb: 64,
            sync_writes: true,
        }
    }
}

impl DbOptions {
    fn rocks(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_write_buffer_size(self.write_buffer_mb * 1024 * 1024);
        opts
    }
}

/// Ledger store on disk, one column family per record kind
///
/// Clones share the underlying handle; the database closes when the last
/// clone drops.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Rocks>,
    path: PathBuf,
    sync_writes: bool,
}

impl Database {
    /// Open or create the store at `path`
    pub fn open(path: impl AsRef<Path>, options: &DbOptions) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let families = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let inner = Rocks::open_cf_descriptors(&options.rocks(), &path, families)?;
        info!(path = %path.display(), "opened ledger database");

        Ok(Self {
            inner: Arc::new(inner),
            path,
            sync_writes: options.sync_writes,
        })
    }

    /// Directory the store lives in
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for Database {
    fn get(&self, cf_name: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let handle = self
            .inner
            .cf_handle(cf_name)
            .ok_or_else(|| StorageError::UnknownColumnFamily(cf_name.to_string()))?;
        Ok(self.inner.get_cf(&handle, key)?)
    }

    fn write_batch(&self, batch: WriteBatchWrapper) -> StorageResult<()> {
        let count = batch.len();
        let mut rocks = WriteBatch::default();
        for (name, op) in batch.ops {
            let handle = self
                .inner
                .cf_handle(name)
                .ok_or_else(|| StorageError::UnknownColumnFamily(name.to_string()))?;
            match op {
                BatchOp::Put(key, value) => rocks.put_cf(&handle, key, value),
                BatchOp::Delete(key) => rocks.delete_cf(&handle, key),
            }
        }

        let mut write = WriteOptions::default();
        write.set_sync(self.sync_writes);
        self.inner.write_opt(rocks, &write)?;
        debug!(ops = count, "wrote batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cf;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("ledger"), &DbOptions::default()).unwrap();
        (dir, db)
    }

    fn put(db: &Database, cf_name: &'static str, key: &[u8], value: &[u8]) {
        let mut batch = WriteBatchWrapper::new();
        batch.put(cf_name, key, value);
        db.write_batch(batch).unwrap();
    }

    // ==================== Reads and batches ====================

    #[test]
    fn test_get_missing_and_present() {
        let (_dir, db) = open_temp();
        put(&db, cf::META, b"key1", b"value1");
        assert_eq!(db.get(cf::META, b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(db.get(cf::META, b"missing").unwrap(), None);
        assert!(db.contains(cf::META, b"key1").unwrap());
    }

    #[test]
    fn test_write_batch_spans_column_families() {
        let (_dir, db) = open_temp();

        let mut batch = WriteBatchWrapper::new();
        batch.put(cf::PUBLIC_STATE, b"node", b"pub");
        batch.put(cf::PRIVATE_STATE, b"node", b"priv");
        batch.put(cf::RECEIPTS, b"receipts-x", b"r");
        db.write_batch(batch).unwrap();

        assert_eq!(db.get(cf::PUBLIC_STATE, b"node").unwrap(), Some(b"pub".to_vec()));
        assert_eq!(db.get(cf::PRIVATE_STATE, b"node").unwrap(), Some(b"priv".to_vec()));
        assert_eq!(db.get(cf::RECEIPTS, b"receipts-x").unwrap(), Some(b"r".to_vec()));
    }

    #[test]
    fn test_delete_then_put_in_one_batch() {
        let (_dir, db) = open_temp();
        put(&db, cf::META, b"key1", b"value1");

        let mut batch = WriteBatchWrapper::new();
        batch.delete(cf::META, b"key1");
        batch.put(cf::META, b"key2", b"value2");
        db.write_batch(batch).unwrap();

        assert!(db.get(cf::META, b"key1").unwrap().is_none());
        assert_eq!(db.get(cf::META, b"key2").unwrap(), Some(b"value2".to_vec()));
    }

    #[test]
    fn test_unknown_column_family_rejects_whole_batch() {
        let (_dir, db) = open_temp();

        let mut batch = WriteBatchWrapper::new();
        batch.put(cf::META, b"a", b"1");
        batch.put("nope", b"b", b"2");
        assert!(matches!(
            db.write_batch(batch),
            Err(StorageError::UnknownColumnFamily(name)) if name == "nope"
        ));
        assert!(db.get(cf::META, b"a").unwrap().is_none());
        assert!(db.get("nope", b"b").is_err());
    }

    #[test]
    fn test_same_key_isolated_per_ledger() {
        let (_dir, db) = open_temp();
        put(&db, cf::PUBLIC_STATE, b"same_key", b"public");
        assert!(db.get(cf::PRIVATE_STATE, b"same_key").unwrap().is_none());
    }

    // ==================== Lifecycle ====================

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let options = DbOptions {
            sync_writes: false,
            ..DbOptions::default()
        };
        {
            let db = Database::open(dir.path(), &options).unwrap();
            put(&db, cf::ROOTS, b"h1", b"root");
        }

        let db = Database::open(dir.path(), &options).unwrap();
        assert_eq!(db.path(), dir.path());
        assert_eq!(db.get(cf::ROOTS, b"h1").unwrap(), Some(b"root".to_vec()));
    }

    #[test]
    fn test_clone_shares_handle() {
        let (_dir, db) = open_temp();
        let other = db.clone();
        put(&db, cf::META, b"k", b"v");
        assert_eq!(other.get(cf::META, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: DbOptions = serde_json::from_str(r#"{"write_buffer_mb": 16}"#).unwrap();
        assert_eq!(options.write_buffer_mb, 16);
        assert_eq!(options.max_open_files, 512);
        assert!(options.sync_writes);
    }
}
