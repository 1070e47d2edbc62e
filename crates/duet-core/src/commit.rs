//! Commit coordinator
//!
//! Finalizes an executed [`BlockContext`]: both states, the block's receipts,
//! the last-block record and the per-height roots record go to the store in a
//! single batch. Only after that write succeeds do the committed states
//! replace the confirmed pair.

use crate::error::CommitResult;
use crate::executor::BlockContext;
use crate::ledgers::SharedLedgers;
use duet_primitives::H256;
use duet_storage::{cf, KeyValueStore, StorageError, StorageResult, WriteBatchWrapper};
use duet_types::LastBlockInfo;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Meta key of the last committed block
pub const LAST_BLOCK_KEY: &[u8] = b"last-block";

/// Key of the roots record for `height`
pub fn root_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// Values reported back to consensus after a commit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Persisted last-block record
    pub info: LastBlockInfo,
    /// State root reported to consensus (the public root)
    pub state_root: H256,
    /// Commitment over the block's receipts
    pub receipts_root: H256,
}

/// Writes executed blocks to the store and swaps the confirmed states
pub struct CommitCoordinator {
    store: Arc<dyn KeyValueStore>,
}

impl CommitCoordinator {
    /// Create a coordinator over `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist `ctx` and make its states the confirmed pair
    ///
    /// On error nothing is written and `confirmed` is left as it was.
    pub fn commit(&self, mut ctx: BlockContext, confirmed: &SharedLedgers) -> CommitResult<CommitOutcome> {
        let height = ctx.height;
        match self.write(&mut ctx) {
            Ok(outcome) => {
                ctx.receipts.clear();
                *confirmed.lock() = ctx.current;
                info!(
                    height,
                    public_root = %outcome.info.public_root,
                    private_root = %outcome.info.private_root,
                    receipts_root = %outcome.receipts_root,
                    "committed block"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(height, error = %e, "block commit failed");
                Err(e)
            }
        }
    }

    fn write(&self, ctx: &mut BlockContext) -> CommitResult<CommitOutcome> {
        let public_root = ctx.current.public.commit(true)?;
        let private_root = ctx.current.private.commit(true)?;

        let mut batch = WriteBatchWrapper::new();
        let nodes = ctx.current.public.flush(&mut batch) + ctx.current.private.flush(&mut batch);
        let receipts_root = ctx.receipts.persist(&mut batch);

        let info = LastBlockInfo {
            height: ctx.height,
            public_root,
            private_root,
        };
        let record = info.encode();
        batch.put(cf::META, LAST_BLOCK_KEY, &record);
        batch.put(cf::ROOTS, &root_key(ctx.height), &record);

        debug!(height = ctx.height, nodes, receipts = ctx.receipts.len(), "writing commit batch");
        self.store.write_batch(batch)?;

        Ok(CommitOutcome {
            info,
            state_root: public_root,
            receipts_root,
        })
    }
}

/// Last committed block recorded in `store`, if any
pub fn load_last_block(store: &dyn KeyValueStore) -> StorageResult<Option<LastBlockInfo>> {
    store
        .get(cf::META, LAST_BLOCK_KEY)?
        .map(|bytes| LastBlockInfo::decode(&bytes))
        .transpose()
        .map_err(|e| StorageError::Corrupted(e.to_string()))
}

/// Roots recorded for `height`, if any
pub fn load_roots(store: &dyn KeyValueStore, height: u64) -> StorageResult<Option<LastBlockInfo>> {
    store
        .get(cf::ROOTS, &root_key(height))?
        .map(|bytes| LastBlockInfo::decode(&bytes))
        .transpose()
        .map_err(|e| StorageError::Corrupted(e.to_string()))
}
