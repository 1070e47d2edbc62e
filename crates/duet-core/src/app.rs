//! Consensus-facing application
//!
//! [`DuetApp`] wires the components together and exposes the hooks the BFT
//! engine drives: `on_new_round`, `on_prevote`, `on_execute`, `on_commit`,
//! plus `check_tx`, `query` and `info`.

use crate::admission::AdmissionController;
use crate::channel::SecureChannel;
use crate::commit::{load_last_block, root_key, CommitCoordinator, CommitOutcome, LAST_BLOCK_KEY};
use crate::config::{AppConfig, GenesisConfig};
use crate::error::{AdmissionResult, AppResult, CommitError, CommitResult, QueryResult};
use crate::executor::{BlockExecutor, ExecuteResult, PendingBlock};
use crate::index::TransactionIndex;
use crate::ledgers::{LedgerPair, SharedLedgers};
use crate::native::NativeExecutor;
use crate::query::QueryEngine;
use crate::verifier::SignatureVerifier;
use crate::vm::TransactionExecutor;
use duet_primitives::H256;
use duet_state::{Ledger, StateResult, WorldState};
use duet_storage::{cf, Database, KeyValueStore, WriteBatchWrapper};
use duet_types::{Block, LastBlockInfo};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Version string reported by [`DuetApp::info`]
pub const VERSION: &str = "alpha 0.2";

/// Summary of the last committed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Height of the last committed block
    pub height: u64,
    /// Confirmed public root
    pub public_root: H256,
    /// Confirmed private root
    pub private_root: H256,
    /// Application version
    pub version: String,
}

/// Collaborators handed to [`DuetApp`] before start-up
pub struct AppBuilder {
    config: AppConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    executor: Option<Arc<dyn TransactionExecutor>>,
    channel: Option<Arc<dyn SecureChannel>>,
    index: Option<Arc<dyn TransactionIndex>>,
}

impl AppBuilder {
    /// Use `store` instead of opening RocksDB at `db_dir`
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `executor` instead of the native executor
    pub fn executor(mut self, executor: Arc<dyn TransactionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Enable private transactions through `channel`
    pub fn channel(mut self, channel: Arc<dyn SecureChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Serve payload and raw transaction queries from `index`
    pub fn index(mut self, index: Arc<dyn TransactionIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Open the store and bootstrap or reopen the confirmed states
    pub fn start(self) -> AppResult<DuetApp> {
        let config = self.config;
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(Database::open(&config.db_dir, &config.db)?) as Arc<dyn KeyValueStore>,
        };

        let (last, pair) = match load_last_block(store.as_ref())? {
            Some(last) => {
                let pair = LedgerPair::open(Arc::clone(&store), last.public_root, last.private_root)?;
                info!(height = last.height, public_root = %last.public_root, "reopened confirmed state");
                (last, pair)
            }
            None => bootstrap(Arc::clone(&store), &config.genesis)?,
        };

        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(NativeExecutor::new(config.gas_ceiling)) as Arc<dyn TransactionExecutor>);
        let verifier = SignatureVerifier::new(config.verifier_threads)?;
        let confirmed: SharedLedgers = Arc::new(Mutex::new(pair));
        let pending: PendingBlock = Arc::new(Mutex::new(None));

        Ok(DuetApp {
            blocks: BlockExecutor::new(
                Arc::clone(&store),
                Arc::clone(&executor),
                verifier,
                self.channel.is_some(),
                config.block_gas_limit,
            ),
            commits: CommitCoordinator::new(Arc::clone(&store)),
            admission: AdmissionController::new(Arc::clone(&confirmed), self.channel),
            queries: QueryEngine::new(
                store,
                executor,
                Arc::clone(&confirmed),
                Arc::clone(&pending),
                self.index,
                config.block_gas_limit,
            ),
            confirmed,
            pending,
            last: RwLock::new(last),
        })
    }
}

/// Write the genesis states and the height-0 records
fn bootstrap(store: Arc<dyn KeyValueStore>, genesis: &GenesisConfig) -> AppResult<(LastBlockInfo, LedgerPair)> {
    let mut public = WorldState::empty(Arc::clone(&store), Ledger::Public);
    let mut private = WorldState::empty(Arc::clone(&store), Ledger::Private);
    for (address, balance) in &genesis.public_alloc {
        public.set_balance(*address, *balance);
    }
    for (address, balance) in &genesis.private_alloc {
        private.set_balance(*address, *balance);
    }

    let info = LastBlockInfo {
        height: 0,
        public_root: public.commit(true)?,
        private_root: private.commit(true)?,
    };
    let mut batch = WriteBatchWrapper::new();
    public.flush(&mut batch);
    private.flush(&mut batch);
    let record = info.encode();
    batch.put(cf::META, LAST_BLOCK_KEY, &record);
    batch.put(cf::ROOTS, &root_key(0), &record);
    store.write_batch(batch)?;

    info!(
        public_root = %info.public_root,
        private_root = %info.private_root,
        accounts = genesis.public_alloc.len() + genesis.private_alloc.len(),
        "initialized genesis state"
    );
    Ok((info, LedgerPair { public, private }))
}

/// The execution core driven by consensus
pub struct DuetApp {
    blocks: BlockExecutor,
    commits: CommitCoordinator,
    admission: AdmissionController,
    queries: QueryEngine,
    confirmed: SharedLedgers,
    pending: PendingBlock,
    last: RwLock<LastBlockInfo>,
}

impl DuetApp {
    /// Start configuring an application
    pub fn builder(config: AppConfig) -> AppBuilder {
        AppBuilder {
            config,
            store: None,
            executor: None,
            channel: None,
            index: None,
        }
    }

    /// Start with defaults for every collaborator
    pub fn start(config: AppConfig) -> AppResult<Self> {
        Self::builder(config).start()
    }

    /// Last committed block and version
    pub fn info(&self) -> AppInfo {
        let last = *self.last.read();
        AppInfo {
            height: last.height,
            public_root: last.public_root,
            private_root: last.private_root,
            version: VERSION.to_string(),
        }
    }

    // ==================== Consensus hooks ====================

    /// New consensus round; nothing to do
    pub fn on_new_round(&self, height: u64) {
        debug!(height, "new round");
    }

    /// Pre-vote on a proposal; nothing to do
    pub fn on_prevote(&self, block: &Block) {
        debug!(height = block.height, "prevote");
    }

    /// Execute `block` on top of the confirmed states
    ///
    /// The executed block is kept until [`on_commit`](Self::on_commit); a
    /// re-execution replaces it.
    pub fn on_execute(&self, block: &Block) -> StateResult<ExecuteResult> {
        let (public_root, private_root) = self.confirmed.lock().roots();
        let mut ctx = self.blocks.begin(block, public_root, private_root)?;
        self.blocks.execute(&mut ctx, &block.txs)?;
        let result = self.blocks.end(&mut ctx);

        if let Some(stale) = self.pending.lock().replace(ctx) {
            warn!(stale = stale.height, height = block.height, "replaced uncommitted block");
        }
        Ok(result)
    }

    /// Commit the executed block at `block.height`
    pub fn on_commit(&self, block: &Block) -> CommitResult<CommitOutcome> {
        let mut pending = self.pending.lock();
        let ctx = pending.take().ok_or(CommitError::NoPendingBlock)?;
        if ctx.height != block.height {
            let executed = ctx.height;
            *pending = Some(ctx);
            return Err(CommitError::HeightMismatch {
                executed,
                commit: block.height,
            });
        }

        let outcome = self.commits.commit(ctx, &self.confirmed)?;
        *self.last.write() = outcome.info;
        Ok(outcome)
    }

    /// Admission check for a raw transaction; returns the bytes to propose
    pub fn check_tx(&self, raw: &[u8]) -> AdmissionResult<Vec<u8>> {
        self.admission.check_tx(raw)
    }

    /// Answer a tagged query
    pub fn query(&self, query: &[u8]) -> QueryResult<Vec<u8>> {
        self.queries.query(query)
    }
}
