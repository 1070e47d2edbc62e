//! Versioned world state of one ledger

use crate::account::{decode_pairs, encode_pairs, Account, RootNode, StorageNode, EMPTY_CODE_HASH, EMPTY_ROOT};
use crate::error::{StateError, StateResult};
use crate::journal::Journal;
use bytes::Bytes;
use duet_crypto::keccak256;
use duet_primitives::{Address, H256};
use duet_storage::{cf, KeyValueStore, WriteBatchWrapper};
use duet_types::Log;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which of the two ledgers a state belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ledger {
    /// Publicly replicated ledger
    Public,
    /// Confidential ledger
    Private,
}

impl Ledger {
    /// Column family holding this ledger's nodes
    pub fn column_family(self) -> &'static str {
        match self {
            Ledger::Public => cf::PUBLIC_STATE,
            Ledger::Private => cf::PRIVATE_STATE,
        }
    }

    /// The other ledger
    pub fn other(self) -> Self {
        match self {
            Ledger::Public => Ledger::Private,
            Ledger::Private => Ledger::Public,
        }
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ledger::Public => f.write_str("public"),
            Ledger::Private => f.write_str("private"),
        }
    }
}

/// Correlation context stamped onto logs
#[derive(Clone, Copy, Debug, Default)]
struct LogContext {
    tx_hash: H256,
    block_hash: H256,
    tx_index: u64,
}

/// World state of one ledger rooted at a committed root
///
/// Reads see committed data overlaid with the journal. Committed accounts
/// and storage nodes are loaded lazily and cached.
pub struct WorldState {
    store: Arc<dyn KeyValueStore>,
    ledger: Ledger,
    root: H256,
    index: Arc<RootNode>,
    accounts: RwLock<HashMap<Address, Option<Account>>>,
    storage: RwLock<HashMap<Address, Arc<StorageNode>>>,
    journal: Journal,
    context: LogContext,
    pending: Vec<(H256, Vec<u8>)>,
}

impl WorldState {
    /// Open the state committed under `root`; [`EMPTY_ROOT`] needs no stored node
    pub fn open_at(store: Arc<dyn KeyValueStore>, ledger: Ledger, root: H256) -> StateResult<Self> {
        let index = if root == EMPTY_ROOT {
            RootNode::new()
        } else {
            let node = load_node(store.as_ref(), ledger, &root)?;
            decode_pairs(&node).map_err(|e| StateError::CorruptedNode {
                hash: root,
                reason: e.to_string(),
            })?
        };
        debug!(%ledger, root = %root, accounts = index.len(), "opened state");
        Ok(Self {
            store,
            ledger,
            root,
            index: Arc::new(index),
            accounts: RwLock::new(HashMap::new()),
            storage: RwLock::new(HashMap::new()),
            journal: Journal::new(),
            context: LogContext::default(),
            pending: Vec::new(),
        })
    }

    /// Open an empty state
    pub fn empty(store: Arc<dyn KeyValueStore>, ledger: Ledger) -> Self {
        Self {
            store,
            ledger,
            root: EMPTY_ROOT,
            index: Arc::new(RootNode::new()),
            accounts: RwLock::new(HashMap::new()),
            storage: RwLock::new(HashMap::new()),
            journal: Journal::new(),
            context: LogContext::default(),
            pending: Vec::new(),
        }
    }

    /// Root of the last commit (or of the opened state)
    pub fn root(&self) -> H256 {
        self.root
    }

    /// Ledger this state belongs to
    pub fn ledger(&self) -> Ledger {
        self.ledger
    }

    /// Whether mutations are recorded since the last commit
    pub fn is_dirty(&self) -> bool {
        !self.journal.is_clean()
    }

    /// Independent branch: mutations on either side are invisible to the other
    pub fn copy(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger,
            root: self.root,
            index: Arc::clone(&self.index),
            accounts: RwLock::new(self.accounts.read().clone()),
            storage: RwLock::new(self.storage.read().clone()),
            journal: self.journal.clone(),
            context: self.context,
            pending: self.pending.clone(),
        }
    }

    // ==================== Committed data ====================

    fn committed_account(&self, address: &Address) -> StateResult<Option<Account>> {
        if let Some(cached) = self.accounts.read().get(address) {
            return Ok(*cached);
        }
        let account = match self.index.get(address) {
            Some(hash) => {
                let node = load_node(self.store.as_ref(), self.ledger, hash)?;
                let account = Account::from_node(&node).map_err(|e| StateError::CorruptedNode {
                    hash: *hash,
                    reason: e.to_string(),
                })?;
                Some(account)
            }
            None => None,
        };
        self.accounts.write().insert(*address, account);
        Ok(account)
    }

    fn committed_storage(&self, address: &Address) -> StateResult<Arc<StorageNode>> {
        if let Some(cached) = self.storage.read().get(address) {
            return Ok(Arc::clone(cached));
        }
        let root = self
            .committed_account(address)?
            .map_or(EMPTY_ROOT, |a| a.storage_root);
        let slots = if root == EMPTY_ROOT {
            StorageNode::new()
        } else {
            let node = load_node(self.store.as_ref(), self.ledger, &root)?;
            decode_pairs(&node).map_err(|e| StateError::CorruptedNode {
                hash: root,
                reason: e.to_string(),
            })?
        };
        let slots = Arc::new(slots);
        self.storage.write().insert(*address, Arc::clone(&slots));
        Ok(slots)
    }

    // ==================== Reads ====================

    /// Current view of an account; `storage_root` is the committed one
    pub fn account(&self, address: &Address) -> StateResult<Account> {
        let mut account = self.committed_account(address)?.unwrap_or_default();
        if let Some(nonce) = self.journal.nonce(address) {
            account.nonce = nonce;
        }
        if let Some(balance) = self.journal.balance(address) {
            account.balance = balance;
        }
        if let Some(code_hash) = self.journal.code_hash(address) {
            account.code_hash = code_hash;
        }
        Ok(account)
    }

    /// Whether the account is committed or touched in this block
    pub fn exists(&self, address: &Address) -> StateResult<bool> {
        Ok(self.journal.touched(address) || self.committed_account(address)?.is_some())
    }

    /// Get account balance
    pub fn balance(&self, address: &Address) -> StateResult<u128> {
        Ok(self.account(address)?.balance)
    }

    /// Get account nonce
    pub fn nonce(&self, address: &Address) -> StateResult<u64> {
        Ok(self.account(address)?.nonce)
    }

    /// Get account code hash
    pub fn code_hash(&self, address: &Address) -> StateResult<H256> {
        Ok(self.account(address)?.code_hash)
    }

    /// Get account code, empty for plain accounts
    pub fn code(&self, address: &Address) -> StateResult<Bytes> {
        let hash = self.code_hash(address)?;
        if hash == EMPTY_CODE_HASH {
            return Ok(Bytes::new());
        }
        if let Some(code) = self.journal.code(&hash) {
            return Ok(code);
        }
        load_node(self.store.as_ref(), self.ledger, &hash).map(Bytes::from)
    }

    /// Get a storage slot, zero if unset
    pub fn storage(&self, address: &Address, slot: &H256) -> StateResult<H256> {
        if let Some(value) = self.journal.storage(address, slot) {
            return Ok(value);
        }
        Ok(self
            .committed_storage(address)?
            .get(slot)
            .copied()
            .unwrap_or(H256::ZERO))
    }

    // ==================== Writes ====================

    /// Set account nonce
    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.journal.account_mut(address).nonce = Some(nonce);
    }

    /// Increment nonce, returning the new value
    pub fn increment_nonce(&mut self, address: Address) -> StateResult<u64> {
        let nonce = self
            .nonce(&address)?
            .checked_add(1)
            .ok_or(StateError::Overflow("nonce"))?;
        self.set_nonce(address, nonce);
        Ok(nonce)
    }

    /// Set account balance
    pub fn set_balance(&mut self, address: Address, balance: u128) {
        self.journal.account_mut(address).balance = Some(balance);
    }

    /// Add to balance
    pub fn add_balance(&mut self, address: Address, amount: u128) -> StateResult<()> {
        let balance = self
            .balance(&address)?
            .checked_add(amount)
            .ok_or(StateError::Overflow("balance"))?;
        self.set_balance(address, balance);
        Ok(())
    }

    /// Subtract from balance
    pub fn sub_balance(&mut self, address: Address, amount: u128) -> StateResult<()> {
        let available = self.balance(&address)?;
        let balance = available
            .checked_sub(amount)
            .ok_or(StateError::InsufficientBalance {
                required: amount,
                available,
            })?;
        self.set_balance(address, balance);
        Ok(())
    }

    /// Install contract code
    pub fn set_code(&mut self, address: Address, code: Bytes) {
        let hash = if code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            let hash = keccak256(&code);
            self.journal.top_mut().codes.insert(hash, code);
            hash
        };
        self.journal.account_mut(address).code_hash = Some(hash);
    }

    /// Set a storage slot; zero clears it
    pub fn set_storage(&mut self, address: Address, slot: H256, value: H256) {
        self.journal.account_mut(address).storage.insert(slot, value);
    }

    // ==================== Logs ====================

    /// Set the correlation context for the transaction about to run
    pub fn prepare(&mut self, tx_hash: H256, block_hash: H256, tx_index: u64) {
        self.context = LogContext {
            tx_hash,
            block_hash,
            tx_index,
        };
    }

    /// Record a log under the prepared context
    pub fn add_log(&mut self, address: Address, topics: Vec<H256>, data: Bytes) {
        let ctx = self.context;
        self.journal.top_mut().logs.push(Log {
            address,
            topics,
            data,
            tx_hash: ctx.tx_hash,
            block_hash: ctx.block_hash,
            tx_index: ctx.tx_index,
        });
    }

    /// Logs recorded since the last commit, in emission order
    pub fn logs(&self) -> Vec<Log> {
        self.journal.logs().cloned().collect()
    }

    /// Logs emitted by one transaction
    pub fn tx_logs(&self, tx_hash: &H256) -> Vec<Log> {
        self.journal
            .logs()
            .filter(|l| l.tx_hash == *tx_hash)
            .cloned()
            .collect()
    }

    // ==================== Snapshots ====================

    /// Take a snapshot marker
    pub fn snapshot(&mut self) -> u64 {
        self.journal.snapshot()
    }

    /// Discard every delta recorded since `marker` was taken
    pub fn revert_to_snapshot(&mut self, marker: u64) -> StateResult<()> {
        if self.journal.revert(marker) {
            Ok(())
        } else {
            Err(StateError::InvalidSnapshot(marker))
        }
    }

    /// Keep every delta since `marker` and stop tracking it as a revert point
    ///
    /// Reads then look through one layer fewer; the block executor settles
    /// each transaction that succeeds.
    pub fn settle_snapshot(&mut self, marker: u64) -> StateResult<()> {
        if self.journal.merge_from(marker) {
            Ok(())
        } else {
            Err(StateError::InvalidSnapshot(marker))
        }
    }

    /// Snapshot layers still open
    pub fn snapshot_depth(&self) -> usize {
        self.journal.depth()
    }

    // ==================== Commit ====================

    /// Fold the journal into a new root
    ///
    /// New nodes are kept until [`flush`](Self::flush) moves them into a batch.
    /// With `delete_empty`, touched accounts that end up empty are dropped.
    pub fn commit(&mut self, delete_empty: bool) -> StateResult<H256> {
        if !self.is_dirty() {
            return Ok(self.root);
        }

        let (deltas, codes) = self.journal.drain();
        let mut index = (*self.index).clone();
        let mut accounts = Vec::with_capacity(deltas.len());
        let mut storages = Vec::new();

        for (address, delta) in deltas {
            let mut account = self.committed_account(&address)?.unwrap_or_default();
            if let Some(nonce) = delta.nonce {
                account.nonce = nonce;
            }
            if let Some(balance) = delta.balance {
                account.balance = balance;
            }
            if let Some(code_hash) = delta.code_hash {
                account.code_hash = code_hash;
            }

            if !delta.storage.is_empty() {
                let mut slots = (*self.committed_storage(&address)?).clone();
                for (slot, value) in delta.storage {
                    if value.is_zero() {
                        slots.remove(&slot);
                    } else {
                        slots.insert(slot, value);
                    }
                }
                account.storage_root = if slots.is_empty() {
                    EMPTY_ROOT
                } else {
                    let node = encode_pairs(&slots);
                    let hash = keccak256(&node);
                    self.pending.push((hash, node));
                    hash
                };
                storages.push((address, Arc::new(slots)));
            }

            if delete_empty && account.is_empty() {
                index.remove(&address);
                accounts.push((address, None));
                continue;
            }

            let node = account.to_node();
            let hash = keccak256(&node);
            self.pending.push((hash, node));
            index.insert(address, hash);
            accounts.push((address, Some(account)));
        }

        for (hash, code) in codes {
            self.pending.push((hash, code.to_vec()));
        }

        let root = if index.is_empty() {
            EMPTY_ROOT
        } else {
            let node = encode_pairs(&index);
            let root = keccak256(&node);
            self.pending.push((root, node));
            root
        };

        self.accounts.write().extend(accounts);
        self.storage.write().extend(storages);
        self.index = Arc::new(index);
        self.root = root;

        debug!(ledger = %self.ledger, root = %root, nodes = self.pending.len(), "committed state");
        Ok(root)
    }

    /// Move nodes produced by [`commit`](Self::commit) into `batch`
    pub fn flush(&mut self, batch: &mut WriteBatchWrapper) -> usize {
        let cf_name = self.ledger.column_family();
        let count = self.pending.len();
        for (hash, node) in self.pending.drain(..) {
            batch.put(cf_name, hash.as_bytes(), &node);
        }
        count
    }
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("ledger", &self.ledger)
            .field("root", &self.root)
            .field("accounts", &self.index.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

fn load_node(store: &dyn KeyValueStore, ledger: Ledger, hash: &H256) -> StateResult<Vec<u8>> {
    store
        .get(ledger.column_family(), hash.as_bytes())?
        .ok_or(StateError::MissingNode(*hash))
}
