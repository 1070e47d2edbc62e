//! Historical query engine
//!
//! A query is one action tag byte followed by its payload. Every action is
//! read-only: simulations run against copies, never against the confirmed or
//! in-progress states themselves.

use crate::commit::{load_last_block, load_roots};
use crate::error::{QueryError, QueryResult};
use crate::executor::PendingBlock;
use crate::index::TransactionIndex;
use crate::ledgers::SharedLedgers;
use crate::receipts::receipt_key;
use crate::vm::TransactionExecutor;
use duet_primitives::{Address, H256};
use duet_state::{Ledger, WorldState};
use duet_storage::{cf, KeyValueStore};
use duet_types::signer::recover_sender;
use duet_types::{Header, Transaction};
use std::sync::Arc;
use tracing::{debug, warn};

/// Query action tags
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryTag {
    /// Contract call against the current state
    Call = 0x00,
    /// Confirmed public nonce of an address
    Nonce = 0x01,
    /// Persisted receipt by transaction hash
    Receipt = 0x02,
    /// Whether a contract carries the expected code hash
    Existence = 0x03,
    /// Private payload from the consensus transaction store
    Payload = 0x04,
    /// Raw transaction from the consensus transaction store
    RawTransaction = 0x05,
    /// Contract call against the state committed at a height
    CallAtHeight = 0x06,
}

impl TryFrom<u8> for QueryTag {
    type Error = QueryError;

    fn try_from(tag: u8) -> QueryResult<Self> {
        Ok(match tag {
            0x00 => QueryTag::Call,
            0x01 => QueryTag::Nonce,
            0x02 => QueryTag::Receipt,
            0x03 => QueryTag::Existence,
            0x04 => QueryTag::Payload,
            0x05 => QueryTag::RawTransaction,
            0x06 => QueryTag::CallAtHeight,
            other => return Err(QueryError::UnknownTag(other)),
        })
    }
}

/// Serves external reads over confirmed, in-progress and historical state
pub struct QueryEngine {
    store: Arc<dyn KeyValueStore>,
    executor: Arc<dyn TransactionExecutor>,
    confirmed: SharedLedgers,
    pending: PendingBlock,
    index: Option<Arc<dyn TransactionIndex>>,
    block_gas_limit: u64,
}

impl QueryEngine {
    /// Create an engine
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        executor: Arc<dyn TransactionExecutor>,
        confirmed: SharedLedgers,
        pending: PendingBlock,
        index: Option<Arc<dyn TransactionIndex>>,
        block_gas_limit: u64,
    ) -> Self {
        Self {
            store,
            executor,
            confirmed,
            pending,
            index,
            block_gas_limit,
        }
    }

    /// Dispatch `query` on its leading tag
    pub fn query(&self, query: &[u8]) -> QueryResult<Vec<u8>> {
        let (&tag, payload) = query.split_first().ok_or(QueryError::Empty)?;
        let tag = QueryTag::try_from(tag)?;
        debug!(?tag, len = payload.len(), "query");
        match tag {
            QueryTag::Call => self.call_current(payload),
            QueryTag::CallAtHeight => self.call_at_height(payload),
            QueryTag::Nonce => self.nonce(payload),
            QueryTag::Receipt => self.receipt(payload),
            QueryTag::Existence => self.existence(payload),
            QueryTag::Payload => self.index_lookup(payload),
            QueryTag::RawTransaction => {
                let raw = self.index_lookup(payload)?;
                Ok(rlp::encode(&raw).to_vec())
            }
        }
    }

    // ==================== Calls ====================

    fn call_current(&self, payload: &[u8]) -> QueryResult<Vec<u8>> {
        let tx = Transaction::decode(payload)?;
        let ledger = ledger_of(&tx);

        let in_progress = self
            .pending
            .lock()
            .as_ref()
            .map(|ctx| (ctx.current.get(ledger).copy(), ctx.header.clone()));
        let (state, header) = match in_progress {
            Some(view) => view,
            None => {
                let state = self.confirmed.lock().get(ledger).copy();
                let height = load_last_block(self.store.as_ref())?.map_or(0, |info| info.height);
                (state, self.header(height))
            }
        };
        self.simulate(&tx, state, &header)
    }

    fn call_at_height(&self, payload: &[u8]) -> QueryResult<Vec<u8>> {
        if payload.len() < 8 {
            return Err(QueryError::Malformed(format!(
                "call at height needs 8 height bytes, got {}",
                payload.len()
            )));
        }
        let (raw, height) = payload.split_at(payload.len() - 8);
        let mut be = [0u8; 8];
        be.copy_from_slice(height);
        let height = u64::from_be_bytes(be);

        let tx = Transaction::decode(raw)?;
        let ledger = ledger_of(&tx);
        let info = load_roots(self.store.as_ref(), height)?.ok_or(QueryError::UnknownHeight(height))?;
        let root = match ledger {
            Ledger::Public => info.public_root,
            Ledger::Private => info.private_root,
        };
        let state = WorldState::open_at(Arc::clone(&self.store), ledger, root)?;
        self.simulate(&tx, state, &self.header(height))
    }

    fn simulate(&self, tx: &Transaction, mut state: WorldState, header: &Header) -> QueryResult<Vec<u8>> {
        let sender = recover_sender(tx)?;
        match self.executor.call(tx, sender, &mut state, header) {
            Ok(output) => Ok(output.to_vec()),
            Err(e) => {
                warn!(tx = %tx.hash(), error = %e, "call simulation failed");
                Ok(Vec::new())
            }
        }
    }

    fn header(&self, height: u64) -> Header {
        Header {
            number: height,
            gas_limit: self.block_gas_limit,
            ..Header::default()
        }
    }

    // ==================== Lookups ====================

    fn nonce(&self, payload: &[u8]) -> QueryResult<Vec<u8>> {
        let address = Address::from_slice(payload)
            .map_err(|_| QueryError::Malformed(format!("address must be 20 bytes, got {}", payload.len())))?;
        let nonce = self.confirmed.lock().public.nonce(&address)?;
        Ok(rlp::encode(&nonce).to_vec())
    }

    fn receipt(&self, payload: &[u8]) -> QueryResult<Vec<u8>> {
        let hash = H256::from_slice(payload)
            .map_err(|_| QueryError::Malformed(format!("hash must be 32 bytes, got {}", payload.len())))?;
        self.store
            .get(cf::RECEIPTS, &receipt_key(&hash))?
            .ok_or(QueryError::ReceiptNotFound(hash))
    }

    fn existence(&self, payload: &[u8]) -> QueryResult<Vec<u8>> {
        let tx = Transaction::decode(payload)?;
        let to = tx
            .to
            .ok_or_else(|| QueryError::Malformed("existence check needs a contract address".into()))?;
        if tx.data.len() != H256::LEN {
            return Ok(vec![0]);
        }
        let confirmed = self.confirmed.lock();
        let state = confirmed.get(ledger_of(&tx));
        // A missing account has no code hash, not the empty-code one
        let exists = state.exists(&to)? && state.code_hash(&to)?.as_bytes()[..] == tx.data[..];
        Ok(vec![exists as u8])
    }

    fn index_lookup(&self, payload: &[u8]) -> QueryResult<Vec<u8>> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| QueryError::Index("no transaction store configured".into()))?;
        let (&tag, key) = payload
            .split_first()
            .ok_or_else(|| QueryError::Malformed("missing index tag".into()))?;
        index
            .query(tag, key)
            .map(|value| value.to_vec())
            .ok_or_else(|| QueryError::Index(format!("no entry for tag {tag:#04x}")))
    }
}

fn ledger_of(tx: &Transaction) -> Ledger {
    if tx.protected() {
        Ledger::Private
    } else {
        Ledger::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::CommitCoordinator;
    use crate::executor::BlockExecutor;
    use crate::index::MemoryIndex;
    use crate::ledgers::LedgerPair;
    use crate::native::{create_address, NativeExecutor};
    use crate::verifier::SignatureVerifier;
    use bytes::Bytes;
    use duet_crypto::{keccak256, public_key_to_address, PrivateKey};
    use duet_state::{EMPTY_CODE_HASH, EMPTY_ROOT};
    use duet_storage::MemoryDb;
    use duet_types::{Block, Scheme};
    use parking_lot::Mutex;
    use rand::rngs::OsRng;

    const SLOT: [u8; 32] = [0x01; 32];
    const VALUE: [u8; 32] = [0x02; 32];

    struct Node {
        blocks: BlockExecutor,
        commits: CommitCoordinator,
        confirmed: SharedLedgers,
        pending: PendingBlock,
        index: Arc<MemoryIndex>,
        engine: QueryEngine,
        key: PrivateKey,
        sender: Address,
    }

    impl Node {
        fn new() -> Self {
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryDb::new());
            let executor: Arc<dyn TransactionExecutor> = Arc::new(NativeExecutor::default());
            let confirmed = Arc::new(Mutex::new(
                LedgerPair::open(Arc::clone(&store), EMPTY_ROOT, EMPTY_ROOT).unwrap(),
            ));
            let pending: PendingBlock = Arc::new(Mutex::new(None));
            let index = Arc::new(MemoryIndex::new());
            let engine = QueryEngine::new(
                Arc::clone(&store),
                Arc::clone(&executor),
                Arc::clone(&confirmed),
                Arc::clone(&pending),
                Some(index.clone() as Arc<dyn TransactionIndex>),
                u64::MAX,
            );
            let key = PrivateKey::random(&mut OsRng);
            let sender = public_key_to_address(key.verifying_key());
            Self {
                blocks: BlockExecutor::new(
                    Arc::clone(&store),
                    executor,
                    SignatureVerifier::new(1).unwrap(),
                    true,
                    u64::MAX,
                ),
                commits: CommitCoordinator::new(store),
                confirmed,
                pending,
                index,
                engine,
                key,
                sender,
            }
        }

        fn sign(&self, nonce: u64, to: Option<Address>, data: Vec<u8>) -> Transaction {
            Scheme::Public
                .sign(Transaction::new(nonce, to, 0, 1_000_000, 0, data), &self.key)
                .unwrap()
        }

        /// Execute and leave the block pending
        fn execute(&self, height: u64, txs: Vec<Bytes>) {
            let block = Block::new(height, height, H256::ZERO, txs.clone());
            let (public_root, private_root) = self.confirmed.lock().roots();
            let mut ctx = self.blocks.begin(&block, public_root, private_root).unwrap();
            self.blocks.execute(&mut ctx, &txs).unwrap();
            let result = self.blocks.end(&mut ctx);
            assert!(result.invalid_txs.is_empty());
            *self.pending.lock() = Some(ctx);
        }

        fn commit(&self) {
            let ctx = self.pending.lock().take().unwrap();
            self.commits.commit(ctx, &self.confirmed).unwrap();
        }

        /// Deploy a contract and write VALUE into SLOT over two blocks
        fn deploy_and_store(&self) -> Address {
            let contract = create_address(&self.sender, 0);
            let create = self.sign(0, None, vec![0x60; 4]);
            self.execute(1, vec![Bytes::from(create.encode())]);
            self.commit();

            let mut data = SLOT.to_vec();
            data.extend_from_slice(&VALUE);
            let store = self.sign(1, Some(contract), data);
            self.execute(2, vec![Bytes::from(store.encode())]);
            self.commit();
            contract
        }

        fn read_slot(&self, contract: Address) -> Transaction {
            self.sign(0, Some(contract), SLOT.to_vec())
        }
    }

    fn tagged(tag: QueryTag, payload: &[u8]) -> Vec<u8> {
        let mut query = vec![tag as u8];
        query.extend_from_slice(payload);
        query
    }

    // ==================== Dispatch ====================

    #[test]
    fn test_empty_and_unknown_tag() {
        let node = Node::new();
        assert!(matches!(node.engine.query(&[]), Err(QueryError::Empty)));
        assert!(matches!(node.engine.query(&[0x7f]), Err(QueryError::UnknownTag(0x7f))));
    }

    // ==================== Nonce ====================

    #[test]
    fn test_nonce_reads_confirmed_public_state() {
        let node = Node::new();
        let nonce = tagged(QueryTag::Nonce, node.sender.as_bytes());
        assert_eq!(node.engine.query(&nonce).unwrap(), rlp::encode(&0u64).to_vec());

        let tx = node.sign(0, Some(Address::from_bytes([9; 20])), Vec::new());
        node.execute(1, vec![Bytes::from(tx.encode())]);
        // Pending block is not visible
        assert_eq!(node.engine.query(&nonce).unwrap(), rlp::encode(&0u64).to_vec());
        node.commit();
        assert_eq!(node.engine.query(&nonce).unwrap(), rlp::encode(&1u64).to_vec());
    }

    #[test]
    fn test_nonce_rejects_bad_address() {
        let node = Node::new();
        let result = node.engine.query(&tagged(QueryTag::Nonce, &[1, 2, 3]));
        assert!(matches!(result, Err(QueryError::Malformed(_))));
    }

    // ==================== Receipts ====================

    #[test]
    fn test_receipt_lookup() {
        let node = Node::new();
        let tx = node.sign(0, Some(Address::from_bytes([9; 20])), Vec::new());
        node.execute(1, vec![Bytes::from(tx.encode())]);
        node.commit();

        let bytes = node.engine.query(&tagged(QueryTag::Receipt, tx.hash().as_bytes())).unwrap();
        let receipt = duet_types::Receipt::decode_from_storage(&bytes).unwrap();
        assert_eq!(receipt.tx_hash, tx.hash());

        let missing = H256::from_bytes([0xcc; 32]);
        assert!(matches!(
            node.engine.query(&tagged(QueryTag::Receipt, missing.as_bytes())),
            Err(QueryError::ReceiptNotFound(h)) if h == missing
        ));
    }

    // ==================== Calls ====================

    #[test]
    fn test_call_current_and_at_height() {
        let node = Node::new();
        let contract = node.deploy_and_store();
        let read = node.read_slot(contract);

        let current = node.engine.query(&tagged(QueryTag::Call, &read.encode())).unwrap();
        assert_eq!(current, VALUE.to_vec());

        let at = |height: u64| {
            let mut payload = read.encode();
            payload.extend_from_slice(&height.to_be_bytes());
            node.engine.query(&tagged(QueryTag::CallAtHeight, &payload))
        };
        assert_eq!(at(1).unwrap(), vec![0u8; 32]);
        assert_eq!(at(2).unwrap(), VALUE.to_vec());
        assert!(matches!(at(9), Err(QueryError::UnknownHeight(9))));
    }

    #[test]
    fn test_call_sees_pending_block_without_mutating_it() {
        let node = Node::new();
        let contract = create_address(&node.sender, 0);
        let create = node.sign(0, None, vec![0x60; 4]);
        node.execute(1, vec![Bytes::from(create.encode())]);
        node.commit();

        let mut data = SLOT.to_vec();
        data.extend_from_slice(&VALUE);
        node.execute(2, vec![Bytes::from(node.sign(1, Some(contract), data).encode())]);

        let read = node.read_slot(contract);
        let output = node.engine.query(&tagged(QueryTag::Call, &read.encode())).unwrap();
        assert_eq!(output, VALUE.to_vec());

        // A writing call leaves the pending state untouched
        let mut overwrite = SLOT.to_vec();
        overwrite.extend_from_slice(&[0x03; 32]);
        let write = node.sign(2, Some(contract), overwrite);
        node.engine.query(&tagged(QueryTag::Call, &write.encode())).unwrap();
        let slot = H256::from_bytes(SLOT);
        let pending = node.pending.lock();
        let stored = pending.as_ref().unwrap().current.public.storage(&contract, &slot).unwrap();
        assert_eq!(stored, H256::from_bytes(VALUE));
    }

    #[test]
    fn test_call_failure_yields_empty_output() {
        let node = Node::new();
        let contract = node.deploy_and_store();
        let bad = node.sign(0, Some(contract), vec![0xff; 7]);
        assert!(node.engine.query(&tagged(QueryTag::Call, &bad.encode())).unwrap().is_empty());
    }

    #[test]
    fn test_call_at_height_needs_height_bytes() {
        let node = Node::new();
        let result = node.engine.query(&tagged(QueryTag::CallAtHeight, &[1, 2]));
        assert!(matches!(result, Err(QueryError::Malformed(_))));
    }

    // ==================== Existence ====================

    #[test]
    fn test_existence_compares_code_hash() {
        let node = Node::new();
        let contract = node.deploy_and_store();
        let code_hash = keccak256(&[0x60; 4]);

        let expected = node.sign(0, Some(contract), code_hash.as_bytes().to_vec());
        assert_eq!(node.engine.query(&tagged(QueryTag::Existence, &expected.encode())).unwrap(), vec![1]);

        let wrong = node.sign(0, Some(contract), vec![0u8; 32]);
        assert_eq!(node.engine.query(&tagged(QueryTag::Existence, &wrong.encode())).unwrap(), vec![0]);

        // Nothing was deployed on the private ledger
        let private = Scheme::Private
            .sign(Transaction::new(0, Some(contract), 0, 0, 0, code_hash.as_bytes().to_vec()), &node.key)
            .unwrap();
        assert_eq!(node.engine.query(&tagged(QueryTag::Existence, &private.encode())).unwrap(), vec![0]);
    }

    #[test]
    fn test_existence_of_unknown_address_is_false() {
        let node = Node::new();
        let nowhere = Address::from_bytes([0x99; 20]);

        let empty_code = node.sign(0, Some(nowhere), EMPTY_CODE_HASH.as_bytes().to_vec());
        assert_eq!(node.engine.query(&tagged(QueryTag::Existence, &empty_code.encode())).unwrap(), vec![0]);

        let truncated = node.sign(0, Some(nowhere), EMPTY_CODE_HASH.as_bytes()[..31].to_vec());
        assert_eq!(node.engine.query(&tagged(QueryTag::Existence, &truncated.encode())).unwrap(), vec![0]);
    }

    // ==================== Transaction store ====================

    #[test]
    fn test_index_lookups() {
        let node = Node::new();
        node.index.insert(0x01, b"tx-key".to_vec(), b"raw-tx".to_vec());
        node.index.insert(0x02, b"payload-key".to_vec(), b"payload".to_vec());

        let mut raw = vec![0x01];
        raw.extend_from_slice(b"tx-key");
        assert_eq!(
            node.engine.query(&tagged(QueryTag::RawTransaction, &raw)).unwrap(),
            rlp::encode(&b"raw-tx".to_vec()).to_vec()
        );

        let mut payload = vec![0x02];
        payload.extend_from_slice(b"payload-key");
        assert_eq!(
            node.engine.query(&tagged(QueryTag::Payload, &payload)).unwrap(),
            b"payload".to_vec()
        );

        assert!(matches!(
            node.engine.query(&tagged(QueryTag::Payload, &[0x09])),
            Err(QueryError::Index(_))
        ));
    }
}
