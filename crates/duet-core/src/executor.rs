//! Block executor
//!
//! A block runs in three stages over one [`BlockContext`]:
//! [`BlockExecutor::begin`] opens the current states at the confirmed roots,
//! [`BlockExecutor::execute`] applies every transaction in block order, and
//! [`BlockExecutor::end`] hands the valid/invalid split to consensus. The
//! context then waits for the commit coordinator.

use crate::error::{ExecutionError, ExecutionResult};
use crate::ledgers::LedgerPair;
use crate::receipts::ReceiptLedger;
use crate::verifier::SignatureVerifier;
use crate::vm::{GasPool, TransactionExecutor};
use bytes::Bytes;
use duet_primitives::{Address, H256};
use duet_state::{Ledger, StateResult};
use duet_storage::KeyValueStore;
use duet_types::{Block, Header, Receipt, Transaction, TypeError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transaction rejected during execution
#[derive(Debug)]
pub struct InvalidTx {
    /// Raw transaction bytes
    pub tx: Bytes,
    /// Why it failed
    pub error: ExecutionError,
}

/// Outcome reported to consensus for an executed block
#[derive(Debug, Default)]
pub struct ExecuteResult {
    /// Transactions applied, in block order
    pub valid_txs: Vec<Bytes>,
    /// Transactions reverted, in block order
    pub invalid_txs: Vec<InvalidTx>,
}

/// Everything one block mutates, owned by the executor until commit
#[derive(Debug)]
pub struct BlockContext {
    /// Block height
    pub height: u64,
    /// Block hash, stamped on logs
    pub block_hash: H256,
    /// Synthetic execution header
    pub header: Header,
    /// Current (in-progress) states
    pub current: LedgerPair,
    /// Receipts accumulated so far
    pub receipts: ReceiptLedger,
    valid: Vec<Bytes>,
    invalid: Vec<InvalidTx>,
}

/// Executed block awaiting commit, shared with current-height queries
pub type PendingBlock = Arc<Mutex<Option<BlockContext>>>;

/// Orders, classifies and dispatches the transactions of a block
pub struct BlockExecutor {
    store: Arc<dyn KeyValueStore>,
    executor: Arc<dyn TransactionExecutor>,
    verifier: SignatureVerifier,
    private_enabled: bool,
    block_gas_limit: u64,
}

impl BlockExecutor {
    /// Create an executor
    ///
    /// `private_enabled` is whether a secure channel is configured; without
    /// one, protected transactions only leave a placeholder receipt.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        executor: Arc<dyn TransactionExecutor>,
        verifier: SignatureVerifier,
        private_enabled: bool,
        block_gas_limit: u64,
    ) -> Self {
        Self {
            store,
            executor,
            verifier,
            private_enabled,
            block_gas_limit,
        }
    }

    /// Open the current states of `block` at the confirmed roots
    pub fn begin(&self, block: &Block, public_root: H256, private_root: H256) -> StateResult<BlockContext> {
        let current = LedgerPair::open(Arc::clone(&self.store), public_root, private_root)?;
        Ok(BlockContext {
            height: block.height,
            block_hash: block.hash(),
            header: Header::for_block(block, self.block_gas_limit),
            current,
            receipts: ReceiptLedger::new(),
            valid: Vec::new(),
            invalid: Vec::new(),
        })
    }

    /// Apply `txs` in order; a failing transaction is reverted on both ledgers
    pub fn execute(&self, ctx: &mut BlockContext, txs: &[Bytes]) -> StateResult<()> {
        let decoded: Vec<Result<Transaction, TypeError>> =
            txs.iter().map(|raw| Transaction::decode(raw)).collect();

        // Recover senders ahead of execution
        let well_formed: Vec<Transaction> = decoded.iter().filter_map(|tx| tx.as_ref().ok().cloned()).collect();
        let senders = self.verifier.spawn(&well_formed);
        let mut slot = 0;

        for (index, (raw, tx)) in txs.iter().zip(&decoded).enumerate() {
            let marker = ctx.current.snapshot();
            let outcome = match tx {
                Ok(tx) => {
                    let sender = senders.wait(slot).unwrap_or_else(|| {
                        Err(TypeError::InvalidField {
                            field: "signature",
                            reason: "sender was not recovered".into(),
                        })
                    });
                    slot += 1;
                    self.apply(ctx, index as u64, tx, sender)
                }
                Err(e) => Err(ExecutionError::Decode(e.clone())),
            };

            match outcome {
                Ok((ledger, receipt)) => {
                    ctx.current.settle(marker)?;
                    debug!(index, %ledger, tx = %receipt.tx_hash, gas = receipt.gas_used, "applied transaction");
                    ctx.receipts.push(ledger, receipt);
                    ctx.valid.push(raw.clone());
                }
                Err(error) => {
                    ctx.current.revert_to(marker)?;
                    warn!(height = ctx.height, index, %error, "reverted transaction");
                    ctx.invalid.push(InvalidTx {
                        tx: raw.clone(),
                        error,
                    });
                }
            }
        }
        Ok(())
    }

    /// Classify and dispatch one transaction, returning the ledger its receipt belongs to
    fn apply(
        &self,
        ctx: &mut BlockContext,
        index: u64,
        tx: &Transaction,
        sender: Result<Address, TypeError>,
    ) -> ExecutionResult<(Ledger, Receipt)> {
        let sender = sender.map_err(ExecutionError::BadSignature)?;
        let tx_hash = tx.hash();

        if tx.protected() && !self.private_enabled {
            // Record the payload reference without executing it anywhere
            ctx.current.public.increment_nonce(sender)?;
            ctx.current.private.increment_nonce(sender)?;
            return Ok((Ledger::Public, Receipt::payload_placeholder(tx_hash)));
        }

        let target = if tx.protected() { Ledger::Private } else { Ledger::Public };
        let (state, mirror) = ctx.current.split_mut(target);
        mirror.increment_nonce(sender)?;
        state.prepare(tx_hash, ctx.block_hash, index);

        let mut gas_pool = GasPool::unbounded();
        let receipt = self.executor.execute(tx, sender, state, &ctx.header, &mut gas_pool)?;
        Ok((target, receipt))
    }

    /// Hand the valid/invalid split to consensus; states and receipts stay in `ctx`
    pub fn end(&self, ctx: &mut BlockContext) -> ExecuteResult {
        let result = ExecuteResult {
            valid_txs: std::mem::take(&mut ctx.valid),
            invalid_txs: std::mem::take(&mut ctx.invalid),
        };
        info!(
            height = ctx.height,
            valid = result.valid_txs.len(),
            invalid = result.invalid_txs.len(),
            "executed block"
        );
        result
    }
}
