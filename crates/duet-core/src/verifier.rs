//! Parallel sender recovery
//!
//! Every transaction of a block is handed to a rayon pool as soon as the
//! block arrives. Workers finish in any order; the executor consumes the
//! results strictly by index, blocking only when it catches up with them.

use duet_primitives::Address;
use duet_types::signer::recover_sender;
use duet_types::{Transaction, TypeError};
use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;
use tracing::trace;

type Slot = Option<Result<Address, TypeError>>;

struct Slots {
    results: Mutex<Vec<Slot>>,
    ready: Condvar,
}

/// Sender recovery running ahead of sequential execution
pub struct SignatureVerifier {
    pool: ThreadPool,
}

impl SignatureVerifier {
    /// Start a pool with `threads` workers, 0 for one per CPU
    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("duet-verify-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Start recovering the sender of every transaction
    ///
    /// Each transaction is recovered with the scheme its protected flag selects.
    pub fn spawn(&self, txs: &[Transaction]) -> PendingSenders {
        let slots = Arc::new(Slots {
            results: Mutex::new(vec![None; txs.len()]),
            ready: Condvar::new(),
        });
        for (index, tx) in txs.iter().enumerate() {
            let tx = tx.clone();
            let slots = Arc::clone(&slots);
            self.pool.spawn(move || {
                let result = recover_sender(&tx);
                trace!(index, ok = result.is_ok(), "recovered sender");
                let mut results = slots.results.lock();
                results[index] = Some(result);
                slots.ready.notify_all();
            });
        }
        PendingSenders { slots }
    }
}

/// Handle on in-flight recoveries
pub struct PendingSenders {
    slots: Arc<Slots>,
}

impl PendingSenders {
    /// Number of transactions submitted
    pub fn len(&self) -> usize {
        self.slots.results.lock().len()
    }

    /// Whether nothing was submitted
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until the sender of transaction `index` is known
    ///
    /// Returns `None` for an index that was never submitted.
    pub fn wait(&self, index: usize) -> Option<Result<Address, TypeError>> {
        let mut results = self.slots.results.lock();
        loop {
            match results.get(index)? {
                Some(result) => return Some(result.clone()),
                None => self.slots.ready.wait(&mut results),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_crypto::PrivateKey;
    use duet_primitives::H256;
    use duet_types::{Scheme, TxSignature};
    use rand::rngs::OsRng;

    fn signed(nonce: u64, scheme: Scheme, key: &PrivateKey) -> Transaction {
        let tx = Transaction::new(nonce, Some(Address::from_bytes([2; 20])), 1, 21_000, 1, vec![nonce as u8]);
        scheme.sign(tx, key).unwrap()
    }

    #[test]
    fn test_results_follow_input_order() {
        let verifier = SignatureVerifier::new(4).unwrap();
        let keys: Vec<PrivateKey> = (0..16).map(|_| PrivateKey::random(&mut OsRng)).collect();
        let txs: Vec<Transaction> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                let scheme = if i % 2 == 0 { Scheme::Public } else { Scheme::Private };
                signed(i as u64, scheme, k)
            })
            .collect();

        let pending = verifier.spawn(&txs);
        assert_eq!(pending.len(), 16);
        for (i, tx) in txs.iter().enumerate() {
            let sender = pending.wait(i).unwrap().unwrap();
            assert_eq!(sender, recover_sender(tx).unwrap());
        }
        assert!(pending.wait(16).is_none());
    }

    #[test]
    fn test_bad_signature_is_per_transaction() {
        let verifier = SignatureVerifier::new(2).unwrap();
        let key = PrivateKey::random(&mut OsRng);
        let good = signed(0, Scheme::Public, &key);
        let mut bad = signed(1, Scheme::Public, &key);
        bad.signature = TxSignature {
            v: 27,
            r: H256::ZERO,
            s: H256::ZERO,
        };

        let pending = verifier.spawn(&[bad, good]);
        assert!(pending.wait(0).unwrap().is_err());
        assert!(pending.wait(1).unwrap().is_ok());
    }

    #[test]
    fn test_empty_block() {
        let verifier = SignatureVerifier::new(1).unwrap();
        let pending = verifier.spawn(&[]);
        assert!(pending.is_empty());
        assert!(pending.wait(0).is_none());
    }
}
