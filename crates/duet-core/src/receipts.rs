//! Per-block receipt accumulation and commitment

use duet_primitives::H256;
use duet_state::Ledger;
use duet_storage::{cf, WriteBatchWrapper};
use duet_types::{receipts_root, Receipt};

/// Key prefix of the persisted receipt index
pub const RECEIPTS_PREFIX: &[u8] = b"receipts-";

/// Receipt index key for `tx_hash`
pub fn receipt_key(tx_hash: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECEIPTS_PREFIX.len() + H256::LEN);
    key.extend_from_slice(RECEIPTS_PREFIX);
    key.extend_from_slice(tx_hash.as_bytes());
    key
}

/// Receipts of the block being executed, kept apart per ledger
#[derive(Clone, Debug, Default)]
pub struct ReceiptLedger {
    public: Vec<Receipt>,
    private: Vec<Receipt>,
    public_gas: u64,
    private_gas: u64,
}

impl ReceiptLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a receipt to `ledger`, stamping its cumulative gas
    pub fn push(&mut self, ledger: Ledger, mut receipt: Receipt) {
        let (receipts, gas) = match ledger {
            Ledger::Public => (&mut self.public, &mut self.public_gas),
            Ledger::Private => (&mut self.private, &mut self.private_gas),
        };
        *gas = gas.saturating_add(receipt.gas_used);
        receipt.cumulative_gas_used = *gas;
        receipts.push(receipt);
    }

    /// Receipts of one ledger in block order
    pub fn receipts(&self, ledger: Ledger) -> &[Receipt] {
        match ledger {
            Ledger::Public => &self.public,
            Ledger::Private => &self.private,
        }
    }

    /// Total receipts across both ledgers
    pub fn len(&self) -> usize {
        self.public.len() + self.private.len()
    }

    /// Whether no receipt was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical bytes of every receipt: public in block order, then private
    pub fn encoded(&self) -> Vec<Vec<u8>> {
        self.public
            .iter()
            .chain(self.private.iter())
            .map(Receipt::encode_for_storage)
            .collect()
    }

    /// Commitment over [`encoded`](Self::encoded)
    pub fn root(&self) -> H256 {
        receipts_root(&self.encoded())
    }

    /// Queue every receipt under its index key and return the commitment
    pub fn persist(&self, batch: &mut WriteBatchWrapper) -> H256 {
        let encoded = self.encoded();
        for (receipt, bytes) in self.public.iter().chain(self.private.iter()).zip(&encoded) {
            batch.put(cf::RECEIPTS, &receipt_key(&receipt.tx_hash), bytes);
        }
        receipts_root(&encoded)
    }

    /// Drop all receipts
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
