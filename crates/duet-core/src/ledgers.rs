//! The public/private state pair

use duet_primitives::H256;
use duet_state::{Ledger, StateResult, WorldState};
use duet_storage::KeyValueStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Confirmed ledger pair behind the single state-access guard
pub type SharedLedgers = Arc<Mutex<LedgerPair>>;

/// One state per ledger, always moved and swapped together
#[derive(Debug)]
pub struct LedgerPair {
    /// Public ledger
    pub public: WorldState,
    /// Private ledger
    pub private: WorldState,
}

/// Snapshot markers of both ledgers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairMarker {
    public: u64,
    private: u64,
}

impl LedgerPair {
    /// Open both ledgers at their roots
    pub fn open(store: Arc<dyn KeyValueStore>, public_root: H256, private_root: H256) -> StateResult<Self> {
        Ok(Self {
            public: WorldState::open_at(Arc::clone(&store), Ledger::Public, public_root)?,
            private: WorldState::open_at(store, Ledger::Private, private_root)?,
        })
    }

    /// State of `ledger`
    pub fn get(&self, ledger: Ledger) -> &WorldState {
        match ledger {
            Ledger::Public => &self.public,
            Ledger::Private => &self.private,
        }
    }

    /// Mutable state of `ledger` together with the other ledger's state
    pub fn split_mut(&mut self, ledger: Ledger) -> (&mut WorldState, &mut WorldState) {
        match ledger {
            Ledger::Public => (&mut self.public, &mut self.private),
            Ledger::Private => (&mut self.private, &mut self.public),
        }
    }

    /// Independent copies of both states
    pub fn copy(&self) -> Self {
        Self {
            public: self.public.copy(),
            private: self.private.copy(),
        }
    }

    /// `(public_root, private_root)`
    pub fn roots(&self) -> (H256, H256) {
        (self.public.root(), self.private.root())
    }

    /// Snapshot both ledgers
    pub fn snapshot(&mut self) -> PairMarker {
        PairMarker {
            public: self.public.snapshot(),
            private: self.private.snapshot(),
        }
    }

    /// Keep both ledgers' deltas since `marker`
    pub fn settle(&mut self, marker: PairMarker) -> StateResult<()> {
        self.public.settle_snapshot(marker.public)?;
        self.private.settle_snapshot(marker.private)
    }

    /// Revert both ledgers to `marker`
    pub fn revert_to(&mut self, marker: PairMarker) -> StateResult<()> {
        self.public.revert_to_snapshot(marker.public)?;
        self.private.revert_to_snapshot(marker.private)
    }
}
