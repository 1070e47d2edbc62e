//! Copy-on-write delta layers

use bytes::Bytes;
use duet_primitives::{Address, H256};
use duet_types::Log;
use std::collections::HashMap;

/// Pending changes to one account
#[derive(Clone, Debug, Default)]
pub(crate) struct AccountDelta {
    pub nonce: Option<u64>,
    pub balance: Option<u128>,
    pub code_hash: Option<H256>,
    pub storage: HashMap<H256, H256>,
}

impl AccountDelta {
    fn merge(&mut self, newer: AccountDelta) {
        if newer.nonce.is_some() {
            self.nonce = newer.nonce;
        }
        if newer.balance.is_some() {
            self.balance = newer.balance;
        }
        if newer.code_hash.is_some() {
            self.code_hash = newer.code_hash;
        }
        self.storage.extend(newer.storage);
    }
}

/// Deltas recorded between two snapshot markers
#[derive(Clone, Debug)]
pub(crate) struct Layer {
    id: u64,
    pub accounts: HashMap<Address, AccountDelta>,
    pub codes: HashMap<H256, Bytes>,
    pub logs: Vec<Log>,
}

impl Layer {
    fn new(id: u64) -> Self {
        Self {
            id,
            accounts: HashMap::new(),
            codes: HashMap::new(),
            logs: Vec::new(),
        }
    }
}

/// Stack of layers; marker `n` names the layer opened by the `n`th snapshot.
///
/// Layer 0 is the base and can never be reverted.
#[derive(Clone, Debug)]
pub(crate) struct Journal {
    layers: Vec<Layer>,
    next_id: u64,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::new(0)],
            next_id: 1,
        }
    }

    pub fn snapshot(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.layers.push(Layer::new(id));
        id
    }

    /// Drop every layer opened at or after `marker`; false if the marker is not live
    pub fn revert(&mut self, marker: u64) -> bool {
        if marker == 0 || !self.layers.iter().any(|l| l.id == marker) {
            return false;
        }
        self.layers.retain(|l| l.id < marker);
        true
    }

    /// Fold every layer opened at or after `marker` into the one below it
    ///
    /// The deltas stay visible; only the ability to revert to `marker` is lost.
    pub fn merge_from(&mut self, marker: u64) -> bool {
        let Some(pos) = self.layers.iter().position(|l| l.id == marker) else {
            return false;
        };
        if pos == 0 {
            return false;
        }
        let newer = self.layers.split_off(pos);
        let below = &mut self.layers[pos - 1];
        for layer in newer {
            for (address, delta) in layer.accounts {
                below.accounts.entry(address).or_default().merge(delta);
            }
            below.codes.extend(layer.codes);
            below.logs.extend(layer.logs);
        }
        true
    }

    /// Number of live layers above the base
    pub fn depth(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    pub fn top_mut(&mut self) -> &mut Layer {
        if self.layers.is_empty() {
            self.layers.push(Layer::new(0));
        }
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    pub fn account_mut(&mut self, address: Address) -> &mut AccountDelta {
        self.top_mut().accounts.entry(address).or_default()
    }

    pub fn nonce(&self, address: &Address) -> Option<u64> {
        self.layers
            .iter()
            .rev()
            .find_map(|l| l.accounts.get(address).and_then(|d| d.nonce))
    }

    pub fn balance(&self, address: &Address) -> Option<u128> {
        self.layers
            .iter()
            .rev()
            .find_map(|l| l.accounts.get(address).and_then(|d| d.balance))
    }

    pub fn code_hash(&self, address: &Address) -> Option<H256> {
        self.layers
            .iter()
            .rev()
            .find_map(|l| l.accounts.get(address).and_then(|d| d.code_hash))
    }

    pub fn storage(&self, address: &Address, slot: &H256) -> Option<H256> {
        self.layers
            .iter()
            .rev()
            .find_map(|l| l.accounts.get(address).and_then(|d| d.storage.get(slot).copied()))
    }

    pub fn code(&self, hash: &H256) -> Option<Bytes> {
        self.layers.iter().rev().find_map(|l| l.codes.get(hash).cloned())
    }

    pub fn touched(&self, address: &Address) -> bool {
        self.layers.iter().any(|l| l.accounts.contains_key(address))
    }

    pub fn logs(&self) -> impl Iterator<Item = &Log> {
        self.layers.iter().flat_map(|l| l.logs.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.layers
            .iter()
            .all(|l| l.accounts.is_empty() && l.codes.is_empty() && l.logs.is_empty())
    }

    /// Collapse all layers, oldest first, and start over with an empty base
    pub fn drain(&mut self) -> (HashMap<Address, AccountDelta>, HashMap<H256, Bytes>) {
        let mut accounts: HashMap<Address, AccountDelta> = HashMap::new();
        let mut codes = HashMap::new();
        for layer in std::mem::replace(&mut self.layers, vec![Layer::new(0)]) {
            for (address, delta) in layer.accounts {
                accounts.entry(address).or_default().merge(delta);
            }
            codes.extend(layer.codes);
        }
        (accounts, codes)
    }
}
