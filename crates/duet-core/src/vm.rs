//! Transaction executor collaborator

use crate::error::{ExecutionError, ExecutionResult};
use bytes::Bytes;
use duet_primitives::Address;
use duet_state::WorldState;
use duet_types::{Header, Receipt, Transaction};

/// Gas available to transactions of one dispatch
///
/// The core has no fee market: each transaction gets a pool of `u64::MAX`
/// and only the executor's safety ceiling bounds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasPool(u64);

impl GasPool {
    /// Pool holding `gas`
    pub fn new(gas: u64) -> Self {
        Self(gas)
    }

    /// Oversized pool handed to every transaction
    pub fn unbounded() -> Self {
        Self(u64::MAX)
    }

    /// Remaining gas
    pub fn remaining(&self) -> u64 {
        self.0
    }

    /// Reserve gas
    pub fn sub_gas(&mut self, amount: u64) -> ExecutionResult<()> {
        self.0 = self
            .0
            .checked_sub(amount)
            .ok_or(ExecutionError::GasPoolExhausted {
                requested: amount,
                available: self.0,
            })?;
        Ok(())
    }

    /// Return unused gas
    pub fn add_gas(&mut self, amount: u64) {
        self.0 = self.0.saturating_add(amount);
    }
}

/// Opaque executor applying one transaction to one ledger view
///
/// `execute` mutates `state` and returns the receipt; on error the caller
/// reverts. `call` is read-only simulation used by queries and runs against
/// a throwaway copy.
pub trait TransactionExecutor: Send + Sync {
    /// Apply `tx` sent by `sender`
    fn execute(
        &self,
        tx: &Transaction,
        sender: Address,
        state: &mut WorldState,
        header: &Header,
        gas_pool: &mut GasPool,
    ) -> ExecutionResult<Receipt>;

    /// Simulate `tx` and return its output
    fn call(
        &self,
        tx: &Transaction,
        sender: Address,
        state: &mut WorldState,
        header: &Header,
    ) -> ExecutionResult<Bytes>;
}
