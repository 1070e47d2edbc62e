//! Account address (20 bytes)

use crate::fixed::impl_fixed_bytes;

/// 20-byte account address
///
/// The same address names an account on both ledgers; each ledger keeps its
/// own state for it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl_fixed_bytes!(Address, 20);
