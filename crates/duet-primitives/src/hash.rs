//! 256-bit digest

use crate::fixed::impl_fixed_bytes;

/// 32-byte digest: state roots, code hashes, transaction hashes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct H256([u8; 32]);

impl_fixed_bytes!(H256, 32);
