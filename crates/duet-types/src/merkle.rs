//! Binary Merkle commitment

use duet_crypto::{keccak256, keccak256_concat};
use duet_primitives::H256;

/// Root over ordered leaf hashes
///
/// The list splits at `(n + 1) / 2`; inner nodes hash `left ++ right`. A single
/// leaf is its own root and an empty list commits to zero.
pub fn merkle_root(leaves: &[H256]) -> H256 {
    match leaves.len() {
        0 => H256::ZERO,
        1 => leaves[0],
        n => {
            let split = (n + 1) / 2;
            let left = merkle_root(&leaves[..split]);
            let right = merkle_root(&leaves[split..]);
            keccak256_concat(&[left.as_bytes(), right.as_bytes()])
        }
    }
}

/// Receipt commitment over canonical receipt bytes in the given order
///
/// Callers pass all public receipts in block order followed by all private
/// receipts in block order; validators only agree if that order is kept.
pub fn receipts_root<T: AsRef<[u8]>>(receipts: &[T]) -> H256 {
    let leaves: Vec<H256> = receipts.iter().map(|r| keccak256(r.as_ref())).collect();
    merkle_root(&leaves)
}
