//! Keccak-256 hashing

use duet_primitives::H256;
use sha3::{Digest, Keccak256};

/// Compute Keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> H256 {
    H256::from_bytes(Keccak256::digest(data).into())
}

/// Compute Keccak-256 over the concatenation of `parts` without allocating
pub fn keccak256_concat(parts: &[&[u8]]) -> H256 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    H256::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        assert_eq!(
            keccak256(&[]).to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak256_empty_rlp_list() {
        // Empty-state root sentinel
        assert_eq!(
            keccak256(&[0xc0]).to_hex(),
            "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
        );
    }

    #[test]
    fn test_keccak256_hello() {
        assert_eq!(
            keccak256(b"hello").to_hex(),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_concat_matches_single_buffer() {
        let joined = keccak256(b"helloworld");
        assert_eq!(keccak256_concat(&[b"hello", b"world"]), joined);
        assert_eq!(keccak256_concat(&[]), keccak256(&[]));
    }
}
