//! Account records and the node encodings of the state tree

use duet_primitives::{Address, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::collections::BTreeMap;

/// Empty code hash (keccak256 of empty bytes)
pub const EMPTY_CODE_HASH: H256 = H256::from_bytes([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c,
    0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b,
    0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

/// Root of an empty tree (keccak256 of the RLP empty string, 0x80)
///
/// Used both as the state root of a ledger with no commits and as the
/// storage root of an account with no storage.
pub const EMPTY_ROOT: H256 = H256::from_bytes([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6,
    0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0,
    0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
]);

/// Account data as committed in a ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Account {
    /// Account nonce
    pub nonce: u64,
    /// Account balance
    pub balance: u128,
    /// Root of the account's storage node
    pub storage_root: H256,
    /// Code hash (keccak256 of code, or EMPTY_CODE_HASH if no code)
    pub code_hash: H256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: 0,
            storage_root: EMPTY_ROOT,
            code_hash: EMPTY_CODE_HASH,
        }
    }
}

impl Account {
    /// Check if account is empty: no nonce, balance, code or storage
    pub fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance == 0
            && self.code_hash == EMPTY_CODE_HASH
            && self.storage_root == EMPTY_ROOT
    }

    /// Check if account has code
    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }

    /// Node encoding: RLP `[nonce, balance, storage_root, code_hash]`
    pub fn to_node(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decode an account node
    pub fn from_node(bytes: &[u8]) -> Result<Self, DecoderError> {
        rlp::decode(bytes)
    }
}

impl Encodable for Account {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.nonce);
        s.append(&self.balance);
        s.append(&self.storage_root);
        s.append(&self.code_hash);
    }
}

impl Decodable for Account {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            nonce: rlp.val_at(0)?,
            balance: rlp.val_at(1)?,
            storage_root: rlp.val_at(2)?,
            code_hash: rlp.val_at(3)?,
        })
    }
}

/// Encode sorted `[key, value]` pairs as one node; the empty map encodes to `0xc0`
pub(crate) fn encode_pairs<K: Encodable, V: Encodable>(pairs: &BTreeMap<K, V>) -> Vec<u8> {
    let mut s = RlpStream::new_list(pairs.len());
    for (k, v) in pairs {
        s.begin_list(2);
        s.append(k);
        s.append(v);
    }
    s.out().to_vec()
}

/// Decode a node written by [`encode_pairs`]
pub(crate) fn decode_pairs<K: Decodable + Ord, V: Decodable>(
    bytes: &[u8],
) -> Result<BTreeMap<K, V>, DecoderError> {
    let rlp = Rlp::new(bytes);
    let mut out = BTreeMap::new();
    for item in rlp.iter() {
        if item.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        out.insert(item.val_at(0)?, item.val_at(1)?);
    }
    Ok(out)
}

/// Top-level node: address → account node hash
pub(crate) type RootNode = BTreeMap<Address, H256>;

/// Storage node: slot → non-zero value
pub(crate) type StorageNode = BTreeMap<H256, H256>;
