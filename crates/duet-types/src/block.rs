//! Consensus blocks, the synthetic execution header, and the persisted commit pointer

use crate::error::{decode_exact, TypeResult};
use crate::merkle::merkle_root;
use bytes::Bytes;
use duet_crypto::keccak256;
use duet_primitives::{Address, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// Ordered block as delivered by the consensus engine
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    /// Block height
    pub height: u64,
    /// Proposal time, unix seconds
    pub time: u64,
    /// Hash of the previous block
    pub last_block_hash: H256,
    /// Raw encoded transactions in consensus order
    pub txs: Vec<Bytes>,
}

impl Block {
    /// Create a block
    pub fn new(height: u64, time: u64, last_block_hash: H256, txs: Vec<Bytes>) -> Self {
        Self {
            height,
            time,
            last_block_hash,
            txs,
        }
    }

    /// Root over the raw transaction hashes
    pub fn txs_root(&self) -> H256 {
        let hashes: Vec<H256> = self.txs.iter().map(|tx| keccak256(tx)).collect();
        merkle_root(&hashes)
    }

    /// Block hash: keccak256 of RLP `[height, time, last_block_hash, txs_root]`
    pub fn hash(&self) -> H256 {
        let mut s = RlpStream::new_list(4);
        s.append(&self.height);
        s.append(&self.time);
        s.append(&self.last_block_hash);
        s.append(&self.txs_root());
        keccak256(&s.out())
    }
}

/// Header handed to the transaction executor
///
/// Zero difficulty and a fixed oversized gas limit: there is no fee market
/// at this layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Previous block hash
    pub parent_hash: H256,
    /// Block height
    pub number: u64,
    /// Block time, unix seconds
    pub timestamp: u64,
    /// Always zero
    pub difficulty: u128,
    /// Block gas limit
    pub gas_limit: u64,
    /// Fee recipient
    pub coinbase: Address,
}

impl Header {
    /// Synthesize the execution header for `block`
    pub fn for_block(block: &Block, gas_limit: u64) -> Self {
        Self {
            parent_hash: block.last_block_hash,
            number: block.height,
            timestamp: block.time,
            difficulty: 0,
            gas_limit,
            coinbase: Address::ZERO,
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: H256::ZERO,
            number: 0,
            timestamp: 0,
            difficulty: 0,
            gas_limit: u64::MAX,
            coinbase: Address::ZERO,
        }
    }
}

/// Pointer to the confirmed state of both ledgers
///
/// Created at genesis and overwritten atomically at each commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LastBlockInfo {
    /// Last committed height
    pub height: u64,
    /// Public ledger root
    pub public_root: H256,
    /// Private ledger root
    pub private_root: H256,
}

impl LastBlockInfo {
    /// Canonical encoding
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decode the persisted form
    pub fn decode(bytes: &[u8]) -> TypeResult<Self> {
        decode_exact(bytes)
    }
}

impl Encodable for LastBlockInfo {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.height);
        s.append(&self.public_root);
        s.append(&self.private_root);
    }
}

impl Decodable for LastBlockInfo {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            height: rlp.val_at(0)?,
            public_root: rlp.val_at(1)?,
            private_root: rlp.val_at(2)?,
        })
    }
}
