//! Transaction receipts, logs and the logs bloom

use crate::error::{decode_exact, TypeResult};
use bytes::Bytes;
use duet_crypto::keccak256;
use duet_primitives::{Address, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// Execution status recorded in a receipt
///
/// A failed transaction is reverted and reported invalid without a receipt,
/// so success is the only status ever stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Execution succeeded
    Success = 1,
}

/// Logs bloom filter (2048 bits)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bloom(pub [u8; 256]);

impl Default for Bloom {
    fn default() -> Self {
        Self([0u8; 256])
    }
}

impl std::fmt::Debug for Bloom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            f.write_str("Bloom(empty)")
        } else {
            write!(f, "Bloom({} bits)", self.0.iter().map(|b| b.count_ones()).sum::<u32>())
        }
    }
}

impl Bloom {
    /// Whether no bit is set
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    fn bit_positions(input: &[u8]) -> [(usize, u8); 3] {
        let hash = keccak256(input);
        let h = hash.as_bytes();
        let mut out = [(0usize, 0u8); 3];
        for (i, slot) in out.iter_mut().enumerate() {
            let bit = ((h[i * 2] as usize) << 8 | h[i * 2 + 1] as usize) & 0x7ff;
            *slot = (255 - bit / 8, 1 << (bit % 8));
        }
        out
    }

    /// Set the three bits derived from `input`
    pub fn accrue(&mut self, input: &[u8]) {
        for (byte, mask) in Self::bit_positions(input) {
            self.0[byte] |= mask;
        }
    }

    /// Whether `input` may have been accrued
    pub fn contains(&self, input: &[u8]) -> bool {
        Self::bit_positions(input)
            .iter()
            .all(|(byte, mask)| self.0[*byte] & mask != 0)
    }

    /// Bloom over every log's address and topics
    pub fn from_logs(logs: &[Log]) -> Self {
        let mut bloom = Bloom::default();
        for log in logs {
            bloom.accrue(log.address.as_bytes());
            for topic in &log.topics {
                bloom.accrue(topic.as_bytes());
            }
        }
        bloom
    }
}

/// Event emitted during execution
///
/// `tx_hash`, `block_hash` and `tx_index` are filled in by the world state
/// from the context established by `prepare`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics
    pub topics: Vec<H256>,
    /// Unindexed data
    pub data: Bytes,
    /// Transaction that emitted the log
    pub tx_hash: H256,
    /// Block containing the transaction
    pub block_hash: H256,
    /// Position of the transaction in the block
    pub tx_index: u64,
}

impl Log {
    /// Create a log without correlation context
    pub fn new(address: Address, topics: Vec<H256>, data: impl Into<Bytes>) -> Self {
        Self {
            address,
            topics,
            data: data.into(),
            ..Default::default()
        }
    }
}

impl Encodable for Log {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.address);
        s.append_list::<H256, _>(&self.topics);
        s.append(&self.data.to_vec());
        s.append(&self.tx_hash);
        s.append(&self.block_hash);
        s.append(&self.tx_index);
    }
}

impl Decodable for Log {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let data: Vec<u8> = rlp.val_at(2)?;
        Ok(Self {
            address: rlp.val_at(0)?,
            topics: rlp.list_at(1)?,
            data: Bytes::from(data),
            tx_hash: rlp.val_at(3)?,
            block_hash: rlp.val_at(4)?,
            tx_index: rlp.val_at(5)?,
        })
    }
}

/// Transaction receipt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Execution status
    pub status: TxStatus,
    /// Gas used by this and all earlier transactions of the same dispatch
    pub cumulative_gas_used: u64,
    /// Bloom over `logs`
    pub logs_bloom: Bloom,
    /// Transaction hash
    pub tx_hash: H256,
    /// Created contract, if any
    pub contract_address: Option<Address>,
    /// Emitted logs
    pub logs: Vec<Log>,
    /// Gas used by this transaction
    pub gas_used: u64,
}

impl Receipt {
    /// Build a receipt, deriving the bloom from `logs`
    pub fn new(tx_hash: H256, status: TxStatus, gas_used: u64, logs: Vec<Log>) -> Self {
        Self {
            status,
            cumulative_gas_used: gas_used,
            logs_bloom: Bloom::from_logs(&logs),
            tx_hash,
            contract_address: None,
            logs,
            gas_used,
        }
    }

    /// Zero-gas success receipt recorded for a protected transaction that was
    /// not executed locally: it attests the payload reference without content.
    pub fn payload_placeholder(tx_hash: H256) -> Self {
        Self::new(tx_hash, TxStatus::Success, 0, Vec::new())
    }

    /// Attach the created contract address
    pub fn with_contract_address(mut self, address: Address) -> Self {
        self.contract_address = Some(address);
        self
    }

    /// Whether execution succeeded
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }

    /// Canonical storage form:
    /// RLP `[status, cumulative_gas_used, bloom, tx_hash, contract_address, logs, gas_used]`
    pub fn encode_for_storage(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decode the storage form
    pub fn decode_from_storage(bytes: &[u8]) -> TypeResult<Self> {
        decode_exact(bytes)
    }
}

impl Encodable for Receipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7);
        s.append(&(self.status as u8));
        s.append(&self.cumulative_gas_used);
        s.append(&self.logs_bloom.0.to_vec());
        s.append(&self.tx_hash);
        match &self.contract_address {
            Some(address) => s.append(address),
            None => s.append_empty_data(),
        };
        s.append_list::<Log, _>(&self.logs);
        s.append(&self.gas_used);
    }
}

impl Decodable for Receipt {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 7 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let status = match rlp.val_at::<u8>(0)? {
            1 => TxStatus::Success,
            _ => return Err(DecoderError::Custom("unknown receipt status")),
        };
        let bloom_bytes: Vec<u8> = rlp.val_at(2)?;
        let bloom: [u8; 256] = bloom_bytes
            .try_into()
            .map_err(|_| DecoderError::RlpInvalidLength)?;
        let address_rlp = rlp.at(4)?;
        let contract_address = if address_rlp.is_empty() {
            None
        } else {
            Some(address_rlp.as_val()?)
        };
        Ok(Self {
            status,
            cumulative_gas_used: rlp.val_at(1)?,
            logs_bloom: Bloom(bloom),
            tx_hash: rlp.val_at(3)?,
            contract_address,
            logs: rlp.list_at(5)?,
            gas_used: rlp.val_at(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Log {
        Log {
            address: Address::from_bytes([0x42; 20]),
            topics: vec![H256::from_bytes([0x01; 32]), H256::from_bytes([0x02; 32])],
            data: Bytes::from_static(b"payload"),
            tx_hash: H256::from_bytes([0x0a; 32]),
            block_hash: H256::from_bytes([0x0b; 32]),
            tx_index: 4,
        }
    }

    #[test]
    fn test_bloom_contains_log_fields() {
        let bloom = Bloom::from_logs(&[log()]);
        assert!(bloom.contains(&[0x42; 20]));
        assert!(bloom.contains(&[0x01; 32]));
        assert!(!Bloom::default().contains(&[0x42; 20]));
    }

    #[test]
    fn test_receipt_storage_form() {
        let receipt = Receipt::new(H256::from_bytes([0x0a; 32]), TxStatus::Success, 21_000, vec![log()])
            .with_contract_address(Address::from_bytes([0x07; 20]));
        let decoded = Receipt::decode_from_storage(&receipt.encode_for_storage()).unwrap();
        assert_eq!(decoded, receipt);
    }

    #[test]
    fn test_payload_placeholder() {
        let hash = H256::from_bytes([0x33; 32]);
        let receipt = Receipt::payload_placeholder(hash);
        assert!(receipt.is_success());
        assert_eq!(receipt.gas_used, 0);
        assert_eq!(receipt.tx_hash, hash);
        assert!(receipt.logs.is_empty());
        assert!(receipt.logs_bloom.is_empty());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = Receipt::new(H256::ZERO, TxStatus::Success, 5, vec![]);
        let b = Receipt::new(H256::ZERO, TxStatus::Success, 5, vec![]);
        assert_eq!(a.encode_for_storage(), b.encode_for_storage());
    }

    #[test]
    fn test_unknown_status_rejected() {
        for status in [0u8, 7] {
            assert!(Receipt::decode_from_storage(&encoded_with_status(status)).is_err());
        }
    }

    fn encoded_with_status(status: u8) -> Vec<u8> {
        let mut s = RlpStream::new_list(7);
        s.append(&status);
        s.append(&0u64);
        s.append(&vec![0u8; 256]);
        s.append(&H256::ZERO);
        s.append_empty_data();
        s.begin_list(0);
        s.append(&0u64);
        s.out().to_vec()
    }
}
