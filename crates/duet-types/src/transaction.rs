//! Signed transactions and their canonical RLP encoding

use crate::error::{decode_exact, TypeResult};
use bytes::Bytes;
use duet_crypto::keccak256;
use duet_primitives::{Address, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// v values for public-scheme signatures
pub const PUBLIC_V: [u64; 2] = [27, 28];

/// v values for private-scheme signatures
pub const PRIVATE_V: [u64; 2] = [37, 38];

/// Signature components as carried on the wire
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxSignature {
    /// Scheme-specific recovery value
    pub v: u64,
    /// r component
    pub r: H256,
    /// s component
    pub s: H256,
}

/// A signed transaction
///
/// Wire form: RLP `[nonce, gas_price, gas_limit, to, value, data, v, r, s]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Sender nonce
    pub nonce: u64,
    /// Gas price
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Recipient, `None` for contract creation
    pub to: Option<Address>,
    /// Transferred value
    pub value: u128,
    /// Call data, init code, private payload envelope or payload reference
    pub data: Bytes,
    /// Signature
    pub signature: TxSignature,
}

impl Transaction {
    /// Build an unsigned transaction
    pub fn new(
        nonce: u64,
        to: Option<Address>,
        value: u128,
        gas_limit: u64,
        gas_price: u128,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data: data.into(),
            signature: TxSignature::default(),
        }
    }

    /// Whether the transaction asks for confidential, private-ledger execution
    pub fn protected(&self) -> bool {
        PRIVATE_V.contains(&self.signature.v)
    }

    /// Whether this creates a contract
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// Maximum spend: `value + gas_limit * gas_price`, `None` on overflow
    pub fn cost(&self) -> Option<u128> {
        (self.gas_limit as u128)
            .checked_mul(self.gas_price)?
            .checked_add(self.value)
    }

    /// Canonical encoding
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decode canonical bytes
    pub fn decode(bytes: &[u8]) -> TypeResult<Self> {
        decode_exact(bytes)
    }

    /// Transaction hash: keccak256 of the canonical encoding
    pub fn hash(&self) -> H256 {
        keccak256(&self.encode())
    }

    /// Replace the data field, keeping the signature
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub(crate) fn append_unsigned_fields(&self, s: &mut RlpStream, data: &[u8]) {
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        match &self.to {
            Some(to) => s.append(to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&data.to_vec());
    }
}

/// Big-endian integer bytes without leading zeros
fn trim_scalar(value: &H256) -> Vec<u8> {
    let bytes = value.as_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

fn decode_scalar(rlp: &Rlp, index: usize) -> Result<H256, DecoderError> {
    let raw: Vec<u8> = rlp.val_at(index)?;
    if raw.len() > 32 {
        return Err(DecoderError::RlpIsTooBig);
    }
    let mut out = [0u8; 32];
    out[32 - raw.len()..].copy_from_slice(&raw);
    Ok(H256::from_bytes(out))
}

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(9);
        self.append_unsigned_fields(s, &self.data);
        s.append(&self.signature.v);
        s.append(&trim_scalar(&self.signature.r));
        s.append(&trim_scalar(&self.signature.s));
    }
}

impl Decodable for Transaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 9 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let to_rlp = rlp.at(3)?;
        let to = if to_rlp.is_empty() {
            None
        } else {
            Some(to_rlp.as_val()?)
        };
        let v: u64 = rlp.val_at(6)?;
        if !PUBLIC_V.contains(&v) && !PRIVATE_V.contains(&v) {
            return Err(DecoderError::Custom("unsupported signature v value"));
        }
        let data: Vec<u8> = rlp.val_at(5)?;
        Ok(Self {
            nonce: rlp.val_at(0)?,
            gas_price: rlp.val_at(1)?,
            gas_limit: rlp.val_at(2)?,
            to,
            value: rlp.val_at(4)?,
            data: Bytes::from(data),
            signature: TxSignature {
                v,
                r: decode_scalar(rlp, 7)?,
                s: decode_scalar(rlp, 8)?,
            },
        })
    }
}
