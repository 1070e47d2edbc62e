//! The two signing schemes: public-ledger and private-ledger transactions

use crate::error::{TypeError, TypeResult};
use crate::payload::payload_reference;
use crate::transaction::{Transaction, TxSignature, PRIVATE_V, PUBLIC_V};
use duet_crypto::{keccak256, recover_address, sign, PrivateKey, RecoverableSignature};
use duet_primitives::{Address, H256};
use rlp::RlpStream;

/// Domain tag appended to private-scheme signing payloads
const PRIVATE_DOMAIN: &[u8] = b"duet-private";

/// Signature scheme of a transaction
///
/// Public transactions sign the plain field list. Private transactions sign
/// the payload reference instead of the data and carry a domain tag, so the
/// signature stays valid when admission rewrites the data into the reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Public ledger scheme, v ∈ {27, 28}
    Public,
    /// Private ledger scheme, v ∈ {37, 38}
    Private,
}

impl Scheme {
    /// Scheme implied by the transaction's protected flag
    pub fn of(tx: &Transaction) -> Self {
        if tx.protected() {
            Scheme::Private
        } else {
            Scheme::Public
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Scheme::Public => "public",
            Scheme::Private => "private",
        }
    }

    fn v_values(self) -> [u64; 2] {
        match self {
            Scheme::Public => PUBLIC_V,
            Scheme::Private => PRIVATE_V,
        }
    }

    /// Digest signed by the sender
    pub fn signing_hash(self, tx: &Transaction) -> H256 {
        match self {
            Scheme::Public => {
                let mut s = RlpStream::new_list(6);
                tx.append_unsigned_fields(&mut s, &tx.data);
                keccak256(&s.out())
            }
            Scheme::Private => {
                let mut s = RlpStream::new_list(7);
                tx.append_unsigned_fields(&mut s, &payload_reference(&tx.data));
                s.append(&PRIVATE_DOMAIN.to_vec());
                keccak256(&s.out())
            }
        }
    }

    /// Recover the sender address
    pub fn sender(self, tx: &Transaction) -> TypeResult<Address> {
        let [base, _] = self.v_values();
        let v = tx.signature.v;
        if !self.v_values().contains(&v) {
            return Err(TypeError::SchemeMismatch {
                scheme: self.name(),
                v,
            });
        }
        let signature = RecoverableSignature {
            r: *tx.signature.r.as_bytes(),
            s: *tx.signature.s.as_bytes(),
            recovery_id: (v - base) as u8,
        };
        Ok(recover_address(&self.signing_hash(tx), &signature)?)
    }

    /// Sign `tx` under this scheme, replacing any existing signature
    pub fn sign(self, mut tx: Transaction, key: &PrivateKey) -> TypeResult<Transaction> {
        let [base, _] = self.v_values();
        let signature = sign(&self.signing_hash(&tx), key)?;
        tx.signature = TxSignature {
            v: base + signature.recovery_id as u64,
            r: H256::from_bytes(signature.r),
            s: H256::from_bytes(signature.s),
        };
        Ok(tx)
    }
}

/// Recover the sender with the scheme implied by the protected flag
pub fn recover_sender(tx: &Transaction) -> TypeResult<Address> {
    Scheme::of(tx).sender(tx)
}
