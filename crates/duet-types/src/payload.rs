//! Private payload envelope carried in protected transactions before admission

use crate::error::{decode_exact, TypeResult};
use bytes::Bytes;
use duet_crypto::keccak256;
use duet_primitives::H256;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// Confidential payload plus the members allowed to read it
///
/// Encoded as RLP `[[member, ...], payload]`. Admission hands it to the
/// secure channel and swaps the transaction data for the returned reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivatePayload {
    /// Opaque member identifiers
    pub members: Vec<Vec<u8>>,
    /// Confidential bytes
    pub payload: Bytes,
}

impl PrivatePayload {
    /// Build an envelope
    pub fn new(members: Vec<Vec<u8>>, payload: impl Into<Bytes>) -> Self {
        Self {
            members,
            payload: payload.into(),
        }
    }

    /// Content address under which the secure channel stores the payload
    pub fn reference(&self) -> H256 {
        keccak256(&self.payload)
    }

    /// Canonical encoding
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decode an envelope
    pub fn decode(bytes: &[u8]) -> TypeResult<Self> {
        decode_exact(bytes)
    }
}

/// The payload reference a protected transaction's data stands for.
///
/// An envelope maps to the digest of its payload whatever its encoded
/// length; any other data, including an already rewritten reference, is
/// taken verbatim.
pub fn payload_reference(data: &[u8]) -> Vec<u8> {
    match PrivatePayload::decode(data) {
        Ok(envelope) => envelope.reference().as_bytes().to_vec(),
        Err(_) => data.to_vec(),
    }
}

impl Encodable for PrivatePayload {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.begin_list(self.members.len());
        for member in &self.members {
            s.append(member);
        }
        s.append(&self.payload.to_vec());
    }
}

impl Decodable for PrivatePayload {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let payload: Vec<u8> = rlp.val_at(1)?;
        Ok(Self {
            members: rlp.list_at(0)?,
            payload: Bytes::from(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_encoding() {
        let envelope = PrivatePayload::new(vec![b"alice".to_vec(), b"bob".to_vec()], b"secret".to_vec());
        let decoded = PrivatePayload::decode(&envelope.encode()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_reference_of_envelope_is_payload_digest() {
        let envelope = PrivatePayload::new(vec![], b"secret".to_vec());
        assert_eq!(
            payload_reference(&envelope.encode()),
            keccak256(b"secret").as_bytes().to_vec()
        );
    }

    #[test]
    fn test_reference_passthrough() {
        let reference = [7u8; 32];
        assert_eq!(payload_reference(&reference), reference.to_vec());
        assert_eq!(payload_reference(b"plain"), b"plain".to_vec());
    }

    #[test]
    fn test_envelope_of_reference_length_still_maps_to_digest() {
        // [[], 29 bytes] encodes to exactly 32 bytes
        let envelope = PrivatePayload::new(vec![], vec![0xab; 29]);
        assert_eq!(envelope.encode().len(), H256::LEN);
        assert_eq!(
            payload_reference(&envelope.encode()),
            envelope.reference().as_bytes().to_vec()
        );
    }

    #[test]
    fn test_not_an_envelope() {
        assert!(PrivatePayload::decode(&[0x80]).is_err());
    }
}
