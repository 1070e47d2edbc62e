//! ECDSA over secp256k1 with public key recovery

use crate::{keccak256, CryptoError, CryptoResult};
use duet_primitives::{Address, H256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Public key
pub type PublicKey = VerifyingKey;

/// Private key
pub type PrivateKey = SigningKey;

/// Signature components plus the raw recovery id (0 or 1)
///
/// Scheme-specific `v` offsets are applied by the transaction signers, not here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// r component
    pub r: [u8; 32],
    /// s component (always in the lower half of the curve order)
    pub s: [u8; 32],
    /// Recovery id
    pub recovery_id: u8,
}

impl RecoverableSignature {
    fn to_k256(self) -> CryptoResult<(Signature, RecoveryId)> {
        let sig = Signature::from_scalars(self.r, self.s)
            .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
        if sig.normalize_s().is_some() {
            return Err(CryptoError::NonCanonical);
        }
        let id = RecoveryId::from_byte(self.recovery_id)
            .ok_or(CryptoError::RecoveryId(self.recovery_id))?;
        Ok((sig, id))
    }
}

/// Sign a 32-byte prehash, normalizing s to the low half (EIP-2)
pub fn sign(message_hash: &H256, private_key: &PrivateKey) -> CryptoResult<RecoverableSignature> {
    let (mut sig, mut id) = private_key
        .sign_prehash_recoverable(message_hash.as_bytes())
        .map_err(|e| CryptoError::Sign(e.to_string()))?;

    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        id = RecoveryId::new(!id.is_y_odd(), id.is_x_reduced());
    }

    Ok(RecoverableSignature {
        r: sig.r().to_bytes().into(),
        s: sig.s().to_bytes().into(),
        recovery_id: id.to_byte(),
    })
}

/// Recover the signer's public key
pub fn recover_public_key(
    message_hash: &H256,
    signature: &RecoverableSignature,
) -> CryptoResult<PublicKey> {
    let (sig, id) = signature.to_k256()?;
    VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &sig, id)
        .map_err(|e| CryptoError::Unrecoverable(e.to_string()))
}

/// Recover the signer's address
pub fn recover_address(message_hash: &H256, signature: &RecoverableSignature) -> CryptoResult<Address> {
    recover_public_key(message_hash, signature).map(|pk| public_key_to_address(&pk))
}

/// Last 20 bytes of keccak256 over the uncompressed public key without its 0x04 tag
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    const N_DIV_2: [u8; 32] = [
        0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
        0xFF, 0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B,
        0x20, 0xA0,
    ];

    #[test]
    fn test_sign_and_recover() {
        let key = SigningKey::random(&mut OsRng);
        let hash = keccak256(b"duet");
        let sig = sign(&hash, &key).unwrap();

        let recovered = recover_public_key(&hash, &sig).unwrap();
        assert_eq!(&recovered, key.verifying_key());
        assert_eq!(
            recover_address(&hash, &sig).unwrap(),
            public_key_to_address(key.verifying_key())
        );
    }

    #[test]
    fn test_signatures_are_low_s() {
        for _ in 0..16 {
            let key = SigningKey::random(&mut OsRng);
            let sig = sign(&keccak256(b"low-s"), &key).unwrap();
            assert!(sig.s <= N_DIV_2);
        }
    }

    #[test]
    fn test_wrong_message_recovers_other_address() {
        let key = SigningKey::random(&mut OsRng);
        let sig = sign(&keccak256(b"a"), &key).unwrap();
        let other = recover_address(&keccak256(b"b"), &sig);
        assert_ne!(other.ok(), Some(public_key_to_address(key.verifying_key())));
    }

    #[test]
    fn test_invalid_recovery_id() {
        let key = SigningKey::random(&mut OsRng);
        let hash = keccak256(b"id");
        let mut sig = sign(&hash, &key).unwrap();
        sig.recovery_id = 7;
        assert_eq!(recover_address(&hash, &sig), Err(CryptoError::RecoveryId(7)));
    }

    #[test]
    fn test_zero_scalar_rejected() {
        let sig = RecoverableSignature { r: [0; 32], s: [0; 32], recovery_id: 0 };
        assert!(matches!(
            recover_address(&H256::ZERO, &sig),
            Err(CryptoError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_known_address() {
        // Private key 1 -> 0x7e5f4552091a69125d5dfcb7b8c2659029395bdf
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let key = SigningKey::from_bytes(&bytes.into()).unwrap();
        assert_eq!(
            public_key_to_address(key.verifying_key()).to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }
}
