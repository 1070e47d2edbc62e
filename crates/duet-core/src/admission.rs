//! Admission controller
//!
//! Screens raw transactions before they enter a block. Checks run against the
//! confirmed states only; the pending block never influences admission.

use crate::channel::SecureChannel;
use crate::error::{AdmissionError, AdmissionResult};
use crate::ledgers::SharedLedgers;
use duet_state::Ledger;
use duet_types::payload::payload_reference;
use duet_types::signer::recover_sender;
use duet_types::{PrivatePayload, Transaction};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a raw transaction may be proposed
pub struct AdmissionController {
    confirmed: SharedLedgers,
    channel: Option<Arc<dyn SecureChannel>>,
}

impl AdmissionController {
    /// Create a controller reading `confirmed`
    pub fn new(confirmed: SharedLedgers, channel: Option<Arc<dyn SecureChannel>>) -> Self {
        Self { confirmed, channel }
    }

    /// Check `raw` and return the bytes to propose
    ///
    /// Public transactions come back unchanged. For protected ones the
    /// payload envelope is handed to the secure channel and the returned
    /// bytes carry its reference in place of the data.
    pub fn check_tx(&self, raw: &[u8]) -> AdmissionResult<Vec<u8>> {
        let result = self.check(raw);
        if let Err(e) = &result {
            warn!(error = %e, "rejected transaction");
        }
        result
    }

    fn check(&self, raw: &[u8]) -> AdmissionResult<Vec<u8>> {
        let tx = Transaction::decode(raw).map_err(AdmissionError::Decode)?;

        let channel = match (tx.protected(), &self.channel) {
            (false, _) => None,
            (true, None) => return Err(AdmissionError::UnsupportedPrivateTx),
            (true, Some(channel)) => Some(channel),
        };

        let sender = recover_sender(&tx).map_err(AdmissionError::BadSignature)?;
        let ledger = if tx.protected() { Ledger::Private } else { Ledger::Public };
        let (confirmed_nonce, available) = {
            let confirmed = self.confirmed.lock();
            let state = confirmed.get(ledger);
            (state.nonce(&sender)?, state.balance(&sender)?)
        };

        if confirmed_nonce > tx.nonce {
            return Err(AdmissionError::NonceTooLow {
                confirmed: confirmed_nonce,
                got: tx.nonce,
            });
        }
        let required = tx.cost().ok_or(AdmissionError::CostOverflow)?;
        if available < required {
            return Err(AdmissionError::InsufficientFunds { required, available });
        }

        let Some(channel) = channel else {
            debug!(tx = %tx.hash(), %sender, "admitted transaction");
            return Ok(raw.to_vec());
        };

        let envelope = PrivatePayload::decode(&tx.data).map_err(AdmissionError::Decode)?;
        let signed = envelope.reference();
        let reference = channel.send(&envelope.members, &envelope.payload)?;
        // The rewritten data must stand for the same reference, or the sender changes
        if payload_reference(reference.as_bytes()) != signed.as_bytes() {
            return Err(AdmissionError::ReferenceMismatch {
                signed,
                returned: reference,
            });
        }
        let tx = tx.with_data(reference.as_bytes().to_vec());
        debug!(tx = %tx.hash(), %sender, %reference, "admitted protected transaction");
        Ok(tx.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelError, MemoryChannel};
    use bytes::Bytes;
    use crate::ledgers::LedgerPair;
    use duet_crypto::PrivateKey;
    use duet_primitives::{Address, H256};
    use duet_state::EMPTY_ROOT;
    use duet_storage::{KeyValueStore, MemoryDb};
    use duet_types::Scheme;
    use parking_lot::Mutex;
    use rand::rngs::OsRng;

    const RECIPIENT: Address = Address::from_bytes([0x42; 20]);

    fn confirmed_with(sender: Address, public: u128, private: u128, nonce: u64) -> SharedLedgers {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryDb::new());
        let mut pair = LedgerPair::open(store, EMPTY_ROOT, EMPTY_ROOT).unwrap();
        pair.public.set_balance(sender, public);
        pair.private.set_balance(sender, private);
        pair.public.set_nonce(sender, nonce);
        pair.private.set_nonce(sender, nonce);
        pair.public.commit(true).unwrap();
        pair.private.commit(true).unwrap();
        Arc::new(Mutex::new(pair))
    }

    fn key_and_address() -> (PrivateKey, Address) {
        let key = PrivateKey::random(&mut OsRng);
        let address = duet_crypto::public_key_to_address(key.verifying_key());
        (key, address)
    }

    fn signed(scheme: Scheme, key: &PrivateKey, nonce: u64, value: u128, data: Vec<u8>) -> Transaction {
        let tx = Transaction::new(nonce, Some(RECIPIENT), value, 100_000, 1, data);
        scheme.sign(tx, key).unwrap()
    }

    // ==================== Public ====================

    #[test]
    fn test_public_tx_admitted_unchanged() {
        let (key, sender) = key_and_address();
        let controller = AdmissionController::new(confirmed_with(sender, 1_000_000, 0, 0), None);
        let raw = signed(Scheme::Public, &key, 0, 10, Vec::new()).encode();
        assert_eq!(controller.check_tx(&raw).unwrap(), raw);
    }

    #[test]
    fn test_future_nonce_admitted() {
        let (key, sender) = key_and_address();
        let controller = AdmissionController::new(confirmed_with(sender, 1_000_000, 0, 2), None);
        let raw = signed(Scheme::Public, &key, 5, 0, Vec::new()).encode();
        assert!(controller.check_tx(&raw).is_ok());
    }

    #[test]
    fn test_stale_nonce_rejected() {
        let (key, sender) = key_and_address();
        let controller = AdmissionController::new(confirmed_with(sender, 1_000_000, 0, 3), None);
        let raw = signed(Scheme::Public, &key, 2, 0, Vec::new()).encode();
        assert!(matches!(
            controller.check_tx(&raw),
            Err(AdmissionError::NonceTooLow { confirmed: 3, got: 2 })
        ));
    }

    #[test]
    fn test_insufficient_funds_rejected() {
        let (key, sender) = key_and_address();
        let controller = AdmissionController::new(confirmed_with(sender, 100_009, 0, 0), None);
        let raw = signed(Scheme::Public, &key, 0, 10, Vec::new()).encode();
        assert!(matches!(
            controller.check_tx(&raw),
            Err(AdmissionError::InsufficientFunds { required: 100_010, available: 100_009 })
        ));
    }

    #[test]
    fn test_cost_overflow_rejected() {
        let (key, sender) = key_and_address();
        let controller = AdmissionController::new(confirmed_with(sender, u128::MAX, 0, 0), None);
        let raw = signed(Scheme::Public, &key, 0, u128::MAX, Vec::new()).encode();
        assert!(matches!(controller.check_tx(&raw), Err(AdmissionError::CostOverflow)));
    }

    #[test]
    fn test_garbage_rejected() {
        let controller = AdmissionController::new(confirmed_with(Address::ZERO, 0, 0, 0), None);
        assert!(matches!(controller.check_tx(b"\x01\x02"), Err(AdmissionError::Decode(_))));
    }

    #[test]
    fn test_unsigned_rejected() {
        let controller = AdmissionController::new(confirmed_with(Address::ZERO, 0, 0, 0), None);
        let raw = Transaction::new(0, Some(RECIPIENT), 0, 21_000, 0, Vec::new()).encode();
        assert!(matches!(controller.check_tx(&raw), Err(AdmissionError::BadSignature(_))));
    }

    // ==================== Protected ====================

    #[test]
    fn test_protected_without_channel_rejected() {
        let (key, sender) = key_and_address();
        let controller = AdmissionController::new(confirmed_with(sender, 0, 1_000_000, 0), None);
        let envelope = PrivatePayload::new(vec![b"node-b".to_vec()], b"secret".to_vec());
        let raw = signed(Scheme::Private, &key, 0, 0, envelope.encode()).encode();
        assert!(matches!(controller.check_tx(&raw), Err(AdmissionError::UnsupportedPrivateTx)));
    }

    #[test]
    fn test_protected_payload_replaced_by_reference() {
        let (key, sender) = key_and_address();
        let channel = Arc::new(MemoryChannel::new());
        let controller = AdmissionController::new(
            confirmed_with(sender, 0, 1_000_000, 0),
            Some(channel.clone() as Arc<dyn SecureChannel>),
        );
        let envelope = PrivatePayload::new(vec![b"node-b".to_vec()], b"secret".to_vec());
        let raw = signed(Scheme::Private, &key, 0, 0, envelope.encode()).encode();

        let admitted = Transaction::decode(&controller.check_tx(&raw).unwrap()).unwrap();
        let reference = H256::from_slice(&admitted.data).unwrap();
        assert_eq!(reference, envelope.reference());
        assert!(admitted.protected());
        assert_eq!(recover_sender(&admitted).unwrap(), sender);
        assert_eq!(channel.fetch(&reference).unwrap().as_ref(), b"secret");
        assert_eq!(channel.members(&reference), Some(vec![b"node-b".to_vec()]));
    }

    #[test]
    fn test_protected_envelope_of_reference_length_keeps_sender() {
        let (key, sender) = key_and_address();
        let channel: Arc<dyn SecureChannel> = Arc::new(MemoryChannel::new());
        let controller = AdmissionController::new(confirmed_with(sender, 0, 1_000_000, 0), Some(channel));
        let envelope = PrivatePayload::new(Vec::new(), vec![0x33; 29]);
        assert_eq!(envelope.encode().len(), 32);
        let raw = signed(Scheme::Private, &key, 0, 0, envelope.encode()).encode();

        let admitted = Transaction::decode(&controller.check_tx(&raw).unwrap()).unwrap();
        assert_eq!(admitted.data.as_ref(), envelope.reference().as_bytes());
        assert_eq!(recover_sender(&admitted).unwrap(), sender);
    }

    /// Channel that stores under its own identifiers
    struct NumberingChannel;

    impl SecureChannel for NumberingChannel {
        fn send(&self, _members: &[Vec<u8>], _payload: &[u8]) -> Result<H256, ChannelError> {
            Ok(H256::from_bytes([9; 32]))
        }

        fn fetch(&self, reference: &H256) -> Result<Bytes, ChannelError> {
            Err(ChannelError::NotFound(*reference))
        }
    }

    #[test]
    fn test_foreign_channel_reference_rejected() {
        let (key, sender) = key_and_address();
        let controller = AdmissionController::new(
            confirmed_with(sender, 0, 1_000_000, 0),
            Some(Arc::new(NumberingChannel) as Arc<dyn SecureChannel>),
        );
        let envelope = PrivatePayload::new(vec![b"node-b".to_vec()], b"secret".to_vec());
        let raw = signed(Scheme::Private, &key, 0, 0, envelope.encode()).encode();
        assert!(matches!(
            controller.check_tx(&raw),
            Err(AdmissionError::ReferenceMismatch { signed, .. }) if signed == envelope.reference()
        ));
    }

    #[test]
    fn test_protected_checks_private_balance() {
        let (key, sender) = key_and_address();
        let channel: Arc<dyn SecureChannel> = Arc::new(MemoryChannel::new());
        // Funded on public only
        let controller = AdmissionController::new(confirmed_with(sender, 1_000_000, 0, 0), Some(channel));
        let envelope = PrivatePayload::new(Vec::new(), b"secret".to_vec());
        let raw = signed(Scheme::Private, &key, 0, 0, envelope.encode()).encode();
        assert!(matches!(
            controller.check_tx(&raw),
            Err(AdmissionError::InsufficientFunds { available: 0, .. })
        ));
    }

    #[test]
    fn test_protected_without_envelope_rejected() {
        let (key, sender) = key_and_address();
        let channel: Arc<dyn SecureChannel> = Arc::new(MemoryChannel::new());
        let controller = AdmissionController::new(confirmed_with(sender, 0, 1_000_000, 0), Some(channel));
        let raw = signed(Scheme::Private, &key, 0, 0, b"not an envelope".to_vec()).encode();
        assert!(matches!(controller.check_tx(&raw), Err(AdmissionError::Decode(_))));
    }
}
