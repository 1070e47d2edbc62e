//! Secure payload channel collaborator

use bytes::Bytes;
use duet_crypto::keccak256;
use duet_primitives::H256;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

/// Secure channel failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Channel refused or failed to store the payload
    #[error("send failed: {0}")]
    Send(String),

    /// No payload stored under the reference
    #[error("payload {0} not found")]
    NotFound(H256),
}

/// External service storing confidential payloads by content reference
///
/// The reference returned by `send` must be `keccak256(payload)` so that the
/// private signing scheme, which commits to that reference, keeps verifying
/// after admission replaces the payload with it. Admission rejects the
/// transaction when a channel returns any other reference.
pub trait SecureChannel: Send + Sync {
    /// Store `payload` for `members`, returning its reference
    fn send(&self, members: &[Vec<u8>], payload: &[u8]) -> Result<H256, ChannelError>;

    /// Retrieve a payload by reference
    fn fetch(&self, reference: &H256) -> Result<Bytes, ChannelError>;
}

/// In-process channel keeping payloads in memory
#[derive(Default)]
pub struct MemoryChannel {
    payloads: RwLock<HashMap<H256, (Vec<Vec<u8>>, Bytes)>>,
}

impl MemoryChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Members a payload was sent to
    pub fn members(&self, reference: &H256) -> Option<Vec<Vec<u8>>> {
        self.payloads.read().get(reference).map(|(m, _)| m.clone())
    }
}

impl SecureChannel for MemoryChannel {
    fn send(&self, members: &[Vec<u8>], payload: &[u8]) -> Result<H256, ChannelError> {
        let reference = keccak256(payload);
        self.payloads
            .write()
            .insert(reference, (members.to_vec(), Bytes::copy_from_slice(payload)));
        Ok(reference)
    }

    fn fetch(&self, reference: &H256) -> Result<Bytes, ChannelError> {
        self.payloads
            .read()
            .get(reference)
            .map(|(_, p)| p.clone())
            .ok_or(ChannelError::NotFound(*reference))
    }
}
