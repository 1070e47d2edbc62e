//! # duet-types
//!
//! Wire and storage types for the Duet execution core.
//!
//! - [`Transaction`](transaction::Transaction) with its derived *protected* flag
//! - [`Scheme`](signer::Scheme): the public and private signing schemes
//! - [`Receipt`](receipt::Receipt) and its canonical storage encoding
//! - [`Block`](block::Block) as delivered by consensus, the synthetic
//!   execution [`Header`](block::Header) and [`LastBlockInfo`](block::LastBlockInfo)
//! - [`receipts_root`](merkle::receipts_root): the binary Merkle commitment over receipts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod error;
pub mod merkle;
pub mod payload;
pub mod receipt;
pub mod signer;
pub mod transaction;

pub use block::{Block, Header, LastBlockInfo};
pub use error::{TypeError, TypeResult};
pub use merkle::{merkle_root, receipts_root};
pub use payload::PrivatePayload;
pub use receipt::{Bloom, Log, Receipt, TxStatus};
pub use signer::Scheme;
pub use transaction::{Transaction, TxSignature};
