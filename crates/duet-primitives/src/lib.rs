//! # duet-primitives
//!
//! Fixed-size byte types shared by every Duet crate.
//!
//! - [`Address`]: 20-byte account identity, shared by the public and private ledgers
//! - [`H256`]: 32-byte digest used for roots, code hashes and transaction hashes

#![warn(missing_docs)]
#![warn(clippy::all)]

mod fixed;
mod address;
mod error;
mod hash;

pub use address::Address;
pub use error::PrimitiveError;
pub use hash::H256;

