//! # duet-state
//!
//! World State Manager for the Duet ledgers.
//!
//! Each ledger (public, private) is a [`WorldState`]: a content-addressed
//! account tree persisted node by node in the ledger's column family, plus a
//! copy-on-write journal of layered deltas for in-block mutation.
//!
//! - [`WorldState::open_at`] reopens any committed root
//! - [`WorldState::snapshot`] / [`WorldState::revert_to_snapshot`] bracket a transaction
//! - [`WorldState::commit`] folds the journal into a new root, [`WorldState::flush`]
//!   moves the new nodes into a write batch
//! - [`WorldState::copy`] hands out an independent branch for queries

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod account;
pub mod error;
mod journal;
pub mod world;

pub use account::{Account, EMPTY_CODE_HASH, EMPTY_ROOT};
pub use error::{StateError, StateResult};
pub use world::{Ledger, WorldState};
