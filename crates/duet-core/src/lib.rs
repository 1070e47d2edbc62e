//! # duet-core
//!
//! Dual-ledger execution and commit core driven by BFT consensus hooks.
//!
//! A block flows through the components in order:
//!
//! - [`AdmissionController`] screens raw transactions against the confirmed states
//! - [`SignatureVerifier`] recovers senders on a worker pool ahead of execution
//! - [`BlockExecutor`] applies transactions in block order, reverting failures on both ledgers
//! - [`ReceiptLedger`] accumulates receipts per ledger and commits to them
//! - [`CommitCoordinator`] persists the block atomically and swaps the confirmed states
//! - [`QueryEngine`] answers reads over confirmed, in-progress and historical state
//!
//! [`DuetApp`] wires them together behind the consensus hooks.
//!
//! ## Example
//!
//! ```rust,ignore
//! use duet_core::{AppConfig, DuetApp};
//!
//! let app = DuetApp::start(AppConfig::load("duet.json")?)?;
//! let admitted = app.check_tx(&raw)?;
//! let result = app.on_execute(&block)?;
//! let outcome = app.on_commit(&block)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod app;
pub mod channel;
pub mod commit;
pub mod config;
pub mod error;
pub mod executor;
pub mod index;
pub mod ledgers;
pub mod native;
pub mod query;
pub mod receipts;
pub mod verifier;
pub mod vm;

pub use admission::AdmissionController;
pub use app::{AppBuilder, AppInfo, DuetApp, VERSION};
pub use channel::{ChannelError, MemoryChannel, SecureChannel};
pub use commit::{CommitCoordinator, CommitOutcome};
pub use config::{AppConfig, GenesisConfig};
pub use error::{
    AdmissionError, AdmissionResult, AppError, AppResult, CommitError, CommitResult, ExecutionError,
    ExecutionResult, QueryError, QueryResult,
};
pub use executor::{BlockContext, BlockExecutor, ExecuteResult, InvalidTx};
pub use index::{MemoryIndex, TransactionIndex};
pub use ledgers::{LedgerPair, SharedLedgers};
pub use native::NativeExecutor;
pub use query::{QueryEngine, QueryTag};
pub use receipts::ReceiptLedger;
pub use verifier::SignatureVerifier;
pub use vm::{GasPool, TransactionExecutor};
