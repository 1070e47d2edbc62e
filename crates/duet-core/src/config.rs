//! Application configuration

use crate::error::{AppError, AppResult};
use duet_primitives::Address;
use duet_storage::DbOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-transaction gas safety ceiling
pub const DEFAULT_GAS_CEILING: u64 = 100_000_000;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Database directory
    pub db_dir: PathBuf,
    /// RocksDB tuning
    pub db: DbOptions,
    /// Maximum gas a single transaction may consume
    pub gas_ceiling: u64,
    /// Gas limit placed in the synthetic execution header
    pub block_gas_limit: u64,
    /// Signature verifier threads, 0 for one per CPU
    pub verifier_threads: usize,
    /// Chain ID (informational)
    pub chain_id: u64,
    /// Initial allocations applied on first start
    pub genesis: GenesisConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("data/duet"),
            db: DbOptions::default(),
            gas_ceiling: DEFAULT_GAS_CEILING,
            block_gas_limit: u64::MAX,
            verifier_threads: 0,
            chain_id: 1337,
            genesis: GenesisConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

/// Genesis balances per ledger
///
/// Both maps empty means both ledgers start at the empty root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Public ledger balances
    pub public_alloc: BTreeMap<Address, u128>,
    /// Private ledger balances
    pub private_alloc: BTreeMap<Address, u128>,
}

impl GenesisConfig {
    /// Whether no allocation is configured
    pub fn is_empty(&self) -> bool {
        self.public_alloc.is_empty() && self.private_alloc.is_empty()
    }
}
