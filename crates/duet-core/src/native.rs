//! Deterministic reference executor
//!
//! Implements plain value transfers, contract creation that installs the
//! transaction data as code, and a single-slot storage contract model:
//! a call with 64 bytes of data writes `data[32..]` into slot `data[..32]`
//! and logs it, a read-only call with 32 bytes returns that slot.

use crate::error::{ExecutionError, ExecutionResult};
use crate::vm::{GasPool, TransactionExecutor};
use bytes::Bytes;
use duet_crypto::keccak256;
use duet_primitives::{Address, H256};
use duet_state::{WorldState, EMPTY_CODE_HASH};
use duet_types::{Header, Receipt, Transaction, TxStatus};
use rlp::RlpStream;

/// Base cost of any transaction
pub const TX_GAS: u64 = 21_000;
/// Base cost of a contract creation
pub const TX_CREATE_GAS: u64 = 53_000;
const TX_DATA_ZERO_GAS: u64 = 4;
const TX_DATA_NON_ZERO_GAS: u64 = 16;
const CODE_DEPOSIT_GAS: u64 = 200;
const SSTORE_GAS: u64 = 20_000;
const LOG_GAS: u64 = 375;

/// Gas charged before any execution
pub fn intrinsic_gas(tx: &Transaction) -> u64 {
    let base = if tx.is_create() { TX_CREATE_GAS } else { TX_GAS };
    tx.data.iter().fold(base, |gas, b| {
        gas.saturating_add(if *b == 0 { TX_DATA_ZERO_GAS } else { TX_DATA_NON_ZERO_GAS })
    })
}

/// Calculate CREATE address: keccak256(RLP([sender, nonce]))[12:]
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(sender);
    stream.append(&nonce);
    let hash = keccak256(&stream.out());
    Address::from_slice(&hash.as_bytes()[12..]).unwrap_or(Address::ZERO)
}

/// Reference [`TransactionExecutor`]
#[derive(Clone, Debug)]
pub struct NativeExecutor {
    gas_ceiling: u64,
}

impl NativeExecutor {
    /// Executor bounding every transaction by `gas_ceiling`
    pub fn new(gas_ceiling: u64) -> Self {
        Self { gas_ceiling }
    }

    fn transfer(state: &mut WorldState, from: Address, to: Address, value: u128) -> ExecutionResult<()> {
        if value == 0 {
            return Ok(());
        }
        state.sub_balance(from, value)?;
        state.add_balance(to, value)?;
        Ok(())
    }

    /// Run the message body, returning gas used and the created contract
    fn apply(
        &self,
        tx: &Transaction,
        sender: Address,
        nonce: u64,
        state: &mut WorldState,
    ) -> ExecutionResult<(u64, Option<Address>)> {
        let mut gas = intrinsic_gas(tx);

        let Some(to) = tx.to else {
            let address = create_address(&sender, nonce);
            if state.code_hash(&address)? != EMPTY_CODE_HASH {
                return Err(ExecutionError::Reverted(format!("contract address collision at {address}")));
            }
            gas = gas.saturating_add(CODE_DEPOSIT_GAS.saturating_mul(tx.data.len() as u64));
            Self::transfer(state, sender, address, tx.value)?;
            state.set_code(address, tx.data.clone());
            return Ok((gas, Some(address)));
        };

        Self::transfer(state, sender, to, tx.value)?;
        if state.code(&to)?.is_empty() {
            return Ok((gas, None));
        }

        match tx.data.len() {
            0 => {}
            64 => {
                let slot = H256::from_slice(&tx.data[..32])
                    .map_err(|e| ExecutionError::Reverted(e.to_string()))?;
                let value = H256::from_slice(&tx.data[32..])
                    .map_err(|e| ExecutionError::Reverted(e.to_string()))?;
                state.set_storage(to, slot, value);
                state.add_log(to, vec![slot], tx.data.slice(32..));
                gas = gas.saturating_add(SSTORE_GAS + LOG_GAS);
            }
            n => return Err(ExecutionError::Reverted(format!("unsupported call data length {n}"))),
        }
        Ok((gas, None))
    }
}

impl Default for NativeExecutor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GAS_CEILING)
    }
}

impl TransactionExecutor for NativeExecutor {
    fn execute(
        &self,
        tx: &Transaction,
        sender: Address,
        state: &mut WorldState,
        header: &Header,
        gas_pool: &mut GasPool,
    ) -> ExecutionResult<Receipt> {
        let expected = state.nonce(&sender)?;
        if tx.nonce != expected {
            return Err(ExecutionError::NonceMismatch {
                expected,
                got: tx.nonce,
            });
        }

        let intrinsic = intrinsic_gas(tx);
        if intrinsic > tx.gas_limit {
            return Err(ExecutionError::IntrinsicGas {
                required: intrinsic,
                limit: tx.gas_limit,
            });
        }

        let available = state.balance(&sender)?;
        let required = tx.cost().ok_or(ExecutionError::InsufficientBalance {
            required: u128::MAX,
            available,
        })?;
        if available < required {
            return Err(ExecutionError::InsufficientBalance { required, available });
        }

        // Buy gas up front
        gas_pool.sub_gas(tx.gas_limit)?;
        state.sub_balance(sender, tx.gas_limit as u128 * tx.gas_price)?;
        state.increment_nonce(sender)?;

        let (gas_used, contract) = self.apply(tx, sender, expected, state)?;
        let limit = tx.gas_limit.min(self.gas_ceiling);
        if gas_used > limit {
            return Err(ExecutionError::OutOfGas { used: gas_used, limit });
        }

        let unused = tx.gas_limit - gas_used;
        state.add_balance(sender, unused as u128 * tx.gas_price)?;
        gas_pool.add_gas(unused);
        state.add_balance(header.coinbase, gas_used as u128 * tx.gas_price)?;

        let tx_hash = tx.hash();
        let mut receipt = Receipt::new(tx_hash, TxStatus::Success, gas_used, state.tx_logs(&tx_hash));
        if let Some(address) = contract {
            receipt = receipt.with_contract_address(address);
        }
        Ok(receipt)
    }

    fn call(
        &self,
        tx: &Transaction,
        sender: Address,
        state: &mut WorldState,
        _header: &Header,
    ) -> ExecutionResult<Bytes> {
        match tx.to {
            Some(to) if tx.data.len() == 32 => {
                let slot = H256::from_slice(&tx.data)
                    .map_err(|e| ExecutionError::Reverted(e.to_string()))?;
                Ok(Bytes::copy_from_slice(state.storage(&to, &slot)?.as_bytes()))
            }
            None => {
                let nonce = state.nonce(&sender)?;
                Ok(Bytes::copy_from_slice(create_address(&sender, nonce).as_bytes()))
            }
            Some(_) => {
                let nonce = state.nonce(&sender)?;
                let (gas_used, _) = self.apply(tx, sender, nonce, state)?;
                if gas_used > self.gas_ceiling {
                    return Err(ExecutionError::OutOfGas {
                        used: gas_used,
                        limit: self.gas_ceiling,
                    });
                }
                Ok(Bytes::new())
            }
        }
    }
}
