use crate::error::{EvmError, EvmResult};
use sandbox_types::{H256, U256};

#[derive(Debug, Clone, Copy)]
pub struct Gas {
    limit: u64,
    used: u64,
}

impl Gas {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn consume(&mut self, amount: u64) -> EvmResult<()> {
        let new_used = self.used.saturating_add(amount);
        if new_used > self.limit {
            Err(EvmError::OutOfGas)
        } else {
            self.used = new_used;
            Ok(())
        }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// Gives back gas a child frame left unspent.
    pub fn return_gas(&mut self, amount: u64) {
        self.used = self.used.saturating_sub(amount);
    }

    /// Largest amount a child frame may receive: all but one 64th of what
    /// is left, capped by the requested amount.
    pub fn forwardable(&self, requested: U256) -> u64 {
        let remaining = self.remaining();
        let cap = remaining - remaining / 64;
        if requested > U256::from(cap) {
            cap
        } else {
            requested.low_u64()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GasCost;

impl GasCost {
    pub const JUMPDEST: u64 = 1;
    pub const BASE: u64 = 2;
    pub const VERYLOW: u64 = 3;
    pub const LOW: u64 = 5;
    pub const MID: u64 = 8;
    pub const HIGH: u64 = 10;
    pub const BLOCKHASH: u64 = 20;

    pub const WARM_ACCESS: u64 = 100;
    pub const COLD_SLOAD: u64 = 2100;
    pub const COLD_ACCOUNT_ACCESS: u64 = 2600;

    pub const SSET: u64 = 20000;
    pub const SRESET: u64 = 2900;
    /// `SSTORE` fails when no more than this is left.
    pub const SSTORE_SENTRY: u64 = 2300;

    pub const SELFDESTRUCT: u64 = 5000;
    pub const SELFDESTRUCT_NEWACCOUNT: u64 = 25000;

    pub const CREATE: u64 = 32000;
    pub const CODEDEPOSIT: u64 = 200;
    pub const CALLVALUE: u64 = 9000;
    pub const CALLSTIPEND: u64 = 2300;
    pub const NEWACCOUNT: u64 = 25000;

    pub const EXP: u64 = 10;
    pub const EXPBYTE: u64 = 50;
    pub const MEMORY: u64 = 3;
    pub const COPY: u64 = 3;
    pub const LOG: u64 = 375;
    pub const LOGDATA: u64 = 8;
    pub const LOGTOPIC: u64 = 375;
    pub const KECCAK256: u64 = 30;
    pub const KECCAK256WORD: u64 = 6;

    /// Total cost of a memory of `words` 32-byte words.
    pub fn memory_cost(words: u64) -> u64 {
        let linear = words.saturating_mul(Self::MEMORY);
        let quadratic = words.saturating_mul(words) / 512;
        linear.saturating_add(quadratic)
    }

    pub fn exp_cost(exponent: U256) -> u64 {
        let byte_size = (exponent.bits() as u64 + 7) / 8;
        Self::EXP.saturating_add(Self::EXPBYTE.saturating_mul(byte_size))
    }

    pub fn keccak256_cost(len: usize) -> u64 {
        Self::KECCAK256.saturating_add(Self::keccak256_word_cost(len))
    }

    /// Per-word hashing charge, also paid by `CREATE2` for its init code.
    pub fn keccak256_word_cost(len: usize) -> u64 {
        Self::KECCAK256WORD.saturating_mul(words(len))
    }

    pub fn copy_cost(len: usize) -> u64 {
        Self::COPY.saturating_mul(words(len))
    }

    pub fn log_cost(topics: usize, len: usize) -> u64 {
        Self::LOG
            .saturating_add(Self::LOGTOPIC.saturating_mul(topics as u64))
            .saturating_add(Self::LOGDATA.saturating_mul(len as u64))
    }

    /// Flat `SSTORE` schedule without refunds.
    pub fn sstore_cost(current: &H256, new: &H256) -> u64 {
        if current == new {
            Self::WARM_ACCESS
        } else if current.is_zero() {
            Self::SSET
        } else {
            Self::SRESET
        }
    }

    pub fn code_deposit_cost(len: usize) -> u64 {
        Self::CODEDEPOSIT.saturating_mul(len as u64)
    }
}

/// Number of 32-byte words needed to hold `len` bytes.
pub fn words(len: usize) -> u64 {
    (len as u64).div_ceil(32)
}
