use num_bigint::BigUint;
use ripemd::Ripemd160;
use sandbox_crypto::ecrecover;
use sandbox_types::{Address, H256, U256};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::execution::ExecutionResult;
use crate::gas::words;
use crate::memory::padded_slice;
use crate::{EvmError, EvmResult};

pub const ECRECOVER_ADDRESS: u64 = 0x01;
pub const SHA256_ADDRESS: u64 = 0x02;
pub const RIPEMD160_ADDRESS: u64 = 0x03;
pub const IDENTITY_ADDRESS: u64 = 0x04;
pub const MODEXP_ADDRESS: u64 = 0x05;

pub trait PrecompiledContract {
    fn name(&self) -> &'static str;
    fn required_gas(&self, input: &[u8]) -> u64;
    fn run(&self, input: &[u8]) -> EvmResult<Vec<u8>>;
}

/// Signer recovery from `hash ++ v ++ r ++ s`. Invalid signatures produce
/// empty output rather than a failure.
pub struct EcRecover;

impl PrecompiledContract for EcRecover {
    fn name(&self) -> &'static str {
        "ecrecover"
    }

    fn required_gas(&self, _input: &[u8]) -> u64 {
        3000
    }

    fn run(&self, input: &[u8]) -> EvmResult<Vec<u8>> {
        let input = padded_slice(input, U256::zero(), 128);

        // v is a full word that must be exactly 27 or 28.
        if input[32..63].iter().any(|b| *b != 0) || !matches!(input[63], 27 | 28) {
            return Ok(Vec::new());
        }
        let hash = H256::from_slice(&input[..32]);
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&input[64..96]);
        s.copy_from_slice(&input[96..128]);

        match ecrecover(&hash, input[63] - 27, &r, &s) {
            Ok(address) => {
                let mut output = vec![0u8; 12];
                output.extend_from_slice(address.as_bytes());
                Ok(output)
            }
            Err(err) => {
                trace!(%err, "ecrecover failed");
                Ok(Vec::new())
            }
        }
    }
}

pub struct Sha256Hash;

impl PrecompiledContract for Sha256Hash {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        60 + 12 * words(input.len())
    }

    fn run(&self, input: &[u8]) -> EvmResult<Vec<u8>> {
        Ok(Sha256::digest(input).to_vec())
    }
}

pub struct Ripemd160Hash;

impl PrecompiledContract for Ripemd160Hash {
    fn name(&self) -> &'static str {
        "ripemd160"
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        600 + 120 * words(input.len())
    }

    fn run(&self, input: &[u8]) -> EvmResult<Vec<u8>> {
        let mut output = vec![0u8; 12];
        output.extend_from_slice(&Ripemd160::digest(input));
        Ok(output)
    }
}

pub struct Identity;

impl PrecompiledContract for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        15 + 3 * words(input.len())
    }

    fn run(&self, input: &[u8]) -> EvmResult<Vec<u8>> {
        Ok(input.to_vec())
    }
}

/// Big-integer modular exponentiation, priced per EIP-2565.
pub struct ModExp;

impl ModExp {
    const HEADER_LEN: usize = 96;

    fn lengths(input: &[u8]) -> (u64, u64, u64) {
        let header = padded_slice(input, U256::zero(), Self::HEADER_LEN);
        let length = |word: &[u8]| {
            let value = U256::from_big_endian(word);
            if value > U256::from(u64::MAX) {
                u64::MAX
            } else {
                value.low_u64()
            }
        };
        (
            length(&header[..32]),
            length(&header[32..64]),
            length(&header[64..96]),
        )
    }

    /// Leading (at most 32) bytes of the exponent.
    fn exponent_head(input: &[u8], base_len: u64, exp_len: u64) -> BigUint {
        let offset = U256::from(Self::HEADER_LEN) + U256::from(base_len);
        let head = padded_slice(input, offset, exp_len.min(32) as usize);
        BigUint::from_bytes_be(&head)
    }
}

impl PrecompiledContract for ModExp {
    fn name(&self) -> &'static str {
        "modexp"
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        let (base_len, exp_len, mod_len) = Self::lengths(input);

        let words = u128::from(base_len.max(mod_len)).div_ceil(8);
        let multiplication_complexity = words.saturating_mul(words);

        let head_bits = Self::exponent_head(input, base_len, exp_len).bits() as u128;
        let head_iterations = head_bits.saturating_sub(1);
        let iterations = if exp_len <= 32 {
            head_iterations
        } else {
            (8 * u128::from(exp_len - 32)).saturating_add(head_iterations)
        }
        .max(1);

        let gas = multiplication_complexity.saturating_mul(iterations) / 3;
        u64::try_from(gas).unwrap_or(u64::MAX).max(200)
    }

    fn run(&self, input: &[u8]) -> EvmResult<Vec<u8>> {
        let (base_len, exp_len, mod_len) = Self::lengths(input);
        if base_len == 0 && mod_len == 0 {
            return Ok(Vec::new());
        }
        let to_len = |len: u64| {
            usize::try_from(len)
                .map_err(|_| EvmError::PrecompileFailed("modexp operand too large".into()))
        };
        let (base_size, exp_size, mod_size) = (to_len(base_len)?, to_len(exp_len)?, to_len(mod_len)?);

        let base_offset = U256::from(Self::HEADER_LEN);
        let exp_offset = base_offset + U256::from(base_len);
        let mod_offset = exp_offset + U256::from(exp_len);

        let base = BigUint::from_bytes_be(&padded_slice(input, base_offset, base_size));
        let exponent = BigUint::from_bytes_be(&padded_slice(input, exp_offset, exp_size));
        let modulus = BigUint::from_bytes_be(&padded_slice(input, mod_offset, mod_size));

        let mut output = vec![0u8; mod_size];
        if modulus != BigUint::default() {
            let result = base.modpow(&exponent, &modulus).to_bytes_be();
            output[mod_size - result.len()..].copy_from_slice(&result);
        }
        Ok(output)
    }
}

/// The precompile living at `address`, if any.
pub fn precompile(address: &Address) -> Option<&'static dyn PrecompiledContract> {
    let bytes = address.as_bytes();
    if bytes[..19].iter().any(|b| *b != 0) {
        return None;
    }
    let contract: &'static dyn PrecompiledContract = match u64::from(bytes[19]) {
        ECRECOVER_ADDRESS => &EcRecover,
        SHA256_ADDRESS => &Sha256Hash,
        RIPEMD160_ADDRESS => &Ripemd160Hash,
        IDENTITY_ADDRESS => &Identity,
        MODEXP_ADDRESS => &ModExp,
        _ => return None,
    };
    Some(contract)
}

pub fn is_precompiled(address: &Address) -> bool {
    precompile(address).is_some()
}

/// Runs a precompile as a complete call frame.
pub fn run_precompile(
    contract: &dyn PrecompiledContract,
    input: &[u8],
    gas_limit: u64,
) -> ExecutionResult {
    let cost = contract.required_gas(input);
    if cost > gas_limit {
        return ExecutionResult::halt(EvmError::OutOfGas);
    }
    trace!(precompile = contract.name(), cost, "running precompile");
    match contract.run(input) {
        Ok(output) => ExecutionResult::success(output, gas_limit - cost),
        Err(err) => ExecutionResult::halt(err),
    }
}
