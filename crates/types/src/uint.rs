use crate::H256;
use num_bigint::BigUint;
use primitive_types::{U256 as PrimitiveU256, U512 as PrimitiveU512};

pub type U256 = PrimitiveU256;
pub type U512 = PrimitiveU512;

/// Account balance. Unbounded and unsigned, so a balance can never go
/// negative and never overflows.
pub type Wei = BigUint;

/// Conversions between balances and 256-bit machine words.
pub trait WeiExt: Sized {
    fn from_u256(value: U256) -> Self;

    /// Converts to a machine word, clamping at `U256::MAX`.
    fn to_u256_saturating(&self) -> U256;
}

impl WeiExt for Wei {
    fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        BigUint::from_bytes_be(&bytes)
    }

    fn to_u256_saturating(&self) -> U256 {
        let bytes = self.to_bytes_be();
        if bytes.len() > 32 {
            U256::MAX
        } else {
            U256::from_big_endian(&bytes)
        }
    }
}

pub fn u256_to_h256(value: U256) -> H256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    H256::from(bytes)
}

pub fn h256_to_u256(value: H256) -> U256 {
    U256::from_big_endian(value.as_bytes())
}
