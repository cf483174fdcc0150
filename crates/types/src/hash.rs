use crate::{Result, TypesError};
use primitive_types::{H160 as PrimitiveH160, H256 as PrimitiveH256};

pub type H160 = PrimitiveH160;
pub type H256 = PrimitiveH256;

/// Decodes a hex string into raw bytes.
///
/// Accepts an optional `0x`/`0X` prefix and an odd number of digits, in which
/// case the value is left-padded with a zero nibble. The empty string decodes
/// to an empty byte vector.
pub fn decode_hex(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let decoded = if digits.len() % 2 == 1 {
        hex::decode(format!("0{}", digits))
    } else {
        hex::decode(digits)
    };

    decoded.map_err(|_| TypesError::InvalidHex(input.to_string()))
}
