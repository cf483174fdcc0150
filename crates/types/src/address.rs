use crate::{decode_hex, Result, TypesError, H160, U256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(H160);

impl Address {
    pub const ZERO: Address = Address(H160::zero());
    pub const LEN: usize = 20;

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != Self::LEN {
            return Err(TypesError::InvalidLength {
                expected: Self::LEN,
                actual: slice.len(),
            });
        }
        Ok(Address(H160::from_slice(slice)))
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(H160::from(bytes))
    }

    /// Builds an address whose low eight bytes hold `value` big-endian.
    pub fn from_low_u64_be(value: u64) -> Self {
        Address(H160::from_low_u64_be(value))
    }

    /// Takes the low 20 bytes of a stack word.
    pub fn from_word(word: U256) -> Self {
        let mut bytes = [0u8; 32];
        word.to_big_endian(&mut bytes);
        let mut address = [0u8; 20];
        address.copy_from_slice(&bytes[12..]);
        Self::from_bytes(address)
    }

    pub fn to_word(&self) -> U256 {
        U256::from_big_endian(self.as_bytes())
    }

    /// Parses user-supplied hex the way the request boundary expects:
    /// an optional `0x` prefix, the last 20 bytes of longer input and
    /// left zero-padding of shorter input. The empty string is the zero
    /// address.
    pub fn from_hex_lenient(input: &str) -> Result<Self> {
        let bytes = decode_hex(input)?;
        let mut address = [0u8; 20];
        if bytes.len() >= Self::LEN {
            address.copy_from_slice(&bytes[bytes.len() - Self::LEN..]);
        } else {
            address[Self::LEN - bytes.len()..].copy_from_slice(&bytes);
        }
        Ok(Self::from_bytes(address))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Lowercase hex with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("{:x}", self)
    }

    pub fn checksum(&self) -> String {
        let address_hex = hex::encode(self.0.as_bytes());
        let hash = Keccak256::digest(address_hex.as_bytes());

        let mut checksum = String::with_capacity(42);
        checksum.push_str("0x");
        for (i, ch) in address_hex.chars().enumerate() {
            if ch.is_alphabetic() {
                let hash_byte = hash[i / 2];
                let hash_nibble = if i % 2 == 0 { hash_byte >> 4 } else { hash_byte & 0xf };

                if hash_nibble >= 8 {
                    checksum.push(ch.to_ascii_uppercase());
                } else {
                    checksum.push(ch);
                }
            } else {
                checksum.push(ch);
            }
        }
        checksum
    }
}

impl FromStr for Address {
    type Err = TypesError;

    /// Strict parsing: exactly 40 hex digits, checksum enforced when the
    /// input is mixed-case.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);

        if digits.len() != 40 {
            return Err(TypesError::InvalidLength {
                expected: 40,
                actual: digits.len(),
            });
        }

        let bytes = hex::decode(digits).map_err(|_| TypesError::InvalidHex(s.to_string()))?;
        let addr = Address::from_slice(&bytes)?;

        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower && addr.checksum()[2..] != *digits {
            return Err(TypesError::InvalidChecksum);
        }

        Ok(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.checksum())
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl From<H160> for Address {
    fn from(hash: H160) -> Self {
        Address(hash)
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_address_checksum() {
        let addr = Address::from_str("0x5aAeb6053f3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        assert_eq!(addr.checksum(), "0x5aAeb6053f3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn test_address_from_str() {
        let addr1 = Address::from_str("0x5aAeb6053f3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        let addr2 = Address::from_str("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(addr1, addr2);

        assert_eq!(
            Address::from_str("0x5aAeb6053f3E94C9b9A09f33669435E7Ef1BeAeD"),
            Err(TypesError::InvalidChecksum)
        );
    }

    #[test]
    fn test_lenient_parsing() {
        let short = Address::from_hex_lenient("0x03e8").unwrap();
        assert_eq!(short, Address::from_low_u64_be(1000));

        let long = Address::from_hex_lenient(&format!("0xffff{}", "11".repeat(20))).unwrap();
        assert_eq!(long, Address::from_bytes([0x11; 20]));

        assert_eq!(Address::from_hex_lenient("").unwrap(), Address::ZERO);
        assert!(Address::from_hex_lenient("0xnothex").is_err());
    }

    #[test]
    fn test_word_round_trip() {
        let addr = Address::from_bytes([0xab; 20]);
        assert_eq!(Address::from_word(addr.to_word()), addr);
        assert_eq!(Address::from_word(U256::MAX), Address::from_bytes([0xff; 20]));
    }

    #[test]
    fn test_zero_address() {
        assert_eq!(Address::ZERO.to_hex(), "0x0000000000000000000000000000000000000000");
    }

    #[test]
    fn test_address_serde() {
        let addr = Address::from_low_u64_be(0x3e8);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0x00000000000000000000000000000000000003e8\"");
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addr);
    }

    proptest! {
        #[test]
        fn prop_hex_forms_parse_back(bytes in any::<[u8; 20]>()) {
            let addr = Address::from_bytes(bytes);
            let hex = addr.to_hex();
            prop_assert_eq!(Address::from_hex_lenient(&hex).unwrap(), addr);
            prop_assert_eq!(Address::from_hex_lenient(&hex[2..]).unwrap(), addr);
            prop_assert_eq!(Address::from_str(&hex).unwrap(), addr);
            prop_assert_eq!(Address::from_str(&addr.checksum()).unwrap(), addr);
        }

        #[test]
        fn prop_lenient_pads_short_input(value in any::<u64>()) {
            let hex = format!("{:x}", value);
            prop_assert_eq!(Address::from_hex_lenient(&hex).unwrap(), Address::from_low_u64_be(value));
        }
    }
}
