use crate::{decode_hex, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Owned byte string: code, calldata and return data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    pub fn new() -> Self {
        Bytes(Vec::new())
    }

    pub fn from_vec(vec: Vec<u8>) -> Self {
        Bytes(vec)
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Bytes(slice.to_vec())
    }

    /// See [`decode_hex`] for the accepted forms.
    pub fn from_hex(input: &str) -> Result<Self> {
        decode_hex(input).map(Bytes)
    }

    /// Lowercase hex without a prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn extend_from_slice(&mut self, slice: &[u8]) {
        self.0.extend_from_slice(slice);
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(vec: Vec<u8>) -> Self {
        Bytes::from_vec(vec)
    }
}

impl From<&[u8]> for Bytes {
    fn from(slice: &[u8]) -> Self {
        Bytes::from_slice(slice)
    }
}

impl From<Bytes> for Vec<u8> {
    fn from(bytes: Bytes) -> Self {
        bytes.0
    }
}

impl fmt::LowerHex for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_hex() {
        let bytes = Bytes::from_vec(vec![0x12, 0x34, 0x56]);
        assert_eq!(format!("{:x}", bytes), "0x123456");
        assert_eq!(bytes.to_hex(), "123456");
    }

    #[test]
    fn test_bytes_from_hex() {
        let bytes = Bytes::from_hex("0x60016002").unwrap();
        assert_eq!(bytes.as_slice(), &[0x60, 0x01, 0x60, 0x02]);
        assert!(Bytes::from_hex("0x6g").is_err());
    }

    #[test]
    fn test_bytes_concat() {
        let mut code = Bytes::from_slice(&[0x60, 0x00]);
        code.extend_from_slice(&[0xff]);
        assert_eq!(code.len(), 3);
        assert_eq!(Vec::from(code), vec![0x60, 0x00, 0xff]);
    }

    #[test]
    fn test_bytes_serde() {
        let bytes = Bytes::from_slice(&[0x60, 0x2a]);
        let json = serde_json::to_string(&bytes).unwrap();
        assert_eq!(json, "[96,42]");
        assert_eq!(serde_json::from_str::<Bytes>(&json).unwrap(), bytes);
    }
}
