use crate::{keccak256, CryptoError, Result};
use sandbox_types::{Address, H256};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, Secp256k1,
};

/// Recovers the signer address of a 32-byte message hash.
///
/// `recovery_id` is the normalized parity bit (0 or 1); `r` and `s` are the
/// big-endian signature scalars.
pub fn ecrecover(hash: &H256, recovery_id: u8, r: &[u8; 32], s: &[u8; 32]) -> Result<Address> {
    if recovery_id > 1 {
        return Err(CryptoError::InvalidRecoveryId(recovery_id));
    }

    let secp = Secp256k1::verification_only();
    let message = Message::from_slice(hash.as_bytes())?;
    let recovery_id = RecoveryId::from_i32(i32::from(recovery_id))?;

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(r);
    compact[32..].copy_from_slice(s);

    let signature = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|_| CryptoError::InvalidSignature)?;
    let public_key = secp.recover_ecdsa(&message, &signature)?;

    Ok(public_key_to_address(&public_key))
}

/// Last 20 bytes of the keccak-256 of the uncompressed key without its tag.
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(address)
}
