//! StegVault - HKDF Subkeys
//!
//! Subkeys derived from a document key, so one stored key serves both
//! encryption and ciphertext authentication.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::KEY_LEN;
use crate::error::{VaultError, VaultResult};

/// Context for the ciphertext authentication subkey
pub const MAC_CONTEXT: &[u8] = b"STEGVAULT:MAC:v1";

/// Derive a 256-bit subkey from a document key with context
pub fn derive_subkey(key: &[u8], info: &[u8]) -> VaultResult<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, key);
    let mut okm = Zeroizing::new([0u8; KEY_LEN]);

    hk.expand(info, &mut okm[..])
        .map_err(|e| VaultError::CorruptedData(format!("subkey derivation: {}", e)))?;

    Ok(okm)
}

/// Subkey used to authenticate `iv || ciphertext`
pub fn derive_mac_key(key: &[u8]) -> VaultResult<Zeroizing<[u8; KEY_LEN]>> {
    derive_subkey(key, MAC_CONTEXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_key_is_deterministic_and_distinct() {
        let key = [7u8; KEY_LEN];
        let a = derive_mac_key(&key).unwrap();
        let b = derive_mac_key(&key).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, key);

        let other = derive_mac_key(&[8u8; KEY_LEN]).unwrap();
        assert_ne!(*a, *other);
    }
}
