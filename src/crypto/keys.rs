//! StegVault - Document Key Material
//!
//! Per-document key/IV generation, length validation and hex storage form.

use rand::RngCore;
use zeroize::Zeroizing;

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// IV length for CBC mode (one AES block)
pub const IV_LEN: usize = 16;

/// Fresh key material for one document. The key is zeroized on drop.
pub struct DocumentKey {
    key: Zeroizing<[u8; KEY_LEN]>,
    iv: [u8; IV_LEN],
}

impl DocumentKey {
    /// Generate a random key and IV
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut key[..]);
        rng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// Key in its storage form
    pub fn key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.key[..]))
    }

    /// IV in its storage form
    pub fn iv_hex(&self) -> String {
        hex::encode(self.iv)
    }
}

/// Check the key/IV length invariant without touching the cipher.
pub fn validate_params(key: &[u8], iv: &[u8]) -> bool {
    key.len() == KEY_LEN && iv.len() == IV_LEN
}

/// Decode a stored hex parameter. Malformed hex yields an empty buffer,
/// which `validate_params` then rejects.
pub fn decode_param_hex(value: &str) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(hex::decode(value.trim()).unwrap_or_default())
}
