//! StegVault - Document Cipher
//!
//! AES-256-CBC with PKCS#7 padding, followed by an HMAC-SHA256 tag over
//! `iv || ciphertext`:
//!
//! ```text
//! [CIPHERTEXT n*16 B][AES-256-CBC, PKCS#7]
//! [TAG 32 B][HMAC-SHA256(K_mac, IV || CIPHERTEXT)]
//! ```
//!
//! `K_mac` is derived from the document key, so the stored record only ever
//! carries the 32-byte key and the 16-byte IV. A wrong key, a wrong IV or a
//! single altered byte is rejected by the tag before the cipher runs.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::keys::{validate_params, DocumentKey};
use super::subkeys::derive_mac_key;
use crate::error::{VaultError, VaultResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block size
pub const BLOCK_LEN: usize = 16;

/// HMAC-SHA256 tag size
pub const TAG_LEN: usize = 32;

/// Output of [`encrypt`]: sealed bytes plus the fresh key material
pub struct EncryptedDocument {
    /// Ciphertext with authentication tag appended
    pub ciphertext: Vec<u8>,
    /// Key/IV generated for this document only
    pub key: DocumentKey,
}

/// Encrypt a document under a freshly generated key and IV
pub fn encrypt(plaintext: &[u8]) -> VaultResult<EncryptedDocument> {
    if plaintext.is_empty() {
        return Err(VaultError::InvalidInput("data buffer is empty".into()));
    }

    let key = DocumentKey::generate();

    let mut ciphertext = Aes256CbcEnc::new_from_slices(key.key(), key.iv())
        .map_err(|_| VaultError::InvalidParams {
            key_len: key.key().len(),
            iv_len: key.iv().len(),
        })?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let tag = compute_tag(key.key(), key.iv(), &ciphertext)?;
    ciphertext.extend_from_slice(&tag);

    Ok(EncryptedDocument { ciphertext, key })
}

/// Decrypt sealed bytes with the stored key and IV
pub fn decrypt(sealed: &[u8], key: &[u8], iv: &[u8]) -> VaultResult<Vec<u8>> {
    if !validate_params(key, iv) {
        return Err(VaultError::InvalidParams {
            key_len: key.len(),
            iv_len: iv.len(),
        });
    }

    if sealed.len() < BLOCK_LEN + TAG_LEN || (sealed.len() - TAG_LEN) % BLOCK_LEN != 0 {
        return Err(VaultError::CorruptedData(format!(
            "invalid ciphertext length {}",
            sealed.len()
        )));
    }

    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    verify_tag(key, iv, ciphertext, tag)?;

    Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| VaultError::InvalidParams {
            key_len: key.len(),
            iv_len: iv.len(),
        })?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::CorruptedData("invalid padding".into()))
}

fn tag_mac(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> VaultResult<HmacSha256> {
    let mac_key = derive_mac_key(key)?;
    let mut mac = HmacSha256::new_from_slice(&mac_key[..])
        .map_err(|e| VaultError::CorruptedData(e.to_string()))?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac)
}

fn compute_tag(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> VaultResult<[u8; TAG_LEN]> {
    Ok(tag_mac(key, iv, ciphertext)?.finalize().into_bytes().into())
}

fn verify_tag(key: &[u8], iv: &[u8], ciphertext: &[u8], tag: &[u8]) -> VaultResult<()> {
    // Constant-time comparison
    tag_mac(key, iv, ciphertext)?
        .verify_slice(tag)
        .map_err(|_| VaultError::CorruptedData("invalid key, IV, or corrupted data".into()))
}
