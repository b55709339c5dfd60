//! StegVault - Cryptographic Core
//!
//! AES-256-CBC document encryption with a fresh key/IV per document.

pub mod keys;
pub mod cipher;
pub mod subkeys;

pub use keys::*;
pub use cipher::*;
pub use subkeys::*;
