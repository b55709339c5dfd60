//! # StegVault
//!
//! Time-limited secure document vault. Documents are encrypted, hidden in
//! synthetic cover images and released only behind a face + PIN gate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        STEGVAULT                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  CIPHER     │  │  STEGO      │  │  BIOMETRIC GATE │  │
//! │  │  AES-256-CBC│→ │  LSB cover  │  │  face + PIN     │  │
//! │  │  + HMAC     │  │  PNG        │  │                 │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬────────┘  │
//! │         │                │                   │           │
//! │  ┌──────┴────────────────┴───────────────────┴────────┐ │
//! │  │               EXTRACTION AUTHORIZER                 │ │
//! │  │  expiry → face → PIN → stego decode → decrypt       │ │
//! │  └─────────────────────────┬───────────────────────────┘ │
//! │                            │                             │
//! │  ┌─────────────┐  ┌────────┴────┐  ┌─────────────────┐  │
//! │  │  COVER FILES│  │  INDEX DB   │  │  ACCESS LOG     │  │
//! │  │  (atomic)   │  │  (SQLite)   │  │  (one per req)  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Fresh 256-bit key and IV per document, never reused
//! - Ciphertext authenticated (encrypt-then-MAC), tampering is detected
//! - Cover images are pure noise around the hidden bits
//! - Hard expiry checked before any biometric work
//! - Every extraction attempt audited exactly once
//!
//! The face check is a coarse image-similarity heuristic and the PIN is
//! compared in plaintext; neither is a substitute for real authentication.

pub mod authorizer;
pub mod biometrics;
pub mod config;
pub mod covers;
pub mod crypto;
pub mod document;
pub mod error;
pub mod index;
pub mod stego;
pub mod store;
pub mod vault;

pub use authorizer::{Delivery, ExtractionAuthorizer, ExtractionRequest};
pub use biometrics::{match_pin, score_faces, Similarity};
pub use config::VaultConfig;
pub use document::{
    AccessAction, AccessStatus, AuthorizationAttempt, DocumentSummary, SecretDocument,
    UploadRequest,
};
pub use error::{FailureResponse, VaultError, VaultResult};
pub use index::SqliteStore;
pub use stego::CoverImage;
pub use store::{AuditSink, DocumentStore, IdentityStore, MemoryStore};
pub use vault::DocumentVault;

/// StegVault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
