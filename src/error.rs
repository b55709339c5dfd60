//! StegVault - Error Types

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // REQUEST ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    // ═══════════════════════════════════════════════════════════════
    // BIOMETRIC ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Face verification failed (similarity {score:.2})")]
    FaceMismatch { score: f64 },

    #[error("Face verification service error: {0}")]
    FaceServiceError(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("PIN verification failed")]
    PinMismatch,

    #[error("PIN verification service error: {0}")]
    PinServiceError(String),

    // ═══════════════════════════════════════════════════════════════
    // CODEC ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Cover image corrupted: {0}")]
    StegoCorrupt(String),

    #[error("Cover image too small: need {needed} bits, have {available}")]
    CoverTooSmall { needed: u64, available: u64 },

    #[error("Invalid cipher parameters: key {key_len} bytes, iv {iv_len} bytes")]
    InvalidParams { key_len: usize, iv_len: usize },

    #[error("Decryption failed: {0}")]
    CorruptedData(String),

    // ═══════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            VaultError::FaceMismatch { .. }
                | VaultError::PinMismatch
                | VaultError::CorruptedData(_)
                | VaultError::StegoCorrupt(_)
        )
    }

    /// Fixed reason string recorded in the access log
    pub fn audit_reason(&self) -> &'static str {
        match self {
            VaultError::InvalidInput(_) => "Invalid request",
            VaultError::NotFound(_) => "Document not found",
            VaultError::Expired { .. } => "Document expired",
            VaultError::FaceMismatch { .. } => "Face verification failed",
            VaultError::FaceServiceError(_) | VaultError::InvalidImage(_) => {
                "Face verification error"
            }
            VaultError::PinMismatch => "Fingerprint verification failed",
            VaultError::PinServiceError(_) => "Fingerprint verification error",
            VaultError::StegoCorrupt(_) | VaultError::CoverTooSmall { .. } => {
                "Steganography extraction failed"
            }
            VaultError::InvalidParams { .. } | VaultError::CorruptedData(_) => "Decryption failed",
            VaultError::Storage(_) | VaultError::Io(_) | VaultError::Serialization(_) => {
                "Unexpected error"
            }
        }
    }

    /// HTTP status a surrounding service should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            VaultError::InvalidInput(_) | VaultError::InvalidImage(_) => 400,
            VaultError::NotFound(_) => 404,
            VaultError::Expired { .. }
            | VaultError::FaceMismatch { .. }
            | VaultError::PinMismatch => 403,
            _ => 500,
        }
    }

    /// Client-facing message. Internal details stay in operational logs.
    pub fn public_message(&self) -> String {
        match self {
            VaultError::InvalidInput(msg) => msg.clone(),
            VaultError::NotFound(_) => "Document not found".into(),
            VaultError::Expired { .. } => "Document has expired and cannot be accessed".into(),
            VaultError::FaceMismatch { .. } => "Face verification failed".into(),
            VaultError::FaceServiceError(_) | VaultError::InvalidImage(_) => {
                "Face verification service unavailable".into()
            }
            VaultError::PinMismatch => "Fingerprint verification failed".into(),
            VaultError::PinServiceError(_) => "Fingerprint verification service unavailable".into(),
            VaultError::StegoCorrupt(_) | VaultError::CoverTooSmall { .. } => {
                "Failed to extract data from secure storage".into()
            }
            VaultError::InvalidParams { .. } | VaultError::CorruptedData(_) => {
                "Failed to decrypt document. Data may be corrupted.".into()
            }
            _ => "Failed to extract document".into(),
        }
    }

    /// Structured failure body: `{success:false, message, reason?, similarity?}`
    pub fn to_failure_response(&self) -> FailureResponse {
        FailureResponse {
            success: false,
            message: self.public_message(),
            reason: Some(self.audit_reason().to_string()),
            similarity: match self {
                VaultError::FaceMismatch { score } => Some(*score),
                _ => None,
            },
        }
    }
}

/// Failure body handed back across the service boundary
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for VaultError {
    fn from(e: image::ImageError) -> Self {
        VaultError::InvalidImage(e.to_string())
    }
}

impl From<base64::DecodeError> for VaultError {
    fn from(e: base64::DecodeError) -> Self {
        VaultError::InvalidImage(format!("invalid base64: {}", e))
    }
}
