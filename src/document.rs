//! StegVault - Document and Audit Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::validate_params;

/// A deposited document. Only `access_count` changes after creation.
#[derive(Debug, Clone)]
pub struct SecretDocument {
    /// Unique ID
    pub id: String,
    /// Owning user
    pub owner_id: String,
    /// Original filename
    pub original_filename: String,
    /// MIME type
    pub mime_type: String,
    /// Plaintext size
    pub file_size: u64,
    /// Opaque reference to the stored cover image
    pub cover_ref: String,
    /// Raw AES-256 key as stored
    pub encryption_key: Zeroizing<Vec<u8>>,
    /// Raw CBC IV as stored
    pub encryption_iv: Vec<u8>,
    /// Upload timestamp
    pub upload_time: DateTime<Utc>,
    /// Hard expiry
    pub expiry_time: DateTime<Utc>,
    /// Successful extractions
    pub access_count: u64,
}

impl SecretDocument {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_time
    }

    /// Key/IV length invariant
    pub fn has_valid_params(&self) -> bool {
        validate_params(&self.encryption_key, &self.encryption_iv)
    }

    /// Listing view without key material
    pub fn summary_at(&self, now: DateTime<Utc>) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            original_filename: self.original_filename.clone(),
            mime_type: self.mime_type.clone(),
            file_size: self.file_size,
            upload_time: self.upload_time,
            expiry_time: self.expiry_time,
            access_count: self.access_count,
            is_expired: self.is_expired_at(now),
        }
    }
}

/// Document metadata safe to hand to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub original_filename: String,
    pub mime_type: String,
    pub file_size: u64,
    pub upload_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub access_count: u64,
    pub is_expired: bool,
}

/// Audited action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    Upload,
    Extract,
    View,
    FailedExtract,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Extract => "extract",
            Self::View => "view",
            Self::FailedExtract => "failed_extract",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(Self::Upload),
            "extract" => Some(Self::Extract),
            "view" => Some(Self::View),
            "failed_extract" => Some(Self::FailedExtract),
            _ => None,
        }
    }
}

/// Outcome of an audited action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Success,
    Failed,
}

impl AccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationAttempt {
    pub owner_id: String,
    pub document_id: String,
    pub action: AccessAction,
    pub status: AccessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl AuthorizationAttempt {
    pub fn success(
        owner_id: &str,
        document_id: &str,
        action: AccessAction,
        origin: Option<&str>,
    ) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            document_id: document_id.to_string(),
            action,
            status: AccessStatus::Success,
            reason: None,
            timestamp: Utc::now(),
            origin: origin.map(str::to_string),
        }
    }

    pub fn failed_extract(
        owner_id: &str,
        document_id: &str,
        reason: &str,
        origin: Option<&str>,
    ) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            document_id: document_id.to_string(),
            action: AccessAction::FailedExtract,
            status: AccessStatus::Failed,
            reason: Some(reason.to_string()),
            timestamp: Utc::now(),
            origin: origin.map(str::to_string),
        }
    }
}

/// A document submitted for deposit
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub expiry_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn doc(key_len: usize, iv_len: usize) -> SecretDocument {
        let now = Utc::now();
        SecretDocument {
            id: "doc".into(),
            owner_id: "owner".into(),
            original_filename: "a.txt".into(),
            mime_type: "text/plain".into(),
            file_size: 3,
            cover_ref: "c.png".into(),
            encryption_key: Zeroizing::new(vec![0u8; key_len]),
            encryption_iv: vec![0u8; iv_len],
            upload_time: now,
            expiry_time: now + Duration::hours(1),
            access_count: 0,
        }
    }

    #[test]
    fn test_expiry_is_strict() {
        let d = doc(32, 16);
        assert!(!d.is_expired_at(d.expiry_time));
        assert!(d.is_expired_at(d.expiry_time + Duration::milliseconds(1)));
    }

    #[test]
    fn test_param_invariant() {
        assert!(doc(32, 16).has_valid_params());
        assert!(!doc(16, 16).has_valid_params());
        assert!(!doc(32, 12).has_valid_params());
    }

    #[test]
    fn test_action_wire_names() {
        for action in [
            AccessAction::Upload,
            AccessAction::Extract,
            AccessAction::View,
            AccessAction::FailedExtract,
        ] {
            assert_eq!(AccessAction::parse(action.as_str()), Some(action));
        }
        let json = serde_json::to_string(&AccessAction::FailedExtract).unwrap();
        assert_eq!(json, "\"failed_extract\"");
    }

    #[test]
    fn test_summary_hides_keys() {
        let d = doc(32, 16);
        let json = serde_json::to_value(d.summary_at(Utc::now())).unwrap();
        assert!(json.get("encryptionKey").is_none());
        assert_eq!(json["isExpired"], false);
    }
}
