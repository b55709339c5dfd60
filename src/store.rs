//! StegVault - Storage Collaborators
//!
//! The authorization pipeline only talks to storage through these traits.
//! [`MemoryStore`] backs tests and embedders; [`crate::index::SqliteStore`]
//! is the on-disk implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use zeroize::Zeroizing;

use crate::document::{AuthorizationAttempt, SecretDocument};
use crate::error::{VaultError, VaultResult};

/// Document metadata and cover-image artifacts
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a new document together with its cover image
    async fn insert(&self, document: &SecretDocument, cover_png: &[u8]) -> VaultResult<()>;

    /// Fetch a document owned by `owner_id`. Expired documents are returned
    /// as well; expiry is decided by the caller.
    async fn get(&self, owner_id: &str, document_id: &str) -> VaultResult<SecretDocument>;

    /// All documents of an owner, newest first
    async fn list(&self, owner_id: &str) -> VaultResult<Vec<SecretDocument>>;

    /// Stored cover image bytes
    async fn cover(&self, document: &SecretDocument) -> VaultResult<Vec<u8>>;

    /// Atomically add one to `access_count`, returning the new value
    async fn increment_access_count(&self, document_id: &str) -> VaultResult<u64>;

    /// Remove metadata and the cover artifact
    async fn delete(&self, owner_id: &str, document_id: &str) -> VaultResult<()>;
}

/// Enrolled biometric references
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn enroll(&self, owner_id: &str, face_image: &[u8], pin: &str) -> VaultResult<()>;

    async fn enrolled_face(&self, owner_id: &str) -> VaultResult<Vec<u8>>;

    async fn enrolled_pin(&self, owner_id: &str) -> VaultResult<Zeroizing<String>>;
}

/// Append-only access log
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, attempt: &AuthorizationAttempt) -> VaultResult<()>;

    /// Most recent entries of an owner, newest first
    async fn recent(&self, owner_id: &str, limit: usize) -> VaultResult<Vec<AuthorizationAttempt>>;
}

struct Identity {
    face: Vec<u8>,
    pin: Zeroizing<String>,
}

/// In-process store implementing every collaborator trait
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, SecretDocument>>,
    covers: Mutex<HashMap<String, Vec<u8>>>,
    identities: Mutex<HashMap<String, Identity>>,
    attempts: Mutex<Vec<AuthorizationAttempt>>,
    fail_increments: AtomicBool,
    fail_audit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `increment_access_count` fail (exercises best-effort counting)
    pub fn set_fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }

    /// Make `append` fail (exercises fire-and-forget auditing)
    pub fn set_fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every recorded attempt, oldest first
    pub fn attempts(&self) -> Vec<AuthorizationAttempt> {
        self.attempts.lock().clone()
    }

    /// Overwrite a stored cover artifact
    pub fn replace_cover(&self, cover_ref: &str, data: Vec<u8>) {
        self.covers.lock().insert(cover_ref.to_string(), data);
    }

    pub fn has_cover(&self, cover_ref: &str) -> bool {
        self.covers.lock().contains_key(cover_ref)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, document: &SecretDocument, cover_png: &[u8]) -> VaultResult<()> {
        self.covers
            .lock()
            .insert(document.cover_ref.clone(), cover_png.to_vec());
        self.documents
            .lock()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get(&self, owner_id: &str, document_id: &str) -> VaultResult<SecretDocument> {
        self.documents
            .lock()
            .get(document_id)
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(document_id.to_string()))
    }

    async fn list(&self, owner_id: &str) -> VaultResult<Vec<SecretDocument>> {
        let mut docs: Vec<SecretDocument> = self
            .documents
            .lock()
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.upload_time.cmp(&a.upload_time));
        Ok(docs)
    }

    async fn cover(&self, document: &SecretDocument) -> VaultResult<Vec<u8>> {
        self.covers
            .lock()
            .get(&document.cover_ref)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("cover {}", document.cover_ref)))
    }

    async fn increment_access_count(&self, document_id: &str) -> VaultResult<u64> {
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(VaultError::Storage("access count update rejected".into()));
        }

        let mut docs = self.documents.lock();
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| VaultError::NotFound(document_id.to_string()))?;
        doc.access_count += 1;
        Ok(doc.access_count)
    }

    async fn delete(&self, owner_id: &str, document_id: &str) -> VaultResult<()> {
        let mut docs = self.documents.lock();
        match docs.get(document_id) {
            Some(d) if d.owner_id == owner_id => {}
            _ => return Err(VaultError::NotFound(document_id.to_string())),
        }

        if let Some(doc) = docs.remove(document_id) {
            self.covers.lock().remove(&doc.cover_ref);
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn enroll(&self, owner_id: &str, face_image: &[u8], pin: &str) -> VaultResult<()> {
        self.identities.lock().insert(
            owner_id.to_string(),
            Identity {
                face: face_image.to_vec(),
                pin: Zeroizing::new(pin.to_string()),
            },
        );
        Ok(())
    }

    async fn enrolled_face(&self, owner_id: &str) -> VaultResult<Vec<u8>> {
        self.identities
            .lock()
            .get(owner_id)
            .map(|i| i.face.clone())
            .ok_or_else(|| VaultError::NotFound(format!("user {}", owner_id)))
    }

    async fn enrolled_pin(&self, owner_id: &str) -> VaultResult<Zeroizing<String>> {
        self.identities
            .lock()
            .get(owner_id)
            .map(|i| i.pin.clone())
            .ok_or_else(|| VaultError::NotFound(format!("user {}", owner_id)))
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, attempt: &AuthorizationAttempt) -> VaultResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(VaultError::Storage("audit log unavailable".into()));
        }
        self.attempts.lock().push(attempt.clone());
        Ok(())
    }

    async fn recent(&self, owner_id: &str, limit: usize) -> VaultResult<Vec<AuthorizationAttempt>> {
        Ok(self
            .attempts
            .lock()
            .iter()
            .rev()
            .filter(|a| a.owner_id == owner_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
