//! StegVault - Document Vault
//!
//! Upload, listing, deletion and enrollment around the extraction pipeline.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::authorizer::{Delivery, ExtractionAuthorizer, ExtractionRequest};
use crate::biometrics::{decode_image_payload, is_valid_pin};
use crate::config::VaultConfig;
use crate::covers::CoverFiles;
use crate::crypto::encrypt;
use crate::document::{
    AccessAction, AuthorizationAttempt, DocumentSummary, SecretDocument, UploadRequest,
};
use crate::error::{VaultError, VaultResult};
use crate::index::SqliteStore;
use crate::stego;
use crate::store::{AuditSink, DocumentStore, IdentityStore};

/// Fallback when the client sends no usable MIME type
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Secure document vault
pub struct DocumentVault {
    config: VaultConfig,
    documents: Arc<dyn DocumentStore>,
    identities: Arc<dyn IdentityStore>,
    audit: Arc<dyn AuditSink>,
    authorizer: ExtractionAuthorizer,
}

impl DocumentVault {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    pub fn new(
        documents: Arc<dyn DocumentStore>,
        identities: Arc<dyn IdentityStore>,
        audit: Arc<dyn AuditSink>,
        config: VaultConfig,
    ) -> Self {
        let authorizer = ExtractionAuthorizer::new(
            Arc::clone(&documents),
            Arc::clone(&identities),
            Arc::clone(&audit),
            config.clone(),
        );

        Self {
            config,
            documents,
            identities,
            audit,
            authorizer,
        }
    }

    /// Vault over a single store implementing every collaborator
    pub fn with_store<S>(store: Arc<S>, config: VaultConfig) -> Self
    where
        S: DocumentStore + IdentityStore + AuditSink + 'static,
    {
        Self::new(store.clone(), store.clone(), store, config)
    }

    /// Open the on-disk vault under `config.data_dir`
    pub fn open(config: VaultConfig) -> VaultResult<Self> {
        let store = Arc::new(SqliteStore::open(&config.data_dir, config.store_timeout())?);
        log::info!("Vault opened at {}", config.data_dir.display());
        Ok(Self::with_store(store, config))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ENROLLMENT
    // ═══════════════════════════════════════════════════════════════════════

    /// Register the reference face (base64 or data URL) and PIN of an owner
    pub async fn enroll(&self, owner_id: &str, face_image: &str, pin: &str) -> VaultResult<()> {
        require_owner(owner_id)?;

        if !is_valid_pin(pin) {
            return Err(VaultError::InvalidInput("PIN must be exactly 4 digits".into()));
        }

        let face = decode_image_payload(face_image)?;
        image::load_from_memory(&face)?;

        self.identities.enroll(owner_id, &face, pin).await?;
        log::info!("Enrolled biometrics for {}", owner_id);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DOCUMENT OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypt a document, hide it in a fresh cover image and store it
    pub async fn upload(
        &self,
        owner_id: &str,
        request: UploadRequest,
        origin: Option<&str>,
    ) -> VaultResult<DocumentSummary> {
        require_owner(owner_id)?;

        if request.data.is_empty() {
            return Err(VaultError::InvalidInput("No file uploaded".into()));
        }
        if request.data.len() as u64 > self.config.max_file_size {
            return Err(VaultError::InvalidInput(format!(
                "File exceeds the {} byte limit",
                self.config.max_file_size
            )));
        }
        if request.filename.trim().is_empty() {
            return Err(VaultError::InvalidInput("File name is required".into()));
        }

        let now = Utc::now();
        if request.expiry_time <= now {
            return Err(VaultError::InvalidInput("Expiry time must be in the future".into()));
        }

        let file_size = request.data.len() as u64;
        let mime_type = if request.mime_type.trim().is_empty() {
            detect_mime(&request.data).to_string()
        } else {
            request.mime_type.trim().to_string()
        };

        let plaintext = Zeroizing::new(request.data);
        let sealed = tokio::task::spawn_blocking(move || -> VaultResult<_> {
            let encrypted = encrypt(&plaintext)?;
            let cover = stego::encode(&encrypted.ciphertext)?;
            Ok((encrypted.key, cover.to_png()?))
        })
        .await
        .map_err(|e| VaultError::Storage(format!("encoding task failed: {}", e)))?;
        let (key, cover_png) = sealed?;

        let document = SecretDocument {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            original_filename: request.filename,
            mime_type,
            file_size,
            cover_ref: CoverFiles::new_name(),
            encryption_key: Zeroizing::new(key.key().to_vec()),
            encryption_iv: key.iv().to_vec(),
            upload_time: now,
            expiry_time: request.expiry_time,
            access_count: 0,
        };

        match tokio::time::timeout(
            self.config.store_timeout(),
            self.documents.insert(&document, &cover_png),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(VaultError::Storage("document insert timed out".into())),
        }

        log::info!(
            "Stored {} ({} bytes) for {} in a {} byte cover",
            document.id,
            file_size,
            owner_id,
            cover_png.len()
        );

        self.authorizer
            .record(&AuthorizationAttempt::success(
                owner_id,
                &document.id,
                AccessAction::Upload,
                origin,
            ))
            .await;

        Ok(document.summary_at(now))
    }

    /// Documents of an owner, newest first. Expired ones stay listed.
    pub async fn list(&self, owner_id: &str) -> VaultResult<Vec<DocumentSummary>> {
        let now = Utc::now();
        let docs = self.documents.list(owner_id).await?;
        Ok(docs.iter().map(|d| d.summary_at(now)).collect())
    }

    /// Release a document through the authorization pipeline
    pub async fn extract(&self, request: &ExtractionRequest) -> VaultResult<Delivery> {
        self.authorizer.extract(request).await
    }

    /// Remove a document and its cover image
    pub async fn delete(&self, owner_id: &str, document_id: &str) -> VaultResult<()> {
        self.documents.delete(owner_id, document_id).await?;
        log::info!("Deleted {} for {}", document_id, owner_id);
        Ok(())
    }

    /// Most recent access-log entries of an owner
    pub async fn logs(&self, owner_id: &str) -> VaultResult<Vec<AuthorizationAttempt>> {
        self.audit.recent(owner_id, self.config.log_limit).await
    }
}

fn require_owner(owner_id: &str) -> VaultResult<()> {
    if owner_id.trim().is_empty() {
        return Err(VaultError::InvalidInput("owner id is required".into()));
    }
    Ok(())
}

/// Detect MIME type from file content
fn detect_mime(data: &[u8]) -> &'static str {
    match data {
        [0x25, 0x50, 0x44, 0x46, ..] => "application/pdf",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => "image/png",
        [0x47, 0x49, 0x46, 0x38, ..] => "image/gif",
        [0x50, 0x4B, 0x03, 0x04, ..] => "application/zip",
        _ => DEFAULT_MIME,
    }
}
