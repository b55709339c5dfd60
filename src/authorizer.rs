//! StegVault - Extraction Authorizer
//!
//! Releases a document only after every gate passes, strictly in order:
//!
//! ```text
//! Start → ExpiryCheck → FaceCheck → PinCheck → StegoDecode → CipherDecrypt → Success
//! ```
//!
//! The first failing stage ends the request. Each request, successful or
//! not, produces exactly one access-log entry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::biometrics::{match_pin, score_faces};
use crate::config::VaultConfig;
use crate::crypto::decrypt;
use crate::document::{AccessAction, AuthorizationAttempt, SecretDocument};
use crate::error::{VaultError, VaultResult};
use crate::stego;
use crate::store::{AuditSink, DocumentStore, IdentityStore};

/// An extraction request as received from a client
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub owner_id: String,
    pub document_id: String,
    /// Probe face as base64 or a `data:image/...;base64,` URL
    pub face_image: String,
    pub pin: String,
    /// Client address, recorded in the access log
    pub origin: Option<String>,
}

impl ExtractionRequest {
    fn validate(&self, min_face_len: usize) -> VaultResult<()> {
        if self.owner_id.trim().is_empty() || self.document_id.trim().is_empty() {
            return Err(VaultError::InvalidInput("owner and document id are required".into()));
        }
        if self.face_image.trim().is_empty() || self.pin.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "Face image and fingerprint PIN are required".into(),
            ));
        }
        if self.face_image.trim().len() < min_face_len {
            return Err(VaultError::InvalidInput("Invalid face image data".into()));
        }
        Ok(())
    }
}

/// A released document
#[derive(Debug, Clone)]
pub struct Delivery {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
    /// New access count, `None` if the increment could not be persisted
    pub access_count: Option<u64>,
}

impl Delivery {
    /// `Content-Disposition` header value for the download
    pub fn content_disposition(&self) -> String {
        format!(
            "attachment; filename=\"{}\"",
            self.filename.replace('\\', "\\\\").replace('"', "\\\"")
        )
    }
}

/// Ordered authorization pipeline over the storage collaborators
pub struct ExtractionAuthorizer {
    documents: Arc<dyn DocumentStore>,
    identities: Arc<dyn IdentityStore>,
    audit: Arc<dyn AuditSink>,
    config: VaultConfig,
}

impl ExtractionAuthorizer {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        identities: Arc<dyn IdentityStore>,
        audit: Arc<dyn AuditSink>,
        config: VaultConfig,
    ) -> Self {
        Self {
            documents,
            identities,
            audit,
            config,
        }
    }

    pub async fn extract(&self, request: &ExtractionRequest) -> VaultResult<Delivery> {
        self.extract_at(request, Utc::now()).await
    }

    /// Run the pipeline with an explicit clock
    pub async fn extract_at(
        &self,
        request: &ExtractionRequest,
        now: DateTime<Utc>,
    ) -> VaultResult<Delivery> {
        let outcome = self.authorize(request, now).await;

        let origin = request.origin.as_deref();
        let mut attempt = match &outcome {
            Ok(_) => {
                log::info!(
                    "Document {} extracted by {}",
                    request.document_id,
                    request.owner_id
                );
                AuthorizationAttempt::success(
                    &request.owner_id,
                    &request.document_id,
                    AccessAction::Extract,
                    origin,
                )
            }
            Err(e) => {
                if e.is_security_critical() {
                    log::warn!(
                        "Extraction of {} by {} denied: {}",
                        request.document_id,
                        request.owner_id,
                        e
                    );
                } else {
                    log::error!(
                        "Extraction of {} by {} failed: {}",
                        request.document_id,
                        request.owner_id,
                        e
                    );
                }
                AuthorizationAttempt::failed_extract(
                    &request.owner_id,
                    &request.document_id,
                    e.audit_reason(),
                    origin,
                )
            }
        };
        attempt.timestamp = now;

        self.record(&attempt).await;
        outcome
    }

    /// Append to the access log. Never fails the request.
    pub(crate) async fn record(&self, attempt: &AuthorizationAttempt) {
        match timeout(self.config.store_timeout(), self.audit.append(attempt)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to write access log: {}", e),
            Err(_) => log::error!("Access log write timed out"),
        }
    }

    async fn authorize(
        &self,
        request: &ExtractionRequest,
        now: DateTime<Utc>,
    ) -> VaultResult<Delivery> {
        request.validate(self.config.min_face_payload_len)?;

        let document = bounded(
            self.config.store_timeout(),
            self.documents.get(&request.owner_id, &request.document_id),
            || VaultError::Storage("document lookup timed out".into()),
        )
        .await?;

        // ExpiryCheck
        if document.is_expired_at(now) {
            return Err(VaultError::Expired {
                expired_at: document.expiry_time,
            });
        }

        self.check_face(&document, &request.face_image).await?;
        self.check_pin(&document, &request.pin).await?;

        let sealed = self.decode_cover(&document).await?;

        // CipherDecrypt
        if !document.has_valid_params() {
            return Err(VaultError::InvalidParams {
                key_len: document.encryption_key.len(),
                iv_len: document.encryption_iv.len(),
            });
        }
        let bytes = decrypt(&sealed, &document.encryption_key, &document.encryption_iv)?;

        let access_count = self.bump_access_count(&document.id).await;

        Ok(Delivery {
            bytes,
            mime_type: document.mime_type,
            filename: document.original_filename,
            access_count,
        })
    }

    async fn check_face(&self, document: &SecretDocument, candidate: &str) -> VaultResult<()> {
        let reference = bounded(
            self.config.store_timeout(),
            self.identities.enrolled_face(&document.owner_id),
            || VaultError::FaceServiceError("identity lookup timed out".into()),
        )
        .await
        .map_err(as_face_service_error)?;

        let candidate = candidate.as_bytes().to_vec();
        let scoring = tokio::task::spawn_blocking(move || score_faces(&reference, &candidate));

        let similarity = match timeout(self.config.decode_timeout(), scoring).await {
            Ok(Ok(similarity)) => similarity,
            Ok(Err(e)) => return Err(VaultError::FaceServiceError(e.to_string())),
            Err(_) => {
                return Err(VaultError::FaceServiceError("face scoring timed out".into()))
            }
        };

        if let Some(reason) = similarity.error {
            return Err(VaultError::FaceServiceError(reason));
        }
        if !similarity.matched {
            return Err(VaultError::FaceMismatch {
                score: similarity.score,
            });
        }

        log::debug!("Face matched for {} ({:.2})", document.owner_id, similarity.score);
        Ok(())
    }

    async fn check_pin(&self, document: &SecretDocument, entered: &str) -> VaultResult<()> {
        let stored = bounded(
            self.config.store_timeout(),
            self.identities.enrolled_pin(&document.owner_id),
            || VaultError::PinServiceError("identity lookup timed out".into()),
        )
        .await
        .map_err(|e| match e {
            VaultError::PinServiceError(_) => e,
            other => VaultError::PinServiceError(other.to_string()),
        })?;

        if !match_pin(&stored, entered) {
            return Err(VaultError::PinMismatch);
        }
        Ok(())
    }

    async fn decode_cover(&self, document: &SecretDocument) -> VaultResult<Vec<u8>> {
        let png = bounded(
            self.config.store_timeout(),
            self.documents.cover(document),
            || VaultError::StegoCorrupt("cover fetch timed out".into()),
        )
        .await
        .map_err(|e| match e {
            VaultError::StegoCorrupt(_) => e,
            other => VaultError::StegoCorrupt(other.to_string()),
        })?;

        let decoding = tokio::task::spawn_blocking(move || stego::decode_png(&png));

        match timeout(self.config.decode_timeout(), decoding).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(VaultError::StegoCorrupt(e.to_string())),
            Err(_) => Err(VaultError::StegoCorrupt("cover decoding timed out".into())),
        }
    }

    /// Best-effort: the plaintext is released even if this fails
    async fn bump_access_count(&self, document_id: &str) -> Option<u64> {
        let update = bounded(
            self.config.store_timeout(),
            self.documents.increment_access_count(document_id),
            || VaultError::Storage("access count update timed out".into()),
        )
        .await;

        match update {
            Ok(count) => Some(count),
            Err(e) => {
                log::warn!("Failed to update access count for {}: {}", document_id, e);
                None
            }
        }
    }
}

async fn bounded<T, F>(
    limit: Duration,
    call: F,
    on_timeout: impl FnOnce() -> VaultError,
) -> VaultResult<T>
where
    F: Future<Output = VaultResult<T>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

fn as_face_service_error(e: VaultError) -> VaultError {
    match e {
        VaultError::FaceServiceError(_) => e,
        other => VaultError::FaceServiceError(other.to_string()),
    }
}
