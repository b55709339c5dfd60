//! StegVault - SQLite Store
//!
//! Document metadata, enrolled identities and the access log in one SQLite
//! database, with cover images kept as files beside it. All database and
//! file work runs on the blocking pool, so callers can bound it with
//! `tokio::time::timeout`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use zeroize::Zeroizing;

use crate::covers::CoverFiles;
use crate::crypto::decode_param_hex;
use crate::document::{AccessAction, AccessStatus, AuthorizationAttempt, SecretDocument};
use crate::error::{VaultError, VaultResult};
use crate::store::{AuditSink, DocumentStore, IdentityStore};

/// Database directory, relative to the vault root
pub const DB_DIR: &str = "db";

/// Database file name inside `DB_DIR`
pub const DB_FILE: &str = "stegvault.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    cover_file TEXT NOT NULL,
    encryption_key TEXT NOT NULL,
    encryption_iv TEXT NOT NULL,
    upload_time TEXT NOT NULL,
    expiry_time TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS identities (
    owner_id TEXT PRIMARY KEY,
    face_image BLOB NOT NULL,
    pin TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS access_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    action TEXT NOT NULL,
    status TEXT NOT NULL,
    reason TEXT,
    timestamp TEXT NOT NULL,
    origin TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id, upload_time);
CREATE INDEX IF NOT EXISTS idx_logs_owner ON access_logs(owner_id);
"#;

const DOCUMENT_COLUMNS: &str = "id, owner_id, original_filename, mime_type, file_size, cover_file, \
     encryption_key, encryption_iv, upload_time, expiry_time, access_count";

/// SQLite-backed implementation of every storage collaborator
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    covers: Arc<CoverFiles>,
}

impl SqliteStore {
    /// Open (or create) the store under a vault root. A locked database is
    /// retried for at most `busy_timeout` before the call fails.
    pub fn open(root: &Path, busy_timeout: Duration) -> VaultResult<Self> {
        std::fs::create_dir_all(root.join(DB_DIR))?;
        let conn = Connection::open(root.join(DB_DIR).join(DB_FILE))?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            covers: Arc::new(CoverFiles::new(root)),
        })
    }

    pub fn covers(&self) -> &CoverFiles {
        &self.covers
    }

    /// Run store work on the blocking pool
    async fn run<T, F>(&self, task: F) -> VaultResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &CoverFiles) -> VaultResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let covers = Arc::clone(&self.covers);

        tokio::task::spawn_blocking(move || task(&*conn.lock(), covers.as_ref()))
            .await
            .map_err(|e| VaultError::Storage(format!("store task failed: {}", e)))?
    }
}

fn select_document(
    conn: &Connection,
    owner_id: &str,
    document_id: &str,
) -> VaultResult<SecretDocument> {
    conn.query_row(
        &format!(
            "SELECT {} FROM documents WHERE id = ?1 AND owner_id = ?2",
            DOCUMENT_COLUMNS
        ),
        params![document_id, owner_id],
        row_to_document,
    )
    .optional()?
    .ok_or_else(|| VaultError::NotFound(document_id.to_string()))
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn invalid_column(idx: usize, message: String) -> rusqlite::Error {
    let cause = Box::new(VaultError::Storage(message));
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, cause)
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<SecretDocument> {
    let key_hex: Zeroizing<String> = Zeroizing::new(row.get(6)?);
    let iv_hex: String = row.get(7)?;
    let file_size: i64 = row.get(4)?;
    let access_count: i64 = row.get(10)?;

    Ok(SecretDocument {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        original_filename: row.get(2)?,
        mime_type: row.get(3)?,
        file_size: file_size.max(0) as u64,
        cover_ref: row.get(5)?,
        // Malformed hex decodes to an empty buffer and fails param validation
        encryption_key: decode_param_hex(&key_hex),
        encryption_iv: decode_param_hex(&iv_hex).to_vec(),
        upload_time: parse_timestamp(8, row.get(8)?)?,
        expiry_time: parse_timestamp(9, row.get(9)?)?,
        access_count: access_count.max(0) as u64,
    })
}

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<AuthorizationAttempt> {
    let action: String = row.get(2)?;
    let status: String = row.get(3)?;

    Ok(AuthorizationAttempt {
        owner_id: row.get(0)?,
        document_id: row.get(1)?,
        action: AccessAction::parse(&action)
            .ok_or_else(|| invalid_column(2, format!("unknown action '{}'", action)))?,
        status: AccessStatus::parse(&status)
            .ok_or_else(|| invalid_column(3, format!("unknown status '{}'", status)))?,
        reason: row.get(4)?,
        timestamp: parse_timestamp(5, row.get(5)?)?,
        origin: row.get(6)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, document: &SecretDocument, cover_png: &[u8]) -> VaultResult<()> {
        let document = document.clone();
        let cover_png = cover_png.to_vec();

        self.run(move |conn, covers| {
            covers.write(&document.cover_ref, &cover_png)?;

            let key_hex = Zeroizing::new(hex::encode(document.encryption_key.as_slice()));
            let result = conn.execute(
                &format!(
                    "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    DOCUMENT_COLUMNS
                ),
                params![
                    document.id,
                    document.owner_id,
                    document.original_filename,
                    document.mime_type,
                    document.file_size as i64,
                    document.cover_ref,
                    key_hex.as_str(),
                    hex::encode(&document.encryption_iv),
                    timestamp(&document.upload_time),
                    timestamp(&document.expiry_time),
                    document.access_count as i64,
                ],
            );

            if let Err(e) = result {
                // No metadata row: the cover must not linger
                if let Err(cleanup) = covers.remove(&document.cover_ref) {
                    log::error!(
                        "Failed to cleanup cover image {}: {}",
                        document.cover_ref,
                        cleanup
                    );
                }
                return Err(e.into());
            }

            Ok(())
        })
        .await
    }

    async fn get(&self, owner_id: &str, document_id: &str) -> VaultResult<SecretDocument> {
        let owner_id = owner_id.to_string();
        let document_id = document_id.to_string();

        self.run(move |conn, _| select_document(conn, &owner_id, &document_id))
            .await
    }

    async fn list(&self, owner_id: &str) -> VaultResult<Vec<SecretDocument>> {
        let owner_id = owner_id.to_string();

        self.run(move |conn, _| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM documents WHERE owner_id = ?1 ORDER BY upload_time DESC",
                DOCUMENT_COLUMNS
            ))?;

            let docs = stmt
                .query_map(params![owner_id], row_to_document)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(docs)
        })
        .await
    }

    async fn cover(&self, document: &SecretDocument) -> VaultResult<Vec<u8>> {
        let cover_ref = document.cover_ref.clone();

        self.run(move |_, covers| covers.read(&cover_ref)).await
    }

    async fn increment_access_count(&self, document_id: &str) -> VaultResult<u64> {
        let document_id = document_id.to_string();

        self.run(move |conn, _| {
            // Single statement: concurrent extractions cannot lose increments
            let count: i64 = conn
                .query_row(
                    "UPDATE documents SET access_count = access_count + 1 WHERE id = ?1 RETURNING access_count",
                    params![document_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| VaultError::NotFound(document_id.clone()))?;

            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn delete(&self, owner_id: &str, document_id: &str) -> VaultResult<()> {
        let owner_id = owner_id.to_string();
        let document_id = document_id.to_string();

        self.run(move |conn, covers| {
            let doc = select_document(conn, &owner_id, &document_id)?;

            // Row first: a failed delete must leave the document intact
            conn.execute(
                "DELETE FROM documents WHERE id = ?1 AND owner_id = ?2",
                params![document_id, owner_id],
            )?;

            if let Err(e) = covers.remove(&doc.cover_ref) {
                log::error!("Failed to remove cover image {}: {}", doc.cover_ref, e);
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn enroll(&self, owner_id: &str, face_image: &[u8], pin: &str) -> VaultResult<()> {
        let owner_id = owner_id.to_string();
        let face_image = face_image.to_vec();
        let pin = Zeroizing::new(pin.to_string());

        self.run(move |conn, _| {
            conn.execute(
                "INSERT OR REPLACE INTO identities (owner_id, face_image, pin) VALUES (?1, ?2, ?3)",
                params![owner_id, face_image, pin.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn enrolled_face(&self, owner_id: &str) -> VaultResult<Vec<u8>> {
        let owner_id = owner_id.to_string();

        self.run(move |conn, _| {
            conn.query_row(
                "SELECT face_image FROM identities WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| VaultError::NotFound(format!("user {}", owner_id)))
        })
        .await
    }

    async fn enrolled_pin(&self, owner_id: &str) -> VaultResult<Zeroizing<String>> {
        let owner_id = owner_id.to_string();

        self.run(move |conn, _| {
            conn.query_row(
                "SELECT pin FROM identities WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(Zeroizing::new)
            .ok_or_else(|| VaultError::NotFound(format!("user {}", owner_id)))
        })
        .await
    }
}

#[async_trait]
impl AuditSink for SqliteStore {
    async fn append(&self, attempt: &AuthorizationAttempt) -> VaultResult<()> {
        let attempt = attempt.clone();

        self.run(move |conn, _| {
            conn.execute(
                "INSERT INTO access_logs (owner_id, document_id, action, status, reason, timestamp, origin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    attempt.owner_id,
                    attempt.document_id,
                    attempt.action.as_str(),
                    attempt.status.as_str(),
                    attempt.reason,
                    timestamp(&attempt.timestamp),
                    attempt.origin,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent(&self, owner_id: &str, limit: usize) -> VaultResult<Vec<AuthorizationAttempt>> {
        let owner_id = owner_id.to_string();

        self.run(move |conn, _| {
            let mut stmt = conn.prepare(
                "SELECT owner_id, document_id, action, status, reason, timestamp, origin
                 FROM access_logs WHERE owner_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;

            let attempts = stmt
                .query_map(params![owner_id, limit as i64], row_to_attempt)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(attempts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::{ExtractionAuthorizer, ExtractionRequest};
    use crate::config::VaultConfig;
    use chrono::Duration as ChronoDuration;
    use std::time::Instant;
    use tempfile::tempdir;

    fn open(root: &Path) -> SqliteStore {
        SqliteStore::open(root, Duration::from_secs(5)).unwrap()
    }

    fn db_path(root: &Path) -> std::path::PathBuf {
        root.join(DB_DIR).join(DB_FILE)
    }

    fn doc(id: &str, owner: &str) -> SecretDocument {
        let now = Utc::now();
        SecretDocument {
            id: id.into(),
            owner_id: owner.into(),
            original_filename: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            file_size: 10,
            cover_ref: CoverFiles::new_name(),
            encryption_key: Zeroizing::new(vec![0xAB; 32]),
            encryption_iv: vec![0xCD; 16],
            upload_time: now,
            expiry_time: now + ChronoDuration::hours(2),
            access_count: 0,
        }
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let mut original = doc("d1", "alice");
        original.expiry_time = original.expiry_time + ChronoDuration::nanoseconds(123_456_789);

        store.insert(&original, b"cover").await.unwrap();
        let loaded = store.get("alice", "d1").await.unwrap();

        assert_eq!(loaded.original_filename, "report.pdf");
        assert_eq!(loaded.encryption_key.as_slice(), original.encryption_key.as_slice());
        assert_eq!(loaded.encryption_iv, original.encryption_iv);
        assert_eq!(loaded.upload_time, original.upload_time);
        assert_eq!(loaded.expiry_time, original.expiry_time);
        assert!(loaded.has_valid_params());
        assert_eq!(store.cover(&loaded).await.unwrap(), b"cover");

        assert!(matches!(store.get("bob", "d1").await, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_documents_still_visible() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let mut expired = doc("old", "alice");
        expired.expiry_time = Utc::now() - ChronoDuration::hours(1);

        store.insert(&expired, b"cover").await.unwrap();
        let loaded = store.get("alice", "old").await.unwrap();
        assert!(loaded.is_expired_at(Utc::now()));
        assert_eq!(store.list("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_key_fails_validation() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.insert(&doc("d1", "alice"), b"cover").await.unwrap();

        store
            .conn
            .lock()
            .execute("UPDATE documents SET encryption_key = 'zz' WHERE id = 'd1'", [])
            .unwrap();

        let loaded = store.get("alice", "d1").await.unwrap();
        assert!(!loaded.has_valid_params());
    }

    #[tokio::test]
    async fn test_increment_is_atomic() {
        let dir = tempdir().unwrap();
        let store = Arc::new(open(dir.path()));
        store.insert(&doc("d1", "alice"), b"cover").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.increment_access_count("d1").await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.get("alice", "d1").await.unwrap().access_count, 16);
        assert!(matches!(
            store.increment_access_count("missing").await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_cover_file() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let d = doc("d1", "alice");
        store.insert(&d, b"cover").await.unwrap();
        assert!(store.covers().exists(&d.cover_ref));

        store.delete("alice", "d1").await.unwrap();
        assert!(!store.covers().exists(&d.cover_ref));
        assert!(store.get("alice", "d1").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_document_intact() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path(), Duration::from_millis(50)).unwrap();
        let d = doc("d1", "alice");
        store.insert(&d, b"cover").await.unwrap();

        // Another writer holds the reserved lock; reads still succeed
        let writer = Connection::open(db_path(dir.path())).unwrap();
        writer.execute_batch("BEGIN IMMEDIATE").unwrap();

        assert!(matches!(
            store.delete("alice", "d1").await,
            Err(VaultError::Storage(_))
        ));
        writer.execute_batch("COMMIT").unwrap();

        assert!(store.covers().exists(&d.cover_ref));
        let loaded = store.get("alice", "d1").await.unwrap();
        assert_eq!(store.cover(&loaded).await.unwrap(), b"cover");
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_no_cover() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let first = doc("d1", "alice");
        store.insert(&first, b"cover").await.unwrap();

        // duplicate primary key
        let dup = doc("d1", "alice");
        assert!(store.insert(&dup, b"cover").await.is_err());
        assert!(!store.covers().exists(&dup.cover_ref));
        assert!(store.covers().exists(&first.cover_ref));
    }

    #[tokio::test]
    async fn test_locked_database_is_bounded_by_store_timeout() {
        let dir = tempdir().unwrap();
        let store = Arc::new(open(dir.path()));
        store.insert(&doc("d1", "alice"), b"cover").await.unwrap();

        let holder = Connection::open(db_path(dir.path())).unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let config = VaultConfig {
            store_timeout_ms: 50,
            ..Default::default()
        };
        let authorizer =
            ExtractionAuthorizer::new(store.clone(), store.clone(), store.clone(), config);
        let request = ExtractionRequest {
            owner_id: "alice".into(),
            document_id: "d1".into(),
            face_image: "A".repeat(200),
            pin: "1234".into(),
            origin: None,
        };

        let started = Instant::now();
        let err = authorizer.extract(&request).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, VaultError::Storage(_)));

        holder.execute_batch("COMMIT").unwrap();
    }

    #[tokio::test]
    async fn test_identity_and_audit() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        store.enroll("alice", b"face", "0123").await.unwrap();
        assert_eq!(store.enrolled_face("alice").await.unwrap(), b"face");
        assert_eq!(store.enrolled_pin("alice").await.unwrap().as_str(), "0123");
        assert!(matches!(store.enrolled_pin("bob").await, Err(VaultError::NotFound(_))));

        let attempt =
            AuthorizationAttempt::failed_extract("alice", "d1", "Document expired", Some("127.0.0.1"));
        store.append(&attempt).await.unwrap();
        store
            .append(&AuthorizationAttempt::success("alice", "d2", AccessAction::Upload, None))
            .await
            .unwrap();

        let logs = store.recent("alice", 50).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, AccessAction::Upload);
        assert_eq!(logs[1].reason.as_deref(), Some("Document expired"));
        assert_eq!(logs[1].origin.as_deref(), Some("127.0.0.1"));
        assert_eq!(logs[1].timestamp, attempt.timestamp);
    }

    #[tokio::test]
    async fn test_unknown_audit_action_is_rejected() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        store
            .conn
            .lock()
            .execute(
                "INSERT INTO access_logs (owner_id, document_id, action, status, timestamp)
                 VALUES ('alice', 'd1', 'teleport', 'success', ?1)",
                params![timestamp(&Utc::now())],
            )
            .unwrap();

        assert!(matches!(store.recent("alice", 10).await, Err(VaultError::Storage(_))));
    }
}
