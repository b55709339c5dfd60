//! StegVault - Configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VaultResult;

/// Environment variable overriding `data_dir`
pub const DATA_DIR_ENV: &str = "STEGVAULT_DATA_DIR";

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Root for the database and cover images
    pub data_dir: PathBuf,
    /// Largest accepted upload, in bytes
    pub max_file_size: u64,
    /// Shortest accepted face payload string on extraction
    pub min_face_payload_len: usize,
    /// Bound on each storage call
    pub store_timeout_ms: u64,
    /// Bound on face scoring and cover decoding
    pub decode_timeout_ms: u64,
    /// Audit records returned by `logs`
    pub log_limit: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stegvault-data"),
            max_file_size: 10 * 1024 * 1024,
            min_face_payload_len: 100,
            store_timeout_ms: 5_000,
            decode_timeout_ms: 10_000,
            log_limit: 50,
        }
    }
}

impl VaultConfig {
    /// Read JSON config if present, otherwise defaults. `STEGVAULT_DATA_DIR`
    /// wins over both.
    pub fn load(path: &Path) -> VaultResult<Self> {
        let mut config = if path.exists() {
            let data = std::fs::read(path)?;
            serde_json::from_slice(&data)?
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> VaultResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("stegvault.json");

        let config = VaultConfig {
            max_file_size: 1024,
            log_limit: 5,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = VaultConfig::load(&path).unwrap();
        assert_eq!(loaded.max_file_size, 1024);
        assert_eq!(loaded.log_limit, 5);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stegvault.json");
        std::fs::write(&path, br#"{"log_limit": 7}"#).unwrap();

        let loaded = VaultConfig::load(&path).unwrap();
        assert_eq!(loaded.log_limit, 7);
        assert_eq!(loaded.max_file_size, 10 * 1024 * 1024);
        assert_eq!(loaded.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stegvault.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(VaultConfig::load(&path).is_err());
    }
}
