//! StegVault - Cover Image Files
//!
//! Cover PNGs live as standalone files under `<root>/covers/`, keyed by an
//! opaque name. Writes are atomic; removal overwrites the file first.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

/// Directory holding cover images, relative to the vault root
pub const COVERS_DIR: &str = "covers";

/// Cover image file handler
pub struct CoverFiles {
    dir: PathBuf,
}

impl CoverFiles {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(COVERS_DIR),
        }
    }

    /// Fresh opaque file name for a new cover
    pub fn new_name() -> String {
        format!("{}.png", Uuid::new_v4())
    }

    fn path_for(&self, name: &str) -> VaultResult<PathBuf> {
        // Names are generated by `new_name`; anything path-like is rejected
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return Err(VaultError::InvalidInput(format!("invalid cover name: {}", name)));
        }
        Ok(self.dir.join(name))
    }

    /// Write a cover atomically (temp file + rename)
    pub fn write(&self, name: &str, data: &[u8]) -> VaultResult<()> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir)?;

        let temp_path = path.with_extension("tmp");

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        file.write_all(data)?;
        file.sync_all()?;

        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    pub fn read(&self, name: &str) -> VaultResult<Vec<u8>> {
        let path = self.path_for(name)?;

        if !path.exists() {
            return Err(VaultError::NotFound(format!("cover {}", name)));
        }

        Ok(fs::read(&path)?)
    }

    /// Overwrite with zeros, then unlink. Missing files are not an error.
    pub fn remove(&self, name: &str) -> VaultResult<()> {
        let path = self.path_for(name)?;

        if !path.exists() {
            return Ok(());
        }

        let size = fs::metadata(&path)?.len() as usize;
        if size > 0 {
            let mut file = OpenOptions::new().write(true).open(&path)?;
            file.write_all(&vec![0u8; size])?;
            file.sync_all()?;
        }

        fs::remove_file(&path)?;
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.exists()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cover_files() {
        let dir = tempdir().unwrap();
        let covers = CoverFiles::new(dir.path());
        let name = CoverFiles::new_name();

        covers.write(&name, b"png bytes").unwrap();
        assert!(covers.exists(&name));
        assert_eq!(covers.read(&name).unwrap(), b"png bytes");

        covers.remove(&name).unwrap();
        assert!(!covers.exists(&name));
        assert!(matches!(covers.read(&name), Err(VaultError::NotFound(_))));

        // second removal is a no-op
        covers.remove(&name).unwrap();
    }

    #[test]
    fn test_path_like_names_rejected() {
        let dir = tempdir().unwrap();
        let covers = CoverFiles::new(dir.path());

        for bad in ["../escape.png", "a/b.png", "", "..\\x"] {
            assert!(matches!(covers.read(bad), Err(VaultError::InvalidInput(_))));
        }
    }
}
