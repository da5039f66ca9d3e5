//! Local filesystem [`FileStorage`] backend.
//!
//! Files live under `media_root`; storage paths are relative,
//! `/`-separated, and may not escape the root.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

use task_intake_core::storage::FileStorage;

use crate::config::StorageConfig;

pub struct LocalFileStorage {
    root: PathBuf,
    url_prefix: String,
    script_name: String,
    cloud_storage_enabled: bool,
}

impl LocalFileStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.media_root.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
            script_name: config.script_name.trim_end_matches('/').to_string(),
            cloud_storage_enabled: config.cloud_storage_enabled,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a storage path onto disk, rejecting absolute paths and `..`.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("Invalid storage path: {}", path);
        }
        Ok(self.root.join(relative))
    }
}

impl FileStorage for LocalFileStorage {
    fn open(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        std::fs::read(&full).with_context(|| format!("Failed to read {}", full.display()))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn public_url(&self, path: &str) -> String {
        let url = format!("{}/{}", self.url_prefix, path.trim_start_matches('/'));
        if self.cloud_storage_enabled || self.script_name.is_empty() {
            url
        } else {
            format!("{}{}", self.script_name, url)
        }
    }

    fn size(&self, path: &str) -> Result<u64> {
        let full = self.resolve(path)?;
        let meta = std::fs::metadata(&full)
            .with_context(|| format!("Failed to stat {}", full.display()))?;
        Ok(meta.len())
    }

    fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&full, bytes).with_context(|| format!("Failed to write {}", full.display()))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", full.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir, script_name: &str, cloud: bool) -> LocalFileStorage {
        LocalFileStorage::new(&StorageConfig {
            media_root: dir.path().to_path_buf(),
            script_name: script_name.to_string(),
            cloud_storage_enabled: cloud,
            ..StorageConfig::default()
        })
    }

    #[test]
    fn save_open_delete() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir, "", false);
        s.save("upload/1/a.txt", b"hello").unwrap();
        assert!(s.exists("upload/1/a.txt"));
        assert_eq!(s.open("upload/1/a.txt").unwrap(), b"hello");
        assert_eq!(s.size("upload/1/a.txt").unwrap(), 5);
        s.delete("upload/1/a.txt").unwrap();
        assert!(!s.exists("upload/1/a.txt"));
        s.delete("upload/1/a.txt").unwrap();
    }

    #[test]
    fn rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let s = storage(&dir, "", false);
        assert!(s.save("../outside.txt", b"x").is_err());
        assert!(s.open("/etc/passwd").is_err());
        assert!(!s.exists("upload/../../x"));
    }

    #[test]
    fn public_url_honors_script_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(storage(&dir, "", false).public_url("upload/1/a.png"), "/data/upload/1/a.png");
        assert_eq!(
            storage(&dir, "/ls/", false).public_url("upload/1/a.png"),
            "/ls/data/upload/1/a.png"
        );
        assert_eq!(
            storage(&dir, "/ls", true).public_url("upload/1/a.png"),
            "/data/upload/1/a.png"
        );
    }
}
