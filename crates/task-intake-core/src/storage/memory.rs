//! In-memory [`FileStorage`] implementation for testing and embedding.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};

use super::FileStorage;

/// Map-backed storage. Public URLs are `url_prefix/path`.
pub struct InMemoryFileStorage {
    files: RwLock<HashMap<String, Vec<u8>>>,
    url_prefix: String,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self::with_url_prefix("/data")
    }

    pub fn with_url_prefix(prefix: &str) -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            url_prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryFileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStorage for InMemoryFileStorage {
    fn open(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("file not found: {}", path))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().unwrap().contains_key(path)
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix, path.trim_start_matches('/'))
    }

    fn size(&self, path: &str) -> Result<u64> {
        self.files
            .read()
            .unwrap()
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| anyhow!("file not found: {}", path))
    }

    fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.files
            .write()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.files.write().unwrap().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_open_delete() {
        let storage = InMemoryFileStorage::new();
        storage.save("upload/1/a.txt", b"hello").unwrap();
        assert!(storage.exists("upload/1/a.txt"));
        assert_eq!(storage.open("upload/1/a.txt").unwrap(), b"hello");
        assert_eq!(storage.size("upload/1/a.txt").unwrap(), 5);
        storage.delete("upload/1/a.txt").unwrap();
        assert!(!storage.exists("upload/1/a.txt"));
        assert!(storage.open("upload/1/a.txt").is_err());
    }

    #[test]
    fn public_url_uses_prefix() {
        let storage = InMemoryFileStorage::with_url_prefix("/data/");
        assert_eq!(storage.public_url("upload/1/a.png"), "/data/upload/1/a.png");
    }
}
