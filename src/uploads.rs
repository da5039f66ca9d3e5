//! Upload creation and the upload registry.
//!
//! Every stored upload gets a unique name of the form
//! `<upload_dir>/<project>/<8 hex>-<file name>`. The registry keeps the
//! [`UploadedFile`] records that the normalizer later reads.
//!
//! Directory uploads walk a local folder, flatten relative paths into file
//! names, and register every supported file.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use walkdir::WalkDir;

use task_intake_core::format::extension_of;
use task_intake_core::models::{FileUploadSummary, UploadedFile};
use task_intake_core::normalize::Limits;
use task_intake_core::storage::FileStorage;

use crate::svg::allowlist_svg;

/// A file body received for upload.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

// ─── Registry ───────────────────────────────────────────────────────

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    files: BTreeMap<u64, UploadedFile>,
}

/// Registered uploads, keyed by id.
#[derive(Default)]
pub struct UploadRegistry {
    inner: RwLock<RegistryInner>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, project_id: u64, user_id: u64, path: String, size: u64) -> UploadedFile {
        let mut inner = self.inner.write().unwrap();
        inner.next_id += 1;
        let file = UploadedFile::new(inner.next_id, project_id, user_id, path, size);
        inner.files.insert(file.id, file.clone());
        file
    }

    pub fn get(&self, id: u64) -> Option<UploadedFile> {
        self.inner.read().unwrap().files.get(&id).cloned()
    }

    /// Uploads of `project_id` in id order, optionally restricted to `ids`.
    pub fn list(&self, project_id: u64, ids: Option<&[u64]>) -> Vec<UploadedFile> {
        self.inner
            .read()
            .unwrap()
            .files
            .values()
            .filter(|f| f.project_id == project_id)
            .filter(|f| ids.map_or(true, |ids| ids.contains(&f.id)))
            .cloned()
            .collect()
    }

    pub fn summaries(&self, project_id: u64) -> Vec<FileUploadSummary> {
        self.list(project_id, None)
            .iter()
            .map(UploadedFile::summary)
            .collect()
    }

    /// Removes uploads of `project_id` (all of them when `ids` is `None`)
    /// and their stored bodies. Returns the number removed.
    pub fn delete(
        &self,
        storage: &dyn FileStorage,
        project_id: u64,
        ids: Option<&[u64]>,
    ) -> Result<usize> {
        let doomed = self.list(project_id, ids);
        for file in &doomed {
            storage.delete(&file.path)?;
        }
        let mut inner = self.inner.write().unwrap();
        for file in &doomed {
            inner.files.remove(&file.id);
        }
        tracing::info!(project_id, removed = doomed.len(), "deleted uploads");
        Ok(doomed.len())
    }
}

// ─── Uploader ───────────────────────────────────────────────────────

/// Flattens a relative path into a single file name.
pub fn sanitize_relative_name(relative: &str) -> String {
    relative.replace(['/', '\\'], "_").replace(':', "-")
}

pub struct Uploader {
    storage: Arc<dyn FileStorage>,
    registry: Arc<UploadRegistry>,
    upload_dir: String,
    svg_security_cleanup: bool,
    limits: Limits,
}

impl Uploader {
    pub fn new(
        storage: Arc<dyn FileStorage>,
        registry: Arc<UploadRegistry>,
        upload_dir: &str,
        svg_security_cleanup: bool,
        limits: Limits,
    ) -> Self {
        Self {
            storage,
            registry,
            upload_dir: upload_dir.trim_matches('/').to_string(),
            svg_security_cleanup,
            limits,
        }
    }

    pub fn registry(&self) -> &Arc<UploadRegistry> {
        &self.registry
    }

    /// `<upload_dir>/<project>/<8 hex>-<file_name>`.
    pub fn upload_name(&self, project_id: u64, file_name: &str) -> String {
        let prefix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}/{}/{}-{}",
            self.upload_dir,
            project_id,
            &prefix[..8],
            file_name
        )
    }

    /// Stores one file and registers it. No limit checks.
    pub fn create_file_upload(
        &self,
        user_id: u64,
        project_id: u64,
        file: &IncomingFile,
    ) -> Result<UploadedFile> {
        let path = self.upload_name(project_id, &file.name);
        let cleaned;
        let bytes: &[u8] = if self.svg_security_cleanup && extension_of(&file.name) == ".svg" {
            cleaned = allowlist_svg(&String::from_utf8_lossy(&file.bytes))?;
            cleaned.as_bytes()
        } else {
            &file.bytes
        };
        self.storage.save(&path, bytes)?;
        let upload = self
            .registry
            .register(project_id, user_id, path, bytes.len() as u64);
        tracing::debug!(id = upload.id, path = %upload.path, "created file upload");
        Ok(upload)
    }

    /// Checks total size and extensions, then stores every file. Returns
    /// the new ids and whether any file could hold a task list.
    pub fn create_file_uploads(
        &self,
        user_id: u64,
        project_id: u64,
        files: &[IncomingFile],
    ) -> Result<(Vec<u64>, bool)> {
        self.limits
            .check_total_size(files.iter().map(|f| f.bytes.len() as u64).sum())?;
        self.limits
            .check_extensions(files.iter().map(|f| f.name.as_str()))?;

        let mut ids = Vec::with_capacity(files.len());
        let mut could_be_tasks_list = false;
        for file in files {
            let upload = self.create_file_upload(user_id, project_id, file)?;
            could_be_tasks_list |= upload.could_be_tasks_list();
            ids.push(upload.id);
        }
        tracing::debug!(?ids, could_be_tasks_list, "created file uploads");
        Ok((ids, could_be_tasks_list))
    }

    /// Uploads every supported file below `dir`.
    ///
    /// Relative paths become file names (`a/b.csv` → `a_b.csv`). Files with
    /// blank names, matching `exclude_globs`, or with unsupported
    /// extensions are skipped.
    pub fn upload_directory(
        &self,
        user_id: u64,
        project_id: u64,
        dir: &Path,
        exclude_globs: &[String],
    ) -> Result<(Vec<u64>, bool)> {
        if !dir.is_dir() {
            anyhow::bail!("Local folder {} does not exist", dir.display());
        }
        let exclude_set = build_globset(exclude_globs)?;

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().trim().is_empty() {
                tracing::warn!(dir = %dir.display(), "skipping file with empty name");
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();
            if exclude_set.is_match(&rel_str) {
                continue;
            }

            let name = sanitize_relative_name(&rel_str);
            if name != rel_str {
                tracing::debug!(from = %rel_str, to = %name, "sanitized file name");
            }
            if !self.limits.supported_extensions.contains(&extension_of(&name)) {
                tracing::warn!(file = %rel_str, "skipping unsupported file");
                continue;
            }
            files.push(IncomingFile::new(name, std::fs::read(path)?));
        }

        self.limits
            .check_total_size(files.iter().map(|f| f.bytes.len() as u64).sum())?;

        let mut ids = Vec::with_capacity(files.len());
        let mut could_be_tasks_list = false;
        for file in &files {
            let upload = self.create_file_upload(user_id, project_id, file)?;
            could_be_tasks_list |= upload.could_be_tasks_list();
            ids.push(upload.id);
        }
        tracing::info!(dir = %dir.display(), uploaded = ids.len(), "uploaded directory");
        Ok((ids, could_be_tasks_list))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_intake_core::storage::memory::InMemoryFileStorage;
    use tempfile::TempDir;

    fn uploader(svg_cleanup: bool, limits: Limits) -> (Arc<InMemoryFileStorage>, Uploader) {
        let storage = Arc::new(InMemoryFileStorage::new());
        let uploader = Uploader::new(
            storage.clone(),
            Arc::new(UploadRegistry::new()),
            "upload",
            svg_cleanup,
            limits,
        );
        (storage, uploader)
    }

    #[test]
    fn upload_name_has_project_and_prefix() {
        let (_, up) = uploader(false, Limits::default());
        let name = up.upload_name(7, "tasks.csv");
        let rest = name.strip_prefix("upload/7/").unwrap();
        let (prefix, file) = rest.split_once('-').unwrap();
        assert_eq!(prefix.len(), 8);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(file, "tasks.csv");
    }

    #[test]
    fn create_file_uploads_checks_then_stores() {
        let (storage, up) = uploader(false, Limits::default());
        let (ids, could_be_list) = up
            .create_file_uploads(
                1,
                3,
                &[
                    IncomingFile::new("a.json", "[]"),
                    IncomingFile::new("b.csv", "text\nx\n"),
                ],
            )
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert!(could_be_list);
        assert_eq!(storage.len(), 2);
        let first = up.registry().get(1).unwrap();
        assert_eq!(first.original_name(), "a.json");
        assert_eq!(first.project_id, 3);

        let err = up
            .create_file_uploads(1, 3, &[IncomingFile::new("x.exe", "MZ")])
            .unwrap_err();
        assert_eq!(err.to_string(), ".exe extension is not supported");
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn total_size_limit_applies() {
        let limits = Limits {
            max_total_file_bytes: 3,
            ..Limits::default()
        };
        let (_, up) = uploader(false, limits);
        assert!(up
            .create_file_uploads(1, 1, &[IncomingFile::new("a.txt", "abcd")])
            .is_err());
    }

    #[test]
    fn svg_is_cleaned_when_enabled() {
        let (storage, up) = uploader(true, Limits::default());
        let upload = up
            .create_file_upload(1, 1, &IncomingFile::new("x.svg", "<svg><script>bad()</script><rect/></svg>"))
            .unwrap();
        let body = String::from_utf8(storage.open(&upload.path).unwrap()).unwrap();
        assert_eq!(body, "<svg><rect/></svg>");
        assert_eq!(upload.size, body.len() as u64);
    }

    #[test]
    fn registry_list_and_delete() {
        let (storage, up) = uploader(false, Limits::default());
        up.create_file_uploads(1, 1, &[IncomingFile::new("a.txt", "a"), IncomingFile::new("b.txt", "b")])
            .unwrap();
        up.create_file_uploads(1, 2, &[IncomingFile::new("c.txt", "c")])
            .unwrap();
        assert_eq!(up.registry().list(1, None).len(), 2);
        assert_eq!(up.registry().list(1, Some(&[2, 3][..])).len(), 1);
        assert_eq!(up.registry().summaries(2)[0].file_name, "c.txt");

        let removed = up.registry().delete(storage.as_ref(), 1, Some(&[1][..])).unwrap();
        assert_eq!(removed, 1);
        assert!(up.registry().get(1).is_none());
        assert_eq!(storage.len(), 2);
        assert_eq!(up.registry().delete(storage.as_ref(), 1, None).unwrap(), 1);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn sanitizes_relative_names() {
        assert_eq!(sanitize_relative_name("a/b\\c:d.csv"), "a_b_c-d.csv");
    }

    #[test]
    fn upload_directory_flattens_and_filters() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::create_dir_all(dir.path().join("skip")).unwrap();
        std::fs::write(dir.path().join("top.txt"), "one\n").unwrap();
        std::fs::write(dir.path().join("sub/rows.csv"), "text\nx\n").unwrap();
        std::fs::write(dir.path().join("skip/ignored.json"), "[]").unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme").unwrap();

        let (_, up) = uploader(false, Limits::default());
        let (ids, could_be_list) = up
            .upload_directory(1, 5, dir.path(), &["skip/**".to_string()])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert!(could_be_list);
        let names: Vec<String> = up
            .registry()
            .list(5, None)
            .iter()
            .map(|f| f.original_name().to_string())
            .collect();
        assert_eq!(names, vec!["sub_rows.csv", "top.txt"]);
    }

    #[test]
    fn upload_directory_requires_existing_dir() {
        let (_, up) = uploader(false, Limits::default());
        assert!(up
            .upload_directory(1, 1, Path::new("/definitely/not/here"), &[])
            .is_err());
    }
}
