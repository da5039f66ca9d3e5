//! Core data models used throughout Task Intake.
//!
//! These types represent the uploaded files, the tasks extracted from them,
//! and the per-call ingestion batch that flows through the normalizer.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::format::{extension_of, FileFormat};
use crate::storage::FileStorage;

/// Ordered field name → value mapping of a task's input data.
pub type TaskData = Map<String, Value>;

/// One unit of labeling work.
///
/// `data` holds the schema-driven input fields. Other top-level keys of an
/// imported task (`annotations`, `predictions`, `meta`, ...) are carried in
/// `extra` and serialized alongside `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub data: TaskData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_upload_id: Option<u64>,
}

impl Task {
    pub fn from_data(data: TaskData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// A task holding one field.
    pub fn single(field: &str, value: impl Into<Value>) -> Self {
        let mut data = TaskData::new();
        data.insert(field.to_string(), value.into());
        Self::from_data(data)
    }

    pub fn field_names(&self) -> BTreeSet<String> {
        self.data.keys().cloned().collect()
    }

    /// Equality ignoring provenance.
    pub fn same_content(&self, other: &Task) -> bool {
        self.data == other.data && self.extra == other.extra
    }
}

/// A file uploaded into a project, read during task loading.
///
/// The body is fetched from storage on first access and cached for the
/// lifetime of the value.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub id: u64,
    pub project_id: u64,
    pub user_id: u64,
    /// Storage-relative path, e.g. `upload/7/1a2b3c4d-tasks.csv`.
    pub path: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    content: OnceLock<Vec<u8>>,
}

impl UploadedFile {
    pub fn new(id: u64, project_id: u64, user_id: u64, path: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            project_id,
            user_id,
            path: path.into(),
            size,
            created_at: Utc::now(),
            content: OnceLock::new(),
        }
    }

    /// Base name of the stored file.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(self.path.as_str())
    }

    /// Name the file was uploaded under, without the `xxxxxxxx-` storage
    /// prefix added by upload naming.
    pub fn original_name(&self) -> &str {
        let name = self.file_name();
        match name.split_once('-') {
            Some((prefix, rest))
                if prefix.len() == 8
                    && prefix.chars().all(|c| c.is_ascii_hexdigit())
                    && !rest.is_empty() =>
            {
                rest
            }
            _ => name,
        }
    }

    /// Lowercased extension including the dot, or `""`.
    pub fn extension(&self) -> String {
        extension_of(self.original_name())
    }

    pub fn format(&self) -> FileFormat {
        FileFormat::from_extension(&self.extension())
    }

    pub fn could_be_tasks_list(&self) -> bool {
        self.format().could_be_tasks_list()
    }

    pub fn is_hidden(&self) -> bool {
        self.original_name().starts_with('.')
    }

    /// Raw bytes of the file, read once from `storage`.
    pub fn content(&self, storage: &dyn FileStorage) -> Result<&[u8]> {
        if let Some(body) = self.content.get() {
            return Ok(body.as_slice());
        }
        let body = storage.open(&self.path)?;
        Ok(self.content.get_or_init(|| body).as_slice())
    }

    /// The body decoded as UTF-8.
    pub fn text(&self, storage: &dyn FileStorage) -> Result<&str> {
        let bytes = self.content(storage)?;
        std::str::from_utf8(bytes)
            .map_err(|e| anyhow::anyhow!("{} is not valid UTF-8: {}", self.file_name(), e))
    }

    /// How a task should point at this file: the storage path when cloud
    /// storage serves it, otherwise its public URL.
    pub fn servable_reference(&self, storage: &dyn FileStorage, cloud_storage_enabled: bool) -> String {
        if cloud_storage_enabled {
            self.path.clone()
        } else {
            storage.public_url(&self.path)
        }
    }

    pub fn summary(&self) -> FileUploadSummary {
        FileUploadSummary {
            id: self.id,
            project_id: self.project_id,
            file: self.path.clone(),
            file_name: self.original_name().to_string(),
            size: self.size,
            created_at: self.created_at,
        }
    }
}

/// Listing view of an uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct FileUploadSummary {
    pub id: u64,
    pub project_id: u64,
    pub file: String,
    pub file_name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Result of one ingestion call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionBatch {
    pub tasks: Vec<Task>,
    /// Extension (e.g. `.csv`) → number of files read with it.
    pub format_counts: BTreeMap<String, usize>,
    /// Data fields shared by every file that produced tasks.
    pub common_fields: BTreeSet<String>,
}

impl IngestionBatch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
