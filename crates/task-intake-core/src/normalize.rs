//! # Normalizer
//!
//! Turns a set of uploaded files (or an inline JSON payload) into a flat,
//! ordered list of [`Task`]s for one project.
//!
//! ```text
//! files ──► limit checks ──► per file: skip? ──► plan ──► extract
//!                                                           │
//!          ◄── count check ◄── common fields ◄── key policy ◄┘
//! ```
//!
//! Tasks are emitted in file order, and within a file in row, line or
//! array order. Every failure is a [`ValidationFailure`]; there is no
//! partial success.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::{ReadError, Result, ValidationFailure};
use crate::fields::CommonFields;
use crate::format::{extension_of, normalize_extension};
use crate::models::{IngestionBatch, Task, UploadedFile};
use crate::readers::{self, Extraction};
use crate::reconcile::KeyPolicy;
use crate::schema::TargetSchema;
use crate::storage::FileStorage;

/// Placeholder field for content that cannot be mapped onto a named field.
pub const DATA_UNDEFINED_NAME: &str = "$undefined$";

/// File name used in error messages for inline payloads.
const INLINE_NAME: &str = "inplace.json";

pub const DEFAULT_MAX_TASK_COUNT: usize = 1_000_000;
pub const DEFAULT_MAX_TOTAL_FILE_BYTES: u64 = 250 * 1024 * 1024;
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] = &[
    ".csv", ".tsv", ".txt", ".json", ".html", ".htm", ".xml", ".jpg", ".jpeg", ".png", ".bmp",
    ".gif", ".webp", ".tiff", ".svg", ".wav", ".mp3", ".flac", ".m4a", ".ogg", ".aac", ".mp4",
    ".avi", ".mov", ".mkv", ".webm",
];

/// Hard limits applied to every ingestion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_task_count: usize,
    pub max_total_file_bytes: u64,
    /// Lowercased, dot-prefixed extensions.
    pub supported_extensions: BTreeSet<String>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_task_count: DEFAULT_MAX_TASK_COUNT,
            max_total_file_bytes: DEFAULT_MAX_TOTAL_FILE_BYTES,
            supported_extensions: DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl Limits {
    /// Fails on the first file name whose extension is not allowed.
    pub fn check_extensions<'a>(&self, file_names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in file_names {
            let ext = extension_of(name);
            if !self.supported_extensions.contains(&ext) {
                return Err(ValidationFailure::new(format!("{} extension is not supported", ext)));
            }
        }
        Ok(())
    }

    pub fn check_total_size(&self, total_bytes: u64) -> Result<()> {
        if total_bytes > self.max_total_file_bytes {
            return Err(ValidationFailure::new(format!(
                "Maximum total size of all files is {} bytes, current size is {} bytes",
                self.max_total_file_bytes, total_bytes
            )));
        }
        Ok(())
    }

    pub fn check_task_count(&self, count: usize) -> Result<()> {
        if count > self.max_task_count {
            return Err(ValidationFailure::new(format!(
                "Maximum task number is {}, current task number is {}",
                self.max_task_count, count
            )));
        }
        Ok(())
    }
}

/// Settings fixed for the lifetime of a [`Normalizer`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub limits: Limits,
    pub policy: KeyPolicy,
    pub undefined_field: String,
    /// Media tasks reference the storage path instead of a public URL.
    pub cloud_storage_enabled: bool,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            policy: KeyPolicy::default(),
            undefined_field: DATA_UNDEFINED_NAME.to_string(),
            cloud_storage_enabled: false,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Read `.csv`, `.tsv` and `.txt` files as one task per row or line.
    pub treat_tabular_as_list: bool,
    /// Stop reading files once more than this many tasks are collected.
    pub trim_size: Option<usize>,
    /// Only files with these extensions are read; others are skipped.
    pub formats: Option<Vec<String>>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            treat_tabular_as_list: true,
            trim_size: None,
            formats: None,
        }
    }
}

impl NormalizeOptions {
    pub fn list_mode(treat_tabular_as_list: bool) -> Self {
        Self {
            treat_tabular_as_list,
            ..Self::default()
        }
    }
}

/// Why a file is left out of a batch without failing it.
fn skip_reason(file: &UploadedFile, list_mode: bool, schema: &TargetSchema) -> Option<&'static str> {
    let format = file.format();
    let supported = format.is_structured() || format.is_media();
    if list_mode && file.is_hidden() {
        Some("hidden file")
    } else if list_mode && !supported {
        Some("format cannot be read as a task list")
    } else if !schema.is_single_field() && !supported {
        Some("label config has several data keys and the file is neither structured nor media")
    } else {
        None
    }
}

/// Every task must share at least one key with a multi-field schema.
fn check_schema_overlap(file_name: &str, task: &Task, schema: &TargetSchema) -> Result<()> {
    if schema.is_single_field() || task.data.keys().any(|k| schema.contains(k)) {
        return Ok(());
    }
    let keys: Vec<&str> = task.data.keys().map(String::as_str).collect();
    Err(ValidationFailure::new(format!(
        "Data key(s) \"{}\" from \"{}\" match none of the label config data keys \"{}\"",
        keys.join(","),
        file_name,
        schema.field_names().collect::<Vec<_>>().join(",")
    )))
}

/// Converts uploaded files into tasks against a target schema.
pub struct Normalizer<'a> {
    storage: &'a dyn FileStorage,
    settings: &'a IngestSettings,
}

impl<'a> Normalizer<'a> {
    pub fn new(storage: &'a dyn FileStorage, settings: &'a IngestSettings) -> Self {
        Self { storage, settings }
    }

    pub fn settings(&self) -> &IngestSettings {
        self.settings
    }

    /// Reads every file and applies all limit checks.
    pub fn normalize(
        &self,
        files: &[UploadedFile],
        schema: &TargetSchema,
        options: &NormalizeOptions,
    ) -> Result<IngestionBatch> {
        if files.is_empty() {
            return Err(ValidationFailure::new("load_tasks: No files to import"));
        }
        let limits = &self.settings.limits;
        limits.check_extensions(files.iter().map(UploadedFile::original_name))?;
        limits.check_total_size(files.iter().map(|f| f.size).sum())?;

        let batch = self.load_tasks_from_files(files, schema, options)?;
        if batch.is_empty() {
            return Err(ValidationFailure::new("load_tasks: No tasks added"));
        }
        limits.check_task_count(batch.len())?;

        tracing::info!(
            files = files.len(),
            tasks = batch.len(),
            formats = ?batch.format_counts,
            "normalized upload batch"
        );
        Ok(batch)
    }

    /// Reads every file without limit checks. An empty batch is not an
    /// error here.
    pub fn load_tasks_from_files(
        &self,
        files: &[UploadedFile],
        schema: &TargetSchema,
        options: &NormalizeOptions,
    ) -> Result<IngestionBatch> {
        let allowed: Option<BTreeSet<String>> = options
            .formats
            .as_ref()
            .map(|formats| formats.iter().map(|f| normalize_extension(f)).collect());

        let mut tasks = Vec::new();
        let mut format_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut common = CommonFields::new(self.settings.undefined_field.as_str());

        for file in files {
            let ext = file.extension();
            if let Some(allowed) = &allowed {
                if !allowed.contains(&ext) {
                    tracing::debug!(file = file.file_name(), "extension not requested, skipping");
                    continue;
                }
            }
            if let Some(reason) = skip_reason(file, options.treat_tabular_as_list, schema) {
                tracing::warn!(file = file.file_name(), reason, "skipping file");
                continue;
            }

            let mut new_tasks = self.read_tasks(file, schema, options.treat_tabular_as_list)?;
            for task in &mut new_tasks {
                task.file_upload_id = Some(file.id);
                self.settings.policy.apply(&mut task.data, schema);
                check_schema_overlap(file.file_name(), task, schema)?;
            }
            // Files without tasks stay out of the common-field check.
            if let Some(first) = new_tasks.first() {
                common.absorb(file.file_name(), first.field_names())?;
            }
            tracing::debug!(
                file = file.file_name(),
                tasks = new_tasks.len(),
                "read tasks from file"
            );

            tasks.append(&mut new_tasks);
            *format_counts.entry(ext).or_insert(0) += 1;

            if let Some(limit) = options.trim_size {
                if tasks.len() > limit {
                    tracing::info!(limit, tasks = tasks.len(), "task limit reached, stopping");
                    break;
                }
            }
        }

        Ok(IngestionBatch {
            tasks,
            format_counts,
            common_fields: common.into_fields(),
        })
    }

    /// Extracts the tasks of a single file. Reader failures name the file.
    pub fn read_tasks(&self, file: &UploadedFile, schema: &TargetSchema, list_mode: bool) -> Result<Vec<Task>> {
        self.extract(file, schema, list_mode)
            .map_err(|e| ValidationFailure::parse(file.file_name(), e))
    }

    fn extract(
        &self,
        file: &UploadedFile,
        schema: &TargetSchema,
        list_mode: bool,
    ) -> std::result::Result<Vec<Task>, ReadError> {
        let undefined = self.settings.undefined_field.as_str();
        let tasks = match readers::plan(file.format(), list_mode, schema)? {
            Extraction::Delimited(delimiter) => readers::read_delimited(
                self.body(file)?,
                delimiter,
                &self.settings.policy.header_names(schema),
            )?,
            Extraction::Lines => {
                readers::read_lines(self.body(file)?, &readers::line_field(schema, undefined))
            }
            Extraction::Json => readers::read_json(self.body(file)?)?,
            Extraction::MediaAsset(field) => vec![Task::single(field, self.reference(file))],
            Extraction::HypertextBody => vec![Task::single(
                &readers::best_field(schema, undefined),
                self.body(file)?,
            )],
            Extraction::RawReference => vec![Task::single(
                &readers::best_field(schema, undefined),
                self.reference(file),
            )],
        };
        Ok(tasks)
    }

    fn body<'f>(&self, file: &'f UploadedFile) -> std::result::Result<&'f str, ReadError> {
        let bytes = file
            .content(self.storage)
            .map_err(|e| ReadError::Storage(e.to_string()))?;
        Ok(std::str::from_utf8(bytes)?)
    }

    fn reference(&self, file: &UploadedFile) -> String {
        file.servable_reference(self.storage, self.settings.cloud_storage_enabled)
    }

    /// Tasks posted directly as JSON: an object, an array, or a string
    /// holding (leniently quoted) JSON. Each task must share a key with a
    /// multi-field `schema`.
    pub fn from_inline_payload(&self, payload: Value, schema: &TargetSchema) -> Result<Vec<Task>> {
        let value = match payload {
            Value::String(raw) => readers::str_to_json(&raw)
                .ok_or_else(|| ValidationFailure::new("load_tasks: Data root must be list"))?,
            other => other,
        };
        let items = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            _ => return Err(ValidationFailure::new("load_tasks: Data root must be list")),
        };
        let tasks = items
            .into_iter()
            .map(readers::task_from_json_element)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ValidationFailure::parse(INLINE_NAME, e))?;

        if tasks.is_empty() {
            return Err(ValidationFailure::new("load_tasks: No tasks added"));
        }
        self.settings.limits.check_task_count(tasks.len())?;
        for task in &tasks {
            check_schema_overlap(INLINE_NAME, task, schema)?;
        }
        Ok(tasks)
    }

    /// Raw request body variant of [`Normalizer::from_inline_payload`].
    pub fn from_inline_bytes(&self, body: &[u8], schema: &TargetSchema) -> Result<Vec<Task>> {
        let text = std::str::from_utf8(body).map_err(|e| ValidationFailure::parse(INLINE_NAME, e))?;
        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(e) => readers::str_to_json(text).ok_or_else(|| ValidationFailure::parse(INLINE_NAME, e))?,
        };
        self.from_inline_payload(value, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use crate::storage::memory::InMemoryFileStorage;
    use serde_json::json;

    fn text_schema() -> TargetSchema {
        TargetSchema::from_fields([("text", FieldKind::Text)])
    }

    fn upload(storage: &InMemoryFileStorage, id: u64, name: &str, body: &str) -> UploadedFile {
        let path = format!("upload/1/{}", name);
        storage.save(&path, body.as_bytes()).unwrap();
        UploadedFile::new(id, 1, 1, path, body.len() as u64)
    }

    #[test]
    fn limits_messages() {
        let limits = Limits {
            max_task_count: 5,
            max_total_file_bytes: 10,
            ..Limits::default()
        };
        assert_eq!(
            limits.check_task_count(6).unwrap_err().to_string(),
            "Maximum task number is 5, current task number is 6"
        );
        assert!(limits.check_task_count(5).is_ok());
        assert!(limits.check_total_size(10).is_ok());
        assert!(limits.check_total_size(11).is_err());
        assert_eq!(
            limits.check_extensions(["a.csv", "b.exe"]).unwrap_err().to_string(),
            ".exe extension is not supported"
        );
    }

    #[test]
    fn empty_file_list_fails() {
        let storage = InMemoryFileStorage::new();
        let settings = IngestSettings::default();
        let normalizer = Normalizer::new(&storage, &settings);
        assert!(normalizer
            .normalize(&[], &text_schema(), &NormalizeOptions::default())
            .is_err());
    }

    #[test]
    fn hidden_file_skipped_in_list_mode() {
        let storage = InMemoryFileStorage::new();
        let settings = IngestSettings::default();
        let files = vec![
            upload(&storage, 1, "0a1b2c3d-.notes.txt", "ignored\n"),
            upload(&storage, 2, "tasks.txt", "kept\n"),
        ];
        let batch = Normalizer::new(&storage, &settings)
            .load_tasks_from_files(&files, &text_schema(), &NormalizeOptions::default())
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.tasks[0].file_upload_id, Some(2));
    }

    #[test]
    fn formats_filter_skips_other_extensions() {
        let storage = InMemoryFileStorage::new();
        let settings = IngestSettings::default();
        let files = vec![
            upload(&storage, 1, "a.txt", "one\n"),
            upload(&storage, 2, "b.json", r#"[{"text": "two"}]"#),
        ];
        let options = NormalizeOptions {
            formats: Some(vec!["json".to_string()]),
            ..NormalizeOptions::default()
        };
        let batch = Normalizer::new(&storage, &settings)
            .load_tasks_from_files(&files, &text_schema(), &options)
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.format_counts.get(".json"), Some(&1));
        assert!(!batch.format_counts.contains_key(".txt"));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let storage = InMemoryFileStorage::new();
        let settings = IngestSettings::default();
        let file = upload(&storage, 1, "abcd1234-broken.json", "{nope");
        let err = Normalizer::new(&storage, &settings)
            .read_tasks(&file, &text_schema(), true)
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to parse input file abcd1234-broken.json:"));
    }

    #[test]
    fn multi_field_schema_requires_overlap() {
        let storage = InMemoryFileStorage::new();
        let settings = IngestSettings::default();
        let schema = TargetSchema::from_fields([("text", FieldKind::Text), ("label", FieldKind::Generic)]);
        let files = vec![upload(&storage, 1, "t.json", r#"[{"other": 1}]"#)];
        let err = Normalizer::new(&storage, &settings)
            .normalize(&files, &schema, &NormalizeOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("\"other\""));
    }

    #[test]
    fn inline_payload_shapes() {
        let storage = InMemoryFileStorage::new();
        let settings = IngestSettings::default();
        let normalizer = Normalizer::new(&storage, &settings);

        let schema = text_schema();

        let tasks = normalizer
            .from_inline_payload(json!({"text": "one"}), &schema)
            .unwrap();
        assert_eq!(tasks.len(), 1);

        let tasks = normalizer
            .from_inline_payload(json!([{"data": {"text": "a"}}, {"text": "b"}]), &schema)
            .unwrap();
        assert_eq!(tasks[0].data["text"], json!("a"));
        assert_eq!(tasks[1].data["text"], json!("b"));

        let tasks = normalizer
            .from_inline_bytes(b"[{'text': 'quoted'}]", &schema)
            .unwrap();
        assert_eq!(tasks[0].data["text"], json!("quoted"));

        assert!(normalizer.from_inline_payload(json!([]), &schema).is_err());
        assert!(normalizer.from_inline_payload(json!(3), &schema).is_err());
        let err = normalizer.from_inline_payload(json!([1]), &schema).unwrap_err();
        assert!(err.to_string().contains("inplace.json"));
    }

    #[test]
    fn inline_payload_must_overlap_multi_field_schema() {
        let storage = InMemoryFileStorage::new();
        let settings = IngestSettings::default();
        let normalizer = Normalizer::new(&storage, &settings);
        let schema = TargetSchema::from_fields([("text", FieldKind::Text), ("label", FieldKind::Generic)]);

        let err = normalizer
            .from_inline_payload(json!([{"text": "ok"}, {"other": 1}]), &schema)
            .unwrap_err();
        assert!(err.to_string().contains("\"other\" from \"inplace.json\""));

        let tasks = normalizer
            .from_inline_payload(json!([{"other": 1}]), &text_schema())
            .unwrap();
        assert_eq!(tasks.len(), 1);
    }
}
