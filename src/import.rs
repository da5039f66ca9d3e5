//! Import service: uploads, normalization, and task creation.
//!
//! Each operation resolves the project's target schema, produces an
//! [`IngestionBatch`] (or a plain task list for inline payloads), and, when
//! committing, hands the tasks to the [`TaskStore`] as one batch.
//!
//! # Operations
//!
//! | Method | Input |
//! |--------|-------|
//! | [`ImportService::import_files`] | Uploaded file bodies |
//! | [`ImportService::import_directory`] | A local directory of files |
//! | [`ImportService::import_inline`] | A JSON task payload |
//! | [`ImportService::reimport`] | Previously uploaded files |

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use task_intake_core::models::{IngestionBatch, Task};
use task_intake_core::normalize::{IngestSettings, NormalizeOptions, Normalizer};
use task_intake_core::schema::{SchemaProvider, TargetSchema};
use task_intake_core::storage::FileStorage;
use task_intake_core::store::memory::InMemoryTaskStore;
use task_intake_core::store::TaskStore;

use crate::config::Config;
use crate::storage::LocalFileStorage;
use crate::uploads::{IncomingFile, UploadRegistry, Uploader};

/// Per-call import options.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub user_id: u64,
    /// Overrides `import.treat_tabular_as_list` from the config.
    pub treat_tabular_as_list: Option<bool>,
    /// Persist tasks; otherwise only parse and report.
    pub commit: bool,
    pub return_task_ids: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            user_id: 1,
            treat_tabular_as_list: None,
            commit: true,
            return_task_ids: false,
        }
    }
}

/// Summary of one import call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub task_count: usize,
    /// `None` when nothing was committed.
    pub annotation_count: Option<usize>,
    pub prediction_count: Option<usize>,
    /// Seconds.
    pub duration: f64,
    pub file_upload_ids: Vec<u64>,
    pub could_be_tasks_list: bool,
    pub found_formats: BTreeMap<String, usize>,
    pub data_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ids: Option<Vec<u64>>,
    /// Parsed tasks, kept for callers that write them out.
    #[serde(skip)]
    pub tasks: Vec<Task>,
}

fn count_nested(tasks: &[Task], key: &str) -> usize {
    tasks
        .iter()
        .filter_map(|t| t.extra.get(key).and_then(Value::as_array))
        .map(Vec::len)
        .sum()
}

pub struct ImportService {
    storage: Arc<dyn FileStorage>,
    tasks: Arc<dyn TaskStore>,
    schemas: Arc<dyn SchemaProvider>,
    uploader: Uploader,
    settings: IngestSettings,
    treat_tabular_as_list: bool,
    exclude_globs: Vec<String>,
}

impl ImportService {
    pub fn new(
        config: &Config,
        storage: Arc<dyn FileStorage>,
        tasks: Arc<dyn TaskStore>,
        schemas: Arc<dyn SchemaProvider>,
    ) -> Self {
        let settings = config.ingest_settings();
        let uploader = Uploader::new(
            storage.clone(),
            Arc::new(UploadRegistry::new()),
            &config.storage.upload_dir,
            config.import.svg_security_cleanup,
            settings.limits.clone(),
        );
        Self {
            storage,
            tasks,
            schemas,
            uploader,
            settings,
            treat_tabular_as_list: config.import.treat_tabular_as_list,
            exclude_globs: config.import.exclude_globs.clone(),
        }
    }

    /// Local disk storage, an in-memory task store, and the configured
    /// project schemas.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Arc::new(LocalFileStorage::new(&config.storage));
        let schemas = Arc::new(config.schema_provider()?);
        Ok(Self::new(
            config,
            storage,
            Arc::new(InMemoryTaskStore::new()),
            schemas,
        ))
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    fn normalize_options(&self, options: &ImportOptions) -> NormalizeOptions {
        NormalizeOptions::list_mode(
            options
                .treat_tabular_as_list
                .unwrap_or(self.treat_tabular_as_list),
        )
    }

    fn normalizer(&self) -> Normalizer<'_> {
        Normalizer::new(self.storage.as_ref(), &self.settings)
    }

    pub async fn import_files(
        &self,
        project_id: u64,
        files: &[IncomingFile],
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let start = Instant::now();
        let schema = self.schemas.fields_of(project_id)?;
        let (ids, could_be_tasks_list) =
            self.uploader
                .create_file_uploads(options.user_id, project_id, files)?;
        let batch = self.normalize_uploads(project_id, &schema, &ids, options)?;
        let report = self
            .finish(project_id, batch, ids, could_be_tasks_list, options, start)
            .await?;
        tracing::info!(project_id, tasks = report.task_count, "imported files");
        Ok(report)
    }

    pub async fn import_directory(
        &self,
        project_id: u64,
        dir: &Path,
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let start = Instant::now();
        let schema = self.schemas.fields_of(project_id)?;
        let (ids, could_be_tasks_list) = self.uploader.upload_directory(
            options.user_id,
            project_id,
            dir,
            &self.exclude_globs,
        )?;
        let batch = self.normalize_uploads(project_id, &schema, &ids, options)?;
        let report = self
            .finish(project_id, batch, ids, could_be_tasks_list, options, start)
            .await?;
        tracing::info!(project_id, tasks = report.task_count, dir = %dir.display(), "imported directory");
        Ok(report)
    }

    /// Tasks posted as JSON. No uploads are created.
    pub async fn import_inline(
        &self,
        project_id: u64,
        payload: Value,
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let start = Instant::now();
        let schema = self.schemas.fields_of(project_id)?;
        let tasks = self.normalizer().from_inline_payload(payload, &schema)?;
        let batch = IngestionBatch {
            tasks,
            ..IngestionBatch::default()
        };
        let report = self
            .finish(project_id, batch, Vec::new(), false, options, start)
            .await?;
        tracing::info!(project_id, tasks = report.task_count, "imported inline payload");
        Ok(report)
    }

    /// Raw request body variant of [`ImportService::import_inline`].
    pub async fn import_inline_bytes(
        &self,
        project_id: u64,
        body: &[u8],
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let start = Instant::now();
        let schema = self.schemas.fields_of(project_id)?;
        let tasks = self.normalizer().from_inline_bytes(body, &schema)?;
        let batch = IngestionBatch {
            tasks,
            ..IngestionBatch::default()
        };
        self.finish(project_id, batch, Vec::new(), false, options, start)
            .await
    }

    /// Re-reads previously uploaded files and replaces the tasks they
    /// produced, in one store call. No ids gives an all-zero report.
    pub async fn reimport(
        &self,
        project_id: u64,
        file_upload_ids: &[u64],
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        if file_upload_ids.is_empty() {
            return Ok(ImportReport {
                annotation_count: Some(0),
                prediction_count: Some(0),
                ..ImportReport::default()
            });
        }
        let start = Instant::now();
        let schema = self.schemas.fields_of(project_id)?;
        let uploads = self
            .uploader
            .registry()
            .list(project_id, Some(file_upload_ids));
        let batch =
            self.normalizer()
                .load_tasks_from_files(&uploads, &schema, &self.normalize_options(options))?;

        let task_ids = self
            .tasks
            .replace_for_file_uploads(project_id, file_upload_ids, &batch.tasks)
            .await?;
        tracing::info!(project_id, tasks = task_ids.len(), "reimported file uploads");

        Ok(ImportReport {
            task_count: task_ids.len(),
            annotation_count: Some(count_nested(&batch.tasks, "annotations")),
            prediction_count: Some(count_nested(&batch.tasks, "predictions")),
            duration: start.elapsed().as_secs_f64(),
            file_upload_ids: file_upload_ids.to_vec(),
            could_be_tasks_list: false,
            found_formats: batch.format_counts,
            data_columns: batch.common_fields.into_iter().collect(),
            task_ids: options.return_task_ids.then_some(task_ids),
            tasks: batch.tasks,
        })
    }

    fn normalize_uploads(
        &self,
        project_id: u64,
        schema: &TargetSchema,
        ids: &[u64],
        options: &ImportOptions,
    ) -> Result<IngestionBatch> {
        let uploads = self.uploader.registry().list(project_id, Some(ids));
        Ok(self
            .normalizer()
            .normalize(&uploads, schema, &self.normalize_options(options))?)
    }

    async fn finish(
        &self,
        project_id: u64,
        batch: IngestionBatch,
        file_upload_ids: Vec<u64>,
        could_be_tasks_list: bool,
        options: &ImportOptions,
        start: Instant,
    ) -> Result<ImportReport> {
        let (annotation_count, prediction_count, task_ids) = if options.commit {
            let ids = self.tasks.bulk_create(project_id, &batch.tasks).await?;
            (
                Some(count_nested(&batch.tasks, "annotations")),
                Some(count_nested(&batch.tasks, "predictions")),
                Some(ids),
            )
        } else {
            (None, None, None)
        };

        Ok(ImportReport {
            task_count: batch.tasks.len(),
            annotation_count,
            prediction_count,
            duration: start.elapsed().as_secs_f64(),
            file_upload_ids,
            could_be_tasks_list,
            found_formats: batch.format_counts,
            data_columns: batch.common_fields.into_iter().collect(),
            task_ids: task_ids.filter(|_| options.return_task_ids),
            tasks: batch.tasks,
        })
    }
}
