//! TOML configuration.
//!
//! Every section is optional; a missing section takes its defaults. Label
//! configs are given per project, either inline or as a path:
//!
//! ```toml
//! [limits]
//! max_task_count = 1000000
//!
//! [storage]
//! media_root = "./media"
//!
//! [projects.7]
//! label_config = '<View><Text name="text" value="$text"/></View>'
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use task_intake_core::normalize::{
    IngestSettings, Limits, DATA_UNDEFINED_NAME, DEFAULT_MAX_TASK_COUNT,
    DEFAULT_MAX_TOTAL_FILE_BYTES, DEFAULT_SUPPORTED_EXTENSIONS,
};
use task_intake_core::reconcile::KeyPolicy;
use task_intake_core::schema::{StaticSchemaProvider, TargetSchema};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub reconcile: KeyPolicy,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_task_count")]
    pub max_task_count: usize,
    #[serde(default = "default_max_total_file_bytes")]
    pub max_total_file_bytes: u64,
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_task_count: default_max_task_count(),
            max_total_file_bytes: default_max_total_file_bytes(),
            supported_extensions: default_supported_extensions(),
        }
    }
}

fn default_max_task_count() -> usize {
    DEFAULT_MAX_TASK_COUNT
}
fn default_max_total_file_bytes() -> u64 {
    DEFAULT_MAX_TOTAL_FILE_BYTES
}
fn default_supported_extensions() -> Vec<String> {
    DEFAULT_SUPPORTED_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    /// Prepended to public URLs when the app is served under a sub-path.
    #[serde(default)]
    pub script_name: String,
    #[serde(default)]
    pub cloud_storage_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_root: default_media_root(),
            upload_dir: default_upload_dir(),
            url_prefix: default_url_prefix(),
            script_name: String::new(),
            cloud_storage_enabled: false,
        }
    }
}

fn default_media_root() -> PathBuf {
    PathBuf::from("./media")
}
fn default_upload_dir() -> String {
    "upload".to_string()
}
fn default_url_prefix() -> String {
    "/data".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_true")]
    pub treat_tabular_as_list: bool,
    #[serde(default)]
    pub svg_security_cleanup: bool,
    #[serde(default = "default_undefined_field")]
    pub undefined_field: String,
    /// Globs (relative to the uploaded directory) left out of directory imports.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            treat_tabular_as_list: true,
            svg_security_cleanup: false,
            undefined_field: default_undefined_field(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_undefined_field() -> String {
    DATA_UNDEFINED_NAME.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub label_config: Option<String>,
    #[serde(default)]
    pub label_config_path: Option<PathBuf>,
}

impl ProjectConfig {
    /// The label config XML, read from disk when given as a path.
    pub fn label_config_text(&self) -> Result<String> {
        match (&self.label_config, &self.label_config_path) {
            (Some(xml), None) => Ok(xml.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read label config: {}", path.display())),
            _ => anyhow::bail!("exactly one of label_config or label_config_path must be set"),
        }
    }
}

impl LimitsConfig {
    pub fn to_limits(&self) -> Limits {
        Limits {
            max_task_count: self.max_task_count,
            max_total_file_bytes: self.max_total_file_bytes,
            supported_extensions: self
                .supported_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Config {
    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            limits: self.limits.to_limits(),
            policy: self.reconcile.clone(),
            undefined_field: self.import.undefined_field.clone(),
            cloud_storage_enabled: self.storage.cloud_storage_enabled,
        }
    }

    /// Parses every project's label config.
    pub fn schema_provider(&self) -> Result<StaticSchemaProvider> {
        let mut provider = StaticSchemaProvider::new();
        for (key, project) in &self.projects {
            let id = parse_project_id(key)?;
            let xml = project
                .label_config_text()
                .with_context(|| format!("projects.{}", key))?;
            let schema = TargetSchema::from_label_config(&xml)
                .with_context(|| format!("projects.{}: invalid label config", key))?;
            provider.insert(id, schema);
        }
        Ok(provider)
    }
}

fn parse_project_id(key: &str) -> Result<u64> {
    key.parse::<u64>()
        .with_context(|| format!("project id must be a number, got '{}'", key))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate limits
    if config.limits.max_task_count == 0 {
        anyhow::bail!("limits.max_task_count must be > 0");
    }
    if config.limits.max_total_file_bytes == 0 {
        anyhow::bail!("limits.max_total_file_bytes must be > 0");
    }
    if let Some(bad) = config
        .limits
        .supported_extensions
        .iter()
        .find(|e| !e.starts_with('.'))
    {
        anyhow::bail!("limits.supported_extensions entries must start with '.', got '{}'", bad);
    }

    // Validate storage
    if config.storage.upload_dir.trim().is_empty() {
        anyhow::bail!("storage.upload_dir must not be empty");
    }

    // Validate import
    if config.import.undefined_field.is_empty() {
        anyhow::bail!("import.undefined_field must not be empty");
    }
    for pattern in &config.import.exclude_globs {
        globset::Glob::new(pattern)
            .with_context(|| format!("Invalid import.exclude_globs pattern: {}", pattern))?;
    }

    // Validate projects
    for (key, project) in &config.projects {
        parse_project_id(key)?;
        if project.label_config.is_some() == project.label_config_path.is_some() {
            anyhow::bail!(
                "projects.{}: exactly one of label_config or label_config_path must be set",
                key
            );
        }
    }

    Ok(config)
}
