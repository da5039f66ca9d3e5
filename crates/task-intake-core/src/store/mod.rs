//! Task storage abstraction.
//!
//! The [`TaskStore`] trait receives normalized task batches for bulk
//! insertion. Each call is all-or-nothing: a backend either persists the
//! whole batch and returns the assigned identifiers, or persists nothing.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Task;

/// A task as persisted by a store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredTask {
    pub id: u64,
    pub project_id: u64,
    #[serde(flatten)]
    pub task: Task,
}

/// Abstract task backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`bulk_create`](TaskStore::bulk_create) | Insert a batch, returning new ids |
/// | [`replace_for_file_uploads`](TaskStore::replace_for_file_uploads) | Drop tasks derived from uploads and insert a batch |
/// | [`tasks_for_project`](TaskStore::tasks_for_project) | List a project's tasks in insertion order |
/// | [`count`](TaskStore::count) | Number of tasks in a project |
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn bulk_create(&self, project_id: u64, tasks: &[Task]) -> Result<Vec<u64>>;

    /// Removes every task of `project_id` whose provenance is one of
    /// `file_upload_ids`, then inserts `tasks`, as one unit.
    async fn replace_for_file_uploads(
        &self,
        project_id: u64,
        file_upload_ids: &[u64],
        tasks: &[Task],
    ) -> Result<Vec<u64>>;

    async fn tasks_for_project(&self, project_id: u64) -> Result<Vec<StoredTask>>;

    async fn count(&self, project_id: u64) -> Result<usize>;
}
