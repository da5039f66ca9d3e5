//! In-memory [`TaskStore`] implementation for testing and embedding.
//!
//! All state sits behind one `RwLock`; every batch operation holds the write
//! lock for its whole duration, so a batch is never partially visible.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Task;

use super::{StoredTask, TaskStore};

#[derive(Default)]
struct Inner {
    next_id: u64,
    tasks: Vec<StoredTask>,
}

impl Inner {
    fn insert(&mut self, project_id: u64, tasks: &[Task]) -> Vec<u64> {
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            self.next_id += 1;
            ids.push(self.next_id);
            self.tasks.push(StoredTask {
                id: self.next_id,
                project_id,
                task: task.clone(),
            });
        }
        ids
    }
}

/// In-memory task store.
#[derive(Default)]
pub struct InMemoryTaskStore {
    inner: RwLock<Inner>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn bulk_create(&self, project_id: u64, tasks: &[Task]) -> Result<Vec<u64>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.insert(project_id, tasks))
    }

    async fn replace_for_file_uploads(
        &self,
        project_id: u64,
        file_upload_ids: &[u64],
        tasks: &[Task],
    ) -> Result<Vec<u64>> {
        let mut inner = self.inner.write().unwrap();
        inner.tasks.retain(|stored| {
            stored.project_id != project_id
                || !stored
                    .task
                    .file_upload_id
                    .is_some_and(|id| file_upload_ids.contains(&id))
        });
        Ok(inner.insert(project_id, tasks))
    }

    async fn tasks_for_project(&self, project_id: u64) -> Result<Vec<StoredTask>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn count(&self, project_id: u64) -> Result<usize> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .count())
    }
}
