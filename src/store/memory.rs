// src/store/memory.rs
use super::{Project, ProjectStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;

/// Project store held in memory, keyed by api key.
///
/// Entries may be replaced while the proxy runs; each lookup returns a
/// snapshot of the project at that moment.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    by_key: DashMap<String, Project>,
}

impl InMemoryProjectStore {
    pub fn new(projects: impl IntoIterator<Item = Project>) -> Self {
        let store = Self::default();
        for project in projects {
            store.upsert(project);
        }
        store
    }

    /// Insert or replace a project. A project whose api key changed is
    /// removed from its old key.
    pub fn upsert(&self, project: Project) {
        self.by_key
            .retain(|key, existing| existing.project_id != project.project_id || *key == project.api_key);
        self.by_key.insert(project.api_key.clone(), project);
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Project, StoreError> {
        self.by_key
            .get(api_key)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }
}
