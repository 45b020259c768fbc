//! Project storage.
//!
//! Every read and write is filtered by owner, so a project belonging to
//! someone else is indistinguishable from one that does not exist.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::model::{Project, ProjectChanges};
use crate::error::StoreResult;

/// Owner-scoped access to projects
#[async_trait]
pub trait ProjectStore: Send + Sync + 'static {
    async fn insert(&self, project: Project) -> StoreResult<Project>;

    /// Projects owned by `user_id`, newest first
    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Project>>;

    async fn find_for_user(&self, id: Uuid, user_id: &str) -> StoreResult<Option<Project>>;

    /// `Ok(None)` when the project is missing or not owned by `user_id`
    async fn update_for_user(
        &self,
        id: Uuid,
        user_id: &str,
        changes: &ProjectChanges,
    ) -> StoreResult<Option<Project>>;

    /// `Ok(false)` when nothing matched
    async fn delete_for_user(&self, id: Uuid, user_id: &str) -> StoreResult<bool>;
}

/// Process-local project store
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<Uuid, Project>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn insert(&self, project: Project) -> StoreResult<Project> {
        self.projects.write().insert(project.id, project.clone());
        Ok(project)
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Project>> {
        let mut owned: Vec<Project> = self
            .projects
            .read()
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(owned)
    }

    async fn find_for_user(&self, id: Uuid, user_id: &str) -> StoreResult<Option<Project>> {
        Ok(self
            .projects
            .read()
            .get(&id)
            .filter(|p| p.user_id == user_id)
            .cloned())
    }

    async fn update_for_user(
        &self,
        id: Uuid,
        user_id: &str,
        changes: &ProjectChanges,
    ) -> StoreResult<Option<Project>> {
        let mut projects = self.projects.write();
        Ok(projects
            .get_mut(&id)
            .filter(|p| p.user_id == user_id)
            .map(|project| {
                project.apply(changes, Utc::now());
                project.clone()
            }))
    }

    async fn delete_for_user(&self, id: Uuid, user_id: &str) -> StoreResult<bool> {
        let mut projects = self.projects.write();
        let owned = projects.get(&id).is_some_and(|p| p.user_id == user_id);
        if owned {
            projects.remove(&id);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::model::NewProject;
    use chrono::Duration;

    fn project(user: &str, name: &str, age_secs: i64) -> Project {
        Project::create(
            NewProject {
                name: name.to_string(),
                description: None,
            },
            user,
            None,
            Utc::now() - Duration::seconds(age_secs),
        )
    }

    #[tokio::test]
    async fn test_list_is_owner_scoped_and_newest_first() {
        let store = InMemoryProjectStore::new();
        store.insert(project("u1", "old", 100)).await.unwrap();
        store.insert(project("u1", "new", 1)).await.unwrap();
        store.insert(project("u2", "other", 50)).await.unwrap();

        let names: Vec<_> = store
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_foreign_project_looks_absent() {
        let store = InMemoryProjectStore::new();
        let p = store.insert(project("u1", "mine", 0)).await.unwrap();

        assert!(store.find_for_user(p.id, "u2").await.unwrap().is_none());
        let changes = ProjectChanges {
            name: Some("hijack".into()),
            ..Default::default()
        };
        assert!(store.update_for_user(p.id, "u2", &changes).await.unwrap().is_none());
        assert!(!store.delete_for_user(p.id, "u2").await.unwrap());
        assert_eq!(store.find_for_user(p.id, "u1").await.unwrap().unwrap().name, "mine");
    }

    #[tokio::test]
    async fn test_delete_removes_once() {
        let store = InMemoryProjectStore::new();
        let p = store.insert(project("u1", "gone", 0)).await.unwrap();

        assert!(store.delete_for_user(p.id, "u1").await.unwrap());
        assert!(!store.delete_for_user(p.id, "u1").await.unwrap());
        assert!(store.is_empty());
    }
}
