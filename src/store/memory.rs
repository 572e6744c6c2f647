use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ActionStore, ProjectStore, StoreError, StoreResult};
use crate::model::{Action, ActionChanges, Id, NewAction, Project, ProjectFields};

/// Process-local store. Records live as long as the server does.
#[derive(Default)]
pub struct MemoryStore {
    projects: DashMap<Id, Project>,
    actions: DashMap<Id, Action>,
    project_seq: AtomicU64,
    action_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids start at 1 and are never handed out twice.
    fn next_id(seq: &AtomicU64) -> Id {
        seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn sorted<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> Id,
{
    items.sort_by_key(key);
    items
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn projects(&self) -> StoreResult<Vec<Project>> {
        let projects: Vec<Project> = self.projects.iter().map(|e| e.value().clone()).collect();
        Ok(sorted(projects, |p| p.id))
    }

    async fn project(&self, id: Id) -> StoreResult<Option<Project>> {
        Ok(self.projects.get(&id).map(|p| p.clone()))
    }

    async fn insert_project(&self, fields: ProjectFields) -> StoreResult<Project> {
        let project = fields.into_project(Self::next_id(&self.project_seq));
        self.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        id: Id,
        fields: ProjectFields,
    ) -> StoreResult<Option<Project>> {
        Ok(self.projects.get_mut(&id).map(|mut entry| {
            *entry = fields.into_project(id);
            entry.clone()
        }))
    }

    async fn remove_project(&self, id: Id) -> StoreResult<bool> {
        Ok(self.projects.remove(&id).is_some())
    }

    async fn project_actions(&self, project_id: Id) -> StoreResult<Vec<Action>> {
        let actions: Vec<Action> = self
            .actions
            .iter()
            .filter(|e| e.project_id == project_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(sorted(actions, |a| a.id))
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn actions(&self) -> StoreResult<Vec<Action>> {
        let actions: Vec<Action> = self.actions.iter().map(|e| e.value().clone()).collect();
        Ok(sorted(actions, |a| a.id))
    }

    async fn action(&self, id: Id) -> StoreResult<Option<Action>> {
        Ok(self.actions.get(&id).map(|a| a.clone()))
    }

    async fn insert_action(&self, action: NewAction) -> StoreResult<Action> {
        // the project entry stays locked until the action is in, so a
        // concurrent remove_project lands either before or after the insert
        let Some(_project) = self.projects.get(&action.project_id) else {
            return Err(StoreError::Constraint(format!(
                "project {} does not exist",
                action.project_id
            )));
        };

        let action = action.into_action(Self::next_id(&self.action_seq));
        self.actions.insert(action.id, action.clone());
        Ok(action)
    }

    async fn update_action(&self, id: Id, changes: ActionChanges) -> StoreResult<Option<Action>> {
        Ok(self.actions.get_mut(&id).map(|mut entry| {
            changes.apply(&mut entry);
            entry.clone()
        }))
    }

    async fn remove_action(&self, id: Id) -> StoreResult<bool> {
        Ok(self.actions.remove(&id).is_some())
    }
}
