//! Persistence collaborators for projects and actions.
//!
//! Handlers only see the [`ProjectStore`] and [`ActionStore`] traits. A miss
//! on an id is reported as `Ok(None)` or `Ok(false)`; `Err` always means the
//! backend itself failed.

use std::fmt;

use async_trait::async_trait;

use crate::model::{Action, ActionChanges, Id, NewAction, Project, ProjectFields};

pub mod etcd;
pub mod memory;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;

#[derive(Debug)]
pub enum StoreError {
    /// The backend could not be reached
    Connection(String),

    /// etcd rejected or failed a request
    Etcd(etcd_client::Error),

    /// A stored record could not be encoded or decoded
    Codec(serde_json::Error),

    /// The write would leave a dangling reference
    Constraint(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "Connection error: {msg}"),
            StoreError::Etcd(err) => write!(f, "etcd error: {err}"),
            StoreError::Codec(err) => write!(f, "Record codec error: {err}"),
            StoreError::Constraint(msg) => write!(f, "Constraint violated: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Etcd(err) => Some(err),
            StoreError::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<etcd_client::Error> for StoreError {
    fn from(err: etcd_client::Error) -> Self {
        StoreError::Etcd(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn projects(&self) -> StoreResult<Vec<Project>>;

    async fn project(&self, id: Id) -> StoreResult<Option<Project>>;

    async fn insert_project(&self, fields: ProjectFields) -> StoreResult<Project>;

    /// Replaces name and description, returning `None` when `id` is unknown.
    async fn update_project(&self, id: Id, fields: ProjectFields)
        -> StoreResult<Option<Project>>;

    /// Returns whether a project was removed. Its actions are left in place.
    async fn remove_project(&self, id: Id) -> StoreResult<bool>;

    /// Actions belonging to `project_id`, empty when the project is unknown.
    async fn project_actions(&self, project_id: Id) -> StoreResult<Vec<Action>>;
}

#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn actions(&self) -> StoreResult<Vec<Action>>;

    async fn action(&self, id: Id) -> StoreResult<Option<Action>>;

    /// Fails with [`StoreError::Constraint`] when the project does not exist.
    async fn insert_action(&self, action: NewAction) -> StoreResult<Action>;

    async fn update_action(&self, id: Id, changes: ActionChanges) -> StoreResult<Option<Action>>;

    async fn remove_action(&self, id: Id) -> StoreResult<bool>;
}
