use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, ConnectOptions, GetOptions, Txn, TxnOp};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use super::{ActionStore, ProjectStore, StoreError, StoreResult};
use crate::{
    config::Etcd,
    model::{Action, ActionChanges, Id, NewAction, Project, ProjectFields},
};

const PROJECTS: &str = "projects";
const ACTIONS: &str = "actions";
const SEQUENCE: &str = "sequence";

/// Stores records as JSON values under the configured key prefix:
///
/// ```text
/// <prefix>/projects/<id>
/// <prefix>/actions/<id>
/// <prefix>/sequence        written once per insert, its revision is the new id
/// ```
pub struct EtcdStore {
    config: Etcd,
    client: Mutex<Option<Client>>,
}

impl EtcdStore {
    pub fn new(config: Etcd) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    async fn create_client(&self) -> StoreResult<Client> {
        let mut options = ConnectOptions::default();
        if let Some(timeout) = self.config.timeout {
            options = options.with_timeout(Duration::from_secs(timeout as u64));
        };
        if let Some(connect_timeout) = self.config.connect_timeout {
            options = options.with_connect_timeout(Duration::from_secs(connect_timeout as u64));
        };
        if let (Some(user), Some(password)) = (&self.config.user, &self.config.password) {
            options = options.with_user(user.clone(), password.clone());
        };

        Ok(Client::connect(self.config.host.clone(), Some(options)).await?)
    }

    /// Returns a handle to the shared client, connecting first if needed.
    async fn client(&self) -> StoreResult<Client> {
        let mut client_guard = self.client.lock().await;

        if client_guard.is_none() {
            log::info!("Creating new etcd client...");
            *client_guard = Some(self.create_client().await?);
        }

        client_guard
            .clone()
            .ok_or_else(|| StoreError::Connection("Etcd client is not initialized".to_string()))
    }

    /// Drops the shared client after a failed call so the next one reconnects.
    async fn checked<T>(&self, result: Result<T, etcd_client::Error>) -> StoreResult<T> {
        if let Err(err) = &result {
            log::error!("etcd request failed: {err}");
        }
        if result.is_err() {
            *self.client.lock().await = None;
        }
        Ok(result?)
    }

    fn base(&self) -> &str {
        self.config.prefix.trim_end_matches('/')
    }

    fn record_key(&self, kind: &str, id: Id) -> String {
        format!("{}/{kind}/{id}", self.base())
    }

    fn kind_prefix(&self, kind: &str) -> String {
        format!("{}/{kind}/", self.base())
    }

    fn sequence_key(&self) -> String {
        format!("{}/{SEQUENCE}", self.base())
    }

    async fn get_record<T>(&self, kind: &str, id: Id) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        Ok(self
            .get_revisioned(kind, id)
            .await?
            .map(|(record, _)| record))
    }

    /// The record together with the revision it was last written at.
    async fn get_revisioned<T>(&self, kind: &str, id: Id) -> StoreResult<Option<(T, i64)>>
    where
        T: DeserializeOwned + Send,
    {
        let mut client = self.client().await?;
        let response = self
            .checked(client.get(self.record_key(kind, id), None).await)
            .await?;

        match response.kvs().first() {
            Some(kv) => Ok(Some((
                serde_json::from_slice(kv.value())?,
                kv.mod_revision(),
            ))),
            None => Ok(None),
        }
    }

    async fn list_records<T>(&self, kind: &str) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut client = self.client().await?;
        let options = GetOptions::new().with_prefix();
        let response = self
            .checked(client.get(self.kind_prefix(kind), Some(options)).await)
            .await?;

        response
            .kvs()
            .iter()
            .map(|kv| serde_json::from_slice(kv.value()).map_err(StoreError::from))
            .collect()
    }

    async fn put_record<T>(&self, kind: &str, id: Id, record: &T) -> StoreResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_vec(record)?;
        let mut client = self.client().await?;
        self.checked(client.put(self.record_key(kind, id), value, None).await)
            .await?;
        Ok(())
    }

    /// Writes `record` in a transaction guarded by `guard`. Returns false
    /// and leaves the key untouched when the guard does not hold.
    async fn put_record_if<T>(
        &self,
        guard: Compare,
        kind: &str,
        id: Id,
        record: &T,
    ) -> StoreResult<bool>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_vec(record)?;
        let txn = Txn::new()
            .when([guard])
            .and_then([TxnOp::put(self.record_key(kind, id), value, None)]);
        let mut client = self.client().await?;
        let response = self.checked(client.txn(txn).await).await?;
        Ok(response.succeeded())
    }

    fn exists(&self, kind: &str, id: Id) -> Compare {
        Compare::version(self.record_key(kind, id), CompareOp::Greater, 0)
    }

    fn unchanged_since(&self, kind: &str, id: Id, revision: i64) -> Compare {
        Compare::mod_revision(self.record_key(kind, id), CompareOp::Equal, revision)
    }

    async fn delete_record(&self, kind: &str, id: Id) -> StoreResult<bool> {
        let mut client = self.client().await?;
        let response = self
            .checked(client.delete(self.record_key(kind, id), None).await)
            .await?;
        Ok(response.deleted() > 0)
    }

    /// Cluster-wide revisions only grow, so each write to the sequence key
    /// yields a fresh id.
    async fn next_id(&self) -> StoreResult<Id> {
        let mut client = self.client().await?;
        let response = self
            .checked(client.put(self.sequence_key(), Vec::new(), None).await)
            .await?;
        let revision = response
            .header()
            .map(|header| header.revision())
            .ok_or_else(|| StoreError::Connection("etcd response has no header".to_string()))?;
        Ok(revision as Id)
    }
}

fn by_id<T, F: Fn(&T) -> Id>(mut records: Vec<T>, key: F) -> Vec<T> {
    records.sort_by_key(key);
    records
}

#[async_trait]
impl ProjectStore for EtcdStore {
    async fn projects(&self) -> StoreResult<Vec<Project>> {
        let projects: Vec<Project> = self.list_records(PROJECTS).await?;
        Ok(by_id(projects, |p| p.id))
    }

    async fn project(&self, id: Id) -> StoreResult<Option<Project>> {
        self.get_record(PROJECTS, id).await
    }

    async fn insert_project(&self, fields: ProjectFields) -> StoreResult<Project> {
        let project = fields.into_project(self.next_id().await?);
        self.put_record(PROJECTS, project.id, &project).await?;
        Ok(project)
    }

    async fn update_project(
        &self,
        id: Id,
        fields: ProjectFields,
    ) -> StoreResult<Option<Project>> {
        let project = fields.into_project(id);
        let guard = self.exists(PROJECTS, id);
        if self.put_record_if(guard, PROJECTS, id, &project).await? {
            Ok(Some(project))
        } else {
            Ok(None)
        }
    }

    async fn remove_project(&self, id: Id) -> StoreResult<bool> {
        self.delete_record(PROJECTS, id).await
    }

    async fn project_actions(&self, project_id: Id) -> StoreResult<Vec<Action>> {
        let actions: Vec<Action> = self.list_records(ACTIONS).await?;
        let actions: Vec<Action> = actions
            .into_iter()
            .filter(|a| a.project_id == project_id)
            .collect();
        Ok(by_id(actions, |a| a.id))
    }
}

#[async_trait]
impl ActionStore for EtcdStore {
    async fn actions(&self) -> StoreResult<Vec<Action>> {
        let actions: Vec<Action> = self.list_records(ACTIONS).await?;
        Ok(by_id(actions, |a| a.id))
    }

    async fn action(&self, id: Id) -> StoreResult<Option<Action>> {
        self.get_record(ACTIONS, id).await
    }

    async fn insert_action(&self, action: NewAction) -> StoreResult<Action> {
        let guard = self.exists(PROJECTS, action.project_id);
        let action = action.into_action(self.next_id().await?);
        if self.put_record_if(guard, ACTIONS, action.id, &action).await? {
            Ok(action)
        } else {
            Err(StoreError::Constraint(format!(
                "project {} does not exist",
                action.project_id
            )))
        }
    }

    async fn update_action(&self, id: Id, changes: ActionChanges) -> StoreResult<Option<Action>> {
        // retry until the write lands on the revision it was computed from,
        // or the action is gone
        loop {
            let Some((mut action, revision)) =
                self.get_revisioned::<Action>(ACTIONS, id).await?
            else {
                return Ok(None);
            };
            changes.clone().apply(&mut action);
            let guard = self.unchanged_since(ACTIONS, id, revision);
            if self.put_record_if(guard, ACTIONS, id, &action).await? {
                return Ok(Some(action));
            }
            log::debug!("action {id} changed during update, retrying");
        }
    }

    async fn remove_action(&self, id: Id) -> StoreResult<bool> {
        self.delete_record(ACTIONS, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(prefix: &str) -> EtcdStore {
        EtcdStore::new(Etcd {
            host: vec!["127.0.0.1:2379".to_string()],
            prefix: prefix.to_string(),
            timeout: None,
            connect_timeout: None,
            user: None,
            password: None,
        })
    }

    #[test]
    fn test_key_layout() {
        let store = store("/taskboard");
        assert_eq!(store.record_key(PROJECTS, 3), "/taskboard/projects/3");
        assert_eq!(store.kind_prefix(ACTIONS), "/taskboard/actions/");
        assert_eq!(store.sequence_key(), "/taskboard/sequence");
    }

    #[test]
    fn test_key_layout_trailing_slash() {
        let store = store("/taskboard/");
        assert_eq!(store.record_key(ACTIONS, 12), "/taskboard/actions/12");
    }

    fn project_fields(name: &str) -> ProjectFields {
        ProjectFields {
            name: name.to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires a running etcd on 127.0.0.1:2379
    async fn test_guarded_writes_do_not_recreate_deleted_records() {
        let store = store("/taskboard-test-guarded");
        let project = store.insert_project(project_fields("P")).await.unwrap();
        let action = store
            .insert_action(NewAction {
                project_id: project.id,
                description: "d".to_string(),
                notes: String::new(),
                completed: false,
            })
            .await
            .unwrap();

        // a write computed before a delete must not bring the record back
        let (stale, revision) = store
            .get_revisioned::<Action>(ACTIONS, action.id)
            .await
            .unwrap()
            .unwrap();
        assert!(store.remove_action(action.id).await.unwrap());
        let guard = store.unchanged_since(ACTIONS, action.id, revision);
        assert!(!store
            .put_record_if(guard, ACTIONS, action.id, &stale)
            .await
            .unwrap());
        assert!(store.action(action.id).await.unwrap().is_none());

        assert!(store.remove_project(project.id).await.unwrap());
        assert!(store
            .update_project(project.id, project_fields("Q"))
            .await
            .unwrap()
            .is_none());
        assert!(store.project(project.id).await.unwrap().is_none());

        let orphan = store
            .insert_action(NewAction {
                project_id: project.id,
                description: "d".to_string(),
                notes: String::new(),
                completed: false,
            })
            .await;
        assert!(matches!(orphan, Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_by_id_sorts() {
        let sorted = by_id(vec![3u64, 1, 2], |n| *n);
        assert_eq!(sorted, vec![1, 2, 3]);
    }
}
