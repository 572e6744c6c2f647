//! Records exchanged with the store and payloads accepted by the API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use validator::Validate;

/// Identifier assigned by the store on insert.
pub type Id = u64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: Id,
    pub project_id: Id,
    pub description: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub completed: bool,
}

/// Mutable fields of a project, written as a whole on insert and update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectFields {
    pub name: String,
    pub description: String,
}

impl ProjectFields {
    pub fn into_project(self, id: Id) -> Project {
        Project {
            id,
            name: self.name,
            description: self.description,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAction {
    pub project_id: Id,
    pub description: String,
    pub notes: String,
    pub completed: bool,
}

impl NewAction {
    pub fn into_action(self, id: Id) -> Action {
        Action {
            id,
            project_id: self.project_id,
            description: self.description,
            notes: self.notes,
            completed: self.completed,
        }
    }
}

/// Replacement fields for an existing action.
///
/// `completed: None` keeps whatever flag the stored action already has.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionChanges {
    pub description: String,
    pub notes: String,
    pub completed: Option<bool>,
}

impl ActionChanges {
    pub fn apply(self, action: &mut Action) {
        action.description = self.description;
        action.notes = self.notes;
        if let Some(completed) = self.completed {
            action.completed = completed;
        }
    }
}

/// Reads a text field from a loosely typed client: strings as they are,
/// non-zero numbers and `true` as their text. Anything else is absent.
fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    })
}

/// Booleans as they are, numbers as non-zero. Anything else is absent.
fn loose_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Some(flag),
        Value::Number(n) => Some(n.as_f64() != Some(0.0)),
        _ => None,
    })
}

/// Body of `POST /api/projects` and `PUT /api/projects/{id}`.
///
/// Each field is decoded on its own, so a badly typed field never hides the
/// others. Missing fields are `None`; [`Validate`] rejects them along with
/// empty strings. Convert only after validation succeeded.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProjectPayload {
    #[serde(default, deserialize_with = "loose_text")]
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    #[validate(required, length(min = 1))]
    pub description: Option<String>,
}

impl ProjectPayload {
    pub fn into_fields(self) -> ProjectFields {
        ProjectFields {
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
        }
    }
}

/// Body of `POST /api/projects/{id}/actions` and `PUT /api/actions/{id}`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ActionPayload {
    #[serde(default, deserialize_with = "loose_text")]
    #[validate(required, length(min = 1))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "loose_flag")]
    pub completed: Option<bool>,
}

impl ActionPayload {
    pub fn into_new_action(self, project_id: Id) -> NewAction {
        NewAction {
            project_id,
            description: self.description.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
            completed: self.completed.unwrap_or(false),
        }
    }

    pub fn into_changes(self) -> ActionChanges {
        ActionChanges {
            description: self.description.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
            completed: self.completed,
        }
    }
}
