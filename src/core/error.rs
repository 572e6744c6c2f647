//! Errors surfaced to API clients.
//!
//! Every failure a handler can produce ends up as one of these variants, and
//! the variant alone decides the status code and the `{"error": ...}` body.

use std::fmt;

use http::StatusCode;

/// The resource a handler was working on, used to word storage failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Projects,
    Actions,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Projects => write!(f, "projects"),
            Resource::Actions => write!(f, "actions"),
        }
    }
}

/// What the failed store call was trying to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Retrieve,
    Save,
    Update,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Retrieve => write!(f, "retrieved"),
            Operation::Save => write!(f, "saved"),
            Operation::Update => write!(f, "updated"),
            Operation::Remove => write!(f, "removed"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    /// A required body field is missing or empty
    Validation(&'static str),

    /// No record matches the id in the path
    NotFound(&'static str),

    /// The store call itself failed
    Storage(Resource, Operation),
}

impl ApiError {
    pub fn project_fields_missing() -> Self {
        ApiError::Validation("Name and description must be included")
    }

    pub fn action_fields_missing() -> Self {
        ApiError::Validation("Description must be included")
    }

    pub fn no_project() -> Self {
        ApiError::NotFound("No project by that id")
    }

    pub fn no_action() -> Self {
        ApiError::NotFound("No action by that id")
    }

    pub fn action_not_deleted() -> Self {
        ApiError::NotFound("The actions information could not be deleted.")
    }

    /// Validation failures answer 404 rather than 400; existing clients
    /// depend on it.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Validation(msg) | ApiError::NotFound(msg) => msg.to_string(),
            ApiError::Storage(resource, operation) => {
                format!("The {resource} information could not be {operation}.")
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Turns a failed store call into the client-facing storage error, logging
/// the underlying cause.
pub trait StorageContext<T> {
    fn or_storage(self, resource: Resource, operation: Operation) -> ApiResult<T>;
}

impl<T, E> StorageContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn or_storage(self, resource: Resource, operation: Operation) -> ApiResult<T> {
        self.map_err(|e| {
            log::error!("Store call on {resource} failed ({operation}): {e}");
            ApiError::Storage(resource, operation)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_messages() {
        let err = ApiError::Storage(Resource::Projects, Operation::Retrieve);
        assert_eq!(
            err.message(),
            "The projects information could not be retrieved."
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = ApiError::Storage(Resource::Actions, Operation::Remove);
        assert_eq!(err.message(), "The actions information could not be removed.");
    }

    #[test]
    fn test_validation_keeps_not_found_status() {
        assert_eq!(
            ApiError::project_fields_missing().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::no_project().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_or_storage() {
        let failed: Result<(), &str> = Err("disk on fire");
        assert_eq!(
            failed.or_storage(Resource::Actions, Operation::Save),
            Err(ApiError::Storage(Resource::Actions, Operation::Save))
        );

        let ok: Result<u8, &str> = Ok(1);
        assert_eq!(ok.or_storage(Resource::Actions, Operation::Save), Ok(1));
    }
}
