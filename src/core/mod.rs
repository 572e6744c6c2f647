//! Error types shared by the API layer.

pub mod error;

pub use error::{ApiError, ApiResult, Operation, Resource, StorageContext};
