//! Taskboard: a small JSON API over projects and the actions they contain.
//!
//! The HTTP layer runs on pingora; records are kept by a pluggable store
//! (in memory or in etcd).

pub mod api;
pub mod config;
pub mod core;
pub mod logging;
pub mod model;
pub mod store;
pub(crate) mod utils;
