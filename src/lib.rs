//! Data Science Pipelines operator
//!
//! Reconciles DataSciencePipelinesApplication resources: picks the database
//! backend, provisions a managed MariaDB when needed, and reports whether
//! the database is reachable.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
#[cfg(feature = "rest-api")]
pub mod rest_api;
pub mod telemetry;

pub use error::{Error, Result};
