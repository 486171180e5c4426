//! Custom Resource Definitions for the pipelines operator
//!
//! This module defines the Kubernetes CRDs reconciled by the operator.

mod pipelines_application;
mod types;

pub use pipelines_application::{
    DataSciencePipelinesApplication, DataSciencePipelinesApplicationSpec,
    DataSciencePipelinesApplicationStatus,
};
pub use types::*;
