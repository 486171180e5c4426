//! Controller module for DataSciencePipelinesApplication reconciliation
//!
//! This module contains the main controller loop, the database backend
//! decision, resource provisioning, and the database health check.

pub mod applier;
pub mod common;
pub mod conditions;
pub mod database;
pub mod decision;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod params;
pub mod probe;
mod reconciler;
pub mod resources;


pub use applier::{Applier, Descriptor, KubeApplier, KubeSpecStore, SpecStore};
pub use database::{check_database_readiness, reconcile_database, Readiness};
pub use decision::{decide, BackendDecision, DatabasePlan};
pub use params::{ConnectionParams, DbConnection, DspaParams};
pub use probe::{probe_with_timeout, ConnectionProbe, MySqlProbe, ProbeError};
pub use reconciler::{run_controller, ControllerState, DSPA_FINALIZER};
