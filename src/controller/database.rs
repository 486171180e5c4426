//! Database backend reconciliation and readiness

use tracing::{debug, error, info, instrument, warn};

use crate::config::HealthCheckSettings;
use crate::crd::Database;
use crate::error::{Error, Result};

use super::applier::{Applier, Descriptor, SpecStore, MARIADB_DESCRIPTORS};
use super::decision::{apply_normalized, decide, resolve_backend, BackendDecision, DatabasePlan};
use super::params::{DbConnection, DspaParams};
use super::probe::{probe_with_timeout, ConnectionProbe, ProbeError};

/// Materialize the resources for the chosen backend and persist an implicit
/// choice as an explicit one.
///
/// Applies stop at the first failure. Resources applied before it stay in
/// place and are re-applied on the next reconcile.
#[instrument(skip_all, fields(namespace = %params.namespace, dspa_name = %params.name))]
pub async fn reconcile_database(
    database: Option<&Database>,
    params: &DspaParams,
    applier: &dyn Applier,
    store: &dyn SpecStore,
) -> Result<DatabasePlan> {
    let plan = decide(database, &params.maria_db);

    match plan.decision {
        BackendDecision::UseExternal => {
            if plan.needs_credential_provisioning {
                warn!("externalDB has no passwordSecret, connecting without a password");
            }
            info!("Using externalDB, bypassing database deployment.");
            return Ok(plan);
        }
        BackendDecision::SkipManaged => {
            info!("No externalDB detected, and mariaDB disabled. Skipping application of DB resources");
            return Ok(plan);
        }
        BackendDecision::DeployManaged => {}
    }

    if plan.needs_credential_provisioning {
        apply_descriptor(applier, params, Descriptor::DatabaseSecret).await?;
    }

    info!("Applying mariaDB resources.");
    for descriptor in MARIADB_DESCRIPTORS {
        apply_descriptor(applier, params, descriptor).await?;
    }

    if let Some(normalized) = &plan.normalized {
        let observed = database.and_then(|db| db.maria_db.as_ref());
        if observed != Some(normalized) {
            let updated = apply_normalized(database, normalized.clone());
            store.persist_database(&updated).await.map_err(|e| {
                error!("Failed to persist normalized database spec: {}", e);
                Error::PersistFailure(Box::new(e))
            })?;
            info!("Recorded default mariaDB deployment in spec.database");
        }
    }

    info!("Finished applying Database Resources");
    Ok(plan)
}

async fn apply_descriptor(
    applier: &dyn Applier,
    params: &DspaParams,
    descriptor: Descriptor,
) -> Result<()> {
    debug!("Applying {}", descriptor);
    applier
        .apply(Some(&params.owner), descriptor)
        .await
        .map_err(|e| {
            error!("Failed to apply {}: {}", descriptor, e);
            Error::ApplyFailure {
                descriptor: descriptor.key(),
                source: Box::new(e),
            }
        })
}

/// Outcome of a readiness evaluation
#[derive(Debug)]
pub enum Readiness {
    /// The liveness query succeeded within the timeout
    Available,
    /// Health checking is disabled; the database is assumed available
    HealthCheckSkipped,
    /// The probe timed out or failed to connect or query
    Unavailable(ProbeError),
}

impl Readiness {
    pub fn is_available(&self) -> bool {
        !matches!(self, Readiness::Unavailable(_))
    }
}

/// Decide whether the database is ready for use.
///
/// `Err` is terminal for this evaluation (unsupported backend, undecodable
/// credential); probe failures are reported as [`Readiness::Unavailable`].
pub async fn check_database_readiness(
    database: Option<&Database>,
    connection: &DbConnection,
    settings: HealthCheckSettings,
    probe: &dyn ConnectionProbe,
) -> Result<Readiness> {
    let disabled_on_spec = database.map(|db| db.disable_health_check).unwrap_or(false);
    if settings.disabled || disabled_on_spec {
        debug!("Database health check disabled, assuming database is available and ready.");
        return Ok(Readiness::HealthCheckSkipped);
    }

    info!("Performing Database Health Check");
    if let Err(e) = resolve_backend(database) {
        error!("{}", e);
        return Err(e);
    }

    let params = connection.decode()?;
    debug!("Database health check connection timeout: {:?}", settings.timeout);

    match probe_with_timeout(probe, &params, settings.timeout).await {
        Ok(()) => {
            info!("Database Health Check Successful");
            Ok(Readiness::Available)
        }
        Err(e) => {
            info!("Unable to connect to Database: {}", e);
            Ok(Readiness::Unavailable(e))
        }
    }
}
