//! Main reconciler for DataSciencePipelinesApplication resources

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::{
    api::{Api, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::crd::{DataSciencePipelinesApplication, DataSciencePipelinesApplicationStatus};
use crate::error::{Error, Result};

use super::applier::{KubeApplier, KubeSpecStore};
use super::common::{cleanup_common, reconcile_common};
use super::conditions::{self, CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, DATABASE_AVAILABLE};
use super::database::{check_database_readiness, reconcile_database, Readiness};
use super::params::{resolve_connection, DspaParams};
use super::probe::ConnectionProbe;

pub const DSPA_FINALIZER: &str = "datasciencepipelinesapplications.opendatahub.io/finalizer";

const CONTROLLER_NAME: &str = "dspa";
const REQUEUE_READY: Duration = Duration::from_secs(300);
const REQUEUE_NOT_READY: Duration = Duration::from_secs(30);
const REQUEUE_ON_ERROR: Duration = Duration::from_secs(30);

/// Shared state for the controller
pub struct ControllerState {
    /// Kubernetes client for API interactions
    pub client: Client,
    pub config: OperatorConfig,
    /// Strategy used for database health checks
    pub probe: Arc<dyn ConnectionProbe>,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let dspas: Api<DataSciencePipelinesApplication> = Api::all(client.clone());

    info!("Starting DataSciencePipelinesApplication controller");

    match dspas.list(&Default::default()).await {
        Ok(_) => info!("DataSciencePipelinesApplication CRD is available"),
        Err(e) => {
            error!("DataSciencePipelinesApplication CRD not found: {:?}", e);
            return Err(Error::ConfigError(
                "DataSciencePipelinesApplication CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(dspas, Config::default())
        .owns::<Deployment>(Api::all(client.clone()), Config::default())
        .owns::<Service>(Api::all(client.clone()), Config::default())
        .owns::<PersistentVolumeClaim>(Api::all(client.clone()), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!("Reconciled DataSciencePipelinesApplication: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(dspa, ctx), fields(name = %dspa.name_any(), namespace = ?dspa.namespace()))]
async fn reconcile(
    dspa: Arc<DataSciencePipelinesApplication>,
    ctx: Arc<ControllerState>,
) -> Result<Action> {
    let started = Instant::now();
    let namespace = dspa.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<DataSciencePipelinesApplication> = Api::namespaced(ctx.client.clone(), &namespace);

    let result = finalizer(&api, DSPA_FINALIZER, dspa, |event| async {
        match event {
            FinalizerEvent::Apply(dspa) => apply_dspa(&dspa, &ctx).await,
            FinalizerEvent::Cleanup(dspa) => cleanup_dspa(&dspa, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(e.to_string()));

    #[cfg(feature = "metrics")]
    super::metrics::observe_reconcile_duration_seconds(
        CONTROLLER_NAME,
        started.elapsed().as_secs_f64(),
    );
    #[cfg(not(feature = "metrics"))]
    let _ = started;

    result
}

async fn apply_dspa(dspa: &DataSciencePipelinesApplication, ctx: &ControllerState) -> Result<Action> {
    let client = ctx.client.clone();
    let params = DspaParams::new(dspa, &ctx.config);
    info!(
        "Reconciling DataSciencePipelinesApplication {}/{}",
        params.namespace, params.name
    );

    if let Err(e) = dspa.spec.validate() {
        warn!("Validation failed for {}/{}: {}", params.namespace, params.name, e);
        let mut status = dspa.status.clone().unwrap_or_default();
        conditions::set_condition(
            &mut status.conditions,
            DATABASE_AVAILABLE,
            CONDITION_STATUS_FALSE,
            "ValidationFailed",
            &e,
            dspa.metadata.generation,
        );
        patch_status(&client, &params, &status).await?;
        return Err(Error::ConfigError(e));
    }

    let applier = KubeApplier::new(client.clone(), params.clone());
    let store = KubeSpecStore::new(client.clone(), &params.namespace, &params.name);

    reconcile_common(&params, &applier).await?;

    let plan = reconcile_database(dspa.spec.database.as_ref(), &params, &applier, &store).await?;
    let database = match &plan.normalized {
        Some(normalized) => Some(super::decision::apply_normalized(
            dspa.spec.database.as_ref(),
            normalized.clone(),
        )),
        None => dspa.spec.database.clone(),
    };

    let connection = resolve_connection(&client, &params, database.as_ref()).await?;
    let probe_started = Instant::now();
    let readiness = check_database_readiness(
        database.as_ref(),
        &connection,
        ctx.config.health_check(),
        ctx.probe.as_ref(),
    )
    .await?;
    #[cfg(feature = "metrics")]
    {
        super::metrics::observe_probe_duration_seconds(probe_started.elapsed().as_secs_f64());
        super::metrics::set_database_available(
            &params.namespace,
            &params.name,
            plan.decision.as_status(),
            readiness.is_available(),
        );
    }
    #[cfg(not(feature = "metrics"))]
    let _ = probe_started;

    let mut status = dspa.status.clone().unwrap_or_default();
    status.database_backend = Some(plan.decision.as_status().to_string());
    let (condition_status, reason, message) = match &readiness {
        Readiness::Available => (
            CONDITION_STATUS_TRUE,
            "DatabaseAvailable",
            "Database connectivity successfully verified".to_string(),
        ),
        Readiness::HealthCheckSkipped => (
            CONDITION_STATUS_TRUE,
            "HealthCheckDisabled",
            "Database health check disabled, assuming database is available".to_string(),
        ),
        Readiness::Unavailable(e) => (
            CONDITION_STATUS_FALSE,
            "DatabaseUnavailable",
            format!("Could not connect to database: {}", e),
        ),
    };
    conditions::set_condition(
        &mut status.conditions,
        DATABASE_AVAILABLE,
        condition_status,
        reason,
        &message,
        dspa.metadata.generation,
    );
    patch_status(&client, &params, &status).await?;

    if readiness.is_available() {
        Ok(Action::requeue(REQUEUE_READY))
    } else {
        Ok(Action::requeue(REQUEUE_NOT_READY))
    }
}

async fn cleanup_dspa(dspa: &DataSciencePipelinesApplication, ctx: &ControllerState) -> Result<Action> {
    let params = DspaParams::new(dspa, &ctx.config);
    info!(
        "Cleaning up DataSciencePipelinesApplication {}/{}",
        params.namespace, params.name
    );
    #[cfg(feature = "metrics")]
    super::metrics::clear_database_available(&params.namespace, &params.name);
    let applier = KubeApplier::new(ctx.client.clone(), params);
    cleanup_common(&applier).await?;
    Ok(Action::await_change())
}

async fn patch_status(
    client: &Client,
    params: &DspaParams,
    status: &DataSciencePipelinesApplicationStatus,
) -> Result<()> {
    let api: Api<DataSciencePipelinesApplication> =
        Api::namespaced(client.clone(), &params.namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&params.name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

fn error_policy(
    dspa: Arc<DataSciencePipelinesApplication>,
    error: &Error,
    _ctx: Arc<ControllerState>,
) -> Action {
    error!(
        namespace = %dspa.namespace().unwrap_or_default(),
        dspa_name = %dspa.name_any(),
        "Reconciliation error: {}",
        error
    );
    #[cfg(feature = "metrics")]
    super::metrics::inc_reconcile_error(CONTROLLER_NAME, error.kind());
    Action::requeue(REQUEUE_ON_ERROR)
}
