//! Resources every DSPA gets regardless of its database backend

use tracing::info;

use crate::error::{Error, Result};

use super::applier::{Applier, Descriptor, COMMON_DESCRIPTORS};
use super::params::DspaParams;

/// Apply the owned policies, then the cluster-scoped binding without an owner.
///
/// The binding outlives garbage collection of the DSPA, so
/// [`cleanup_common`] must run on teardown.
pub async fn reconcile_common(params: &DspaParams, applier: &dyn Applier) -> Result<()> {
    info!(
        namespace = %params.namespace,
        dspa_name = %params.name,
        "Applying Common Resources"
    );
    for descriptor in COMMON_DESCRIPTORS {
        applier
            .apply(Some(&params.owner), descriptor)
            .await
            .map_err(|e| apply_failure(descriptor, e))?;
    }

    applier
        .apply(None, Descriptor::ClusterRoleBinding)
        .await
        .map_err(|e| apply_failure(Descriptor::ClusterRoleBinding, e))?;

    info!("Finished applying Common Resources");
    Ok(())
}

pub async fn cleanup_common(applier: &dyn Applier) -> Result<()> {
    applier.delete(Descriptor::ClusterRoleBinding).await
}

fn apply_failure(descriptor: Descriptor, source: Error) -> Error {
    Error::ApplyFailure {
        descriptor: descriptor.key(),
        source: Box::new(source),
    }
}
