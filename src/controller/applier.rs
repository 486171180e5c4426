//! Resource application seams
//!
//! The reconcile logic talks to the cluster only through [`Applier`] and
//! [`SpecStore`], so it can be driven by in-memory fakes in tests.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    client::Client,
    Resource,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::crd::{DataSciencePipelinesApplication, Database};
use crate::error::{Error, Result};

use super::params::DspaParams;
use super::resources;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "pipelines-operator";

const GENERATED_PASSWORD_LEN: usize = 16;

/// Named resource descriptors this operator applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Descriptor {
    DatabaseSecret,
    MariaDbDeployment,
    MariaDbPvc,
    MariaDbService,
    MariaDbServiceAccount,
    CommonPolicy,
    MlmdEnvoyDashboardAccessPolicy,
    /// Cluster-scoped; applied without an owner and deleted on teardown
    ClusterRoleBinding,
}

/// Managed MariaDB resources, applied after the credential secret
pub const MARIADB_DESCRIPTORS: [Descriptor; 4] = [
    Descriptor::MariaDbDeployment,
    Descriptor::MariaDbPvc,
    Descriptor::MariaDbService,
    Descriptor::MariaDbServiceAccount,
];

/// Owner-scoped descriptors applied on every reconcile
pub const COMMON_DESCRIPTORS: [Descriptor; 2] = [
    Descriptor::CommonPolicy,
    Descriptor::MlmdEnvoyDashboardAccessPolicy,
];

impl Descriptor {
    pub const fn key(self) -> &'static str {
        match self {
            Descriptor::DatabaseSecret => "mariadb/secret.yaml.tmpl",
            Descriptor::MariaDbDeployment => "mariadb/deployment.yaml.tmpl",
            Descriptor::MariaDbPvc => "mariadb/pvc.yaml.tmpl",
            Descriptor::MariaDbService => "mariadb/service.yaml.tmpl",
            Descriptor::MariaDbServiceAccount => "mariadb/mariadb-sa.yaml.tmpl",
            Descriptor::CommonPolicy => "common/policy.yaml.tmpl",
            Descriptor::MlmdEnvoyDashboardAccessPolicy => {
                "common/mlmd-envoy-dashboard-access-policy.yaml.tmpl"
            }
            Descriptor::ClusterRoleBinding => "common/clusterrolebinding.yaml.tmpl",
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Idempotent create/update and delete of descriptors
#[async_trait]
pub trait Applier: Send + Sync {
    /// Bring the descriptor to its desired state, owned by `owner` when given.
    /// Cluster-scoped descriptors ignore `owner`.
    async fn apply(&self, owner: Option<&OwnerReference>, descriptor: Descriptor) -> Result<()>;

    /// Remove the descriptor; deleting an absent resource succeeds
    async fn delete(&self, descriptor: Descriptor) -> Result<()>;
}

/// Write-back of the normalized database section
#[async_trait]
pub trait SpecStore: Send + Sync {
    async fn persist_database(&self, database: &Database) -> Result<()>;
}

/// [`Applier`] rendering descriptors into typed objects for one DSPA
pub struct KubeApplier {
    client: Client,
    params: DspaParams,
}

impl KubeApplier {
    pub fn new(client: Client, params: DspaParams) -> Self {
        Self { client, params }
    }

    fn namespaced<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.params.namespace)
    }

    /// The credential secret is only ever created so the stored password stays stable
    async fn ensure_db_secret(&self, owner: Option<&OwnerReference>) -> Result<()> {
        let api: Api<Secret> = self.namespaced();
        let secret_ref = self.params.password_secret();
        if api.get_opt(&secret_ref.name).await?.is_some() {
            debug!("Secret {}/{} already exists", self.params.namespace, secret_ref.name);
            return Ok(());
        }

        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_PASSWORD_LEN)
            .map(char::from)
            .collect();
        let secret = resources::build_db_secret(&self.params, owner, &password);

        info!("Creating Secret {}/{}", self.params.namespace, secret_ref.name);
        api.create(&PostParams::default(), &secret).await?;
        Ok(())
    }
}

#[async_trait]
impl Applier for KubeApplier {
    async fn apply(&self, owner: Option<&OwnerReference>, descriptor: Descriptor) -> Result<()> {
        let p = &self.params;
        match descriptor {
            Descriptor::DatabaseSecret => self.ensure_db_secret(owner).await,
            Descriptor::MariaDbDeployment => {
                let api: Api<Deployment> = self.namespaced();
                server_side_apply(&api, &resources::build_mariadb_deployment(p, owner)).await
            }
            Descriptor::MariaDbPvc => {
                let api: Api<PersistentVolumeClaim> = self.namespaced();
                server_side_apply(&api, &resources::build_mariadb_pvc(p, owner)).await
            }
            Descriptor::MariaDbService => {
                let api: Api<Service> = self.namespaced();
                server_side_apply(&api, &resources::build_mariadb_service(p, owner)).await
            }
            Descriptor::MariaDbServiceAccount => {
                let api: Api<ServiceAccount> = self.namespaced();
                server_side_apply(&api, &resources::build_mariadb_service_account(p, owner)).await
            }
            Descriptor::CommonPolicy => {
                let api: Api<NetworkPolicy> = self.namespaced();
                server_side_apply(&api, &resources::build_common_policy(p, owner)).await
            }
            Descriptor::MlmdEnvoyDashboardAccessPolicy => {
                let api: Api<NetworkPolicy> = self.namespaced();
                server_side_apply(&api, &resources::build_envoy_dashboard_policy(p, owner)).await
            }
            Descriptor::ClusterRoleBinding => {
                let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
                server_side_apply(&api, &resources::build_cluster_role_binding(p)).await
            }
        }
    }

    async fn delete(&self, descriptor: Descriptor) -> Result<()> {
        let name = resources::descriptor_name(&self.params, descriptor);
        match descriptor {
            Descriptor::DatabaseSecret => delete_if_exists(&self.namespaced::<Secret>(), &name).await,
            Descriptor::MariaDbDeployment => {
                delete_if_exists(&self.namespaced::<Deployment>(), &name).await
            }
            Descriptor::MariaDbPvc => {
                delete_if_exists(&self.namespaced::<PersistentVolumeClaim>(), &name).await
            }
            Descriptor::MariaDbService => delete_if_exists(&self.namespaced::<Service>(), &name).await,
            Descriptor::MariaDbServiceAccount => {
                delete_if_exists(&self.namespaced::<ServiceAccount>(), &name).await
            }
            Descriptor::CommonPolicy | Descriptor::MlmdEnvoyDashboardAccessPolicy => {
                delete_if_exists(&self.namespaced::<NetworkPolicy>(), &name).await
            }
            Descriptor::ClusterRoleBinding => {
                let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
                delete_if_exists(&api, &name).await
            }
        }
    }
}

async fn server_side_apply<K>(api: &Api<K>, obj: &K) -> Result<()>
where
    K: Resource + Clone + Serialize + DeserializeOwned + fmt::Debug,
{
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::ConfigError("rendered resource has no name".to_string()))?;
    api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(obj))
        .await
        .map_err(Error::KubeError)?;
    debug!("Applied {}", name);
    Ok(())
}

async fn delete_if_exists<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!("Deleted {}", name);
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// [`SpecStore`] merge-patching `spec.database` on the DSPA
pub struct KubeSpecStore {
    api: Api<DataSciencePipelinesApplication>,
    name: String,
}

impl KubeSpecStore {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl SpecStore for KubeSpecStore {
    async fn persist_database(&self, database: &Database) -> Result<()> {
        let patch = serde_json::json!({
            "spec": {
                "database": database
            }
        });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }
}
