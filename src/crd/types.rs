//! Shared types for the pipelines CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default database user for a managed MariaDB
pub const DEFAULT_DB_USERNAME: &str = "mlpipeline";

/// Default database name for pipeline metadata
pub const DEFAULT_DB_NAME: &str = "mlpipeline";

/// Default size of the managed MariaDB volume
pub const DEFAULT_PVC_SIZE: &str = "10Gi";

/// Reference to a single key inside a Kubernetes Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyValue {
    pub name: String,
    pub key: String,
}

/// Database backing the pipelines API server.
///
/// At most one of `mariaDB` and `externalDB` may be set. When neither is
/// set the operator deploys a MariaDB and records that choice here.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Operator-managed MariaDB
    #[serde(rename = "mariaDB", default, skip_serializing_if = "Option::is_none")]
    pub maria_db: Option<MariaDb>,

    /// Externally operated MySQL-compatible database
    #[serde(rename = "externalDB", default, skip_serializing_if = "Option::is_none")]
    pub external_db: Option<ExternalDb>,

    /// Skip the connectivity check before reporting the database available
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_health_check: bool,
}

/// Operator-managed MariaDB configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MariaDb {
    /// Deploy the MariaDB resources. Set to false to keep the section but
    /// stop managing the database.
    #[serde(default = "default_deploy")]
    pub deploy: bool,

    /// Container image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(rename = "pipelineDBName", default = "default_db_name")]
    pub pipeline_db_name: String,

    #[serde(default = "default_pvc_size")]
    pub pvc_size: String,

    /// Existing secret holding the database password. When omitted the
    /// operator provisions one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyValue>,
}

impl Default for MariaDb {
    fn default() -> Self {
        Self {
            deploy: default_deploy(),
            image: None,
            username: default_username(),
            pipeline_db_name: default_db_name(),
            pvc_size: default_pvc_size(),
            password_secret: None,
        }
    }
}

/// Connection details for an externally operated database
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDb {
    pub host: String,
    pub port: String,
    pub username: String,
    #[serde(rename = "pipelineDBName")]
    pub pipeline_db_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyValue>,
}

fn default_deploy() -> bool {
    true
}

fn default_username() -> String {
    DEFAULT_DB_USERNAME.to_string()
}

fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

fn default_pvc_size() -> String {
    DEFAULT_PVC_SIZE.to_string()
}

/// Kubernetes-style status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// True, False, or Unknown
    pub status: String,
    pub last_transition_time: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
