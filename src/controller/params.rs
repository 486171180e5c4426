//! Values resolved from a DSPA before reconciliation
//!
//! Names, defaults and the owner reference are computed once per reconcile
//! so that every step sees the same view of the object.

use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::warn;

use crate::config::OperatorConfig;
use crate::crd::{DataSciencePipelinesApplication, Database, MariaDb, SecretKeyValue};
use crate::error::{Error, Result};

/// Port the managed MariaDB listens on
pub const MARIADB_PORT: i32 = 3306;

/// Key under which the provisioned secret stores the password
pub const DEFAULT_PASSWORD_KEY: &str = "password";

#[derive(Debug, Clone)]
pub struct DspaParams {
    pub name: String,
    pub namespace: String,
    pub owner: OwnerReference,
    /// Managed database settings with every default resolved
    pub maria_db: MariaDb,
    pub mariadb_image: String,
}

impl DspaParams {
    pub fn new(dspa: &DataSciencePipelinesApplication, config: &OperatorConfig) -> Self {
        let name = dspa.name_any();
        let namespace = dspa.namespace().unwrap_or_else(|| "default".to_string());

        let mut maria_db = dspa
            .spec
            .database
            .as_ref()
            .and_then(|db| db.maria_db.clone())
            .unwrap_or_default();
        if maria_db.password_secret.is_none() {
            maria_db.password_secret = Some(SecretKeyValue {
                name: default_secret_name(&name),
                key: DEFAULT_PASSWORD_KEY.to_string(),
            });
        }
        let mariadb_image = maria_db
            .image
            .clone()
            .unwrap_or_else(|| config.mariadb_image.clone());

        Self {
            owner: owner_reference(dspa),
            name,
            namespace,
            maria_db,
            mariadb_image,
        }
    }

    pub fn resource_name(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.name)
    }

    pub fn mariadb_name(&self) -> String {
        self.resource_name("mariadb")
    }

    pub fn mariadb_host(&self) -> String {
        format!("{}.{}.svc.cluster.local", self.mariadb_name(), self.namespace)
    }

    /// Secret holding the managed database password
    pub fn password_secret(&self) -> SecretKeyValue {
        self.maria_db.password_secret.clone().unwrap_or_else(|| SecretKeyValue {
            name: default_secret_name(&self.name),
            key: DEFAULT_PASSWORD_KEY.to_string(),
        })
    }

    pub fn standard_labels(&self, component: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), self.resource_name(component)),
            ("component".to_string(), "data-science-pipelines".to_string()),
            ("dspa".to_string(), self.name.clone()),
            (
                "app.kubernetes.io/managed-by".to_string(),
                "pipelines-operator".to_string(),
            ),
        ])
    }

    /// Connection details for the configured backend, password still base64-encoded.
    ///
    /// External databases win over the managed one, matching the decision
    /// precedence.
    pub fn db_connection(&self, database: Option<&Database>, password_b64: String) -> DbConnection {
        match database.and_then(|db| db.external_db.as_ref()) {
            Some(ext) => DbConnection {
                host: ext.host.clone(),
                port: ext.port.clone(),
                username: ext.username.clone(),
                password: password_b64,
                db_name: ext.pipeline_db_name.clone(),
            },
            None => DbConnection {
                host: self.mariadb_host(),
                port: MARIADB_PORT.to_string(),
                username: self.maria_db.username.clone(),
                password: password_b64,
                db_name: self.maria_db.pipeline_db_name.clone(),
            },
        }
    }

    /// The secret reference the active backend reads its password from
    pub fn credential_ref(&self, database: Option<&Database>) -> Option<SecretKeyValue> {
        match database.and_then(|db| db.external_db.as_ref()) {
            Some(ext) => ext.password_secret.clone(),
            None => Some(self.password_secret()),
        }
    }
}

fn default_secret_name(dspa_name: &str) -> String {
    format!("ds-pipeline-db-{}", dspa_name)
}

pub fn owner_reference(dspa: &DataSciencePipelinesApplication) -> OwnerReference {
    OwnerReference {
        api_version: DataSciencePipelinesApplication::api_version(&()).to_string(),
        kind: DataSciencePipelinesApplication::kind(&()).to_string(),
        name: dspa.name_any(),
        uid: dspa.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Connection parameters as they sit at rest: the password is base64-encoded
#[derive(Clone, PartialEq, Eq)]
pub struct DbConnection {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub db_name: String,
}

impl DbConnection {
    /// Decode the password for use. Invalid base64 or a non-UTF-8 password is
    /// an error rather than a substituted value.
    pub fn decode(&self) -> Result<ConnectionParams> {
        let raw = STANDARD.decode(self.password.trim())?;
        Ok(ConnectionParams {
            host: self.host.clone(),
            port: self.port.clone(),
            username: self.username.clone(),
            password: String::from_utf8(raw)?,
            db_name: self.db_name.clone(),
        })
    }
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("db_name", &self.db_name)
            .finish()
    }
}

/// Decoded connection parameters, alive for a single probe
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub db_name: String,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("db_name", &self.db_name)
            .finish()
    }
}

/// Read the active backend's password secret and build the connection.
///
/// A missing secret yields an empty password; the probe then reports the
/// database unavailable instead of failing the reconcile.
pub async fn resolve_connection(
    client: &Client,
    params: &DspaParams,
    database: Option<&Database>,
) -> Result<DbConnection> {
    let password_b64 = match params.credential_ref(database) {
        Some(secret_ref) => {
            let api: Api<Secret> = Api::namespaced(client.clone(), &params.namespace);
            match api.get_opt(&secret_ref.name).await.map_err(Error::KubeError)? {
                Some(secret) => secret
                    .data
                    .as_ref()
                    .and_then(|d| d.get(&secret_ref.key))
                    .map(|v| STANDARD.encode(&v.0))
                    .unwrap_or_default(),
                None => {
                    warn!(
                        "Database password secret {}/{} not found",
                        params.namespace, secret_ref.name
                    );
                    String::new()
                }
            }
        }
        None => String::new(),
    };
    Ok(params.db_connection(database, password_b64))
}
