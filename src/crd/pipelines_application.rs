//! DataSciencePipelinesApplication Custom Resource Definition
//!
//! A DSPA describes one pipelines deployment in a namespace. This operator
//! owns the `database` section: it picks the backend, provisions it when
//! managed, and reports whether it is reachable.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, Database};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "datasciencepipelinesapplications.opendatahub.io",
    version = "v1alpha1",
    kind = "DataSciencePipelinesApplication",
    namespaced,
    status = "DataSciencePipelinesApplicationStatus",
    shortname = "dspa",
    printcolumn = r#"{"name":"Database","type":"string","jsonPath":".status.databaseBackend"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataSciencePipelinesApplicationSpec {
    /// Database configuration. Omit to let the operator deploy MariaDB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<Database>,
}

impl DataSciencePipelinesApplicationSpec {
    /// Reject specs that name both database backends
    pub fn validate(&self) -> Result<(), String> {
        if let Some(db) = &self.database {
            if db.maria_db.is_some() && db.external_db.is_some() {
                return Err(
                    "database.mariaDB and database.externalDB are mutually exclusive".to_string(),
                );
            }
            if let Some(ext) = &db.external_db {
                if ext.host.trim().is_empty() {
                    return Err("database.externalDB.host must not be empty".to_string());
                }
                if ext.port.parse::<u16>().is_err() {
                    return Err(format!(
                        "database.externalDB.port must be a valid port, got {:?}",
                        ext.port
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Status subresource for DataSciencePipelinesApplication
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataSciencePipelinesApplicationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Backend chosen on the last reconcile (External, MariaDB, or None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_backend: Option<String>,
}

impl DataSciencePipelinesApplicationStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
