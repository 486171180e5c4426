//! Database backend selection
//!
//! Pure logic: no I/O, no mutation of the observed spec. The caller applies
//! resources and persists `normalized` based on the returned plan.

use crate::crd::{Database, MariaDb};
use crate::error::{Error, Result};

/// Which database backend a reconcile acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendDecision {
    /// An external database is configured; nothing is deployed
    UseExternal,
    /// Deploy (or keep deploying) the managed MariaDB
    DeployManaged,
    /// The managed section exists with `deploy: false`
    SkipManaged,
}

impl BackendDecision {
    pub const ALL: [BackendDecision; 3] = [
        BackendDecision::UseExternal,
        BackendDecision::DeployManaged,
        BackendDecision::SkipManaged,
    ];

    /// Value reported in `status.databaseBackend`
    pub fn as_status(&self) -> &'static str {
        match self {
            BackendDecision::UseExternal => "External",
            BackendDecision::DeployManaged => "MariaDB",
            BackendDecision::SkipManaged => "None",
        }
    }
}

/// Outcome of [`decide`]
#[derive(Debug, Clone, PartialEq)]
pub struct DatabasePlan {
    pub decision: BackendDecision,
    /// A password secret must be provisioned before the managed resources
    pub needs_credential_provisioning: bool,
    /// Explicit managed section to write back when the spec left the choice implicit
    pub normalized: Option<MariaDb>,
}

impl DatabasePlan {
    pub fn needs_managed_deploy(&self) -> bool {
        self.decision == BackendDecision::DeployManaged
    }
}

/// Pick the backend for `database`.
///
/// External always takes precedence. Without an external section, a missing
/// or empty database section defaults to a managed MariaDB built from
/// `managed_defaults`, which also becomes the normalized value.
pub fn decide(database: Option<&Database>, managed_defaults: &MariaDb) -> DatabasePlan {
    let external = database.and_then(|db| db.external_db.as_ref());
    let managed = database.and_then(|db| db.maria_db.as_ref());

    if let Some(ext) = external {
        return DatabasePlan {
            decision: BackendDecision::UseExternal,
            needs_credential_provisioning: ext.password_secret.is_none(),
            normalized: None,
        };
    }

    match managed {
        Some(maria) if maria.deploy => DatabasePlan {
            decision: BackendDecision::DeployManaged,
            needs_credential_provisioning: maria.password_secret.is_none(),
            normalized: None,
        },
        Some(_) => DatabasePlan {
            decision: BackendDecision::SkipManaged,
            needs_credential_provisioning: false,
            normalized: None,
        },
        None => DatabasePlan {
            decision: BackendDecision::DeployManaged,
            needs_credential_provisioning: true,
            normalized: Some(MariaDb {
                deploy: true,
                ..managed_defaults.clone()
            }),
        },
    }
}

/// Backend kind a readiness probe should target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    External,
    Managed,
}

/// Resolve which backend to probe.
///
/// A present database section naming neither backend has not been
/// normalized yet and is reported as unsupported rather than guessed.
pub fn resolve_backend(database: Option<&Database>) -> Result<BackendKind> {
    match database {
        None => Ok(BackendKind::Managed),
        Some(db) if db.external_db.is_some() => Ok(BackendKind::External),
        Some(db) if db.maria_db.is_some() => Ok(BackendKind::Managed),
        Some(_) => Err(Error::UnsupportedDatabaseType),
    }
}

/// Apply a normalized managed section to `database`, keeping its other fields
pub fn apply_normalized(database: Option<&Database>, normalized: MariaDb) -> Database {
    let mut db = database.cloned().unwrap_or_default();
    db.maria_db = Some(normalized);
    db
}
