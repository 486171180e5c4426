//! Error types for the pipelines operator

use thiserror::Error;

/// Errors surfaced by reconciliation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The database section names no backend this operator understands.
    /// Only reachable when upstream validation let an invalid spec through.
    #[error("Could not connect to Database: Unsupported Type")]
    UnsupportedDatabaseType,

    #[error("failed to apply {descriptor}: {source}")]
    ApplyFailure {
        descriptor: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to persist normalized database spec: {0}")]
    PersistFailure(#[source] Box<Error>),

    #[error("database password is not valid base64: {0}")]
    CredentialDecode(#[from] base64::DecodeError),

    #[error("database password is not valid UTF-8: {0}")]
    CredentialEncoding(#[from] std::string::FromUtf8Error),

    #[error("Finalizer error: {0}")]
    FinalizerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Short label used for the reconcile error metric
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::UnsupportedDatabaseType => "unsupported_database",
            Error::ApplyFailure { .. } => "apply",
            Error::PersistFailure(_) => "persist",
            Error::CredentialDecode(_) | Error::CredentialEncoding(_) => "credential_decode",
            Error::FinalizerError(_) => "finalizer",
            Error::ConfigError(_) => "config",
            Error::SerializationError(_) => "serialization",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
