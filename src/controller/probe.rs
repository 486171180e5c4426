//! Database connectivity probes
//!
//! A probe makes one attempt against the endpoint. Time bounds are applied
//! by [`probe_with_timeout`], which drops the in-flight attempt (and with it
//! any open connection) once the deadline passes.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use thiserror::Error;
use tracing::debug;

use super::params::ConnectionParams;

/// Statement used to confirm the server answers queries
pub const LIVENESS_QUERY: &str = "SELECT 1;";

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("database health check timed out after {0:?}")]
    Timeout(Duration),

    #[error("unable to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("database liveness query failed: {0}")]
    Query(#[source] sqlx::Error),
}

/// One connectivity check against a database endpoint
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn probe(&self, params: &ConnectionParams) -> Result<(), ProbeError>;
}

/// Probe speaking the MySQL protocol, used for both MariaDB and external databases
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlProbe;

#[async_trait]
impl ConnectionProbe for MySqlProbe {
    async fn probe(&self, params: &ConnectionParams) -> Result<(), ProbeError> {
        let options = connect_options(params)?;

        debug!(
            "Connecting to database {} at {}:{}",
            params.db_name, params.host, params.port
        );
        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(ProbeError::Connection)?;

        let result = sqlx::query(LIVENESS_QUERY).execute(&mut conn).await;
        if let Err(e) = conn.close().await {
            debug!("Error closing probe connection: {}", e);
        }
        result.map(|_| ()).map_err(ProbeError::Query)
    }
}

/// Build connect options field by field so hosts and database names are
/// taken verbatim. A non-numeric port fails before any connection attempt.
pub fn connect_options(params: &ConnectionParams) -> Result<MySqlConnectOptions, ProbeError> {
    let port: u16 = params.port.trim().parse().map_err(|_| {
        ProbeError::Connection(sqlx::Error::Configuration(
            format!("invalid port number {:?}", params.port).into(),
        ))
    })?;
    Ok(MySqlConnectOptions::new()
        .host(&params.host)
        .port(port)
        .username(&params.username)
        .password(&params.password)
        .database(&params.db_name))
}

/// Run `probe` with an upper bound of `timeout`
pub async fn probe_with_timeout(
    probe: &dyn ConnectionProbe,
    params: &ConnectionParams,
    timeout: Duration,
) -> Result<(), ProbeError> {
    match tokio::time::timeout(timeout, probe.probe(params)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn params(port: &str) -> ConnectionParams {
        ConnectionParams {
            host: "127.0.0.1".to_string(),
            port: port.to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            db_name: "pipelines".to_string(),
        }
    }

    /// Stands in for a connection handle; counts releases on drop
    struct Handle(Arc<AtomicUsize>);

    impl Drop for Handle {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct HangingProbe {
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConnectionProbe for HangingProbe {
        async fn probe(&self, _params: &ConnectionParams) -> Result<(), ProbeError> {
            let _handle = Handle(self.released.clone());
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    struct InstantProbe;

    #[async_trait]
    impl ConnectionProbe for InstantProbe {
        async fn probe(&self, _params: &ConnectionParams) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_timeout_releases_handle() {
        let released = Arc::new(AtomicUsize::new(0));
        let probe = HangingProbe {
            released: released.clone(),
        };

        let started = Instant::now();
        let result = probe_with_timeout(&probe, &params("3306"), Duration::from_millis(50)).await;

        assert!(matches!(result, Err(ProbeError::Timeout(d)) if d == Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fast_probe_succeeds() {
        let result = probe_with_timeout(&InstantProbe, &params("3306"), Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_connect_options_accept_ipv6_host() {
        let mut p = params("3306");
        p.host = "fd00::10".to_string();
        let options = connect_options(&p).unwrap();
        assert_eq!(options.get_host(), "fd00::10");
        assert_eq!(options.get_port(), 3306);
    }

    #[test]
    fn test_connect_options_keep_database_name_verbatim() {
        let mut p = params("3307");
        p.db_name = "kfp#prod".to_string();
        p.username = "user@x".to_string();
        let options = connect_options(&p).unwrap();
        assert_eq!(options.get_database(), Some("kfp#prod"));
        assert_eq!(options.get_username(), "user@x");
    }

    #[test]
    fn test_connect_options_reject_non_numeric_port() {
        let result = connect_options(&params("not-a-port"));
        assert!(matches!(result, Err(ProbeError::Connection(_))));
    }

    #[tokio::test]
    async fn test_mysql_probe_rejects_bad_port() {
        let result = MySqlProbe.probe(&params("not-a-port")).await;
        assert!(matches!(result, Err(ProbeError::Connection(_))));
    }

    #[tokio::test]
    async fn test_mysql_probe_unreachable_endpoint() {
        let result =
            probe_with_timeout(&MySqlProbe, &params("1"), Duration::from_secs(5)).await;
        assert!(result.is_err());
    }
}
