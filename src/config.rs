//! Operator configuration
//!
//! Every tunable can be set with a flag or the matching environment
//! variable; unset values fall back to the documented defaults.

use std::time::Duration;

use clap::Parser;

/// Default timeout for one database health probe
pub const DEFAULT_DB_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Image used for the managed MariaDB when the DSPA does not override it
pub const DEFAULT_MARIADB_IMAGE: &str = "registry.redhat.io/rhel8/mariadb-103:1";

#[derive(Parser, Debug, Clone)]
#[command(name = "pipelines-operator", version, about = "Data Science Pipelines database operator")]
pub struct OperatorConfig {
    /// Report databases as available without probing them
    #[arg(long, env = "DB_HEALTH_CHECK_DISABLED")]
    pub disable_database_health_check: bool,

    /// Upper bound for one database health probe (e.g. "15s", "500ms")
    #[arg(
        long,
        env = "DB_CONNECTION_TIMEOUT",
        default_value = "15s",
        value_parser = humantime::parse_duration
    )]
    pub db_connection_timeout: Duration,

    /// Image for operator-managed MariaDB deployments
    #[arg(long, env = "IMAGES_MARIADB", default_value = DEFAULT_MARIADB_IMAGE)]
    pub mariadb_image: String,

    /// Port for the health and metrics endpoints
    #[arg(long, env = "REST_API_PORT", default_value_t = 8080)]
    pub api_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            disable_database_health_check: false,
            db_connection_timeout: DEFAULT_DB_CONNECTION_TIMEOUT,
            mariadb_image: DEFAULT_MARIADB_IMAGE.to_string(),
            api_port: 8080,
        }
    }
}

impl OperatorConfig {
    /// The subset consumed by the readiness check
    pub fn health_check(&self) -> HealthCheckSettings {
        HealthCheckSettings {
            disabled: self.disable_database_health_check,
            timeout: self.db_connection_timeout,
        }
    }
}

/// Readiness tunables resolved for one reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckSettings {
    pub disabled: bool,
    pub timeout: Duration,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            timeout: DEFAULT_DB_CONNECTION_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let cfg = OperatorConfig::try_parse_from(["pipelines-operator"]).unwrap();
        assert!(!cfg.disable_database_health_check);
        assert_eq!(cfg.db_connection_timeout, DEFAULT_DB_CONNECTION_TIMEOUT);
        assert_eq!(cfg.mariadb_image, DEFAULT_MARIADB_IMAGE);
    }

    #[test]
    fn test_parses_human_durations() {
        let cfg = OperatorConfig::try_parse_from([
            "pipelines-operator",
            "--db-connection-timeout",
            "750ms",
            "--disable-database-health-check",
        ])
        .unwrap();
        assert_eq!(cfg.db_connection_timeout, Duration::from_millis(750));
        assert_eq!(
            cfg.health_check(),
            HealthCheckSettings {
                disabled: true,
                timeout: Duration::from_millis(750),
            }
        );
    }

    #[test]
    fn test_rejects_invalid_duration() {
        assert!(OperatorConfig::try_parse_from([
            "pipelines-operator",
            "--db-connection-timeout",
            "soon",
        ])
        .is_err());
    }
}
