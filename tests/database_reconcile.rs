//! End-to-end database reconciliation through the public controller API.
//!
//! Kubernetes and MySQL are replaced by in-memory fakes so every scenario
//! runs without a cluster: the applier records descriptors, the spec store
//! keeps the last persisted database section, and the probe records the
//! decoded connection it was handed.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use pipelines_operator::config::{HealthCheckSettings, OperatorConfig};
use pipelines_operator::controller::{
    check_database_readiness, reconcile_database, Applier, BackendDecision, ConnectionParams,
    ConnectionProbe, Descriptor, DspaParams, ProbeError, Readiness, SpecStore,
};
use pipelines_operator::crd::{
    DataSciencePipelinesApplication, DataSciencePipelinesApplicationSpec, Database, ExternalDb,
    MariaDb, SecretKeyValue,
};
use pipelines_operator::Result;

#[derive(Default)]
struct FakeCluster {
    applied: Mutex<Vec<Descriptor>>,
    persisted: Mutex<Option<Database>>,
}

#[async_trait]
impl Applier for FakeCluster {
    async fn apply(&self, _owner: Option<&OwnerReference>, descriptor: Descriptor) -> Result<()> {
        self.applied.lock().unwrap().push(descriptor);
        Ok(())
    }

    async fn delete(&self, _descriptor: Descriptor) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SpecStore for FakeCluster {
    async fn persist_database(&self, database: &Database) -> Result<()> {
        *self.persisted.lock().unwrap() = Some(database.clone());
        Ok(())
    }
}

impl FakeCluster {
    fn take_applied(&self) -> Vec<Descriptor> {
        std::mem::take(&mut *self.applied.lock().unwrap())
    }
}

/// Records every connection it is handed; optionally stalls before answering
#[derive(Default)]
struct RecordingProbe {
    seen: Mutex<Vec<ConnectionParams>>,
    stall: Option<Duration>,
}

impl RecordingProbe {
    fn stalling(stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Default::default()
        }
    }

    fn targets(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|p| format!("{}:{}", p.host, p.port))
            .collect()
    }
}

#[async_trait]
impl ConnectionProbe for RecordingProbe {
    async fn probe(&self, params: &ConnectionParams) -> Result<(), ProbeError> {
        self.seen.lock().unwrap().push(params.clone());
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        Ok(())
    }
}

fn dspa(database: Option<Database>) -> DataSciencePipelinesApplication {
    DataSciencePipelinesApplication {
        metadata: ObjectMeta {
            name: Some("sample".to_string()),
            namespace: Some("team-a".to_string()),
            uid: Some("3f1c".to_string()),
            ..Default::default()
        },
        spec: DataSciencePipelinesApplicationSpec { database },
        status: None,
    }
}

fn health_check() -> HealthCheckSettings {
    HealthCheckSettings {
        disabled: false,
        timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn empty_spec_deploys_mariadb_and_converges() {
    let config = OperatorConfig::default();
    let cluster = FakeCluster::default();
    let probe = RecordingProbe::default();

    // First reconcile: nothing configured.
    let first = dspa(None);
    let params = DspaParams::new(&first, &config);
    let plan = reconcile_database(None, &params, &cluster, &cluster)
        .await
        .unwrap();

    assert_eq!(plan.decision, BackendDecision::DeployManaged);
    assert_eq!(
        cluster.take_applied(),
        vec![
            Descriptor::DatabaseSecret,
            Descriptor::MariaDbDeployment,
            Descriptor::MariaDbPvc,
            Descriptor::MariaDbService,
            Descriptor::MariaDbServiceAccount,
        ]
    );
    let persisted = cluster
        .persisted
        .lock()
        .unwrap()
        .take()
        .expect("normalized spec persisted");
    let maria = persisted.maria_db.clone().unwrap();
    assert!(maria.deploy);
    assert_eq!(maria.username, "mlpipeline");
    assert_eq!(maria.pipeline_db_name, "mlpipeline");

    let connection = params.db_connection(Some(&persisted), STANDARD.encode("generated"));
    let readiness = check_database_readiness(Some(&persisted), &connection, health_check(), &probe)
        .await
        .unwrap();
    assert!(matches!(readiness, Readiness::Available));
    assert_eq!(
        probe.targets(),
        vec!["mariadb-sample.team-a.svc.cluster.local:3306".to_string()]
    );

    // Second reconcile observes the persisted spec.
    let second = dspa(Some(persisted.clone()));
    let params = DspaParams::new(&second, &config);
    let plan = reconcile_database(Some(&persisted), &params, &cluster, &cluster)
        .await
        .unwrap();

    assert_eq!(plan.decision, BackendDecision::DeployManaged);
    assert!(!plan.needs_credential_provisioning);
    assert_eq!(cluster.take_applied().len(), 4);
    assert!(cluster.persisted.lock().unwrap().is_none());
}

#[tokio::test]
async fn external_database_is_probed_and_nothing_deployed() {
    let database = Database {
        external_db: Some(ExternalDb {
            host: "mysql.example.com".to_string(),
            port: "3307".to_string(),
            username: "pipelines".to_string(),
            pipeline_db_name: "kfp".to_string(),
            password_secret: Some(SecretKeyValue {
                name: "ext-db".to_string(),
                key: "password".to_string(),
            }),
        }),
        ..Default::default()
    };
    let resource = dspa(Some(database.clone()));
    let params = DspaParams::new(&resource, &OperatorConfig::default());
    let cluster = FakeCluster::default();
    let probe = RecordingProbe::default();

    let plan = reconcile_database(Some(&database), &params, &cluster, &cluster)
        .await
        .unwrap();

    assert_eq!(plan.decision, BackendDecision::UseExternal);
    assert_eq!(plan.decision.as_status(), "External");
    assert!(cluster.take_applied().is_empty());
    assert!(cluster.persisted.lock().unwrap().is_none());

    let settings = OperatorConfig::default().health_check();
    assert_eq!(settings.timeout, Duration::from_secs(15));

    let connection = params.db_connection(Some(&database), STANDARD.encode("s3cret"));
    let readiness = check_database_readiness(Some(&database), &connection, settings, &probe)
        .await
        .unwrap();
    assert!(readiness.is_available());

    let seen = probe.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].host, "mysql.example.com");
    assert_eq!(seen[0].port, "3307");
    assert_eq!(seen[0].username, "pipelines");
    assert_eq!(seen[0].db_name, "kfp");
    assert_eq!(seen[0].password, "s3cret");
}

#[tokio::test(start_paused = true)]
async fn external_database_check_is_bounded_by_default_timeout() {
    let database = Database {
        external_db: Some(ExternalDb {
            host: "mysql.example.com".to_string(),
            port: "3306".to_string(),
            username: "pipelines".to_string(),
            pipeline_db_name: "kfp".to_string(),
            password_secret: None,
        }),
        ..Default::default()
    };
    let resource = dspa(Some(database.clone()));
    let params = DspaParams::new(&resource, &OperatorConfig::default());
    let connection = params.db_connection(Some(&database), STANDARD.encode("s3cret"));
    let settings = OperatorConfig::default().health_check();

    // Answers after 10s: inside the default bound.
    let slow = RecordingProbe::stalling(Duration::from_secs(10));
    let readiness = check_database_readiness(Some(&database), &connection, settings, &slow)
        .await
        .unwrap();
    assert!(matches!(readiness, Readiness::Available));

    // Answers after 20s: past it.
    let stuck = RecordingProbe::stalling(Duration::from_secs(20));
    let readiness = check_database_readiness(Some(&database), &connection, settings, &stuck)
        .await
        .unwrap();
    assert!(matches!(
        readiness,
        Readiness::Unavailable(ProbeError::Timeout(d)) if d == Duration::from_secs(15)
    ));
}

#[tokio::test]
async fn disabled_mariadb_deploys_nothing() {
    let database = Database {
        maria_db: Some(MariaDb {
            deploy: false,
            ..Default::default()
        }),
        ..Default::default()
    };
    let resource = dspa(Some(database.clone()));
    let params = DspaParams::new(&resource, &OperatorConfig::default());
    let cluster = FakeCluster::default();

    let plan = reconcile_database(Some(&database), &params, &cluster, &cluster)
        .await
        .unwrap();

    assert_eq!(plan.decision, BackendDecision::SkipManaged);
    assert_eq!(plan.decision.as_status(), "None");
    assert!(cluster.take_applied().is_empty());
    assert!(cluster.persisted.lock().unwrap().is_none());
}

#[tokio::test]
async fn operator_wide_disable_skips_every_backend() {
    let probe = RecordingProbe::default();
    let settings = HealthCheckSettings {
        disabled: true,
        timeout: Duration::from_secs(2),
    };
    let resource = dspa(None);
    let params = DspaParams::new(&resource, &OperatorConfig::default());
    let connection = params.db_connection(None, String::new());

    let readiness = check_database_readiness(None, &connection, settings, &probe)
        .await
        .unwrap();

    assert!(matches!(readiness, Readiness::HealthCheckSkipped));
    assert!(probe.targets().is_empty());
}
