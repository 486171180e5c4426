//! Typed renderings of the operator's resource descriptors
//!
//! Builders are pure so the rendered objects can be asserted on without a
//! cluster; [`super::applier::KubeApplier`] sends them to the API server.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Secret, SecretKeySelector, Service, ServiceAccount, ServicePort,
    ServiceSpec, TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::applier::Descriptor;
use super::params::{DspaParams, MARIADB_PORT};

const MARIADB_DATA_PATH: &str = "/var/lib/mysql";
const ENVOY_PORT: i32 = 9090;

// ============================================================================
// Helpers
// ============================================================================

/// Name of the object a descriptor renders to
pub fn descriptor_name(params: &DspaParams, descriptor: Descriptor) -> String {
    match descriptor {
        Descriptor::DatabaseSecret => params.password_secret().name,
        Descriptor::MariaDbDeployment | Descriptor::MariaDbPvc | Descriptor::MariaDbService => {
            params.mariadb_name()
        }
        Descriptor::MariaDbServiceAccount => params.resource_name("ds-pipelines-mariadb-sa"),
        Descriptor::CommonPolicy => params.resource_name("ds-pipelines"),
        Descriptor::MlmdEnvoyDashboardAccessPolicy => params.resource_name("ds-pipelines-envoy"),
        Descriptor::ClusterRoleBinding => format!(
            "ds-pipeline-auth-delegator-{}-{}",
            params.namespace, params.name
        ),
    }
}

fn object_meta(
    params: &DspaParams,
    descriptor: Descriptor,
    component: &str,
    owner: Option<&OwnerReference>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(descriptor_name(params, descriptor)),
        namespace: Some(params.namespace.clone()),
        labels: Some(params.standard_labels(component)),
        owner_references: owner.map(|o| vec![o.clone()]),
        ..Default::default()
    }
}

fn mariadb_selector(params: &DspaParams) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), params.mariadb_name())])
}

// ============================================================================
// MariaDB
// ============================================================================

pub fn build_db_secret(params: &DspaParams, owner: Option<&OwnerReference>, password: &str) -> Secret {
    let secret_ref = params.password_secret();
    Secret {
        metadata: object_meta(params, Descriptor::DatabaseSecret, "mariadb", owner),
        string_data: Some(BTreeMap::from([(secret_ref.key, password.to_string())])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn build_mariadb_deployment(params: &DspaParams, owner: Option<&OwnerReference>) -> Deployment {
    let mut labels = params.standard_labels("mariadb");
    labels.extend(mariadb_selector(params));
    let mut metadata = object_meta(params, Descriptor::MariaDbDeployment, "mariadb", owner);
    metadata.labels = Some(labels.clone());

    Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(mariadb_selector(params)),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                rolling_update: None,
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(descriptor_name(
                        params,
                        Descriptor::MariaDbServiceAccount,
                    )),
                    containers: vec![build_mariadb_container(params)],
                    volumes: Some(vec![Volume {
                        name: "mariadb-persistent-storage".to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: descriptor_name(params, Descriptor::MariaDbPvc),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_mariadb_container(params: &DspaParams) -> Container {
    let secret_ref = params.password_secret();
    let env = vec![
        EnvVar {
            name: "MYSQL_USER".to_string(),
            value: Some(params.maria_db.username.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "MYSQL_PASSWORD".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(secret_ref.name),
                    key: secret_ref.key,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvVar {
            name: "MYSQL_DATABASE".to_string(),
            value: Some(params.maria_db.pipeline_db_name.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "MYSQL_ALLOW_EMPTY_PASSWORD".to_string(),
            value: Some("true".to_string()),
            ..Default::default()
        },
    ];

    let requests = BTreeMap::from([
        ("cpu".to_string(), Quantity("300m".to_string())),
        ("memory".to_string(), Quantity("800Mi".to_string())),
    ]);
    let limits = BTreeMap::from([
        ("cpu".to_string(), Quantity("1".to_string())),
        ("memory".to_string(), Quantity("1Gi".to_string())),
    ]);

    Container {
        name: "mariadb".to_string(),
        image: Some(params.mariadb_image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some("mysql".to_string()),
            container_port: MARIADB_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env),
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "/bin/sh".to_string(),
                    "-i".to_string(),
                    "-c".to_string(),
                    "MYSQL_PWD=$MYSQL_PASSWORD mysql -h 127.0.0.1 -u $MYSQL_USER -D $MYSQL_DATABASE -e 'SELECT 1'".to_string(),
                ]),
            }),
            initial_delay_seconds: Some(5),
            timeout_seconds: Some(1),
            ..Default::default()
        }),
        liveness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(MARIADB_PORT),
                host: None,
            }),
            initial_delay_seconds: Some(30),
            timeout_seconds: Some(1),
            ..Default::default()
        }),
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            limits: Some(limits),
            claims: None,
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: "mariadb-persistent-storage".to_string(),
            mount_path: MARIADB_DATA_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub fn build_mariadb_pvc(params: &DspaParams, owner: Option<&OwnerReference>) -> PersistentVolumeClaim {
    let requests = BTreeMap::from([(
        "storage".to_string(),
        Quantity(params.maria_db.pvc_size.clone()),
    )]);

    PersistentVolumeClaim {
        metadata: object_meta(params, Descriptor::MariaDbPvc, "mariadb", owner),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_mariadb_service(params: &DspaParams, owner: Option<&OwnerReference>) -> Service {
    Service {
        metadata: object_meta(params, Descriptor::MariaDbService, "mariadb", owner),
        spec: Some(ServiceSpec {
            selector: Some(mariadb_selector(params)),
            ports: Some(vec![ServicePort {
                name: Some("mysql".to_string()),
                port: MARIADB_PORT,
                target_port: Some(IntOrString::Int(MARIADB_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_mariadb_service_account(
    params: &DspaParams,
    owner: Option<&OwnerReference>,
) -> ServiceAccount {
    ServiceAccount {
        metadata: object_meta(params, Descriptor::MariaDbServiceAccount, "mariadb", owner),
        ..Default::default()
    }
}

// ============================================================================
// Common
// ============================================================================

/// Only pods of this DSPA may reach the managed database
pub fn build_common_policy(params: &DspaParams, owner: Option<&OwnerReference>) -> NetworkPolicy {
    NetworkPolicy {
        metadata: object_meta(params, Descriptor::CommonPolicy, "policy", owner),
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(mariadb_selector(params)),
                ..Default::default()
            },
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(LabelSelector {
                        match_labels: Some(BTreeMap::from([(
                            "dspa".to_string(),
                            params.name.clone(),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ports: Some(vec![NetworkPolicyPort {
                    port: Some(IntOrString::Int(MARIADB_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
            }]),
            egress: None,
        }),
    }
}

pub fn build_envoy_dashboard_policy(
    params: &DspaParams,
    owner: Option<&OwnerReference>,
) -> NetworkPolicy {
    NetworkPolicy {
        metadata: object_meta(
            params,
            Descriptor::MlmdEnvoyDashboardAccessPolicy,
            "policy",
            owner,
        ),
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "app".to_string(),
                    params.resource_name("ds-pipeline-metadata-envoy"),
                )])),
                ..Default::default()
            },
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(LabelSelector::default()),
                    pod_selector: Some(LabelSelector {
                        match_labels: Some(BTreeMap::from([(
                            "app".to_string(),
                            "odh-dashboard".to_string(),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ports: Some(vec![NetworkPolicyPort {
                    port: Some(IntOrString::Int(ENVOY_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
            }]),
            egress: None,
        }),
    }
}

/// Cluster-scoped, so it never carries an owner reference to the namespaced DSPA
pub fn build_cluster_role_binding(params: &DspaParams) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(descriptor_name(params, Descriptor::ClusterRoleBinding)),
            labels: Some(params.standard_labels("ds-pipeline")),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: "system:auth-delegator".to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: params.resource_name("ds-pipeline"),
            namespace: Some(params.namespace.clone()),
            api_group: None,
        }]),
    }
}

// ============================================================================
// Tests
// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::crd::{
        DataSciencePipelinesApplication, DataSciencePipelinesApplicationSpec, Database, MariaDb,
    };

    fn mock_params() -> DspaParams {
        let dspa = DataSciencePipelinesApplication {
            metadata: ObjectMeta {
                name: Some("sample".to_string()),
                namespace: Some("team-a".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: DataSciencePipelinesApplicationSpec {
                database: Some(Database {
                    maria_db: Some(MariaDb {
                        pvc_size: "20Gi".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
            status: None,
        };
        DspaParams::new(&dspa, &OperatorConfig::default())
    }

    #[test]
    fn test_mariadb_names() {
        let params = mock_params();
        let deploy = build_mariadb_deployment(&params, Some(&params.owner));
        assert_eq!(deploy.metadata.name.as_deref(), Some("mariadb-sample"));
        assert_eq!(
            build_mariadb_service_account(&params, None).metadata.name.as_deref(),
            Some("ds-pipelines-mariadb-sa-sample")
        );
        assert_eq!(
            build_mariadb_service(&params, None).metadata.name.as_deref(),
            Some("mariadb-sample")
        );
    }

    #[test]
    fn test_owner_reference_is_optional() {
        let params = mock_params();
        let owned = build_mariadb_pvc(&params, Some(&params.owner));
        let refs = owned.metadata.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uid, "test-uid");
        assert_eq!(refs[0].controller, Some(true));

        let unowned = build_mariadb_pvc(&params, None);
        assert!(unowned.metadata.owner_references.is_none());
    }

    #[test]
    fn test_pvc_uses_requested_size() {
        let params = mock_params();
        let pvc = build_mariadb_pvc(&params, None);
        let requests = pvc.spec.unwrap().resources.unwrap().requests.unwrap();
        assert_eq!(requests.get("storage"), Some(&Quantity("20Gi".to_string())));
    }

    #[test]
    fn test_deployment_reads_password_from_secret() {
        let params = mock_params();
        let deploy = build_mariadb_deployment(&params, None);
        let pod = deploy.spec.unwrap().template.spec.unwrap();
        let env = pod.containers[0].env.clone().unwrap();
        let password = env.iter().find(|e| e.name == "MYSQL_PASSWORD").unwrap();
        let selector = password
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(selector.name.as_deref(), Some("ds-pipeline-db-sample"));
        assert_eq!(selector.key, "password");
        assert_eq!(
            pod.service_account_name.as_deref(),
            Some("ds-pipelines-mariadb-sa-sample")
        );
    }

    #[test]
    fn test_secret_stores_password_under_key() {
        let params = mock_params();
        let secret = build_db_secret(&params, Some(&params.owner), "hunter2");
        assert_eq!(secret.metadata.name.as_deref(), Some("ds-pipeline-db-sample"));
        assert_eq!(
            secret.string_data.unwrap().get("password").map(String::as_str),
            Some("hunter2")
        );
    }

    #[test]
    fn test_cluster_role_binding_has_no_owner() {
        let params = mock_params();
        let crb = build_cluster_role_binding(&params);
        assert!(crb.metadata.owner_references.is_none());
        assert!(crb.metadata.namespace.is_none());
        assert_eq!(
            crb.metadata.name.as_deref(),
            Some("ds-pipeline-auth-delegator-team-a-sample")
        );
        assert_eq!(crb.role_ref.name, "system:auth-delegator");
    }

    #[test]
    fn test_common_policy_targets_mariadb() {
        let params = mock_params();
        let policy = build_common_policy(&params, Some(&params.owner));
        assert_eq!(policy.metadata.name.as_deref(), Some("ds-pipelines-sample"));
        let selector = policy.spec.unwrap().pod_selector.match_labels.unwrap();
        assert_eq!(selector.get("app").map(String::as_str), Some("mariadb-sample"));
    }
}
