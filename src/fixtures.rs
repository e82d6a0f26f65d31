//! Test builders and fakes shared across unit tests.
use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, DaemonSetStatus, Deployment, DeploymentSpec, DeploymentStatus,
    StatefulSet, StatefulSetSpec, StatefulSetStatus,
};
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestSpec,
    CertificateSigningRequestStatus,
};
use k8s_openapi::api::core::v1::{
    Container, Node, NodeCondition, NodeSpec, NodeStatus, Pod, PodSpec, PodTemplateSpec,
    ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::version::Info;
use k8s_openapi::ByteString;

use crate::api::member_cluster::{MemberCluster, MemberClusterSpec};
use crate::collect::resources::ResourceList;
use crate::collect::ClusterProxy;
use crate::registry::{FleetRegistry, RegistryError};

/// An opaque api error for exercising failure paths.
pub fn remote_error() -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "injected failure".to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    })
}

pub fn resource_list(entries: &[(&str, &str)]) -> ResourceList {
    entries
        .iter()
        .map(|(category, amount)| (category.to_string(), Quantity(amount.to_string())))
        .collect()
}

fn labels(entries: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    if entries.is_empty() {
        return None;
    }
    Some(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

pub fn version_info(git_version: &str, platform: &str) -> Info {
    Info {
        git_version: git_version.to_string(),
        platform: platform.to_string(),
        ..Default::default()
    }
}

pub fn node(
    name: &str,
    ready: Option<&str>,
    pod_cidr: Option<&str>,
    capacity: &[(&str, &str)],
    allocatable: &[(&str, &str)],
) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            pod_cidr: pod_cidr.map(str::to_string),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            conditions: ready.map(|status| {
                vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: status.to_string(),
                    ..Default::default()
                }]
            }),
            capacity: Some(resource_list(capacity)),
            allocatable: Some(resource_list(allocatable)),
            ..Default::default()
        }),
    }
}

pub fn control_plane_pod(component: &str, command: &[&str], args: &[&str]) -> Pod {
    let tokens = |list: &[&str]| -> Option<Vec<String>> {
        if list.is_empty() {
            return None;
        }
        Some(list.iter().map(|t| t.to_string()).collect())
    };
    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{component}-control-plane")),
            namespace: Some("kube-system".to_string()),
            labels: labels(&[("component", component)]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: component.to_string(),
                command: tokens(command),
                args: tokens(args),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_template(requests: &[(&str, &str)], limits: &[(&str, &str)]) -> PodTemplateSpec {
    PodTemplateSpec {
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                resources: Some(ResourceRequirements {
                    requests: Some(resource_list(requests)),
                    limits: Some(resource_list(limits)),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn workload_meta(namespace: &str, name: &str, display: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: if display.is_empty() {
            None
        } else {
            labels(&[("app", display)])
        },
        ..Default::default()
    }
}

pub fn deployment(
    namespace: &str,
    name: &str,
    display: &str,
    (replicas, ready, unavailable): (i32, i32, i32),
    requests: &[(&str, &str)],
    limits: &[(&str, &str)],
) -> Deployment {
    Deployment {
        metadata: workload_meta(namespace, name, display),
        spec: Some(DeploymentSpec {
            template: pod_template(requests, limits),
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            replicas: Some(replicas),
            ready_replicas: Some(ready),
            unavailable_replicas: Some(unavailable),
            ..Default::default()
        }),
    }
}

pub fn stateful_set(
    namespace: &str,
    name: &str,
    display: &str,
    (replicas, ready): (i32, i32),
    requests: &[(&str, &str)],
    limits: &[(&str, &str)],
) -> StatefulSet {
    StatefulSet {
        metadata: workload_meta(namespace, name, display),
        spec: Some(StatefulSetSpec {
            template: pod_template(requests, limits),
            ..Default::default()
        }),
        status: Some(StatefulSetStatus {
            replicas,
            ready_replicas: Some(ready),
            ..Default::default()
        }),
    }
}

pub fn daemon_set(
    namespace: &str,
    name: &str,
    display: &str,
    (available, unavailable): (i32, i32),
    requests: &[(&str, &str)],
    limits: &[(&str, &str)],
) -> DaemonSet {
    DaemonSet {
        metadata: workload_meta(namespace, name, display),
        spec: Some(DaemonSetSpec {
            template: pod_template(requests, limits),
            ..Default::default()
        }),
        status: Some(DaemonSetStatus {
            number_available: Some(available),
            number_unavailable: Some(unavailable),
            ..Default::default()
        }),
    }
}

/// A CertificateSigningRequest correlated to `cluster`. Requests built with
/// no conditions have no status at all, matching freshly submitted objects.
pub fn identity_request(name: &str, cluster: &str, conditions: &[&str]) -> CertificateSigningRequest {
    let status = if conditions.is_empty() {
        None
    } else {
        Some(CertificateSigningRequestStatus {
            conditions: Some(
                conditions
                    .iter()
                    .map(|type_| CertificateSigningRequestCondition {
                        type_: type_.to_string(),
                        status: "True".to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        })
    };
    CertificateSigningRequest {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: labels(&[("registration.fleet.io/cluster-name", cluster)]),
            ..Default::default()
        },
        spec: CertificateSigningRequestSpec {
            request: ByteString(b"-----BEGIN CERTIFICATE REQUEST-----".to_vec()),
            signer_name: "kubernetes.io/kube-apiserver-client".to_string(),
            ..Default::default()
        },
        status,
    }
}

pub fn member_cluster(namespace: &str, name: &str, accepted: bool) -> MemberCluster {
    let mut cluster = MemberCluster::new(name, MemberClusterSpec { accepted });
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster
}

/// In-memory [`ClusterProxy`] with injectable inventory and failures.
#[derive(Clone, Default)]
pub struct FakeProxy {
    pub cluster_name: String,
    pub version: Option<Info>,
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub deployments: Vec<Deployment>,
    pub stateful_sets: Vec<StatefulSet>,
    pub daemon_sets: Vec<DaemonSet>,
    pub healthy: bool,
    pub fail_nodes: bool,
    pub fail_deployments: bool,
    pub fail_stateful_sets: bool,
    pub fail_daemon_sets: bool,
}

impl ClusterProxy for FakeProxy {
    fn name(&self) -> String {
        self.cluster_name.clone()
    }

    async fn server_version(&self) -> kube::Result<Info> {
        self.version.clone().ok_or_else(remote_error)
    }

    async fn list_nodes(&self) -> kube::Result<Vec<Node>> {
        if self.fail_nodes {
            return Err(remote_error());
        }
        Ok(self.nodes.clone())
    }

    async fn list_pods(&self, label_selector: &str) -> kube::Result<Vec<Pod>> {
        let (key, value) = label_selector.split_once('=').unwrap_or((label_selector, ""));
        Ok(self
            .pods
            .iter()
            .filter(|pod| {
                pod.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(key))
                    .is_some_and(|v| v == value)
            })
            .cloned()
            .collect())
    }

    async fn list_deployments(&self) -> kube::Result<Vec<Deployment>> {
        if self.fail_deployments {
            return Err(remote_error());
        }
        Ok(self.deployments.clone())
    }

    async fn list_stateful_sets(&self) -> kube::Result<Vec<StatefulSet>> {
        if self.fail_stateful_sets {
            return Err(remote_error());
        }
        Ok(self.stateful_sets.clone())
    }

    async fn list_daemon_sets(&self) -> kube::Result<Vec<DaemonSet>> {
        if self.fail_daemon_sets {
            return Err(remote_error());
        }
        Ok(self.daemon_sets.clone())
    }

    async fn probe(&self, _path: &str) -> bool {
        self.healthy
    }
}

/// In-memory [`FleetRegistry`] handing out [`FakeProxy`] instances.
#[derive(Default)]
pub struct FakeRegistry {
    pub proxies: Vec<FakeProxy>,
}

impl FleetRegistry for FakeRegistry {
    type Proxy = FakeProxy;

    async fn get_all(&self) -> Result<Vec<FakeProxy>, RegistryError> {
        Ok(self.proxies.clone())
    }
}
