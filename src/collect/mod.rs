use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::version::Info;
use thiserror::Error;

use quantity::QuantityError;

pub mod cidr;
pub mod cluster;
pub mod quantity;
pub mod resources;
pub mod workload;

/// Per member cluster client surface consumed by the collector: typed lists,
/// version discovery and a raw liveness probe.
#[allow(async_fn_in_trait)]
pub trait ClusterProxy {
    fn name(&self) -> String;

    async fn server_version(&self) -> kube::Result<Info>;

    async fn list_nodes(&self) -> kube::Result<Vec<Node>>;

    async fn list_pods(&self, label_selector: &str) -> kube::Result<Vec<Pod>>;

    async fn list_deployments(&self) -> kube::Result<Vec<Deployment>>;

    async fn list_stateful_sets(&self) -> kube::Result<Vec<StatefulSet>>;

    async fn list_daemon_sets(&self) -> kube::Result<Vec<DaemonSet>>;

    /// True when a raw GET on `path` returned a success status.
    async fn probe(&self, path: &str) -> bool;
}

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Node list error: {0}")]
    NodeList(#[source] kube::Error),

    #[error("Snapshot serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Quantity error: {0}")]
    Quantity(#[from] QuantityError),
}
