use k8s_openapi::api::core::v1::Node;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::FleetConfig;

use super::resources::{aggregate, ResourceList};
use super::{cidr, workload, ClusterProxy, CollectError};

/// One tick's collected telemetry for one member cluster.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub cluster_name: String,
    pub kubernetes_version: String,
    pub platform: String,
    pub healthz: bool,
    pub livez: bool,
    pub readyz: bool,
    pub cluster_cidr: String,
    pub service_cidr: String,
    pub node_statistics: NodeStatistics,
    pub capacity: ResourceList,
    pub allocatable: ResourceList,
}

/// Node counts by Ready condition; the four fields always sum to the number
/// of observed nodes.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatistics {
    pub ready: i32,
    pub not_ready: i32,
    pub unknown: i32,
    pub lost: i32,
}

/// Collects one cluster's snapshot. Version, CIDRs and probes degrade to
/// empty/false on error; a failing node list aborts this cluster's tick.
pub async fn collect_cluster<P: ClusterProxy>(proxy: &P) -> Result<ClusterSnapshot, CollectError> {
    let cluster = proxy.name();

    let (kubernetes_version, platform) = match proxy.server_version().await {
        Ok(info) => (info.git_version, info.platform),
        Err(error) => {
            warn!(cluster, %error, "failed to collect kubernetes version");
            (String::new(), String::new())
        }
    };

    let nodes = proxy.list_nodes().await.map_err(CollectError::NodeList)?;
    let node_statistics = node_statistics(&nodes);
    let capacity = aggregate(nodes.iter().filter_map(|n| n.status.as_ref()?.capacity.as_ref()))?;
    let allocatable = aggregate(
        nodes
            .iter()
            .filter_map(|n| n.status.as_ref()?.allocatable.as_ref()),
    )?;

    let cluster_cidr = cidr::discover_cluster_cidr(proxy).await.unwrap_or_else(|| {
        warn!(cluster, "failed to discover cluster CIDR");
        String::new()
    });
    let service_cidr = cidr::discover_service_cidr(proxy).await.unwrap_or_else(|| {
        warn!(cluster, "failed to discover service CIDR");
        String::new()
    });

    Ok(ClusterSnapshot {
        cluster_name: cluster,
        kubernetes_version,
        platform,
        healthz: proxy.probe("/healthz").await,
        livez: proxy.probe("/livez").await,
        readyz: proxy.probe("/readyz").await,
        cluster_cidr,
        service_cidr,
        node_statistics,
        capacity,
        allocatable,
    })
}

/// Full collection pass for one cluster: snapshot plus workload summary,
/// both emitted as structured JSON log records.
pub async fn collect_and_emit<P: ClusterProxy>(
    proxy: &P,
    config: &FleetConfig,
) -> Result<(), CollectError> {
    let snapshot = collect_cluster(proxy).await?;
    info!(
        cluster = %snapshot.cluster_name,
        status = %serde_json::to_string(&snapshot)?,
        "cluster status"
    );

    let summary = workload::collect_workloads(proxy, &config.display_label_key).await;
    info!(
        cluster = %proxy.name(),
        summary = %serde_json::to_string(&summary)?,
        "workload resource usage"
    );
    Ok(())
}

/// Classifies each node by its Ready condition. A node without any Ready
/// condition is lost; a Ready condition with a non-standard status value
/// counts as unknown, keeping the counts summing to the node total.
pub fn node_statistics(nodes: &[Node]) -> NodeStatistics {
    let mut statistics = NodeStatistics::default();
    for node in nodes {
        match ready_condition(node) {
            None => statistics.lost += 1,
            Some("True") => statistics.ready += 1,
            Some("False") => statistics.not_ready += 1,
            Some(_) => statistics.unknown += 1,
        }
    }
    statistics
}

fn ready_condition(node: &Node) -> Option<&str> {
    node.status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|condition| condition.type_ == "Ready")
        .map(|condition| condition.status.as_str())
}
