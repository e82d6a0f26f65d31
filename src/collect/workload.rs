use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use tracing::warn;

use super::quantity::QuantityError;
use super::resources::{aggregate, ResourceList};
use super::ClusterProxy;

pub type NamespacedStatuses<T> = BTreeMap<String, Vec<T>>;

/// Per cluster workload rollup, rebuilt fully on every tick. A section whose
/// list failed stays empty; the other sections are unaffected.
#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSummary {
    pub deployments: NamespacedStatuses<DeploymentRollup>,
    pub stateful_sets: NamespacedStatuses<StatefulSetRollup>,
    pub daemon_sets: NamespacedStatuses<DaemonSetRollup>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadResources {
    pub requests: ResourceList,
    pub limits: ResourceList,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRollup {
    pub name: String,
    pub display_name: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub unavailable_replicas: i32,
    pub resources: WorkloadResources,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetRollup {
    pub name: String,
    pub display_name: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub resources: WorkloadResources,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSetRollup {
    pub name: String,
    pub display_name: String,
    pub number_available: i32,
    pub number_unavailable: i32,
    pub collision_count: Option<i32>,
    pub resources: WorkloadResources,
}

/// Lists deployments, stateful sets and daemon sets, each failure soft-failed
/// independently, and groups the per-object rollups by namespace.
pub async fn collect_workloads<P: ClusterProxy>(proxy: &P, display_label: &str) -> WorkloadSummary {
    let cluster = proxy.name();
    let mut summary = WorkloadSummary::default();

    match proxy.list_deployments().await {
        Ok(items) => {
            for deployment in &items {
                match deployment_rollup(deployment, display_label) {
                    Ok(rollup) => group(
                        &mut summary.deployments,
                        deployment.metadata.namespace.clone(),
                        rollup,
                    ),
                    Err(error) => warn!(cluster, %error, "skipping deployment with malformed quantities"),
                }
            }
        }
        Err(error) => warn!(cluster, %error, "failed to list deployments"),
    }

    match proxy.list_stateful_sets().await {
        Ok(items) => {
            for stateful_set in &items {
                match stateful_set_rollup(stateful_set, display_label) {
                    Ok(rollup) => group(
                        &mut summary.stateful_sets,
                        stateful_set.metadata.namespace.clone(),
                        rollup,
                    ),
                    Err(error) => warn!(cluster, %error, "skipping stateful set with malformed quantities"),
                }
            }
        }
        Err(error) => warn!(cluster, %error, "failed to list stateful sets"),
    }

    match proxy.list_daemon_sets().await {
        Ok(items) => {
            for daemon_set in &items {
                match daemon_set_rollup(daemon_set, display_label) {
                    Ok(rollup) => group(
                        &mut summary.daemon_sets,
                        daemon_set.metadata.namespace.clone(),
                        rollup,
                    ),
                    Err(error) => warn!(cluster, %error, "skipping daemon set with malformed quantities"),
                }
            }
        }
        Err(error) => warn!(cluster, %error, "failed to list daemon sets"),
    }

    summary
}

fn group<T>(section: &mut NamespacedStatuses<T>, namespace: Option<String>, rollup: T) {
    section
        .entry(namespace.unwrap_or_default())
        .or_default()
        .push(rollup);
}

fn deployment_rollup(
    deployment: &Deployment,
    display_label: &str,
) -> Result<DeploymentRollup, QuantityError> {
    let status = deployment.status.clone().unwrap_or_default();
    Ok(DeploymentRollup {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        display_name: display_name(&deployment.metadata, display_label),
        replicas: status.replicas.unwrap_or_default(),
        ready_replicas: status.ready_replicas.unwrap_or_default(),
        unavailable_replicas: status.unavailable_replicas.unwrap_or_default(),
        resources: container_resources(
            deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref()),
        )?,
    })
}

fn stateful_set_rollup(
    stateful_set: &StatefulSet,
    display_label: &str,
) -> Result<StatefulSetRollup, QuantityError> {
    let status = stateful_set.status.clone().unwrap_or_default();
    Ok(StatefulSetRollup {
        name: stateful_set.metadata.name.clone().unwrap_or_default(),
        display_name: display_name(&stateful_set.metadata, display_label),
        replicas: status.replicas,
        ready_replicas: status.ready_replicas.unwrap_or_default(),
        resources: container_resources(
            stateful_set
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref()),
        )?,
    })
}

fn daemon_set_rollup(
    daemon_set: &DaemonSet,
    display_label: &str,
) -> Result<DaemonSetRollup, QuantityError> {
    let status = daemon_set.status.clone().unwrap_or_default();
    Ok(DaemonSetRollup {
        name: daemon_set.metadata.name.clone().unwrap_or_default(),
        display_name: display_name(&daemon_set.metadata, display_label),
        number_available: status.number_available.unwrap_or_default(),
        number_unavailable: status.number_unavailable.unwrap_or_default(),
        collision_count: status.collision_count,
        resources: container_resources(
            daemon_set
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref()),
        )?,
    })
}

/// Sums requests and limits over all container specs of one workload.
fn container_resources(pod_spec: Option<&PodSpec>) -> Result<WorkloadResources, QuantityError> {
    let containers = pod_spec
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    let requests = aggregate(
        containers
            .iter()
            .filter_map(|container| container.resources.as_ref()?.requests.as_ref()),
    )?;
    let limits = aggregate(
        containers
            .iter()
            .filter_map(|container| container.resources.as_ref()?.limits.as_ref()),
    )?;
    Ok(WorkloadResources { requests, limits })
}

fn display_name(metadata: &ObjectMeta, display_label: &str) -> String {
    metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(display_label))
        .cloned()
        .unwrap_or_default()
}
