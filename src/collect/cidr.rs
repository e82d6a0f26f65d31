use tracing::warn;

use super::ClusterProxy;

/// Label key control plane static pods carry on upstream provisioners.
const COMPONENT_LABEL: &str = "component";

/// Recovers the cluster (pod network) CIDR from the api server command line.
/// `None` is a soft failure: some provisioners expose no such flag.
pub async fn discover_cluster_cidr<P: ClusterProxy>(proxy: &P) -> Option<String> {
    find_pod_flag(proxy, "kube-apiserver", "--service-cluster-ip-range").await
}

/// Recovers the service network CIDR, tolerating different provisioning
/// conventions through ordered fallbacks: controller manager flag, kube-proxy
/// flag, then the first node with a podCIDR in its spec.
pub async fn discover_service_cidr<P: ClusterProxy>(proxy: &P) -> Option<String> {
    if let Some(value) = find_pod_flag(proxy, "kube-controller-manager", "--cluster-cidr").await {
        return Some(value);
    }
    if let Some(value) = find_pod_flag(proxy, "kube-proxy", "--cluster-cidr").await {
        return Some(value);
    }
    pod_cidr_from_node_spec(proxy).await
}

async fn pod_cidr_from_node_spec<P: ClusterProxy>(proxy: &P) -> Option<String> {
    let nodes = match proxy.list_nodes().await {
        Ok(nodes) => nodes,
        Err(error) => {
            warn!(%error, "failed to list nodes for pod CIDR discovery");
            return None;
        }
    };
    nodes
        .into_iter()
        .filter_map(|node| node.spec?.pod_cidr)
        .find(|cidr| !cidr.is_empty())
}

async fn find_pod_flag<P: ClusterProxy>(proxy: &P, component: &str, flag: &str) -> Option<String> {
    let selector = format!("{COMPONENT_LABEL}={component}");
    let pods = match proxy.list_pods(&selector).await {
        Ok(pods) => pods,
        Err(error) => {
            warn!(%error, selector, "failed to list control plane pods");
            return None;
        }
    };
    let pod = pods.into_iter().next()?;
    for container in pod.spec?.containers {
        if let Some(value) = container
            .command
            .as_deref()
            .and_then(|command| find_flag_value(command, flag))
        {
            return Some(value);
        }
        if let Some(value) = container
            .args
            .as_deref()
            .and_then(|args| find_flag_value(args, flag))
        {
            return Some(value);
        }
    }
    None
}

/// Scans `--flag=value` tokens, also re-testing the pieces of a token that
/// embeds a whole shell invocation (`/bin/sh -c "exec kube-proxy --x=y"`).
fn find_flag_value(tokens: &[String], flag: &str) -> Option<String> {
    for token in tokens {
        if let Some(value) = flag_value(token, flag) {
            return Some(value);
        }
        if token.contains(' ') {
            if let Some(value) = token.split(' ').find_map(|part| flag_value(part, flag)) {
                return Some(value);
            }
        }
    }
    None
}

fn flag_value(token: &str, flag: &str) -> Option<String> {
    token
        .strip_prefix(flag)?
        .strip_prefix('=')
        .map(str::to_string)
        .filter(|value| !value.is_empty())
}
