use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod, Secret};
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

use crate::api::member_cluster::MemberCluster;
use crate::collect::ClusterProxy;

/// Secret key the registration flow stores member kubeconfigs under.
pub static KUBECONFIG_SECRET_KEY: &str = "value";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("MemberCluster list error: {0}")]
    ClusterList(#[source] kube::Error),

    #[error("Kubeconfig secret fetch error for {name}: {source}")]
    SecretFetch {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Kubeconfig secret {0} is missing or has no `value` key")]
    MissingKubeconfig(String),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Client build error: {0}")]
    ClientBuild(#[source] kube::Error),
}

/// Membership snapshot provider; consulted once per collection tick.
#[allow(async_fn_in_trait)]
pub trait FleetRegistry {
    type Proxy: ClusterProxy;

    async fn get_all(&self) -> Result<Vec<Self::Proxy>, RegistryError>;
}

/// Caps a remote call at `limit`; an elapsed timeout surfaces as a service
/// error like any other failed call.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = kube::Result<T>>,
) -> kube::Result<T> {
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(elapsed) => Err(kube::Error::Service(Box::new(elapsed))),
    }
}

/// Proxy client for one member cluster, backed by a kube [`Client`] built
/// from the member's kubeconfig. Every call is bounded by `call_timeout`.
#[derive(Clone)]
pub struct KubeProxy {
    name: String,
    client: Client,
    call_timeout: Duration,
}

impl KubeProxy {
    pub fn new(name: String, client: Client, call_timeout: Duration) -> Self {
        Self {
            name,
            client,
            call_timeout,
        }
    }
}

impl ClusterProxy for KubeProxy {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn server_version(&self) -> kube::Result<Info> {
        bounded(self.call_timeout, self.client.apiserver_version()).await
    }

    async fn list_nodes(&self) -> kube::Result<Vec<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(bounded(self.call_timeout, nodes.list(&ListParams::default())).await?.items)
    }

    async fn list_pods(&self, label_selector: &str) -> kube::Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().labels(label_selector);
        Ok(bounded(self.call_timeout, pods.list(&params)).await?.items)
    }

    async fn list_deployments(&self) -> kube::Result<Vec<Deployment>> {
        let deployments: Api<Deployment> = Api::all(self.client.clone());
        Ok(bounded(self.call_timeout, deployments.list(&ListParams::default()))
            .await?
            .items)
    }

    async fn list_stateful_sets(&self) -> kube::Result<Vec<StatefulSet>> {
        let stateful_sets: Api<StatefulSet> = Api::all(self.client.clone());
        Ok(bounded(self.call_timeout, stateful_sets.list(&ListParams::default()))
            .await?
            .items)
    }

    async fn list_daemon_sets(&self) -> kube::Result<Vec<DaemonSet>> {
        let daemon_sets: Api<DaemonSet> = Api::all(self.client.clone());
        Ok(bounded(self.call_timeout, daemon_sets.list(&ListParams::default()))
            .await?
            .items)
    }

    async fn probe(&self, path: &str) -> bool {
        let request = match http::Request::get(path).body(Vec::new()) {
            Ok(request) => request,
            Err(_) => return false,
        };
        bounded(self.call_timeout, self.client.request_text(request))
            .await
            .is_ok()
    }
}

/// Builds per member proxies from `<cluster>-kubeconfig` secrets next to
/// each accepted MemberCluster.
pub struct KubeFleetRegistry {
    client: Client,
    call_timeout: Duration,
}

impl KubeFleetRegistry {
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    async fn build_proxy(&self, cluster: &MemberCluster) -> Result<KubeProxy, RegistryError> {
        let name = cluster.name_any();
        let namespace = cluster.namespace().unwrap_or_else(|| "default".into());
        let secret_name = format!("{name}-kubeconfig");

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let secret = secrets
            .get_opt(&secret_name)
            .await
            .map_err(|source| RegistryError::SecretFetch { name: secret_name.clone(), source })?
            .ok_or_else(|| RegistryError::MissingKubeconfig(secret_name.clone()))?;

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| RegistryError::MissingKubeconfig(secret_name.clone()))?;

        let kubeconfig = Kubeconfig::from_yaml(&String::from_utf8_lossy(&value.0))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config).map_err(RegistryError::ClientBuild)?;
        Ok(KubeProxy::new(name, client, self.call_timeout))
    }
}

impl FleetRegistry for KubeFleetRegistry {
    type Proxy = KubeProxy;

    async fn get_all(&self) -> Result<Vec<KubeProxy>, RegistryError> {
        let clusters: Api<MemberCluster> = Api::all(self.client.clone());
        let clusters = clusters
            .list(&ListParams::default())
            .await
            .map_err(RegistryError::ClusterList)?;

        let mut proxies = Vec::new();
        for cluster in clusters.items.into_iter().filter(MemberCluster::is_accepted) {
            match self.build_proxy(&cluster).await {
                Ok(proxy) => proxies.push(proxy),
                // One broken member must not block the rest of the fleet.
                Err(error) => warn!(cluster = %cluster.name_any(), %error, "skipping member cluster"),
            }
        }
        Ok(proxies)
    }
}
