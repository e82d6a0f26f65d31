use crate::api::member_cluster::MemberCluster;
use crate::config::FleetConfig;
use crate::controllers::admission::{admit, Admission, ClusterKey, KubeAdmissionApi};
use crate::registry::KubeFleetRegistry;
use crate::scheduler::Scheduler;
use crate::{telemetry, Error, Metrics, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::controller::{Action, Controller},
    runtime::events::{Event, EventType, Recorder, Reporter},
    runtime::watcher::Config as WatcherConfig,
    Resource,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::RwLock, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::*;

// Context for the reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prom metrics
    pub metrics: Metrics,
    /// Runtime configuration
    pub config: FleetConfig,
}

#[instrument(skip(ctx, cluster), fields(trace_id = display(telemetry::get_trace_id()), name = cluster.name_any(), namespace = cluster.namespace()))]
async fn reconcile(cluster: Arc<MemberCluster>, ctx: Arc<Context>) -> Result<Action> {
    ctx.diagnostics.write().await.last_event = Utc::now();
    let _timer = ctx.metrics.count_and_measure();
    debug!("Reconciling");

    let key = ClusterKey::from_cluster(&cluster);
    let api = KubeAdmissionApi::new(ctx.client.clone(), &ctx.config);
    match admit(&api, &ctx.config, &key).await? {
        Admission::AlreadyAccepted => Ok(Action::await_change()),
        Admission::Deferred => Ok(Action::requeue(ctx.config.registration_requeue)),
        Admission::Accepted { approved } => {
            ctx.metrics.approvals.inc_by(approved as u64);
            ctx.diagnostics
                .read()
                .await
                .recorder(ctx.client.clone())
                // Record the acceptance for cluster operators
                .publish(
                    &Event {
                        type_: EventType::Normal,
                        reason: "Accepted".into(),
                        note: Some(format!(
                            "Approved {approved} identity request(s) and accepted cluster `{}`",
                            cluster.name_any()
                        )),
                        action: "Accepting".into(),
                        secondary: None,
                    },
                    &cluster.object_ref(&()),
                )
                .await
                .map_err(Error::KubeError)?;
            Ok(Action::await_change())
        }
    }
}

fn error_policy(cluster: Arc<MemberCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {error:?}");
    ctx.metrics.reconcile_failure(&cluster, error);
    Action::requeue(Duration::from_secs(5 * 60))
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "fleet-manager-controller".into(),
        }
    }
}
impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }
}

/// State shared between the controllers and the web server
#[derive(Clone)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
    /// Metric families, registered once
    metrics: Metrics,
}

impl Default for State {
    fn default() -> Self {
        let registry = prometheus::Registry::default();
        let metrics = Metrics::default().register(&registry).unwrap();
        Self {
            diagnostics: Default::default(),
            registry,
            metrics,
        }
    }
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(&self, client: Client, config: FleetConfig) -> Arc<Context> {
        Arc::new(Context {
            client,
            metrics: self.metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            config,
        })
    }
}

/// Initialize the admission controller (given the crd is installed)
pub async fn run_admission(state: State, config: FleetConfig) {
    let client = Client::try_default()
        .await
        .expect("failed to create kube Client");
    let clusters = Api::<MemberCluster>::all(client.clone());
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("MemberClusters are not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    Controller::new(clusters, WatcherConfig::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state.to_context(client, config))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

/// Token cancelled on SIGINT or SIGTERM, the same signals the admission
/// controller's `shutdown_on_signal` reacts to.
fn shutdown_token() -> CancellationToken {
    use tokio::signal::unix::{signal, SignalKind};

    let token = CancellationToken::new();
    let guard = token.clone();
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        guard.cancel();
    });
    token
}

/// Run the fleet telemetry scheduler until shutdown.
pub async fn run_scheduler(state: State, config: FleetConfig) {
    let client = Client::try_default()
        .await
        .expect("failed to create kube Client");

    let shutdown = shutdown_token();
    let registry = KubeFleetRegistry::new(client, config.remote_call_timeout);
    Scheduler::new(registry, config, state.metrics.clone())
        .run(shutdown)
        .await;
}
