use futures::{stream, StreamExt};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::collect::{cluster, ClusterProxy};
use crate::config::FleetConfig;
use crate::metrics::Metrics;
use crate::registry::FleetRegistry;

/// Periodic driver: once per interval, fans the telemetry collector out over
/// every currently registered member cluster.
pub struct Scheduler<R> {
    registry: R,
    config: FleetConfig,
    metrics: Metrics,
}

impl<R: FleetRegistry> Scheduler<R> {
    pub fn new(registry: R, config: FleetConfig, metrics: Metrics) -> Self {
        Self {
            registry,
            config,
            metrics,
        }
    }

    /// Runs until `shutdown` is cancelled. A tick in flight when shutdown
    /// arrives is drained for at most the configured grace period, then
    /// abandoned.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.collect_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately; consume
        // it so collection starts one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let tick = self.collect_fleet();
                    tokio::pin!(tick);
                    tokio::select! {
                        _ = &mut tick => {}
                        _ = shutdown.cancelled() => {
                            if timeout(self.config.drain_timeout, &mut tick).await.is_err() {
                                warn!("shutdown drain expired, abandoning in-flight collection");
                            }
                            break;
                        }
                    }
                }
            }
        }
        info!("fleet scheduler stopped");
    }

    /// One tick: enumerate the fleet and collect every cluster, bounded by
    /// the configured concurrency. A registry failure skips the tick.
    pub async fn collect_fleet(&self) {
        let proxies = match self.registry.get_all().await {
            Ok(proxies) => proxies,
            Err(error) => {
                error!(%error, "failed to enumerate member clusters, skipping tick");
                return;
            }
        };

        stream::iter(proxies)
            .for_each_concurrent(self.config.collect_concurrency, |proxy| async move {
                let name = proxy.name();
                self.metrics.collections.inc();
                let timer = self.metrics.collect_duration.start_timer();
                if let Err(error) = cluster::collect_and_emit(&proxy, &self.config).await {
                    warn!(cluster = %name, %error, "cluster collection failed");
                    self.metrics.collect_failure(&name);
                }
                timer.observe_duration();
            })
            .await;
    }
}
