use kube::ResourceExt;
use prometheus::{histogram_opts, opts, Histogram, HistogramTimer, IntCounter, IntCounterVec, Registry};

use crate::api::member_cluster::MemberCluster;
use crate::Error;

#[derive(Clone)]
pub struct Metrics {
    pub reconciles: IntCounter,
    pub approvals: IntCounter,
    pub failures: IntCounterVec,
    pub reconcile_duration: Histogram,
    pub collections: IntCounter,
    pub collect_failures: IntCounterVec,
    pub collect_duration: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        let reconciles = IntCounter::new(
            "fleet_admission_reconciles_total",
            "admission reconciliations",
        )
        .unwrap();
        let approvals = IntCounter::new(
            "fleet_identity_approvals_total",
            "newly approved identity requests",
        )
        .unwrap();
        let failures = IntCounterVec::new(
            opts!(
                "fleet_admission_failures_total",
                "admission reconciliation errors"
            ),
            &["cluster", "error"],
        )
        .unwrap();
        let reconcile_duration = Histogram::with_opts(histogram_opts!(
            "fleet_admission_reconcile_duration_seconds",
            "duration of admission reconcile runs",
            vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]
        ))
        .unwrap();
        let collections = IntCounter::new(
            "fleet_collections_total",
            "per cluster telemetry collection runs",
        )
        .unwrap();
        let collect_failures = IntCounterVec::new(
            opts!(
                "fleet_collect_failures_total",
                "per cluster telemetry collection errors"
            ),
            &["cluster"],
        )
        .unwrap();
        let collect_duration = Histogram::with_opts(histogram_opts!(
            "fleet_collect_duration_seconds",
            "duration of per cluster telemetry collection",
            vec![0.1, 0.5, 1., 5., 15., 60.]
        ))
        .unwrap();

        Metrics {
            reconciles,
            approvals,
            failures,
            reconcile_duration,
            collections,
            collect_failures,
            collect_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconciles.clone()))?;
        registry.register(Box::new(self.approvals.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.collections.clone()))?;
        registry.register(Box::new(self.collect_failures.clone()))?;
        registry.register(Box::new(self.collect_duration.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, cluster: &MemberCluster, e: &Error) {
        self.failures
            .with_label_values(&[cluster.name_any().as_ref(), e.metric_label().as_ref()])
            .inc()
    }

    pub fn collect_failure(&self, cluster: &str) {
        self.collect_failures.with_label_values(&[cluster]).inc()
    }

    pub fn count_and_measure(&self) -> HistogramTimer {
        self.reconciles.inc();
        self.reconcile_duration.start_timer()
    }
}
