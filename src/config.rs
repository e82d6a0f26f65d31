use std::time::Duration;

/// Runtime configuration, constructed in `main` and passed down explicitly
/// so every component can run against a fake in tests.
#[derive(Clone, Debug)]
pub struct FleetConfig {
    /// Interval between fleet wide collection ticks.
    pub collect_interval: Duration,
    /// Bound on concurrent per cluster collections within one tick.
    pub collect_concurrency: usize,
    /// Grace period granted to an in-flight tick on shutdown.
    pub drain_timeout: Duration,
    /// Upper bound on any single remote call against a member cluster, so one
    /// unreachable member cannot pin a concurrency slot for a whole tick.
    pub remote_call_timeout: Duration,
    /// Label carrying the human readable workload name.
    pub display_label_key: String,
    /// Label linking identity requests to the member cluster that submitted
    /// them.
    pub correlation_label_key: String,
    /// Identity recorded in approval conditions.
    pub controller_name: String,
    /// Delay before re-checking a cluster whose identity requests have not
    /// appeared yet.
    pub registration_requeue: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            collect_interval: Duration::from_secs(20),
            collect_concurrency: 8,
            drain_timeout: Duration::from_secs(10),
            remote_call_timeout: Duration::from_secs(15),
            display_label_key: "app".to_string(),
            correlation_label_key: "registration.fleet.io/cluster-name".to_string(),
            controller_name: "FleetAutoAdmission".to_string(),
            registration_requeue: Duration::from_secs(5),
        }
    }
}
