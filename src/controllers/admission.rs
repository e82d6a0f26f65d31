use std::fmt;

use chrono::Utc;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{info, warn};

use crate::api::member_cluster::MemberCluster;
use crate::config::FleetConfig;

use super::AdmissionError;

pub static APPROVED_CONDITION: &str = "Approved";
pub static DENIED_CONDITION: &str = "Denied";

/// Key identifying one MemberCluster; admission work is enqueued per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    pub fn from_cluster(cluster: &MemberCluster) -> Self {
        Self {
            namespace: cluster.namespace().unwrap_or_default(),
            name: cluster.name_any(),
        }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Outcome of one admission attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// The cluster was accepted before this attempt ran; nothing was written.
    AlreadyAccepted,
    /// No identity requests correlate to the cluster yet; re-check later.
    Deferred,
    /// The cluster is now accepted; `approved` requests were newly approved.
    Accepted { approved: usize },
}

/// Remote operations the admission state machine performs, cut at a trait
/// seam so the state machine runs against a fake in tests.
#[allow(async_fn_in_trait)]
pub trait AdmissionApi {
    async fn fetch_cluster(&self, key: &ClusterKey) -> kube::Result<Option<MemberCluster>>;

    /// All identity requests carrying the cluster's correlation label.
    async fn list_requests(&self, cluster_name: &str) -> kube::Result<Vec<CertificateSigningRequest>>;

    /// Submits an approval through the approval subresource.
    async fn submit_approval(&self, request: &CertificateSigningRequest) -> kube::Result<()>;

    async fn mark_accepted(&self, cluster: &MemberCluster) -> kube::Result<()>;
}

/// Drives one MemberCluster through the admission state machine:
/// Unaccepted -> Accepted, approving every outstanding identity request on
/// the way.
///
/// Safe under at-least-once delivery: every attempt re-derives state from
/// the live objects, so a redelivered key never approves a request twice and
/// an already accepted cluster is a no-op.
pub async fn admit<A: AdmissionApi>(
    api: &A,
    config: &FleetConfig,
    key: &ClusterKey,
) -> Result<Admission, AdmissionError> {
    let cluster = api
        .fetch_cluster(key)
        .await
        .map_err(|source| AdmissionError::ClusterFetch { key: key.to_string(), source })?
        .ok_or_else(|| AdmissionError::ClusterGone(key.to_string()))?;

    if cluster.is_accepted() {
        info!(cluster = %key, "cluster already accepted");
        return Ok(Admission::AlreadyAccepted);
    }

    let requests = api
        .list_requests(&key.name)
        .await
        .map_err(|source| AdmissionError::RequestList { key: key.to_string(), source })?;
    if requests.is_empty() {
        warn!(cluster = %key, "no identity requests found, check the registration flow");
        return Ok(Admission::Deferred);
    }

    let mut approved = 0;
    for request in &requests {
        let name = request.name_any();
        match approval_state(request.status.as_ref()) {
            ApprovalState::Approved => {
                warn!(request = %name, "identity request already approved");
                continue;
            }
            ApprovalState::Denied => {
                warn!(request = %name, "identity request already denied");
                continue;
            }
            ApprovalState::Pending => {}
        }

        let approval = with_approval(request, &config.controller_name);
        api.submit_approval(&approval)
            .await
            .map_err(|source| AdmissionError::Approve { name: name.clone(), source })?;
        info!(request = %name, controller = %config.controller_name, "identity request approved");
        approved += 1;
    }

    api.mark_accepted(&cluster)
        .await
        .map_err(|source| AdmissionError::Accept { key: key.to_string(), source })?;
    info!(cluster = %key, approved, "cluster accepted");
    Ok(Admission::Accepted { approved })
}

#[derive(Debug, PartialEq, Eq)]
pub enum ApprovalState {
    Pending,
    Approved,
    Denied,
}

/// Terminal conditions win over each other in the order upstream checks
/// them: an Approved condition shadows a Denied one.
pub fn approval_state(status: Option<&CertificateSigningRequestStatus>) -> ApprovalState {
    let conditions = status
        .and_then(|status| status.conditions.as_deref())
        .unwrap_or_default();
    if conditions.iter().any(|c| c.type_ == APPROVED_CONDITION) {
        return ApprovalState::Approved;
    }
    if conditions.iter().any(|c| c.type_ == DENIED_CONDITION) {
        return ApprovalState::Denied;
    }
    ApprovalState::Pending
}

fn with_approval(request: &CertificateSigningRequest, controller: &str) -> CertificateSigningRequest {
    let mut request = request.clone();
    let status = request.status.get_or_insert_with(Default::default);
    status
        .conditions
        .get_or_insert_with(Vec::new)
        .push(CertificateSigningRequestCondition {
            type_: APPROVED_CONDITION.to_string(),
            status: "True".to_string(),
            reason: Some(format!("{controller}Approve")),
            message: Some(format!(
                "This identity request was approved by {controller}."
            )),
            last_update_time: Some(Time(Utc::now())),
            ..Default::default()
        });
    request
}

/// Kube-backed [`AdmissionApi`].
#[derive(Clone)]
pub struct KubeAdmissionApi {
    client: Client,
    correlation_label: String,
}

impl KubeAdmissionApi {
    pub fn new(client: Client, config: &FleetConfig) -> Self {
        Self {
            client,
            correlation_label: config.correlation_label_key.clone(),
        }
    }
}

impl AdmissionApi for KubeAdmissionApi {
    async fn fetch_cluster(&self, key: &ClusterKey) -> kube::Result<Option<MemberCluster>> {
        let clusters: Api<MemberCluster> = Api::namespaced(self.client.clone(), &key.namespace);
        clusters.get_opt(&key.name).await
    }

    async fn list_requests(&self, cluster_name: &str) -> kube::Result<Vec<CertificateSigningRequest>> {
        let requests: Api<CertificateSigningRequest> = Api::all(self.client.clone());
        let selector = format!("{}={cluster_name}", self.correlation_label);
        Ok(requests
            .list(&ListParams::default().labels(&selector))
            .await?
            .items)
    }

    async fn submit_approval(&self, request: &CertificateSigningRequest) -> kube::Result<()> {
        let requests: Api<CertificateSigningRequest> = Api::all(self.client.clone());
        requests
            .patch_approval(
                &request.name_any(),
                &PatchParams::default(),
                &Patch::Merge(request),
            )
            .await?;
        Ok(())
    }

    async fn mark_accepted(&self, cluster: &MemberCluster) -> kube::Result<()> {
        let namespace = cluster.namespace().unwrap_or_default();
        let clusters: Api<MemberCluster> = Api::namespaced(self.client.clone(), &namespace);
        clusters
            .patch(
                &cluster.name_any(),
                &PatchParams::default(),
                &Patch::Merge(json!({"spec": {"accepted": true}})),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::fixtures::{identity_request, member_cluster};

    #[derive(Default)]
    struct FakeApi {
        cluster: Mutex<Option<MemberCluster>>,
        requests: Mutex<Vec<CertificateSigningRequest>>,
        approvals: Mutex<Vec<String>>,
        accept_writes: Mutex<usize>,
    }

    impl FakeApi {
        fn new(cluster: MemberCluster, requests: Vec<CertificateSigningRequest>) -> Self {
            Self {
                cluster: Mutex::new(Some(cluster)),
                requests: Mutex::new(requests),
                ..Default::default()
            }
        }

        fn approvals(&self) -> usize {
            self.approvals.lock().unwrap().len()
        }

        fn accept_writes(&self) -> usize {
            *self.accept_writes.lock().unwrap()
        }

        fn accepted(&self) -> bool {
            self.cluster.lock().unwrap().as_ref().is_some_and(MemberCluster::is_accepted)
        }
    }

    impl AdmissionApi for FakeApi {
        async fn fetch_cluster(&self, _key: &ClusterKey) -> kube::Result<Option<MemberCluster>> {
            Ok(self.cluster.lock().unwrap().clone())
        }

        async fn list_requests(
            &self,
            _cluster_name: &str,
        ) -> kube::Result<Vec<CertificateSigningRequest>> {
            Ok(self.requests.lock().unwrap().clone())
        }

        async fn submit_approval(&self, request: &CertificateSigningRequest) -> kube::Result<()> {
            self.approvals.lock().unwrap().push(request.name_any());
            let mut requests = self.requests.lock().unwrap();
            if let Some(stored) = requests.iter_mut().find(|r| r.name_any() == request.name_any()) {
                *stored = request.clone();
            }
            Ok(())
        }

        async fn mark_accepted(&self, _cluster: &MemberCluster) -> kube::Result<()> {
            *self.accept_writes.lock().unwrap() += 1;
            if let Some(cluster) = self.cluster.lock().unwrap().as_mut() {
                cluster.spec.accepted = true;
            }
            Ok(())
        }
    }

    fn key() -> ClusterKey {
        ClusterKey {
            namespace: "fleet".into(),
            name: "edge-1".into(),
        }
    }

    #[tokio::test]
    async fn approves_all_pending_requests_and_accepts_once() {
        let api = FakeApi::new(
            member_cluster("fleet", "edge-1", false),
            vec![
                identity_request("edge-1-bootstrap-0", "edge-1", &[]),
                identity_request("edge-1-bootstrap-1", "edge-1", &[]),
            ],
        );
        let config = FleetConfig::default();

        let outcome = admit(&api, &config, &key()).await.unwrap();
        assert_eq!(outcome, Admission::Accepted { approved: 2 });
        assert_eq!(api.approvals(), 2);
        assert_eq!(api.accept_writes(), 1);
        assert!(api.accepted());

        // Re-delivery of the same key performs zero further writes.
        let outcome = admit(&api, &config, &key()).await.unwrap();
        assert_eq!(outcome, Admission::AlreadyAccepted);
        assert_eq!(api.approvals(), 2);
        assert_eq!(api.accept_writes(), 1);
        assert!(api.accepted(), "accepted never reverts");
    }

    #[tokio::test]
    async fn accepted_cluster_is_a_noop() {
        let api = FakeApi::new(
            member_cluster("fleet", "edge-1", true),
            vec![identity_request("edge-1-bootstrap-0", "edge-1", &[])],
        );

        let outcome = admit(&api, &FleetConfig::default(), &key()).await.unwrap();
        assert_eq!(outcome, Admission::AlreadyAccepted);
        assert_eq!(api.approvals(), 0);
        assert_eq!(api.accept_writes(), 0);
    }

    #[tokio::test]
    async fn missing_requests_defer_without_writes() {
        let api = FakeApi::new(member_cluster("fleet", "edge-1", false), vec![]);

        let outcome = admit(&api, &FleetConfig::default(), &key()).await.unwrap();
        assert_eq!(outcome, Admission::Deferred);
        assert_eq!(api.approvals(), 0);
        assert_eq!(api.accept_writes(), 0);
        assert!(!api.accepted());
    }

    #[tokio::test]
    async fn terminal_requests_are_skipped() {
        let api = FakeApi::new(
            member_cluster("fleet", "edge-1", false),
            vec![
                identity_request("already-approved", "edge-1", &[APPROVED_CONDITION]),
                identity_request("already-denied", "edge-1", &[DENIED_CONDITION]),
                identity_request("pending", "edge-1", &[]),
            ],
        );

        let outcome = admit(&api, &FleetConfig::default(), &key()).await.unwrap();
        assert_eq!(outcome, Admission::Accepted { approved: 1 });
        assert_eq!(api.approvals.lock().unwrap().as_slice(), ["pending"]);
        assert!(api.accepted());
    }

    #[tokio::test]
    async fn gone_cluster_is_an_error() {
        let api = FakeApi::default();
        let error = admit(&api, &FleetConfig::default(), &key()).await.unwrap_err();
        assert!(matches!(error, AdmissionError::ClusterGone(_)));
    }

    #[test]
    fn approval_state_reads_conditions() {
        let pending = identity_request("r", "c", &[]);
        assert_eq!(approval_state(pending.status.as_ref()), ApprovalState::Pending);

        let approved = identity_request("r", "c", &[APPROVED_CONDITION]);
        assert_eq!(approval_state(approved.status.as_ref()), ApprovalState::Approved);

        let denied = identity_request("r", "c", &[DENIED_CONDITION]);
        assert_eq!(approval_state(denied.status.as_ref()), ApprovalState::Denied);
    }

    #[test]
    fn approval_condition_names_the_controller() {
        let request = identity_request("r", "c", &[]);
        let approved = with_approval(&request, "FleetAutoAdmission");
        let conditions = approved.status.unwrap().conditions.unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, APPROVED_CONDITION);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].reason.as_deref(), Some("FleetAutoAdmissionApprove"));
    }
}
