use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A remote cluster registered against the fleet control plane.
///
/// Created by the registration flow; this controller only flips `accepted`
/// once the member's identity requests are approved.
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    kind = "MemberCluster",
    group = "registration.fleet.io",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MemberClusterSpec {
    /// Set once the control plane has approved the member's identity
    /// requests. Monotonic: never reverts to false.
    #[serde(default)]
    pub accepted: bool,
}

impl MemberCluster {
    pub fn is_accepted(&self) -> bool {
        self.spec.accepted
    }
}
