use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("MemberCluster {key} fetch error: {source}")]
    ClusterFetch {
        key: String,
        #[source]
        source: kube::Error,
    },

    #[error("MemberCluster {0} is gone")]
    ClusterGone(String),

    #[error("Identity request list error for {key}: {source}")]
    RequestList {
        key: String,
        #[source]
        source: kube::Error,
    },

    #[error("Identity request {name} approval error: {source}")]
    Approve {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("MemberCluster {key} accept error: {source}")]
    Accept {
        key: String,
        #[source]
        source: kube::Error,
    },
}

pub mod admission;
