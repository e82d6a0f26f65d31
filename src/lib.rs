use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Admission error: {0}")]
    AdmissionError(#[from] controllers::AdmissionError),

    #[error("Collection error: {0}")]
    CollectError(#[from] collect::CollectError),

    #[error("Quantity error: {0}")]
    QuantityError(#[from] collect::quantity::QuantityError),

    #[error("Registry error: {0}")]
    RegistryError(#[from] registry::RegistryError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> String {
        format!("{self:?}").to_lowercase()
    }
}

/// Expose all controller components used by main
pub mod controller;
pub use crate::controller::*;
pub mod api;
pub mod collect;
pub mod config;
pub mod controllers;
pub mod registry;
pub mod scheduler;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

#[cfg(test)]
pub mod fixtures;
