//! PodGroup lifecycle reconciliation for gangway
//!
//! Deletes gang groups whose controlling owner has scaled to zero, on member
//! pod deletion and once at startup. The cluster is reached only through
//! [`ClusterClient`], so the decision logic is testable without an API
//! server.

#![deny(missing_docs)]

pub mod client;
pub mod error;
pub mod owner;
pub mod reconciler;
pub mod unstructured;

pub use client::{ClusterClient, KubeClusterClient};
pub use error::ReconcileError;
pub use owner::NativeJobKind;
pub use reconciler::{GangReconciler, KeepReason, Outcome, ReconcilerConfig};

#[cfg(test)]
pub(crate) mod test_support {
    use kube::core::ErrorResponse;

    pub(crate) fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: if code == 404 { "NotFound" } else { "InternalError" }.to_string(),
            code,
        })
    }
}
