//! Reconciler error types

use std::time::Duration;

use gangway_common::error::is_not_found;

/// Failures surfaced to the dispatch layer.
///
/// Not-found on the PodGroup or its owner never reaches the caller; the
/// reconciler treats it as a completed intent.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Cluster API call failed
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The owner kind is not served by the cluster
    #[error("cannot resolve {kind} in {group}/{version}: {message}")]
    Discovery {
        /// API group of the owner
        group: String,
        /// API version of the owner
        version: String,
        /// Kind of the owner
        kind: String,
        /// What discovery reported
        message: String,
    },

    /// A call outlived its deadline
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Call that timed out
        operation: &'static str,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// Shutdown interrupted a call
    #[error("{operation} cancelled")]
    Cancelled {
        /// Call that was interrupted
        operation: &'static str,
    },
}

impl ReconcileError {
    /// True if the API server answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(e) if is_not_found(e))
    }

    /// True if running the same event again may succeed.
    ///
    /// Everything except a 404 is transient from the reconciler's point of
    /// view; cancellation is retryable so shutdown never looks like success.
    pub fn is_retryable(&self) -> bool {
        !self.is_not_found()
    }
}

impl From<gangway_common::Error> for ReconcileError {
    fn from(e: gangway_common::Error) -> Self {
        match e {
            gangway_common::Error::Kube { source } => Self::Kube(source),
            gangway_common::Error::Discovery {
                group,
                version,
                kind,
                message,
            } => Self::Discovery {
                group,
                version,
                kind,
                message,
            },
        }
    }
}
