//! Error types shared across gangway crates
//!
//! Errors are structured with fields to aid debugging in production.

use thiserror::Error;

/// Main error type for shared gangway operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// API discovery could not map a group/version/kind to a served resource
    #[error("discovery error for {kind} in {group}/{version}: {message}")]
    Discovery {
        /// API group being resolved (empty for the core group)
        group: String,
        /// API version being resolved
        version: String,
        /// Kind being resolved
        kind: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a discovery error for a group/version/kind
    pub fn discovery(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Discovery {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Returns true if the API server answered 404 for the target object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube { source } if is_not_found(source))
    }
}

/// Returns true if a kube error is an API 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "NotFound".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_is_detected_on_404_only() {
        assert!(Error::from(api_error(404)).is_not_found());
        assert!(!Error::from(api_error(500)).is_not_found());
        assert!(!Error::discovery("", "v1", "Pod", "x").is_not_found());
    }

    #[test]
    fn discovery_error_formats_gvk() {
        let err = Error::discovery("apps", "v1", "Deployment", "not served");
        assert_eq!(
            err.to_string(),
            "discovery error for Deployment in apps/v1: not served"
        );
    }
}
