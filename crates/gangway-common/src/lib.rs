//! Common types for gangway: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Annotation on a pod naming the PodGroup it belongs to
pub const GROUP_NAME_ANNOTATION: &str = "scheduling.k8s.io/group-name";

/// API group of the scheduler's own batch job kind
pub const NATIVE_JOB_GROUP: &str = "batch.volcano.sh";

/// Kind of the scheduler's own batch job
pub const NATIVE_JOB_KIND: &str = "Job";

/// Scheduler name pods must carry to be managed by this control plane
pub const DEFAULT_SCHEDULER_NAME: &str = "volcano";

/// Queue a PodGroup lands in when `spec.queue` is empty
pub const DEFAULT_QUEUE: &str = "default";
