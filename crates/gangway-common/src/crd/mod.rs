//! Custom Resource Definitions consumed by gangway
//!
//! Typed views of the Volcano scheduling API objects the control plane reads
//! and writes. Only the fields gangway needs are modeled; unknown fields are
//! preserved by the API server and ignored here.

mod podgroup;
mod queue;

pub use podgroup::{PodGroup, PodGroupPhase, PodGroupSpec, PodGroupStatus};
pub use queue::{Queue, QueueSpec, QueueState, QueueStatus};

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Native resource list: resource name to quantity
pub type ResourceList = BTreeMap<String, Quantity>;

/// Find the controlling owner reference (the unique one with `controller: true`).
pub fn controller_of(owners: Option<&[OwnerReference]>) -> Option<&OwnerReference> {
    owners?
        .iter()
        .find(|owner| owner.controller.unwrap_or(false))
}
