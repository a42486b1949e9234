//! Controlling-owner interpretation

use gangway_common::crd::controller_of;
use gangway_common::kube_utils::parse_api_version;
use gangway_common::{NATIVE_JOB_GROUP, NATIVE_JOB_KIND};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// The scheduler's own job kind, whose controller deletes its PodGroups itself
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeJobKind {
    /// API group, e.g. `batch.volcano.sh`
    pub group: String,
    /// Kind, e.g. `Job`
    pub kind: String,
}

impl Default for NativeJobKind {
    fn default() -> Self {
        Self {
            group: NATIVE_JOB_GROUP.to_string(),
            kind: NATIVE_JOB_KIND.to_string(),
        }
    }
}

impl NativeJobKind {
    fn matches(&self, group: &str, kind: &str) -> bool {
        self.group == group && self.kind == kind
    }
}

/// Owner workload to look up through discovery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerTarget {
    /// API group, empty for core
    pub group: String,
    /// API version
    pub version: String,
    /// Kind
    pub kind: String,
    /// Object name, in the dependent's namespace
    pub name: String,
}

/// What the controlling owner reference tells us before any API call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnerClass {
    /// No reference has `controller: true`
    Uncontrolled,
    /// Owned by the native job kind; its controller handles cleanup
    NativeJob,
    /// `apiVersion` could not be split into group and version
    Malformed {
        /// The offending apiVersion string
        api_version: String,
    },
    /// A foreign workload that must be resolved and inspected
    Foreign(OwnerTarget),
}

/// Classify the controlling owner among `owners`
pub fn classify(owners: Option<&[OwnerReference]>, native: &NativeJobKind) -> OwnerClass {
    let Some(owner) = controller_of(owners) else {
        return OwnerClass::Uncontrolled;
    };
    let Some((group, version)) = parse_api_version(&owner.api_version) else {
        return OwnerClass::Malformed {
            api_version: owner.api_version.clone(),
        };
    };
    if native.matches(&group, &owner.kind) {
        return OwnerClass::NativeJob;
    }
    OwnerClass::Foreign(OwnerTarget {
        group,
        version,
        kind: owner.kind.clone(),
        name: owner.name.clone(),
    })
}
