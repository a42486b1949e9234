//! Queue CRD types
//!
//! `Queue` (`scheduling.volcano.sh/v1beta1`, cluster-scoped) groups
//! PodGroups for fairness and quota. gangway owns `status.allocated`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ResourceList;

/// Whether a queue accepts new work
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum QueueState {
    /// Accepting new PodGroups
    #[default]
    Open,
    /// Rejecting new PodGroups; existing ones continue
    Closed,
    /// Transitioning to Closed
    Closing,
    /// State could not be determined
    Unknown,
}

/// Queue specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "scheduling.volcano.sh",
    version = "v1beta1",
    kind = "Queue",
    plural = "queues",
    shortname = "q",
    status = "QueueStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Weight","type":"integer","jsonPath":".spec.weight"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct QueueSpec {
    /// Share of the cluster relative to other queues
    #[serde(default = "default_weight")]
    pub weight: i32,

    /// Hard upper bound on resources the queue may hold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<ResourceList>,

    /// Whether other queues may reclaim this queue's idle share
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaimable: Option<bool>,
}

fn default_weight() -> i32 {
    1
}

/// Observed state of a Queue
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Open/closed state
    #[serde(default)]
    pub state: QueueState,

    /// Resources held by running members of the queue's PodGroups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated: Option<ResourceList>,

    /// PodGroups in Pending phase
    #[serde(default)]
    pub pending: i32,

    /// PodGroups in Running phase
    #[serde(default)]
    pub running: i32,

    /// PodGroups in Inqueue phase
    #[serde(default)]
    pub inqueue: i32,
}
