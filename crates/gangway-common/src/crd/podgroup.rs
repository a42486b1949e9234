//! PodGroup CRD types
//!
//! `PodGroup` (`scheduling.volcano.sh/v1beta1`) is the gang-group: the set of
//! pods that must be admitted and placed together.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ResourceList;

/// Lifecycle phase of a PodGroup
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PodGroupPhase {
    /// Waiting for admission
    #[default]
    Pending,
    /// Admitted; members may be placed
    Inqueue,
    /// At least `minMember` pods are running
    Running,
    /// Some members could not be placed
    Unknown,
    /// All members finished
    Completed,
}

/// Gang-group specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "scheduling.volcano.sh",
    version = "v1beta1",
    kind = "PodGroup",
    plural = "podgroups",
    shortname = "pg",
    namespaced,
    status = "PodGroupStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"MinMember","type":"integer","jsonPath":".spec.minMember"}"#,
    printcolumn = r#"{"name":"Queue","type":"string","jsonPath":".spec.queue"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupSpec {
    /// Minimum number of members that must be placed together
    #[serde(default)]
    pub min_member: i32,

    /// Queue the group is admitted through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Priority class applied to the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Minimum resources the gang needs before admission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_resources: Option<ResourceList>,
}

/// Observed state of a PodGroup
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupStatus {
    /// Current phase
    #[serde(default)]
    pub phase: PodGroupPhase,

    /// Running members
    #[serde(default)]
    pub running: i32,

    /// Succeeded members
    #[serde(default)]
    pub succeeded: i32,

    /// Failed members
    #[serde(default)]
    pub failed: i32,
}

impl PodGroup {
    /// Queue this group belongs to, falling back to the default queue
    pub fn queue_name(&self) -> &str {
        self.spec
            .queue
            .as_deref()
            .filter(|q| !q.is_empty())
            .unwrap_or(crate::DEFAULT_QUEUE)
    }
}
