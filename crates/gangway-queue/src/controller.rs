//! Queue status controller
//!
//! Rebuilds each queue's allocated total from the pods currently running in
//! it and writes the result to `status.allocated`. The ledger is recomputed
//! from scratch every pass, so missed pod events cannot leave drift behind.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use gangway_common::crd::{PodGroup, Queue};
use gangway_common::{DEFAULT_SCHEDULER_NAME, GROUP_NAME_ANNOTATION};
use gangway_scheduler::QueueLedger;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info};

use crate::pod::{is_running, task_resource_list};

const FIELD_MANAGER: &str = "gangway-queue-controller";

/// Errors from reconciling one Queue
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Listing or patching failed
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The status patch could not be built
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Queue controller settings
#[derive(Clone, Debug)]
pub struct QueueControllerConfig {
    /// Interval between recomputations of one queue
    pub resync: Duration,
    /// Only pods handed to this scheduler are counted
    pub scheduler_name: String,
    /// Pod annotation naming the member's PodGroup
    pub group_name_annotation: String,
}

impl Default for QueueControllerConfig {
    fn default() -> Self {
        Self {
            resync: Duration::from_secs(30),
            scheduler_name: DEFAULT_SCHEDULER_NAME.to_string(),
            group_name_annotation: GROUP_NAME_ANNOTATION.to_string(),
        }
    }
}

/// Shared context for the Queue controller
pub struct QueueContext {
    /// Kubernetes client
    pub client: Client,
    /// Controller settings
    pub config: QueueControllerConfig,
}

impl QueueContext {
    /// Create a context for the Queue controller
    pub fn new(client: Client, config: QueueControllerConfig) -> Self {
        Self { client, config }
    }
}

/// Recompute and publish one queue's allocated resources
pub async fn reconcile(queue: Arc<Queue>, ctx: Arc<QueueContext>) -> Result<Action, QueueError> {
    let name = queue.name_any();

    let groups: Api<PodGroup> = Api::all(ctx.client.clone());
    let groups = groups.list(&ListParams::default()).await?.items;

    let pods: Api<Pod> = Api::all(ctx.client.clone());
    let selector = format!(
        "status.phase=Running,spec.schedulerName={}",
        ctx.config.scheduler_name
    );
    let pods = pods.list(&ListParams::default().fields(&selector)).await?.items;

    let ledger = queue_ledger(&name, &groups, &pods, &ctx.config.group_name_annotation);
    let allocated = ledger.allocated_resource_list();

    let current = queue.status.as_ref().and_then(|s| s.allocated.as_ref());
    if current == Some(&allocated) {
        debug!(queue = %name, "allocation unchanged");
        return Ok(Action::requeue(ctx.config.resync));
    }

    let api: Api<Queue> = Api::all(ctx.client.clone());
    let patch = serde_json::json!({ "status": { "allocated": allocated } });
    api.patch_status(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    info!(queue = %name, allocated = %ledger.allocated(), "updated queue allocation");
    Ok(Action::requeue(ctx.config.resync))
}

/// Error policy for Queue reconciliation
pub fn error_policy(queue: Arc<Queue>, error: &QueueError, ctx: Arc<QueueContext>) -> Action {
    error!(
        ?error,
        queue = %queue.name_any(),
        "queue reconciliation failed"
    );
    Action::requeue(ctx.config.resync)
}

/// Build the ledger for `queue` from cluster state.
///
/// A pod counts when it is running and its group annotation names a
/// PodGroup in the same namespace whose queue is `queue`.
pub fn queue_ledger(
    queue: &str,
    groups: &[PodGroup],
    pods: &[Pod],
    annotation: &str,
) -> QueueLedger {
    let members: HashSet<(String, String)> = groups
        .iter()
        .filter(|pg| pg.queue_name() == queue)
        .map(|pg| (pg.namespace().unwrap_or_default(), pg.name_any()))
        .collect();

    let requests: Vec<_> = pods
        .iter()
        .filter(|pod| is_running(pod))
        .filter(|pod| {
            pod.annotations().get(annotation).is_some_and(|group| {
                members.contains(&(pod.namespace().unwrap_or_default(), group.clone()))
            })
        })
        .map(task_resource_list)
        .collect();

    QueueLedger::recompute(queue, &requests)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gangway_common::crd::PodGroupSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodStatus, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use kube::api::ObjectMeta;

    use super::*;

    fn group(namespace: &str, name: &str, queue: Option<&str>) -> PodGroup {
        let mut pg = PodGroup::new(
            name,
            PodGroupSpec {
                queue: queue.map(str::to_string),
                ..Default::default()
            },
        );
        pg.metadata.namespace = Some(namespace.to_string());
        pg
    }

    fn pod(namespace: &str, group: &str, cpu: &str, phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                annotations: Some(BTreeMap::from([(
                    GROUP_NAME_ANNOTATION.to_string(),
                    group.to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    resources: Some(ResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "cpu".to_string(),
                            Quantity(cpu.to_string()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn counts_running_members_of_queue() {
        let groups = [
            group("ns", "job-a", Some("research")),
            group("ns", "job-b", Some("research")),
            group("ns", "job-c", Some("prod")),
        ];
        let pods = [
            pod("ns", "job-a", "500m", "Running"),
            pod("ns", "job-b", "1500m", "Running"),
            pod("ns", "job-b", "4", "Pending"),
            pod("ns", "job-c", "8", "Running"),
            pod("other", "job-a", "8", "Running"),
        ];

        let ledger = queue_ledger("research", &groups, &pods, GROUP_NAME_ANNOTATION);

        assert_eq!(ledger.allocated().milli_cpu, 2000.0);
    }

    #[test]
    fn empty_queue_field_means_default() {
        let groups = [group("ns", "job-a", None), group("ns", "job-b", Some(""))];
        let pods = [
            pod("ns", "job-a", "1", "Running"),
            pod("ns", "job-b", "1", "Running"),
        ];

        let ledger = queue_ledger("default", &groups, &pods, GROUP_NAME_ANNOTATION);

        assert_eq!(ledger.allocated().milli_cpu, 2000.0);
    }

    #[test]
    fn removed_pods_converge_to_zero() {
        let groups = [group("ns", "job-a", Some("research"))];

        let ledger = queue_ledger("research", &groups, &[], GROUP_NAME_ANNOTATION);

        assert!(ledger.allocated().is_empty());
        assert_eq!(ledger.allocated_resource_list()["cpu"].0, "0");
    }

    #[test]
    fn default_config() {
        let config = QueueControllerConfig::default();
        assert_eq!(config.resync, Duration::from_secs(30));
        assert_eq!(config.scheduler_name, "volcano");
    }
}
