//! PodGroup lifecycle reconciler
//!
//! A PodGroup must not outlive an owner that has scaled to zero. Two entry
//! points share one algorithm and differ only in how they read a missing
//! `spec.replicas`:
//!
//! - [`GangReconciler::on_task_deleted`] runs when a member pod is deleted.
//!   The deletion itself is evidence the owner is winding down, so a missing
//!   scale field releases the group.
//! - [`GangReconciler::sweep_pod_group`] runs once per existing group at
//!   startup. With no event to corroborate, only an explicit zero releases
//!   the group.
//!
//! Not-found on the group or owner is a finished intent, not an error.
//! Malformed owner data leaves the group in place with a Warning event.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gangway_common::crd::PodGroup;
use gangway_common::events::{EventPublisher, GangEvent, Reason};
use gangway_common::GROUP_NAME_ANNOTATION;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::ClusterClient;
use crate::error::ReconcileError;
use crate::owner::{classify, NativeJobKind, OwnerClass, OwnerTarget};
use crate::unstructured::nested_i64;

const REPLICAS_PATH: &[&str] = &["spec", "replicas"];

/// Reconciler settings
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Deadline for each cluster-API call
    pub api_timeout: Duration,
    /// Pod annotation naming the member's PodGroup
    pub group_name_annotation: String,
    /// Owner kind whose controller cleans up its own PodGroups
    pub native_job: NativeJobKind,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            api_timeout: Duration::from_secs(10),
            group_name_annotation: GROUP_NAME_ANNOTATION.to_string(),
            native_job: NativeJobKind::default(),
        }
    }
}

/// Result of handling one event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The PodGroup was deleted
    Released,
    /// The PodGroup was already gone
    AlreadyGone,
    /// The PodGroup stays
    Kept(KeepReason),
}

/// Why a PodGroup was left in place
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeepReason {
    /// Pod carries no group annotation
    NotGrouped,
    /// No controlling owner reference
    Uncontrolled,
    /// Owned by the native job kind
    NativeJob,
    /// Owner apiVersion could not be parsed
    MalformedOwner,
    /// Owner object no longer exists
    OwnerGone,
    /// Owner's `spec.replicas` is not an integer
    InvalidScale,
    /// Owner has no `spec.replicas` (startup sweep only)
    ScaleAbsent,
    /// Owner still declares replicas
    OwnerScaled(i64),
}

/// How a missing scale field is interpreted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trigger {
    MemberDeleted,
    StartupSweep,
}

impl Trigger {
    fn releases(self, replicas: Option<i64>) -> bool {
        match self {
            Self::MemberDeleted => replicas.map_or(true, |n| n == 0),
            Self::StartupSweep => replicas == Some(0),
        }
    }
}

/// Releases PodGroups whose owners no longer want them
pub struct GangReconciler {
    client: Arc<dyn ClusterClient>,
    events: Arc<dyn EventPublisher>,
    config: ReconcilerConfig,
}

impl GangReconciler {
    /// Create a reconciler over the given cluster client and event sink
    pub fn new(
        client: Arc<dyn ClusterClient>,
        events: Arc<dyn EventPublisher>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            client,
            events,
            config,
        }
    }

    /// Handle deletion of a member pod
    #[instrument(
        skip_all,
        fields(pod = %pod.name_any(), namespace = %pod.namespace().unwrap_or_default())
    )]
    pub async fn on_task_deleted(
        &self,
        pod: &Pod,
        token: &CancellationToken,
    ) -> Result<Outcome, ReconcileError> {
        let Some(group_name) = pod
            .annotations()
            .get(&self.config.group_name_annotation)
            .filter(|name| !name.is_empty())
        else {
            return Ok(Outcome::Kept(KeepReason::NotGrouped));
        };
        let namespace = pod.namespace().unwrap_or_default();

        let pg = match self
            .call("get PodGroup", token, self.client.get_pod_group(&namespace, group_name))
            .await
        {
            Ok(pg) => pg,
            Err(e) if e.is_not_found() => {
                debug!(pod_group = %group_name, "PodGroup already deleted");
                return Ok(Outcome::AlreadyGone);
            }
            Err(e) => return Err(e),
        };

        self.release_if_owner_idle(
            &pg,
            pod.metadata.owner_references.as_deref(),
            Trigger::MemberDeleted,
            token,
        )
        .await
    }

    /// Re-check an existing PodGroup at startup
    #[instrument(
        skip_all,
        fields(pod_group = %pg.name_any(), namespace = %pg.namespace().unwrap_or_default())
    )]
    pub async fn sweep_pod_group(
        &self,
        pg: &PodGroup,
        token: &CancellationToken,
    ) -> Result<Outcome, ReconcileError> {
        self.release_if_owner_idle(
            pg,
            pg.metadata.owner_references.as_deref(),
            Trigger::StartupSweep,
            token,
        )
        .await
    }

    /// List every PodGroup in the cluster for the startup sweep
    pub async fn list_pod_groups(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<PodGroup>, ReconcileError> {
        self.call("list PodGroups", token, self.client.list_pod_groups())
            .await
    }

    async fn release_if_owner_idle(
        &self,
        pg: &PodGroup,
        owners: Option<&[OwnerReference]>,
        trigger: Trigger,
        token: &CancellationToken,
    ) -> Result<Outcome, ReconcileError> {
        let target = match classify(owners, &self.config.native_job) {
            OwnerClass::Uncontrolled => return Ok(Outcome::Kept(KeepReason::Uncontrolled)),
            OwnerClass::NativeJob => {
                debug!("owned by native job, leaving cleanup to its controller");
                return Ok(Outcome::Kept(KeepReason::NativeJob));
            }
            OwnerClass::Malformed { api_version } => {
                warn!(api_version = %api_version, "controlling owner has malformed apiVersion");
                self.report(
                    pg,
                    Reason::MalformedOwner,
                    format!("owner apiVersion {api_version:?} is not group/version"),
                )
                .await;
                return Ok(Outcome::Kept(KeepReason::MalformedOwner));
            }
            OwnerClass::Foreign(target) => target,
        };

        let namespace = pg.namespace().unwrap_or_default();
        let replicas = match self.owner_replicas(&namespace, &target, token).await? {
            OwnerScale::Gone => {
                debug!(owner = %target.name, kind = %target.kind, "owner not found");
                return Ok(Outcome::Kept(KeepReason::OwnerGone));
            }
            OwnerScale::Invalid(message) => {
                warn!(
                    owner = %target.name,
                    kind = %target.kind,
                    error = %message,
                    "owner scale unreadable"
                );
                self.report(pg, Reason::InvalidScale, message).await;
                return Ok(Outcome::Kept(KeepReason::InvalidScale));
            }
            OwnerScale::Declared(replicas) => replicas,
        };

        if !trigger.releases(replicas) {
            return Ok(Outcome::Kept(match replicas {
                Some(n) => KeepReason::OwnerScaled(n),
                None => KeepReason::ScaleAbsent,
            }));
        }

        let name = pg.name_any();
        match self
            .call("delete PodGroup", token, self.client.delete_pod_group(&namespace, &name))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(Outcome::AlreadyGone),
            Err(e) => return Err(e),
        }

        info!(
            pod_group = %name,
            owner = %target.name,
            kind = %target.kind,
            ?replicas,
            "released PodGroup of idle owner"
        );
        self.report(
            pg,
            Reason::GangGroupReleased,
            format!("{} {} has no replicas", target.kind, target.name),
        )
        .await;
        Ok(Outcome::Released)
    }

    async fn owner_replicas(
        &self,
        namespace: &str,
        target: &OwnerTarget,
        token: &CancellationToken,
    ) -> Result<OwnerScale, ReconcileError> {
        let resource = self
            .call(
                "resolve owner type",
                token,
                self.client
                    .resolve_resource(&target.group, &target.version, &target.kind),
            )
            .await?;

        let owner = match self
            .call(
                "get owner",
                token,
                self.client.get_owner(namespace, &resource, &target.name),
            )
            .await
        {
            Ok(owner) => owner,
            Err(e) if e.is_not_found() => return Ok(OwnerScale::Gone),
            Err(e) => return Err(e),
        };

        Ok(match nested_i64(&owner.data, REPLICAS_PATH) {
            Ok(replicas) => OwnerScale::Declared(replicas),
            Err(e) => OwnerScale::Invalid(e.to_string()),
        })
    }

    /// Run one cluster-API call under the caller's token and the call deadline
    async fn call<T>(
        &self,
        operation: &'static str,
        token: &CancellationToken,
        fut: impl Future<Output = Result<T, ReconcileError>>,
    ) -> Result<T, ReconcileError> {
        let timeout = self.config.api_timeout;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ReconcileError::Cancelled { operation }),
            res = tokio::time::timeout(timeout, fut) => match res {
                Ok(result) => result,
                Err(_) => Err(ReconcileError::Timeout { operation, timeout }),
            },
        }
    }

    async fn report(&self, pg: &PodGroup, reason: Reason, note: String) {
        self.events
            .publish(&pg.object_ref(&()), GangEvent::new(reason, note))
            .await;
    }
}

enum OwnerScale {
    Gone,
    Invalid(String),
    Declared(Option<i64>),
}
