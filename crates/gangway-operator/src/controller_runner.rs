//! Controller runner - startup sweep, pod deletion dispatch and queue controller
//!
//! The PodGroup reconciler never retries on its own. This module is the
//! dispatch layer around it: the startup sweep and pod deletions are handled
//! one group at a time, each under a retry budget, and everything stops when
//! the shared token is cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::Arc;

use futures::StreamExt;
use gangway_common::crd::Queue;
use gangway_common::retry::{retry_with_backoff, RetryConfig};
use gangway_podgroup::{GangReconciler, Outcome, ReconcileError};
use gangway_queue::{error_policy, reconcile, QueueContext, QueueControllerConfig};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::{self, Config as WatcherConfig, Event};
use kube::runtime::{Controller, WatchStreamExt};
use kube::api::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Tally of a startup sweep
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Groups deleted
    pub released: usize,
    /// Groups left in place
    pub kept: usize,
    /// Groups still failing once the retry budget ran out
    pub failed: usize,
}

/// Check every existing PodGroup once before watching pods.
///
/// Listing and each per-group check run under the retry budget. A group that
/// still fails is logged and counted and the sweep moves on; only a failed
/// listing or cancellation aborts it.
pub async fn run_startup_sweep(
    reconciler: &GangReconciler,
    retry: &RetryConfig,
    token: &CancellationToken,
) -> Result<SweepReport, ReconcileError> {
    info!("checking existing PodGroups against their owners");

    let groups = retry_with_backoff(
        retry,
        "list PodGroups",
        |e: &ReconcileError| e.is_retryable() && !token.is_cancelled(),
        || reconciler.list_pod_groups(token),
    )
    .await?;

    let mut report = SweepReport::default();
    for pg in &groups {
        let result = retry_with_backoff(
            retry,
            "startup PodGroup check",
            |e: &ReconcileError| e.is_retryable() && !token.is_cancelled(),
            || reconciler.sweep_pod_group(pg, token),
        )
        .await;

        match result {
            Ok(Outcome::Released) => report.released += 1,
            Ok(_) => report.kept += 1,
            Err(e @ ReconcileError::Cancelled { .. }) => return Err(e),
            Err(e) => {
                warn!(
                    pod_group = %pg.name_any(),
                    namespace = %pg.namespace().unwrap_or_default(),
                    error = %e,
                    "giving up on startup check"
                );
                report.failed += 1;
            }
        }
    }

    info!(
        total = groups.len(),
        released = report.released,
        kept = report.kept,
        failed = report.failed,
        "startup sweep complete"
    );
    Ok(report)
}

/// Watch pods of `scheduler_name` and release PodGroups on member deletion.
///
/// Returns when the token is cancelled or the watch stream ends.
pub async fn run_pod_deletion_watcher(
    client: Client,
    reconciler: Arc<GangReconciler>,
    scheduler_name: String,
    retry: RetryConfig,
    token: CancellationToken,
) {
    let pods: Api<Pod> = Api::all(client);
    let config = WatcherConfig::default()
        .fields(&format!("spec.schedulerName={scheduler_name}"))
        .timeout(WATCH_TIMEOUT_SECS);
    let mut events = pin!(watcher::watcher(pods, config).default_backoff());

    info!(scheduler = %scheduler_name, "watching pod deletions");

    let mut tracker = DeletionTracker::default();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = events.next() => match event {
                Some(Ok(event)) => {
                    for pod in tracker.observe(event) {
                        handle_pod_deleted(&reconciler, &pod, &retry, &token).await;
                    }
                }
                Some(Err(e)) => warn!(error = %e, "pod watch error"),
                None => break,
            },
        }
    }

    info!("pod deletion watcher stopped");
}

/// Turns watch events into pod deletions, including ones missed across a
/// re-list.
///
/// A desynced watcher re-lists with `Init*` events and never reports the pods
/// that vanished in between. Pods seen before the re-list but absent after
/// `InitDone` are reported as deleted. Only metadata is kept per pod.
#[derive(Debug, Default)]
pub struct DeletionTracker {
    known: HashMap<String, Pod>,
    relisting: Option<HashMap<String, Pod>>,
}

impl DeletionTracker {
    /// Feed one watch event; returns the pods to handle as deleted
    pub fn observe(&mut self, event: Event<Pod>) -> Vec<Pod> {
        match event {
            Event::Apply(pod) => {
                self.known.insert(pod_key(&pod), metadata_only(&pod));
                Vec::new()
            }
            Event::Delete(pod) => {
                self.known.remove(&pod_key(&pod));
                if let Some(relisted) = self.relisting.as_mut() {
                    relisted.remove(&pod_key(&pod));
                }
                vec![pod]
            }
            Event::Init => {
                self.relisting = Some(HashMap::new());
                Vec::new()
            }
            Event::InitApply(pod) => {
                if let Some(relisted) = self.relisting.as_mut() {
                    relisted.insert(pod_key(&pod), metadata_only(&pod));
                }
                Vec::new()
            }
            Event::InitDone => {
                let Some(relisted) = self.relisting.take() else {
                    return Vec::new();
                };
                let previous = std::mem::replace(&mut self.known, relisted);
                let missed: Vec<Pod> = previous
                    .into_iter()
                    .filter(|(key, _)| !self.known.contains_key(key))
                    .map(|(_, pod)| pod)
                    .collect();
                if !missed.is_empty() {
                    info!(count = missed.len(), "pods deleted while the watch was down");
                }
                missed
            }
        }
    }

    /// Number of pods currently tracked
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// True when no pods are tracked
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Recreated pods keep their name but get a new uid
fn pod_key(pod: &Pod) -> String {
    match pod.uid() {
        Some(uid) => uid,
        None => format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any()),
    }
}

fn metadata_only(pod: &Pod) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: pod.metadata.name.clone(),
            namespace: pod.metadata.namespace.clone(),
            uid: pod.metadata.uid.clone(),
            annotations: pod.metadata.annotations.clone(),
            owner_references: pod.metadata.owner_references.clone(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Run member-deletion handling for one pod under the retry budget.
///
/// Returns the final outcome, or `None` when the event was given up on.
pub async fn handle_pod_deleted(
    reconciler: &GangReconciler,
    pod: &Pod,
    retry: &RetryConfig,
    token: &CancellationToken,
) -> Option<Outcome> {
    let result = retry_with_backoff(
        retry,
        "release PodGroup on member deletion",
        |e: &ReconcileError| e.is_retryable() && !token.is_cancelled(),
        || reconciler.on_task_deleted(pod, token),
    )
    .await;

    match result {
        Ok(outcome) => {
            debug!(pod = %pod.name_any(), ?outcome, "handled member deletion");
            Some(outcome)
        }
        Err(e) => {
            warn!(
                pod = %pod.name_any(),
                namespace = %pod.namespace().unwrap_or_default(),
                error = %e,
                "giving up on member deletion"
            );
            None
        }
    }
}

/// Build the Queue status controller future
pub fn build_queue_controller(
    client: Client,
    config: QueueControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(QueueContext::new(client.clone(), config));
    let queues: Api<Queue> = Api::all(client);

    info!("- Queue controller");

    Box::pin(
        Controller::new(queues, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("Queue")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use gangway_common::crd::{PodGroup, PodGroupSpec};
    use gangway_common::events::NoopEventPublisher;
    use gangway_common::GROUP_NAME_ANNOTATION;
    use gangway_podgroup::{ClusterClient, ReconcilerConfig};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;
    use kube::core::{DynamicObject, ErrorResponse};
    use kube::discovery::ApiResource;
    use serde_json::json;

    use super::*;

    /// Fails `get_pod_group` with the given codes in order, then 404s
    struct ScriptedClient {
        codes: Vec<u16>,
        calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(codes: &[u16]) -> Self {
            Self {
                codes: codes.to_vec(),
                calls: AtomicU32::new(0),
            }
        }
    }

    fn api_error(code: u16) -> ReconcileError {
        ReconcileError::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: String::new(),
            reason: String::new(),
            code,
        }))
    }

    #[async_trait]
    impl ClusterClient for ScriptedClient {
        async fn get_pod_group(&self, _: &str, _: &str) -> Result<PodGroup, ReconcileError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            Err(api_error(self.codes.get(n).copied().unwrap_or(404)))
        }

        async fn delete_pod_group(&self, _: &str, _: &str) -> Result<(), ReconcileError> {
            unreachable!("group is never found")
        }

        async fn list_pod_groups(&self) -> Result<Vec<PodGroup>, ReconcileError> {
            Ok(vec![])
        }

        async fn resolve_resource(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<ApiResource, ReconcileError> {
            unreachable!("group is never found")
        }

        async fn get_owner(
            &self,
            _: &str,
            _: &ApiResource,
            _: &str,
        ) -> Result<DynamicObject, ReconcileError> {
            unreachable!("group is never found")
        }
    }

    fn grouped_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("worker-0".to_string()),
                namespace: Some("ns".to_string()),
                annotations: Some(BTreeMap::from([(
                    GROUP_NAME_ANNOTATION.to_string(),
                    "pg".to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    fn reconciler(client: Arc<ScriptedClient>) -> GangReconciler {
        reconciler_over(client)
    }

    fn reconciler_over(client: Arc<dyn ClusterClient>) -> GangReconciler {
        GangReconciler::new(client, Arc::new(NoopEventPublisher), ReconcilerConfig::default())
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let client = Arc::new(ScriptedClient::new(&[500, 503]));
        let reconciler = reconciler(client.clone());

        let outcome = handle_pod_deleted(
            &reconciler,
            &grouped_pod(),
            &fast_retry(5),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, Some(Outcome::AlreadyGone));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let client = Arc::new(ScriptedClient::new(&[500, 500, 500, 500]));
        let reconciler = reconciler(client.clone());

        let outcome = handle_pod_deleted(
            &reconciler,
            &grouped_pod(),
            &fast_retry(2),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, None);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let client = Arc::new(ScriptedClient::new(&[]));
        let reconciler = reconciler(client);
        let token = CancellationToken::new();
        token.cancel();

        let outcome =
            handle_pod_deleted(&reconciler, &grouped_pod(), &fast_retry(5), &token).await;

        assert_eq!(outcome, None);
    }

    #[tokio::test]
    async fn empty_sweep_reports_nothing() {
        let reconciler = reconciler(Arc::new(ScriptedClient::new(&[])));

        let report = run_startup_sweep(&reconciler, &fast_retry(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report, SweepReport::default());
    }

    /// One StatefulSet-owned group. Listing and owner reads fail with the
    /// scripted codes first, then the owner reports zero replicas.
    struct SweepClient {
        list_codes: Vec<u16>,
        owner_codes: Vec<u16>,
        list_calls: AtomicU32,
        owner_calls: AtomicU32,
        deletes: AtomicU32,
    }

    impl SweepClient {
        fn new(list_codes: &[u16], owner_codes: &[u16]) -> Self {
            Self {
                list_codes: list_codes.to_vec(),
                owner_codes: owner_codes.to_vec(),
                list_calls: AtomicU32::new(0),
                owner_calls: AtomicU32::new(0),
                deletes: AtomicU32::new(0),
            }
        }
    }

    fn statefulset() -> ApiResource {
        ApiResource {
            group: "apps".to_string(),
            version: "v1".to_string(),
            api_version: "apps/v1".to_string(),
            kind: "StatefulSet".to_string(),
            plural: "statefulsets".to_string(),
        }
    }

    fn owned_group() -> PodGroup {
        let mut pg = PodGroup::new("pg", PodGroupSpec::default());
        pg.metadata.namespace = Some("ns".to_string());
        pg.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "StatefulSet".to_string(),
            name: "web".to_string(),
            uid: "uid-web".to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        }]);
        pg
    }

    #[async_trait]
    impl ClusterClient for SweepClient {
        async fn get_pod_group(&self, _: &str, _: &str) -> Result<PodGroup, ReconcileError> {
            unreachable!("the sweep works from the listing")
        }

        async fn delete_pod_group(&self, ns: &str, name: &str) -> Result<(), ReconcileError> {
            assert_eq!((ns, name), ("ns", "pg"));
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn list_pod_groups(&self) -> Result<Vec<PodGroup>, ReconcileError> {
            let n = self.list_calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.list_codes.get(n) {
                Some(&code) => Err(api_error(code)),
                None => Ok(vec![owned_group()]),
            }
        }

        async fn resolve_resource(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<ApiResource, ReconcileError> {
            Ok(statefulset())
        }

        async fn get_owner(
            &self,
            _: &str,
            _: &ApiResource,
            _: &str,
        ) -> Result<DynamicObject, ReconcileError> {
            let n = self.owner_calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.owner_codes.get(n) {
                Some(&code) => Err(api_error(code)),
                None => Ok(DynamicObject::new("web", &statefulset())
                    .within("ns")
                    .data(json!({"spec": {"replicas": 0}}))),
            }
        }
    }

    #[tokio::test]
    async fn sweep_retries_transient_owner_read() {
        let client = Arc::new(SweepClient::new(&[], &[503]));
        let reconciler = reconciler_over(client.clone());

        let report = run_startup_sweep(&reconciler, &fast_retry(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report,
            SweepReport {
                released: 1,
                kept: 0,
                failed: 0
            }
        );
        assert_eq!(client.owner_calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sweep_retries_listing() {
        let client = Arc::new(SweepClient::new(&[500, 503], &[]));
        let reconciler = reconciler_over(client.clone());

        let report = run_startup_sweep(&reconciler, &fast_retry(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.released, 1);
        assert_eq!(client.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn sweep_counts_groups_that_exhaust_the_budget() {
        let client = Arc::new(SweepClient::new(&[], &[503, 503, 503]));
        let reconciler = reconciler_over(client.clone());

        let report = run_startup_sweep(&reconciler, &fast_retry(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report,
            SweepReport {
                released: 0,
                kept: 0,
                failed: 1
            }
        );
        assert_eq!(client.owner_calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.deletes.load(Ordering::SeqCst), 0);
    }

    fn tracked_pod(name: &str, uid: &str) -> Pod {
        let mut pod = grouped_pod();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.uid = Some(uid.to_string());
        pod
    }

    fn names(pods: &[Pod]) -> Vec<String> {
        let mut names: Vec<String> = pods.iter().map(|p| p.name_any()).collect();
        names.sort();
        names
    }

    #[test]
    fn tracker_reports_watch_deletes() {
        let mut tracker = DeletionTracker::default();
        assert!(tracker.observe(Event::Apply(tracked_pod("a", "1"))).is_empty());

        let deleted = tracker.observe(Event::Delete(tracked_pod("a", "1")));

        assert_eq!(names(&deleted), ["a"]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn first_list_reports_nothing() {
        let mut tracker = DeletionTracker::default();

        assert!(tracker.observe(Event::Init).is_empty());
        assert!(tracker.observe(Event::InitApply(tracked_pod("a", "1"))).is_empty());
        assert!(tracker.observe(Event::InitDone).is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn relist_reports_pods_that_vanished() {
        let mut tracker = DeletionTracker::default();
        tracker.observe(Event::Init);
        tracker.observe(Event::InitApply(tracked_pod("a", "1")));
        tracker.observe(Event::InitApply(tracked_pod("b", "2")));
        tracker.observe(Event::InitDone);
        tracker.observe(Event::Apply(tracked_pod("c", "3")));

        // Desync: only "b" survives, "a" came back under a new uid
        tracker.observe(Event::Init);
        tracker.observe(Event::InitApply(tracked_pod("b", "2")));
        tracker.observe(Event::InitApply(tracked_pod("a", "4")));
        let missed = tracker.observe(Event::InitDone);

        assert_eq!(names(&missed), ["a", "c"]);
        let annotations = missed[0].annotations();
        assert_eq!(annotations.get(GROUP_NAME_ANNOTATION).map(String::as_str), Some("pg"));
        assert_eq!(tracker.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_sweep_aborts() {
        let client = Arc::new(SweepClient::new(&[], &[]));
        let reconciler = reconciler_over(client.clone());
        let token = CancellationToken::new();
        token.cancel();

        let err = run_startup_sweep(&reconciler, &fast_retry(5), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Cancelled { .. }));
        assert_eq!(client.deletes.load(Ordering::SeqCst), 0);
    }
}
