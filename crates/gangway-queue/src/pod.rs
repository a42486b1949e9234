//! Effective resource request of a pod

use std::collections::BTreeMap;

use gangway_scheduler::quantity::{self, milli_quantity};
use gangway_scheduler::ResourceList;
use k8s_openapi::api::core::v1::{Container, Pod};
use tracing::warn;

/// Pod phase counted against a queue's allocation
pub const RUNNING_PHASE: &str = "Running";

type MilliList = BTreeMap<String, i64>;

/// A pod's effective request as a resource list.
///
/// Regular containers are summed, then each dimension is raised to the
/// largest single init container, then pod overhead is added. Values are
/// emitted as milli quantities so the ledger reads them back exactly.
pub fn task_resource_list(pod: &Pod) -> ResourceList {
    let Some(spec) = pod.spec.as_ref() else {
        return ResourceList::new();
    };

    let mut total = MilliList::new();
    for container in &spec.containers {
        for (name, milli) in container_requests(container) {
            *total.entry(name).or_default() += milli;
        }
    }

    for init in spec.init_containers.iter().flatten() {
        for (name, milli) in container_requests(init) {
            let entry = total.entry(name).or_default();
            *entry = (*entry).max(milli);
        }
    }

    if let Some(overhead) = spec.overhead.as_ref() {
        for (name, milli) in to_milli(overhead) {
            *total.entry(name).or_default() += milli;
        }
    }

    total
        .into_iter()
        .map(|(name, milli)| (name, milli_quantity(milli)))
        .collect()
}

/// True if the pod is in the Running phase
pub fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == RUNNING_PHASE)
}

fn container_requests(container: &Container) -> MilliList {
    container
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .map(to_milli)
        .unwrap_or_default()
}

fn to_milli(list: &ResourceList) -> MilliList {
    list.iter()
        .filter_map(|(name, q)| match quantity::parse(q) {
            Ok(parsed) => Some((name.clone(), parsed.milli_value())),
            Err(e) => {
                warn!(resource = %name, error = %e, "ignoring unparseable request");
                None
            }
        })
        .collect()
}
