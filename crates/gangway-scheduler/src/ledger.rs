//! Queue resource ledger
//!
//! The ledger is rebuilt from scratch every observation cycle. It never
//! patches a previous total, so a missed deletion event cannot leave stale
//! usage behind.

use tracing::trace;

use crate::convert::{self, KubernetesScalarRecognizer, ResourceList, ScalarRecognizer};
use crate::resource::ResourceVector;

/// Allocated resources of one queue for one observation cycle
#[derive(Clone, Debug, PartialEq)]
pub struct QueueLedger {
    queue: String,
    allocated: ResourceVector,
}

impl QueueLedger {
    /// Aggregate the resource lists of the queue's running tasks
    pub fn recompute<'a, I>(queue: impl Into<String>, tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a ResourceList>,
    {
        Self::recompute_with(queue, tasks, &KubernetesScalarRecognizer)
    }

    /// Like [`QueueLedger::recompute`] with a custom scalar recognizer
    pub fn recompute_with<'a, I>(
        queue: impl Into<String>,
        tasks: I,
        recognizer: &dyn ScalarRecognizer,
    ) -> Self
    where
        I: IntoIterator<Item = &'a ResourceList>,
    {
        let queue = queue.into();
        let allocated = aggregate_with(tasks, recognizer);
        trace!(queue = %queue, allocated = %allocated, "recomputed queue ledger");
        Self { queue, allocated }
    }

    /// Queue name
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Dimension-wise sum over running tasks
    pub fn allocated(&self) -> &ResourceVector {
        &self.allocated
    }

    /// Outbound form, suitable for `status.allocated`
    pub fn allocated_resource_list(&self) -> ResourceList {
        convert::to_resource_list(Some(&self.allocated))
    }

    /// Compare against an expected total within `tolerance`
    pub fn matches(&self, expected: &ResourceVector, tolerance: f64) -> bool {
        self.allocated.equal(expected, tolerance)
    }
}

/// Sum task resource lists into a fresh accumulator
pub fn aggregate<'a, I>(tasks: I) -> ResourceVector
where
    I: IntoIterator<Item = &'a ResourceList>,
{
    aggregate_with(tasks, &KubernetesScalarRecognizer)
}

fn aggregate_with<'a, I>(tasks: I, recognizer: &dyn ScalarRecognizer) -> ResourceVector
where
    I: IntoIterator<Item = &'a ResourceList>,
{
    let mut total = ResourceVector::empty();
    for list in tasks {
        total.add(&ResourceVector::from_resource_list_with(Some(list), recognizer));
    }
    total
}
