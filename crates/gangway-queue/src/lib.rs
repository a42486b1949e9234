//! Queue allocation accounting for gangway

#![deny(missing_docs)]

pub mod controller;
pub mod pod;

pub use controller::{
    error_policy, queue_ledger, reconcile, QueueContext, QueueControllerConfig, QueueError,
};
pub use pod::task_resource_list;
