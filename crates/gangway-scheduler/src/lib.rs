//! Gang scheduling kernel
//!
//! Pure resource accounting for the gangway control plane: quantity parsing,
//! multi-dimensional [`ResourceVector`] arithmetic, conversion to and from
//! native resource lists, node ranking and the per-queue allocation ledger.
//! Nothing here performs I/O.

#![deny(missing_docs)]

pub mod convert;
pub mod ledger;
pub mod node;
pub mod quantity;
pub mod ranking;
pub mod resource;

pub use convert::{
    to_resource_list, KubernetesScalarRecognizer, ResourceList, ScalarRecognizer,
};
pub use ledger::{aggregate, QueueLedger};
pub use node::{NodeHandle, NodeInfo};
pub use quantity::{ParsedQuantity, QuantityError};
pub use ranking::{select_best_node, select_best_node_with, NodeRanker, ScoredNodeSet};
pub use resource::{ResourceVector, MIN_RESOURCE};
