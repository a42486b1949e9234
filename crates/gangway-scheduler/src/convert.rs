//! Conversions between native resource lists and `ResourceVector`
//!
//! Inbound, every dimension except pod count is taken at milli-unit
//! precision, memory included: memory lands in milli-bytes. Outbound, CPU and
//! scalars are written as milli quantities but memory is written as whole
//! bytes in BinarySI form. Consumers of the outbound list depend on that
//! asymmetry, so a vector round-tripped through both directions comes back
//! with memory multiplied by 1000.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::warn;

use crate::quantity::{self, binary_quantity, decimal_quantity, milli_quantity};
use crate::resource::ResourceVector;

/// Native resource list: resource name to quantity
pub type ResourceList = BTreeMap<String, Quantity>;

/// CPU resource name
pub const RESOURCE_CPU: &str = "cpu";
/// Memory resource name
pub const RESOURCE_MEMORY: &str = "memory";
/// Pod-count resource name
pub const RESOURCE_PODS: &str = "pods";
/// Ephemeral storage resource name
pub const RESOURCE_EPHEMERAL_STORAGE: &str = "ephemeral-storage";

const COUNT_QUOTA_PREFIX: &str = "count/";
const DEFAULT_NAMESPACE_PREFIX: &str = "kubernetes.io/";
const REQUESTS_PREFIX: &str = "requests.";
const HUGEPAGES_PREFIX: &str = "hugepages-";
const ATTACHABLE_VOLUMES_PREFIX: &str = "attachable-volumes-";

/// Decides which non-core resource names are genuine scalar dimensions.
pub trait ScalarRecognizer {
    /// True if `name` should be accumulated as a scalar resource
    fn is_scalar(&self, name: &str) -> bool;
}

/// Kubernetes' own notion of a scalar resource name: extended resources,
/// hugepages, `kubernetes.io/`-prefixed native resources and attachable
/// volume counts.
#[derive(Clone, Copy, Debug, Default)]
pub struct KubernetesScalarRecognizer;

impl ScalarRecognizer for KubernetesScalarRecognizer {
    fn is_scalar(&self, name: &str) -> bool {
        is_extended_resource_name(name)
            || name.starts_with(HUGEPAGES_PREFIX)
            || is_prefixed_native_resource(name)
            || name.starts_with(ATTACHABLE_VOLUMES_PREFIX)
    }
}

/// True for quota bookkeeping names (`count/pods`, `count/jobs.batch`)
pub fn is_count_quota(name: &str) -> bool {
    name.starts_with(COUNT_QUOTA_PREFIX)
}

fn is_prefixed_native_resource(name: &str) -> bool {
    name.contains(DEFAULT_NAMESPACE_PREFIX)
}

fn is_native_resource(name: &str) -> bool {
    !name.contains('/') || is_prefixed_native_resource(name)
}

fn is_extended_resource_name(name: &str) -> bool {
    if is_native_resource(name) || name.starts_with(REQUESTS_PREFIX) {
        return false;
    }
    is_qualified_name(&format!("{REQUESTS_PREFIX}{name}"))
}

/// `prefix/name` where prefix is a DNS subdomain and name is at most 63
/// alphanumerics, `-`, `_` or `.`, starting and ending alphanumeric.
fn is_qualified_name(value: &str) -> bool {
    let (prefix, name) = match value.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, value),
    };

    let name_ok = !name.is_empty()
        && name.len() <= 63
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    let prefix_ok = prefix.map_or(true, |p| {
        !p.is_empty()
            && p.len() <= 253
            && p.split('.').all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && label.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
                    && label.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
                    && label
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            })
    });

    name_ok && prefix_ok
}

impl ResourceVector {
    /// Convert a native resource list using the Kubernetes scalar recognizer.
    ///
    /// `None` produces the all-zero vector.
    pub fn from_resource_list(list: Option<&ResourceList>) -> Self {
        Self::from_resource_list_with(list, &KubernetesScalarRecognizer)
    }

    /// Convert a native resource list with a custom scalar recognizer.
    ///
    /// Entries whose quantity cannot be parsed are dropped with a warning;
    /// they never abort the conversion.
    pub fn from_resource_list_with(
        list: Option<&ResourceList>,
        recognizer: &dyn ScalarRecognizer,
    ) -> Self {
        let mut r = Self::empty();
        let Some(list) = list else {
            return r;
        };

        for (name, q) in list {
            let parsed = match quantity::parse(q) {
                Ok(p) => p,
                Err(e) => {
                    warn!(resource = %name, error = %e, "dropping unparseable quantity");
                    continue;
                }
            };

            match name.as_str() {
                RESOURCE_CPU => r.milli_cpu += parsed.milli_value() as f64,
                RESOURCE_MEMORY => r.memory += parsed.milli_value() as f64,
                RESOURCE_PODS => r.max_task_num += parsed.value(),
                RESOURCE_EPHEMERAL_STORAGE => r.add_scalar(name, parsed.milli_value() as f64),
                _ if is_count_quota(name) => {}
                _ if recognizer.is_scalar(name) => r.add_scalar(name, parsed.milli_value() as f64),
                _ => {}
            }
        }
        r
    }

    /// Convert back to a native resource list.
    ///
    /// CPU and scalars are written as milli quantities, memory as whole
    /// bytes (BinarySI), pod count as a whole DecimalSI value when non-zero.
    pub fn to_resource_list(&self) -> ResourceList {
        let mut list = ResourceList::new();
        list.insert(
            RESOURCE_CPU.to_string(),
            milli_quantity(self.milli_cpu as i64),
        );
        list.insert(
            RESOURCE_MEMORY.to_string(),
            binary_quantity(self.memory as i64),
        );
        if self.max_task_num != 0 {
            list.insert(
                RESOURCE_PODS.to_string(),
                decimal_quantity(self.max_task_num),
            );
        }
        for (name, q) in &self.scalar_resources {
            list.insert(name.clone(), milli_quantity(*q as i64));
        }
        list
    }
}

/// Outbound conversion that maps `None` to an empty list
pub fn to_resource_list(resource: Option<&ResourceVector>) -> ResourceList {
    resource
        .map(ResourceVector::to_resource_list)
        .unwrap_or_default()
}
