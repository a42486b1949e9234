//! Shared Kubernetes utilities using kube-rs
//!
//! Helpers for turning owner-reference API versions into group/version pairs
//! and for finding `ApiResource`s in discovery results.

use kube::discovery::{ApiResource, Discovery};
use kube::Client;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Split an `apiVersion` string into `(group, version)`.
///
/// Accepts `"group/version"` and the bare core form `"version"` (which yields
/// an empty group). Returns `None` for anything else: empty strings, empty
/// segments, or more than one `/`.
///
/// # Example
/// ```
/// use gangway_common::kube_utils::parse_api_version;
///
/// assert_eq!(
///     parse_api_version("apps/v1"),
///     Some(("apps".to_string(), "v1".to_string()))
/// );
/// assert_eq!(parse_api_version("v1"), Some((String::new(), "v1".to_string())));
/// assert_eq!(parse_api_version("a/b/c"), None);
/// ```
pub fn parse_api_version(api_version: &str) -> Option<(String, String)> {
    let mut parts = api_version.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(version), None, None) if !version.is_empty() => {
            Some((String::new(), version.to_string()))
        }
        (Some(group), Some(version), None) if !group.is_empty() && !version.is_empty() => {
            Some((group.to_string(), version.to_string()))
        }
        _ => None,
    }
}

/// Look up a group/version/kind in pre-computed API discovery results.
///
/// Returns `None` if the group does not serve that kind at that version.
pub fn find_discovered_resource(
    discovery: &Discovery,
    group: &str,
    version: &str,
    kind: &str,
) -> Option<ApiResource> {
    for api_group in discovery.groups() {
        if api_group.name() != group {
            continue;
        }
        for (ar, _caps) in api_group.versioned_resources(version) {
            if ar.kind == kind {
                debug!(
                    group = %group,
                    version = %version,
                    kind = %kind,
                    plural = %ar.plural,
                    "resolved resource via discovery"
                );
                return Some(ar);
            }
        }
    }
    warn!(group = %group, version = %version, kind = %kind, "kind not found in API discovery");
    None
}

/// Resolve a group/version/kind by running discovery for its API group.
///
/// Fails with [`Error::Discovery`] when the group does not serve the kind.
pub async fn discover_resource(
    client: Client,
    group: &str,
    version: &str,
    kind: &str,
) -> Result<ApiResource> {
    let discovery = Discovery::new(client).filter(&[group]).run().await?;
    find_discovered_resource(&discovery, group, version, kind)
        .ok_or_else(|| Error::discovery(group, version, kind, "kind not served by the API server"))
}
