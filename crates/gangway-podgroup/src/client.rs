//! Cluster-API seam for the PodGroup reconciler

use async_trait::async_trait;
use dashmap::DashMap;
use gangway_common::crd::PodGroup;
use gangway_common::kube_utils::discover_resource;
use kube::api::{DeleteParams, ListParams};
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use kube::{Api, Client};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::error::ReconcileError;

/// Operations the reconciler needs from the cluster.
///
/// Implementations return errors once; retry belongs to the caller.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a PodGroup
    async fn get_pod_group(&self, namespace: &str, name: &str) -> Result<PodGroup, ReconcileError>;

    /// Delete a PodGroup
    async fn delete_pod_group(&self, namespace: &str, name: &str) -> Result<(), ReconcileError>;

    /// List PodGroups across all namespaces
    async fn list_pod_groups(&self) -> Result<Vec<PodGroup>, ReconcileError>;

    /// Map a group/version/kind to the resource serving it
    async fn resolve_resource(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<ApiResource, ReconcileError>;

    /// Fetch an arbitrary namespaced object of a resolved type
    async fn get_owner(
        &self,
        namespace: &str,
        resource: &ApiResource,
        name: &str,
    ) -> Result<DynamicObject, ReconcileError>;
}

type GvkKey = (String, String, String);

/// `ClusterClient` backed by kube-rs.
///
/// Discovery results are cached per group/version/kind. A miss runs
/// discovery for that API group only, so owner kinds installed after
/// startup are still found.
pub struct KubeClusterClient {
    client: Client,
    resources: DashMap<GvkKey, ApiResource>,
}

impl KubeClusterClient {
    /// Create a new client with an empty discovery cache
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: DashMap::new(),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_pod_group(&self, namespace: &str, name: &str) -> Result<PodGroup, ReconcileError> {
        let api: Api<PodGroup> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn delete_pod_group(&self, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        let api: Api<PodGroup> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_pod_groups(&self) -> Result<Vec<PodGroup>, ReconcileError> {
        let api: Api<PodGroup> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn resolve_resource(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<ApiResource, ReconcileError> {
        let key = (group.to_string(), version.to_string(), kind.to_string());
        if let Some(ar) = self.resources.get(&key) {
            return Ok(ar.clone());
        }

        debug!(group, version, kind, "owner type not cached, running discovery");
        let ar = discover_resource(self.client.clone(), group, version, kind).await?;

        info!(group, version, kind, plural = %ar.plural, "cached owner resource mapping");
        self.resources.insert(key, ar.clone());
        Ok(ar)
    }

    async fn get_owner(
        &self,
        namespace: &str,
        resource: &ApiResource,
        name: &str,
    ) -> Result<DynamicObject, ReconcileError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api.get(name).await?)
    }
}
