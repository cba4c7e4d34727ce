//! Resource store access for restores, clusters, backups and their pods/PVCs

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;

#[cfg(test)]
use mockall::automock;

use crate::crd::{DbCluster, DbClusterBackup, DbClusterRestore};
use crate::error::{Error, Result};

/// Field manager used for every write the operator makes
pub const FIELD_MANAGER: &str = "db-restore-operator";

/// Resource kinds the bounded waiter can count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountedKind {
    Pods,
    PersistentVolumeClaims,
}

impl CountedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountedKind::Pods => "pods",
            CountedKind::PersistentVolumeClaims => "pvcs",
        }
    }
}

/// Reads and status writes against the resource store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a restore request, `None` when absent
    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<DbClusterRestore>>;

    /// List every restore request in a namespace
    async fn list_restores(&self, namespace: &str) -> Result<Vec<DbClusterRestore>>;

    /// Persist the request's status subresource
    async fn update_restore_status(&self, restore: &DbClusterRestore) -> Result<()>;

    /// Get a cluster, `None` when absent
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<DbCluster>>;

    /// Get a backup record, `None` when absent
    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Option<DbClusterBackup>>;

    /// Names of pods or PVCs matching a label selector
    async fn list_names(
        &self,
        kind: CountedKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>>;

    /// Delete a PersistentVolumeClaim; absent is not an error
    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Render a label map as a selector string
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Map a 404 to `None`
fn not_found_as_none<T>(result: std::result::Result<T, kube::Error>) -> Result<Option<T>> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
        Err(other) => Err(Error::Kube(other)),
    }
}

/// Kubernetes-backed resource store
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<DbClusterRestore>> {
        let api: Api<DbClusterRestore> = Api::namespaced(self.client.clone(), namespace);
        not_found_as_none(api.get(name).await)
    }

    async fn list_restores(&self, namespace: &str) -> Result<Vec<DbClusterRestore>> {
        let api: Api<DbClusterRestore> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn update_restore_status(&self, restore: &DbClusterRestore) -> Result<()> {
        let namespace = restore.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<DbClusterRestore> = Api::namespaced(self.client.clone(), &namespace);

        // Merge patch drops absent optionals, so null them explicitly.
        let status = restore.status.clone().unwrap_or_default();
        let patch = json!({
            "status": {
                "state": status.state,
                "comments": status.comments,
                "completed": status.completed,
            }
        });

        api.patch_status(
            &restore.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(patch),
        )
        .await?;
        Ok(())
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<DbCluster>> {
        let api: Api<DbCluster> = Api::namespaced(self.client.clone(), namespace);
        not_found_as_none(api.get(name).await)
    }

    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Option<DbClusterBackup>> {
        let api: Api<DbClusterBackup> = Api::namespaced(self.client.clone(), namespace);
        not_found_as_none(api.get(name).await)
    }

    async fn list_names(
        &self,
        kind: CountedKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let params = ListParams::default().labels(&selector_string(selector));
        let names = match kind {
            CountedKind::Pods => {
                let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
                api.list(&params).await?.items.iter().map(|p| p.name_any()).collect()
            }
            CountedKind::PersistentVolumeClaims => {
                let api: Api<PersistentVolumeClaim> =
                    Api::namespaced(self.client.clone(), namespace);
                api.list(&params).await?.items.iter().map(|p| p.name_any()).collect()
            }
        };
        Ok(names)
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        not_found_as_none(api.delete(name, &DeleteParams::default()).await)?;
        Ok(())
    }
}
