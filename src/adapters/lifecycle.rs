//! Pause/unpause of DbCluster resources

use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::info;

use super::{ClusterLifecycle, FIELD_MANAGER};
use crate::crd::{ClusterState, DbCluster};
use crate::error::{Error, Result};
use crate::wait::{poll_until, BoundedWaiter, POLL_INTERVAL};

/// Component label value of database members
pub const DB_COMPONENT: &str = "db";

/// Pauses and unpauses clusters by patching `spec.pause`
pub struct KubeClusterLifecycle {
    client: Client,
    waiter: BoundedWaiter,
    ready_wait_limit_secs: u64,
}

impl KubeClusterLifecycle {
    pub fn new(client: Client, waiter: BoundedWaiter, ready_wait_limit_secs: u64) -> Self {
        Self {
            client,
            waiter,
            ready_wait_limit_secs,
        }
    }

    fn api(&self, cluster: &DbCluster) -> Api<DbCluster> {
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        Api::namespaced(self.client.clone(), &namespace)
    }
}

#[async_trait]
impl ClusterLifecycle for KubeClusterLifecycle {
    async fn pause(&self, cluster: &DbCluster, wait_for_shutdown: bool) -> Result<()> {
        let name = cluster.name_any();
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());

        self.api(cluster)
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(json!({ "spec": { "pause": true } })),
            )
            .await?;
        info!(cluster = %name, "cluster paused");

        if !wait_for_shutdown {
            return Ok(());
        }

        let grace = u64::try_from(cluster.termination_grace_period()).unwrap_or(0);
        self.waiter
            .wait_for_pods_shutdown(&cluster.selector_labels(DB_COMPONENT), &namespace, grace)
            .await
    }

    async fn unpause(&self, cluster: &DbCluster) -> Result<()> {
        let name = cluster.name_any();
        let api = self.api(cluster);

        let mut spec = cluster.spec.clone();
        spec.pause = false;
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(json!({ "spec": spec })),
        )
        .await?;
        info!(cluster = %name, size = spec.db.size, "cluster unpaused, waiting for ready");

        let expected = spec.db.size;
        let what = format!("cluster {} to become ready", name);
        poll_until(self.ready_wait_limit_secs, POLL_INTERVAL, &what, || async {
            let current = api.get(&name).await.map_err(Error::Kube)?;
            Ok(current
                .status
                .map(|s| s.state == ClusterState::Ready && s.ready == expected)
                .unwrap_or(false))
        })
        .await
    }
}
