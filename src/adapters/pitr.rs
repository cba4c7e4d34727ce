//! Log collector checks and cache invalidation

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::info;

use super::{CacheInvalidator, PitrChecker, FIELD_MANAGER};
use crate::crd::{find_condition, DbCluster};
use crate::error::{Error, Result};

/// Cluster condition raised by the log collector when it finds a gap
pub const BINLOG_GAP_CONDITION: &str = "PITRBinlogGap";

/// Annotation bumped to force the log collector to rebuild its cache
pub const CACHE_INVALIDATED_ANNOTATION: &str = "dbcluster.dev/binlog-cache-invalidated-at";

/// Name of the log collector Deployment for a cluster
pub fn binlog_collector_name(cluster: &DbCluster) -> String {
    format!("{}-pitr", cluster.name_any())
}

/// Checks the cluster's reported log collection state
pub struct KubePitrChecker;

#[async_trait]
impl PitrChecker for KubePitrChecker {
    async fn check_pitr_errors(&self, cluster: &DbCluster) -> Result<()> {
        check_binlog_gaps(cluster)
    }
}

/// Fail when the collector reported a gap in collected logs
pub fn check_binlog_gaps(cluster: &DbCluster) -> Result<()> {
    let gap = cluster
        .status
        .as_ref()
        .and_then(|s| find_condition(&s.conditions, BINLOG_GAP_CONDITION))
        .filter(|c| c.status == "True");

    match gap {
        Some(condition) => Err(Error::collaborator(format!(
            "binlog gap detected in cluster {}: {}. Take a new backup to be able to use point-in-time recovery",
            cluster.name_any(),
            condition.message.as_deref().unwrap_or("collected logs are incomplete"),
        ))),
        None => Ok(()),
    }
}

/// Restarts the log collector Deployment so it drops its cached state
pub struct KubeCacheInvalidator {
    client: Client,
}

impl KubeCacheInvalidator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheInvalidator for KubeCacheInvalidator {
    async fn invalidate(&self, cluster: &DbCluster) -> Result<()> {
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        let name = binlog_collector_name(cluster);

        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            CACHE_INVALIDATED_ANNOTATION: Utc::now().to_rfc3339(),
                        }
                    }
                }
            }
        });

        match api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
        {
            Ok(_) => {
                info!(deployment = %name, "binlog collector cache invalidated");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(Error::Kube(e)),
        }
    }
}
