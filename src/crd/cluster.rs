//! DbCluster Custom Resource Definition

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Condition, StorageSpec};
use crate::adapters::ServerVersion;
use crate::error::{Error, Result};

/// Default grace period for database members, in seconds
pub const DEFAULT_TERMINATION_GRACE_PERIOD_SECS: i64 = 600;

/// Oldest Kubernetes minor version the cluster defaults support (1.x)
const MIN_KUBERNETES_MINOR: u32 = 24;

/// Label carrying the owning cluster's name
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Label carrying the member role
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// DbCluster resource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dbcluster.dev",
    version = "v1",
    kind = "DbCluster",
    plural = "dbclusters",
    singular = "dbcluster",
    shortname = "dbc",
    namespaced,
    derive = "PartialEq",
    status = "DbClusterStatus",
    printcolumn = r#"{"name": "State", "type": "string", "jsonPath": ".status.state"}"#,
    printcolumn = r#"{"name": "Ready", "type": "integer", "jsonPath": ".status.ready"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterSpec {
    /// Operator version the resource was written for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cr_version: Option<String>,

    /// Stop all members while keeping data
    #[serde(default)]
    pub pause: bool,

    /// Permit topologies that admission would otherwise reject
    #[serde(default)]
    pub unsafe_flags: UnsafeFlags,

    /// Database members
    pub db: DbSpec,

    /// HAProxy front-end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub haproxy: Option<ProxySpec>,

    /// ProxySQL front-end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxysql: Option<ProxySpec>,

    /// Backup and log-collection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupConfig>,
}

/// Unsafe scaling flags
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnsafeFlags {
    /// Allow a db size below three or even
    #[serde(default)]
    pub db_size: bool,

    /// Allow a proxy size below two
    #[serde(default)]
    pub proxy_size: bool,
}

/// Database member specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DbSpec {
    /// Number of members
    pub size: i32,

    /// Container image
    #[serde(default)]
    pub image: String,

    /// Pod termination grace period
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
}

/// Proxy specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    /// Whether the proxy is deployed
    #[serde(default)]
    pub enabled: bool,

    /// Number of proxy pods
    #[serde(default)]
    pub size: i32,

    /// Container image
    #[serde(default)]
    pub image: String,
}

/// Backup configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    /// Image used by backup/restore jobs
    #[serde(default)]
    pub image: String,

    /// Named storages
    #[serde(default)]
    pub storages: BTreeMap<String, StorageSpec>,

    /// Log collection for point-in-time recovery
    #[serde(default)]
    pub pitr: PitrConfig,
}

/// Log collection configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PitrConfig {
    /// Whether the log collector runs
    #[serde(default)]
    pub enabled: bool,

    /// Storage receiving collected logs
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_name: String,
}

/// Cluster-level states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Initializing,
    Paused,
    Stopping,
    Ready,
    Error,
}

/// DbCluster status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterStatus {
    /// Overall state
    #[serde(default)]
    pub state: ClusterState,

    /// Ready members
    #[serde(default)]
    pub ready: i32,

    /// Desired members
    #[serde(default)]
    pub size: i32,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl DbCluster {
    /// Whether log collection for PITR is enabled
    pub fn pitr_enabled(&self) -> bool {
        self.spec
            .backup
            .as_ref()
            .map(|b| b.pitr.enabled)
            .unwrap_or(false)
    }

    /// Look up a named backup storage
    pub fn storage(&self, name: &str) -> Option<&StorageSpec> {
        self.spec.backup.as_ref().and_then(|b| b.storages.get(name))
    }

    /// Label selector for pods/PVCs of one component of this cluster
    pub fn selector_labels(&self, component: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (INSTANCE_LABEL.to_string(), self.name_any()),
            (COMPONENT_LABEL.to_string(), component.to_string()),
        ])
    }

    /// Grace period for database member shutdown
    pub fn termination_grace_period(&self) -> i64 {
        self.spec
            .db
            .termination_grace_period_seconds
            .unwrap_or(DEFAULT_TERMINATION_GRACE_PERIOD_SECS)
    }

    /// Apply defaults and reject invalid topologies
    pub fn check_and_set_defaults(&mut self, server: &ServerVersion) -> Result<()> {
        if !server.at_least(1, MIN_KUBERNETES_MINOR) {
            return Err(Error::validation(format!(
                "Kubernetes {} is not supported, need 1.{} or newer",
                server, MIN_KUBERNETES_MINOR
            )));
        }

        let spec = &mut self.spec;

        if spec.cr_version.as_deref().unwrap_or_default().is_empty() {
            spec.cr_version = Some(env!("CARGO_PKG_VERSION").to_string());
        }

        if spec.db.termination_grace_period_seconds.is_none() {
            spec.db.termination_grace_period_seconds = Some(DEFAULT_TERMINATION_GRACE_PERIOD_SECS);
        }

        if spec.db.size < 1 {
            return Err(Error::validation("db size must be at least 1"));
        }

        if !spec.unsafe_flags.db_size && (spec.db.size < 3 || spec.db.size % 2 == 0) {
            return Err(Error::validation(format!(
                "db size {} is unsafe, set unsafeFlags.dbSize to allow it",
                spec.db.size
            )));
        }

        let haproxy_enabled = spec.haproxy.as_ref().is_some_and(|p| p.enabled);
        let proxysql_enabled = spec.proxysql.as_ref().is_some_and(|p| p.enabled);
        if haproxy_enabled && proxysql_enabled {
            return Err(Error::validation(
                "haproxy and proxysql can't be enabled at the same time",
            ));
        }

        if !spec.unsafe_flags.proxy_size {
            for (role, proxy) in [("haproxy", &spec.haproxy), ("proxysql", &spec.proxysql)] {
                if let Some(proxy) = proxy.as_ref().filter(|p| p.enabled) {
                    if proxy.size < 2 {
                        return Err(Error::validation(format!(
                            "{} size {} is unsafe, set unsafeFlags.proxySize to allow it",
                            role, proxy.size
                        )));
                    }
                }
            }
        }

        if let Some(backup) = &spec.backup {
            if backup.pitr.enabled && !backup.storages.contains_key(&backup.pitr.storage_name) {
                return Err(Error::validation(format!(
                    "pitr storage '{}' is not defined in backup storages",
                    backup.pitr.storage_name
                )));
            }
        }

        Ok(())
    }
}
