//! DbClusterBackup Custom Resource Definition

use std::fmt;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{find_condition, Condition};

/// Condition type marking a backup as a consistent base for log replay
pub const PITR_READY_CONDITION: &str = "PITRReady";

/// DbClusterBackup resource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dbcluster.dev",
    version = "v1",
    kind = "DbClusterBackup",
    plural = "dbclusterbackups",
    singular = "dbclusterbackup",
    shortname = "dbc-backup",
    namespaced,
    derive = "PartialEq",
    status = "DbClusterBackupStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.clusterName"}"#,
    printcolumn = r#"{"name": "Storage", "type": "string", "jsonPath": ".spec.storageName"}"#,
    printcolumn = r#"{"name": "Status", "type": "string", "jsonPath": ".status.state"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterBackupSpec {
    /// Cluster the backup was taken from
    pub cluster_name: String,

    /// Storage entry (from the cluster's backup storages) holding the backup
    #[serde(default)]
    pub storage_name: String,
}

/// Backup lifecycle states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum BackupState {
    #[default]
    #[serde(rename = "")]
    New,
    Starting,
    Running,
    Failed,
    Succeeded,
}

impl BackupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupState::New => "",
            BackupState::Starting => "Starting",
            BackupState::Running => "Running",
            BackupState::Failed => "Failed",
            BackupState::Succeeded => "Succeeded",
        }
    }
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend kinds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    S3,
    Azure,
    Filesystem,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::S3 => f.write_str("s3"),
            StorageType::Azure => f.write_str("azure"),
            StorageType::Filesystem => f.write_str("filesystem"),
        }
    }
}

/// Storage specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage type (s3, azure, filesystem)
    #[serde(rename = "type", default)]
    pub type_: StorageType,

    /// S3 storage configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StorageSpec>,

    /// Azure Blob storage configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureStorageSpec>,

    /// Volume-backed storage configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeStorageSpec>,
}

/// S3 storage specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3StorageSpec {
    /// S3 bucket name (may include a path prefix: bucket/prefix)
    pub bucket: String,

    /// AWS region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint (for MinIO, Ceph, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Secret holding AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY
    pub credentials_secret: String,
}

/// Azure Blob storage specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureStorageSpec {
    /// Container name (may include a path prefix: container/prefix)
    pub container: String,

    /// Custom endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Secret holding AZURE_STORAGE_ACCOUNT_NAME / AZURE_STORAGE_ACCOUNT_KEY
    pub credentials_secret: String,
}

/// Volume storage specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeStorageSpec {
    /// PVC claim name
    pub claim_name: String,
}

/// DbClusterBackup status
///
/// Also embedded in a restore request as an inline backup source.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterBackupStatus {
    /// Current state
    #[serde(default)]
    pub state: BackupState,

    /// Location of the backup artifact (e.g. s3://bucket/prefix/name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Storage entry name in the cluster's backup configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,

    /// Resolved storage backend, when the backup carries its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    /// Completion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,

    /// Time the schedule last fired for this backup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scheduled: Option<DateTime<Utc>>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl DbClusterBackupStatus {
    /// PITR readiness, if the backup reports it
    pub fn pitr_ready(&self) -> Option<bool> {
        find_condition(&self.conditions, PITR_READY_CONDITION).map(|c| c.status != "False")
    }
}

impl DbClusterBackup {
    /// Backup state, treating a missing status as New
    pub fn state(&self) -> BackupState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }

    /// Storage name from status, falling back to spec
    pub fn storage_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.storage_name.as_deref())
            .or(Some(self.spec.storage_name.as_str()))
            .filter(|s| !s.is_empty())
    }

    /// Artifact location, if known
    pub fn destination(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.destination.as_deref())
            .filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitr_ready_reads_condition() {
        let mut status = DbClusterBackupStatus::default();
        assert_eq!(status.pitr_ready(), None);

        status.conditions.push(Condition::new(PITR_READY_CONDITION, false));
        assert_eq!(status.pitr_ready(), Some(false));

        status.conditions[0].status = "True".to_string();
        assert_eq!(status.pitr_ready(), Some(true));
    }

    #[test]
    fn new_state_serializes_as_empty_string() {
        let status = DbClusterBackupStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "");
    }

    #[test]
    fn storage_name_prefers_status() {
        let mut backup = DbClusterBackup::new(
            "b1",
            DbClusterBackupSpec {
                cluster_name: "c1".into(),
                storage_name: "spec-storage".into(),
            },
        );
        assert_eq!(backup.storage_name(), Some("spec-storage"));

        backup.status = Some(DbClusterBackupStatus {
            storage_name: Some("status-storage".into()),
            ..Default::default()
        });
        assert_eq!(backup.storage_name(), Some("status-storage"));
    }
}
