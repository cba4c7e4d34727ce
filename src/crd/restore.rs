//! DbClusterRestore Custom Resource Definition

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{AzureStorageSpec, DbClusterBackupStatus, S3StorageSpec, UNSAFE_PITR_ANNOTATION};
use crate::error::{Error, Result};

/// Format accepted by `pitr.date`
pub const PITR_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// DbClusterRestore resource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dbcluster.dev",
    version = "v1",
    kind = "DbClusterRestore",
    plural = "dbclusterrestores",
    singular = "dbclusterrestore",
    shortname = "dbc-restore",
    namespaced,
    derive = "PartialEq",
    status = "DbClusterRestoreStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.clusterName"}"#,
    printcolumn = r#"{"name": "Status", "type": "string", "jsonPath": ".status.state"}"#,
    printcolumn = r#"{"name": "Completed", "type": "date", "jsonPath": ".status.completed"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterRestoreSpec {
    /// Cluster to restore into
    pub cluster_name: String,

    /// Name of a DbClusterBackup in the same namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,

    /// Inline description of a backup not tracked by a DbClusterBackup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_source: Option<DbClusterBackupStatus>,

    /// Point-in-time recovery target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitr: Option<PitrTarget>,
}

/// How far the transaction log is replayed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PitrType {
    /// Stop at a wall-clock time
    Date,
    /// Stop at a transaction id
    Transaction,
    /// Replay everything collected
    #[default]
    Latest,
    /// Skip a single transaction and replay the rest
    Skip,
}

impl fmt::Display for PitrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PitrType::Date => "date",
            PitrType::Transaction => "transaction",
            PitrType::Latest => "latest",
            PitrType::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Point-in-time recovery target
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PitrTarget {
    /// Replay mode
    #[serde(rename = "type", default)]
    pub type_: PitrType,

    /// Target time (YYYY-MM-DD HH:MM:SS), for `date`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Target transaction, for `transaction` and `skip`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gtid: Option<String>,

    /// Where the collected logs live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_source: Option<PitrBackupSource>,
}

/// Log storage location for replay
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PitrBackupSource {
    /// Storage entry in the cluster's backup configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,

    /// Inline S3 location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StorageSpec>,

    /// Inline Azure location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureStorageSpec>,
}

impl PitrBackupSource {
    fn is_empty(&self) -> bool {
        self.storage_name.as_deref().unwrap_or_default().is_empty()
            && self.s3.is_none()
            && self.azure.is_none()
    }
}

/// Restore lifecycle stages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RestoreState {
    #[default]
    #[serde(rename = "")]
    New,
    Starting,
    #[serde(rename = "Stopping Cluster")]
    StopCluster,
    #[serde(rename = "Restoring")]
    Restore,
    #[serde(rename = "Point-in-time recovering")]
    Pitr,
    #[serde(rename = "Starting Cluster")]
    StartCluster,
    Failed,
    Succeeded,
}

impl RestoreState {
    /// Succeeded and Failed end processing
    pub fn is_terminal(&self) -> bool {
        matches!(self, RestoreState::Succeeded | RestoreState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreState::New => "",
            RestoreState::Starting => "Starting",
            RestoreState::StopCluster => "Stopping Cluster",
            RestoreState::Restore => "Restoring",
            RestoreState::Pitr => "Point-in-time recovering",
            RestoreState::StartCluster => "Starting Cluster",
            RestoreState::Failed => "Failed",
            RestoreState::Succeeded => "Succeeded",
        }
    }
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DbClusterRestore status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterRestoreStatus {
    /// Current stage
    #[serde(default)]
    pub state: RestoreState,

    /// Error text on failure, follow-up instructions on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    /// Completion time, set only on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
}

impl DbClusterRestore {
    /// Current stage, treating a missing status as New
    pub fn state(&self) -> RestoreState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }

    /// Whether the unsafe-PITR annotation is present
    pub fn has_unsafe_pitr_override(&self) -> bool {
        self.annotations().contains_key(UNSAFE_PITR_ANNOTATION)
    }

    /// Follow-up instructions written on success
    pub fn backup_restored_message(&self) -> String {
        let name = self.name_any();
        format!(
            "You can view xtrabackup log:\n\
             $ kubectl logs job/restore-job-{name}-{cluster}\n\
             If everything is fine, you can cleanup the job:\n\
             $ kubectl delete dbc-restore/{name}\n",
            name = name,
            cluster = self.spec.cluster_name,
        )
    }

    /// Validate the request and fill defaults
    pub fn check_and_set_defaults(&mut self) -> Result<()> {
        let spec = &mut self.spec;

        if spec.cluster_name.is_empty() {
            return Err(Error::validation("clusterName can't be empty"));
        }

        if spec.backup_name.as_deref() == Some("") {
            spec.backup_name = None;
        }

        match (&spec.backup_name, &spec.backup_source) {
            (None, None) => {
                return Err(Error::validation(
                    "backupName and backupSource can't be empty simultaneously",
                ));
            }
            (_, Some(source)) if source.destination.as_deref().unwrap_or_default().is_empty() => {
                return Err(Error::validation("backupSource.destination can't be empty"));
            }
            _ => {}
        }

        if let Some(pitr) = &spec.pitr {
            match pitr.type_ {
                PitrType::Date => {
                    let date = pitr.date.as_deref().unwrap_or_default();
                    NaiveDateTime::parse_from_str(date, PITR_DATE_FORMAT).map_err(|e| {
                        Error::validation(format!(
                            "pitr.date '{}' must use format YYYY-MM-DD HH:MM:SS: {}",
                            date, e
                        ))
                    })?;
                }
                PitrType::Transaction | PitrType::Skip => {
                    if pitr.gtid.as_deref().unwrap_or_default().is_empty() {
                        return Err(Error::validation(format!(
                            "pitr.gtid is required for type {}",
                            pitr.type_
                        )));
                    }
                }
                PitrType::Latest => {}
            }

            if spec.backup_source.is_some()
                && pitr.backup_source.as_ref().map_or(true, |s| s.is_empty())
            {
                return Err(Error::validation(
                    "pitr.backupSource is required when restoring from backupSource",
                ));
            }
        }

        Ok(())
    }
}
