//! Custom Resource Definitions for the DbCluster Restore Operator

mod backup;
mod cluster;
mod restore;

pub use backup::*;
pub use cluster::*;
pub use restore::*;

use chrono::{DateTime, Utc};
use kube::CustomResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group shared by all operator resources
pub const API_GROUP: &str = "dbcluster.dev";

/// Annotation that forces a PITR restore from a backup not marked PITR-ready
pub const UNSAFE_PITR_ANNOTATION: &str = "dbcluster.dev/unsafe-pitr";

/// Status condition
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Build a condition that transitions now
    pub fn new(type_: &str, status: bool) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: Utc::now(),
            reason: None,
            message: None,
        }
    }
}

/// Find a condition of the given type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Vec<String> {
    vec![
        serde_yaml::to_string(&DbCluster::crd()).unwrap(),
        serde_yaml::to_string(&DbClusterBackup::crd()).unwrap(),
        serde_yaml::to_string(&DbClusterRestore::crd()).unwrap(),
    ]
}
