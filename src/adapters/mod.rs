//! Collaborator contracts consumed by the restore reconciler
//!
//! Each external concern is a trait so the reconciler can be driven by the
//! Kubernetes-backed implementations in production and by fakes in tests.

mod jobs;
mod lifecycle;
mod pitr;
mod store;

pub use jobs::*;
pub use lifecycle::*;
pub use pitr::*;
pub use store::*;

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::version::Info;

#[cfg(test)]
use mockall::automock;

use crate::crd::{DbCluster, DbClusterBackup, DbClusterRestore};
use crate::error::Result;

/// Stops and starts cluster members
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterLifecycle: Send + Sync {
    /// Pause the cluster, optionally waiting until its members are gone
    async fn pause(&self, cluster: &DbCluster, wait_for_shutdown: bool) -> Result<()>;

    /// Unpause the cluster at the topology described by `cluster` and wait
    /// until it converges
    async fn unpause(&self, cluster: &DbCluster) -> Result<()>;
}

/// Validates the cluster's own log collection state before a PITR restore
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PitrChecker: Send + Sync {
    async fn check_pitr_errors(&self, cluster: &DbCluster) -> Result<()>;
}

/// Runs the data-moving parts of a restore
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RestoreOperations: Send + Sync {
    /// Restore the base backup into the (paused) cluster
    async fn run_restore(
        &self,
        restore: &DbClusterRestore,
        backup: &DbClusterBackup,
        cluster: &DbCluster,
    ) -> Result<()>;

    /// Replay collected logs up to the request's PITR target
    async fn run_pitr(
        &self,
        restore: &DbClusterRestore,
        backup: &DbClusterBackup,
        cluster: &DbCluster,
    ) -> Result<()>;
}

/// Drops state derived from logs that a restore has made stale
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, cluster: &DbCluster) -> Result<()>;
}

/// Kubernetes API server version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub git_version: String,
}

impl ServerVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            git_version: format!("v{}.{}.0", major, minor),
        }
    }

    /// Parse the `/version` response. Minor versions like "30+" are accepted.
    pub fn from_info(info: &Info) -> Self {
        fn leading_number(s: &str) -> u32 {
            s.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .unwrap_or(0)
        }

        Self {
            major: leading_number(&info.major),
            minor: leading_number(&info.minor),
            git_version: info.git_version.clone(),
        }
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
