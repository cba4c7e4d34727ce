//! Kubernetes controller for DbClusterRestore resources
//!
//! This module wires the restore reconciler into a kube-runtime controller and
//! holds the collaborators it shares across reconciliations.

mod restore_controller;

pub use restore_controller::run as run_restore_controller;

use std::sync::Arc;

use kube::Client;

use crate::adapters::{
    CacheInvalidator, ClusterLifecycle, JobRestoreOperations, KubeCacheInvalidator,
    KubeClusterLifecycle, KubePitrChecker, KubeStore, PitrChecker, ResourceStore,
    RestoreOperations, ServerVersion,
};
use crate::config::OperatorConfig;
use crate::wait::BoundedWaiter;

/// Shared context for the restore controller
pub struct Context {
    /// Restore, cluster and backup records
    pub store: Arc<dyn ResourceStore>,
    /// Pause/unpause of clusters
    pub lifecycle: Arc<dyn ClusterLifecycle>,
    /// Restore and log replay execution
    pub operations: Arc<dyn RestoreOperations>,
    /// Cluster-side PITR checks
    pub pitr_checker: Arc<dyn PitrChecker>,
    /// Log collector cache invalidation
    pub cache: Arc<dyn CacheInvalidator>,
    /// API server version, for version-aware cluster defaults
    pub server_version: ServerVersion,
}

impl Context {
    /// Build a context backed by the Kubernetes API
    pub fn from_client(client: Client, server_version: ServerVersion, config: &OperatorConfig) -> Self {
        let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client.clone()));
        let waiter = BoundedWaiter::new(store.clone());

        Self {
            lifecycle: Arc::new(KubeClusterLifecycle::new(
                client.clone(),
                waiter.clone(),
                config.cluster_ready_wait_limit_secs,
            )),
            operations: Arc::new(JobRestoreOperations::new(
                client.clone(),
                store.clone(),
                waiter,
                config.job_wait_limit_secs,
            )),
            pitr_checker: Arc::new(KubePitrChecker),
            cache: Arc::new(KubeCacheInvalidator::new(client)),
            store,
            server_version,
        }
    }
}
