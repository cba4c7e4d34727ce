//! DbClusterRestore reconciler
//!
//! Drives a restore request through its stages:
//! - Concurrency guard and request/cluster defaulting
//! - Backup resolution and the PITR safety gate
//! - Cluster stop, restore, optional log replay at single-member topology
//! - Cluster start at the original topology
//!
//! Every stage change is written to the request's status before the stage
//! runs. Whatever happens after `Starting` is recorded, the request ends in
//! `Succeeded` or `Failed`.
//!
//! Only requests observed in `New` are processed, so an attempt interrupted
//! mid-way is never resumed.

use std::time::Instant;

use chrono::Utc;
use kube::{runtime::controller::Action, ResourceExt};
use tracing::{error, info, instrument, warn};

use super::{backup_source, concurrency::check_exclusive, pitr_gate, validate::validate};
use super::topology::TopologyOverride;
use crate::controllers::Context;
use crate::crd::{DbCluster, DbClusterBackup, DbClusterRestore, RestoreState};
use crate::error::{Error, Result, ResultExt};
use crate::metrics;

/// Reconcile one restore request
#[instrument(skip(ctx))]
pub async fn reconcile(ctx: &Context, namespace: &str, name: &str) -> Result<Action> {
    let Some(mut restore) = ctx.store.get_restore(namespace, name).await? else {
        return Ok(Action::await_change());
    };

    if restore.state() != RestoreState::New {
        return Ok(Action::await_change());
    }

    info!(cluster = %restore.spec.cluster_name, "backup restore request");
    set_status(ctx, &mut restore, RestoreState::Starting, None)
        .await
        .stage("set status")?;

    let started = Instant::now();
    let outcome = run_stages(ctx, &mut restore).await;
    finalize(ctx, &mut restore, outcome, started).await
}

/// Everything between `Starting` and the terminal status
async fn run_stages(ctx: &Context, restore: &mut DbClusterRestore) -> Result<()> {
    let namespace = restore.namespace().unwrap_or_else(|| "default".to_string());
    let cluster_name = restore.spec.cluster_name.clone();

    let restores = ctx
        .store
        .list_restores(&namespace)
        .await
        .stage("get restore jobs list")?;
    check_exclusive(&cluster_name, &restore.name_any(), &restores)?;

    restore.check_and_set_defaults()?;

    let mut cluster = ctx
        .store
        .get_cluster(&namespace, &cluster_name)
        .await
        .and_then(|c| c.ok_or_else(|| Error::NotFound(format!("cluster {}", cluster_name))))
        .stage(format!("get cluster {}", cluster_name))?;
    let original = cluster.clone();

    cluster
        .check_and_set_defaults(&ctx.server_version)
        .stage("wrong cluster options")?;

    let backup = backup_source::resolve(ctx.store.as_ref(), restore)
        .await
        .stage("get backup")?;

    if restore.spec.pitr.is_some() {
        pitr_gate::check(ctx.pitr_checker.as_ref(), restore, &cluster, &backup).await?;
    }

    validate(restore, &backup, &cluster).stage("failed to validate restore job")?;

    info!(cluster = %cluster_name, "stopping cluster");
    set_status(ctx, restore, RestoreState::StopCluster, None)
        .await
        .stage("set status")?;
    ctx.lifecycle
        .pause(&cluster, true)
        .await
        .stage(format!("stop cluster {}", cluster_name))?;

    info!(cluster = %cluster_name, backup = %backup.name_any(), "starting restore");
    set_status(ctx, restore, RestoreState::Restore, None)
        .await
        .stage("set status")?;
    ctx.operations
        .run_restore(restore, &backup, &cluster)
        .await
        .stage("run restore")?;

    if cluster.pitr_enabled() {
        if let Err(e) = ctx.cache.invalidate(&cluster).await {
            error!(cluster = %cluster_name, error = %e, "failed to invalidate binlog collector cache");
        }
    }

    info!(cluster = %cluster_name, "starting cluster");
    set_status(ctx, restore, RestoreState::StartCluster, None)
        .await
        .stage("set status")?;

    if restore.spec.pitr.is_some() {
        run_pitr_stage(ctx, restore, &backup, &mut cluster).await?;

        info!(cluster = %cluster_name, "starting cluster");
        set_status(ctx, restore, RestoreState::StartCluster, None)
            .await
            .stage("set status")?;
    }

    ctx.lifecycle
        .unpause(&original)
        .await
        .stage("restart cluster")
}

/// Replay logs with the cluster shrunk to one member.
///
/// The topology override is undone on every exit, so `cluster` leaves this
/// function with its pre-override sizes even when replay fails.
pub(crate) async fn run_pitr_stage(
    ctx: &Context,
    restore: &mut DbClusterRestore,
    backup: &DbClusterBackup,
    cluster: &mut DbCluster,
) -> Result<()> {
    let working = TopologyOverride::new(cluster);

    ctx.lifecycle
        .unpause(&working)
        .await
        .stage("restart cluster for pitr")?;

    info!(cluster = %working.name_any(), "point-in-time recovering");
    set_status(ctx, restore, RestoreState::Pitr, None)
        .await
        .stage("set status")?;

    ctx.operations
        .run_pitr(restore, backup, &working)
        .await
        .stage("run pitr")
}

/// Write the terminal status for the attempt
async fn finalize(
    ctx: &Context,
    restore: &mut DbClusterRestore,
    outcome: Result<()>,
    started: Instant,
) -> Result<Action> {
    let namespace = restore.namespace().unwrap_or_else(|| "default".to_string());
    metrics::RESTORE_DURATION
        .with_label_values(&[&namespace])
        .observe(started.elapsed().as_secs_f64());

    match outcome {
        Ok(()) => {
            let message = restore.backup_restored_message();
            set_status(ctx, restore, RestoreState::Succeeded, Some(message.clone()))
                .await
                .stage("set status")?;
            metrics::RESTORES_TOTAL
                .with_label_values(&["success", &namespace])
                .inc();
            info!(cluster = %restore.spec.cluster_name, "{}", message);
            Ok(Action::await_change())
        }
        Err(err) => {
            warn!(cluster = %restore.spec.cluster_name, error = %err, "restore failed");
            metrics::RESTORES_TOTAL
                .with_label_values(&["failure", &namespace])
                .inc();

            if let Err(e) =
                set_status(ctx, restore, RestoreState::Failed, Some(err.to_string())).await
            {
                error!(error = %e, "failed to record restore failure");
            }

            match err {
                Error::UnsafePitr => Ok(Action::await_change()),
                other => Err(other),
            }
        }
    }
}

/// Persist a status transition
async fn set_status(
    ctx: &Context,
    restore: &mut DbClusterRestore,
    state: RestoreState,
    comments: Option<String>,
) -> Result<()> {
    let status = restore.status.get_or_insert_with(Default::default);
    status.state = state;
    status.comments = comments;
    if state == RestoreState::Succeeded {
        status.completed = Some(Utc::now());
    }

    metrics::RESTORE_STAGE_TRANSITIONS
        .with_label_values(&[state.as_str()])
        .inc();

    ctx.store.update_restore_status(restore).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::{
        MockCacheInvalidator, MockClusterLifecycle, MockPitrChecker, MockResourceStore,
        MockRestoreOperations, ServerVersion,
    };
    use crate::crd::{
        DbClusterBackupSpec, DbClusterRestoreSpec, DbClusterSpec, DbSpec, PitrTarget, ProxySpec,
    };

    fn context(
        store: MockResourceStore,
        lifecycle: MockClusterLifecycle,
        operations: MockRestoreOperations,
    ) -> Context {
        Context {
            store: Arc::new(store),
            lifecycle: Arc::new(lifecycle),
            operations: Arc::new(operations),
            pitr_checker: Arc::new(MockPitrChecker::new()),
            cache: Arc::new(MockCacheInvalidator::new()),
            server_version: ServerVersion::new(1, 30),
        }
    }

    fn cluster() -> DbCluster {
        let mut c = DbCluster::new(
            "c1",
            DbClusterSpec {
                db: DbSpec {
                    size: 3,
                    ..Default::default()
                },
                haproxy: Some(ProxySpec {
                    enabled: true,
                    size: 2,
                    image: String::new(),
                }),
                ..Default::default()
            },
        );
        c.metadata.namespace = Some("ns".into());
        c
    }

    fn restore() -> DbClusterRestore {
        let mut r = DbClusterRestore::new(
            "r1",
            DbClusterRestoreSpec {
                cluster_name: "c1".into(),
                backup_name: Some("b1".into()),
                pitr: Some(PitrTarget::default()),
                ..Default::default()
            },
        );
        r.metadata.namespace = Some("ns".into());
        r
    }

    fn backup() -> DbClusterBackup {
        DbClusterBackup::new(
            "b1",
            DbClusterBackupSpec {
                cluster_name: "c1".into(),
                storage_name: "s3".into(),
            },
        )
    }

    #[tokio::test]
    async fn failed_replay_leaves_topology_restored() {
        let mut store = MockResourceStore::new();
        store
            .expect_update_restore_status()
            .withf(|r| r.state() == RestoreState::Pitr)
            .times(1)
            .returning(|_| Ok(()));

        let mut lifecycle = MockClusterLifecycle::new();
        lifecycle
            .expect_unpause()
            .withf(|c| {
                c.spec.db.size == 1
                    && c.spec.haproxy.as_ref().map(|p| p.size) == Some(0)
                    && c.spec.unsafe_flags.db_size
                    && c.spec.unsafe_flags.proxy_size
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut operations = MockRestoreOperations::new();
        operations
            .expect_run_pitr()
            .withf(|_, _, c| c.spec.db.size == 1)
            .times(1)
            .returning(|_, _, _| Err(Error::collaborator("binlog apply failed")));

        let ctx = context(store, lifecycle, operations);
        let original = cluster();
        let mut working = original.clone();
        let mut r = restore();

        let err = run_pitr_stage(&ctx, &mut r, &backup(), &mut working)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "run pitr: binlog apply failed");
        assert_eq!(working, original);
    }

    #[tokio::test]
    async fn failed_single_member_start_leaves_topology_restored() {
        let mut lifecycle = MockClusterLifecycle::new();
        lifecycle
            .expect_unpause()
            .times(1)
            .returning(|_| Err(Error::Timeout("cluster c1 to become ready".into())));

        let mut operations = MockRestoreOperations::new();
        operations.expect_run_pitr().never();

        let ctx = context(MockResourceStore::new(), lifecycle, operations);
        let original = cluster();
        let mut working = original.clone();

        let err = run_pitr_stage(&ctx, &mut restore(), &backup(), &mut working)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("restart cluster for pitr"));
        assert_eq!(working, original);
    }

    #[tokio::test]
    async fn absent_request_is_a_no_op() {
        let mut store = MockResourceStore::new();
        store.expect_get_restore().returning(|_, _| Ok(None));
        store.expect_update_restore_status().never();

        let ctx = context(store, MockClusterLifecycle::new(), MockRestoreOperations::new());
        let action = reconcile(&ctx, "ns", "gone").await.unwrap();
        assert_eq!(action, Action::await_change());
    }
}
