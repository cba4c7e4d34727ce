//! Recording fakes for the restore collaborators

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::ResourceExt;

use db_restore_operator::adapters::{
    CacheInvalidator, ClusterLifecycle, CountedKind, PitrChecker, ResourceStore,
    RestoreOperations, ServerVersion,
};
use db_restore_operator::controllers::Context;
use db_restore_operator::crd::{
    BackupConfig, BackupState, Condition, DbCluster, DbClusterBackup, DbClusterBackupSpec,
    DbClusterBackupStatus, DbClusterRestore, DbClusterRestoreSpec, DbClusterRestoreStatus,
    DbClusterSpec, DbSpec, PitrConfig, PitrTarget, ProxySpec, RestoreState, StorageSpec,
    PITR_READY_CONDITION,
};
use db_restore_operator::{Error, Result};

pub const NAMESPACE: &str = "default";

/// Ordered log of collaborator calls
pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

#[derive(Default)]
pub struct FakeStore {
    pub restores: Mutex<Vec<DbClusterRestore>>,
    pub clusters: Mutex<Vec<DbCluster>>,
    pub backups: Mutex<Vec<DbClusterBackup>>,
    /// (state, comments) of every status write, in order
    pub status_writes: Mutex<Vec<(RestoreState, Option<String>)>>,
    pub fail_list: bool,
    pub fail_get_cluster: bool,
}

impl FakeStore {
    pub fn with_restore(self, restore: DbClusterRestore) -> Self {
        self.restores.lock().unwrap().push(restore);
        self
    }

    pub fn with_cluster(self, cluster: DbCluster) -> Self {
        self.clusters.lock().unwrap().push(cluster);
        self
    }

    pub fn with_backup(self, backup: DbClusterBackup) -> Self {
        self.backups.lock().unwrap().push(backup);
        self
    }

    pub fn states(&self) -> Vec<RestoreState> {
        self.status_writes
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| *s)
            .collect()
    }

    pub fn status_of(&self, name: &str) -> Option<DbClusterRestoreStatus> {
        self.restores
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name_any() == name)
            .and_then(|r| r.status.clone())
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get_restore(&self, _namespace: &str, name: &str) -> Result<Option<DbClusterRestore>> {
        Ok(self
            .restores
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name_any() == name)
            .cloned())
    }

    async fn list_restores(&self, _namespace: &str) -> Result<Vec<DbClusterRestore>> {
        if self.fail_list {
            return Err(Error::collaborator("list unavailable"));
        }
        Ok(self.restores.lock().unwrap().clone())
    }

    async fn update_restore_status(&self, restore: &DbClusterRestore) -> Result<()> {
        let status = restore.status.clone().unwrap_or_default();
        self.status_writes
            .lock()
            .unwrap()
            .push((status.state, status.comments.clone()));

        let mut restores = self.restores.lock().unwrap();
        if let Some(stored) = restores
            .iter_mut()
            .find(|r| r.name_any() == restore.name_any())
        {
            stored.status = Some(status);
        }
        Ok(())
    }

    async fn get_cluster(&self, _namespace: &str, name: &str) -> Result<Option<DbCluster>> {
        if self.fail_get_cluster {
            return Err(Error::collaborator("store unavailable"));
        }
        Ok(self
            .clusters
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name_any() == name)
            .cloned())
    }

    async fn get_backup(&self, _namespace: &str, name: &str) -> Result<Option<DbClusterBackup>> {
        Ok(self
            .backups
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.name_any() == name)
            .cloned())
    }

    async fn list_names(
        &self,
        _kind: CountedKind,
        _namespace: &str,
        _selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete_pvc(&self, _namespace: &str, _name: &str) -> Result<()> {
        Ok(())
    }
}

/// Errors the fakes return instead of succeeding
#[derive(Debug, Default)]
pub struct Faults {
    pub pause: Option<Error>,
    /// Fail unpause when asked for this db size
    pub unpause_at_size: Option<(i32, String)>,
    pub restore: Option<String>,
    pub pitr_check: Option<String>,
    pub pitr: Option<String>,
    pub cache: bool,
}

/// Records pause/unpause with the db size it was asked for
pub struct FakeLifecycle {
    pub log: CallLog,
    pub pause_error: Mutex<Option<Error>>,
    pub unpause_error: Option<(i32, String)>,
}

#[async_trait]
impl ClusterLifecycle for FakeLifecycle {
    async fn pause(&self, cluster: &DbCluster, wait_for_shutdown: bool) -> Result<()> {
        record(
            &self.log,
            format!("pause {} wait={}", cluster.name_any(), wait_for_shutdown),
        );
        match self.pause_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn unpause(&self, cluster: &DbCluster) -> Result<()> {
        let size = cluster.spec.db.size;
        record(&self.log, format!("unpause {} size={}", cluster.name_any(), size));
        match &self.unpause_error {
            Some((at, msg)) if *at == size => Err(Error::collaborator(msg.clone())),
            _ => Ok(()),
        }
    }
}

pub struct FakeOperations {
    pub log: CallLog,
    pub restore_error: Option<String>,
    pub pitr_error: Option<String>,
}

#[async_trait]
impl RestoreOperations for FakeOperations {
    async fn run_restore(
        &self,
        _restore: &DbClusterRestore,
        backup: &DbClusterBackup,
        _cluster: &DbCluster,
    ) -> Result<()> {
        record(&self.log, format!("restore {}", backup.name_any()));
        match &self.restore_error {
            Some(msg) => Err(Error::collaborator(msg.clone())),
            None => Ok(()),
        }
    }

    async fn run_pitr(
        &self,
        _restore: &DbClusterRestore,
        _backup: &DbClusterBackup,
        cluster: &DbCluster,
    ) -> Result<()> {
        record(&self.log, format!("pitr size={}", cluster.spec.db.size));
        match &self.pitr_error {
            Some(msg) => Err(Error::collaborator(msg.clone())),
            None => Ok(()),
        }
    }
}

pub struct FakePitrChecker {
    pub log: CallLog,
    pub error: Option<String>,
}

#[async_trait]
impl PitrChecker for FakePitrChecker {
    async fn check_pitr_errors(&self, cluster: &DbCluster) -> Result<()> {
        record(&self.log, format!("check pitr {}", cluster.name_any()));
        match &self.error {
            Some(msg) => Err(Error::collaborator(msg.clone())),
            None => Ok(()),
        }
    }
}

pub struct FakeCache {
    pub log: CallLog,
    pub fail: bool,
}

#[async_trait]
impl CacheInvalidator for FakeCache {
    async fn invalidate(&self, cluster: &DbCluster) -> Result<()> {
        record(&self.log, format!("invalidate {}", cluster.name_any()));
        if self.fail {
            return Err(Error::collaborator("collector unreachable"));
        }
        Ok(())
    }
}

/// Test harness: context plus handles to inspect what happened
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub log: CallLog,
    pub ctx: Context,
}

impl Harness {
    pub fn new(store: FakeStore) -> Self {
        Self::with_faults(store, Faults::default())
    }

    pub fn build(store: FakeStore, pitr_error: Option<&str>, cache_fails: bool) -> Self {
        Self::with_faults(
            store,
            Faults {
                pitr: pitr_error.map(str::to_string),
                cache: cache_fails,
                ..Default::default()
            },
        )
    }

    pub fn with_faults(store: FakeStore, faults: Faults) -> Self {
        let store = Arc::new(store);
        let log: CallLog = Arc::default();
        let ctx = Context {
            store: store.clone(),
            lifecycle: Arc::new(FakeLifecycle {
                log: log.clone(),
                pause_error: Mutex::new(faults.pause),
                unpause_error: faults.unpause_at_size,
            }),
            operations: Arc::new(FakeOperations {
                log: log.clone(),
                restore_error: faults.restore,
                pitr_error: faults.pitr,
            }),
            pitr_checker: Arc::new(FakePitrChecker {
                log: log.clone(),
                error: faults.pitr_check,
            }),
            cache: Arc::new(FakeCache {
                log: log.clone(),
                fail: faults.cache,
            }),
            server_version: ServerVersion::new(1, 30),
        };
        Self { store, log, ctx }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

pub fn cluster(name: &str) -> DbCluster {
    let mut c = DbCluster::new(
        name,
        DbClusterSpec {
            db: DbSpec {
                size: 3,
                image: "db:8.0".into(),
                termination_grace_period_seconds: None,
            },
            haproxy: Some(ProxySpec {
                enabled: true,
                size: 2,
                image: "haproxy:2.8".into(),
            }),
            backup: Some(BackupConfig {
                image: "restore:8.0".into(),
                storages: BTreeMap::from([
                    ("s3-us".to_string(), StorageSpec::default()),
                    ("binlogs".to_string(), StorageSpec::default()),
                ]),
                pitr: PitrConfig {
                    enabled: true,
                    storage_name: "binlogs".into(),
                },
            }),
            ..Default::default()
        },
    );
    c.metadata.namespace = Some(NAMESPACE.into());
    c
}

pub fn backup(name: &str, cluster: &str, state: BackupState) -> DbClusterBackup {
    let mut b = DbClusterBackup::new(
        name,
        DbClusterBackupSpec {
            cluster_name: cluster.into(),
            storage_name: "s3-us".into(),
        },
    );
    b.metadata.namespace = Some(NAMESPACE.into());
    b.status = Some(DbClusterBackupStatus {
        state,
        destination: Some(format!("s3://backups/{}", name)),
        storage_name: Some("s3-us".into()),
        ..Default::default()
    });
    b
}

pub fn not_pitr_ready(mut backup: DbClusterBackup) -> DbClusterBackup {
    if let Some(status) = backup.status.as_mut() {
        status
            .conditions
            .push(Condition::new(PITR_READY_CONDITION, false));
    }
    backup
}

pub fn restore(name: &str, cluster: &str, backup: &str) -> DbClusterRestore {
    let mut r = DbClusterRestore::new(
        name,
        DbClusterRestoreSpec {
            cluster_name: cluster.into(),
            backup_name: Some(backup.into()),
            ..Default::default()
        },
    );
    r.metadata.namespace = Some(NAMESPACE.into());
    r
}

pub fn pitr_restore(name: &str, cluster: &str, backup: &str) -> DbClusterRestore {
    let mut r = restore(name, cluster, backup);
    r.spec.pitr = Some(PitrTarget::default());
    r
}

pub fn with_state(mut restore: DbClusterRestore, state: RestoreState) -> DbClusterRestore {
    restore.status = Some(DbClusterRestoreStatus {
        state,
        ..Default::default()
    });
    restore
}
