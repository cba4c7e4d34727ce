//! Resolution of the backup a restore reads from

use kube::ResourceExt;

use crate::adapters::ResourceStore;
use crate::crd::{
    BackupState, DbClusterBackup, DbClusterBackupSpec, DbClusterBackupStatus, DbClusterRestore,
};
use crate::error::{Error, Result};

/// Produce the backup to restore from.
///
/// An inline `backupSource` is turned into an in-memory backup stamped with
/// the request's identity and treated as succeeded. Otherwise the named
/// backup is read and must have succeeded.
pub async fn resolve(
    store: &dyn ResourceStore,
    restore: &DbClusterRestore,
) -> Result<DbClusterBackup> {
    if let Some(source) = &restore.spec.backup_source {
        return Ok(from_inline_source(restore, source.clone()));
    }

    let namespace = restore.namespace().unwrap_or_else(|| "default".to_string());
    let name = restore.spec.backup_name.as_deref().unwrap_or_default();

    let backup = store
        .get_backup(&namespace, name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("backup {}", name)))?;

    let state = backup.state();
    if state != BackupState::Succeeded {
        return Err(Error::NotReady {
            name: backup.name_any(),
            state: state.to_string(),
        });
    }

    Ok(backup)
}

fn from_inline_source(
    restore: &DbClusterRestore,
    mut status: DbClusterBackupStatus,
) -> DbClusterBackup {
    status.state = BackupState::Succeeded;
    status.completed = None;
    status.last_scheduled = None;

    let mut backup = DbClusterBackup::new(
        &restore.name_any(),
        DbClusterBackupSpec {
            cluster_name: restore.spec.cluster_name.clone(),
            storage_name: status.storage_name.clone().unwrap_or_default(),
        },
    );
    backup.metadata.namespace = restore.namespace();
    backup.status = Some(status);
    backup
}
