//! Compatibility of a restore request, its backup and the target cluster

use kube::ResourceExt;

use crate::crd::{DbCluster, DbClusterBackup, DbClusterRestore};
use crate::error::{Error, Result};

/// Check that `backup` can be restored into `cluster` as `restore` asks
pub fn validate(
    restore: &DbClusterRestore,
    backup: &DbClusterBackup,
    cluster: &DbCluster,
) -> Result<()> {
    let backup_name = backup.name_any();

    if backup.destination().is_none() {
        return Err(Error::validation(format!(
            "backup {} has no destination",
            backup_name
        )));
    }

    let has_image = cluster
        .spec
        .backup
        .as_ref()
        .is_some_and(|b| !b.image.is_empty());
    if !has_image {
        return Err(Error::validation(format!(
            "cluster {} has no backup image configured",
            cluster.name_any()
        )));
    }

    let inline_storage = backup
        .status
        .as_ref()
        .is_some_and(|s| s.storage.is_some());
    if !inline_storage {
        let storage_name = backup.storage_name().ok_or_else(|| {
            Error::validation(format!("backup {} has no storage name", backup_name))
        })?;
        if cluster.storage(storage_name).is_none() {
            return Err(Error::validation(format!(
                "storage {} is not defined in cluster {}",
                storage_name,
                cluster.name_any()
            )));
        }
    }

    if let Some(pitr) = &restore.spec.pitr {
        let source = pitr.backup_source.as_ref();
        let inline_logs = source.is_some_and(|s| s.s3.is_some() || s.azure.is_some());
        let named_logs = source
            .and_then(|s| s.storage_name.as_deref())
            .filter(|n| !n.is_empty())
            .or_else(|| {
                cluster
                    .spec
                    .backup
                    .as_ref()
                    .map(|b| b.pitr.storage_name.as_str())
                    .filter(|n| !n.is_empty())
            });

        if !inline_logs {
            match named_logs {
                Some(name) if cluster.storage(name).is_some() => {}
                Some(name) => {
                    return Err(Error::validation(format!(
                        "pitr storage {} is not defined in cluster {}",
                        name,
                        cluster.name_any()
                    )));
                }
                None => {
                    return Err(Error::validation(
                        "pitr storage is not set in the restore or the cluster",
                    ));
                }
            }
        }
    }

    Ok(())
}
