//! Safety checks before a point-in-time restore

use tracing::warn;

use crate::adapters::PitrChecker;
use crate::crd::{DbCluster, DbClusterBackup, DbClusterRestore};
use crate::error::{Error, Result};

/// Verify that replaying logs on top of `backup` gives a consistent result.
///
/// Errors from the cluster's log collection check are returned unchanged. A
/// backup explicitly marked not PITR-ready trips the gate unless the request
/// carries the unsafe-PITR annotation.
pub async fn check(
    checker: &dyn PitrChecker,
    restore: &DbClusterRestore,
    cluster: &DbCluster,
    backup: &DbClusterBackup,
) -> Result<()> {
    checker.check_pitr_errors(cluster).await?;

    let ready = backup.status.as_ref().and_then(|s| s.pitr_ready());
    if ready == Some(false) {
        if !restore.has_unsafe_pitr_override() {
            return Err(Error::UnsafePitr);
        }
        warn!(
            backup = ?backup.metadata.name,
            "backup is not PITR-ready, continuing because of unsafe-pitr annotation"
        );
    }

    Ok(())
}
