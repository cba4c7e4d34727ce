//! Single active restore per cluster

use kube::ResourceExt;

use crate::crd::DbClusterRestore;
use crate::error::{Error, Result};

/// Reject the restore if another non-terminal request targets the same cluster.
///
/// Check-then-act over a listing; two requests observed in the same instant
/// may both pass.
pub fn check_exclusive(
    cluster_name: &str,
    restore_name: &str,
    restores: &[DbClusterRestore],
) -> Result<()> {
    let active = restores.iter().find(|r| {
        r.spec.cluster_name == cluster_name
            && r.name_any() != restore_name
            && !r.state().is_terminal()
    });

    match active {
        Some(other) => Err(Error::Conflict(other.name_any())),
        None => Ok(()),
    }
}
