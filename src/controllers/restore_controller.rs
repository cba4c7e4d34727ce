//! DbClusterRestore controller
//!
//! Watches DbClusterRestore resources and triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info};

use crate::controllers::Context;
use crate::crd::DbClusterRestore;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::restore as restore_reconciler;

/// Run the DbClusterRestore controller
pub async fn run(client: Client, context: Arc<Context>, namespace: Option<String>) {
    let api: Api<DbClusterRestore> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("DbClusterRestore CRD not installed: {}", e);
        return;
    }

    info!(namespace = namespace.as_deref().unwrap_or("*"), "Starting DbClusterRestore controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled DbClusterRestore"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["DbClusterRestore"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
async fn reconcile(obj: Arc<DbClusterRestore>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["DbClusterRestore"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["DbClusterRestore"])
        .inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    restore_reconciler::reconcile(&ctx, &namespace, &obj.name_any()).await
}

/// Error policy for the controller
///
/// A failed restore has already been finalized, so the requeue only reaches
/// the entry guard. Errors before finalization (store reads) are retried.
fn error_policy(obj: Arc<DbClusterRestore>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        kind = error.kind(),
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(requeue_after(error))
}

fn requeue_after(error: &Error) -> Duration {
    match error.root() {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Config(_) | Error::Validation(_) => Duration::from_secs(300),
        Error::NotFound(_) | Error::NotReady { .. } => Duration::from_secs(60),
        _ => Duration::from_secs(30),
    }
}
