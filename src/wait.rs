//! Fixed-interval bounded polling
//!
//! Confirms that a paused cluster's pods and volumes have converged before
//! the next stage proceeds. Polling is once per interval with no backoff.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::adapters::{CountedKind, ResourceStore};
use crate::error::{Error, Result};

/// Base poll limit for convergence waits, in polls (one per second)
pub const WAIT_LIMIT_SECS: u64 = 300;

/// Default interval between polls
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll `probe` until it returns `true`, at most `limit` times.
///
/// Sleeps `interval` after every unsatisfied probe except the last. Returns
/// `Error::Timeout(what)` once `limit` probes have all been unsatisfied.
pub async fn poll_until<F, Fut>(
    limit: u64,
    interval: Duration,
    what: &str,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 1..=limit {
        if probe().await? {
            debug!(what, attempt, "wait satisfied");
            return Ok(());
        }
        if attempt < limit {
            tokio::time::sleep(interval).await;
        }
    }

    Err(Error::Timeout(what.to_string()))
}

/// Waits on label-selected pods and PVCs through the resource store
#[derive(Clone)]
pub struct BoundedWaiter {
    store: Arc<dyn ResourceStore>,
    interval: Duration,
}

impl BoundedWaiter {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            interval: POLL_INTERVAL,
        }
    }

    /// Override the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll until `predicate` holds for the number of matching resources
    pub async fn wait_until<P>(
        &self,
        kind: CountedKind,
        selector: &BTreeMap<String, String>,
        namespace: &str,
        predicate: P,
        limit: u64,
    ) -> Result<()>
    where
        P: Fn(usize) -> bool + Send + Sync,
    {
        let what = format!("{} in {}", kind.as_str(), namespace);
        poll_until(limit, self.interval, &what, || async {
            let names = self.store.list_names(kind, namespace, selector).await?;
            Ok(predicate(names.len()))
        })
        .await
    }

    /// Wait until no pods match, allowing `grace_period_secs` beyond the base limit
    pub async fn wait_for_pods_shutdown(
        &self,
        selector: &BTreeMap<String, String>,
        namespace: &str,
        grace_period_secs: u64,
    ) -> Result<()> {
        self.wait_until(
            CountedKind::Pods,
            selector,
            namespace,
            |count| count == 0,
            WAIT_LIMIT_SECS + grace_period_secs,
        )
        .await
    }

    /// Wait until exactly one PVC matches
    pub async fn wait_for_pvc_convergence(
        &self,
        selector: &BTreeMap<String, String>,
        namespace: &str,
    ) -> Result<()> {
        self.wait_until(
            CountedKind::PersistentVolumeClaims,
            selector,
            namespace,
            |count| count == 1,
            WAIT_LIMIT_SECS,
        )
        .await
    }
}
