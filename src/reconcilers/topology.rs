//! Temporary single-member topology for log replay
//!
//! Replay runs against exactly one database member with every proxy scaled to
//! zero. Admission would reject that shape, so both unsafe flags are raised
//! for the duration. The captured values are written back verbatim afterwards.

use std::ops::{Deref, DerefMut};

use crate::crd::DbCluster;

/// Member counts and unsafe flags captured before an override
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub db_size: i32,
    /// Zero when haproxy is not configured
    pub haproxy_size: i32,
    /// Zero when proxysql is not configured
    pub proxysql_size: i32,
    pub unsafe_db_size: bool,
    pub unsafe_proxy_size: bool,
}

impl TopologySnapshot {
    /// Record the cluster's current topology
    pub fn capture(cluster: &DbCluster) -> Self {
        let spec = &cluster.spec;
        Self {
            db_size: spec.db.size,
            haproxy_size: spec.haproxy.as_ref().map(|p| p.size).unwrap_or(0),
            proxysql_size: spec.proxysql.as_ref().map(|p| p.size).unwrap_or(0),
            unsafe_db_size: spec.unsafe_flags.db_size,
            unsafe_proxy_size: spec.unsafe_flags.proxy_size,
        }
    }

    /// Write the captured topology back. Proxies that are not configured stay absent.
    pub fn restore(&self, cluster: &mut DbCluster) {
        let spec = &mut cluster.spec;
        spec.db.size = self.db_size;
        spec.unsafe_flags.db_size = self.unsafe_db_size;
        spec.unsafe_flags.proxy_size = self.unsafe_proxy_size;
        if let Some(haproxy) = spec.haproxy.as_mut() {
            haproxy.size = self.haproxy_size;
        }
        if let Some(proxysql) = spec.proxysql.as_mut() {
            proxysql.size = self.proxysql_size;
        }
    }
}

/// Force a single-member, proxy-less topology and return what it replaced
pub fn override_topology(cluster: &mut DbCluster) -> TopologySnapshot {
    let snapshot = TopologySnapshot::capture(cluster);

    let spec = &mut cluster.spec;
    spec.unsafe_flags.db_size = true;
    spec.unsafe_flags.proxy_size = true;
    spec.db.size = 1;
    if let Some(haproxy) = spec.haproxy.as_mut() {
        haproxy.size = 0;
    }
    if let Some(proxysql) = spec.proxysql.as_mut() {
        proxysql.size = 0;
    }

    snapshot
}

/// Scoped topology override, restored when dropped
pub struct TopologyOverride<'a> {
    cluster: &'a mut DbCluster,
    snapshot: TopologySnapshot,
}

impl<'a> TopologyOverride<'a> {
    pub fn new(cluster: &'a mut DbCluster) -> Self {
        let snapshot = override_topology(cluster);
        Self { cluster, snapshot }
    }

    pub fn snapshot(&self) -> &TopologySnapshot {
        &self.snapshot
    }
}

impl Deref for TopologyOverride<'_> {
    type Target = DbCluster;

    fn deref(&self) -> &DbCluster {
        self.cluster
    }
}

impl DerefMut for TopologyOverride<'_> {
    fn deref_mut(&mut self) -> &mut DbCluster {
        self.cluster
    }
}

impl Drop for TopologyOverride<'_> {
    fn drop(&mut self) {
        self.snapshot.restore(self.cluster);
    }
}
