//! Operator configuration read from the environment

use std::str::FromStr;

use crate::error::{Error, Result};

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default bound on restore and replay Job polling (8 hours)
pub const DEFAULT_JOB_WAIT_LIMIT_SECS: u64 = 8 * 60 * 60;

/// Default bound on waiting for an unpaused cluster to become ready
pub const DEFAULT_CLUSTER_READY_WAIT_LIMIT_SECS: u64 = 30 * 60;

/// Operator configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace to watch; all namespaces when `None`
    pub watch_namespace: Option<String>,

    /// Port for /metrics and health endpoints
    pub metrics_port: u16,

    /// Poll limit (seconds) for restore and replay Jobs
    pub job_wait_limit_secs: u64,

    /// Poll limit (seconds) for unpaused clusters to become ready
    pub cluster_ready_wait_limit_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            job_wait_limit_secs: DEFAULT_JOB_WAIT_LIMIT_SECS,
            cluster_ready_wait_limit_secs: DEFAULT_CLUSTER_READY_WAIT_LIMIT_SECS,
        }
    }
}

impl OperatorConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port)?,
            job_wait_limit_secs: parse_or(
                &lookup,
                "JOB_WAIT_LIMIT_SECS",
                defaults.job_wait_limit_secs,
            )?,
            cluster_ready_wait_limit_secs: parse_or(
                &lookup,
                "CLUSTER_READY_WAIT_LIMIT_SECS",
                defaults.cluster_ready_wait_limit_secs,
            )?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("invalid {} '{}': {}", key, raw, e))),
    }
}
