//! DbCluster Restore Kubernetes Operator
//!
//! This operator restores database clusters from backups, optionally
//! followed by point-in-time recovery, driven by DbClusterRestore
//! Custom Resources.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod wait;

pub use error::{Error, Result};
