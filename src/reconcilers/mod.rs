//! Restore orchestration
//!
//! `restore` drives a request through its stages. The other modules are the
//! pieces it composes:
//! - Concurrency guard across restores of the same cluster
//! - Backup resolution from a named backup or an inline source
//! - PITR safety gate
//! - Request/backup/cluster compatibility checks
//! - Temporary topology override for log replay

pub mod backup_source;
pub mod concurrency;
pub mod pitr_gate;
pub mod restore;
pub mod topology;
pub mod validate;
