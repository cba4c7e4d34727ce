//! Integration tests for request, cluster and compatibility validation
//!
//! These tests verify that defaulting accepts valid resources and rejects
//! invalid ones, and that restore/backup/cluster combinations are checked
//! before anything touches the cluster.

mod common;

use common::*;
use db_restore_operator::adapters::ServerVersion;
use db_restore_operator::crd::{
    BackupState, DbClusterBackupStatus, PitrBackupSource, PitrTarget, PitrType, ProxySpec,
    DEFAULT_TERMINATION_GRACE_PERIOD_SECS,
};
use db_restore_operator::reconcilers::{concurrency::check_exclusive, validate::validate};

fn server() -> ServerVersion {
    ServerVersion::new(1, 30)
}

// ============================================================================
// Restore Request Defaults
// ============================================================================

#[test]
fn restore_valid_request_passes_defaults() {
    let mut r = restore("r1", "c1", "b1");
    let result = r.check_and_set_defaults();
    if let Err(e) = &result {
        panic!("Defaults failed unexpectedly: {:?}", e);
    }
}

#[test]
fn restore_empty_cluster_name_fails() {
    let mut r = restore("r1", "", "b1");
    let err = r.check_and_set_defaults().unwrap_err();
    assert!(err.to_string().contains("clusterName"));
}

#[test]
fn restore_inline_source_needs_destination() {
    let mut r = restore("r1", "c1", "");
    r.spec.backup_source = Some(DbClusterBackupStatus::default());
    let err = r.check_and_set_defaults().unwrap_err();
    assert!(err.to_string().contains("destination"));
}

#[test]
fn restore_pitr_targets() {
    let cases = vec![
        (PitrType::Latest, None, None, true),
        (PitrType::Date, Some("2024-05-01 10:00:00"), None, true),
        (PitrType::Date, Some("2024-05-01T10:00:00Z"), None, false),
        (PitrType::Date, None, None, false),
        (PitrType::Transaction, None, Some("uuid:1-42"), true),
        (PitrType::Transaction, None, None, false),
        (PitrType::Skip, None, Some("uuid:43"), true),
    ];

    for (type_, date, gtid, ok) in cases {
        let mut r = restore("r1", "c1", "b1");
        r.spec.pitr = Some(PitrTarget {
            type_,
            date: date.map(str::to_string),
            gtid: gtid.map(str::to_string),
            backup_source: None,
        });
        let result = r.check_and_set_defaults();
        assert_eq!(
            result.is_ok(),
            ok,
            "type {} date {:?} gtid {:?}: {:?}",
            type_,
            date,
            gtid,
            result.err()
        );
    }
}

// ============================================================================
// Cluster Defaults
// ============================================================================

#[test]
fn cluster_defaults_fill_version_and_grace_period() {
    let mut c = cluster("c1");
    c.check_and_set_defaults(&server()).unwrap();

    assert_eq!(c.spec.cr_version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
    assert_eq!(
        c.spec.db.termination_grace_period_seconds,
        Some(DEFAULT_TERMINATION_GRACE_PERIOD_SECS)
    );
}

#[test]
fn cluster_defaults_reject_old_kubernetes() {
    let mut c = cluster("c1");
    let err = c
        .check_and_set_defaults(&ServerVersion::new(1, 23))
        .unwrap_err();
    assert!(err.to_string().contains("1.23"));
}

#[test]
fn cluster_even_size_requires_unsafe_flag() {
    let mut c = cluster("c1");
    c.spec.db.size = 2;
    assert!(c.check_and_set_defaults(&server()).is_err());

    c.spec.unsafe_flags.db_size = true;
    assert!(c.check_and_set_defaults(&server()).is_ok());
}

#[test]
fn cluster_single_proxy_requires_unsafe_flag() {
    let mut c = cluster("c1");
    c.spec.haproxy.as_mut().unwrap().size = 1;
    let err = c.check_and_set_defaults(&server()).unwrap_err();
    assert!(err.to_string().contains("haproxy"));

    c.spec.unsafe_flags.proxy_size = true;
    assert!(c.check_and_set_defaults(&server()).is_ok());
}

#[test]
fn cluster_rejects_two_enabled_proxies() {
    let mut c = cluster("c1");
    c.spec.proxysql = Some(ProxySpec {
        enabled: true,
        size: 2,
        image: "proxysql:2.5".into(),
    });
    assert!(c.check_and_set_defaults(&server()).is_err());
}

// ============================================================================
// Restore/Backup/Cluster Compatibility
// ============================================================================

#[test]
fn compatible_restore_passes_validation() {
    let b = backup("b1", "c1", BackupState::Succeeded);
    assert!(validate(&restore("r1", "c1", "b1"), &b, &cluster("c1")).is_ok());
}

#[test]
fn cluster_without_backup_image_fails_validation() {
    let mut c = cluster("c1");
    c.spec.backup.as_mut().unwrap().image.clear();
    let b = backup("b1", "c1", BackupState::Succeeded);

    let err = validate(&restore("r1", "c1", "b1"), &b, &c).unwrap_err();
    assert!(err.to_string().contains("backup image"));
}

#[test]
fn pitr_log_storage_must_exist() {
    let mut c = cluster("c1");
    c.spec.backup.as_mut().unwrap().pitr.storage_name = String::new();
    let b = backup("b1", "c1", BackupState::Succeeded);

    let mut r = pitr_restore("r1", "c1", "b1");
    assert!(validate(&r, &b, &c).is_err());

    r.spec.pitr.as_mut().unwrap().backup_source = Some(PitrBackupSource {
        storage_name: Some("missing".into()),
        ..Default::default()
    });
    let err = validate(&r, &b, &c).unwrap_err();
    assert!(err.to_string().contains("pitr storage missing"));

    r.spec.pitr.as_mut().unwrap().backup_source = Some(PitrBackupSource {
        storage_name: Some("binlogs".into()),
        ..Default::default()
    });
    assert!(validate(&r, &b, &c).is_ok());
}

// ============================================================================
// Concurrency Guard
// ============================================================================

#[test]
fn new_request_on_same_cluster_counts_as_active() {
    let others = vec![restore("r0", "c1", "b0"), restore("r1", "c1", "b1")];
    let err = check_exclusive("c1", "r1", &others).unwrap_err();
    assert_eq!(
        err.to_string(),
        "unable to continue, concurrent restore job r0 running now"
    );
}

#[test]
fn request_does_not_conflict_with_itself() {
    let only = vec![restore("r1", "c1", "b1")];
    assert!(check_exclusive("c1", "r1", &only).is_ok());
}
