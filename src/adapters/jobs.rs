//! Restore and log replay as Kubernetes batch Jobs

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec,
    SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, PostParams},
    Client, Resource, ResourceExt,
};
use tracing::info;

use super::{CountedKind, ResourceStore, RestoreOperations, DB_COMPONENT};
use crate::crd::{
    DbCluster, DbClusterBackup, DbClusterRestore, PitrTarget, StorageSpec, StorageType,
    INSTANCE_LABEL,
};
use crate::error::{Error, Result};
use crate::wait::{poll_until, BoundedWaiter, POLL_INTERVAL};

const DATA_MOUNT_PATH: &str = "/var/lib/mysql";

/// Name of the base restore Job
pub fn restore_job_name(restore: &DbClusterRestore) -> String {
    format!("restore-job-{}-{}", restore.name_any(), restore.spec.cluster_name)
}

/// Name of the log replay Job
pub fn pitr_job_name(restore: &DbClusterRestore) -> String {
    format!("pitr-job-{}-{}", restore.name_any(), restore.spec.cluster_name)
}

/// Data PVC of the first database member
pub fn primary_data_claim(cluster: &DbCluster) -> String {
    format!("datadir-{}-{}-0", cluster.name_any(), DB_COMPONENT)
}

/// Runs restore and PITR replay as Jobs and polls them to completion
pub struct JobRestoreOperations {
    client: Client,
    store: Arc<dyn ResourceStore>,
    waiter: BoundedWaiter,
    job_wait_limit_secs: u64,
}

impl JobRestoreOperations {
    pub fn new(
        client: Client,
        store: Arc<dyn ResourceStore>,
        waiter: BoundedWaiter,
        job_wait_limit_secs: u64,
    ) -> Self {
        Self {
            client,
            store,
            waiter,
            job_wait_limit_secs,
        }
    }

    /// Remove data volumes of every member except the first, so the restore
    /// lands on one volume and the others resync on start.
    async fn trim_data_volumes(&self, cluster: &DbCluster, namespace: &str) -> Result<()> {
        let selector = cluster.selector_labels(DB_COMPONENT);
        let keep = primary_data_claim(cluster);

        let claims = self
            .store
            .list_names(CountedKind::PersistentVolumeClaims, namespace, &selector)
            .await?;
        for claim in claims.iter().filter(|c| **c != keep) {
            info!(cluster = %cluster.name_any(), pvc = %claim, "deleting data volume");
            self.store.delete_pvc(namespace, claim).await?;
        }

        self.waiter.wait_for_pvc_convergence(&selector, namespace).await
    }

    async fn run_job(&self, job: Job, namespace: &str) -> Result<()> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let name = job.name_any();

        match api.create(&PostParams::default(), &job).await {
            Ok(_) => info!(job = %name, "job created"),
            Err(kube::Error::Api(e)) if e.code == 409 => info!(job = %name, "job already exists"),
            Err(e) => return Err(Error::Kube(e)),
        }

        let what = format!("job {} to complete", name);
        poll_until(self.job_wait_limit_secs, POLL_INTERVAL, &what, || async {
            let current = api.get(&name).await?;
            job_finished(&current)
        })
        .await
    }
}

/// `Ok(true)` when the Job succeeded, an error when it failed
fn job_finished(job: &Job) -> Result<bool> {
    let Some(status) = &job.status else {
        return Ok(false);
    };

    let failed = status
        .conditions
        .iter()
        .flatten()
        .any(|c| c.type_ == "Failed" && c.status == "True");
    if failed {
        return Err(Error::collaborator(format!("job {} failed", job.name_any())));
    }

    Ok(status.succeeded.unwrap_or(0) > 0)
}

/// Find the storage a backup was written to
fn backup_storage<'a>(backup: &'a DbClusterBackup, cluster: &'a DbCluster) -> Result<&'a StorageSpec> {
    if let Some(storage) = backup.status.as_ref().and_then(|s| s.storage.as_ref()) {
        return Ok(storage);
    }
    let name = backup
        .storage_name()
        .ok_or_else(|| Error::NotFound(format!("storage for backup {}", backup.name_any())))?;
    cluster
        .storage(name)
        .ok_or_else(|| Error::NotFound(format!("storage {}", name)))
}

/// Find the storage holding collected logs
fn log_storage(pitr: &PitrTarget, cluster: &DbCluster) -> Result<StorageSpec> {
    if let Some(source) = &pitr.backup_source {
        if let Some(s3) = &source.s3 {
            return Ok(StorageSpec {
                type_: StorageType::S3,
                s3: Some(s3.clone()),
                ..Default::default()
            });
        }
        if let Some(azure) = &source.azure {
            return Ok(StorageSpec {
                type_: StorageType::Azure,
                azure: Some(azure.clone()),
                ..Default::default()
            });
        }
        if let Some(name) = source.storage_name.as_deref().filter(|n| !n.is_empty()) {
            return cluster
                .storage(name)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("storage {}", name)));
        }
    }

    let name = cluster
        .spec
        .backup
        .as_ref()
        .map(|b| b.pitr.storage_name.as_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::NotFound("pitr storage".to_string()))?;
    cluster
        .storage(name)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("storage {}", name)))
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
    }
}

/// Environment describing a storage backend, each variable prefixed
fn storage_env(prefix: &str, storage: &StorageSpec) -> Vec<EnvVar> {
    let mut vars = vec![env(&format!("{}_STORAGE_TYPE", prefix), storage.type_.to_string())];

    if let Some(s3) = &storage.s3 {
        vars.push(env(&format!("{}_S3_BUCKET", prefix), s3.bucket.clone()));
        if let Some(region) = &s3.region {
            vars.push(env(&format!("{}_S3_REGION", prefix), region.clone()));
        }
        if let Some(endpoint) = &s3.endpoint_url {
            vars.push(env(&format!("{}_S3_ENDPOINT", prefix), endpoint.clone()));
        }
        vars.push(secret_env(
            &format!("{}_AWS_ACCESS_KEY_ID", prefix),
            &s3.credentials_secret,
            "AWS_ACCESS_KEY_ID",
        ));
        vars.push(secret_env(
            &format!("{}_AWS_SECRET_ACCESS_KEY", prefix),
            &s3.credentials_secret,
            "AWS_SECRET_ACCESS_KEY",
        ));
    }

    if let Some(azure) = &storage.azure {
        vars.push(env(&format!("{}_AZURE_CONTAINER", prefix), azure.container.clone()));
        if let Some(endpoint) = &azure.endpoint_url {
            vars.push(env(&format!("{}_AZURE_ENDPOINT", prefix), endpoint.clone()));
        }
        vars.push(secret_env(
            &format!("{}_AZURE_STORAGE_ACCOUNT_NAME", prefix),
            &azure.credentials_secret,
            "AZURE_STORAGE_ACCOUNT_NAME",
        ));
        vars.push(secret_env(
            &format!("{}_AZURE_STORAGE_ACCOUNT_KEY", prefix),
            &azure.credentials_secret,
            "AZURE_STORAGE_ACCOUNT_KEY",
        ));
    }

    if let Some(volume) = &storage.volume {
        vars.push(env(&format!("{}_VOLUME_CLAIM", prefix), volume.claim_name.clone()));
    }

    vars
}

fn job_image(cluster: &DbCluster) -> Result<String> {
    cluster
        .spec
        .backup
        .as_ref()
        .map(|b| b.image.clone())
        .filter(|i| !i.is_empty())
        .ok_or_else(|| Error::validation("cluster backup image is not set"))
}

/// Assemble a single-pod Job that never retries
fn build_job(
    name: &str,
    restore: &DbClusterRestore,
    cluster: &DbCluster,
    image: String,
    command: &str,
    env: Vec<EnvVar>,
    data_claim: Option<String>,
) -> Job {
    let labels = BTreeMap::from([
        (INSTANCE_LABEL.to_string(), cluster.name_any()),
        ("dbcluster.dev/restore".to_string(), restore.name_any()),
    ]);

    let (volumes, mounts) = match data_claim {
        Some(claim) => (
            Some(vec![Volume {
                name: "datadir".to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim,
                    read_only: Some(false),
                }),
                ..Default::default()
            }]),
            Some(vec![VolumeMount {
                name: "datadir".to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..Default::default()
            }]),
        ),
        None => (None, None),
    };

    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: restore.namespace(),
            labels: Some(labels.clone()),
            owner_references: restore.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: name.to_string(),
                        image: Some(image),
                        command: Some(vec![command.to_string()]),
                        env: Some(env),
                        volume_mounts: mounts,
                        ..Default::default()
                    }],
                    volumes,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Job that restores the base backup onto the first member's volume
pub fn build_restore_job(
    restore: &DbClusterRestore,
    backup: &DbClusterBackup,
    cluster: &DbCluster,
) -> Result<Job> {
    let destination = backup
        .destination()
        .ok_or_else(|| Error::validation(format!("backup {} has no destination", backup.name_any())))?;
    let storage = backup_storage(backup, cluster)?;

    let mut vars = vec![env("RESTORE_SRC", destination)];
    vars.extend(storage_env("BACKUP", storage));

    Ok(build_job(
        &restore_job_name(restore),
        restore,
        cluster,
        job_image(cluster)?,
        "/opt/restore/run-restore.sh",
        vars,
        Some(primary_data_claim(cluster)),
    ))
}

/// Job that replays collected logs against the running single member
pub fn build_pitr_job(
    restore: &DbClusterRestore,
    backup: &DbClusterBackup,
    cluster: &DbCluster,
) -> Result<Job> {
    let pitr = restore
        .spec
        .pitr
        .as_ref()
        .ok_or_else(|| Error::validation("restore has no pitr target"))?;
    let storage = log_storage(pitr, cluster)?;

    let mut vars = vec![
        env("PITR_TYPE", pitr.type_.to_string()),
        env("DB_HOST", format!("{}-{}-0.{}-{}", cluster.name_any(), DB_COMPONENT, cluster.name_any(), DB_COMPONENT)),
        env("BACKUP_DESTINATION", backup.destination().unwrap_or_default()),
    ];
    if let Some(date) = &pitr.date {
        vars.push(env("PITR_DATE", date.clone()));
    }
    if let Some(gtid) = &pitr.gtid {
        vars.push(env("PITR_GTID", gtid.clone()));
    }
    vars.extend(storage_env("BINLOG", &storage));

    Ok(build_job(
        &pitr_job_name(restore),
        restore,
        cluster,
        job_image(cluster)?,
        "/opt/restore/run-pitr.sh",
        vars,
        None,
    ))
}

#[async_trait]
impl RestoreOperations for JobRestoreOperations {
    async fn run_restore(
        &self,
        restore: &DbClusterRestore,
        backup: &DbClusterBackup,
        cluster: &DbCluster,
    ) -> Result<()> {
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let job = build_restore_job(restore, backup, cluster)?;

        self.trim_data_volumes(cluster, &namespace).await?;
        self.run_job(job, &namespace).await
    }

    async fn run_pitr(
        &self,
        restore: &DbClusterRestore,
        backup: &DbClusterBackup,
        cluster: &DbCluster,
    ) -> Result<()> {
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let job = build_pitr_job(restore, backup, cluster)?;
        self.run_job(job, &namespace).await
    }
}
