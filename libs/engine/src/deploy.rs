//! Deploying builds and restarting the fleet.

use std::future::Future;
use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, info_span, warn, Instrument};

use crate::error::{EngineError, InstanceFailure};
use crate::fleet::FleetContext;
use crate::instance::Instance;
use crate::progress::FleetEvent;
use crate::provision::{install_command, logs_command, restart_command, APP_DIR};
use crate::registry::InstanceRegistry;
use crate::remote::Remote;

/// A built application ready to ship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Single-file bundle, installed as `app.js`.
    pub bundle: PathBuf,
    /// `package.json` of the project.
    pub manifest: PathBuf,
    /// `package-lock.json`, when the project has one.
    pub lockfile: Option<PathBuf>,
}

impl BuildArtifact {
    /// Locates the artifact of the project rooted at `project_dir`.
    pub fn locate(project_dir: &Path, bundle: &Path) -> Result<Self, EngineError> {
        let bundle = project_dir.join(bundle);
        if !bundle.is_file() {
            return Err(EngineError::config(format!(
                "build output {} not found; build the project first",
                bundle.display()
            )));
        }

        let manifest = project_dir.join("package.json");
        if !manifest.is_file() {
            return Err(EngineError::config(format!(
                "no package.json in {}",
                project_dir.display()
            )));
        }

        let lockfile = Some(project_dir.join("package-lock.json")).filter(|p| p.is_file());

        Ok(Self {
            bundle,
            manifest,
            lockfile,
        })
    }

    /// Hex SHA-256 of the bundle, as reported by each host's status endpoint.
    pub async fn digest(&self) -> Result<String, EngineError> {
        let bytes = tokio::fs::read(&self.bundle).await.map_err(|e| {
            EngineError::config(format!("cannot read {}: {e}", self.bundle.display()))
        })?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Per-instance results of an operation applied to the whole fleet.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub succeeded: Vec<String>,
    pub failures: Vec<InstanceFailure>,
}

impl FanOutReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts any failure into [`EngineError::Partial`].
    pub fn into_result(self) -> Result<Vec<String>, EngineError> {
        if self.failures.is_empty() {
            return Ok(self.succeeded);
        }
        Err(EngineError::Partial {
            total: self.succeeded.len() + self.failures.len(),
            failures: self.failures,
        })
    }
}

/// Result of [`DeploymentPipeline::deploy`].
#[derive(Debug)]
pub struct DeployReport {
    /// Hex SHA-256 of the shipped bundle.
    pub digest: String,
    pub instances: FanOutReport,
}

/// What the process supervisor logged on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceLogs {
    pub instance: String,
    pub index: u32,
    pub stdout: String,
    pub stderr: String,
}

/// Per-instance logs, ordered by index, plus the instances that could not
/// be read.
#[derive(Debug, Default)]
pub struct LogsReport {
    pub logs: Vec<InstanceLogs>,
    pub failures: Vec<InstanceFailure>,
}

impl LogsReport {
    /// Converts any failure into [`EngineError::Partial`].
    pub fn into_result(self) -> Result<Vec<InstanceLogs>, EngineError> {
        if self.failures.is_empty() {
            return Ok(self.logs);
        }
        Err(EngineError::Partial {
            total: self.logs.len() + self.failures.len(),
            failures: self.failures,
        })
    }
}

/// Runs `op` against every instance concurrently. One failure never
/// cancels the others.
pub(crate) async fn fan_out<F, Fut>(instances: &[Instance], op: F) -> FanOutReport
where
    F: Fn(Instance) -> Fut,
    Fut: Future<Output = Result<(), EngineError>>,
{
    let (succeeded, failures) = fan_out_collect(instances, op).await;
    FanOutReport {
        succeeded: succeeded.into_iter().map(|(instance, ())| instance).collect(),
        failures,
    }
}

/// Like [`fan_out`], keeping the value each successful task produced.
pub(crate) async fn fan_out_collect<T, F, Fut>(
    instances: &[Instance],
    op: F,
) -> (Vec<(String, T)>, Vec<InstanceFailure>)
where
    F: Fn(Instance) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let results = join_all(instances.iter().map(|instance| {
        let name = instance.name.clone();
        let span = info_span!("instance", instance = %name);
        let task = op(instance.clone());
        let labelled = async move { (name, task.await) };
        labelled.instrument(span)
    }))
    .await;

    let mut succeeded = Vec::new();
    let mut failures = Vec::new();
    for (instance, result) in results {
        match result {
            Ok(value) => succeeded.push((instance, value)),
            Err(error) => {
                warn!(%instance, error = %error, "Instance task failed");
                failures.push(InstanceFailure { instance, error });
            }
        }
    }
    (succeeded, failures)
}

/// Opens a session to an instance at its public address.
pub(crate) async fn connect(ctx: &FleetContext, instance: &Instance) -> Result<Remote, EngineError> {
    let address = instance.address.ok_or_else(|| {
        EngineError::Inconsistency(format!("{} has no public address", instance.name))
    })?;
    ctx.remote().connect(&instance.name, address.into()).await
}

async fn ship(remote: &mut Remote, artifact: &BuildArtifact) -> Result<(), EngineError> {
    remote
        .upload(&artifact.bundle, &format!("{APP_DIR}/app.js"))
        .await?;
    remote
        .upload(&artifact.manifest, &format!("{APP_DIR}/package.json"))
        .await?;
    if let Some(lockfile) = &artifact.lockfile {
        remote
            .upload(lockfile, &format!("{APP_DIR}/package-lock.json"))
            .await?;
    }
    remote.exec(&install_command()).await?;
    remote.exec(&restart_command()).await?;
    Ok(())
}

pub struct DeploymentPipeline<'a> {
    ctx: &'a FleetContext,
    registry: &'a InstanceRegistry,
}

impl<'a> DeploymentPipeline<'a> {
    pub fn new(ctx: &'a FleetContext, registry: &'a InstanceRegistry) -> Self {
        Self { ctx, registry }
    }

    /// Ships `artifact` to every instance, installs production dependencies
    /// and restarts the entrypoint.
    pub async fn deploy(&self, artifact: &BuildArtifact) -> Result<DeployReport, EngineError> {
        let instances = self.live_instances().await?;
        let digest = artifact.digest().await?;
        info!(
            target_name = %self.ctx.target,
            instances = instances.len(),
            %digest,
            "Deploying build"
        );

        let ctx = self.ctx;
        let report = fan_out(&instances, |instance| async move {
            ctx.progress.event(&FleetEvent::Deploying {
                name: &instance.name,
            });

            let mut remote = connect(ctx, &instance).await?;
            let shipped = ship(&mut remote, artifact).await;
            remote.finish(shipped).await?;

            ctx.progress.event(&FleetEvent::Deployed {
                name: &instance.name,
            });
            Ok(())
        })
        .await;

        Ok(DeployReport {
            digest,
            instances: report,
        })
    }

    /// Restarts the entrypoint on every instance.
    pub async fn restart(&self) -> Result<FanOutReport, EngineError> {
        let instances = self.live_instances().await?;

        let ctx = self.ctx;
        Ok(fan_out(&instances, |instance| async move {
            let mut remote = connect(ctx, &instance).await?;
            let restarted = remote.exec(&restart_command()).await;
            remote.finish(restarted).await?;

            ctx.progress.event(&FleetEvent::Restarted {
                name: &instance.name,
            });
            Ok(())
        })
        .await)
    }

    /// Reads the supervisor's log from every instance.
    pub async fn logs(&self) -> Result<LogsReport, EngineError> {
        let instances = self.live_instances().await?;

        let ctx = self.ctx;
        let (read, failures) = fan_out_collect(&instances, |instance| async move {
            let mut remote = connect(ctx, &instance).await?;
            let output = remote.exec(&logs_command()).await;
            let output = remote.finish(output).await?;
            Ok(InstanceLogs {
                instance: instance.name,
                index: instance.index,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        })
        .await;

        let mut logs: Vec<InstanceLogs> = read.into_iter().map(|(_, logs)| logs).collect();
        logs.sort_by_key(|l| l.index);
        Ok(LogsReport { logs, failures })
    }

    async fn live_instances(&self) -> Result<Vec<Instance>, EngineError> {
        let instances = self.registry.instances().await?;
        if instances.is_empty() {
            return Err(EngineError::config(format!(
                "{} has no instances; scale it up first",
                self.ctx.target
            )));
        }
        Ok(instances.to_vec())
    }
}
