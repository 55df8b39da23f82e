//! The engine's entry point: one [`Fleet`] per target per run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use upfleet_naming::{Fqdn, ServiceTarget};
use upfleet_provider::{Cloud, Connector, PublicResolver};
use upfleet_reconcile::ScaleRequest;

use crate::config::EngineConfig;
use crate::deploy::{
    connect, fan_out, BuildArtifact, DeployReport, DeploymentPipeline, FanOutReport, LogsReport,
};
use crate::env::{EnvChange, EnvFile};
use crate::error::EngineError;
use crate::init::{InitReport, Initializer};
use crate::instance::Instance;
use crate::lifecycle::Lifecycle;
use crate::loadbalancer::{LoadBalancerReconciler, SyncOutcome};
use crate::progress::Progress;
use crate::registry::InstanceRegistry;
use crate::remote::RemoteExecutor;
use crate::scaling::{ScaleOutcome, ScalingController};
use crate::status::{InstanceReport, StatusProbe};

/// Collaborators and settings shared by every engine component.
pub struct FleetContext {
    pub target: ServiceTarget,
    pub cloud: Cloud,
    pub connector: Arc<dyn Connector>,
    pub resolver: Arc<dyn PublicResolver>,
    pub config: EngineConfig,
    /// Cancels every wait in the run.
    pub cancel: CancellationToken,
    pub progress: Arc<dyn Progress>,
}

impl FleetContext {
    pub(crate) fn remote(&self) -> RemoteExecutor<'_> {
        RemoteExecutor::new(
            self.connector.as_ref(),
            self.config.readiness,
            &self.cancel,
            self.progress.as_ref(),
        )
    }
}

/// A target's fleet for the duration of one run.
///
/// Owns the run's registry snapshot; a new `Fleet` always rediscovers the
/// fleet from the provider.
pub struct Fleet {
    ctx: FleetContext,
    registry: InstanceRegistry,
}

impl Fleet {
    pub fn new(ctx: FleetContext) -> Self {
        let registry = InstanceRegistry::new(ctx.target.clone(), ctx.cloud.compute.clone());
        Self { ctx, registry }
    }

    pub fn context(&self) -> &FleetContext {
        &self.ctx
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// The target's instances.
    pub async fn list(&self) -> Result<Vec<Instance>, EngineError> {
        Ok(self.registry.instances().await?.to_vec())
    }

    /// Scales the fleet, then brings the load balancer's membership in line
    /// when one exists.
    pub async fn scale(&self, request: ScaleRequest) -> Result<ScaleOutcome, EngineError> {
        let outcome = ScalingController::new(&self.ctx, &self.registry)
            .scale(request)
            .await?;

        if outcome.changed() {
            let balancers = LoadBalancerReconciler::new(&self.ctx, &self.registry);
            match balancers.find().await? {
                Some(balancer) => {
                    balancers.sync_with(&balancer).await?;
                }
                None => info!(
                    target_name = %self.ctx.target,
                    "No load balancer yet; skipping membership update"
                ),
            }
        }
        Ok(outcome)
    }

    /// Reconciles load balancer membership with the fleet.
    pub async fn sync_load_balancer(&self) -> Result<SyncOutcome, EngineError> {
        LoadBalancerReconciler::new(&self.ctx, &self.registry)
            .sync()
            .await
    }

    pub async fn init(&self, fqdn: &Fqdn) -> Result<InitReport, EngineError> {
        Initializer::new(&self.ctx, &self.registry).init(fqdn).await
    }

    pub async fn deploy(&self, artifact: &BuildArtifact) -> Result<DeployReport, EngineError> {
        DeploymentPipeline::new(&self.ctx, &self.registry)
            .deploy(artifact)
            .await
    }

    pub async fn restart(&self) -> Result<FanOutReport, EngineError> {
        DeploymentPipeline::new(&self.ctx, &self.registry)
            .restart()
            .await
    }

    /// The process supervisor's log on every instance.
    pub async fn logs(&self) -> Result<LogsReport, EngineError> {
        DeploymentPipeline::new(&self.ctx, &self.registry)
            .logs()
            .await
    }

    /// Re-runs provisioning on an existing instance.
    pub async fn reprovision(&self, id: u64) -> Result<Instance, EngineError> {
        let instance = self.registry.find(id).await?.ok_or_else(|| {
            EngineError::config(format!("instance {id} is not part of {}", self.ctx.target))
        })?;
        Lifecycle::new(&self.ctx).provision(&instance).await?;
        Ok(instance)
    }

    /// Probes the status endpoint of every instance.
    pub async fn status(&self) -> Result<Vec<InstanceReport>, EngineError> {
        let probe = StatusProbe::new(
            self.ctx.config.provision.status_port,
            self.ctx.config.status_timeout,
        )?;
        let instances = self.registry.instances().await?;
        Ok(probe.probe_all(&instances).await)
    }

    /// The environment file of the first instance.
    pub async fn read_env(&self) -> Result<EnvFile, EngineError> {
        let instances = self.registry.instances().await?;
        let first = instances.first().ok_or_else(|| {
            EngineError::config(format!("{} has no instances", self.ctx.target))
        })?;

        let mut remote = connect(&self.ctx, first).await?;
        let file = EnvFile::read(&mut remote).await;
        remote.finish(file).await
    }

    /// Applies `changes` to the environment file of every instance.
    ///
    /// Running processes keep their old environment until restarted.
    pub async fn update_env(&self, changes: &[EnvChange]) -> Result<FanOutReport, EngineError> {
        let mut scratch = EnvFile::default();
        for change in changes {
            change.apply(&mut scratch)?;
        }

        let instances = self.registry.instances().await?;
        let ctx = &self.ctx;

        Ok(fan_out(&instances, |instance| async move {
            let mut remote = connect(ctx, &instance).await?;
            let updated = async {
                let mut file = EnvFile::read(&mut remote).await?;
                for change in changes {
                    change.apply(&mut file)?;
                }
                file.write(&mut remote).await
            }
            .await;
            remote.finish(updated).await
        })
        .await)
    }
}
