//! Fleet size changes.

use futures_util::future::join_all;
use tracing::{info, warn};
use upfleet_reconcile::{plan_scale, ScalePlan, ScaleRequest};

use crate::error::{EngineError, InstanceFailure};
use crate::fleet::FleetContext;
use crate::instance::Instance;
use crate::lifecycle::Lifecycle;
use crate::progress::FleetEvent;
use crate::registry::InstanceRegistry;

/// Result of one scale operation.
#[derive(Debug)]
pub struct ScaleOutcome {
    pub plan: ScalePlan,
    pub launched: Vec<Instance>,
    pub destroyed: Vec<Instance>,
    pub failures: Vec<InstanceFailure>,
}

impl ScaleOutcome {
    fn noop(plan: ScalePlan) -> Self {
        Self {
            plan,
            launched: Vec::new(),
            destroyed: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Returns true if the fleet changed.
    pub fn changed(&self) -> bool {
        !self.launched.is_empty() || !self.destroyed.is_empty()
    }
}

pub struct ScalingController<'a> {
    ctx: &'a FleetContext,
    registry: &'a InstanceRegistry,
}

impl<'a> ScalingController<'a> {
    pub fn new(ctx: &'a FleetContext, registry: &'a InstanceRegistry) -> Self {
        Self { ctx, registry }
    }

    /// Plans and executes `request` against the live fleet.
    ///
    /// New instances are launched concurrently and fail independently; a
    /// failed launch is reported in the outcome without stopping its
    /// siblings. Removal takes instances from the front of the registry
    /// listing.
    pub async fn scale(&self, request: ScaleRequest) -> Result<ScaleOutcome, EngineError> {
        let instances = self.registry.instances().await?;
        let live: Vec<u32> = instances.iter().map(|i| i.index).collect();
        let plan = plan_scale(&live, request);

        info!(target_name = %self.ctx.target, current = live.len(), ?plan, "Scaling");

        let outcome = match &plan {
            ScalePlan::Unchanged { .. } | ScalePlan::Rejected { .. } => {
                return Ok(ScaleOutcome::noop(plan));
            }
            ScalePlan::Up { indices } => {
                let (launched, failures) = self.launch_all(indices).await;
                ScaleOutcome {
                    plan: plan.clone(),
                    launched,
                    destroyed: Vec::new(),
                    failures,
                }
            }
            ScalePlan::Down { count } => {
                let doomed: Vec<Instance> =
                    instances.iter().take(*count as usize).cloned().collect();
                let (destroyed, failures) = self.destroy_all(doomed).await;
                ScaleOutcome {
                    plan: plan.clone(),
                    launched: Vec::new(),
                    destroyed,
                    failures,
                }
            }
        };

        self.registry.invalidate().await;
        Ok(outcome)
    }

    async fn launch_all(&self, indices: &[u32]) -> (Vec<Instance>, Vec<InstanceFailure>) {
        let lifecycle = Lifecycle::new(self.ctx);
        let results = join_all(indices.iter().map(|&index| {
            let lifecycle = &lifecycle;
            async move { (index, lifecycle.launch(index).await) }
        }))
        .await;

        let mut launched = Vec::new();
        let mut failures = Vec::new();
        for (index, result) in results {
            match result {
                Ok(instance) => launched.push(instance),
                Err(error) => failures.push(InstanceFailure {
                    instance: self.ctx.target.instance_name(index),
                    error,
                }),
            }
        }
        (launched, failures)
    }

    async fn destroy_all(&self, doomed: Vec<Instance>) -> (Vec<Instance>, Vec<InstanceFailure>) {
        let compute = self.ctx.cloud.compute.as_ref();
        let progress = self.ctx.progress.as_ref();

        let results = join_all(doomed.into_iter().map(|instance| async move {
            progress.event(&FleetEvent::DestroyingInstance {
                name: &instance.name,
            });
            let result = compute.destroy_droplet(instance.id).await;
            (instance, result)
        }))
        .await;

        let mut destroyed = Vec::new();
        let mut failures = Vec::new();
        for (instance, result) in results {
            match result {
                Ok(()) => destroyed.push(instance),
                Err(e) => {
                    warn!(instance = %instance.name, error = %e, "Destroy failed");
                    failures.push(InstanceFailure {
                        instance: instance.name,
                        error: e.into(),
                    });
                }
            }
        }
        (destroyed, failures)
    }
}
