//! Fleet discovery.
//!
//! The fleet has no stored inventory: membership is recovered from provider
//! resource names on every run. A registry holds one snapshot per run;
//! operations that change the topology call [`InstanceRegistry::invalidate`]
//! so later reads in the same run see the new fleet.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use upfleet_naming::ServiceTarget;
use upfleet_provider::ComputeApi;

use crate::error::EngineError;
use crate::instance::Instance;

pub struct InstanceRegistry {
    target: ServiceTarget,
    compute: Arc<dyn ComputeApi>,
    snapshot: Mutex<Option<Arc<[Instance]>>>,
}

impl InstanceRegistry {
    pub fn new(target: ServiceTarget, compute: Arc<dyn ComputeApi>) -> Self {
        Self {
            target,
            compute,
            snapshot: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }

    /// Instances belonging to the target, in provider listing order.
    ///
    /// The first call lists every instance on the account; later calls reuse
    /// that snapshot until [`invalidate`](Self::invalidate).
    pub async fn instances(&self) -> Result<Arc<[Instance]>, EngineError> {
        let mut snapshot = self.snapshot.lock().await;
        if let Some(instances) = snapshot.as_ref() {
            return Ok(instances.clone());
        }

        let droplets = self.compute.list_droplets().await?;
        let instances: Arc<[Instance]> = droplets
            .iter()
            .filter_map(|droplet| {
                self.target
                    .match_instance(&droplet.name)
                    .map(|index| Instance::from_droplet(droplet, index))
            })
            .collect();

        debug!(
            target_name = %self.target,
            listed = droplets.len(),
            matched = instances.len(),
            "Discovered fleet"
        );

        *snapshot = Some(instances.clone());
        Ok(instances)
    }

    /// Ordinals of the live instances.
    pub async fn indices(&self) -> Result<Vec<u32>, EngineError> {
        Ok(self.instances().await?.iter().map(|i| i.index).collect())
    }

    /// Looks up a member by provider id.
    pub async fn find(&self, id: u64) -> Result<Option<Instance>, EngineError> {
        Ok(self.instances().await?.iter().find(|i| i.id == id).cloned())
    }

    /// Drops the snapshot; the next read lists the provider again.
    pub async fn invalidate(&self) {
        self.snapshot.lock().await.take();
    }
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
