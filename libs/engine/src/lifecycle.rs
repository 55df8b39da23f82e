//! Instance lifecycle.
//!
//! ```text
//! Requested -> NetworkAssigned -> Reachable -> Provisioned -> Registered
//!     \______________\_______________\______________\______> Failed
//! ```
//!
//! Any state may also move to `Destroyed`. A failed instance is left in
//! place for the operator; applying the provisioning plan again recovers it
//! from `Reachable`.

use std::net::IpAddr;

use tracing::{debug, error, instrument};
use upfleet_provider::{NewDroplet, ProviderError};
use upfleet_reconcile::Poller;

use crate::error::EngineError;
use crate::fleet::FleetContext;
use crate::instance::Instance;
use crate::progress::FleetEvent;
use crate::provision::ProvisionPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Requested,
    NetworkAssigned,
    Reachable,
    Provisioned,
    Registered,
    Failed,
    Destroyed,
}

impl LifecycleState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, next) {
            (Failed | Destroyed, _) => false,
            (_, Failed | Destroyed) => true,
            (Requested, NetworkAssigned)
            | (NetworkAssigned, Reachable)
            | (Reachable, Provisioned)
            | (Provisioned, Registered) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

struct Tracker<'a> {
    name: &'a str,
    state: LifecycleState,
}

impl<'a> Tracker<'a> {
    fn new(name: &'a str, state: LifecycleState) -> Self {
        Self { name, state }
    }

    fn advance(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(instance = self.name, from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
    }
}

/// Creates and provisions instances.
pub struct Lifecycle<'a> {
    ctx: &'a FleetContext,
}

impl<'a> Lifecycle<'a> {
    pub fn new(ctx: &'a FleetContext) -> Self {
        Self { ctx }
    }

    /// Creates the instance with ordinal `index` and provisions it.
    ///
    /// Returns once the host runs the bootstrap entrypoint. On failure the
    /// instance is not destroyed.
    #[instrument(skip(self), fields(target_name = %self.ctx.target))]
    pub async fn launch(&self, index: u32) -> Result<Instance, EngineError> {
        let name = self.ctx.target.instance_name(index);
        let mut tracker = Tracker::new(&name, LifecycleState::Requested);

        match self.launch_tracked(index, &mut tracker).await {
            Ok(instance) => {
                self.ctx
                    .progress
                    .event(&FleetEvent::InstanceReady { name: &name });
                Ok(instance)
            }
            Err(e) => {
                tracker.advance(LifecycleState::Failed);
                error!(instance = %name, error = %e, "Instance launch failed");
                let message = e.to_string();
                self.ctx.progress.event(&FleetEvent::InstanceFailed {
                    name: &name,
                    error: &message,
                });
                Err(e)
            }
        }
    }

    /// Applies the provisioning plan to an existing instance.
    #[instrument(skip(self, instance), fields(instance = %instance.name))]
    pub async fn provision(&self, instance: &Instance) -> Result<(), EngineError> {
        let address = instance.address.ok_or_else(|| {
            EngineError::Inconsistency(format!("{} has no public address", instance.name))
        })?;
        let mut tracker = Tracker::new(&instance.name, LifecycleState::NetworkAssigned);
        self.provision_at(&instance.name, address.into(), &mut tracker)
            .await
    }

    async fn launch_tracked(
        &self,
        index: u32,
        tracker: &mut Tracker<'_>,
    ) -> Result<Instance, EngineError> {
        let name = tracker.name;
        let template = &self.ctx.config.droplet;

        let request = NewDroplet {
            name: name.to_string(),
            region: template.region.clone(),
            size: template.size.clone(),
            image: template.image.clone(),
            ssh_keys: self.ssh_keys().await?,
        };

        self.ctx.progress.event(&FleetEvent::CreatingInstance { name });
        let created = self.ctx.cloud.compute.create_droplet(&request).await?;
        self.ctx.progress.event(&FleetEvent::InstanceCreated {
            name,
            id: created.id,
        });

        let droplet = self.wait_for_address(name, created.id).await?;
        tracker.advance(LifecycleState::NetworkAssigned);

        let address = droplet
            .public_ipv4()
            .ok_or_else(|| EngineError::Inconsistency(format!("{name} lost its address")))?;
        self.provision_at(name, address.into(), tracker).await?;

        Ok(Instance::from_droplet(&droplet, index))
    }

    async fn provision_at(
        &self,
        name: &str,
        address: IpAddr,
        tracker: &mut Tracker<'_>,
    ) -> Result<(), EngineError> {
        let mut remote = self.ctx.remote().connect(name, address).await?;
        tracker.advance(LifecycleState::Reachable);

        let plan = ProvisionPlan::standard(&self.ctx.config.provision);
        let applied = plan.apply(&mut remote, self.ctx.progress.as_ref()).await;
        remote.finish(applied).await?;

        tracker.advance(LifecycleState::Provisioned);
        Ok(())
    }

    async fn wait_for_address(
        &self,
        name: &str,
        id: u64,
    ) -> Result<upfleet_provider::Droplet, EngineError> {
        let compute = self.ctx.cloud.compute.as_ref();
        let poll_name = format!("address of {name}");

        let droplet = Poller::new(self.ctx.config.readiness, &self.ctx.cancel)
            .with_observer(self.ctx.progress.as_ref())
            .run(&poll_name, |_| async move {
                match compute.get_droplet(id).await {
                    Ok(droplet) if droplet.public_ipv4().is_some() => Ok(Some(droplet)),
                    Ok(_) => Ok(None),
                    Err(ProviderError::Network(e)) => {
                        debug!(instance = name, error = %e, "Transient error polling droplet");
                        Ok(None)
                    }
                    Err(e) => Err(EngineError::from(e)),
                }
            })
            .await?;

        Ok(droplet)
    }

    async fn ssh_keys(&self) -> Result<Vec<String>, EngineError> {
        let configured = &self.ctx.config.droplet.ssh_keys;
        if !configured.is_empty() {
            return Ok(configured.clone());
        }

        let keys: Vec<String> = self
            .ctx
            .cloud
            .ssh_keys
            .list_ssh_keys()
            .await?
            .into_iter()
            .map(|k| k.id.to_string())
            .collect();

        if keys.is_empty() {
            return Err(EngineError::config(
                "no SSH keys are registered with the provider account",
            ));
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_forward_path() {
        assert!(Requested.can_advance_to(NetworkAssigned));
        assert!(NetworkAssigned.can_advance_to(Reachable));
        assert!(Reachable.can_advance_to(Provisioned));
        assert!(Provisioned.can_advance_to(Registered));
    }

    #[test]
    fn test_no_skipping() {
        assert!(!Requested.can_advance_to(Reachable));
        assert!(!NetworkAssigned.can_advance_to(Provisioned));
        assert!(!Registered.can_advance_to(Requested));
    }

    #[test]
    fn test_terminal_states() {
        assert!(Reachable.can_advance_to(Failed));
        assert!(Registered.can_advance_to(Destroyed));
        assert!(!Failed.can_advance_to(Reachable));
        assert!(!Destroyed.can_advance_to(Requested));
    }
}
